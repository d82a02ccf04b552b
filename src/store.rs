//! Lossless image persistence and directory collaborators.

use crate::error::{MetricsError, Result};
use crate::pixel::{unpack_rgb, PackedImage, PixelAccessor};
use image::{ImageFormat, ImageReader, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directories used by a full cipher evaluation run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectoryLayout {
    pub source: PathBuf,
    pub fractals: PathBuf,
    pub encrypted: PathBuf,
    pub decrypted: PathBuf,
}

impl Default for DirectoryLayout {
    fn default() -> Self {
        Self::under(Path::new("."))
    }
}

impl DirectoryLayout {
    pub fn under(root: &Path) -> Self {
        Self {
            source: root.join("images"),
            fractals: root.join("mandelbrot"),
            encrypted: root.join("encrypted"),
            decrypted: root.join("decrypted"),
        }
    }

    /// Create every directory that does not exist yet.
    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.source, &self.fractals, &self.encrypted, &self.decrypted] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// An image read from disk together with its file name.
#[derive(Clone, Debug)]
pub struct LoadedImage {
    pub name: String,
    pub path: PathBuf,
    pub image: PackedImage,
}

impl PixelAccessor for LoadedImage {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn pixel(&self, x: u32, y: u32) -> u32 {
        self.image.pixel(x, y)
    }

    fn set_pixel(&mut self, x: u32, y: u32, packed: u32) {
        self.image.set_pixel(x, y, packed);
    }

    fn packed_pixels(&self) -> Vec<u32> {
        self.image.packed_pixels()
    }

    fn label(&self) -> Option<&str> {
        Some(&self.name)
    }
}

/// Pick the output format from the extension, refusing lossy formats.
fn lossless_format(path: &Path) -> Result<ImageFormat> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .ok_or_else(|| {
            MetricsError::InvalidConfig(format!(
                "output file must have an extension (e.g. .png): {}",
                path.display()
            ))
        })?;
    match ext.as_str() {
        "png" => Ok(ImageFormat::Png),
        "bmp" => Ok(ImageFormat::Bmp),
        "jpg" | "jpeg" => Err(MetricsError::InvalidConfig(format!(
            "JPEG is lossy and would alter packed colors, use .png instead: {}",
            path.display()
        ))),
        other => Err(MetricsError::InvalidConfig(format!(
            "unsupported output format '.{other}', use .png or .bmp"
        ))),
    }
}

/// Write `image` as 24-bit RGB; packed colors round-trip exactly.
pub fn save_image<A: PixelAccessor + ?Sized>(image: &A, path: &Path) -> Result<()> {
    let format = lossless_format(path)?;
    let (width, height) = image.dimensions();
    let pixels = image.packed_pixels();
    let rgb = RgbImage::from_fn(width, height, |x, y| {
        Rgb(unpack_rgb(pixels[y as usize * width as usize + x as usize]))
    });
    rgb.save_with_format(path, format)?;
    debug!(path = %path.display(), "saved image");
    Ok(())
}

pub fn load_image(path: &Path) -> Result<PackedImage> {
    let decoded = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(PackedImage::from_rgb(&decoded.to_rgb8()))
}

/// Regular files in `dir`, sorted by file name.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort_by_key(|path| path.file_name().map(|n| n.to_os_string()));
    Ok(files)
}

/// Load every readable image in `dir`, sorted by file name.
///
/// Unreadable files are logged and skipped; the count of skipped files is returned
/// alongside the images.
pub fn load_dir(dir: &Path) -> Result<(Vec<LoadedImage>, usize)> {
    let mut images = Vec::new();
    let mut skipped = 0;
    for path in list_files(dir)? {
        match load_image(&path) {
            Ok(image) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                images.push(LoadedImage { name, path, image });
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable image");
                skipped += 1;
            }
        }
    }
    Ok((images, skipped))
}
