//! Packed 24-bit RGB pixel grids.
//!
//! Every pixel is a `u32` laid out as `0x00RRGGBB`. The top byte is always
//! zero once a value is stored, so packed colors survive a PNG round trip
//! bit for bit.

use crate::error::{MetricsError, Result};
use image::{Rgb, RgbImage};

/// Mask keeping the 24 RGB bits of a packed color.
pub const RGB_MASK: u32 = 0x00FF_FFFF;

/// Red channel of a packed color.
#[inline]
pub fn red(packed: u32) -> u8 {
    ((packed >> 16) & 0xFF) as u8
}

#[inline]
pub fn pack_rgb(rgb: [u8; 3]) -> u32 {
    (u32::from(rgb[0]) << 16) | (u32::from(rgb[1]) << 8) | u32::from(rgb[2])
}

#[inline]
pub fn unpack_rgb(packed: u32) -> [u8; 3] {
    [
        ((packed >> 16) & 0xFF) as u8,
        ((packed >> 8) & 0xFF) as u8,
        (packed & 0xFF) as u8,
    ]
}

/// Read/write access to a 2-D grid of packed colors.
///
/// Regions are exchanged in row-major order. Implementations mask written
/// values with [`RGB_MASK`].
pub trait PixelAccessor {
    fn dimensions(&self) -> (u32, u32);

    fn pixel(&self, x: u32, y: u32) -> u32;

    fn set_pixel(&mut self, x: u32, y: u32, packed: u32);

    /// Name identifying the grid in results and logs, if it has one.
    fn label(&self) -> Option<&str> {
        None
    }

    fn width(&self) -> u32 {
        self.dimensions().0
    }

    fn height(&self) -> u32 {
        self.dimensions().1
    }

    fn pixel_count(&self) -> usize {
        let (w, h) = self.dimensions();
        w as usize * h as usize
    }

    /// Copy a `width`×`height` rectangle starting at `(x, y)`.
    fn read_region(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Vec<u32>> {
        check_region(self.dimensions(), x, y, width, height)?;
        let mut out = Vec::with_capacity(width as usize * height as usize);
        for row in y..y + height {
            for col in x..x + width {
                out.push(self.pixel(col, row));
            }
        }
        Ok(out)
    }

    /// Overwrite a `width`×`height` rectangle starting at `(x, y)`.
    fn write_region(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        data: &[u32],
    ) -> Result<()> {
        check_region(self.dimensions(), x, y, width, height)?;
        check_buffer(width, height, data)?;
        for (i, &packed) in data.iter().enumerate() {
            let col = x + (i as u32 % width);
            let row = y + (i as u32 / width);
            self.set_pixel(col, row, packed);
        }
        Ok(())
    }

    /// Every pixel of the grid, row-major.
    fn packed_pixels(&self) -> Vec<u32> {
        let (w, h) = self.dimensions();
        let mut out = Vec::with_capacity(w as usize * h as usize);
        for row in 0..h {
            for col in 0..w {
                out.push(self.pixel(col, row));
            }
        }
        out
    }
}

fn check_region(dims: (u32, u32), x: u32, y: u32, width: u32, height: u32) -> Result<()> {
    let fits_x = x.checked_add(width).is_some_and(|end| end <= dims.0);
    let fits_y = y.checked_add(height).is_some_and(|end| end <= dims.1);
    if !(fits_x && fits_y) {
        return Err(MetricsError::RegionOutOfBounds {
            x,
            y,
            width,
            height,
            image_width: dims.0,
            image_height: dims.1,
        });
    }
    Ok(())
}

fn check_buffer(width: u32, height: u32, data: &[u32]) -> Result<()> {
    let expected = width as usize * height as usize;
    if data.len() != expected {
        return Err(MetricsError::BufferSize {
            expected,
            got: data.len(),
        });
    }
    Ok(())
}

/// Owned row-major grid of packed colors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedImage {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl PackedImage {
    /// All-black image.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0)
    }

    pub fn filled(width: u32, height: u32, packed: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![packed & RGB_MASK; width as usize * height as usize],
        }
    }

    pub fn from_pixels(width: u32, height: u32, mut pixels: Vec<u32>) -> Result<Self> {
        check_buffer(width, height, &pixels)?;
        pixels.iter_mut().for_each(|p| *p &= RGB_MASK);
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn from_rgb(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let pixels = image.pixels().map(|p| pack_rgb(p.0)).collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn to_rgb(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb(unpack_rgb(self.pixel(x, y)))
        })
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.pixels
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

impl PixelAccessor for PackedImage {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    fn pixel(&self, x: u32, y: u32) -> u32 {
        self.pixels[self.index(x, y)]
    }

    #[inline]
    fn set_pixel(&mut self, x: u32, y: u32, packed: u32) {
        let idx = self.index(x, y);
        self.pixels[idx] = packed & RGB_MASK;
    }

    fn read_region(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Vec<u32>> {
        check_region(self.dimensions(), x, y, width, height)?;
        let mut out = Vec::with_capacity(width as usize * height as usize);
        for row in y..y + height {
            let start = self.index(x, row);
            out.extend_from_slice(&self.pixels[start..start + width as usize]);
        }
        Ok(out)
    }

    fn packed_pixels(&self) -> Vec<u32> {
        self.pixels.clone()
    }
}

impl PixelAccessor for RgbImage {
    fn dimensions(&self) -> (u32, u32) {
        RgbImage::dimensions(self)
    }

    fn pixel(&self, x: u32, y: u32) -> u32 {
        pack_rgb(self.get_pixel(x, y).0)
    }

    fn set_pixel(&mut self, x: u32, y: u32, packed: u32) {
        self.put_pixel(x, y, Rgb(unpack_rgb(packed)));
    }
}
