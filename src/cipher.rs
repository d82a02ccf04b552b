//! Black-box image ciphers and their evaluation.
//!
//! The crate never looks inside a cipher. It only feeds images through
//! [`ImageCipher::encrypt`] and [`ImageCipher::decrypt`], times the calls,
//! checks that decryption restores every pixel, and measures the ciphertexts
//! with [`SuiteReport`].

use crate::batch::SuiteReport;
use crate::error::Result;
use crate::metrics::identical;
use crate::pixel::PackedImage;
use crate::store::{self, DirectoryLayout, LoadedImage};
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// An image-to-image cipher under test.
pub trait ImageCipher: Send + Sync {
    fn encrypt(&self, plain: &PackedImage) -> Result<PackedImage>;
    fn decrypt(&self, cipher: &PackedImage) -> Result<PackedImage>;
}

/// Timing and fidelity of one image's encrypt/decrypt round.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CipherTiming {
    pub name: String,
    pub encrypt_ms: f64,
    pub decrypt_ms: f64,
    /// Decryption reproduced the plain image exactly.
    pub lossless: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CipherReport {
    pub timings: Vec<CipherTiming>,
    /// Images the cipher failed on.
    pub failed: Vec<String>,
    /// Images whose outputs could not be written; they are still analyzed.
    pub unsaved: Vec<String>,
    pub suite: SuiteReport,
}

impl CipherReport {
    pub fn all_lossless(&self) -> bool {
        self.failed.is_empty() && self.timings.iter().all(|t| t.lossless)
    }

    pub fn mean_encrypt_ms(&self) -> f64 {
        mean(self.timings.iter().map(|t| t.encrypt_ms))
    }

    pub fn mean_decrypt_ms(&self) -> f64 {
        mean(self.timings.iter().map(|t| t.decrypt_ms))
    }
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.sum::<f64>() / n as f64
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

/// Outputs are always PNG, whatever format the plain image came from.
fn save_outputs(
    layout: &DirectoryLayout,
    name: &str,
    encrypted: &PackedImage,
    decrypted: &PackedImage,
) -> Result<()> {
    let file = Path::new(name).with_extension("png");
    store::save_image(encrypted, &layout.encrypted.join(&file))?;
    store::save_image(decrypted, &layout.decrypted.join(&file))
}

/// Encrypt and decrypt every image, then analyze the ciphertexts.
///
/// When `layout` is given, ciphertexts go to its `encrypted` directory and
/// decryptions to `decrypted`, both as `<plain stem>.png`. A failed write is
/// logged and listed in [`CipherReport::unsaved`].
pub fn evaluate_cipher(
    cipher: &dyn ImageCipher,
    images: &[LoadedImage],
    layout: Option<&DirectoryLayout>,
) -> Result<CipherReport> {
    if let Some(layout) = layout {
        layout.ensure()?;
    }

    let mut report = CipherReport::default();
    let mut plains: Vec<PackedImage> = Vec::with_capacity(images.len());
    let mut ciphers: Vec<PackedImage> = Vec::with_capacity(images.len());

    for loaded in images {
        let start = Instant::now();
        let encrypted = match cipher.encrypt(&loaded.image) {
            Ok(img) => img,
            Err(e) => {
                warn!(image = %loaded.name, error = %e, "encryption failed");
                report.failed.push(loaded.name.clone());
                continue;
            }
        };
        let encrypt_ms = millis(start.elapsed());

        let start = Instant::now();
        let decrypted = match cipher.decrypt(&encrypted) {
            Ok(img) => img,
            Err(e) => {
                warn!(image = %loaded.name, error = %e, "decryption failed");
                report.failed.push(loaded.name.clone());
                continue;
            }
        };
        let decrypt_ms = millis(start.elapsed());

        // A size-changing decryption is not lossless.
        let lossless = identical(&loaded.image, &decrypted).unwrap_or(false);
        if !lossless {
            warn!(image = %loaded.name, "decryption did not restore the plain image");
        }

        if let Some(layout) = layout {
            if let Err(e) = save_outputs(layout, &loaded.name, &encrypted, &decrypted) {
                warn!(image = %loaded.name, error = %e, "could not write cipher outputs");
                report.unsaved.push(loaded.name.clone());
            }
        }

        report.timings.push(CipherTiming {
            name: loaded.name.clone(),
            encrypt_ms,
            decrypt_ms,
            lossless,
        });
        plains.push(loaded.image.clone());
        ciphers.push(encrypted);
    }

    report.suite = SuiteReport::evaluate(&plains, &ciphers);
    info!(
        images = report.timings.len(),
        failed = report.failed.len(),
        unsaved = report.unsaved.len(),
        encrypt_ms = report.mean_encrypt_ms(),
        decrypt_ms = report.mean_decrypt_ms(),
        "cipher evaluated"
    );
    Ok(report)
}
