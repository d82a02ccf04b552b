//! # chaosmetric
//!
//! Generates diverse Mandelbrot test images and measures how well an image
//! cipher hides its input.
//!
//! ## Quick Start
//!
//! ```no_run
//! use chaosmetric::{FractalGenerator, GeneratorConfig, SamplerSeed, ViewCodec, DecimalSeparator};
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! // Build a generator with the default 1024x720 geometry
//! let generator = FractalGenerator::new(GeneratorConfig::default())?;
//!
//! // Reproducible seed table
//! let mut rng = SamplerSeed::Passphrase("corpus-1".into()).rng();
//! let table = generator.sample_table(&mut rng);
//!
//! // Render and persist every accepted image under its parameter token
//! let codec = ViewCodec::new(DecimalSeparator::Point);
//! let summary = generator.run(&table, &mut rng, Path::new("mandelbrot"), &codec)?;
//! println!("{} accepted, {} skipped", summary.accepted, summary.skipped.len());
//!
//! // Texture statistics of the corpus
//! let (images, _) = chaosmetric::store::load_dir(Path::new("mandelbrot"))?;
//! let texture = chaosmetric::average_neighbor_and_variance(&images)?;
//! println!("Rh={:.4} Rv={:.4} Rd={:.4}", texture.rh, texture.rv, texture.rd);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - `escape`: escape-time evaluation and coloring
//! - `generator`: parallel rendering and acceptance sampling
//! - `metrics`: correlation, similarity and diffusion metrics
//! - `batch`: averaging metrics over image sets
//! - `codec`: parameter tokens in file names
//! - `cipher`: black-box cipher evaluation

pub mod batch;
pub mod cipher;
pub mod codec;
pub mod error;
pub mod escape;
pub mod generator;
pub mod metrics;
pub mod params;
pub mod pixel;
pub mod store;

// Re-export main types for convenience
pub use batch::{
    average_combinatorial, average_metric, average_neighbor_and_variance, average_pairwise,
    sampled_similarity, BatchAverage, SimilaritySummary, SuiteReport, TextureSummary,
};
pub use cipher::{evaluate_cipher, CipherReport, ImageCipher};
pub use codec::{decode_any, CodecVersion, DecimalSeparator, DecodedName, ParameterCodec, SeedCodec, ViewCodec};
pub use error::{MetricsError, Result};
pub use generator::{AcceptanceThresholds, FractalGenerator, GeneratedImage, GenerationSummary, GeneratorConfig};
pub use metrics::{MetricKind, MetricResult};
pub use params::{GenerationParameters, ParameterTable, SamplerSeed, SamplingRanges};
pub use pixel::{PackedImage, PixelAccessor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::params::{SeedParams, ViewParams};
    use std::path::Path;

    fn small_generator() -> FractalGenerator {
        FractalGenerator::new(GeneratorConfig {
            width: 32,
            height: 24,
            table_size: 4,
            workers: 3,
            max_attempts: 2,
            thresholds: AcceptanceThresholds {
                max_black_fraction: 1.0,
                min_unique_colors: 0,
                max_dominant_fraction: 1.01,
            },
            ..GeneratorConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_generate_persist_and_decode_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let generator = small_generator();
        let mut rng = SamplerSeed::Numeric(42).rng();
        let table = generator.sample_table(&mut rng);
        let codec = ViewCodec::new(DecimalSeparator::Comma);

        let mut produced = Vec::new();
        let summary = generator.run_with(&table, &mut rng, |generated| {
            let path = dir
                .path()
                .join(format!("{}.png", codec.encode(&generated.params)));
            store::save_image(&generated.image, &path)?;
            produced.push((generated.params, generated.image.clone()));
            Ok(Some(path))
        });
        assert_eq!(summary.accepted, 4);
        assert!(summary.skipped.is_empty());

        let (loaded, skipped) = store::load_dir(dir.path()).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(loaded.len(), 4);

        for image in &loaded {
            let stem = Path::new(&image.name).file_stem().unwrap().to_string_lossy();
            let decoded = decode_any(&stem).unwrap();
            let (params, pixels) = &produced[decoded.index()];
            assert!(decoded.matches(params, 0.005 + 1e-9));
            assert!(metrics::identical(&image.image, pixels).unwrap());
        }
    }

    #[test]
    fn test_seed_table_is_reproducible_from_passphrase() {
        let generator = small_generator();
        let a = generator.sample_table(&mut SamplerSeed::Passphrase("abc".into()).rng());
        let b = generator.sample_table(&mut SamplerSeed::Passphrase("abc".into()).rng());
        let c = generator.sample_table(&mut SamplerSeed::Passphrase("abd".into()).rng());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_seed_codec_roundtrip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let params = GenerationParameters::new(
            9,
            SeedParams { zx: -1.25, zy: 3.5, cx: 120.0, cy: -64.0625 },
            ViewParams { zoom: 120_000.0, max_iterations: 620, offset_x: 0.25, offset_y: -0.5 },
        );
        let codec = SeedCodec::new(DecimalSeparator::Point);
        let path = dir.path().join(format!("{}.png", codec.encode(&params)));
        store::save_image(&PackedImage::filled(2, 2, 0x00AB_CDEF), &path).unwrap();

        let (loaded, _) = store::load_dir(dir.path()).unwrap();
        let stem = loaded[0].name.trim_end_matches(".png");
        assert_eq!(CodecVersion::detect(stem), Some(CodecVersion::Seed));
        match decode_any(stem).unwrap() {
            DecodedName::Seed { index, seed } => {
                assert_eq!(index, 9);
                assert!((seed.cy - -64.0625).abs() < 1e-9);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_generated_corpus_is_dissimilar() {
        let generator = small_generator();
        let mut rng = SamplerSeed::Numeric(7).rng();
        let table = generator.sample_table(&mut rng);
        let mut images = Vec::new();
        for (index, seed) in table.iter() {
            images.push(generator.generate(index, seed, &mut rng).unwrap().image);
        }

        let similarity = sampled_similarity(&images, 1).unwrap();
        assert_eq!(similarity.comparisons, 6);
        assert!(similarity.ssim <= 1.0);

        let texture = average_neighbor_and_variance(&images).unwrap();
        assert_eq!(texture.images, 4);
    }

    #[test]
    fn test_suite_report_over_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = store::DirectoryLayout::under(dir.path());
        layout.ensure().unwrap();

        for i in 0..3u32 {
            let plain = PackedImage::from_pixels(4, 4, (0..16).map(|p| p * 16 + i).collect()).unwrap();
            let noise = PackedImage::from_pixels(
                4,
                4,
                (0..16u32).map(|p| (p + 1).wrapping_mul(0x9E37_79B9 ^ i)).collect(),
            )
            .unwrap();
            store::save_image(&plain, &layout.source.join(format!("{i}.png"))).unwrap();
            store::save_image(&noise, &layout.encrypted.join(format!("{i}.png"))).unwrap();
        }

        let (plain, _) = store::load_dir(&layout.source).unwrap();
        let (cipher, _) = store::load_dir(&layout.encrypted).unwrap();
        let report = SuiteReport::evaluate(&plain, &cipher);

        assert_eq!(report.pearson.unwrap().comparisons, 3);
        assert_eq!(report.uaci.unwrap().comparisons, 3);
        assert_eq!(report.nfc.unwrap().comparisons, 3);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"npcr\""));
    }
}
