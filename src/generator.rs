//! Parallel fractal generation with diversity-based acceptance sampling.
//!
//! Columns are split into disjoint bands. Each rayon task renders only its own
//! band into a buffer it owns and hands it back; the orchestrator merges the
//! bands once every task has joined, so no pixel is ever written by two tasks.
use crate::codec::ParameterCodec;
use crate::error::{MetricsError, Result};
use crate::escape::{render_column, ViewWindow};
use crate::params::{GenerationParameters, ParameterTable, SamplingRanges, SeedParams, DEFAULT_TABLE_SIZE};
use crate::pixel::{PackedImage, PixelAccessor, RGB_MASK};
use crate::store;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 720;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 64;

/// Diversity criteria a candidate must meet to be kept.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceThresholds {
    /// Reject when the black-pixel fraction exceeds this.
    pub max_black_fraction: f64,
    /// Require strictly more distinct colors than this.
    pub min_unique_colors: usize,
    /// Require the most common color to stay strictly below this fraction.
    pub max_dominant_fraction: f64,
}

impl Default for AcceptanceThresholds {
    fn default() -> Self {
        Self {
            max_black_fraction: 0.075,
            min_unique_colors: 250,
            max_dominant_fraction: 0.20,
        }
    }
}

/// Outcome of the diversity check plus the counters behind it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AcceptanceVerdict {
    pub accepted: bool,
    pub unique_colors: usize,
    pub dominant_fraction: f64,
    pub black_fraction: f64,
}

impl AcceptanceThresholds {
    pub fn assess<A: PixelAccessor + ?Sized>(&self, image: &A) -> AcceptanceVerdict {
        let total = image.pixel_count();
        if total == 0 {
            return AcceptanceVerdict {
                accepted: false,
                unique_colors: 0,
                dominant_fraction: 0.0,
                black_fraction: 0.0,
            };
        }

        let mut counts: HashMap<u32, usize> = HashMap::new();
        let mut black = 0usize;
        for packed in image.packed_pixels() {
            if packed & RGB_MASK == 0 {
                black += 1;
            }
            *counts.entry(packed).or_insert(0) += 1;
        }

        let total = total as f64;
        let black_fraction = black as f64 / total;
        let unique_colors = counts.len();
        let dominant_fraction = counts.values().copied().max().unwrap_or(0) as f64 / total;

        // Too much black rejects regardless of the other counters.
        let accepted = black_fraction <= self.max_black_fraction
            && unique_colors > self.min_unique_colors
            && dominant_fraction < self.max_dominant_fraction;

        AcceptanceVerdict {
            accepted,
            unique_colors,
            dominant_fraction,
            black_fraction,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub width: u32,
    pub height: u32,
    pub table_size: usize,
    /// Worker threads; 0 uses the available hardware parallelism.
    pub workers: usize,
    /// Candidates tried per sequence index before giving up.
    pub max_attempts: u32,
    pub thresholds: AcceptanceThresholds,
    pub ranges: SamplingRanges,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            table_size: DEFAULT_TABLE_SIZE,
            workers: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            thresholds: AcceptanceThresholds::default(),
            ranges: SamplingRanges::default(),
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MetricsError::InvalidConfig(format!(
                "image size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.max_attempts == 0 {
            return Err(MetricsError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        self.ranges.validate()
    }

    fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// An accepted image and the parameters that produced it.
#[derive(Clone, Debug)]
pub struct GeneratedImage {
    pub params: GenerationParameters,
    pub image: PackedImage,
    pub verdict: AcceptanceVerdict,
    pub attempts: u32,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct GenerationSummary {
    pub accepted: usize,
    /// Sequence indices that produced no persisted image.
    pub skipped: Vec<usize>,
    pub attempts: u64,
    pub written: Vec<PathBuf>,
}

/// Half-open column range owned by one task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ColumnBand {
    start: u32,
    end: u32,
}

fn column_bands(width: u32, bands: usize) -> Vec<ColumnBand> {
    let bands = bands.clamp(1, width.max(1) as usize) as u32;
    let base = width / bands;
    let extra = width % bands;
    let mut start = 0;
    (0..bands)
        .map(|i| {
            let len = base + u32::from(i < extra);
            let band = ColumnBand {
                start,
                end: start + len,
            };
            start += len;
            band
        })
        .collect()
}

pub struct FractalGenerator {
    config: GeneratorConfig,
    pool: rayon::ThreadPool,
    workers: usize,
}

impl FractalGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        let workers = config.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("fractal-worker-{i}"))
            .build()
            .map_err(|e| MetricsError::InvalidConfig(format!("worker pool: {e}")))?;
        Ok(Self {
            config,
            pool,
            workers,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Draw the seed table for this generator's image size.
    pub fn sample_table<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterTable {
        ParameterTable::sample(
            self.config.table_size,
            &self.config.ranges,
            self.config.width,
            self.config.height,
            rng,
        )
    }

    /// Render one image; returns only after every band has completed.
    pub fn render(&self, params: &GenerationParameters) -> Result<PackedImage> {
        let view = params.view_window(self.config.width, self.config.height);
        self.render_view(&view)
    }

    fn render_view(&self, view: &ViewWindow) -> Result<PackedImage> {
        let bands = column_bands(view.width, self.workers);

        let rendered: Vec<(ColumnBand, Vec<Vec<u32>>)> = self.pool.install(|| {
            bands
                .par_iter()
                .map(|&band| {
                    let columns = (band.start..band.end)
                        .map(|x| render_column(view, x))
                        .collect();
                    (band, columns)
                })
                .collect()
        });

        let mut image = PackedImage::new(view.width, view.height);
        for (band, columns) in rendered {
            for (x, column) in (band.start..band.end).zip(columns) {
                image.write_region(x, 0, 1, view.height, &column)?;
            }
        }
        Ok(image)
    }

    /// Resample the viewport until a candidate passes the thresholds or the
    /// attempt budget runs out.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        index: usize,
        seed: SeedParams,
        rng: &mut R,
    ) -> Result<GeneratedImage> {
        for attempt in 1..=self.config.max_attempts {
            let view = self.config.ranges.sample_view(rng);
            let params = GenerationParameters::new(index, seed, view);
            let image = self.render(&params)?;
            let verdict = self.config.thresholds.assess(&image);

            if verdict.accepted {
                info!(
                    index,
                    attempt,
                    unique_colors = verdict.unique_colors,
                    "accepted candidate"
                );
                return Ok(GeneratedImage {
                    params,
                    image,
                    verdict,
                    attempts: attempt,
                });
            }

            debug!(
                index,
                attempt,
                black = verdict.black_fraction,
                unique_colors = verdict.unique_colors,
                dominant = verdict.dominant_fraction,
                "rejected candidate, resampling"
            );
        }

        Err(MetricsError::DiversityNotSatisfied {
            index,
            attempts: self.config.max_attempts,
        })
    }

    /// Walk the table in order, handing every accepted image to `sink`.
    ///
    /// Indices that exhaust their attempts or fail in `sink` are recorded as
    /// skipped and the walk continues.
    pub fn run_with<R, F>(
        &self,
        table: &ParameterTable,
        rng: &mut R,
        mut sink: F,
    ) -> GenerationSummary
    where
        R: Rng + ?Sized,
        F: FnMut(&GeneratedImage) -> Result<Option<PathBuf>>,
    {
        let mut summary = GenerationSummary::default();
        for (index, seed) in table.iter() {
            match self.generate(index, seed, rng) {
                Ok(generated) => {
                    summary.attempts += u64::from(generated.attempts);
                    match sink(&generated) {
                        Ok(path) => {
                            summary.accepted += 1;
                            summary.written.extend(path);
                        }
                        Err(e) => {
                            warn!(index, error = %e, "failed to persist generated image");
                            summary.skipped.push(index);
                        }
                    }
                }
                Err(e) => {
                    summary.attempts += u64::from(self.config.max_attempts);
                    warn!(index, error = %e, "skipping sequence index");
                    summary.skipped.push(index);
                }
            }
        }
        info!(
            accepted = summary.accepted,
            skipped = summary.skipped.len(),
            attempts = summary.attempts,
            "generation finished"
        );
        summary
    }

    /// Generate the whole table into `out_dir` as `<token>.png`.
    pub fn run<R: Rng + ?Sized>(
        &self,
        table: &ParameterTable,
        rng: &mut R,
        out_dir: &Path,
        codec: &dyn ParameterCodec,
    ) -> Result<GenerationSummary> {
        std::fs::create_dir_all(out_dir)?;
        Ok(self.run_with(table, rng, |generated| {
            let path = out_dir.join(format!("{}.png", codec.encode(&generated.params)));
            store::save_image(&generated.image, &path)?;
            Ok(Some(path))
        }))
    }
}
