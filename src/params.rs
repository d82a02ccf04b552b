//! Generation parameters and the seeded sampling table.
//!
//! A [`ParameterTable`] is drawn once up front from a seeded RNG and then
//! walked in order; each entry is consumed by exactly one generated image.

use crate::error::{MetricsError, Result};
use crate::escape::ViewWindow;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_TABLE_SIZE: usize = 500;

/// Reference frame the seed ranges were tuned for.
const REFERENCE_CX_SPAN: f64 = 1024.0;
const REFERENCE_CY_SPAN: f64 = 768.0;
const REFERENCE_WIDTH: f64 = 1024.0;
const REFERENCE_HEIGHT: f64 = 720.0;

/// Viewport parameters re-drawn on every generation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewParams {
    pub zoom: f64,
    pub max_iterations: u32,
    pub offset_x: f64,
    pub offset_y: f64,
}

/// Per-index seed tag drawn once into the table.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeedParams {
    pub zx: f64,
    pub zy: f64,
    pub cx: f64,
    pub cy: f64,
}

/// Full parameter set behind one generated image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub sequence_index: usize,
    pub zoom: f64,
    pub max_iterations: u32,
    pub offset_x: f64,
    pub offset_y: f64,
    pub seed_zx: f64,
    pub seed_zy: f64,
    pub seed_cx: f64,
    pub seed_cy: f64,
}

impl GenerationParameters {
    pub fn new(sequence_index: usize, seed: SeedParams, view: ViewParams) -> Self {
        Self {
            sequence_index,
            zoom: view.zoom,
            max_iterations: view.max_iterations,
            offset_x: view.offset_x,
            offset_y: view.offset_y,
            seed_zx: seed.zx,
            seed_zy: seed.zy,
            seed_cx: seed.cx,
            seed_cy: seed.cy,
        }
    }

    pub fn view(&self) -> ViewParams {
        ViewParams {
            zoom: self.zoom,
            max_iterations: self.max_iterations,
            offset_x: self.offset_x,
            offset_y: self.offset_y,
        }
    }

    pub fn seed(&self) -> SeedParams {
        SeedParams {
            zx: self.seed_zx,
            zy: self.seed_zy,
            cx: self.seed_cx,
            cy: self.seed_cy,
        }
    }

    pub fn view_window(&self, width: u32, height: u32) -> ViewWindow {
        ViewWindow {
            width,
            height,
            zoom: self.zoom,
            offset_x: self.offset_x,
            offset_y: self.offset_y,
            max_iterations: self.max_iterations,
        }
    }
}

/// Uniform sampling ranges for viewports and seeds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SamplingRanges {
    /// `max_iterations = base + step * k`, `k` in `0..=steps`
    pub max_iter_base: u32,
    pub max_iter_step: u32,
    pub max_iter_steps: u32,
    /// Offsets are drawn from `[-offset_limit, offset_limit]`
    pub offset_limit: f64,
    /// `zoom = base + step * k`, `k` in `0..=steps`
    pub zoom_base: f64,
    pub zoom_step: f64,
    pub zoom_steps: u32,
    /// Seed `z` components are drawn from `[-seed_z_limit, seed_z_limit]`
    pub seed_z_limit: f64,
}

impl Default for SamplingRanges {
    fn default() -> Self {
        Self {
            max_iter_base: 500,
            max_iter_step: 8,
            max_iter_steps: 90,
            offset_limit: 0.9998,
            zoom_base: 100_000.0,
            zoom_step: 1_000.0,
            zoom_steps: 43,
            seed_z_limit: 5.0,
        }
    }
}

impl SamplingRanges {
    pub fn validate(&self) -> Result<()> {
        if self.max_iter_base == 0 && self.max_iter_step == 0 {
            return Err(MetricsError::InvalidConfig(
                "iteration budget must be positive".to_string(),
            ));
        }
        let largest_budget = self
            .max_iter_step
            .checked_mul(self.max_iter_steps)
            .and_then(|span| span.checked_add(self.max_iter_base));
        if largest_budget.is_none() {
            return Err(MetricsError::InvalidConfig(format!(
                "iteration budget {} + {} * {} overflows u32",
                self.max_iter_base, self.max_iter_step, self.max_iter_steps
            )));
        }
        if !(self.offset_limit.is_finite() && self.offset_limit >= 0.0) {
            return Err(MetricsError::InvalidConfig(format!(
                "offset limit must be finite and non-negative, got {}",
                self.offset_limit
            )));
        }
        if !(self.zoom_base.is_finite() && self.zoom_base > 0.0 && self.zoom_step >= 0.0) {
            return Err(MetricsError::InvalidConfig(
                "zoom must be positive".to_string(),
            ));
        }
        if !(self.seed_z_limit.is_finite() && self.seed_z_limit >= 0.0) {
            return Err(MetricsError::InvalidConfig(
                "seed limit must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Draw a fresh viewport.
    pub fn sample_view<R: Rng + ?Sized>(&self, rng: &mut R) -> ViewParams {
        let iter_k = rng.gen_range(0..=self.max_iter_steps);
        let zoom_k = rng.gen_range(0..=self.zoom_steps);
        ViewParams {
            max_iterations: self.max_iter_base.saturating_add(self.max_iter_step.saturating_mul(iter_k)),
            offset_x: symmetric(rng, self.offset_limit),
            offset_y: symmetric(rng, self.offset_limit),
            zoom: self.zoom_base + self.zoom_step * f64::from(zoom_k),
        }
    }

    /// Draw a seed tag; the `c` spans scale with the image size.
    pub fn sample_seed<R: Rng + ?Sized>(&self, rng: &mut R, width: u32, height: u32) -> SeedParams {
        let cx_half = REFERENCE_CX_SPAN * f64::from(width) / REFERENCE_WIDTH / 2.0;
        let cy_half = REFERENCE_CY_SPAN * f64::from(height) / REFERENCE_HEIGHT / 2.0;
        SeedParams {
            zx: symmetric(rng, self.seed_z_limit),
            zy: symmetric(rng, self.seed_z_limit),
            cx: symmetric(rng, cx_half),
            cy: symmetric(rng, cy_half),
        }
    }
}

fn symmetric<R: Rng + ?Sized>(rng: &mut R, limit: f64) -> f64 {
    if limit == 0.0 {
        return 0.0;
    }
    rng.gen_range(-limit..=limit)
}

/// Source of the sampler's RNG state.
#[derive(Clone, Debug)]
pub enum SamplerSeed {
    Numeric(u64),
    /// SHA-256 of the passphrase becomes the RNG seed.
    Passphrase(String),
    Entropy,
}

impl SamplerSeed {
    pub fn rng(&self) -> StdRng {
        match self {
            SamplerSeed::Numeric(seed) => StdRng::seed_from_u64(*seed),
            SamplerSeed::Passphrase(passphrase) => {
                let mut hasher = Sha256::new();
                hasher.update(passphrase.as_bytes());
                let digest = hasher.finalize();
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&digest);
                StdRng::from_seed(seed)
            }
            SamplerSeed::Entropy => StdRng::from_entropy(),
        }
    }
}

/// Ordered seed tags, one per image to generate.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterTable {
    seeds: Vec<SeedParams>,
}

impl ParameterTable {
    pub fn sample<R: Rng + ?Sized>(
        size: usize,
        ranges: &SamplingRanges,
        width: u32,
        height: u32,
        rng: &mut R,
    ) -> Self {
        let seeds = (0..size)
            .map(|_| ranges.sample_seed(rng, width, height))
            .collect();
        Self { seeds }
    }

    pub fn from_seeds(seeds: Vec<SeedParams>) -> Self {
        Self { seeds }
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<SeedParams> {
        self.seeds.get(index).copied()
    }

    /// `(sequence_index, seed)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, SeedParams)> + '_ {
        self.seeds.iter().copied().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_sampling_ranges() {
        let ranges = SamplingRanges::default();
        let mut rng = SamplerSeed::Numeric(7).rng();
        for _ in 0..1000 {
            let v = ranges.sample_view(&mut rng);
            assert!((500..=1220).contains(&v.max_iterations));
            assert_eq!((v.max_iterations - 500) % 8, 0);
            assert!(v.offset_x.abs() <= 0.9998 && v.offset_y.abs() <= 0.9998);
            assert!((100_000.0..=143_000.0).contains(&v.zoom));
            assert_eq!(v.zoom % 1000.0, 0.0);
        }
    }

    #[test]
    fn test_seed_ranges_scale_with_size() {
        let ranges = SamplingRanges::default();
        let mut rng = SamplerSeed::Numeric(11).rng();
        for _ in 0..1000 {
            let s = ranges.sample_seed(&mut rng, 1024, 720);
            assert!(s.zx.abs() <= 5.0 && s.zy.abs() <= 5.0);
            assert!(s.cx.abs() <= 512.0);
            assert!(s.cy.abs() <= 384.0);
        }
        let small = ranges.sample_seed(&mut rng, 512, 360);
        assert!(small.cx.abs() <= 256.0 && small.cy.abs() <= 192.0);
    }

    #[test]
    fn test_table_is_reproducible() {
        let ranges = SamplingRanges::default();
        let a = ParameterTable::sample(50, &ranges, 1024, 720, &mut SamplerSeed::Numeric(3).rng());
        let b = ParameterTable::sample(50, &ranges, 1024, 720, &mut SamplerSeed::Numeric(3).rng());
        assert_eq!(a, b);
        assert_eq!(a.len(), 50);
        assert_eq!(a.iter().last().map(|(i, _)| i), Some(49));
    }

    #[test]
    fn test_passphrase_seed_is_stable() {
        let ranges = SamplingRanges::default();
        let a = ParameterTable::sample(5, &ranges, 64, 48, &mut SamplerSeed::Passphrase("key".into()).rng());
        let b = ParameterTable::sample(5, &ranges, 64, 48, &mut SamplerSeed::Passphrase("key".into()).rng());
        let c = ParameterTable::sample(5, &ranges, 64, 48, &mut SamplerSeed::Passphrase("other".into()).rng());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_parameters_split_back() {
        let seed = SeedParams { zx: 1.0, zy: -2.0, cx: 3.0, cy: -4.0 };
        let view = ViewParams { zoom: 100_000.0, max_iterations: 508, offset_x: 0.1, offset_y: -0.2 };
        let p = GenerationParameters::new(9, seed, view);
        assert_eq!(p.seed(), seed);
        assert_eq!(p.view(), view);
        assert_eq!(p.view_window(10, 20).max_iterations, 508);
    }

    #[test]
    fn test_invalid_ranges() {
        let ranges = SamplingRanges { offset_limit: f64::NAN, ..SamplingRanges::default() };
        assert!(ranges.validate().is_err());
        assert!(SamplingRanges::default().validate().is_ok());
    }

    #[test]
    fn test_iteration_budget_overflow_rejected() {
        let step_overflow = SamplingRanges { max_iter_step: u32::MAX, max_iter_steps: 2, ..SamplingRanges::default() };
        assert!(step_overflow.validate().is_err());

        let base_overflow = SamplingRanges {
            max_iter_base: u32::MAX,
            max_iter_step: 1,
            max_iter_steps: 1,
            ..SamplingRanges::default()
        };
        assert!(base_overflow.validate().is_err());

        // Largest budget exactly at the limit is fine.
        let at_limit = SamplingRanges {
            max_iter_base: u32::MAX - 10,
            max_iter_step: 5,
            max_iter_steps: 2,
            ..SamplingRanges::default()
        };
        assert!(at_limit.validate().is_ok());
        let view = at_limit.sample_view(&mut SamplerSeed::Numeric(3).rng());
        assert!(view.max_iterations >= u32::MAX - 10);
    }
}
