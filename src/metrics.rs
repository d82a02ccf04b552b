//! Randomness and diffusion metrics over packed-RGB images.
//!
//! Intensity-based metrics read the red channel only. Exact-match metrics
//! (pixel match, NPCR, NFC, histogram) compare the full packed color.
//! Pairwise metrics fail with [`MetricsError::DimensionMismatch`] on
//! differently sized inputs. Zero-variance inputs yield 0 instead of NaN,
//! and so do empty images.

use crate::error::{MetricsError, Result};
use crate::pixel::{red, PixelAccessor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// SSIM stabilizers for 8-bit data: `(0.01 * 255)^2` and `(0.03 * 255)^2`.
pub const SSIM_C1: f64 = 6.5025;
pub const SSIM_C2: f64 = 58.5225;

const PACKED_BITS: f64 = 32.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Pearson,
    Ssim,
    PixelMatch,
    NeighborHorizontal,
    NeighborVertical,
    NeighborDiagonal,
    HistogramVariance,
    Uaci,
    Npcr,
    Nfc,
}

/// How a metric is averaged over image collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricFamily {
    /// Plain image `i` against transformed image `i`.
    Aligned,
    /// Every unordered pair within the transformed set.
    Combinatorial,
    /// One image at a time.
    SingleImage,
}

impl MetricKind {
    pub const PAIRWISE: [MetricKind; 6] = [
        MetricKind::Pearson,
        MetricKind::Ssim,
        MetricKind::PixelMatch,
        MetricKind::Uaci,
        MetricKind::Npcr,
        MetricKind::Nfc,
    ];

    pub fn family(self) -> MetricFamily {
        match self {
            MetricKind::Pearson | MetricKind::Ssim | MetricKind::PixelMatch => MetricFamily::Aligned,
            MetricKind::Uaci | MetricKind::Npcr | MetricKind::Nfc => MetricFamily::Combinatorial,
            MetricKind::NeighborHorizontal
            | MetricKind::NeighborVertical
            | MetricKind::NeighborDiagonal
            | MetricKind::HistogramVariance => MetricFamily::SingleImage,
        }
    }

    /// Evaluate a pairwise metric.
    pub fn compare<A, B>(self, a: &A, b: &B) -> Result<f64>
    where
        A: PixelAccessor + ?Sized,
        B: PixelAccessor + ?Sized,
    {
        match self {
            MetricKind::Pearson => pearson(a, b),
            MetricKind::Ssim => ssim(a, b),
            MetricKind::PixelMatch => pixel_match(a, b),
            MetricKind::Uaci => uaci(a, b),
            MetricKind::Npcr => npcr(a, b),
            MetricKind::Nfc => nfc(a, b),
            single => Err(MetricsError::InvalidConfig(format!(
                "{single} is a single-image metric"
            ))),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::Pearson => "Pearson",
            MetricKind::Ssim => "SSIM",
            MetricKind::PixelMatch => "PixelMatch%",
            MetricKind::NeighborHorizontal => "Rh",
            MetricKind::NeighborVertical => "Rv",
            MetricKind::NeighborDiagonal => "Rd",
            MetricKind::HistogramVariance => "D",
            MetricKind::Uaci => "UACI",
            MetricKind::Npcr => "NPCR",
            MetricKind::Nfc => "NFC",
        };
        f.write_str(name)
    }
}

/// One metric value plus the images it was computed from.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricResult {
    pub kind: MetricKind,
    pub value: f64,
    pub left: String,
    pub right: Option<String>,
}

impl MetricResult {
    pub fn pair<A, B>(kind: MetricKind, left: (&str, &A), right: (&str, &B)) -> Result<Self>
    where
        A: PixelAccessor + ?Sized,
        B: PixelAccessor + ?Sized,
    {
        let value = kind.compare(left.1, right.1)?;
        debug!(metric = %kind, left = left.0, right = right.0, value, "compared");
        Ok(Self {
            kind,
            value,
            left: left.0.to_string(),
            right: Some(right.0.to_string()),
        })
    }

    /// A single-image statistic such as Rh or D.
    pub fn single(kind: MetricKind, image: &str, value: f64) -> Self {
        debug!(metric = %kind, image, value, "measured");
        Self {
            kind,
            value,
            left: image.to_string(),
            right: None,
        }
    }
}

fn paired<A, B>(a: &A, b: &B) -> Result<(Vec<u32>, Vec<u32>)>
where
    A: PixelAccessor + ?Sized,
    B: PixelAccessor + ?Sized,
{
    MetricsError::check_dimensions(a.dimensions(), b.dimensions())?;
    Ok((a.packed_pixels(), b.packed_pixels()))
}

/// Sample correlation of red intensities.
///
/// Sums are kept in exact integer arithmetic so that constant images are
/// detected reliably and reported as 0.
pub fn pearson<A, B>(a: &A, b: &B) -> Result<f64>
where
    A: PixelAccessor + ?Sized,
    B: PixelAccessor + ?Sized,
{
    let (pa, pb) = paired(a, b)?;
    let n = pa.len() as i128;
    if n == 0 {
        return Ok(0.0);
    }

    let (mut sx, mut sy, mut sxx, mut syy, mut sxy) = (0i128, 0i128, 0i128, 0i128, 0i128);
    for (&p, &q) in pa.iter().zip(pb.iter()) {
        let x = i128::from(red(p));
        let y = i128::from(red(q));
        sx += x;
        sy += y;
        sxx += x * x;
        syy += y * y;
        sxy += x * y;
    }

    let var_x = n * sxx - sx * sx;
    let var_y = n * syy - sy * sy;
    if var_x == 0 || var_y == 0 {
        return Ok(0.0);
    }
    let cov = n * sxy - sx * sy;
    Ok(cov as f64 / ((var_x as f64) * (var_y as f64)).sqrt())
}

/// Global SSIM of the red channel.
///
/// Unlike canonical SSIM this uses a single window spanning the whole image:
/// means, variances and covariance are taken over all pixels at once.
pub fn ssim<A, B>(a: &A, b: &B) -> Result<f64>
where
    A: PixelAccessor + ?Sized,
    B: PixelAccessor + ?Sized,
{
    let (pa, pb) = paired(a, b)?;
    if pa.is_empty() {
        return Ok(0.0);
    }
    let n = pa.len() as f64;

    let (sum_x, sum_y) = pa
        .iter()
        .zip(pb.iter())
        .fold((0.0, 0.0), |(sx, sy), (&p, &q)| {
            (sx + f64::from(red(p)), sy + f64::from(red(q)))
        });
    let mean_x = sum_x / n;
    let mean_y = sum_y / n;

    let (mut var_x, mut var_y, mut cov) = (0.0, 0.0, 0.0);
    for (&p, &q) in pa.iter().zip(pb.iter()) {
        let dx = f64::from(red(p)) - mean_x;
        let dy = f64::from(red(q)) - mean_y;
        var_x += dx * dx;
        var_y += dy * dy;
        cov += dx * dy;
    }
    var_x /= n;
    var_y /= n;
    cov /= n;

    let numerator = (2.0 * mean_x * mean_y + SSIM_C1) * (2.0 * cov + SSIM_C2);
    let denominator = (mean_x * mean_x + mean_y * mean_y + SSIM_C1) * (var_x + var_y + SSIM_C2);
    Ok(numerator / denominator)
}

/// Percentage of positions with identical packed color.
pub fn pixel_match<A, B>(a: &A, b: &B) -> Result<f64>
where
    A: PixelAccessor + ?Sized,
    B: PixelAccessor + ?Sized,
{
    let (pa, pb) = paired(a, b)?;
    if pa.is_empty() {
        return Ok(0.0);
    }
    let matches = pa.iter().zip(pb.iter()).filter(|(p, q)| p == q).count();
    Ok(matches as f64 / pa.len() as f64 * 100.0)
}

/// True when every packed pixel agrees.
pub fn identical<A, B>(a: &A, b: &B) -> Result<bool>
where
    A: PixelAccessor + ?Sized,
    B: PixelAccessor + ?Sized,
{
    let (pa, pb) = paired(a, b)?;
    Ok(pa == pb)
}

/// Adjacent-pixel correlation coefficients of one image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NeighborCorrelation {
    pub rh: f64,
    pub rv: f64,
    pub rd: f64,
}

/// Correlation of each red value with its right, lower and lower-right
/// neighbor over the `(width - 1) x (height - 1)` interior, normalized by the
/// red channel's global variance.
pub fn neighbor_correlation<A: PixelAccessor + ?Sized>(image: &A) -> NeighborCorrelation {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    if w < 2 || h < 2 {
        return NeighborCorrelation::default();
    }
    let reds: Vec<u64> = image
        .packed_pixels()
        .into_iter()
        .map(|p| u64::from(red(p)))
        .collect();

    let total = reds.len() as u128;
    let sum: u128 = reds.iter().map(|&r| u128::from(r)).sum();
    let sum_sq: u128 = reds.iter().map(|&r| u128::from(r * r)).sum();
    let var_scaled = total * sum_sq - sum * sum;
    if var_scaled == 0 {
        return NeighborCorrelation::default();
    }
    let mean = sum as f64 / total as f64;
    let variance = var_scaled as f64 / (total as f64 * total as f64);

    let (mut sum_h, mut sum_v, mut sum_d) = (0u64, 0u64, 0u64);
    for y in 0..h - 1 {
        let row = y * w;
        let below = row + w;
        for x in 0..w - 1 {
            let r = reds[row + x];
            sum_h += r * reds[row + x + 1];
            sum_v += r * reds[below + x];
            sum_d += r * reds[below + x + 1];
        }
    }

    let n = ((w - 1) * (h - 1)) as f64;
    let mean_sq = mean * mean;
    NeighborCorrelation {
        rh: (sum_h as f64 / n - mean_sq) / variance,
        rv: (sum_v as f64 / n - mean_sq) / variance,
        rd: (sum_d as f64 / n - mean_sq) / variance,
    }
}

/// Variance of per-color occurrence counts, divided by the pixel count.
pub fn histogram_variance<A: PixelAccessor + ?Sized>(image: &A) -> f64 {
    let pixels = image.packed_pixels();
    if pixels.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<u32, u64> = HashMap::new();
    for p in &pixels {
        *counts.entry(*p).or_insert(0) += 1;
    }
    let total = pixels.len() as f64;
    let mean = total / counts.len() as f64;
    let spread: f64 = counts
        .values()
        .map(|&c| {
            let d = c as f64 - mean;
            d * d
        })
        .sum();
    spread / total
}

/// Mean absolute red difference as a percentage of 255.
pub fn uaci<A, B>(a: &A, b: &B) -> Result<f64>
where
    A: PixelAccessor + ?Sized,
    B: PixelAccessor + ?Sized,
{
    let (pa, pb) = paired(a, b)?;
    if pa.is_empty() {
        return Ok(0.0);
    }
    let sum: u64 = pa
        .iter()
        .zip(pb.iter())
        .map(|(&p, &q)| u64::from(red(p).abs_diff(red(q))))
        .sum();
    Ok(sum as f64 / (255.0 * pa.len() as f64) * 100.0)
}

/// Percentage of positions whose packed colors differ.
pub fn npcr<A, B>(a: &A, b: &B) -> Result<f64>
where
    A: PixelAccessor + ?Sized,
    B: PixelAccessor + ?Sized,
{
    let (pa, pb) = paired(a, b)?;
    if pa.is_empty() {
        return Ok(0.0);
    }
    let changed = pa.iter().zip(pb.iter()).filter(|(p, q)| p != q).count();
    Ok(changed as f64 / pa.len() as f64 * 100.0)
}

/// Percentage of differing bits across all 32 bits of the packed colors.
pub fn nfc<A, B>(a: &A, b: &B) -> Result<f64>
where
    A: PixelAccessor + ?Sized,
    B: PixelAccessor + ?Sized,
{
    let (pa, pb) = paired(a, b)?;
    if pa.is_empty() {
        return Ok(0.0);
    }
    let bits: u64 = pa
        .iter()
        .zip(pb.iter())
        .map(|(&p, &q)| u64::from((p ^ q).count_ones()))
        .sum();
    Ok(bits as f64 / (PACKED_BITS * pa.len() as f64) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::{pack_rgb, PackedImage};
    use proptest::prelude::*;

    const BLACK: u32 = 0;
    const WHITE: u32 = 0x00FF_FFFF;

    fn gradient(width: u32, height: u32) -> PackedImage {
        let pixels = (0..width * height)
            .map(|i| pack_rgb([(i * 7 % 256) as u8, (i % 13) as u8, (i / 3 % 256) as u8]))
            .collect();
        PackedImage::from_pixels(width, height, pixels).unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_self_comparison() {
        let a = gradient(16, 9);
        assert_eq!(npcr(&a, &a).unwrap(), 0.0);
        assert_eq!(uaci(&a, &a).unwrap(), 0.0);
        assert_eq!(nfc(&a, &a).unwrap(), 0.0);
        assert_eq!(pixel_match(&a, &a).unwrap(), 100.0);
        assert!(close(pearson(&a, &a).unwrap(), 1.0));
        assert!(close(ssim(&a, &a).unwrap(), 1.0));
        assert!(identical(&a, &a).unwrap());
    }

    #[test]
    fn test_black_versus_white() {
        let black = PackedImage::filled(4, 4, BLACK);
        let white = PackedImage::filled(4, 4, WHITE);
        assert_eq!(npcr(&black, &black).unwrap(), 0.0);
        assert_eq!(uaci(&black, &black).unwrap(), 0.0);
        assert_eq!(npcr(&black, &white).unwrap(), 100.0);
        assert_eq!(uaci(&black, &white).unwrap(), 100.0);
        // 24 of 32 bits flip.
        assert!(close(nfc(&black, &white).unwrap(), 75.0));
        assert!(!identical(&black, &white).unwrap());
    }

    #[test]
    fn test_single_pixel_red_change() {
        let a = PackedImage::filled(4, 4, pack_rgb([10, 20, 30]));
        let mut b = a.clone();
        b.set_pixel(2, 1, pack_rgb([138, 20, 30]));
        assert!(close(npcr(&a, &b).unwrap(), 6.25));
        let expected = 128.0 / 255.0 / 16.0 * 100.0;
        assert!(close(uaci(&a, &b).unwrap(), expected));
        assert!((uaci(&a, &b).unwrap() - 3.14).abs() < 0.01);
    }

    #[test]
    fn test_degenerate_variance_is_zero() {
        let flat = PackedImage::filled(5, 5, pack_rgb([90, 0, 0]));
        let other = gradient(5, 5);
        assert_eq!(pearson(&flat, &other).unwrap(), 0.0);
        assert_eq!(neighbor_correlation(&flat), NeighborCorrelation::default());
        assert_eq!(pearson(&flat, &flat).unwrap(), 0.0);
    }

    #[test]
    fn test_pearson_anticorrelated() {
        let a = PackedImage::from_pixels(4, 1, vec![
            pack_rgb([0, 0, 0]),
            pack_rgb([50, 0, 0]),
            pack_rgb([100, 0, 0]),
            pack_rgb([150, 0, 0]),
        ])
        .unwrap();
        let b = PackedImage::from_pixels(4, 1, vec![
            pack_rgb([150, 0, 0]),
            pack_rgb([100, 0, 0]),
            pack_rgb([50, 0, 0]),
            pack_rgb([0, 0, 0]),
        ])
        .unwrap();
        assert!(close(pearson(&a, &b).unwrap(), -1.0));
    }

    #[test]
    fn test_ssim_constants_only_for_flat_images() {
        // Both flat at zero: (C1 * C2) / (C1 * C2).
        let black = PackedImage::filled(3, 3, BLACK);
        assert!(close(ssim(&black, &black).unwrap(), 1.0));
        let white = PackedImage::filled(3, 3, WHITE);
        let expected = SSIM_C1 / (255.0 * 255.0 + SSIM_C1);
        assert!(close(ssim(&black, &white).unwrap(), expected));
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = PackedImage::new(4, 4);
        let b = PackedImage::new(4, 5);
        for kind in MetricKind::PAIRWISE {
            assert!(matches!(
                kind.compare(&a, &b),
                Err(MetricsError::DimensionMismatch { .. })
            ));
        }
        assert!(identical(&a, &b).is_err());
    }

    #[test]
    fn test_single_image_kind_refused_for_pairs() {
        let a = PackedImage::new(2, 2);
        assert!(MetricKind::HistogramVariance.compare(&a, &a).is_err());
    }

    #[test]
    fn test_neighbor_correlation_of_smooth_ramp() {
        // Red is 30 * x on an 8x8 grid: global mean 105, variance 4725.
        // Interior (x < 7) products: E[r(x) r(x+1)] = 14400, E[r(x)^2] = 11700.
        let pixels = (0..64u32).map(|i| pack_rgb([(i % 8 * 30) as u8, 0, 0])).collect();
        let ramp = PackedImage::from_pixels(8, 8, pixels).unwrap();
        let nc = neighbor_correlation(&ramp);
        assert!(close(nc.rh, (14400.0 - 11025.0) / 4725.0));
        assert!(close(nc.rv, (11700.0 - 11025.0) / 4725.0));
        assert!(close(nc.rd, nc.rh));
    }

    #[test]
    fn test_histogram_variance() {
        // Counts {3, 1} -> mean 2, squared deviations 1 + 1, over 4 pixels.
        let img = PackedImage::from_pixels(2, 2, vec![1, 1, 1, 2]).unwrap();
        assert!(close(histogram_variance(&img), 0.5));
        // A single color: count equals the mean.
        assert_eq!(histogram_variance(&PackedImage::filled(3, 3, 7)), 0.0);
    }

    #[test]
    fn test_empty_images_are_zero() {
        let empty = PackedImage::new(0, 0);
        for kind in MetricKind::PAIRWISE {
            assert_eq!(kind.compare(&empty, &empty).unwrap(), 0.0);
        }
        assert_eq!(histogram_variance(&empty), 0.0);
    }

    #[test]
    fn test_metric_result_tags_images() {
        let a = gradient(4, 4);
        let r = MetricResult::pair(MetricKind::Npcr, ("a.png", &a), ("b.png", &a)).unwrap();
        assert_eq!(r.value, 0.0);
        assert_eq!(r.left, "a.png");
        assert_eq!(r.right.as_deref(), Some("b.png"));

        let d = MetricResult::single(MetricKind::HistogramVariance, "a.png", histogram_variance(&a));
        assert_eq!(d.left, "a.png");
        assert!(d.right.is_none());
    }

    proptest! {
        #[test]
        fn prop_symmetry(
            a in proptest::collection::vec(0u32..0x0100_0000, 36),
            b in proptest::collection::vec(0u32..0x0100_0000, 36),
        ) {
            let a = PackedImage::from_pixels(6, 6, a).unwrap();
            let b = PackedImage::from_pixels(6, 6, b).unwrap();
            prop_assert_eq!(npcr(&a, &b).unwrap(), npcr(&b, &a).unwrap());
            prop_assert_eq!(uaci(&a, &b).unwrap(), uaci(&b, &a).unwrap());
            prop_assert_eq!(nfc(&a, &b).unwrap(), nfc(&b, &a).unwrap());
            prop_assert_eq!(pearson(&a, &b).unwrap(), pearson(&b, &a).unwrap());
            let p = pearson(&a, &b).unwrap();
            prop_assert!(p.is_finite() && (-1.0 - 1e-9..=1.0 + 1e-9).contains(&p));
        }
    }
}
