//! Averaging metrics over image collections.
//!
//! Two averaging policies exist and are kept apart on purpose:
//! [`average_pairwise`] compares plain image `i` with transformed image `i`,
//! while [`average_combinatorial`] compares every unordered pair inside one
//! set. [`average_metric`] picks the policy from the metric's family.
//!
//! Comparisons fan out over rayon; results are folded in input order so the
//! averages do not depend on scheduling. A failing comparison is logged and
//! left out of the average.

use crate::error::{MetricsError, Result};
use crate::metrics::{
    histogram_variance, neighbor_correlation, MetricFamily, MetricKind, MetricResult,
};
use crate::pixel::PixelAccessor;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Average of one metric plus how it was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BatchAverage {
    pub kind: MetricKind,
    pub value: f64,
    /// Comparisons that contributed to `value`.
    pub comparisons: usize,
    /// Comparisons that failed and were left out.
    pub failures: usize,
}

/// Name used in results and logs: the image's own label, else `#<index>`.
fn label_of<A: PixelAccessor + ?Sized>(image: &A, index: usize) -> String {
    image
        .label()
        .map(str::to_string)
        .unwrap_or_else(|| format!("#{index}"))
}

/// One comparison's outcome with the names of both images.
struct Compared {
    left: String,
    right: String,
    result: Result<MetricResult>,
}

fn compare_labeled<A, B>(kind: MetricKind, (i, a): (usize, &A), (j, b): (usize, &B)) -> Compared
where
    A: PixelAccessor + ?Sized,
    B: PixelAccessor + ?Sized,
{
    let left = label_of(a, i);
    let right = label_of(b, j);
    let result = MetricResult::pair(kind, (left.as_str(), a), (right.as_str(), b));
    Compared {
        left,
        right,
        result,
    }
}

fn fold_average(kind: MetricKind, compared: Vec<Compared>, context: &'static str) -> Result<BatchAverage> {
    let mut sum = 0.0;
    let mut comparisons = 0;
    let mut failures = 0;
    for Compared { left, right, result } in compared {
        match result {
            Ok(metric) => {
                sum += metric.value;
                comparisons += 1;
            }
            Err(e) => {
                warn!(metric = %kind, %left, %right, error = %e, "comparison skipped");
                failures += 1;
            }
        }
    }
    if comparisons == 0 {
        return Err(MetricsError::EmptyBatch(context));
    }
    let average = BatchAverage {
        kind,
        value: sum / comparisons as f64,
        comparisons,
        failures,
    };
    info!(metric = %kind, value = average.value, comparisons, failures, "batch average");
    Ok(average)
}

/// Average `kind` over index-aligned pairs `(plain[i], transformed[i])`.
pub fn average_pairwise<A, B>(plain: &[A], transformed: &[B], kind: MetricKind) -> Result<BatchAverage>
where
    A: PixelAccessor + Sync,
    B: PixelAccessor + Sync,
{
    let n = plain.len().min(transformed.len());
    let compared = (0..n)
        .into_par_iter()
        .map(|i| compare_labeled(kind, (i, &plain[i]), (i, &transformed[i])))
        .collect();
    fold_average(kind, compared, "aligned pairs")
}

/// Unordered index pairs `(i, j)` with `i < j < n`.
pub fn all_pairs(n: usize) -> Vec<(usize, usize)> {
    (0..n)
        .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
        .collect()
}

fn average_over_pairs<A>(
    images: &[A],
    pairs: &[(usize, usize)],
    kind: MetricKind,
    context: &'static str,
) -> Result<BatchAverage>
where
    A: PixelAccessor + Sync,
{
    let compared = pairs
        .par_iter()
        .map(|&(i, j)| compare_labeled(kind, (i, &images[i]), (j, &images[j])))
        .collect();
    fold_average(kind, compared, context)
}

/// Average `kind` over all `n(n-1)/2` unordered pairs within `images`.
pub fn average_combinatorial<A>(images: &[A], kind: MetricKind) -> Result<BatchAverage>
where
    A: PixelAccessor + Sync,
{
    average_over_pairs(images, &all_pairs(images.len()), kind, "unordered pairs")
}

/// Average with the policy matching `kind`: aligned kinds compare `plain`
/// against `transformed`, diffusion kinds compare pairs within `transformed`.
pub fn average_metric<A, B>(plain: &[A], transformed: &[B], kind: MetricKind) -> Result<BatchAverage>
where
    A: PixelAccessor + Sync,
    B: PixelAccessor + Sync,
{
    match kind.family() {
        MetricFamily::Aligned => average_pairwise(plain, transformed, kind),
        MetricFamily::Combinatorial => average_combinatorial(transformed, kind),
        MetricFamily::SingleImage => Err(MetricsError::InvalidConfig(format!(
            "{kind} is averaged with average_neighbor_and_variance"
        ))),
    }
}

/// Mean neighbor correlations and histogram variance over a set.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TextureSummary {
    pub rh: f64,
    pub rv: f64,
    pub rd: f64,
    pub d: f64,
    pub images: usize,
}

/// Rh, Rv, Rd and D of one image, in that order.
fn texture_results<A: PixelAccessor + ?Sized>(image: &A, index: usize) -> [MetricResult; 4] {
    let name = label_of(image, index);
    let nc = neighbor_correlation(image);
    [
        MetricResult::single(MetricKind::NeighborHorizontal, &name, nc.rh),
        MetricResult::single(MetricKind::NeighborVertical, &name, nc.rv),
        MetricResult::single(MetricKind::NeighborDiagonal, &name, nc.rd),
        MetricResult::single(MetricKind::HistogramVariance, &name, histogram_variance(image)),
    ]
}

pub fn average_neighbor_and_variance<A>(images: &[A]) -> Result<TextureSummary>
where
    A: PixelAccessor + Sync,
{
    if images.is_empty() {
        return Err(MetricsError::EmptyBatch("texture statistics"));
    }
    let per_image: Vec<[MetricResult; 4]> = images
        .par_iter()
        .enumerate()
        .map(|(i, img)| texture_results(img, i))
        .collect();

    let mut sums = [0.0; 4];
    for results in &per_image {
        for (sum, result) in sums.iter_mut().zip(results) {
            *sum += result.value;
        }
    }
    let n = per_image.len() as f64;
    let summary = TextureSummary {
        rh: sums[0] / n,
        rv: sums[1] / n,
        rd: sums[2] / n,
        d: sums[3] / n,
        images: per_image.len(),
    };
    info!(images = summary.images, rh = summary.rh, rv = summary.rv, rd = summary.rd, d = summary.d, "texture averages");
    Ok(summary)
}

/// Mean similarity between generated images sampled on a stride.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SimilaritySummary {
    pub ssim: f64,
    pub pearson: f64,
    pub pixel_match: f64,
    pub comparisons: usize,
}

/// Compare images `i` and `j` for `i` and `j > i` both advancing by `stride`.
///
/// Used to check that fractal images drawn from different parameters do not
/// resemble each other.
pub fn sampled_similarity<A>(images: &[A], stride: usize) -> Result<SimilaritySummary>
where
    A: PixelAccessor + Sync,
{
    if stride == 0 {
        return Err(MetricsError::InvalidConfig("stride must be positive".to_string()));
    }
    let n = images.len();
    let pairs: Vec<(usize, usize)> = (0..n)
        .step_by(stride)
        .flat_map(|i| (i + 1..n).step_by(stride).map(move |j| (i, j)))
        .collect();

    let kinds = [MetricKind::Ssim, MetricKind::Pearson, MetricKind::PixelMatch];
    let mut averages = Vec::with_capacity(kinds.len());
    for kind in kinds {
        averages.push(average_over_pairs(images, &pairs, kind, "sampled pairs")?);
    }

    Ok(SimilaritySummary {
        ssim: averages[0].value,
        pearson: averages[1].value,
        pixel_match: averages[2].value,
        comparisons: averages[0].comparisons,
    })
}

/// Full analysis of a plain set against its transformed counterpart.
///
/// Entries that cannot be computed (for instance all-pairs metrics over a
/// single image) are left empty instead of failing the whole report.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SuiteReport {
    pub plain_images: usize,
    pub cipher_images: usize,
    pub pearson: Option<BatchAverage>,
    pub ssim: Option<BatchAverage>,
    pub pixel_match: Option<BatchAverage>,
    pub texture: Option<TextureSummary>,
    pub uaci: Option<BatchAverage>,
    pub npcr: Option<BatchAverage>,
    pub nfc: Option<BatchAverage>,
}

impl SuiteReport {
    pub fn evaluate<A, B>(plain: &[A], cipher: &[B]) -> Self
    where
        A: PixelAccessor + Sync,
        B: PixelAccessor + Sync,
    {
        let metric = |kind: MetricKind| match average_metric(plain, cipher, kind) {
            Ok(avg) => Some(avg),
            Err(e) => {
                warn!(metric = %kind, error = %e, "metric unavailable");
                None
            }
        };
        let texture = match average_neighbor_and_variance(cipher) {
            Ok(t) => Some(t),
            Err(e) => {
                warn!(error = %e, "texture statistics unavailable");
                None
            }
        };

        Self {
            plain_images: plain.len(),
            cipher_images: cipher.len(),
            pearson: metric(MetricKind::Pearson),
            ssim: metric(MetricKind::Ssim),
            pixel_match: metric(MetricKind::PixelMatch),
            texture,
            uaci: metric(MetricKind::Uaci),
            npcr: metric(MetricKind::Npcr),
            nfc: metric(MetricKind::Nfc),
        }
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = |f: &mut fmt::Formatter<'_>, label: &str, avg: &Option<BatchAverage>| match avg {
            Some(a) => writeln!(f, "{label:<40} {:>12.6}  ({} comparisons)", a.value, a.comparisons),
            None => writeln!(f, "{label:<40} {:>12}", "n/a"),
        };
        writeln!(f, "Plain images: {}, cipher images: {}", self.plain_images, self.cipher_images)?;
        line(f, "Mean R (plain vs cipher)", &self.pearson)?;
        line(f, "Mean SSIM (plain vs cipher)", &self.ssim)?;
        line(f, "Mean matching pixels % (plain vs cipher)", &self.pixel_match)?;
        match &self.texture {
            Some(t) => {
                writeln!(f, "{:<40} {:>12.6}", "Mean Rh (cipher)", t.rh)?;
                writeln!(f, "{:<40} {:>12.6}", "Mean Rv (cipher)", t.rv)?;
                writeln!(f, "{:<40} {:>12.6}", "Mean Rd (cipher)", t.rd)?;
                writeln!(f, "{:<40} {:>12.6}", "Mean D (cipher)", t.d)?;
            }
            None => writeln!(f, "{:<40} {:>12}", "Mean Rh/Rv/Rd/D (cipher)", "n/a")?,
        }
        line(f, "Mean UACI (cipher pairs)", &self.uaci)?;
        line(f, "Mean NPCR (cipher pairs)", &self.npcr)?;
        line(f, "Mean NFC (cipher pairs)", &self.nfc)
    }
}
