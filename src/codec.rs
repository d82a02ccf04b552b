//! Filename tokens carrying generation parameters.
//!
//! Two token families exist side by side:
//!
//! - view tokens: `i=<index>_ZOOM=<zoom>_MAX_ITER=<max>_offsetX=<x>_offsetY=<y>`
//! - seed tokens: `i=<index>_zx=<zx>_zy=<zy>_cx=<cx>_cy=<cy>`
//!
//! Decimal fields may use either `.` or `,` as separator; decoding accepts both.

use crate::error::{MetricsError, Result};
use crate::params::{GenerationParameters, SeedParams, ViewParams};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const NUMBER: &str = r"-?\d+(?:[.,]\d+)?";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DecimalSeparator {
    #[default]
    Point,
    Comma,
}

impl DecimalSeparator {
    fn format(self, value: f64, precision: usize) -> String {
        let text = format!("{value:.precision$}");
        match self {
            DecimalSeparator::Point => text,
            DecimalSeparator::Comma => text.replace('.', ","),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecVersion {
    View,
    Seed,
}

impl CodecVersion {
    pub fn codec(self, separator: DecimalSeparator) -> Box<dyn ParameterCodec> {
        match self {
            CodecVersion::View => Box::new(ViewCodec::new(separator)),
            CodecVersion::Seed => Box::new(SeedCodec::new(separator)),
        }
    }

    /// Which token family `name` carries, if any.
    pub fn detect(name: &str) -> Option<CodecVersion> {
        if view_pattern().is_match(name) {
            Some(CodecVersion::View)
        } else if seed_pattern().is_match(name) {
            Some(CodecVersion::Seed)
        } else {
            None
        }
    }
}

/// Parameters recovered from a filename.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "codec", rename_all = "snake_case")]
pub enum DecodedName {
    View { index: usize, view: ViewParams },
    Seed { index: usize, seed: SeedParams },
}

impl DecodedName {
    pub fn index(&self) -> usize {
        match self {
            DecodedName::View { index, .. } | DecodedName::Seed { index, .. } => *index,
        }
    }

    /// True when every decoded field agrees with `params` within `tolerance`.
    pub fn matches(&self, params: &GenerationParameters, tolerance: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= tolerance;
        match self {
            DecodedName::View { index, view } => {
                *index == params.sequence_index
                    && view.max_iterations == params.max_iterations
                    && close(view.zoom, params.zoom)
                    && close(view.offset_x, params.offset_x)
                    && close(view.offset_y, params.offset_y)
            }
            DecodedName::Seed { index, seed } => {
                *index == params.sequence_index
                    && close(seed.zx, params.seed_zx)
                    && close(seed.zy, params.seed_zy)
                    && close(seed.cx, params.seed_cx)
                    && close(seed.cy, params.seed_cy)
            }
        }
    }
}

pub trait ParameterCodec: Send + Sync {
    fn version(&self) -> CodecVersion;

    /// Filename token, without extension.
    fn encode(&self, params: &GenerationParameters) -> String;

    fn decode(&self, name: &str) -> Result<DecodedName>;
}

/// Decode with whichever codec recognizes `name`.
pub fn decode_any(name: &str) -> Result<DecodedName> {
    match CodecVersion::detect(name) {
        Some(version) => version.codec(DecimalSeparator::default()).decode(name),
        None => Err(MetricsError::MalformedFilename(name.to_string())),
    }
}

fn view_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(
            r"\bi=(\d+)_ZOOM=({NUMBER})_MAX_ITER=({NUMBER})_offsetX=({NUMBER})_offsetY=({NUMBER})"
        ))
        .expect("view token pattern is valid")
    })
}

fn seed_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(&format!(
            r"\bi=(\d+)_zx=({NUMBER})_zy=({NUMBER})_cx=({NUMBER})_cy=({NUMBER})"
        ))
        .expect("seed token pattern is valid")
    })
}

fn parse_decimal(field: &str, name: &str) -> Result<f64> {
    field
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|_| MetricsError::MalformedFilename(name.to_string()))
}

fn parse_index(field: &str, name: &str) -> Result<usize> {
    field
        .parse::<usize>()
        .map_err(|_| MetricsError::MalformedFilename(name.to_string()))
}

/// Encodes the viewport (zoom, iteration budget, offsets).
#[derive(Clone, Debug)]
pub struct ViewCodec {
    separator: DecimalSeparator,
    precision: usize,
}

impl ViewCodec {
    pub fn new(separator: DecimalSeparator) -> Self {
        Self {
            separator,
            precision: 2,
        }
    }

    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }
}

impl ParameterCodec for ViewCodec {
    fn version(&self) -> CodecVersion {
        CodecVersion::View
    }

    fn encode(&self, params: &GenerationParameters) -> String {
        let fmt = |v: f64| self.separator.format(v, self.precision);
        format!(
            "i={}_ZOOM={}_MAX_ITER={}_offsetX={}_offsetY={}",
            params.sequence_index,
            fmt(params.zoom),
            params.max_iterations,
            fmt(params.offset_x),
            fmt(params.offset_y),
        )
    }

    fn decode(&self, name: &str) -> Result<DecodedName> {
        let caps = view_pattern()
            .captures(name)
            .ok_or_else(|| MetricsError::MalformedFilename(name.to_string()))?;

        // Older tokens wrote the budget as a decimal ("1000,00").
        let max_iter = parse_decimal(&caps[3], name)?;
        if max_iter < 0.0 || max_iter.fract() != 0.0 || max_iter > f64::from(u32::MAX) {
            return Err(MetricsError::MalformedFilename(name.to_string()));
        }

        Ok(DecodedName::View {
            index: parse_index(&caps[1], name)?,
            view: ViewParams {
                zoom: parse_decimal(&caps[2], name)?,
                max_iterations: max_iter as u32,
                offset_x: parse_decimal(&caps[4], name)?,
                offset_y: parse_decimal(&caps[5], name)?,
            },
        })
    }
}

/// Encodes the seed tag (`zx`, `zy`, `cx`, `cy`).
#[derive(Clone, Debug)]
pub struct SeedCodec {
    separator: DecimalSeparator,
    precision: usize,
}

impl SeedCodec {
    pub fn new(separator: DecimalSeparator) -> Self {
        Self {
            separator,
            precision: 4,
        }
    }

    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }
}

impl ParameterCodec for SeedCodec {
    fn version(&self) -> CodecVersion {
        CodecVersion::Seed
    }

    fn encode(&self, params: &GenerationParameters) -> String {
        let fmt = |v: f64| self.separator.format(v, self.precision);
        format!(
            "i={}_zx={}_zy={}_cx={}_cy={}",
            params.sequence_index,
            fmt(params.seed_zx),
            fmt(params.seed_zy),
            fmt(params.seed_cx),
            fmt(params.seed_cy),
        )
    }

    fn decode(&self, name: &str) -> Result<DecodedName> {
        let caps = seed_pattern()
            .captures(name)
            .ok_or_else(|| MetricsError::MalformedFilename(name.to_string()))?;
        Ok(DecodedName::Seed {
            index: parse_index(&caps[1], name)?,
            seed: SeedParams {
                zx: parse_decimal(&caps[2], name)?,
                zy: parse_decimal(&caps[3], name)?,
                cx: parse_decimal(&caps[4], name)?,
                cy: parse_decimal(&caps[5], name)?,
            },
        })
    }
}
