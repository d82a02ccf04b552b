use thiserror::Error;

/// Errors raised by generation, persistence and metric computation.
///
/// None of these are fatal to a batch: callers log the failing item and move on.
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("File operation error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Dimension mismatch: {}x{} vs {}x{}", left.0, left.1, right.0, right.1)]
    DimensionMismatch { left: (u32, u32), right: (u32, u32) },

    #[error("Region {width}x{height} at ({x}, {y}) exceeds {image_width}x{image_height} image")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("Pixel buffer size mismatch: expected {expected}, got {got}")]
    BufferSize { expected: usize, got: usize },

    #[error("Filename does not carry generation parameters: {0}")]
    MalformedFilename(String),

    #[error("Could not satisfy diversity criteria for index {index} after {attempts} attempts")]
    DiversityNotSatisfied { index: usize, attempts: u32 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No comparisons available for {0}")]
    EmptyBatch(&'static str),
}

impl MetricsError {
    /// Compare two `(width, height)` pairs, failing with [`MetricsError::DimensionMismatch`].
    pub fn check_dimensions(left: (u32, u32), right: (u32, u32)) -> Result<()> {
        if left != right {
            return Err(MetricsError::DimensionMismatch { left, right });
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, MetricsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_check() {
        assert!(MetricsError::check_dimensions((4, 4), (4, 4)).is_ok());
        let err = MetricsError::check_dimensions((4, 4), (4, 5)).unwrap_err();
        assert_eq!(err.to_string(), "Dimension mismatch: 4x4 vs 4x5");
    }
}
