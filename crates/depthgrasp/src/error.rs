//! Error types for grasp planning.

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error returned by scoring-model implementations.
pub type ModelError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while preparing inputs or consuming model output.
///
/// Unmeasurable depth or tilt is not an error: it is reported as NaN and the
/// safety checker rejects the candidate. Running out of candidates is not an
/// error either: it is `Ok(None)` or the end of the candidate iterator.
#[derive(Debug, Error)]
pub enum GraspError {
    /// The image does not carry 3 color channels plus a depth channel.
    #[error("image must have 4 channels (3 color + depth), got {0}")]
    ChannelCount(u8),

    /// Raw pixel data does not match the declared dimensions.
    #[error("pixel buffer holds {got} values, expected {expected}")]
    BufferSize {
        /// Values required by `width * height * 4`.
        expected: usize,
        /// Values provided.
        got: usize,
    },

    /// Pixel size is zero, negative or not finite.
    #[error("invalid pixel size {0} (must be finite and > 0)")]
    InvalidPixelSize(f64),

    /// Depth range is empty, inverted or not finite.
    #[error("invalid depth range [{min}, {max}] (need finite min < max)")]
    InvalidDepthRange {
        /// Depth mapped to the full-scale channel value.
        min: f64,
        /// Depth mapped to a zero channel value.
        max: f64,
    },

    /// A requested crop or result size is not positive.
    #[error("invalid area size {width}x{height} (sizes must be finite and > 0)")]
    InvalidAreaSize {
        /// Requested width in pixels.
        width: f64,
        /// Requested height in pixels.
        height: f64,
    },

    /// Horizontal and vertical crop scales differ.
    #[error("anisotropic area scale: {scale_x} horizontally vs {scale_y} vertically")]
    AnisotropicScale {
        /// `result_width / cropped_width`.
        scale_x: f64,
        /// `result_height / cropped_height`.
        scale_y: f64,
    },

    /// The workspace polygon has too few corners.
    #[error("workspace boundary needs at least 3 corners, got {0}")]
    TooFewCorners(usize),

    /// The workspace polygon does not lie in one plane of constant height.
    #[error("workspace boundary is not planar (heights span {0} m)")]
    NonPlanarBoundary(f64),

    /// The orientation set is empty or contains the ambiguous yaw 0.
    #[error("invalid orientation set: {0}")]
    InvalidOrientations(String),

    /// The gripper's stroke interval or finger thickness is unusable.
    #[error("invalid gripper: {0}")]
    InvalidGripper(String),

    /// A selection method was configured with unusable parameters.
    #[error("invalid selection method: {0}")]
    InvalidSelection(String),

    /// Model output does not match the views it was given.
    #[error("model output shape mismatch for {tensor}: expected {expected:?}, got {got:?}")]
    ModelShape {
        /// Which tensor was malformed (`reward` or `action`).
        tensor: &'static str,
        /// Expected shape (0 marks a free axis).
        expected: Vec<usize>,
        /// Shape returned by the model.
        got: Vec<usize>,
    },

    /// The stroke table does not match the stroke axis of the reward tensor.
    #[error("stroke table has {table} entries but the reward tensor has {tensor} stroke bins")]
    StrokeTable {
        /// Entries in the model's stroke table.
        table: usize,
        /// Size of the reward tensor's last axis.
        tensor: usize,
    },

    /// The scoring model itself failed.
    #[error("scoring model failed: {0}")]
    Model(#[source] ModelError),

    /// Reading a description or configuration file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("invalid JSON in {path}: {source}")]
    Json {
        /// File that failed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for grasp-planning operations.
pub type Result<T> = std::result::Result<T, GraspError>;

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|source| GraspError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| GraspError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offending_value() {
        let err = GraspError::ChannelCount(1);
        assert_eq!(
            format!("{err}"),
            "image must have 4 channels (3 color + depth), got 1"
        );

        let err = GraspError::InvalidAreaSize {
            width: 0.0,
            height: 12.0,
        };
        assert!(format!("{err}").contains("0x12"));
    }

    #[test]
    fn missing_json_file_reports_path() {
        let path = std::path::Path::new("/nonexistent/depthgrasp/model.json");
        let err = read_json::<serde_json::Value>(path).unwrap_err();
        assert!(matches!(err, GraspError::Io { .. }));
        assert!(format!("{err}").contains("model.json"));
    }
}
