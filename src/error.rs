//! Error types for the watermark-unblend crate.

/// Errors that can occur during calibration and watermark removal.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A reference asset could not be read, decoded, or has the wrong size.
    #[error("failed to load calibration asset {asset}: {reason}")]
    CalibrationLoad {
        /// Which asset failed (path or label).
        asset: String,
        /// What went wrong.
        reason: String,
    },

    /// The input bytes are not a decodable image.
    #[error("failed to decode input image: {0}")]
    Decode(image::ImageError),

    /// A transform was requested before calibration succeeded.
    #[error("alpha maps are not loaded; calibration must succeed before processing")]
    Uncalibrated,

    /// The processed image could not be encoded.
    #[error("failed to encode output image: {0}")]
    Encode(image::ImageError),

    /// The configuration file is unreadable or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
}

impl Error {
    pub(crate) fn calibration(asset: impl Into<String>, reason: impl ToString) -> Self {
        Self::CalibrationLoad {
            asset: asset.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the failure is the caller's fault (malformed input) rather than
    /// a server-side problem.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::UnsupportedFormat(_))
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
