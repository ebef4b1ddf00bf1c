//! Configuration loaded from `watermark-unblend.toml`.
//!
//! Every section is optional; missing fields take their defaults.
//!
//! ```toml
//! [calibration]
//! small = "alpha-maps/bg-48.png"
//! large = "alpha-maps/bg-96.png"
//! policy = "alpha-channel"        # or "luminance"
//!
//! [placement]
//! fallback_margin = 32
//!
//! [[placement.tiers]]
//! min_dimension_exclusive = 1024
//! size = "large"
//! margin = 64
//!
//! [limits]
//! max_width = 16384
//! max_height = 16384
//! max_alloc = 536870912
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::alpha_map::{AssetSource, CalibrationPolicy, CalibrationSource};
use crate::error::{Error, Result};
use crate::placement::PlacementTable;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "watermark-unblend.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// `[calibration]` section.
    pub calibration: CalibrationConfig,
    /// `[placement]` section.
    pub placement: PlacementTable,
    /// `[limits]` section.
    pub limits: DecodeLimits,
}

/// Reference asset locations and calibration policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CalibrationConfig {
    /// Path to the 48x48 reference asset.
    pub small: PathBuf,
    /// Path to the 96x96 reference asset.
    pub large: PathBuf,
    /// How opacity is derived from the assets.
    pub policy: CalibrationPolicy,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            small: PathBuf::from("alpha-maps/bg-48.png"),
            large: PathBuf::from("alpha-maps/bg-96.png"),
            policy: CalibrationPolicy::default(),
        }
    }
}

impl CalibrationConfig {
    /// Turn the configured paths into a load source. Relative paths are
    /// resolved against `base`.
    #[must_use]
    pub fn source(&self, base: &Path) -> CalibrationSource {
        CalibrationSource {
            small: AssetSource::Path(base.join(&self.small)),
            large: AssetSource::Path(base.join(&self.large)),
            policy: self.policy,
        }
    }
}

/// Bounds applied while decoding caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecodeLimits {
    /// Maximum accepted width in pixels.
    pub max_width: u32,
    /// Maximum accepted height in pixels.
    pub max_height: u32,
    /// Maximum bytes the decoder may allocate.
    pub max_alloc: u64,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_width: 16384,
            max_height: 16384,
            max_alloc: 512 * 1024 * 1024,
        }
    }
}

impl DecodeLimits {
    /// The equivalent `image` crate limits.
    #[must_use]
    pub fn to_image_limits(self) -> image::Limits {
        let mut limits = image::Limits::default();
        limits.max_image_width = Some(self.max_width);
        limits.max_image_height = Some(self.max_height);
        limits.max_alloc = Some(self.max_alloc);
        limits
    }
}

impl Config {
    /// Parse and validate configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on a syntax error or an invalid value.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validated()
    }

    /// Read and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&text)
    }

    /// Load `path` if given, otherwise [`CONFIG_FILE`] if it exists, otherwise
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a file was found but is invalid.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(CONFIG_FILE).is_file() => Self::load(Path::new(CONFIG_FILE)),
            None => Ok(Self::default()),
        }
    }

    fn validated(mut self) -> Result<Self> {
        if self.limits.max_width == 0 || self.limits.max_height == 0 || self.limits.max_alloc == 0
        {
            return Err(Error::Config("limits must be non-zero".into()));
        }
        self.placement = self.placement.normalized()?;
        Ok(self)
    }
}
