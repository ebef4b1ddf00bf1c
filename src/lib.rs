//! Remove a known semi-transparent logo overlay via reverse alpha blending.
//!
//! The logo is composited as `watermarked = original * (1 - alpha) + 255 * alpha`
//! with a per-pixel `alpha` captured in two reference assets (48x48 and 96x96).
//! This crate calibrates those assets into alpha maps once, then inverts the
//! blend inside the watermark box of each input image.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use watermark_unblend::{CalibrationStore, Config, RemoverOptions, WatermarkRemover};
//!
//! let config = Config::default();
//! let store = Arc::new(CalibrationStore::new());
//! store
//!     .get_or_load(&config.calibration.source(Path::new(".")))
//!     .expect("calibration assets must load");
//!
//! let remover = WatermarkRemover::new(store, RemoverOptions::from(&config));
//! let bytes = std::fs::read("photo.png").unwrap();
//! let cleaned = remover.remove_watermark(&bytes).unwrap();
//! std::fs::write("cleaned.png", cleaned.png).unwrap();
//! ```
//!
//! # Placement
//!
//! The footprint is chosen from image dimensions: 96x96 with a 64px margin
//! when width or height exceeds 1024, otherwise 48x48 with a 32px margin. The
//! box is anchored to the bottom-right corner. This is a convention, not a
//! detector; see [`PlacementTable`] to tune it.

#![deny(missing_docs)]

pub mod alpha_map;
pub mod blending;
mod calibration;
pub mod config;
mod engine;
pub mod error;
pub mod placement;

pub use alpha_map::{AlphaMap, AlphaMaps, AssetSource, CalibrationPolicy, CalibrationSource};
pub use calibration::CalibrationStore;
pub use config::Config;
pub use engine::{
    batch_output_name, decode_image, default_output_path, encode_png, is_supported_image,
    ProcessResult, ProcessedImage, RemoverOptions, WatermarkRemover,
};
pub use error::{Error, Result};
pub use placement::{PlacementTable, PlacementTier, WatermarkPlacement, WatermarkSize};
