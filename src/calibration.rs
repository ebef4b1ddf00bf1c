//! Process-wide holder for the calibrated alpha maps.
//!
//! Reads are lock-free through `arc-swap`. Loads are serialized by a mutex so
//! concurrent first callers trigger a single load, and an explicit
//! [`CalibrationStore::reload`] replaces the maps atomically.

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwapOption;
use tracing::{debug, warn};

use crate::alpha_map::{AlphaMaps, CalibrationSource};
use crate::error::{Error, Result};

/// Shared calibration state.
#[derive(Default)]
pub struct CalibrationStore {
    maps: ArcSwapOption<AlphaMaps>,
    load_lock: Mutex<()>,
}

impl CalibrationStore {
    /// An empty store. Every transform fails with [`Error::Uncalibrated`]
    /// until a load succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that is already calibrated.
    #[must_use]
    pub fn with_maps(maps: AlphaMaps) -> Self {
        let store = Self::new();
        store.maps.store(Some(Arc::new(maps)));
        store
    }

    /// The current maps.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Uncalibrated`] if no load has succeeded yet.
    pub fn current(&self) -> Result<Arc<AlphaMaps>> {
        self.maps.load_full().ok_or(Error::Uncalibrated)
    }

    /// Whether a load has succeeded.
    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.maps.load().is_some()
    }

    /// Return the current maps, loading them from `source` on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CalibrationLoad`] if the load fails; the store stays
    /// uncalibrated and the next call tries again.
    pub fn get_or_load(&self, source: &CalibrationSource) -> Result<Arc<AlphaMaps>> {
        if let Some(maps) = self.maps.load_full() {
            return Ok(maps);
        }

        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have finished loading while we waited.
        if let Some(maps) = self.maps.load_full() {
            debug!("alpha maps loaded by a concurrent caller");
            return Ok(maps);
        }

        let maps = Arc::new(AlphaMaps::load(source)?);
        self.maps.store(Some(Arc::clone(&maps)));
        Ok(maps)
    }

    /// Load the maps again from `source` and swap them in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CalibrationLoad`] if the load fails. The previous maps,
    /// if any, stay in place.
    pub fn reload(&self, source: &CalibrationSource) -> Result<Arc<AlphaMaps>> {
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match AlphaMaps::load(source) {
            Ok(maps) => {
                let maps = Arc::new(maps);
                self.maps.store(Some(Arc::clone(&maps)));
                Ok(maps)
            }
            Err(e) => {
                warn!(error = %e, calibrated = self.is_calibrated(), "alpha map reload failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use image::Rgba;

    use super::*;
    use crate::alpha_map::tests::reference_png;
    use crate::alpha_map::{AssetSource, CalibrationPolicy};
    use crate::placement::WatermarkSize;

    fn source(value: u8) -> CalibrationSource {
        CalibrationSource {
            small: AssetSource::Bytes {
                label: "small".into(),
                data: reference_png(48, |_, _| Rgba([value, value, value, 255])),
            },
            large: AssetSource::Bytes {
                label: "large".into(),
                data: reference_png(96, |_, _| Rgba([value, value, value, 255])),
            },
            policy: CalibrationPolicy::Luminance,
        }
    }

    fn broken_source() -> CalibrationSource {
        CalibrationSource {
            small: AssetSource::Bytes {
                label: "small".into(),
                data: b"garbage".to_vec(),
            },
            ..source(0)
        }
    }

    #[test]
    fn empty_store_is_uncalibrated() {
        let store = CalibrationStore::new();
        assert!(!store.is_calibrated());
        assert!(matches!(store.current(), Err(Error::Uncalibrated)));
    }

    #[test]
    fn get_or_load_loads_once() {
        let store = CalibrationStore::new();
        let first = store.get_or_load(&source(51)).unwrap();
        // A different source is ignored once calibrated.
        let second = store.get_or_load(&source(102)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!((second.get(WatermarkSize::Small).get(0, 0) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn concurrent_first_callers_share_one_load() {
        let store = Arc::new(CalibrationStore::new());
        let src = source(51);
        let loaded: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| store.get_or_load(&src).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(loaded.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn failed_load_leaves_store_uncalibrated() {
        let store = CalibrationStore::new();
        let err = store.get_or_load(&broken_source()).unwrap_err();
        assert!(matches!(err, Error::CalibrationLoad { .. }));
        assert!(matches!(store.current(), Err(Error::Uncalibrated)));
    }

    #[test]
    fn reload_replaces_and_keeps_previous_on_failure() {
        let store = CalibrationStore::new();
        let first = store.get_or_load(&source(51)).unwrap();
        let second = store.reload(&source(102)).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!((store.current().unwrap().get(WatermarkSize::Large).get(5, 5) - 0.4).abs() < 1e-6);

        assert!(store.reload(&broken_source()).is_err());
        assert!(Arc::ptr_eq(&store.current().unwrap(), &second));
    }
}
