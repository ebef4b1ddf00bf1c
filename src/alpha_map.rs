//! Alpha map calibration from reference watermark captures.
//!
//! Each reference asset is a capture of the logo at one of the two known
//! footprints (48x48 and 96x96). It is reduced to a flat, row-major grid of
//! opacity values in `[0, 1]` according to a [`CalibrationPolicy`].

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::blending;
use crate::error::{Error, Result};
use crate::placement::{PlacementTable, WatermarkPlacement, WatermarkSize};

/// How opacity is derived from a reference asset.
///
/// The two policies are not equivalent and produce different output for the
/// same asset, so the choice is part of the calibration contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CalibrationPolicy {
    /// `alpha = A / 255`, using the asset's own transparency channel.
    ///
    /// Matches the bundled `bg-48.png`/`bg-96.png` references, which carry
    /// the logo opacity in their alpha channel.
    #[default]
    AlphaChannel,
    /// `alpha = max(R, G, B) / 255`, ignoring the asset's transparency.
    ///
    /// Matches an asset captured as the white logo rendered over black.
    Luminance,
}

impl fmt::Display for CalibrationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlphaChannel => f.write_str("alpha-channel"),
            Self::Luminance => f.write_str("luminance"),
        }
    }
}

/// Where a reference asset comes from.
#[derive(Debug, Clone)]
pub enum AssetSource {
    /// A PNG file on disk.
    Path(PathBuf),
    /// PNG bytes already in memory, with a label used in errors and logs.
    Bytes {
        /// Human-readable name.
        label: String,
        /// Encoded image data.
        data: Vec<u8>,
    },
}

impl AssetSource {
    /// Name used in log lines and [`Error::CalibrationLoad`].
    #[must_use]
    pub fn label(&self) -> Cow<'_, str> {
        match self {
            Self::Path(path) => path.to_string_lossy(),
            Self::Bytes { label, .. } => Cow::Borrowed(label),
        }
    }

    fn read(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            Self::Path(path) => std::fs::read(path)
                .map(Cow::Owned)
                .map_err(|e| Error::calibration(self.label(), e)),
            Self::Bytes { data, .. } => Ok(Cow::Borrowed(data)),
        }
    }
}

/// Everything needed to build an [`AlphaMaps`] pair.
#[derive(Debug, Clone)]
pub struct CalibrationSource {
    /// The 48x48 reference asset.
    pub small: AssetSource,
    /// The 96x96 reference asset.
    pub large: AssetSource,
    /// Opacity derivation policy applied to both assets.
    pub policy: CalibrationPolicy,
}

/// Immutable square grid of watermark opacities, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaMap {
    size: u32,
    values: Vec<f32>,
}

impl AlphaMap {
    /// Build a map from raw values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CalibrationLoad`] if `values` is not `size * size` long
    /// or contains a value outside `[0, 1]`.
    pub fn new(size: u32, values: Vec<f32>) -> Result<Self> {
        let expected = (size as usize) * (size as usize);
        if values.len() != expected {
            return Err(Error::calibration(
                "in-memory alpha map",
                format!("expected {expected} values, got {}", values.len()),
            ));
        }
        if let Some(bad) = values.iter().find(|v| !(0.0..=1.0).contains(*v)) {
            return Err(Error::calibration(
                "in-memory alpha map",
                format!("value {bad} outside [0, 1]"),
            ));
        }
        Ok(Self { size, values })
    }

    /// Decode a reference PNG and derive its opacity grid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CalibrationLoad`] if the data cannot be decoded or the
    /// image is not square.
    pub fn from_png(png_bytes: &[u8], policy: CalibrationPolicy) -> Result<Self> {
        let img = image::load_from_memory(png_bytes)
            .map_err(|e| Error::calibration("reference image", e))?
            .to_rgba8();
        Self::from_reference(&img, policy)
    }

    /// Derive an opacity grid from an already decoded reference image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CalibrationLoad`] if the image is not square.
    pub fn from_reference(img: &RgbaImage, policy: CalibrationPolicy) -> Result<Self> {
        let (width, height) = img.dimensions();
        if width != height {
            return Err(Error::calibration(
                "reference image",
                format!("reference must be square, got {width}x{height}"),
            ));
        }

        let values = img
            .pixels()
            .map(|pixel| match policy {
                CalibrationPolicy::AlphaChannel => f32::from(pixel[3]) / 255.0,
                CalibrationPolicy::Luminance => {
                    let r = f32::from(pixel[0]);
                    let g = f32::from(pixel[1]);
                    let b = f32::from(pixel[2]);
                    r.max(g).max(b) / 255.0
                }
            })
            .collect();

        Ok(Self {
            size: width,
            values,
        })
    }

    /// Side length in pixels.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Opacity at `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if `row` or `col` is not below [`AlphaMap::size`].
    #[must_use]
    pub fn get(&self, row: u32, col: u32) -> f32 {
        self.values[(row * self.size + col) as usize]
    }

    /// The flat row-major values.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// The calibrated pair of alpha maps shared by every transform call.
///
/// Holding an `AlphaMaps` means calibration succeeded; there is no
/// uncalibrated state for this type.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaMaps {
    small: AlphaMap,
    large: AlphaMap,
    policy: CalibrationPolicy,
}

impl AlphaMaps {
    /// Pair two maps, checking that each matches its expected footprint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CalibrationLoad`] on a dimension mismatch.
    pub fn new(small: AlphaMap, large: AlphaMap, policy: CalibrationPolicy) -> Result<Self> {
        check_size(&small, WatermarkSize::Small, "small alpha map")?;
        check_size(&large, WatermarkSize::Large, "large alpha map")?;
        Ok(Self {
            small,
            large,
            policy,
        })
    }

    /// Load both reference assets and derive their maps.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CalibrationLoad`] if either asset cannot be read,
    /// decoded, or has the wrong dimensions.
    pub fn load(source: &CalibrationSource) -> Result<Self> {
        let small = load_asset(&source.small, WatermarkSize::Small, source.policy)?;
        let large = load_asset(&source.large, WatermarkSize::Large, source.policy)?;
        info!(
            policy = %source.policy,
            small = %source.small.label(),
            large = %source.large.label(),
            "alpha maps loaded"
        );
        Ok(Self {
            small,
            large,
            policy: source.policy,
        })
    }

    /// The map for a watermark footprint.
    #[must_use]
    pub fn get(&self, size: WatermarkSize) -> &AlphaMap {
        match size {
            WatermarkSize::Small => &self.small,
            WatermarkSize::Large => &self.large,
        }
    }

    /// Policy the maps were derived with.
    #[must_use]
    pub fn policy(&self) -> CalibrationPolicy {
        self.policy
    }

    /// Return a copy of `image` with the watermark region reverse-blended.
    ///
    /// Pixels outside the placement box are copied through untouched. The
    /// transform is not idempotent: running it on its own output subtracts the
    /// logo a second time.
    #[must_use]
    pub fn remove_from_image(
        &self,
        image: &RgbaImage,
        table: &PlacementTable,
        force_size: Option<WatermarkSize>,
    ) -> RgbaImage {
        let placement = table.placement_for(image.width(), image.height(), force_size);
        self.remove_at(image, &placement)
    }

    /// Like [`AlphaMaps::remove_from_image`] with an explicit placement.
    #[must_use]
    pub fn remove_at(&self, image: &RgbaImage, placement: &WatermarkPlacement) -> RgbaImage {
        debug!(
            width = image.width(),
            height = image.height(),
            size = placement.size.side(),
            margin = placement.margin,
            origin_x = placement.origin_x,
            origin_y = placement.origin_y,
            "removing watermark"
        );

        let mut output = image.clone();
        blending::unblend_region(
            &mut output,
            self.get(placement.size),
            placement.origin_x,
            placement.origin_y,
        );
        output
    }
}

fn check_size(map: &AlphaMap, expected: WatermarkSize, asset: &str) -> Result<()> {
    let side = expected.side();
    if map.size() == side {
        Ok(())
    } else {
        Err(Error::calibration(
            asset,
            format!("expected {side}x{side}, got {0}x{0}", map.size()),
        ))
    }
}

fn load_asset(
    source: &AssetSource,
    expected: WatermarkSize,
    policy: CalibrationPolicy,
) -> Result<AlphaMap> {
    let bytes = source.read()?;
    let map = AlphaMap::from_png(&bytes, policy).map_err(|e| match e {
        Error::CalibrationLoad { reason, .. } => Error::calibration(source.label(), reason),
        other => other,
    })?;
    check_size(&map, expected, &source.label())?;
    Ok(map)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgba};

    use super::*;

    /// Encode a square reference PNG whose pixel at `(x, y)` is `f(x, y)`.
    pub(crate) fn reference_png(size: u32, f: impl Fn(u32, u32) -> Rgba<u8>) -> Vec<u8> {
        let img = RgbaImage::from_fn(size, size, f);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn gradient(x: u32, y: u32) -> Rgba<u8> {
        #[allow(clippy::cast_possible_truncation)]
        let v = ((x * 5 + y * 3) % 256) as u8;
        Rgba([v, v / 2, v / 3, 255 - v])
    }

    #[test]
    fn luminance_policy_uses_max_channel() {
        let png = reference_png(48, |_, _| Rgba([10, 200, 30, 0]));
        let map = AlphaMap::from_png(&png, CalibrationPolicy::Luminance).unwrap();
        assert_eq!(map.size(), 48);
        assert_eq!(map.values().len(), 48 * 48);
        assert!((map.get(0, 0) - 200.0 / 255.0).abs() < f32::EPSILON);
    }

    #[test]
    fn alpha_channel_policy_uses_transparency() {
        let png = reference_png(48, |_, _| Rgba([255, 255, 255, 51]));
        let map = AlphaMap::from_png(&png, CalibrationPolicy::AlphaChannel).unwrap();
        assert!((map.get(47, 47) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn default_policy_reads_the_alpha_channel() {
        let png = reference_png(48, |_, _| Rgba([0, 0, 0, 102]));
        let map = AlphaMap::from_png(&png, CalibrationPolicy::default()).unwrap();
        assert!((map.get(3, 7) - 0.4).abs() < 1e-6);
    }

    #[test]
    #[should_panic(expected = "index out of bounds")]
    fn get_panics_outside_the_grid() {
        let map = AlphaMap::new(2, vec![0.0; 4]).unwrap();
        let _ = map.get(2, 0);
    }

    #[test]
    fn policies_disagree_on_the_same_asset() {
        let png = reference_png(48, gradient);
        let a = AlphaMap::from_png(&png, CalibrationPolicy::AlphaChannel).unwrap();
        let b = AlphaMap::from_png(&png, CalibrationPolicy::Luminance).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn loading_twice_is_bit_identical() {
        let png = reference_png(96, gradient);
        let first = AlphaMap::from_png(&png, CalibrationPolicy::Luminance).unwrap();
        let second = AlphaMap::from_png(&png, CalibrationPolicy::Luminance).unwrap();
        let bits = |m: &AlphaMap| m.values().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&first), bits(&second));
    }

    #[test]
    fn values_stay_in_unit_range() {
        let png = reference_png(48, gradient);
        let map = AlphaMap::from_png(&png, CalibrationPolicy::Luminance).unwrap();
        assert!(map.values().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn non_square_reference_is_rejected() {
        let img = RgbaImage::new(48, 40);
        let err = AlphaMap::from_reference(&img, CalibrationPolicy::Luminance).unwrap_err();
        assert!(matches!(err, Error::CalibrationLoad { .. }));
    }

    #[test]
    fn new_validates_length_and_range() {
        assert!(AlphaMap::new(2, vec![0.0; 3]).is_err());
        assert!(AlphaMap::new(2, vec![0.0, 0.5, 1.0, 1.5]).is_err());
        assert!(AlphaMap::new(2, vec![0.0, 0.5, 1.0, 0.25]).is_ok());
    }

    #[test]
    fn pair_rejects_swapped_sizes() {
        let small = AlphaMap::new(48, vec![0.0; 48 * 48]).unwrap();
        let large = AlphaMap::new(96, vec![0.0; 96 * 96]).unwrap();
        let err =
            AlphaMaps::new(large.clone(), small.clone(), CalibrationPolicy::Luminance).unwrap_err();
        assert!(err.to_string().contains("expected 48x48"));
        assert!(AlphaMaps::new(small, large, CalibrationPolicy::Luminance).is_ok());
    }

    #[test]
    fn load_reports_the_failing_asset() {
        let source = CalibrationSource {
            small: AssetSource::Bytes {
                label: "bg-48.png".into(),
                data: reference_png(48, gradient),
            },
            large: AssetSource::Bytes {
                label: "bg-96.png".into(),
                data: reference_png(48, gradient),
            },
            policy: CalibrationPolicy::Luminance,
        };
        match AlphaMaps::load(&source).unwrap_err() {
            Error::CalibrationLoad { asset, reason } => {
                assert_eq!(asset, "bg-96.png");
                assert!(reason.contains("96x96"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_fails_on_missing_file() {
        let source = CalibrationSource {
            small: AssetSource::Path("/nonexistent/bg-48.png".into()),
            large: AssetSource::Path("/nonexistent/bg-96.png".into()),
            policy: CalibrationPolicy::AlphaChannel,
        };
        let err = AlphaMaps::load(&source).unwrap_err();
        assert!(err.to_string().contains("bg-48.png"));
    }
}
