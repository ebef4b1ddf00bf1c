//! Watermark size selection and placement.
//!
//! The logo footprint is assumed to scale in steps with image resolution and
//! to sit a fixed margin away from the bottom-right corner. The steps are a
//! table of tiers rather than constants so they can be tuned from
//! configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Watermark footprint classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkSize {
    /// 48x48 footprint.
    Small,
    /// 96x96 footprint.
    Large,
}

impl WatermarkSize {
    /// Side length in pixels.
    #[must_use]
    pub const fn side(self) -> u32 {
        match self {
            Self::Small => 48,
            Self::Large => 96,
        }
    }
}

/// One step of the size table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementTier {
    /// The tier applies when width or height is strictly greater than this.
    pub min_dimension_exclusive: u32,
    /// Footprint used by this tier.
    pub size: WatermarkSize,
    /// Distance from the right and bottom edges to the watermark box.
    pub margin: u32,
}

/// Where the watermark box sits inside one image.
///
/// Origins are signed: for images smaller than `size + margin` they are
/// negative and part of (or all of) the box lies outside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkPlacement {
    /// Footprint, selects the alpha map.
    pub size: WatermarkSize,
    /// Margin from the right and bottom edges.
    pub margin: u32,
    /// Column of the box's top-left corner.
    pub origin_x: i64,
    /// Row of the box's top-left corner.
    pub origin_y: i64,
}

/// Ordered tiers plus the fallback used when none match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlacementTable {
    /// Tiers, checked from the highest threshold down.
    pub tiers: Vec<PlacementTier>,
    /// Margin used with the small footprint when no tier matches.
    pub fallback_margin: u32,
}

impl Default for PlacementTable {
    fn default() -> Self {
        Self {
            tiers: vec![PlacementTier {
                min_dimension_exclusive: 1024,
                size: WatermarkSize::Large,
                margin: 64,
            }],
            fallback_margin: 32,
        }
    }
}

impl PlacementTable {
    /// Sort tiers so the highest threshold wins and reject degenerate tables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if two tiers share a threshold.
    pub fn normalized(mut self) -> Result<Self> {
        self.tiers
            .sort_by(|a, b| b.min_dimension_exclusive.cmp(&a.min_dimension_exclusive));
        if let Some(pair) = self
            .tiers
            .windows(2)
            .find(|w| w[0].min_dimension_exclusive == w[1].min_dimension_exclusive)
        {
            return Err(Error::Config(format!(
                "duplicate placement tier threshold {}",
                pair[0].min_dimension_exclusive
            )));
        }
        Ok(self)
    }

    /// Footprint for the given dimensions.
    ///
    /// - **Large** (96x96, 64px margin): width OR height > 1024
    /// - **Small** (48x48, 32px margin): otherwise, including exactly 1024x1024
    #[must_use]
    pub fn size_for(&self, width: u32, height: u32) -> WatermarkSize {
        self.tier_for(width, height).0
    }

    fn tier_for(&self, width: u32, height: u32) -> (WatermarkSize, u32) {
        self.tiers
            .iter()
            .find(|t| width > t.min_dimension_exclusive || height > t.min_dimension_exclusive)
            .map_or((WatermarkSize::Small, self.fallback_margin), |t| {
                (t.size, t.margin)
            })
    }

    /// Margin paired with a footprint when the size is forced.
    fn margin_for(&self, size: WatermarkSize) -> u32 {
        match self.tiers.iter().find(|t| t.size == size) {
            Some(tier) => tier.margin,
            None if size == WatermarkSize::Small => self.fallback_margin,
            None => 64,
        }
    }

    /// Compute the watermark box for an image.
    ///
    /// `force_size` overrides tier selection but keeps the margin that goes
    /// with the forced footprint.
    #[must_use]
    pub fn placement_for(
        &self,
        width: u32,
        height: u32,
        force_size: Option<WatermarkSize>,
    ) -> WatermarkPlacement {
        let (size, margin) = match force_size {
            Some(size) => (size, self.margin_for(size)),
            None => self.tier_for(width, height),
        };
        let inset = i64::from(margin) + i64::from(size.side());
        WatermarkPlacement {
            size,
            margin,
            origin_x: i64::from(width) - inset,
            origin_y: i64::from(height) - inset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_below_or_at_threshold() {
        let table = PlacementTable::default();
        assert_eq!(table.size_for(1000, 800), WatermarkSize::Small);
        assert_eq!(table.size_for(1024, 1024), WatermarkSize::Small);
        assert_eq!(table.size_for(200, 200), WatermarkSize::Small);
    }

    #[test]
    fn large_when_either_dimension_exceeds_threshold() {
        let table = PlacementTable::default();
        assert_eq!(table.size_for(1200, 900), WatermarkSize::Large);
        assert_eq!(table.size_for(1025, 10), WatermarkSize::Large);
        assert_eq!(table.size_for(10, 1025), WatermarkSize::Large);
    }

    #[test]
    fn placement_anchors_bottom_right() {
        let table = PlacementTable::default();

        let p = table.placement_for(1000, 800, None);
        assert_eq!(p.size, WatermarkSize::Small);
        assert_eq!(p.margin, 32);
        assert_eq!((p.origin_x, p.origin_y), (1000 - 32 - 48, 800 - 32 - 48));

        let p = table.placement_for(1200, 900, None);
        assert_eq!(p.size, WatermarkSize::Large);
        assert_eq!(p.margin, 64);
        assert_eq!((p.origin_x, p.origin_y), (1200 - 64 - 96, 900 - 64 - 96));
    }

    #[test]
    fn placement_goes_negative_for_tiny_images() {
        let p = PlacementTable::default().placement_for(2, 2, None);
        assert_eq!((p.origin_x, p.origin_y), (-78, -78));
    }

    #[test]
    fn forced_size_keeps_its_margin() {
        let table = PlacementTable::default();
        let p = table.placement_for(500, 500, Some(WatermarkSize::Large));
        assert_eq!(p.size, WatermarkSize::Large);
        assert_eq!(p.margin, 64);

        let p = table.placement_for(2000, 2000, Some(WatermarkSize::Small));
        assert_eq!(p.margin, 32);
    }

    #[test]
    fn normalized_orders_tiers_and_rejects_duplicates() {
        let table = PlacementTable {
            tiers: vec![
                PlacementTier {
                    min_dimension_exclusive: 512,
                    size: WatermarkSize::Small,
                    margin: 40,
                },
                PlacementTier {
                    min_dimension_exclusive: 2048,
                    size: WatermarkSize::Large,
                    margin: 80,
                },
            ],
            fallback_margin: 16,
        }
        .normalized()
        .unwrap();
        assert_eq!(table.tiers[0].min_dimension_exclusive, 2048);
        assert_eq!(table.placement_for(3000, 100, None).margin, 80);
        assert_eq!(table.placement_for(1000, 100, None).margin, 40);
        assert_eq!(table.placement_for(100, 100, None).margin, 16);

        let dup = PlacementTable {
            tiers: vec![table.tiers[0], table.tiers[0]],
            fallback_margin: 32,
        };
        assert!(matches!(dup.normalized(), Err(Error::Config(_))));
    }
}
