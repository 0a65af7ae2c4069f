//! Fixed card layout.
//!
//! A [`RenderSpec`] is resolved once from configuration and handed to the
//! compositor unchanged for every item. Nothing in here is tuned per item.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LayoutError, LayoutResult};
use crate::content::DEFAULT_CATEGORY;

/// Canvas width of a vertical 9:16 reel.
pub const REEL_WIDTH: u32 = 1080;
/// Canvas height of a vertical 9:16 reel.
pub const REEL_HEIGHT: u32 = 1920;

/// Font family alias used for headlines.
pub const HEADLINE_FAMILY: &str = "headline";
/// Font family alias used for the category label and signature.
pub const LABEL_FAMILY: &str = "label";

/// An RGB triple.
pub type Rgb8 = [u8; 3];

/// A pixel rectangle on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Create a new rectangle.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Shrink by `padding` on every side, never below zero size.
    pub fn inset(&self, padding: u32) -> Rect {
        let pad_x = padding.min(self.width / 2);
        let pad_y = padding.min(self.height / 2);
        Rect::new(
            self.x + pad_x,
            self.y + pad_y,
            self.width - 2 * pad_x,
            self.height - 2 * pad_y,
        )
    }

    /// True when the two rectangles share at least one pixel.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// True when this rectangle lies fully inside a `width` x `height` canvas.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0 && self.height > 0 && self.right() <= width && self.bottom() <= height
    }
}

/// What a region is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionRole {
    Photo,
    Label,
    Headline,
    Signature,
}

impl RegionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionRole::Photo => "photo",
            RegionRole::Label => "label",
            RegionRole::Headline => "headline",
            RegionRole::Signature => "signature",
        }
    }
}

impl fmt::Display for RegionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typography of a text region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    /// Font family alias registered with the text engine
    pub font_family: String,
    /// Largest size tried (px)
    pub max_size: f32,
    /// Smallest size tried (px)
    pub min_size: f32,
    /// Decrement between candidate sizes (px)
    pub size_step: f32,
    /// Text color
    pub color: Rgb8,
    /// Multiplier applied to ascent + descent
    pub line_spacing: f32,
    /// Maximum number of wrapped lines
    pub max_lines: usize,
    /// Inner padding between the region edge and the text box
    pub padding: u32,
    /// Upper-case the text before fitting
    #[serde(default)]
    pub uppercase: bool,
}

impl TextStyle {
    /// A style with a single fixed size.
    pub fn fixed(font_family: impl Into<String>, size: f32, color: Rgb8) -> Self {
        Self {
            font_family: font_family.into(),
            max_size: size,
            min_size: size,
            size_step: 1.0,
            color,
            line_spacing: 1.0,
            max_lines: 1,
            padding: 0,
            uppercase: false,
        }
    }
}

/// A fixed rectangular region of the card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub role: RegionRole,
    pub rect: Rect,
    /// Solid fill painted before any content
    #[serde(default)]
    pub fill: Option<Rgb8>,
    /// Text style; `None` for the photo region
    #[serde(default)]
    pub text: Option<TextStyle>,
}

/// Where the transparent brand mark goes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayAnchor {
    /// Horizontal center of the mark
    pub center_x: u32,
    /// Bottom edge of the mark
    pub bottom_y: u32,
    /// The mark is scaled down (never up) to this width
    pub max_width: u32,
}

/// Immutable description of the card layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSpec {
    pub width: u32,
    pub height: u32,
    /// Canvas fill under everything
    pub background: Rgb8,
    /// Regions in paint order
    pub regions: Vec<Region>,
    /// Placement of the optional brand mark
    #[serde(default)]
    pub overlay: Option<OverlayAnchor>,
    /// Fill used when the source photo is missing or unreadable
    pub placeholder: Rgb8,
    /// Label used when an item has no category
    pub default_category: String,
    /// Fixed signature drawn in the signature region
    pub signature: String,
    /// Character budget for the last-resort headline truncation
    pub char_budget: usize,
}

impl RenderSpec {
    /// The stock 1080x1920 reel card: photo on top, filled category bar,
    /// headline box and a signature line at the bottom.
    pub fn reel_card() -> Self {
        let photo_h = REEL_HEIGHT / 2;
        let bar_h = 260;
        let box_h = 520;
        let headline_y = photo_h + bar_h;

        Self {
            width: REEL_WIDTH,
            height: REEL_HEIGHT,
            background: [0, 0, 0],
            regions: vec![
                Region {
                    role: RegionRole::Photo,
                    rect: Rect::new(0, 0, REEL_WIDTH, photo_h),
                    fill: None,
                    text: None,
                },
                Region {
                    role: RegionRole::Label,
                    rect: Rect::new(0, photo_h, REEL_WIDTH, bar_h),
                    fill: Some([229, 0, 0]),
                    text: Some(TextStyle {
                        font_family: LABEL_FAMILY.to_string(),
                        max_size: 58.0,
                        min_size: 30.0,
                        size_step: 2.0,
                        color: [255, 255, 255],
                        line_spacing: 1.0,
                        max_lines: 1,
                        padding: 36,
                        uppercase: true,
                    }),
                },
                Region {
                    role: RegionRole::Headline,
                    rect: Rect::new(0, headline_y, REEL_WIDTH, box_h),
                    fill: Some([255, 255, 255]),
                    text: Some(TextStyle {
                        font_family: HEADLINE_FAMILY.to_string(),
                        max_size: 64.0,
                        min_size: 42.0,
                        size_step: 2.0,
                        color: [0, 0, 0],
                        line_spacing: 1.05,
                        max_lines: 6,
                        padding: 36,
                        uppercase: false,
                    }),
                },
                Region {
                    role: RegionRole::Signature,
                    rect: Rect::new(0, REEL_HEIGHT - 140, REEL_WIDTH, 100),
                    fill: None,
                    text: Some(TextStyle::fixed(LABEL_FAMILY, 42.0, [255, 255, 255])),
                },
            ],
            overlay: Some(OverlayAnchor {
                center_x: REEL_WIDTH / 2,
                bottom_y: photo_h - 90,
                max_width: 300,
            }),
            placeholder: [20, 20, 20],
            default_category: DEFAULT_CATEGORY.to_string(),
            signature: "@autoreels".to_string(),
            char_budget: 120,
        }
    }

    /// Replace the signature text.
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Find the region with the given role.
    pub fn region(&self, role: RegionRole) -> Option<&Region> {
        self.regions.iter().find(|r| r.role == role)
    }

    /// Find a region or report it missing.
    pub fn require_region(&self, role: RegionRole) -> LayoutResult<&Region> {
        self.region(role)
            .ok_or_else(|| LayoutError::MissingRegion(role.to_string()))
    }

    /// Check the geometry invariants: every region inside the canvas, text
    /// regions pairwise disjoint, and text styles self-consistent.
    pub fn validate(&self) -> LayoutResult<()> {
        self.require_region(RegionRole::Photo)?;
        self.require_region(RegionRole::Headline)?;

        for region in &self.regions {
            if !region.rect.fits_within(self.width, self.height) {
                return Err(LayoutError::OutOfCanvas {
                    role: region.role.to_string(),
                    width: self.width,
                    height: self.height,
                });
            }
            if let Some(style) = &region.text {
                validate_style(region.role, style)?;
            }
        }

        let text_regions: Vec<&Region> =
            self.regions.iter().filter(|r| r.text.is_some()).collect();
        for (i, a) in text_regions.iter().enumerate() {
            for b in &text_regions[i + 1..] {
                if a.rect.intersects(&b.rect) {
                    return Err(LayoutError::Overlap(
                        a.role.to_string(),
                        b.role.to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

impl Default for RenderSpec {
    fn default() -> Self {
        Self::reel_card()
    }
}

/// Smallest font size step a text style may use.
pub const MIN_SIZE_STEP: f32 = 0.1;

fn validate_style(role: RegionRole, style: &TextStyle) -> LayoutResult<()> {
    let invalid = |reason: &str| LayoutError::InvalidStyle {
        role: role.to_string(),
        reason: reason.to_string(),
    };

    if !(style.min_size > 0.0 && style.min_size.is_finite()) {
        return Err(invalid("min_size must be finite and > 0"));
    }
    if !(style.max_size >= style.min_size && style.max_size.is_finite()) {
        return Err(invalid("max_size must be >= min_size"));
    }
    if !(style.size_step >= MIN_SIZE_STEP && style.size_step.is_finite()) {
        return Err(invalid("size_step must be >= 0.1"));
    }
    if style.max_lines == 0 {
        return Err(invalid("max_lines must be >= 1"));
    }
    if !(style.line_spacing > 0.0) {
        return Err(invalid("line_spacing must be > 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reel_card_is_valid() {
        let spec = RenderSpec::reel_card();
        assert_eq!(spec.validate(), Ok(()));
        assert_eq!(spec.width, 1080);
        assert_eq!(spec.height, 1920);
    }

    #[test]
    fn test_rect_inset_and_intersection() {
        let r = Rect::new(0, 100, 1080, 260);
        let inner = r.inset(36);
        assert_eq!(inner, Rect::new(36, 136, 1008, 188));

        assert!(r.intersects(&Rect::new(500, 300, 10, 10)));
        assert!(!r.intersects(&Rect::new(0, 360, 10, 10)));
    }

    #[test]
    fn test_inset_never_underflows() {
        let r = Rect::new(10, 10, 20, 6);
        let inner = r.inset(50);
        assert_eq!(inner.width, 0);
        assert_eq!(inner.height, 0);
    }

    #[test]
    fn test_overlapping_text_regions_rejected() {
        let mut spec = RenderSpec::reel_card();
        for region in &mut spec.regions {
            if region.role == RegionRole::Signature {
                region.rect = Rect::new(0, 1300, 1080, 100);
            }
        }
        assert_eq!(
            spec.validate(),
            Err(LayoutError::Overlap(
                "headline".to_string(),
                "signature".to_string()
            ))
        );
    }

    #[test]
    fn test_region_outside_canvas_rejected() {
        let mut spec = RenderSpec::reel_card();
        spec.regions[0].rect = Rect::new(0, 0, 2000, 10);
        assert!(matches!(
            spec.validate(),
            Err(LayoutError::OutOfCanvas { .. })
        ));
    }

    #[test]
    fn test_tiny_size_step_rejected() {
        for step in [0.0, 1e-6, f32::NAN, f32::INFINITY] {
            let mut spec = RenderSpec::reel_card();
            for region in &mut spec.regions {
                if let Some(style) = region.text.as_mut() {
                    style.size_step = step;
                }
            }
            assert!(
                matches!(spec.validate(), Err(LayoutError::InvalidStyle { .. })),
                "step {step} accepted"
            );
        }

        let mut spec = RenderSpec::reel_card();
        for region in &mut spec.regions {
            if let Some(style) = region.text.as_mut() {
                style.size_step = MIN_SIZE_STEP;
            }
        }
        assert_eq!(spec.validate(), Ok(()));
    }

    #[test]
    fn test_inverted_size_range_rejected() {
        let mut spec = RenderSpec::reel_card();
        for region in &mut spec.regions {
            if let Some(style) = region.text.as_mut() {
                style.min_size = 80.0;
            }
        }
        assert!(matches!(
            spec.validate(),
            Err(LayoutError::InvalidStyle { .. })
        ));
    }
}
