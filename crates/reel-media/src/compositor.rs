//! Card compositing.
//!
//! A card is a pure function of the source photo, the category, the headline
//! and a fixed [`RenderSpec`]. Every coordinate comes from the spec.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage, RgbaImage};
use tracing::{debug, warn};

use reel_models::{ItemId, OverlayAnchor, Rect, Region, RegionRole, RenderSpec, TextStyle};

use crate::error::MediaResult;
use crate::typeset::{fit, FitRequest, FittedText, TextPainter};

/// A rendered card, ready to be encoded.
#[derive(Debug, Clone)]
pub struct ComposedAsset {
    pub item_id: ItemId,
    pub image: RgbImage,
    pub rendered_at: DateTime<Utc>,
}

impl ComposedAsset {
    /// Encode as JPEG bytes.
    pub fn to_jpeg(&self, quality: u8) -> MediaResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.image
            .write_with_encoder(JpegEncoder::new_with_quality(Cursor::new(&mut bytes), quality))?;
        Ok(bytes)
    }

    /// Write as a JPEG file.
    pub fn save_jpeg(&self, path: impl AsRef<Path>, quality: u8) -> MediaResult<()> {
        let bytes = self.to_jpeg(quality)?;
        std::fs::write(path.as_ref(), bytes)?;
        Ok(())
    }
}

/// Renders cards against one immutable layout.
pub struct CardCompositor {
    spec: RenderSpec,
    painter: Arc<dyn TextPainter>,
    overlay: Option<RgbaImage>,
}

impl CardCompositor {
    /// Validate the layout and build a compositor.
    pub fn new(
        spec: RenderSpec,
        painter: Arc<dyn TextPainter>,
        overlay: Option<RgbaImage>,
    ) -> MediaResult<Self> {
        spec.validate()?;
        Ok(Self {
            spec,
            painter,
            overlay,
        })
    }

    /// Load the brand mark from a PNG file.
    pub fn load_overlay(path: impl AsRef<Path>) -> MediaResult<RgbaImage> {
        Ok(image::open(path.as_ref())?.to_rgba8())
    }

    pub fn spec(&self) -> &RenderSpec {
        &self.spec
    }

    /// Render one card. `background` is the raw photo; missing or
    /// undecodable bytes fall back to the placeholder fill.
    pub fn compose(
        &self,
        item_id: &ItemId,
        background: Option<&[u8]>,
        category: &str,
        headline: &str,
    ) -> MediaResult<ComposedAsset> {
        let photo = background.and_then(|bytes| match image::load_from_memory(bytes) {
            Ok(img) => Some(img.to_rgb8()),
            Err(e) => {
                warn!(item_id = %item_id, "Background could not be decoded, using placeholder: {}", e);
                None
            }
        });

        let image = render_card(
            &self.spec,
            self.painter.as_ref(),
            self.overlay.as_ref(),
            photo.as_ref(),
            category,
            headline,
        )?;

        Ok(ComposedAsset {
            item_id: item_id.clone(),
            image,
            rendered_at: Utc::now(),
        })
    }
}

/// Paint a full card. Inputs are borrowed and never modified.
pub fn render_card(
    spec: &RenderSpec,
    painter: &dyn TextPainter,
    overlay: Option<&RgbaImage>,
    photo: Option<&RgbImage>,
    category: &str,
    headline: &str,
) -> MediaResult<RgbImage> {
    let mut canvas = RgbImage::from_pixel(spec.width, spec.height, Rgb(spec.background));

    for region in &spec.regions {
        if let Some(fill) = region.fill {
            fill_rect(&mut canvas, region.rect, fill);
        }

        match region.role {
            RegionRole::Photo => {
                let tile = match photo {
                    Some(src) if src.width() > 0 && src.height() > 0 => {
                        cover_fit(src, region.rect.width, region.rect.height)
                    }
                    _ => RgbImage::from_pixel(region.rect.width, region.rect.height, Rgb(spec.placeholder)),
                };
                imageops::replace(&mut canvas, &tile, i64::from(region.rect.x), i64::from(region.rect.y));
            }
            RegionRole::Label => {
                let text = if category.trim().is_empty() {
                    spec.default_category.as_str()
                } else {
                    category.trim()
                };
                draw_text_region(&mut canvas, painter, region, text, spec.char_budget, Some(1))?;
            }
            RegionRole::Headline => {
                let text = headline.split_whitespace().collect::<Vec<_>>().join(" ");
                draw_text_region(&mut canvas, painter, region, &text, spec.char_budget, None)?;
            }
            RegionRole::Signature => {
                draw_text_region(&mut canvas, painter, region, &spec.signature, spec.char_budget, Some(1))?;
            }
        }
    }

    if let (Some(mark), Some(anchor)) = (overlay, spec.overlay) {
        composite_overlay(&mut canvas, mark, anchor);
    }

    Ok(canvas)
}

/// Scale `src` to cover a `width` x `height` box and crop the centered
/// overflow. Aspect ratio is preserved and the box is always fully covered.
pub fn cover_fit(src: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (sw, sh) = src.dimensions();
    let scale = f64::max(
        f64::from(width) / f64::from(sw),
        f64::from(height) / f64::from(sh),
    );
    let scaled_w = ((f64::from(sw) * scale).round() as u32).max(width);
    let scaled_h = ((f64::from(sh) * scale).round() as u32).max(height);

    let scaled = if (scaled_w, scaled_h) == (sw, sh) {
        src.clone()
    } else {
        imageops::resize(src, scaled_w, scaled_h, FilterType::Lanczos3)
    };

    let x = (scaled_w - width) / 2;
    let y = (scaled_h - height) / 2;
    imageops::crop_imm(&scaled, x, y, width, height).to_image()
}

/// Alpha-composite the brand mark, scaled down to the anchor's max width,
/// with its bottom edge on `bottom_y` and centered on `center_x`.
pub fn composite_overlay(canvas: &mut RgbImage, mark: &RgbaImage, anchor: OverlayAnchor) {
    let (mw, mh) = mark.dimensions();
    if mw == 0 || mh == 0 {
        return;
    }

    let scaled;
    let mark = if anchor.max_width > 0 && mw > anchor.max_width {
        let h = ((f64::from(mh) * f64::from(anchor.max_width) / f64::from(mw)).round() as u32).max(1);
        scaled = imageops::resize(mark, anchor.max_width, h, FilterType::Lanczos3);
        &scaled
    } else {
        mark
    };

    let x = i64::from(anchor.center_x) - i64::from(mark.width() / 2);
    let y = i64::from(anchor.bottom_y) - i64::from(mark.height());
    debug!(x, y, w = mark.width(), h = mark.height(), "Compositing overlay");

    let (cw, ch) = (i64::from(canvas.width()), i64::from(canvas.height()));
    for (mx, my, px) in mark.enumerate_pixels() {
        let (dx, dy) = (x + i64::from(mx), y + i64::from(my));
        if dx < 0 || dy < 0 || dx >= cw || dy >= ch {
            continue;
        }
        let alpha = u32::from(px.0[3]);
        if alpha == 0 {
            continue;
        }
        let dst = canvas.get_pixel_mut(dx as u32, dy as u32);
        for c in 0..3 {
            let blended = u32::from(px.0[c]) * alpha + u32::from(dst.0[c]) * (255 - alpha);
            dst.0[c] = ((blended + 127) / 255) as u8;
        }
    }
}

fn fill_rect(canvas: &mut RgbImage, rect: Rect, color: [u8; 3]) {
    for y in rect.y..rect.bottom().min(canvas.height()) {
        for x in rect.x..rect.right().min(canvas.width()) {
            canvas.put_pixel(x, y, Rgb(color));
        }
    }
}

/// Fit `text` into the region's padded box and draw it, each line centered
/// horizontally and the block centered vertically.
fn draw_text_region(
    canvas: &mut RgbImage,
    painter: &dyn TextPainter,
    region: &Region,
    text: &str,
    char_budget: usize,
    max_lines: Option<usize>,
) -> MediaResult<()> {
    let Some(style) = region.text.as_ref() else {
        return Ok(());
    };

    let text = if style.uppercase {
        text.to_uppercase()
    } else {
        text.to_string()
    };
    let area = region.rect.inset(style.padding);

    let mut req = FitRequest::for_box(&text, style, area, char_budget);
    if let Some(n) = max_lines {
        req.max_lines = n;
    }
    let fitted = fit(painter, &req)?;
    draw_fitted(canvas, painter, style, area, &fitted)
}

fn draw_fitted(
    canvas: &mut RgbImage,
    painter: &dyn TextPainter,
    style: &TextStyle,
    area: Rect,
    fitted: &FittedText,
) -> MediaResult<()> {
    let block = fitted.block_height();
    let mut top = f64::from(area.y) + (f64::from(area.height) - f64::from(block)) / 2.0;

    for line in &fitted.lines {
        let width = painter.line_width(&style.font_family, fitted.size, line)?;
        let left = f64::from(area.x) + (f64::from(area.width) - f64::from(width)) / 2.0;
        painter.draw_line(
            canvas,
            &style.font_family,
            fitted.size,
            line,
            left.round() as i64,
            top.round() as i64,
            style.color,
        )?;
        top += f64::from(fitted.line_advance);
    }
    Ok(())
}
