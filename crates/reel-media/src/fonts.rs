//! Font-backed text measurement and rasterization.
//!
//! Text is shaped with parley and rasterized with vello_cpu into a scratch
//! pixmap, which is then blended onto the RGB card.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use image::RgbImage;
use tracing::debug;

use reel_models::Rgb8;

use crate::error::{MediaError, MediaResult};
use crate::typeset::{TextMeasure, TextPainter, VerticalMetrics};

/// Sample used to read a font's vertical metrics.
const METRICS_SAMPLE: &str = "Ay";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct TextBrush {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

struct LoadedFont {
    family_name: String,
    data: vello_cpu::peniko::FontData,
}

struct Shaper {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrush>,
    fonts: HashMap<String, LoadedFont>,
}

impl Shaper {
    fn layout(
        &mut self,
        alias: &str,
        size: f32,
        text: &str,
        brush: TextBrush,
    ) -> MediaResult<parley::Layout<TextBrush>> {
        if !size.is_finite() || size <= 0.0 {
            return Err(MediaError::render(format!("invalid font size {size}")));
        }
        let family_name = self
            .fonts
            .get(alias)
            .map(|f| f.family_name.clone())
            .ok_or_else(|| MediaError::FontNotFound(alias.to_string()))?;

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(Cow::Owned(family_name)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrush> = builder.build(text);
        layout.break_all_lines(None);
        Ok(layout)
    }
}

/// Width and height of a single-line layout.
fn extent(layout: &parley::Layout<TextBrush>) -> (f32, f32) {
    let mut width = 0.0f32;
    let mut height = 0.0f32;
    for line in layout.lines() {
        let m = line.metrics();
        width = width.max(m.advance);
        height += m.ascent + m.descent + m.leading;
    }
    (width, height)
}

/// Registry of font files addressed by alias.
///
/// Parley contexts are not thread-safe, so they sit behind a mutex; shaping
/// a headline takes microseconds and cards are rendered one at a time.
pub struct FontBook {
    shaper: Mutex<Shaper>,
}

impl Default for FontBook {
    fn default() -> Self {
        Self::new()
    }
}

impl FontBook {
    /// Create an empty font book.
    pub fn new() -> Self {
        Self {
            shaper: Mutex::new(Shaper {
                font_ctx: parley::FontContext::default(),
                layout_ctx: parley::LayoutContext::new(),
                fonts: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MediaResult<MutexGuard<'_, Shaper>> {
        self.shaper
            .lock()
            .map_err(|_| MediaError::internal("font book lock poisoned"))
    }

    /// Register font bytes under `alias`.
    pub fn register(&self, alias: &str, bytes: Vec<u8>) -> MediaResult<()> {
        let mut shaper = self.lock()?;

        let families = shaper
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(bytes.clone()), None);
        let family_id = families
            .first()
            .map(|(id, _)| *id)
            .ok_or_else(|| MediaError::font_load(format!("no font families in data for {alias}")))?;
        let family_name = shaper
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| MediaError::font_load(format!("font for {alias} has no family name")))?
            .to_string();

        debug!(alias, family = %family_name, "Registered font");

        let data = vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(bytes), 0);
        shaper
            .fonts
            .insert(alias.to_string(), LoadedFont { family_name, data });
        Ok(())
    }

    /// Register a font file under `alias`.
    pub fn register_file(&self, alias: &str, path: impl AsRef<Path>) -> MediaResult<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        self.register(alias, bytes)
    }

    /// Whether `alias` has been registered.
    pub fn contains(&self, alias: &str) -> bool {
        self.lock()
            .map(|s| s.fonts.contains_key(alias))
            .unwrap_or(false)
    }
}

impl TextMeasure for FontBook {
    fn line_width(&self, family: &str, size: f32, text: &str) -> MediaResult<f32> {
        if text.is_empty() {
            return Ok(0.0);
        }
        let mut shaper = self.lock()?;
        let layout = shaper.layout(family, size, text, TextBrush::default())?;
        Ok(extent(&layout).0)
    }

    fn vertical_metrics(&self, family: &str, size: f32) -> MediaResult<VerticalMetrics> {
        let mut shaper = self.lock()?;
        let layout = shaper.layout(family, size, METRICS_SAMPLE, TextBrush::default())?;
        let line = layout
            .lines()
            .next()
            .ok_or_else(|| MediaError::render("metrics sample produced no lines"))?;
        let m = line.metrics();
        Ok(VerticalMetrics {
            ascent: m.ascent,
            descent: m.descent,
        })
    }
}

impl TextPainter for FontBook {
    fn draw_line(
        &self,
        canvas: &mut RgbImage,
        family: &str,
        size: f32,
        text: &str,
        x: i64,
        y: i64,
        color: Rgb8,
    ) -> MediaResult<()> {
        if text.trim().is_empty() {
            return Ok(());
        }

        let brush = TextBrush {
            r: color[0],
            g: color[1],
            b: color[2],
            a: 255,
        };
        let (layout, font) = {
            let mut shaper = self.lock()?;
            let layout = shaper.layout(family, size, text, brush)?;
            let font = shaper
                .fonts
                .get(family)
                .map(|f| f.data.clone())
                .ok_or_else(|| MediaError::FontNotFound(family.to_string()))?;
            (layout, font)
        };

        let (w, h) = extent(&layout);
        let Some(window) = ClipWindow::new(w, h, x, y, canvas.width(), canvas.height()) else {
            return Ok(());
        };

        let mut ctx = vello_cpu::RenderContext::new(window.width, window.height);
        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let brush = run.style().brush;
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                    brush.r, brush.g, brush.b, brush.a,
                ));
                let glyphs = run.positioned_glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x - window.skip_x,
                    y: g.y - window.skip_y,
                });
                ctx.glyph_run(&font)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }
        ctx.flush();

        let mut pixmap = vello_cpu::Pixmap::new(window.width, window.height);
        ctx.render_to_pixmap(&mut pixmap);

        blend_premultiplied(
            canvas,
            pixmap.data_as_u8_slice(),
            u32::from(window.width),
            u32::from(window.height),
            window.dst_x,
            window.dst_y,
        );
        Ok(())
    }
}

/// Visible part of a text extent placed at `(x, y)` on the canvas.
///
/// Text running past the canvas edges is clipped here, so the scratch pixmap
/// never exceeds the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ClipWindow {
    dst_x: i64,
    dst_y: i64,
    width: u16,
    height: u16,
    /// Layout offset of the window's left edge
    skip_x: f32,
    skip_y: f32,
}

impl ClipWindow {
    fn new(extent_w: f32, extent_h: f32, x: i64, y: i64, canvas_w: u32, canvas_h: u32) -> Option<Self> {
        let (dst_x, width) = clip_span(extent_w, x, canvas_w)?;
        let (dst_y, height) = clip_span(extent_h, y, canvas_h)?;
        Some(Self {
            dst_x,
            dst_y,
            width,
            height,
            skip_x: (dst_x - x) as f32,
            skip_y: (dst_y - y) as f32,
        })
    }
}

/// Start and length of `[origin, origin + extent]` inside `[0, limit)`, with
/// one pixel of slack for antialiasing.
fn clip_span(extent: f32, origin: i64, limit: u32) -> Option<(i64, u16)> {
    let full = if extent.is_finite() {
        extent.max(0.0).ceil() as i64 + 1
    } else {
        i64::from(limit)
    };
    let start = origin.max(0);
    let end = origin
        .saturating_add(full)
        .min(i64::from(limit))
        .min(start + i64::from(u16::MAX));
    if end <= start {
        return None;
    }
    Some((start, (end - start) as u16))
}

/// Blend a premultiplied RGBA8 buffer onto an RGB canvas at `(x, y)`,
/// clipping to the canvas.
pub(crate) fn blend_premultiplied(
    canvas: &mut RgbImage,
    src: &[u8],
    src_width: u32,
    src_height: u32,
    x: i64,
    y: i64,
) {
    let (cw, ch) = (i64::from(canvas.width()), i64::from(canvas.height()));
    for sy in 0..src_height {
        let dy = y + i64::from(sy);
        if dy < 0 || dy >= ch {
            continue;
        }
        for sx in 0..src_width {
            let dx = x + i64::from(sx);
            if dx < 0 || dx >= cw {
                continue;
            }
            let i = ((sy * src_width + sx) * 4) as usize;
            let Some(px) = src.get(i..i + 4) else {
                continue;
            };
            let alpha = u32::from(px[3]);
            if alpha == 0 {
                continue;
            }
            let dst = canvas.get_pixel_mut(dx as u32, dy as u32);
            for c in 0..3 {
                let under = u32::from(dst.0[c]) * (255 - alpha);
                dst.0[c] = (u32::from(px[c]) + (under + 127) / 255).min(255) as u8;
            }
        }
    }
}
