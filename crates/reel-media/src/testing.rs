//! Font-free text painter for tests.

use image::{Rgb, RgbImage};

use reel_models::Rgb8;

use crate::error::MediaResult;
use crate::typeset::{TextMeasure, TextPainter, VerticalMetrics};

/// Every character advances `size * advance`; each non-blank character is
/// drawn as a solid box. Works without any font file.
#[derive(Debug, Clone, Copy)]
pub struct FixedAdvancePainter {
    pub advance: f32,
    pub ascent: f32,
    pub descent: f32,
}

impl Default for FixedAdvancePainter {
    fn default() -> Self {
        Self {
            advance: 0.5,
            ascent: 0.8,
            descent: 0.2,
        }
    }
}

impl TextMeasure for FixedAdvancePainter {
    fn line_width(&self, _family: &str, size: f32, text: &str) -> MediaResult<f32> {
        Ok(text.chars().count() as f32 * size * self.advance)
    }

    fn vertical_metrics(&self, _family: &str, size: f32) -> MediaResult<VerticalMetrics> {
        Ok(VerticalMetrics {
            ascent: size * self.ascent,
            descent: size * self.descent,
        })
    }
}

impl TextPainter for FixedAdvancePainter {
    fn draw_line(
        &self,
        canvas: &mut RgbImage,
        _family: &str,
        size: f32,
        text: &str,
        x: i64,
        y: i64,
        color: Rgb8,
    ) -> MediaResult<()> {
        let advance = size * self.advance;
        let top = y + (size * 0.1).round() as i64;
        let bottom = y + (size * self.ascent).round() as i64;

        for (i, ch) in text.chars().enumerate() {
            if ch.is_whitespace() {
                continue;
            }
            let left = x + (i as f32 * advance + advance * 0.1).round() as i64;
            let right = x + ((i as f32 + 1.0) * advance - advance * 0.1).round() as i64;
            for py in top.max(0)..bottom.min(i64::from(canvas.height())) {
                for px in left.max(0)..right.min(i64::from(canvas.width())) {
                    canvas.put_pixel(px as u32, py as u32, Rgb(color));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draws_boxes_for_visible_characters() {
        let painter = FixedAdvancePainter::default();
        let mut canvas = RgbImage::from_pixel(100, 40, Rgb([255, 255, 255]));
        painter
            .draw_line(&mut canvas, "any", 20.0, "a b", 0, 0, [0, 0, 0])
            .unwrap();
        // "a" occupies x 1..9, the space 10..20 stays blank, "b" 21..29
        assert_eq!(canvas.get_pixel(5, 8), &Rgb([0, 0, 0]));
        assert_eq!(canvas.get_pixel(15, 8), &Rgb([255, 255, 255]));
        assert_eq!(canvas.get_pixel(25, 8), &Rgb([0, 0, 0]));
        assert_eq!(painter.line_width("any", 20.0, "a b").unwrap(), 30.0);
    }
}
