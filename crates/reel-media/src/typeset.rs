//! Text fitting.
//!
//! [`fit`] picks the largest font size at which a text wraps into a box,
//! never breaking inside a word. Measurement is delegated to a
//! [`TextMeasure`] so the algorithm runs the same against real fonts and
//! against the fixed-advance measurer used in tests.

use image::RgbImage;
use tracing::trace;

use reel_models::{Rect, Rgb8, TextStyle};

use crate::error::MediaResult;

/// Appended to text that had to be cut.
pub const ELLIPSIS: char = '…';

/// Ascent and descent of a font at a given size, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerticalMetrics {
    pub ascent: f32,
    pub descent: f32,
}

impl VerticalMetrics {
    /// Unspaced height of one line.
    pub fn line_height(&self) -> f32 {
        self.ascent + self.descent
    }
}

/// Measures rendered text.
pub trait TextMeasure: Send + Sync {
    /// Advance width of `text` laid out on a single line.
    fn line_width(&self, family: &str, size: f32, text: &str) -> MediaResult<f32>;

    /// Vertical metrics of `family` at `size`.
    fn vertical_metrics(&self, family: &str, size: f32) -> MediaResult<VerticalMetrics>;
}

/// Draws text onto a canvas.
pub trait TextPainter: TextMeasure {
    /// Draw one line with the top of its line box at `(x, y)`.
    #[allow(clippy::too_many_arguments)]
    fn draw_line(
        &self,
        canvas: &mut RgbImage,
        family: &str,
        size: f32,
        text: &str,
        x: i64,
        y: i64,
        color: Rgb8,
    ) -> MediaResult<()>;
}

/// Upper bound on sizes tried for one region.
const MAX_SIZE_CANDIDATES: usize = 1024;

/// Candidate font sizes, tried largest first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeRange {
    pub max: f32,
    pub min: f32,
    pub step: f32,
}

impl SizeRange {
    /// Sizes from `max` down to `min`; `min` is always the last candidate.
    pub fn candidates(&self) -> Vec<f32> {
        let mut sizes = Vec::new();
        if self.step.is_finite() && self.step > 0.0 {
            let steps = ((self.max - self.min) / self.step).ceil();
            let steps = if steps.is_finite() && steps > 0.0 {
                (steps as usize).min(MAX_SIZE_CANDIDATES)
            } else {
                0
            };
            sizes.extend(
                (0..steps)
                    .map(|i| self.max - i as f32 * self.step)
                    .filter(|size| *size > self.min + f32::EPSILON),
            );
        } else if self.max > self.min {
            sizes.push(self.max);
        }
        sizes.push(self.min);
        sizes
    }
}

/// Everything needed to fit one text into one box.
#[derive(Debug, Clone)]
pub struct FitRequest<'a> {
    pub text: &'a str,
    pub family: &'a str,
    pub max_width: f32,
    pub max_height: f32,
    pub max_lines: usize,
    pub sizes: SizeRange,
    pub line_spacing: f32,
    /// Character budget for the last-resort shortening
    pub char_budget: usize,
}

impl<'a> FitRequest<'a> {
    /// Request for a styled text box (already inset by the style padding).
    pub fn for_box(text: &'a str, style: &'a TextStyle, area: Rect, char_budget: usize) -> Self {
        Self {
            text,
            family: &style.font_family,
            max_width: area.width as f32,
            max_height: area.height as f32,
            max_lines: style.max_lines,
            sizes: SizeRange {
                max: style.max_size,
                min: style.min_size,
                step: style.size_step,
            },
            line_spacing: style.line_spacing,
            char_budget,
        }
    }
}

/// Result of fitting: the chosen size and the wrapped lines.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedText {
    pub size: f32,
    pub lines: Vec<String>,
    /// Distance between consecutive line tops
    pub line_advance: f32,
    /// Text had to be cut to fit
    pub truncated: bool,
    /// No candidate size fit and the shortened fallback was used
    pub fallback: bool,
}

impl FittedText {
    /// Height of the whole block.
    pub fn block_height(&self) -> f32 {
        self.lines.len() as f32 * self.line_advance
    }
}

/// Fit `req.text` into its box.
///
/// Every candidate size is tried from largest to smallest. At each size the
/// text is greedily wrapped; if it needs more than `max_lines`, the last kept
/// line is ellipsized. The first size whose block fits the height wins.
/// When none does, the text is shortened at a word boundary to the
/// character budget and laid out at the minimum size.
pub fn fit<M: TextMeasure + ?Sized>(measure: &M, req: &FitRequest<'_>) -> MediaResult<FittedText> {
    let max_lines = req.max_lines.max(1);

    for size in req.sizes.candidates() {
        let line_advance = measure.vertical_metrics(req.family, size)?.line_height() * req.line_spacing;
        let mut lines = wrap(measure, req.family, size, req.text, req.max_width)?;
        let truncated = lines.len() > max_lines;
        if truncated {
            lines = clamp_lines(measure, req.family, size, lines, max_lines, req.max_width)?;
        }

        let block = lines.len() as f32 * line_advance;
        trace!(size, lines = lines.len(), block, "fit candidate");
        if block <= req.max_height {
            return Ok(FittedText {
                size,
                lines,
                line_advance,
                truncated,
                fallback: false,
            });
        }
    }

    let size = req.sizes.min;
    let line_advance = measure.vertical_metrics(req.family, size)?.line_height() * req.line_spacing;
    let room = if line_advance > 0.0 {
        (req.max_height / line_advance).floor() as usize
    } else {
        max_lines
    };
    let allowed = room.clamp(1, max_lines);

    let shortened = shorten(req.text, req.char_budget);
    let mut lines = wrap(measure, req.family, size, &shortened, req.max_width)?;
    if lines.len() > allowed {
        lines = clamp_lines(measure, req.family, size, lines, allowed, req.max_width)?;
    }

    Ok(FittedText {
        size,
        lines,
        line_advance,
        truncated: true,
        fallback: true,
    })
}

/// Greedy word wrap. Newlines start a new line; words are never split, so a
/// single word wider than `max_width` sits alone on its line.
pub fn wrap<M: TextMeasure + ?Sized>(
    measure: &M,
    family: &str,
    size: f32,
    text: &str,
    max_width: f32,
) -> MediaResult<Vec<String>> {
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut words = paragraph.split_whitespace();
        let Some(first) = words.next() else {
            lines.push(String::new());
            continue;
        };

        let mut line = first.to_string();
        for word in words {
            let candidate = format!("{line} {word}");
            if measure.line_width(family, size, &candidate)? <= max_width {
                line = candidate;
            } else {
                lines.push(std::mem::replace(&mut line, word.to_string()));
            }
        }
        lines.push(line);
    }

    // Text made only of blank paragraphs collapses to a single empty line
    if lines.iter().all(String::is_empty) {
        lines.truncate(1);
    }

    Ok(lines)
}

/// Keep `max_lines` lines, ending the last one with an ellipsis.
fn clamp_lines<M: TextMeasure + ?Sized>(
    measure: &M,
    family: &str,
    size: f32,
    mut lines: Vec<String>,
    max_lines: usize,
    max_width: f32,
) -> MediaResult<Vec<String>> {
    let max_lines = max_lines.max(1);
    if lines.len() <= max_lines {
        return Ok(lines);
    }
    lines.truncate(max_lines);
    if let Some(last) = lines.pop() {
        lines.push(ellipsize(measure, family, size, &last, max_width)?);
    }
    Ok(lines)
}

/// Append an ellipsis, dropping trailing words until the line fits.
fn ellipsize<M: TextMeasure + ?Sized>(
    measure: &M,
    family: &str,
    size: f32,
    line: &str,
    max_width: f32,
) -> MediaResult<String> {
    let mut words: Vec<&str> = line.split_whitespace().collect();
    loop {
        let candidate = format!("{}{ELLIPSIS}", words.join(" "));
        if words.len() <= 1 || measure.line_width(family, size, &candidate)? <= max_width {
            return Ok(candidate);
        }
        words.pop();
    }
}

/// Collapse whitespace and cut at a word boundary so that the result,
/// ellipsis included, is at most `budget` characters.
pub fn shorten(text: &str, budget: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= budget {
        return collapsed;
    }

    let limit = budget.saturating_sub(1);
    let mut out = String::new();
    let mut used = 0;
    for word in collapsed.split(' ') {
        let len = word.chars().count();
        let extra = if out.is_empty() { len } else { len + 1 };
        if used + extra > limit {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
        used += extra;
    }

    if out.is_empty() {
        out = collapsed.chars().take(limit).collect();
    }
    out.push(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every character advances `size * 0.5`; ascent 0.8, descent 0.2.
    struct HalfEm;

    impl TextMeasure for HalfEm {
        fn line_width(&self, _family: &str, size: f32, text: &str) -> MediaResult<f32> {
            Ok(text.chars().count() as f32 * size * 0.5)
        }

        fn vertical_metrics(&self, _family: &str, size: f32) -> MediaResult<VerticalMetrics> {
            Ok(VerticalMetrics {
                ascent: size * 0.8,
                descent: size * 0.2,
            })
        }
    }

    fn request(text: &str, width: f32, height: f32) -> FitRequest<'_> {
        FitRequest {
            text,
            family: "headline",
            max_width: width,
            max_height: height,
            max_lines: 6,
            sizes: SizeRange {
                max: 64.0,
                min: 42.0,
                step: 2.0,
            },
            line_spacing: 1.05,
            char_budget: 120,
        }
    }

    fn assert_within(fitted: &FittedText, req: &FitRequest<'_>) {
        assert!(fitted.size <= req.sizes.max && fitted.size >= req.sizes.min);
        assert!(fitted.lines.len() <= req.max_lines);
        for line in &fitted.lines {
            let words = line.split_whitespace().count();
            let width = HalfEm.line_width(req.family, fitted.size, line).unwrap();
            assert!(
                width <= req.max_width || words <= 1,
                "line {line:?} is {width}px wide"
            );
        }
    }

    #[test]
    fn test_size_candidates_include_min() {
        let range = SizeRange {
            max: 64.0,
            min: 42.0,
            step: 2.0,
        };
        let sizes = range.candidates();
        assert_eq!(sizes.first(), Some(&64.0));
        assert_eq!(sizes.last(), Some(&42.0));
        assert_eq!(sizes.len(), 12);

        let odd = SizeRange {
            max: 10.0,
            min: 5.0,
            step: 3.0,
        };
        assert_eq!(odd.candidates(), vec![10.0, 7.0, 5.0]);
    }

    #[test]
    fn test_size_candidates_bounded_for_tiny_steps() {
        let range = SizeRange {
            max: 120_000.0,
            min: 10.0,
            step: 1e-6,
        };
        let sizes = range.candidates();
        assert_eq!(sizes.len(), MAX_SIZE_CANDIDATES + 1);
        assert_eq!(sizes.last(), Some(&10.0));

        let nan = SizeRange {
            max: 64.0,
            min: 42.0,
            step: f32::NAN,
        };
        assert_eq!(nan.candidates(), vec![64.0, 42.0]);
    }

    #[test]
    fn test_short_text_uses_max_size() {
        let req = request("Short headline", 1008.0, 448.0);
        let fitted = fit(&HalfEm, &req).unwrap();
        assert_eq!(fitted.size, 64.0);
        assert_eq!(fitted.lines, vec!["Short headline".to_string()]);
        assert!(!fitted.truncated);
    }

    #[test]
    fn test_long_text_steps_down() {
        // 20 words of 9 chars. Four words per line first happens at 50px,
        // giving 5 lines of 52.5px
        let text = vec!["abcdefghi"; 20].join(" ");
        let req = request(&text, 1008.0, 300.0);
        let fitted = fit(&HalfEm, &req).unwrap();
        assert_eq!(fitted.size, 50.0);
        assert_eq!(fitted.lines.len(), 5);
        assert!(!fitted.truncated);
        assert!(!fitted.fallback);
        assert!(fitted.block_height() <= req.max_height);
        assert_within(&fitted, &req);
    }

    #[test]
    fn test_result_always_within_bounds() {
        let texts = [
            String::new(),
            "x".to_string(),
            "Polícia prende suspeito após perseguição no centro".to_string(),
            vec!["palavra"; 200].join(" "),
            "a\nb\nc\nd\ne\nf\ng\nh".to_string(),
        ];
        for text in &texts {
            let req = request(text, 1008.0, 448.0);
            let fitted = fit(&HalfEm, &req).unwrap();
            assert_within(&fitted, &req);
        }
    }

    #[test]
    fn test_empty_text_is_one_empty_line() {
        let req = request("", 1008.0, 448.0);
        let fitted = fit(&HalfEm, &req).unwrap();
        assert_eq!(fitted.lines, vec![String::new()]);
        assert_eq!(fitted.size, 64.0);

        let fitted = fit(&HalfEm, &request("  \n  ", 1008.0, 448.0)).unwrap();
        assert_eq!(fitted.lines, vec![String::new()]);
    }

    #[test]
    fn test_unbroken_word_gets_its_own_line() {
        let long = "x".repeat(80);
        let text = format!("hello {long} world");
        let req = request(&text, 1008.0, 448.0);
        let fitted = fit(&HalfEm, &req).unwrap();
        assert!(fitted.lines.contains(&long));
        assert_within(&fitted, &req);
    }

    #[test]
    fn test_line_overflow_ellipsizes_last_line() {
        let text = vec!["word"; 60].join(" ");
        let mut req = request(&text, 300.0, 10_000.0);
        req.max_lines = 2;
        let fitted = fit(&HalfEm, &req).unwrap();
        assert_eq!(fitted.lines.len(), 2);
        assert!(fitted.truncated);
        assert!(fitted.lines[1].ends_with(ELLIPSIS));
        assert_within(&fitted, &req);
    }

    #[test]
    fn test_fallback_when_nothing_fits_height() {
        let text = vec!["palavra"; 100].join(" ");
        // Room for a single 42px line only
        let req = request(&text, 1008.0, 50.0);
        let fitted = fit(&HalfEm, &req).unwrap();
        assert!(fitted.fallback);
        assert_eq!(fitted.size, 42.0);
        assert_eq!(fitted.lines.len(), 1);
        assert!(fitted.lines[0].ends_with(ELLIPSIS));
        assert_within(&fitted, &req);
    }

    #[test]
    fn test_shorten() {
        assert_eq!(shorten("  a   b  ", 10), "a b");

        let s = shorten("one two three four five", 12);
        assert_eq!(s, "one two…");
        assert!(s.chars().count() <= 12);

        let s = shorten(&"x".repeat(50), 10);
        assert_eq!(s.chars().count(), 10);
        assert!(s.ends_with(ELLIPSIS));
    }

    #[test]
    fn test_shorten_counts_characters_not_bytes() {
        let text = "ação ".repeat(40);
        let s = shorten(&text, 20);
        assert!(s.chars().count() <= 20);
        assert!(s.ends_with(ELLIPSIS));
    }
}
