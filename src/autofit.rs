use crate::measure::TextMeasurer;
use crate::schema::{TextStyle, MAX_FONT_SIZE, MIN_FONT_SIZE};

/// Default search bounds when fitting freshly locked text.
pub const FIT_MIN: f32 = 18.0;
pub const FIT_MAX: f32 = 96.0;

/// Upper bound used while the box is being resized, so text can grow with it.
pub const FIT_MAX_RESIZE: f32 = 512.0;

const FIT_ITERATIONS: u32 = 10;

/// Overflow past this ratio after a font swap triggers a full refit;
/// anything milder keeps the prescaled size.
pub const OVERFLOW_REFIT_RATIO: f32 = 1.2;

fn fits(
    measurer: &dyn TextMeasurer,
    text: &str,
    style: &TextStyle,
    size: f32,
    box_w: f32,
    box_h: f32,
) -> bool {
    measurer.line_width(text, style, size) <= box_w
        && measurer.block_height(text, style, size) <= box_h
}

/// Binary-search the largest font size whose text block fits inside the box.
///
/// Ten iterations, narrowing by half a pixel past the midpoint each step.
/// If the current size already fits, the search runs upward from it so the
/// text never shrinks just because a fit was requested; otherwise it runs
/// downward between `min` and the current size.
pub fn fit_text_to_box(
    measurer: &dyn TextMeasurer,
    text: &str,
    style: &TextStyle,
    current: f32,
    box_w: f32,
    box_h: f32,
    min: f32,
    max: f32,
) -> f32 {
    if text.is_empty() || box_w <= 0.0 || box_h <= 0.0 {
        return current.clamp(min, max);
    }

    let current_fits = fits(measurer, text, style, current, box_w, box_h);
    let (mut lo, mut hi) = if current_fits {
        (current.max(min), max)
    } else {
        (min, current.min(max))
    };
    let mut best = lo;

    for _ in 0..FIT_ITERATIONS {
        if hi < lo {
            break;
        }
        let mid = (lo + hi) * 0.5;
        if fits(measurer, text, style, mid, box_w, box_h) {
            best = mid;
            lo = mid + 0.5;
        } else {
            hi = mid - 0.5;
        }
    }

    best.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
}

/// Seed size applied when lock-to-box is switched on: 60% of the box height,
/// clamped to the search bounds, and never below the size already in use.
pub fn seed_font_size_for_lock(current: f32, box_h: f32, min: f32, max: f32) -> f32 {
    (box_h * 0.6).clamp(min, max).max(current)
}

/// How far the text block overflows the box, as the larger of the per-axis
/// ratios. A value at or below 1.0 means it fits.
pub fn overflow_ratio(
    measurer: &dyn TextMeasurer,
    text: &str,
    style: &TextStyle,
    size: f32,
    box_w: f32,
    box_h: f32,
) -> f32 {
    if box_w <= 0.0 || box_h <= 0.0 {
        return f32::INFINITY;
    }
    let w = measurer.line_width(text, style, size);
    let h = measurer.block_height(text, style, size);
    (w / box_w).max(h / box_h)
}

/// Compensate a font-family change so the text keeps its visual width.
///
/// Measures the text in the old and new families at the current size, with
/// stroke padding of twice the stroke width on each when enabled, and scales
/// the size up by the width ratio. The size only ever grows; a swap to a
/// wider family keeps the current size.
pub fn prescale_for_family_swap(
    measurer: &dyn TextMeasurer,
    text: &str,
    old_style: &TextStyle,
    new_style: &TextStyle,
    current: f32,
) -> f32 {
    if text.is_empty() {
        return current;
    }
    let pad = |style: &TextStyle| {
        if style.stroke.enabled {
            2.0 * style.stroke.width_px
        } else {
            0.0
        }
    };
    let old_w = measurer.line_width(text, old_style, current) + pad(old_style);
    let new_w = measurer.line_width(text, new_style, current) + pad(new_style);
    if new_w <= 0.0 {
        return current;
    }
    let scale = old_w / new_w;
    if scale <= 1.0 {
        return current;
    }
    (current * scale).clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::testing::FixedAdvance;

    fn style() -> TextStyle {
        TextStyle::default()
    }

    #[test]
    fn fit_grows_text_into_a_roomy_box() {
        let m = FixedAdvance(0.5);
        // 9 glyphs at 0.5em advance: width = 4.5 * size.
        let size = fit_text_to_box(&m, "WATERMARK", &style(), 32.0, 450.0, 200.0, FIT_MIN, FIT_MAX);
        assert!(size > 32.0);
        assert!(m.line_width("WATERMARK", &style(), size) <= 450.0);
    }

    #[test]
    fn fit_shrinks_overflowing_text() {
        let m = FixedAdvance(0.5);
        let size = fit_text_to_box(&m, "WATERMARK", &style(), 96.0, 120.0, 200.0, FIT_MIN, FIT_MAX);
        assert!(size < 96.0);
        assert!(m.line_width("WATERMARK", &style(), size) <= 120.0);
    }

    #[test]
    fn fit_result_stays_within_bounds() {
        let m = FixedAdvance(0.5);
        let size = fit_text_to_box(
            &m,
            "W",
            &style(),
            32.0,
            10_000.0,
            10_000.0,
            FIT_MIN,
            FIT_MAX,
        );
        assert!(size <= FIT_MAX);

        let size = fit_text_to_box(&m, "WATERMARK", &style(), 32.0, 30.0, 30.0, FIT_MIN, FIT_MAX);
        assert!(size >= FIT_MIN - 0.5);
    }

    #[test]
    fn resize_bound_lets_text_scale_far_past_default() {
        let m = FixedAdvance(0.5);
        let size = fit_text_to_box(
            &m,
            "HI",
            &style(),
            96.0,
            600.0,
            600.0,
            FIT_MIN,
            FIT_MAX_RESIZE,
        );
        assert!(size > FIT_MAX);
    }

    #[test]
    fn empty_text_keeps_current_size() {
        let m = FixedAdvance(0.5);
        let size = fit_text_to_box(&m, "", &style(), 32.0, 200.0, 40.0, FIT_MIN, FIT_MAX);
        assert_eq!(size, 32.0);
    }

    #[test]
    fn lock_seed_tracks_box_height_but_never_shrinks() {
        assert_eq!(seed_font_size_for_lock(32.0, 100.0, FIT_MIN, FIT_MAX), 60.0);
        assert_eq!(seed_font_size_for_lock(80.0, 100.0, FIT_MIN, FIT_MAX), 80.0);
        assert_eq!(seed_font_size_for_lock(10.0, 10.0, FIT_MIN, FIT_MAX), 18.0);
    }

    #[test]
    fn family_swap_never_shrinks_the_text() {
        let m = FixedAdvance(0.5);
        let old = style();
        let new = style();
        // Identical metrics: scale is 1, size unchanged.
        assert_eq!(prescale_for_family_swap(&m, "abc", &old, &new, 30.0), 30.0);
    }

    #[test]
    fn family_swap_compensates_lost_stroke_padding() {
        let m = FixedAdvance(0.5);
        let mut old = style();
        old.stroke.enabled = true;
        old.stroke.width_px = 6.0;
        let new = style();
        // Old width carries a 12px pad the new style lacks, so the swap
        // scales the size up to preserve visual width.
        let scaled = prescale_for_family_swap(&m, "abc", &old, &new, 30.0);
        assert!(scaled > 30.0);
    }

    #[test]
    fn overflow_ratio_flags_oversized_text() {
        let m = FixedAdvance(0.5);
        // Width = 4.5 * 40 = 180 against a 100px box.
        let ratio = overflow_ratio(&m, "WATERMARK", &style(), 40.0, 100.0, 500.0);
        assert!(ratio > OVERFLOW_REFIT_RATIO);

        let ratio = overflow_ratio(&m, "WATERMARK", &style(), 40.0, 200.0, 500.0);
        assert!(ratio <= 1.0);
    }
}
