//! Helpers for choosing ruler tick spacing and formatting labels.

use super::viewport::Viewport;

/// Smallest tick interval, in milliseconds.
pub const BASE_STEP_MS: f64 = 100.0;
/// Ticks are never drawn closer together than this.
pub const MIN_TICK_SPACING_PX: f64 = 60.0;

/// Tick interval in milliseconds: the smallest `BASE_STEP_MS * 10^k` whose
/// on-screen spacing is at least `MIN_TICK_SPACING_PX`.
pub fn tick_step_ms(scale: f64) -> f64 {
    if !scale.is_finite() || scale <= 0.0 {
        return 0.0;
    }
    let mut step = BASE_STEP_MS;
    while step * scale < MIN_TICK_SPACING_PX {
        step *= 10.0;
    }
    step
}

/// Screen positions and times of every tick within `[0, view_width)`.
pub fn ruler_ticks(viewport: &Viewport) -> Vec<(f64, f64)> {
    let step_ms = tick_step_ms(viewport.scale());
    if step_ms <= 0.0 || viewport.view_width <= 0.0 {
        return Vec::new();
    }

    let first = (viewport.x_to_time(0.0) / step_ms).ceil() * step_ms;
    let mut ticks = Vec::new();
    let mut index = 0.0;
    loop {
        let time = first + index * step_ms;
        let x = viewport.time_to_x(time);
        if x >= viewport.view_width {
            break;
        }
        ticks.push((x, time));
        index += 1.0;
    }
    ticks
}

pub fn format_time_label(time_ms: f64) -> String {
    format!("{time_ms:.0}ms")
}
