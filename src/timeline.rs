use iced::Color;
use unicode_width::UnicodeWidthChar;

pub mod events;
pub mod header;
pub mod hotspots;
pub mod minimap;
pub mod ticks;
pub mod viewport;

pub use hit_test::hit_test;
pub use hotspots::visible_hotspots;
pub use viewport::Viewport;

pub const BLOCK_HEIGHT: f64 = 24.0;
pub const BLOCK_GAP: f64 = 2.0;
pub const THREAD_SPACING: f64 = 280.0;
pub const RULER_HEIGHT: f64 = 45.0;
/// Blocks narrower than this get no label.
pub const LABEL_MIN_WIDTH: f64 = 60.0;
pub const LABEL_PADDING: f64 = 4.0;
pub const LABEL_SIZE: f32 = 10.0;
/// Rough advance of one terminal column of label text at `LABEL_SIZE`.
const LABEL_COLUMN_WIDTH: f64 = 6.0;
pub const DRAG_THRESHOLD: f64 = 3.0;

/// 32-bit FNV-1a over the UTF-8 bytes of `s`.
pub fn fnv1a(s: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in s.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Deterministic pastel colour for a method name.
pub fn color_from_label(label: &str) -> Color {
    let hash = fnv1a(label);
    let r = 140 + (hash % 60) as u8;
    let g = 170 + ((hash >> 8) % 60) as u8;
    let b = 140 + ((hash >> 16) % 60) as u8;
    Color::from_rgb8(r, g, b)
}

/// Trim `label` so it fits in `max_width` pixels, ending with an ellipsis
/// when anything was cut. Returns `None` if not even the ellipsis fits.
pub fn fit_label(label: &str, max_width: f64) -> Option<String> {
    let max_columns = (max_width / LABEL_COLUMN_WIDTH).floor();
    if max_columns < 1.0 {
        return None;
    }
    let max_columns = max_columns as usize;

    let total: usize = label.chars().map(|c| c.width().unwrap_or(0)).sum();
    if total <= max_columns {
        return Some(label.to_string());
    }

    let mut fitted = String::new();
    let mut used = 0;
    for c in label.chars() {
        let width = c.width().unwrap_or(0);
        if used + width + 1 > max_columns {
            break;
        }
        used += width;
        fitted.push(c);
    }
    fitted.push('…');
    Some(fitted)
}
