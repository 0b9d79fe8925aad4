//! The time ↔ pixel transform shared by drawing, hit-testing, hotspot
//! aggregation and the minimap.
//!
//! Nothing here fails: zoom saturates at [`ZOOM_MIN`, `ZOOM_MAX`] and
//! non-finite inputs are ignored.

use super::{BLOCK_GAP, BLOCK_HEIGHT, THREAD_SPACING};
use crate::data::TraceBlock;

pub const ZOOM_MIN: f64 = 0.0001;
pub const ZOOM_MAX: f64 = 10_000.0;
/// Pixels per millisecond at zoom 1.0.
pub const TIME_SCALE: f64 = 0.1;

pub const INITIAL_ZOOM: f64 = 1.0;
pub const INITIAL_OFFSET_X: f64 = 100.0;
pub const INITIAL_OFFSET_Y: f64 = 100.0;

/// Screen-space rectangle of a block. Bounds are inclusive for hit-testing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BlockRect {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.x + self.width && y >= self.y && y <= self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    zoom: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub view_width: f64,
    pub view_height: f64,
    total_ms: f64,
}

impl Viewport {
    pub fn new(total_ms: f64) -> Self {
        Self {
            zoom: INITIAL_ZOOM,
            offset_x: INITIAL_OFFSET_X,
            offset_y: INITIAL_OFFSET_Y,
            view_width: 0.0,
            view_height: 0.0,
            total_ms,
        }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn total_ms(&self) -> f64 {
        self.total_ms
    }

    /// Pixels per millisecond at the current zoom.
    pub fn scale(&self) -> f64 {
        TIME_SCALE * self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        if zoom.is_finite() {
            self.zoom = zoom.clamp(ZOOM_MIN, ZOOM_MAX);
        }
    }

    pub fn time_to_x(&self, time_ms: f64) -> f64 {
        time_ms * self.scale() + self.offset_x
    }

    pub fn x_to_time(&self, x: f64) -> f64 {
        (x - self.offset_x) / self.scale()
    }

    pub fn duration_to_width(&self, duration_ms: f64) -> f64 {
        duration_ms * self.scale()
    }

    pub fn lane_y(&self, thread_id: u32, depth: u32) -> f64 {
        thread_id as f64 * THREAD_SPACING + depth as f64 * (BLOCK_HEIGHT + BLOCK_GAP) + self.offset_y
    }

    pub fn block_rect(&self, block: &TraceBlock) -> BlockRect {
        BlockRect {
            x: self.time_to_x(block.start_ms),
            y: self.lane_y(block.thread_id, block.depth),
            width: self.duration_to_width(block.duration_ms),
            height: BLOCK_HEIGHT,
        }
    }

    /// True unless the block lies entirely left of pixel 0 or entirely right
    /// of the view. Blocks straddling either edge count as visible.
    pub fn intersects_horizontally(&self, rect: &BlockRect) -> bool {
        rect.right() >= 0.0 && rect.x <= self.view_width
    }

    /// Same rule as [`Viewport::intersects_horizontally`] along the y axis.
    pub fn intersects_vertically(&self, rect: &BlockRect) -> bool {
        rect.bottom() >= 0.0 && rect.y <= self.view_height
    }

    /// Blocks with any part on screen, in insertion order, paired with their
    /// index and screen rectangle.
    pub fn visible_blocks<'b>(
        &self,
        blocks: &'b [TraceBlock],
    ) -> impl Iterator<Item = (usize, &'b TraceBlock, BlockRect)> {
        blocks.iter().enumerate().filter_map(move |(index, block)| {
            let rect = self.block_rect(block);
            (self.intersects_horizontally(&rect) && self.intersects_vertically(&rect))
                .then_some((index, block, rect))
        })
    }

    /// Time range covered by `[0, view_width]`.
    pub fn visible_time_range(&self) -> (f64, f64) {
        (self.x_to_time(0.0), self.x_to_time(self.view_width))
    }

    pub fn resize(&mut self, width: f64, height: f64) -> bool {
        let width = if width.is_finite() { width.max(0.0) } else { self.view_width };
        let height = if height.is_finite() { height.max(0.0) } else { self.view_height };
        if width == self.view_width && height == self.view_height {
            return false;
        }
        self.view_width = width;
        self.view_height = height;
        true
    }

    /// Multiply zoom by `factor` while keeping the time under `anchor_x`
    /// fixed on screen.
    pub fn zoom_at(&mut self, anchor_x: f64, factor: f64) {
        if !anchor_x.is_finite() || !factor.is_finite() || factor <= 0.0 {
            return;
        }
        let anchor_time = self.x_to_time(anchor_x);
        self.set_zoom(self.zoom * factor);
        self.offset_x = anchor_x - anchor_time * self.scale();
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        if dx.is_finite() {
            self.offset_x += dx;
        }
        if dy.is_finite() {
            self.offset_y += dy;
        }
    }

    pub fn set_offset(&mut self, x: f64, y: f64) {
        if x.is_finite() {
            self.offset_x = x;
        }
        if y.is_finite() {
            self.offset_y = y;
        }
    }

    /// Horizontal offset that puts `time_ms` in the middle of the view.
    pub fn offset_centering(&self, time_ms: f64) -> f64 {
        self.view_width / 2.0 - time_ms * self.scale()
    }
}
