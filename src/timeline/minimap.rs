//! Condensed overview of the whole trace with the main view's visible range
//! highlighted. Pointer input here only ever moves the main view's offset.

use crate::data::TraceBlock;
use crate::session::TimelineSession;
use crate::Message;
use iced::mouse;
use iced::widget::canvas::{self, Action, Geometry, Program};
use iced::{Color, Event, Point, Rectangle, Renderer, Size, Theme};

use super::viewport::Viewport;

/// Lanes are spread over this many bands of the minimap height.
const LANE_BANDS: f64 = 5.0;
const BLOCK_MARK_HEIGHT: f64 = 2.0;
const MIN_HIGHLIGHT_WIDTH: f64 = 2.0;

/// Mark for `block` in a minimap of `width` x `height` covering `total_ms`.
pub fn minimap_block_rect(block: &TraceBlock, total_ms: f64, width: f64, height: f64) -> Option<Rectangle> {
    if total_ms <= 0.0 || width <= 0.0 || height <= 0.0 {
        return None;
    }
    let x = block.start_ms / total_ms * width;
    let w = block.duration_ms / total_ms * width;
    let y = (block.thread_id as f64 * (height / LANE_BANDS)) % height;
    Some(Rectangle {
        x: x as f32,
        y: y as f32,
        width: w.max(1.0) as f32,
        height: BLOCK_MARK_HEIGHT as f32,
    })
}

/// Horizontal span `(x, width)` of the main view's visible time range,
/// clamped to the minimap.
pub fn viewport_highlight(viewport: &Viewport, width: f64) -> Option<(f64, f64)> {
    let total_ms = viewport.total_ms();
    if total_ms <= 0.0 || width <= 0.0 {
        return None;
    }
    let (start_ms, end_ms) = viewport.visible_time_range();
    let x0 = (start_ms / total_ms * width).clamp(0.0, width);
    let x1 = (end_ms / total_ms * width).clamp(0.0, width);
    let highlight_width = (x1 - x0).max(MIN_HIGHLIGHT_WIDTH);
    Some((x0.min(width - MIN_HIGHLIGHT_WIDTH).max(0.0), highlight_width))
}

/// Offset that centres the time at `fraction` of the trace, keeping zoom.
pub fn offset_for_fraction(viewport: &Viewport, fraction: f64) -> f64 {
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    viewport.offset_centering(fraction * viewport.total_ms())
}

pub struct MinimapProgram<'a> {
    pub session: &'a TimelineSession,
}

#[derive(Default)]
pub struct MinimapState {
    dragging: bool,
}

fn jump_to(position: Point, bounds: Rectangle) -> Option<Action<Message>> {
    if bounds.width <= 0.0 {
        return None;
    }
    let fraction = (position.x / bounds.width).clamp(0.0, 1.0) as f64;
    Some(Action::publish(Message::MinimapJump { fraction }).and_capture())
}

impl Program<Message> for MinimapProgram<'_> {
    type State = MinimapState;

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());
        frame.fill_rectangle(Point::ORIGIN, bounds.size(), Color::from_rgb8(0x11, 0x11, 0x11));

        let metadata = self.session.metadata();
        let width = bounds.width as f64;
        let height = bounds.height as f64;
        let block_color = Color::from_rgba8(0x4A, 0x90, 0xE2, 0.3);
        for block in metadata.blocks() {
            if let Some(mark) = minimap_block_rect(block, metadata.total_duration_ms, width, height) {
                frame.fill_rectangle(mark.position(), mark.size(), block_color);
            }
        }

        if let Some((x, w)) = viewport_highlight(self.session.viewport(), width) {
            let (x, w) = (x as f32, w as f32);
            let mask = Color::from_rgba8(0, 0, 0, 0x60 as f32 / 255.0);
            frame.fill_rectangle(Point::ORIGIN, Size::new(x, bounds.height), mask);
            frame.fill_rectangle(
                Point::new(x + w, 0.0),
                Size::new((bounds.width - x - w).max(0.0), bounds.height),
                mask,
            );

            let highlight = canvas::Path::rectangle(Point::new(x, 0.0), Size::new(w, bounds.height));
            frame.fill(&highlight, Color::from_rgba8(0xFF, 0xFF, 0xFF, 0x30 as f32 / 255.0));
            frame.stroke(
                &highlight,
                canvas::Stroke::default()
                    .with_color(Color::WHITE)
                    .with_width(1.0),
            );
        }

        vec![frame.into_geometry()]
    }

    fn update(
        &self,
        state: &mut Self::State,
        event: &Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<Action<Message>> {
        match event {
            Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                let position = cursor.position_in(bounds)?;
                state.dragging = true;
                return jump_to(position, bounds);
            }
            Event::Mouse(mouse::Event::CursorMoved { .. }) if state.dragging => {
                // Dragging past either end pins the view to that end.
                let position = cursor.position_from(bounds.position())?;
                return jump_to(position, bounds);
            }
            Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) => {
                state.dragging = false;
            }
            _ => {}
        }
        None
    }

    fn mouse_interaction(
        &self,
        state: &Self::State,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> mouse::Interaction {
        if state.dragging {
            mouse::Interaction::Grabbing
        } else if cursor.is_over(bounds) {
            mouse::Interaction::Pointer
        } else {
            mouse::Interaction::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Viewport {
        let mut viewport = Viewport::new(10_000.0);
        viewport.resize(800.0, 600.0);
        viewport
    }

    #[test]
    fn test_block_marks_scale_against_total_duration() {
        let block = TraceBlock::new("A", 2500.0, 1000.0).at(2, 3);
        let mark = minimap_block_rect(&block, 10_000.0, 400.0, 100.0).unwrap();
        assert_eq!(mark.x, 100.0);
        assert_eq!(mark.width, 40.0);
        assert_eq!(mark.y, 40.0);
        assert_eq!(mark.height, 2.0);

        // Lanes wrap around the minimap height.
        let wrapped = TraceBlock::new("B", 0.0, 1.0).at(6, 0);
        let mark = minimap_block_rect(&wrapped, 10_000.0, 400.0, 100.0).unwrap();
        assert_eq!(mark.y, 20.0);
        assert_eq!(mark.width, 1.0);

        assert!(minimap_block_rect(&block, 0.0, 400.0, 100.0).is_none());
    }

    #[test]
    fn test_highlight_tracks_visible_range() {
        let mut viewport = viewport();
        viewport.set_offset(0.0, 100.0);
        // 800 px at 0.1 px/ms shows 0..8000 ms of 10 000 ms.
        let (x, w) = viewport_highlight(&viewport, 500.0).unwrap();
        assert!(x.abs() < 1e-9);
        assert!((w - 400.0).abs() < 1e-9);

        viewport.pan_by(-400.0, 0.0);
        let (x, w) = viewport_highlight(&viewport, 500.0).unwrap();
        assert!((x - 200.0).abs() < 1e-9);
        // The right edge is clamped to the end of the trace.
        assert!((w - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_highlight_keeps_a_minimum_width() {
        let mut viewport = viewport();
        viewport.set_zoom(10_000.0);
        viewport.set_offset(viewport.offset_centering(5000.0), 100.0);
        let (x, w) = viewport_highlight(&viewport, 500.0).unwrap();
        assert_eq!(w, 2.0);
        assert!((x - 250.0).abs() < 0.05);

        viewport.set_offset(1.0e9, 100.0);
        let (x, w) = viewport_highlight(&viewport, 500.0).unwrap();
        assert_eq!((x, w), (0.0, 2.0));
    }

    #[test]
    fn test_jump_centres_target_and_keeps_zoom() {
        let mut viewport = viewport();
        viewport.zoom_at(300.0, 2.5);
        let zoom = viewport.zoom();

        let offset = offset_for_fraction(&viewport, 0.25);
        viewport.set_offset(offset, viewport.offset_y);
        assert!((viewport.time_to_x(2500.0) - 400.0).abs() < 1e-9);
        assert_eq!(viewport.zoom(), zoom);

        assert_eq!(offset_for_fraction(&viewport, 2.0), offset_for_fraction(&viewport, 1.0));
        assert_eq!(offset_for_fraction(&viewport, f64::NAN), offset_for_fraction(&viewport, 0.0));
    }
}
