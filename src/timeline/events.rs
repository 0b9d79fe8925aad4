use crate::data::TraceBlock;
use crate::session::TimelineSession;
use crate::Message;
use iced::mouse;
use iced::widget::canvas::{self, Geometry, Program};
use iced::{keyboard, Color, Point, Rectangle, Renderer, Size, Theme};
use unicode_width::UnicodeWidthStr;

use super::header::draw_ruler;
use super::viewport::BlockRect;
use super::{color_from_label, fit_label, LABEL_MIN_WIDTH, LABEL_PADDING, LABEL_SIZE};

const BLOCK_RADIUS: f32 = 2.0;
const TOOLTIP_OFFSET: f32 = 20.0;
const TOOLTIP_PADDING: f32 = 12.0;
const TOOLTIP_RADIUS: f32 = 8.0;
const TOOLTIP_TEXT_SIZE: f32 = 12.0;
const TOOLTIP_LINE_HEIGHT: f32 = 18.0;
/// Approximate advance of one column of tooltip text.
const TOOLTIP_COLUMN_WIDTH: f32 = 7.0;
/// Wheel pixels that count as one line.
const PIXELS_PER_LINE: f32 = 50.0;
/// Shift + wheel pan distance per line.
const PAN_PER_LINE: f32 = 30.0;

/// How one block is painted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockStyle {
    pub fill: Color,
    pub border: Color,
    pub border_width: f32,
}

impl BlockStyle {
    pub fn opacity(&self) -> f32 {
        self.fill.a
    }

    /// Labels are skipped on dimmed blocks.
    pub fn shows_label(&self, width: f64) -> bool {
        width > LABEL_MIN_WIDTH && self.opacity() > 0.5
    }
}

/// `filter_match` is `None` when no filter is active.
pub fn block_style(name: &str, selected: bool, filter_match: Option<bool>) -> BlockStyle {
    let opacity = match (selected, filter_match) {
        (true, _) => 1.0,
        (false, Some(true)) => 1.0,
        (false, Some(false)) => 0.1,
        (false, None) => 0.8,
    };
    let (border, border_width) = if selected {
        (Color::from_rgb(1.0, 0.85, 0.0), 2.0)
    } else if filter_match == Some(true) {
        (Color::WHITE, 1.2)
    } else {
        (Color::from_rgba(0.0, 0.0, 0.0, 0.6), 0.5)
    };
    BlockStyle {
        fill: Color {
            a: opacity,
            ..color_from_label(name)
        },
        border,
        border_width,
    }
}

/// Lines shown in the hover tooltip.
pub fn tooltip_lines(block: &TraceBlock) -> [String; 2] {
    [
        format!("Method: {}", block.name),
        format!("Duration: {:.2}ms", block.duration_ms),
    ]
}

/// Wheel zoom factor for a scroll of `lines`; positive lines zoom in.
pub fn wheel_zoom_factor(lines: f32) -> f64 {
    1.1f64.powf(lines as f64)
}

fn scroll_lines(delta: &mouse::ScrollDelta) -> f32 {
    match delta {
        mouse::ScrollDelta::Lines { y, .. } => *y,
        mouse::ScrollDelta::Pixels { y, .. } => *y / PIXELS_PER_LINE,
    }
}

/// Draws the block overlay, ruler and tooltip over the composited base layer
/// and turns pointer input into view messages.
pub struct OverlayProgram<'a> {
    pub session: &'a TimelineSession,
}

#[derive(Default)]
pub struct OverlayState {
    pub modifiers: keyboard::Modifiers,
    pub press_position: Option<Point>,
    pub last_drag_position: Option<Point>,
    pub dragging: bool,
}

/// A message published by the overlay, and whether it consumes the event.
#[derive(Debug, Clone, PartialEq)]
struct Reaction {
    message: Message,
    capture: bool,
}

impl Reaction {
    fn publish(message: Message) -> Self {
        Self {
            message,
            capture: false,
        }
    }

    fn capture(message: Message) -> Self {
        Self {
            message,
            capture: true,
        }
    }

    fn into_action(self) -> canvas::Action<Message> {
        let action = canvas::Action::publish(self.message);
        if self.capture { action.and_capture() } else { action }
    }
}

impl OverlayProgram<'_> {
    /// Input is handled first. A size change is reported on the next event
    /// that publishes nothing, which includes every redraw.
    fn react(
        &self,
        state: &mut OverlayState,
        event: &iced::Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<Reaction> {
        self.react_to_input(state, event, bounds, cursor)
            .or_else(|| self.resize_reaction(bounds))
    }

    fn resize_reaction(&self, bounds: Rectangle) -> Option<Reaction> {
        let viewport = self.session.viewport();
        if bounds.width as f64 == viewport.view_width && bounds.height as f64 == viewport.view_height {
            return None;
        }
        Some(Reaction::publish(Message::ViewportResized {
            width: bounds.width,
            height: bounds.height,
        }))
    }

    fn react_to_input(
        &self,
        state: &mut OverlayState,
        event: &iced::Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<Reaction> {
        match event {
            iced::Event::Keyboard(keyboard::Event::ModifiersChanged(modifiers)) => {
                state.modifiers = *modifiers;
            }
            iced::Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                if let Some(position) = cursor.position_in(bounds) {
                    state.press_position = Some(position);
                    state.last_drag_position = Some(position);
                    state.dragging = false;
                    return Some(Reaction::capture(Message::Pressed));
                }
            }
            iced::Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) => {
                state.press_position = None;
                state.last_drag_position = None;
                state.dragging = false;
            }
            iced::Event::Mouse(mouse::Event::CursorMoved { .. }) => {
                if let Some(press_position) = state.press_position {
                    let position = cursor.position_from(bounds.position()).unwrap_or(press_position);
                    let delta = position - press_position;
                    if !state.dragging && delta.x.hypot(delta.y) > super::DRAG_THRESHOLD as f32 {
                        state.dragging = true;
                    }
                    if state.dragging {
                        let last = state.last_drag_position.unwrap_or(press_position);
                        state.last_drag_position = Some(position);
                        return Some(Reaction::capture(Message::Panned {
                            dx: position.x - last.x,
                            dy: position.y - last.y,
                        }));
                    }
                }
                return match cursor.position_in(bounds) {
                    Some(position) => Some(Reaction::publish(Message::PointerMoved(position))),
                    None => self.pointer_left(),
                };
            }
            iced::Event::Mouse(mouse::Event::CursorLeft) => return self.pointer_left(),
            iced::Event::Mouse(mouse::Event::WheelScrolled { delta }) => {
                if let Some(position) = cursor.position_in(bounds) {
                    let lines = scroll_lines(delta);
                    if lines == 0.0 {
                        return None;
                    }
                    let message = if state.modifiers.shift() {
                        Message::Panned {
                            dx: lines * PAN_PER_LINE,
                            dy: 0.0,
                        }
                    } else {
                        Message::Zoomed {
                            lines,
                            x: position.x,
                        }
                    };
                    return Some(Reaction::capture(message));
                }
            }
            _ => {}
        }
        None
    }

    /// Only the first move off the overlay needs to clear the hover.
    fn pointer_left(&self) -> Option<Reaction> {
        self.session
            .pointer()
            .is_some()
            .then(|| Reaction::publish(Message::PointerLeft))
    }

    fn draw_block(&self, frame: &mut canvas::Frame, block: &TraceBlock, rect: BlockRect, index: usize) {
        let session = self.session;
        let selected = session.selected_index() == Some(index);
        let filter_match = session
            .filter_active()
            .then(|| session.matches_filter(&block.name));
        let style = block_style(&block.name, selected, filter_match);

        let position = Point::new(rect.x as f32, rect.y as f32);
        let size = Size::new((rect.width as f32).max(1.0), rect.height as f32);
        let path = canvas::Path::rounded_rectangle(position, size, BLOCK_RADIUS.into());
        frame.fill(&path, style.fill);
        frame.stroke(
            &path,
            canvas::Stroke::default()
                .with_color(style.border)
                .with_width(style.border_width),
        );

        if !style.shows_label(rect.width) {
            return;
        }
        let Some(label) = fit_label(&block.name, rect.width - 2.0 * LABEL_PADDING) else {
            return;
        };
        frame.with_clip(Rectangle::new(position, size), |frame| {
            frame.fill_text(canvas::Text {
                content: label,
                position: Point::new(LABEL_PADDING as f32, size.height / 2.0),
                color: Color::from_rgba(0.1, 0.1, 0.1, style.opacity()),
                size: LABEL_SIZE.into(),
                align_y: iced::alignment::Vertical::Center.into(),
                ..Default::default()
            });
        });
    }

    fn draw_tooltip(&self, frame: &mut canvas::Frame, block: &TraceBlock, pointer: Point) {
        let lines = tooltip_lines(block);
        let columns = lines.iter().map(|line| line.width()).max().unwrap_or(0);
        let size = Size::new(
            columns as f32 * TOOLTIP_COLUMN_WIDTH + 2.0 * TOOLTIP_PADDING,
            lines.len() as f32 * TOOLTIP_LINE_HEIGHT + 2.0 * TOOLTIP_PADDING,
        );

        // Keep the box on screen when the pointer is near the right or bottom edge.
        let viewport = self.session.viewport();
        let mut origin = Point::new(pointer.x + TOOLTIP_OFFSET, pointer.y + TOOLTIP_OFFSET);
        let max_x = viewport.view_width as f32 - size.width;
        let max_y = viewport.view_height as f32 - size.height;
        if origin.x > max_x {
            origin.x = (pointer.x - TOOLTIP_OFFSET - size.width).max(0.0);
        }
        if origin.y > max_y {
            origin.y = (pointer.y - TOOLTIP_OFFSET - size.height).max(0.0);
        }

        frame.fill(
            &canvas::Path::rounded_rectangle(origin, size, TOOLTIP_RADIUS.into()),
            Color::from_rgba8(0x1E, 0x1E, 0x1E, 0xF0 as f32 / 255.0),
        );
        for (row, line) in lines.into_iter().enumerate() {
            frame.fill_text(canvas::Text {
                content: line,
                position: Point::new(
                    origin.x + TOOLTIP_PADDING,
                    origin.y + TOOLTIP_PADDING + row as f32 * TOOLTIP_LINE_HEIGHT,
                ),
                color: Color::WHITE,
                size: TOOLTIP_TEXT_SIZE.into(),
                ..Default::default()
            });
        }
    }
}

impl Program<Message> for OverlayProgram<'_> {
    type State = OverlayState;

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());
        let viewport = self.session.viewport();

        for (index, block, rect) in viewport.visible_blocks(self.session.metadata().blocks()) {
            self.draw_block(&mut frame, block, rect, index);
        }

        draw_ruler(&mut frame, viewport);

        if let (Some(block), Some((x, y))) = (self.session.hovered_block(), self.session.pointer()) {
            self.draw_tooltip(&mut frame, block, Point::new(x as f32, y as f32));
        }

        vec![frame.into_geometry()]
    }

    fn update(
        &self,
        state: &mut Self::State,
        event: &iced::Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<canvas::Action<Message>> {
        self.react(state, event, bounds, cursor).map(Reaction::into_action)
    }

    fn mouse_interaction(
        &self,
        state: &Self::State,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> mouse::Interaction {
        if state.dragging {
            mouse::Interaction::Grabbing
        } else if cursor.is_over(bounds) && self.session.hovered_index().is_some() {
            mouse::Interaction::Pointer
        } else {
            mouse::Interaction::default()
        }
    }
}
