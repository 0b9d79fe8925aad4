// The ruler is drawn into the overlay frame after the blocks so it stays on top.
use super::ticks::{format_time_label, ruler_ticks};
use super::viewport::Viewport;
use super::RULER_HEIGHT;
use iced::widget::canvas;
use iced::{Color, Point, Size};

const TICK_LENGTH: f32 = 10.0;
const LABEL_RISE: f32 = 25.0;

pub(crate) fn draw_ruler(frame: &mut canvas::Frame, viewport: &Viewport) {
    let width = viewport.view_width as f32;
    let height = RULER_HEIGHT as f32;

    frame.fill_rectangle(
        Point::new(0.0, 0.0),
        Size::new(width, height),
        Color::from_rgb8(0xF0, 0xF0, 0xF0),
    );

    for (x, time_ms) in ruler_ticks(viewport) {
        let x = x as f32;
        frame.stroke(
            &canvas::Path::line(Point::new(x, height - TICK_LENGTH), Point::new(x, height)),
            canvas::Stroke::default()
                .with_color(Color::from_rgb8(0xC0, 0xC0, 0xC0))
                .with_width(1.0),
        );

        frame.fill_text(canvas::Text {
            content: format_time_label(time_ms),
            position: Point::new(x + 3.0, height - LABEL_RISE),
            color: Color::from_rgb8(0x80, 0x80, 0x80),
            size: 10.0.into(),
            ..Default::default()
        });
    }

    frame.stroke(
        &canvas::Path::line(Point::new(0.0, height), Point::new(width, height)),
        canvas::Stroke::default()
            .with_color(Color::from_rgb(0.85, 0.85, 0.85))
            .with_width(0.5),
    );
}
