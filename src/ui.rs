use crate::data::MethodStats;
use crate::session::TimelineSession;
use crate::Message;
use iced::widget::{button, column, container, progress_bar, row, scrollable, text, Space};
use iced::{Alignment, Element, Length, Theme};

pub const SIDE_PANEL_WIDTH: f32 = 260.0;

pub fn neutral_button_style(theme: &Theme, status: button::Status) -> button::Style {
    let palette = theme.extended_palette();
    let base = button::Style {
        text_color: palette.background.weak.text,
        ..Default::default()
    };
    match status {
        button::Status::Hovered | button::Status::Pressed => button::Style {
            background: Some(palette.background.strong.color.into()),
            ..base
        },
        _ => base,
    }
}

fn panel_style(theme: &Theme) -> container::Style {
    let palette = theme.extended_palette();
    container::Style::default()
        .background(palette.background.weak.color)
        .border(iced::Border {
            color: palette.background.strong.color,
            width: 1.0,
            ..Default::default()
        })
}

/// Top methods in view; pressing one jumps to its first call.
pub fn hotspot_panel(hotspots: &[MethodStats]) -> Element<'_, Message> {
    let mut list = column![text("Hotspots in view").size(16)].spacing(4);

    if hotspots.is_empty() {
        list = list.push(text("Nothing visible").size(12));
    }
    for (rank, stats) in hotspots.iter().enumerate() {
        let entry = row![
            text(format!("{}.", rank + 1)).size(12).width(Length::Fixed(20.0)),
            text(stats.name.as_str()).size(12).width(Length::Fill),
            text(format!("{:.1}ms", stats.total_duration_ms)).size(12),
        ]
        .spacing(6)
        .align_y(Alignment::Center);

        list = list.push(
            button(entry)
                .width(Length::Fill)
                .style(neutral_button_style)
                .on_press(Message::HotspotFocused(stats.name.clone())),
        );
    }

    container(scrollable(list))
        .padding(8)
        .width(Length::Fill)
        .height(Length::FillPortion(3))
        .style(panel_style)
        .into()
}

/// Whole-trace figures for the selected block's method.
pub fn details_panel(session: &TimelineSession) -> Element<'_, Message> {
    let content: Element<'_, Message> = match (session.selected_block(), session.selected_stats()) {
        (Some(block), Some(stats)) => {
            let source = match (&block.source_file, block.line) {
                (Some(file), Some(line)) => format!("{file}:{line}"),
                (Some(file), None) => file.clone(),
                _ => "No source location".to_string(),
            };
            column![
                text(stats.name.clone()).size(16),
                text(format!("Thread {} · depth {}", block.thread_id, block.depth)).size(12),
                text(format!("This call: {:.2}ms", block.duration_ms)).size(12),
                text(format!("Total time: {:.2}ms", stats.total_duration_ms)).size(12),
                text(format!("Calls: {}", stats.call_count)).size(12),
                text(format!("Share of trace: {:.1}%", stats.percentage)).size(12),
                progress_bar(0.0..=100.0, stats.percentage as f32),
                text(source).size(10),
            ]
            .spacing(6)
            .into()
        }
        _ => column![
            text("Details").size(16),
            text("Click a block to see its method statistics").size(12),
            Space::new().height(Length::Fill),
        ]
        .spacing(6)
        .into(),
    };

    container(content)
        .padding(8)
        .width(Length::Fill)
        .height(Length::FillPortion(2))
        .style(panel_style)
        .into()
}
