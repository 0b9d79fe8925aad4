use crate::cli::Settings;
use crate::data::TraceMetadata;
use crate::Message;
use iced::widget::text::IntoFragment;
use iced::widget::{button, column, container, row, text, Space};
use iced::{Alignment, Element, Length};

fn hint<'a>(key: &'a str, action: impl IntoFragment<'a>) -> Element<'a, Message> {
    row![
        text(key).width(Length::Fixed(200.0)).size(12),
        text(action).size(12)
    ]
    .into()
}

/// Controls overview plus the settings this run was started with.
pub fn view<'a>(
    settings: &'a Settings,
    metadata: &'a TraceMetadata,
    adapter: Option<String>,
    last_action_message: Option<&'a str>,
) -> Element<'a, Message> {
    let hints = column![
        text("Hints").size(16),
        hint("Mouse wheel:", "Zoom around the cursor"),
        hint("Shift + mouse wheel:", "Pan horizontally"),
        hint("Left click:", "Select the block under the cursor"),
        hint("Left click + drag:", "Pan the timeline"),
        hint("Minimap click or drag:", "Centre the view on that time, keeping the zoom"),
        hint("Hotspot entry:", "Jump to the first call of that method and select it"),
        hint("Filter box:", "Dim every block whose name does not contain the text"),
        hint("Jump to source:", "Open the selected block's source file"),
    ]
    .spacing(6)
    .padding(6);

    let active = column![
        text("Active settings").size(16),
        hint("Seed:", settings.seed.to_string()),
        hint("Threads:", settings.threads.to_string()),
        hint("Trace duration:", format!("{:.0}ms", settings.duration_ms)),
        hint("Hotspots listed:", settings.hotspots.to_string()),
        hint("Frame interval:", format!("{:?}", settings.frame_interval)),
        hint("Fence timeout:", format!("{:?}", settings.fence_timeout)),
        hint(
            "Trace:",
            format!(
                "{} blocks on {} threads, max depth {}",
                metadata.blocks().len(),
                metadata.thread_count(),
                metadata.max_depth()
            )
        ),
        hint("GPU adapter:", adapter.unwrap_or_else(|| "none".to_string())),
    ]
    .spacing(6)
    .padding(6);

    let settings_col = column![
        text("Settings").size(20),
        row![
            button(text("Back to timeline").size(12)).on_press(Message::ToggleSettings),
            if let Some(msg) = last_action_message {
                Element::from(text(msg).size(12))
            } else {
                Element::from(Space::new().width(Length::Fill))
            }
        ]
        .spacing(10)
        .align_y(Alignment::Center),
        container(hints).padding(6).style(|_theme: &iced::Theme| {
            container::Style::default().background(iced::Color::from_rgb(0.99, 0.99, 0.99))
        }),
        container(active).padding(6),
    ]
    .spacing(8)
    .padding(10);

    container(settings_col)
        .width(Length::Fill)
        .height(Length::Fill)
        .center_x(Length::Fill)
        .style(|theme: &iced::Theme| {
            let palette = theme.extended_palette();
            container::Style::default()
                .background(palette.background.base.color)
                .border(iced::Border {
                    color: palette.background.strong.color,
                    width: 1.0,
                    ..Default::default()
                })
        })
        .into()
}
