use clap::Parser;
use iced::widget::{button, canvas::Canvas, column, container, image, row, stack, text, text_input, Space};
use iced::{Alignment, Color, ContentFit, Element, Length, Point, Subscription, Task};
use std::path::Path;
use std::sync::Arc;

mod cli;
mod compositor;
mod data;
mod error;
mod observers;
mod session;
mod settings;
mod timeline;
mod ui;

use cli::Settings;
use compositor::{FrameCompositor, FrameStatus, Framebuffer, Invalidation, SkipReason, WgpuDevice};
use error::GpuError;
use session::TimelineSession;
use timeline::events::{wheel_zoom_factor, OverlayProgram};
use timeline::minimap::{offset_for_fraction, MinimapProgram};

const MINIMAP_HEIGHT: f32 = 80.0;

pub fn main() -> iced::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let settings = Settings::from(cli::Args::parse());
    log::info!("Starting with {settings:?}");

    iced::application(
        move || TraceLens::new(settings.clone()),
        TraceLens::update,
        TraceLens::view,
    )
    .title(TraceLens::title)
    .subscription(TraceLens::subscription)
    .run()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ViewportResized { width: f32, height: f32 },
    PointerMoved(Point),
    PointerLeft,
    Pressed,
    Panned { dx: f32, dy: f32 },
    Zoomed { lines: f32, x: f32 },
    MinimapJump { fraction: f64 },
    Tick,
    FilterChanged(String),
    HotspotFocused(String),
    JumpToSource,
    ToggleSettings,
}

struct TraceLens {
    settings: Settings,
    session: TimelineSession,
    compositor: Option<FrameCompositor<WgpuDevice>>,
    framebuffer: Framebuffer,
    base_layer: Option<image::Handle>,
    invalidation: Invalidation,
    gpu_error: Option<GpuError>,
    show_settings: bool,
    last_action_message: Option<String>,
}

impl TraceLens {
    fn new(settings: Settings) -> (Self, Task<Message>) {
        let metadata = Arc::new(data::generate_mock_data(
            settings.seed,
            settings.threads,
            settings.duration_ms,
        ));
        let mut session = TimelineSession::new(metadata, settings.hotspots);

        let invalidation = Invalidation::new();
        {
            let invalidation = invalidation.clone();
            session.subscribe_view(move |_| invalidation.request());
        }
        session.subscribe_selection(|block| match block {
            Some(block) => log::debug!(
                "Selected {} at {:.2}ms on thread {}",
                block.name,
                block.start_ms,
                block.thread_id
            ),
            None => log::debug!("Selection cleared"),
        });
        session.subscribe_hotspots(|hotspots| {
            log::trace!("{} hotspots in view", hotspots.len());
        });

        let (compositor, gpu_error) = match WgpuDevice::new() {
            Ok(device) => (Some(FrameCompositor::new(device, settings.fence_timeout)), None),
            Err(err) => {
                log::error!("GPU initialisation failed: {err}");
                (None, Some(err))
            }
        };

        (
            Self {
                settings,
                session,
                compositor,
                framebuffer: Framebuffer::default(),
                base_layer: None,
                invalidation,
                gpu_error,
                show_settings: false,
                last_action_message: None,
            },
            Task::none(),
        )
    }

    fn title(&self) -> String {
        if self.show_settings {
            return "TraceLens - Settings".to_string();
        }
        format!("TraceLens - {}", self.session.metadata().process_name)
    }

    /// The frame timer stops once the compositor has nothing left to draw.
    fn subscription(&self) -> Subscription<Message> {
        let compositing = self
            .compositor
            .as_ref()
            .is_some_and(|compositor| !compositor.has_failed());
        if !compositing {
            return Subscription::none();
        }
        iced::time::every(self.settings.frame_interval).map(|_| Message::Tick)
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::ViewportResized { width, height } => {
                self.session.resize(width as f64, height as f64);
                let (width, height) = (width.max(0.0).round() as u32, height.max(0.0).round() as u32);
                if self.framebuffer.resize(width, height) {
                    self.base_layer = None;
                    self.invalidation.request();
                }
            }
            Message::PointerMoved(position) => {
                self.session.hover(position.x as f64, position.y as f64);
            }
            Message::PointerLeft => {
                self.session.leave();
            }
            Message::Pressed => self.session.select_hovered(),
            Message::Panned { dx, dy } => self.session.pan_by(dx as f64, dy as f64),
            Message::Zoomed { lines, x } => {
                self.session.zoom_at(x as f64, wheel_zoom_factor(lines));
            }
            Message::MinimapJump { fraction } => {
                let viewport = self.session.viewport();
                let offset_x = offset_for_fraction(viewport, fraction);
                let offset_y = viewport.offset_y;
                self.session.set_offset(offset_x, offset_y);
            }
            Message::Tick => self.composite_frame(),
            Message::FilterChanged(filter) => self.session.set_filter(filter),
            Message::HotspotFocused(name) => {
                if !self.session.focus_method(&name) {
                    log::warn!("No block named {name}");
                }
            }
            Message::JumpToSource => {
                self.last_action_message = match self.session.source_request() {
                    Some(path) => match open_in_system(Path::new(path)) {
                        Ok(()) => None,
                        Err(err) => {
                            log::warn!("Failed to open {path}: {err}");
                            Some(format!("Could not open {path}: {err}"))
                        }
                    },
                    None => None,
                };
            }
            Message::ToggleSettings => {
                self.show_settings = !self.show_settings;
            }
        }
        Task::none()
    }

    /// Runs on every tick; only does GPU work when something invalidated
    /// the base layer.
    fn composite_frame(&mut self) {
        let Some(compositor) = &self.compositor else {
            return;
        };
        if !self.invalidation.take() {
            return;
        }
        match compositor.composite(&mut self.framebuffer) {
            Ok(FrameStatus::Presented) => {
                self.base_layer = Some(image::Handle::from_rgba(
                    self.framebuffer.width(),
                    self.framebuffer.height(),
                    self.framebuffer.to_rgba(),
                ));
            }
            Ok(FrameStatus::Skipped(SkipReason::DeviceLost | SkipReason::EmptySurface)) => {}
            Ok(FrameStatus::Skipped(reason)) => {
                log::trace!("Frame skipped ({reason:?}), retrying next tick");
                self.invalidation.request();
            }
            Err(err) => {
                self.base_layer = None;
                self.gpu_error = Some(err);
            }
        }
    }

    fn view(&self) -> Element<'_, Message> {
        if self.compositor.is_none() {
            return self.startup_error_view();
        }

        let source = self.session.source_request().map(|_| Message::JumpToSource);
        let header = row![
            text(format!(
                "{} · {:.0}ms · zoom {:.2}x",
                self.session.metadata().process_name,
                self.session.metadata().total_duration_ms,
                self.session.viewport().zoom()
            ))
            .size(14),
            text_input("Filter methods…", self.session.filter())
                .on_input(Message::FilterChanged)
                .width(Length::Fixed(240.0)),
            Space::new().width(Length::Fill),
        ];
        let header = match &self.gpu_error {
            Some(err) => header.push(text(err.to_string()).size(12).color(Color::from_rgb(0.8, 0.2, 0.2))),
            None => header,
        };
        let header = header
            .push(button("Jump to source").on_press_maybe(source))
            .push(button(if self.show_settings { "Timeline" } else { "Settings" }).on_press(Message::ToggleSettings))
            .spacing(10)
            .padding(5)
            .align_y(Alignment::Center);

        let content: Element<'_, Message> = if self.show_settings {
            settings::view(
                &self.settings,
                self.session.metadata(),
                self.adapter_name(),
                self.last_action_message.as_deref(),
            )
        } else {
            self.timeline_view()
        };

        column![header, content].into()
    }

    fn adapter_name(&self) -> Option<String> {
        self.compositor
            .as_ref()
            .map(|compositor| compositor.device().adapter_name())
    }

    fn timeline_view(&self) -> Element<'_, Message> {
        let base_layer: Element<'_, Message> = match &self.base_layer {
            Some(handle) => image(handle.clone())
                .width(Length::Fill)
                .height(Length::Fill)
                .content_fit(ContentFit::Fill)
                .into(),
            None => container(Space::new())
                .width(Length::Fill)
                .height(Length::Fill)
                .style(|_theme: &iced::Theme| {
                    container::Style::default().background(Color::from_rgb(0.05, 0.05, 0.15))
                })
                .into(),
        };
        let overlay = Canvas::new(OverlayProgram {
            session: &self.session,
        })
        .width(Length::Fill)
        .height(Length::Fill);

        let minimap = Canvas::new(MinimapProgram {
            session: &self.session,
        })
        .width(Length::Fill)
        .height(Length::Fixed(MINIMAP_HEIGHT));

        let side_panel = column![
            ui::hotspot_panel(self.session.hotspots()),
            ui::details_panel(&self.session),
        ]
        .spacing(6)
        .width(Length::Fixed(ui::SIDE_PANEL_WIDTH));

        row![
            column![stack![base_layer, overlay], minimap].width(Length::Fill),
            side_panel,
        ]
        .spacing(6)
        .padding(5)
        .into()
    }

    fn startup_error_view(&self) -> Element<'_, Message> {
        let message = match &self.gpu_error {
            Some(err) => err.to_string(),
            None => "GPU unavailable".to_string(),
        };
        container(
            column![
                text("Unable to start the GPU renderer").size(20),
                text(message).size(14),
                text("Run with RUST_LOG=debug for details").size(12),
            ]
            .spacing(8)
            .align_x(Alignment::Center),
        )
        .width(Length::Fill)
        .height(Length::Fill)
        .center_x(Length::Fill)
        .center_y(Length::Fill)
        .into()
    }
}

/// Hand `path` to the platform's default opener.
fn open_in_system(path: &Path) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    let mut command = std::process::Command::new("open");
    #[cfg(target_os = "windows")]
    let mut command = std::process::Command::new("explorer");
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let mut command = std::process::Command::new("xdg-open");

    command.arg(path).spawn().map(|_| ())
}
