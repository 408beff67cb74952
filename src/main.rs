mod api;
mod app;
mod application;
mod config;
mod credentials;
mod dependencies;
mod domain;
mod parser;
mod ui;
mod utils;

use iced::{window, Size};
use tracing_subscriber::EnvFilter;

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ytdlp_desk=info")),
        )
        .init();

    iced::application(app::DownloadApp::default, app::update, app::view)
        .title("yt-dlp Desk")
        .subscription(app::subscription)
        .window(window::Settings {
            size: Size::new(560.0, 640.0),
            min_size: Some(Size::new(480.0, 520.0)),
            ..Default::default()
        })
        .run()
}
