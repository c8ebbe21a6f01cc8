//! Terminal UI for viddy: widget layout, key handling, logging setup, and
//! the entry point the `viddy` binary calls.

use std::fs::OpenOptions;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use viddy_core::Controller;
use viddy_core::config::Config;

mod app;
mod app_event;
mod app_event_sender;
mod body_view;
mod cli;
mod help_view;
mod history_view;
mod keymap;
mod log_layer;
mod status_line;
mod theme;
mod tui;

pub use cli::Cli;

use app::App;
use log_layer::TuiLogLayer;

pub async fn run_main(cli: Cli) -> anyhow::Result<()> {
    let overrides = cli.into_overrides();
    let config_toml = viddy_core::config::load_config_toml()?;
    let config = Config::load_with_overrides(config_toml, overrides)?;

    // File logging lives under the user state dir; RUST_LOG overrides the
    // default filter.
    let env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("viddy_core=info,viddy_tui=info"));

    let log_dir = dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|dir| dir.join("viddy"));

    let mut appender_guard = None;
    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join("viddy.log"))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            appender_guard = Some(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_target(false)
                    .with_filter(env_filter()),
            )
        }
        None => None,
    };

    // The in-app log view mirrors the tracing stream when --debug is set.
    let (tui_log_layer, log_rx) = if config.general.debug {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Some(TuiLogLayer::new(tx).with_filter(env_filter())),
            Some(rx),
        )
    } else {
        (None, None)
    };

    let _ = tracing_subscriber::registry()
        .with(file_layer)
        .with(tui_log_layer)
        .try_init();

    let result = run_ratatui_app(config, log_rx).await;
    drop(appender_guard);
    result
}

async fn run_ratatui_app(
    config: Config,
    log_rx: Option<mpsc::UnboundedReceiver<String>>,
) -> anyhow::Result<()> {
    color_eyre::install().map_err(|err| anyhow::anyhow!("{err}"))?;

    let (controller, handle, events_rx) = Controller::new(&config);
    tokio::spawn(controller.run());

    let mut terminal = tui::init()?;
    let mut app = App::new(&config, handle.clone(), events_rx, log_rx);
    let result = app.run(&mut terminal).await;

    tui::restore()?;
    handle.shutdown();

    result?;
    Ok(())
}
