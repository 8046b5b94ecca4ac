mod core;
mod display;
mod engine;
mod http;
mod mpv;
mod poller;
mod selection;
mod view;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use utawaku_proto::catalog::load_catalog;
use utawaku_proto::config::Config;

use crate::display::ViewDisplay;
use crate::view::SessionView;

/// Mirrors WARN and ERROR events into the session view's log ring, so the
/// page can show them.
struct AlertLayer {
    view: Arc<SessionView>,
}

impl<S> tracing_subscriber::Layer<S> for AlertLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = format!("{} [{}] ", chrono::Local::now().format("%H:%M:%S"), level);
        event.record(&mut MessageVisitor(&mut message));
        self.view.push_log(message);
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config first: the view needs the display strings before logging starts.
    let (config, config_err) = match Config::load() {
        Ok(c) => (c, None),
        Err(e) => (Config::default(), Some(e)),
    };

    let view = Arc::new(SessionView::new(&config.display));

    let data_dir = utawaku_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("utawaku.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(AlertLayer { view: view.clone() })
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,utawaku_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);
    match config_err {
        None => info!("Config: {:?}", Config::config_path()),
        Some(e) => warn!("Config {:?} unreadable, using defaults: {}", Config::config_path(), e),
    }

    // Nothing may observe the catalog before it is loaded.
    let catalog = Arc::new(load_catalog(&config.catalog.source).await);

    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<core::SessionEvent>(256);

    let engine = mpv::MpvEngine::construct(config.player.clone(), event_tx.clone()).await?;

    let sink = Arc::new(ViewDisplay::new(
        view.clone(),
        config.display.song_label_prefix.clone(),
    ));
    let session = core::SessionCore::new(
        catalog.clone(),
        engine,
        sink,
        config.display.clone(),
        event_tx.clone(),
    );

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            view.clone(),
            catalog.clone(),
            event_tx.clone(),
        );
    }

    let shutdown_tx = event_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            let _ = shutdown_tx.send(core::SessionEvent::Shutdown).await;
        }
    });
    drop(event_tx);

    info!("Session initialised, running event loop");
    session.run(event_rx).await?;

    Ok(())
}
