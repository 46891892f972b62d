use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyEventKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, info};

mod actions;
mod activity;
mod app;
mod config;
mod control;
mod dispatch;
mod hud;
mod logtail;
mod mesh;
mod process;
mod registry;
mod server;
mod tmux;
mod view;

use actions::Action;
use app::App;
use config::{Args, Config, Mode, LISTING_POLL_INTERVAL, LOG_POLL_INTERVAL, WATCH_LOG_LINES};
use hud::Hud;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mode = args.command.unwrap_or(Mode::Serve);
    let config = Config::from_args(&args);

    init_logging(&config, mode);

    let hud = Arc::new(Hud::from_config(config));
    match mode {
        Mode::Serve => serve(hud).await,
        Mode::Watch => run_watch(hud).await,
    }
}

fn init_logging(config: &Config, mode: Mode) {
    // The dashboard owns the terminal; only log there when explicitly asked
    if mode == Mode::Watch && std::env::var_os("RUST_LOG").is_none() {
        return;
    }

    let level = if config.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

async fn serve(hud: Arc<Hud>) -> Result<()> {
    let config = hud.config();
    let addr: SocketAddr = config
        .addr
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        %addr,
        state_dir = %config.state_dir.display(),
        logs_dir = %config.logs_dir.display(),
        script = %config.script.display(),
        "agent-hud listening"
    );

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
    };

    axum::serve(listener, server::router(hud))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")
}

async fn run_watch(hud: Arc<Hud>) -> Result<()> {
    // Create event channel
    let (tx, mut rx) = mpsc::unbounded_channel::<Action>();
    let (selected_tx, selected_rx) = watch::channel::<Option<u16>>(None);
    let listing_refresh = Arc::new(Notify::new());
    let log_refresh = Arc::new(Notify::new());

    // Initialize terminal
    let mut terminal = ratatui::init();

    // Spawn input handler
    let input_tx = tx.clone();
    tokio::task::spawn_blocking(move || loop {
        if event::poll(Duration::from_millis(100)).unwrap_or(false) {
            if let Ok(Event::Key(key)) = event::read() {
                if key.kind == KeyEventKind::Press && input_tx.send(Action::KeyPress(key)).is_err() {
                    break;
                }
            }
        } else if input_tx.is_closed() {
            break;
        }
    });

    // Spawn listing poller
    tokio::spawn(poll_listing(hud.clone(), tx.clone(), listing_refresh.clone()));

    // Spawn log poller for whichever agent is selected
    tokio::spawn(poll_log(hud.clone(), tx.clone(), selected_rx, log_refresh.clone()));

    let mut app = App::new();

    // Main event loop
    let result = loop {
        // Render
        if let Err(e) = terminal.draw(|f| app.render(f)) {
            break Err(e.into());
        }

        selected_tx.send_if_modified(|current| {
            let selected = app.selected_port();
            if *current != selected {
                *current = selected;
                true
            } else {
                false
            }
        });

        // Process any pending actions from the app
        for pending_action in app.take_pending_actions() {
            match pending_action {
                Action::Refresh => {
                    listing_refresh.notify_one();
                    log_refresh.notify_one();
                }
                action @ (Action::StartAgent(_)
                | Action::StopAgent(_)
                | Action::SendText(..)
                | Action::SendKey(..)) => spawn_mutation(hud.clone(), tx.clone(), action),
                _ => {}
            }
        }

        // Handle events from channel
        match rx.recv().await {
            Some(action) => match app.handle_action(action) {
                Ok(true) => break Ok(()),
                Ok(false) => {}
                Err(e) => break Err(e),
            },
            None => break Ok(()),
        }
    };

    // Restore terminal
    ratatui::restore();
    result
}

async fn poll_listing(hud: Arc<Hud>, tx: mpsc::UnboundedSender<Action>, refresh: Arc<Notify>) {
    loop {
        if tx.send(Action::PollStarted).is_err() {
            return;
        }
        let listing = hud.list_agents_for_display().await;
        if tx.send(Action::AgentsUpdated(listing)).is_err() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(LISTING_POLL_INTERVAL) => {}
            _ = refresh.notified() => {}
        }
    }
}

async fn poll_log(
    hud: Arc<Hud>,
    tx: mpsc::UnboundedSender<Action>,
    mut selected: watch::Receiver<Option<u16>>,
    refresh: Arc<Notify>,
) {
    loop {
        let port = *selected.borrow_and_update();
        if let Some(port) = port {
            match hud.read_log_window(port, WATCH_LOG_LINES, 0).await {
                Ok(window) => {
                    if tx.send(Action::LogUpdated(window)).is_err() {
                        return;
                    }
                }
                // Skipped until the next poll succeeds
                Err(e) => debug!(port, error = %e, "log poll failed"),
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(LOG_POLL_INTERVAL) => {}
            _ = refresh.notified() => {}
            changed = selected.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

/// Run one start/stop/input/key call off the UI loop and report back
fn spawn_mutation(hud: Arc<Hud>, tx: mpsc::UnboundedSender<Action>, action: Action) {
    tokio::spawn(async move {
        let dispatcher = hud.dispatcher();
        let result = match action {
            Action::StartAgent(name) => dispatcher.start_agent(&name, None).await.map(|started| {
                match started.port {
                    Some(port) => format!("Agent '{}' started on port {}", name, port),
                    None => format!("Agent '{}' started", name),
                }
            }),
            Action::StopAgent(port) => dispatcher
                .stop_agent(port)
                .await
                .map(|_| format!("Agent on port {} stopped", port)),
            Action::SendText(port, text) => dispatcher
                .send_text(port, &text)
                .await
                .map(|_| format!("Input sent to port {}", port)),
            Action::SendKey(port, key) => dispatcher
                .send_key(port, key.as_str())
                .await
                .map(|(key, _)| format!("Sent {} to port {}", key, port)),
            _ => return,
        };
        let _ = tx.send(Action::MutationDone(result.map_err(|e| e.to_string())));
    });
}
