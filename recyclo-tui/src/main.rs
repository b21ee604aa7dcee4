//! Terminal UI for recyclo: classify a photo of an item, then show its disposal fee and
//! the collection centers that take it.

mod app;
mod capture;
mod input;
mod ui;

use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration as StdDuration,
};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event as CEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use recyclo_classifier_onnx as onnx;
use recyclo_core::{
    classifier::ClassifierAdapter,
    config::AppConfig,
    resolver::LabelResolver,
    service::{CycleOutcome, RecycloService},
};
use recyclo_store_supabase as supabase;
use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::capture::FileCapture;
use crate::input::Action;

const DEFAULT_CONFIG_PATH: &str = "recyclo.toml";
const LOG_FILE: &str = "recyclo.log";
const LOG_FILTER_ENV: &str = "RECYCLO_LOG";

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config(std::env::args().nth(1).map(PathBuf::from))?;
    init_logging(Path::new(LOG_FILE))?;

    // HTTP + service setup
    let client = Client::builder().user_agent("recyclo/0.1").build()?;

    let store = supabase::store(client.clone(), &config.store.url, &config.store.api_key);
    let classifier = Arc::new(ClassifierAdapter::new(
        onnx::loader(client),
        config.assets(),
        config.load_policy(),
    ));
    let resolver = Arc::new(LabelResolver::new(
        store.fees,
        store.centers,
        config.synonym_map(),
        config.lookup_timeout(),
    ));
    let service = Arc::new(RecycloService::new(
        Arc::clone(&classifier),
        resolver,
        config.results.secondary_count,
    ));
    drop(classifier.spawn_load());
    info!(store = %config.store.url, model = %config.model.model_uri, "recyclo started");

    // App state
    let app = App::new(service, String::new());

    // Terminal init
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run event loop
    let res = run(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

/// Read the config file if present, then apply environment overrides.
fn load_config(explicit: Option<PathBuf>) -> Result<AppConfig> {
    let config = match explicit {
        Some(path) => AppConfig::load(&path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).is_file() => {
            AppConfig::load(Path::new(DEFAULT_CONFIG_PATH))?
        }
        None => AppConfig::default(),
    }
    .with_env();

    config.validate()?;
    Ok(config)
}

fn init_logging(path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Cannot create log file {}", path.display()))?;
    let filter =
        EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

async fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, mut app: App) -> Result<()> {
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<CycleOutcome>();

    loop {
        // Pick up finished analyses and the model state before drawing
        while let Ok(outcome) = outcome_rx.try_recv() {
            app.apply_outcome(outcome);
        }
        app.refresh_model();

        terminal.draw(|frame| ui::draw(frame, &app))?;

        // Poll for input (non-blocking, small timeout to keep CPU low)
        if event::poll(StdDuration::from_millis(100))?
            && let CEvent::Key(key) = event::read()?
        {
            let action = input::handle_key_event(key, &mut app);

            match action {
                Action::Quit => break,
                Action::None => {}
                Action::ReloadModel => {
                    app.service.reload_model();
                    app.error_message = None;
                }
                Action::Analyze => {
                    let path = app.path_input.trim().to_owned();
                    if path.is_empty() {
                        app.error_message =
                            Some("Type the path of a photo, then press Enter".into());
                        continue;
                    }

                    app.pending += 1;
                    app.error_message = None;
                    app.report = None;

                    let service = Arc::clone(&app.service);
                    let outcome_tx = outcome_tx.clone();
                    drop(tokio::spawn(async move {
                        let source = Arc::new(FileCapture::new(path));
                        let outcome = service.capture_and_analyze(source).await;
                        if outcome_tx.send(outcome).is_err() {
                            debug!("UI closed before the analysis finished");
                        }
                    }));
                }
            }
        }
    }

    app.service.cancel_pending();
    Ok(())
}
