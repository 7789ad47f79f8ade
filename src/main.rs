use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

mod client;
mod controller;
mod domain;
mod inputter;
mod loader;
mod model;
mod protocol;
mod query;
mod ui;

use clap::Parser;
use ratatui::crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use ratatui::crossterm::execute;
use tracing::info;

use client::Client;
use controller::Controller;
use domain::{TdvError, ViewerConfig};
use model::{Status, ViewerModel};
use ui::ViewerUi;

/// Browse tabular data files (Parquet, Excel, CSV, TSV) served by a
/// paging backend, with filtering, sorting and column statistics.
#[derive(Parser, Debug)]
#[command(name = "tdv", version, about)]
struct Cli {
    /// File path, as known to the backend
    path: String,
    /// Base URL of the paging backend
    #[arg(long, default_value = "http://127.0.0.1:8888")]
    base_url: String,
    /// Rows fetched per request
    #[arg(long, default_value_t = 500)]
    page_size: usize,
    /// Truncate cell text to this many characters (0 disables)
    #[arg(long, default_value_t = 120)]
    max_cell_chars: usize,
    /// Maximum number of values offered in the filter-by-values overlay
    #[arg(long, default_value_t = 100)]
    unique_limit: usize,
    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
    /// Write logs to this file (stderr is unusable inside the TUI)
    #[arg(long)]
    log_file: Option<std::path::PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.log_file.as_deref()) {
        eprintln!("Error: {e:?}");
        return ExitCode::FAILURE;
    }
    match run(cli) {
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
        Ok(()) => ExitCode::SUCCESS,
    }
}

fn init_tracing(log_file: Option<&std::path::Path>) -> Result<(), TdvError> {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let Some(path) = log_file else {
        return Ok(());
    };
    let file = std::fs::File::create(path)?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false),
        )
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn run(cli: Cli) -> Result<(), TdvError> {
    let path = shellexpand::full(&cli.path)
        .map_err(|e| TdvError::InvalidPath(e.to_string()))?
        .into_owned();
    info!("Starting tdv for {path}");

    let config = ViewerConfig::default()
        .base_url(cli.base_url)
        .page_size(cli.page_size)
        .max_cell_chars(cli.max_cell_chars)
        .unique_limit(cli.unique_limit)
        .request_timeout_secs(cli.timeout);

    let client = Client::new(
        &config.base_url,
        Duration::from_secs(config.request_timeout_secs),
    );

    let mut terminal = ratatui::init();
    execute!(std::io::stdout(), EnableMouseCapture)?;
    let result = event_loop(&mut terminal, Arc::new(client), path, config);
    // Release the terminal on every exit path.
    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();
    result
}

fn event_loop(
    terminal: &mut ratatui::DefaultTerminal,
    backend: Arc<Client>,
    path: String,
    config: ViewerConfig,
) -> Result<(), TdvError> {
    let size = terminal.size()?;
    let controller = Controller::new(&config);
    let ui = ViewerUi::new();
    let mut model = ViewerModel::new(
        backend,
        path,
        config,
        size.width as usize,
        size.height as usize,
    );
    model.open();

    while model.status != Status::QUITTING {
        // Render the current view.
        terminal.draw(|f| ui.draw(&model, f))?;

        // Handle events and map them to a Message.
        if let Some(message) = controller.handle_event(&model)? {
            model.update(message)?;
        }

        // Apply any fetch results that arrived in the background.
        model.poll();
    }
    Ok(())
}
