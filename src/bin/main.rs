use std::{
    fs::{self, File},
    io,
    ops::{Deref, DerefMut},
    path::PathBuf,
};

use clap::Parser;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, EventStream},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use eyre::{eyre, Context, Result};
use log::debug;
use ratatui::{backend::CrosstermBackend, Terminal};
use tapedeck::{app::App, config, config::Settings, queue::Queue};

use tokio_stream::StreamExt;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Audio files to queue up, in order.
    files: Vec<PathBuf>,

    /// Load the queue from a JSON file instead. Each entry has a `description`, a `duration` in
    /// seconds and a `uri`.
    #[arg(long, conflicts_with = "files")]
    queue: Option<PathBuf>,

    /// Use this config file instead of the default one.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Don't show the queue position.
    #[arg(long)]
    hide_queue: bool,

    /// Don't show the record description.
    #[arg(long)]
    hide_description: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // when running with backtrace capture enabled, constructing the first error variant in a
    // program is more expensive (on the order of milliseconds). see
    // https://github.com/eyre-rs/color-eyre/issues/148.
    let _ = eyre::eyre!("unused");
    let project_dirs =
        config::project_dirs().ok_or_else(|| eyre!("couldn't determine a home directory"))?;
    let args = Args::parse();

    // set up logging
    let log_target = project_dirs.data_local_dir().join("tapedeck.log");
    fs::create_dir_all(project_dirs.data_local_dir())?;
    env_logger::builder()
        .target(env_logger::Target::Pipe(Box::new(File::create(log_target)?)))
        .init();

    let config_path =
        args.config.clone().unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    debug!("Loading config from {}", config_path.display());
    let mut settings = Settings::load(&config_path)?;
    settings.ui.hide_queue |= args.hide_queue;
    settings.ui.hide_description |= args.hide_description;

    let queue = match &args.queue {
        Some(path) => Queue::load(path)?,
        None => Queue::from_paths(&args.files)?,
    };
    debug!("Queued {} records", queue.len());

    let app = App::new(queue, settings).wrap_err("couldn't open an audio output")?;

    let mut terminal = AppTerminal::new()?;
    app.run(EventStream::new().filter_map(|ev| ev.ok()), terminal.deref_mut()).await?;

    Ok(())
}

/// Wrapper around a [`Terminal`] that automatically sets it up and restores it.
struct AppTerminal(Terminal<CrosstermBackend<io::Stdout>>);

impl Deref for AppTerminal {
    type Target = Terminal<CrosstermBackend<io::Stdout>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for AppTerminal {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl AppTerminal {
    fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(io::stdout());
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;
        terminal.hide_cursor()?;

        let original_hook = std::panic::take_hook();

        // during panic, Drop gets called *after* the panic handler. restoring the terminal twice
        // is harmless, so we don't need to track if this was already called.
        std::panic::set_hook(Box::new(move |panic| {
            AppTerminal::restore_terminal();
            original_hook(panic);
        }));

        Ok(Self(terminal))
    }

    fn restore_terminal() {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
    }
}

impl Drop for AppTerminal {
    fn drop(&mut self) {
        let _ = self.0.show_cursor();
        AppTerminal::restore_terminal()
    }
}
