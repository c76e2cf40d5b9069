use std::io;
use std::io::IsTerminal;
use std::path::PathBuf;

use clap::Parser;
use quill_core::Config;
use quill_core::ConfigError;
use quill_core::PipelineError;
use quill_core::PlainPresenter;
use quill_core::Presenter;
use quill_exec::Pipeline;
use tracing_subscriber::EnvFilter;

mod terminal;

use terminal::TerminalInput;
use terminal::TerminalPresenter;

/// Ask an LLM about a file, or have it propose an edit you approve before
/// anything is written.
#[derive(Debug, Parser)]
#[command(name = "quill", version, about)]
struct Cli {
    /// Question or change request for the file.
    #[arg(required_unless_present = "init_config")]
    instruction: Option<String>,

    /// File to read and possibly edit.
    #[arg(short, long, required_unless_present = "init_config")]
    file: Option<PathBuf>,

    /// Config file (defaults to the per-user config directory).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Disable colours and syntax highlighting.
    #[arg(long)]
    plain: bool,

    /// Log pipeline stages to stderr.
    #[arg(short, long)]
    verbose: bool,

    /// Write a sample config file and exit.
    #[arg(long, conflicts_with_all = ["instruction", "file"])]
    init_config: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            err.exit_code()
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("QUILL_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<i32, PipelineError> {
    if cli.init_config {
        let path = match cli.config {
            Some(path) => path,
            None => Config::default_path().ok_or(ConfigError::NoConfigDir)?,
        };
        Config::init(&path)?;
        println!("wrote sample config to {}", path.display());
        return Ok(0);
    }
    let (Some(instruction), Some(file)) = (cli.instruction, cli.file) else {
        // clap enforces both unless --init-config was given.
        return Ok(2);
    };

    let config = Config::load(cli.config.as_deref())?;
    let api_key = config.oracle.resolve_api_key(|name| std::env::var(name).ok())?;
    let oracle = quill_exec::from_config(&config, api_key)?;
    let mut pipeline = Pipeline::from_config(&config, oracle);

    let stdout = io::stdout();
    let styled = !cli.plain && std::env::var_os("NO_COLOR").is_none() && stdout.is_terminal();
    let mut presenter: Box<dyn Presenter> = if styled {
        Box::new(TerminalPresenter::new(stdout, &config.preview))
    } else {
        Box::new(PlainPresenter::new(stdout).with_diff(config.preview.show_diff))
    };
    let mut input = TerminalInput::detect();

    let report = pipeline.run(&instruction, &file, presenter.as_mut(), &mut input)?;
    tracing::debug!(
        outcome = report.outcome.label(),
        decision = report.decision.map(|d| d.label()),
        "run finished"
    );
    Ok(report.exit_code())
}
