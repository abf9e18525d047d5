use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use fetchmend::app::{App, RunMode};
use fetchmend::config::{ConfigLoader, ConfigOverrides};
use fetchmend::domain::ResourceKind;
use fetchmend::error::MendError;
use fetchmend::http::{ReqwestTransport, ThreadSleeper};
use fetchmend::output::{ConsoleOutput, JsonOutput, OutputMode};
use fetchmend::storage::LocalStorage;

const EXIT_INCOMPLETE: u8 = 4;

#[derive(Parser)]
#[command(name = "fetchmend")]
#[command(about = "Resumable bulk fetcher with integrity audit and repair")]
#[command(version, author)]
struct Cli {
    /// Print a JSON report on stdout instead of human output.
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download every resource that is not valid on disk yet")]
    Fetch(RunArgs),
    #[command(about = "Audit local files, print the report, then repair them")]
    Check(RunArgs),
    #[command(about = "Audit local files only; no network access")]
    Audit(RunArgs),
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Path to the resource list (default: ./fetchmend.json).
    #[arg(long)]
    config: Option<String>,

    /// Output directory.
    #[arg(long)]
    output: Option<String>,

    /// Seconds to wait between items.
    #[arg(long)]
    delay: Option<f64>,

    /// Attempts per file.
    #[arg(long)]
    max_retries: Option<u32>,

    /// Only process resources of this kind (repeatable).
    #[arg(long = "kind", value_enum)]
    kinds: Vec<ResourceKind>,

    /// Only process resources whose name or folder contains one of these (comma separated).
    #[arg(long, value_delimiter = ',')]
    only: Vec<String>,

    /// Group files into subject folders by keyword.
    #[arg(long)]
    by_category: bool,
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            output: self.output.clone(),
            delay_secs: self.delay,
            max_retries: self.max_retries,
            kinds: self.kinds.clone(),
            name_filters: self.only.clone(),
            by_category: self.by_category,
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_INCOMPLETE),
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(mend) = report.downcast_ref::<MendError>() {
                return ExitCode::from(map_exit_code(mend));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &MendError) -> u8 {
    match error {
        MendError::MissingConfig | MendError::EmptyCatalog => 2,
        _ => 1,
    }
}

/// Returns whether the run left nothing to do.
fn run() -> miette::Result<bool> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let (mode, args) = match cli.command {
        Commands::Fetch(args) => (RunMode::Fetch, args),
        Commands::Check(args) => (RunMode::Check, args),
        Commands::Audit(args) => (RunMode::Audit, args),
    };

    let config = ConfigLoader::resolve(args.config.as_deref(), &args.overrides())?;
    let catalog = config.catalog()?;
    let transport = ReqwestTransport::new(&config.client)?;
    let app = App::from_config(transport, LocalStorage::new(), ThreadSleeper, &config);

    let report = match output_mode {
        OutputMode::NonInteractive => {
            let report = app.run(mode, &catalog, &JsonOutput);
            JsonOutput::print_run(&report).into_diagnostic()?;
            report
        }
        OutputMode::Interactive => {
            let console = ConsoleOutput::new();
            let report = app.run(mode, &catalog, &console);
            console.print_run(&report);
            report
        }
    };

    Ok(report.is_clean())
}
