// HOA Report CLI
// hoa-report --config <PATH> [overrides] → output workbook + QA summary on stdout

use anyhow::{Context, Result};
use clap::Parser;
use hoa_report::{load_config, CliOverrides, ReportError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Generate the HOA report workbook from a loan tape, vendor files, and optional SQL enrichment
#[derive(Parser)]
#[command(name = "hoa-report")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, value_name = "PATH")]
    config: PathBuf,

    /// Override the tape path from config
    #[arg(long, value_name = "PATH")]
    tape_path: Option<PathBuf>,

    /// Override the template path from config
    #[arg(long, value_name = "PATH")]
    template_path: Option<PathBuf>,

    /// Override vendor input path(s); repeat for multiple files
    #[arg(long = "vendor-path", value_name = "PATH")]
    vendor_paths: Vec<PathBuf>,

    /// Override the vendor extractor type
    #[arg(long, value_name = "TYPE")]
    vendor_type: Option<String>,

    /// Override the output workbook path
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            tape_path: self.tape_path.clone(),
            template_path: self.template_path.clone(),
            vendor_paths: self.vendor_paths.clone(),
            vendor_type: self.vendor_type.clone(),
            output_path: self.out.clone(),
        }
    }
}

/// RUST_LOG wins when set; otherwise DEBUG with --verbose, else WARN
fn log_filter(verbose: bool, env_filter: Option<EnvFilter>) -> EnvFilter {
    env_filter.unwrap_or_else(|| {
        let level = if verbose { Level::DEBUG } else { Level::WARN };
        EnvFilter::new(level.to_string())
    })
}

fn init_tracing(verbose: bool) {
    let filter = log_filter(verbose, EnvFilter::try_from_default_env().ok());
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    let effective = config.with_overrides(&cli.overrides());

    effective.validate_paths()?;
    println!("Input path validation: OK");

    let outcome = hoa_report::run(&effective)
        .with_context(|| format!("HOA report run failed (tape {})", effective.tape_path.display()))?;

    println!("Output written to: {}", outcome.output_path.display());
    for line in outcome.qa.summary_lines() {
        println!("{}", line);
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            let code = err
                .downcast_ref::<ReportError>()
                .map_or(1, ReportError::exit_code);
            ExitCode::from(code)
        }
    }
}
