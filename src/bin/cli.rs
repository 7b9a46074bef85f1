use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yarabatch::config::{self, Config};
use yarabatch::dispatch::Interrupt;
use yarabatch::error::BatchError;
use yarabatch::output::{console, write_report, ReportFormat};
use yarabatch::BatchOptions;

/// Exit status after a user interrupt, matching a shell killed by SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(
    name = "yarabatch",
    about = "Batch-scan one target with a YARA checker, once per rule file",
    version,
    author
)]
struct Cli {
    /// Target file to scan
    #[arg(short = 'a', long, required_unless_present = "write_config")]
    target_exe: Option<PathBuf>,

    /// Directory containing .yara / .yar rule files (searched recursively)
    #[arg(short = 'f', long, required_unless_present = "write_config")]
    rules_dir: Option<PathBuf>,

    /// Number of checker processes run at once [default: 4]
    #[arg(short = 't', long, value_parser = parse_positive)]
    threads: Option<usize>,

    /// Path to the checker executable [default: yara64.exe in the working directory]
    #[arg(long)]
    yara_exe: Option<PathBuf>,

    /// Kill a checker that runs longer than this many seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Report file [default: result.csv]
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Report format (csv, json) [default: csv]
    #[arg(long)]
    format: Option<String>,

    /// Config file path [default: yarabatch.toml]
    #[arg(long, short = 'c', env = "YARABATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Write a starter config file and exit
    #[arg(long)]
    write_config: bool,
}

fn parse_positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be a positive integer".into()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = if cli.write_config {
        cmd_write_config(cli.config)
    } else {
        cmd_scan(cli)
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) if e.is_warning() => {
            println!("Warning: {}", e);
            process::exit(e.exit_code());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn config_path(cli_path: Option<PathBuf>) -> PathBuf {
    cli_path.unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_FILE))
}

fn cmd_scan(cli: Cli) -> Result<i32, BatchError> {
    let (Some(target), Some(rules_dir)) = (cli.target_exe, cli.rules_dir) else {
        return Err(BatchError::Config(
            "--target-exe and --rules-dir are required".into(),
        ));
    };

    let config = Config::load(&config_path(cli.config))?;

    let format = match config.format(cli.format) {
        None => ReportFormat::default(),
        Some(s) => ReportFormat::from_str_lenient(&s).unwrap_or_else(|| {
            eprintln!("Warning: unknown format '{}', using csv", s);
            ReportFormat::Csv
        }),
    };
    let output_path = config.output(cli.output);

    let options = BatchOptions {
        target,
        rules_dir,
        checker: config.checker(cli.yara_exe),
        threads: config.threads(cli.threads),
        timeout: config.timeout_secs(cli.timeout).map(Duration::from_secs),
    };

    let tasks = yarabatch::preflight(&options)?;

    let interrupt = Interrupt::new();
    let handler = interrupt.clone();
    if let Err(e) = ctrlc::set_handler(move || handler.trigger()) {
        tracing::warn!(error = %e, "could not install interrupt handler");
    }

    println!("{}", console::start_line(tasks.len(), options.threads));

    let report = yarabatch::run_batch(tasks, &options, &interrupt, |outcome| {
        println!("{}", console::progress_line(outcome));
    });
    let Some(report) = report else {
        println!("\nInterrupted by user, stopping scan...");
        return Ok(EXIT_INTERRUPTED);
    };

    println!("{}", console::summary_line(&report));
    write_report(&report, format, &output_path)?;
    println!("Results saved to {}", output_path.display());

    Ok(0)
}

fn cmd_write_config(cli_path: Option<PathBuf>) -> Result<i32, BatchError> {
    let path = config_path(cli_path);

    if path.exists() {
        eprintln!("{} already exists, not overwriting.", path.display());
        return Ok(1);
    }

    std::fs::write(&path, Config::starter_toml())?;
    println!("Created {}", path.display());

    Ok(0)
}
