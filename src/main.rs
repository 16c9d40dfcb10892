//! bag_geotag command line.
//!
//!   bag_geotag probe   print location categories for every bag in the input
//!   bag_geotag batch   classify new bags and append them to the CSV logs
//!   bag_geotag check   verify services, land dataset and logs before a run

use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use bag_geotag::config::Config;
use bag_geotag::extract::extract_md5s_from_file;
use bag_geotag::ingest::metadata::MetadataClient;
use bag_geotag::ingest::nominatim::NominatimClient;
use bag_geotag::interrupt::{self, PendingRows};
use bag_geotag::land::LandMask;
use bag_geotag::ledger::CsvLedger;
use bag_geotag::logging::{self, LogLevel, Source};
use bag_geotag::model::GeotagError;
use bag_geotag::pipeline::{self, BatchLedgers, Enricher};
use bag_geotag::verify;

#[derive(Debug, Parser)]
#[command(name = "bag_geotag", version, about = "Geotag recorded bags by MD5")]
struct Cli {
    /// Configuration file (defaults to ./geotag.toml when present)
    #[arg(short, long, env = "GEOTAG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the location category of every bag in the input
    Probe {
        /// Text dump to scan; overrides input.path
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Classify bags not yet logged and append them to the CSV logs
    Batch {
        /// Text dump to scan; overrides input.path
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Check services, land dataset and logs
    Check {
        /// Print the report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let level = LogLevel::parse(&config.output.log_level).unwrap_or(LogLevel::Info);
    logging::init_logger(level, Some(&config.output.log_file), false);

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            logging::error(Source::System, None, &format!("An error occurred: {}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, config: &Config) -> Result<(), GeotagError> {
    match command {
        Command::Probe { input } => probe(config, input.as_deref()),
        Command::Batch { input } => batch(config, input.as_deref()),
        Command::Check { json } => check(config, json),
    }
}

fn input_path<'a>(config: &'a Config, input: Option<&'a Path>) -> &'a Path {
    input.unwrap_or_else(|| Path::new(&config.input.path))
}

fn enricher(config: &Config) -> Result<Enricher<MetadataClient, NominatimClient>, GeotagError> {
    Ok(Enricher::new(
        MetadataClient::new(&config.metadata)?,
        NominatimClient::new(&config.geocoder)?,
        config.geocoder.cache_capacity,
        &config.output.viewer_url_template,
    ))
}

fn probe(config: &Config, input: Option<&Path>) -> Result<(), GeotagError> {
    interrupt::install_handler(PendingRows::new(), None)?;

    let md5s = extract_md5s_from_file(input_path(config, input))?;
    let mut enricher = enricher(config)?;

    let stdout = io::stdout();
    let summary = pipeline::run_probe(
        &mut enricher,
        &md5s,
        Duration::from_millis(config.probe.throttle_ms),
        &mut stdout.lock(),
    )?;

    logging::debug(
        Source::System,
        None,
        &format!("Probe: {} printed, {} without metadata", summary.printed, summary.unavailable),
    );
    Ok(())
}

fn batch(config: &Config, input: Option<&Path>) -> Result<(), GeotagError> {
    let ledgers = BatchLedgers {
        valid: CsvLedger::new(&config.output.valid_log),
        invalid: CsvLedger::new(&config.output.invalid_log),
    };
    let pending = PendingRows::new();
    interrupt::install_handler(pending.clone(), Some(ledgers.valid.clone()))?;

    let land = LandMask::load(Path::new(&config.land.path))?;
    let md5s = extract_md5s_from_file(input_path(config, input))?;
    let mut enricher = enricher(config)?;

    pipeline::run_batch(&mut enricher, &land, &ledgers, &pending, &md5s, &config.batch)?;
    Ok(())
}

fn check(config: &Config, json: bool) -> Result<(), GeotagError> {
    let report = verify::run_full_verification(config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        verify::print_summary(&report);
    }
    Ok(())
}
