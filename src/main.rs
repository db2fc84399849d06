use anyhow::{Context, Result};
use clap::{value_parser, Parser};
use log::info;
use std::io;
use std::path::PathBuf;
use video_judge::config::{self, ConfigSource};
use video_judge::gemini::{
    CliOverrides, ClientSettings, GeminiClient, MAX_READY_TIMEOUT_SECS, MAX_REQUEST_TIMEOUT_SECS,
};
use video_judge::logging;
use video_judge::output::write_output;
use video_judge::pipeline::{self, AnalysisRequest};
use video_judge::verdicts::log_verdict_report;

#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Video file to analyze
    #[arg(value_parser = value_parser!(PathBuf))]
    video_path: PathBuf,

    /// JSON file with an array of {"id", "description"} criteria
    #[arg(value_parser = value_parser!(PathBuf))]
    criteria_path: PathBuf,

    /// Path to the configuration file
    #[arg(short, long, value_parser = value_parser!(PathBuf))]
    config_file: Option<PathBuf>,

    /// Gemini model used for the analysis (e.g. gemini-2.5-flash)
    #[arg(long)]
    model: Option<String>,

    /// Base URL of the Gemini API
    #[arg(long)]
    api_base: Option<String>,

    /// MIME type announced on upload (guessed from the extension by default)
    #[arg(long)]
    mime_type: Option<String>,

    /// Delay between readiness checks of the uploaded video, in milliseconds
    #[arg(long, value_parser = value_parser!(u64).range(1..))]
    poll_interval_ms: Option<u64>,

    /// Give up if the uploaded video is not ready after this many seconds
    #[arg(long, value_parser = value_parser!(u64).range(..=MAX_READY_TIMEOUT_SECS))]
    ready_timeout_secs: Option<u64>,

    /// Timeout applied to each HTTP request, in seconds
    #[arg(long, value_parser = value_parser!(u64).range(1..=MAX_REQUEST_TIMEOUT_SECS))]
    request_timeout_secs: Option<u64>,

    /// Log how the model's answer lines up with the criteria (stdout is unchanged)
    #[arg(long, default_value_t = false)]
    check_verdicts: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init();

    let loaded_config = config::load(args.config_file.as_deref())?;
    if let Some((_, source)) = &loaded_config {
        if matches!(source, ConfigSource::Env(_)) {
            info!(
                "Loaded configuration from '{}' (via {}).",
                source.path().display(),
                config::CONFIG_ENV_VAR
            );
        } else {
            info!("Loaded configuration from '{}'.", source.path().display());
        }
    }
    let cfg = loaded_config.map(|(cfg, _)| cfg).unwrap_or_default();

    let overrides = CliOverrides {
        api_base: args.api_base.as_deref(),
        model: args.model.as_deref(),
        poll_interval_ms: args.poll_interval_ms,
        ready_timeout_secs: args.ready_timeout_secs,
        request_timeout_secs: args.request_timeout_secs,
    };
    let settings = ClientSettings::from_sources(cfg.gemini.as_ref(), &overrides)?;
    logging::log_settings_snapshot(&settings);

    let client = GeminiClient::new(settings).with_mime_type(args.mime_type.clone());

    let request = AnalysisRequest {
        video_path: args.video_path.clone(),
        criteria_path: args.criteria_path.clone(),
    };
    let run = pipeline::run(&request, &client)?;

    if args.check_verdicts || cfg.check_verdicts.unwrap_or(false) {
        log_verdict_report(&run.criteria, &run.output.text);
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write_output(&mut handle, &run.output).context("Failed to print analysis result")?;

    Ok(())
}
