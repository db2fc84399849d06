use crate::gemini::ClientSettings;
use log::{debug, info};
use std::env;

const ENV_PREFIXES: &[&str] = &["video_judge_", "gemini_", "google_"];

/// Logs go to stderr so stdout carries nothing but the JSON result.
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .try_init();
}

pub fn redact_secret(value: &str) -> String {
    let count = value.chars().count();
    if count <= 8 {
        "*".repeat(count)
    } else {
        let tail: String = value.chars().skip(count - 4).collect();
        format!("{}{}", "*".repeat(count - 4), tail)
    }
}

fn is_secret_key(lower: &str) -> bool {
    lower.contains("key") || lower.contains("token") || lower.contains("secret")
}

fn relevant_env() -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = env::vars()
        .filter(|(key, _)| {
            let lower = key.to_ascii_lowercase();
            ENV_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

pub fn log_settings_snapshot(settings: &ClientSettings) {
    info!(
        "Gemini settings: model={} api_base={} poll_interval={:?} ready_timeout={:?} request_timeout={:?} api_key={}",
        settings.model,
        settings.api_base,
        settings.poll_interval,
        settings.ready_timeout,
        settings.request_timeout,
        redact_secret(&settings.api_key)
    );

    let entries = relevant_env();
    if entries.is_empty() {
        return;
    }
    debug!("Environment snapshot ({} entries):", entries.len());
    for (key, value) in entries {
        let display_value = if is_secret_key(&key.to_ascii_lowercase()) {
            redact_secret(&value)
        } else if value.len() > 200 {
            format!("{}…", value.chars().take(200).collect::<String>())
        } else {
            value
        };
        debug!("  {} = {}", key, display_value);
    }
}
