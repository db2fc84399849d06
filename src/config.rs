use anyhow::{bail, Context, Result};
use log::debug;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "VIDEO_JUDGE_CONFIG";
const CONFIG_DIR_NAME: &str = "video-judge";
const CONFIG_FILE_NAME: &str = "video-judge.toml";

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Parse the model's answer and log how it lines up with the criteria.
    pub check_verdicts: Option<bool>,
    pub gemini: Option<GeminiSettings>,
}

/// `[gemini]` section. Every key is optional and falls back to env/defaults.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub model: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub ready_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Cli(PathBuf),
    Env(PathBuf),
    Default(PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::Cli(path) | ConfigSource::Env(path) | ConfigSource::Default(path) => path,
        }
    }
}

/// Finds and parses the configuration file.
///
/// An explicit path (flag or env var) must exist; default locations are
/// tried in order and silently skipped when absent.
pub fn load(path_override: Option<&Path>) -> Result<Option<(Config, ConfigSource)>> {
    if let Some(path) = path_override {
        if !path.exists() {
            bail!("Configuration file '{}' does not exist", path.display());
        }
        let cfg = read_config(path)?;
        return Ok(Some((cfg, ConfigSource::Cli(path.to_path_buf()))));
    }

    if let Some(env_path) = env::var_os(CONFIG_ENV_VAR).filter(|value| !value.is_empty()) {
        let path = PathBuf::from(env_path);
        if !path.exists() {
            bail!(
                "Configuration file '{}' (from {}) does not exist",
                path.display(),
                CONFIG_ENV_VAR
            );
        }
        let cfg = read_config(&path)?;
        return Ok(Some((cfg, ConfigSource::Env(path))));
    }

    for candidate in default_config_candidates() {
        if !candidate.is_file() {
            continue;
        }
        let cfg = read_config(&candidate)?;
        return Ok(Some((cfg, ConfigSource::Default(candidate))));
    }

    debug!("No configuration file found; using environment and defaults.");
    Ok(None)
}

fn read_config(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file at {}", path.display()))?;
    parse_config(&contents)
        .with_context(|| format!("Invalid configuration file {}", path.display()))
}

pub fn parse_config(contents: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(contents)?;
    Ok(cfg)
}

fn default_config_candidates() -> Vec<PathBuf> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();

    let mut push_unique = |path: PathBuf, out: &mut Vec<PathBuf>| {
        if !path.as_os_str().is_empty() && seen.insert(path.clone()) {
            out.push(path);
        }
    };

    if let Some(xdg_config) = env::var_os("XDG_CONFIG_HOME").filter(|val| !val.is_empty()) {
        let mut path = PathBuf::from(xdg_config);
        path.push(CONFIG_DIR_NAME);
        path.push("config.toml");
        push_unique(path, &mut out);
    }

    if let Some(home) = env::var_os("HOME").filter(|val| !val.is_empty()) {
        let home = PathBuf::from(home);
        let mut path = home.join(".config");
        path.push(CONFIG_DIR_NAME);
        path.push("config.toml");
        push_unique(path, &mut out);

        push_unique(home.join(CONFIG_FILE_NAME), &mut out);
    }

    if let Ok(current_dir) = env::current_dir() {
        push_unique(current_dir.join(CONFIG_FILE_NAME), &mut out);
    }

    push_unique(
        PathBuf::from("/etc").join(CONFIG_DIR_NAME).join("config.toml"),
        &mut out,
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_full_config() {
        let cfg = parse_config(
            r#"
            check_verdicts = true

            [gemini]
            api_key = "secret"
            api_base = "http://localhost:9000"
            model = "gemini-2.5-flash-lite"
            poll_interval_ms = 500
            ready_timeout_secs = 30
            request_timeout_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(cfg.check_verdicts, Some(true));
        let gemini = cfg.gemini.expect("gemini section");
        assert_eq!(gemini.api_key.as_deref(), Some("secret"));
        assert_eq!(gemini.model.as_deref(), Some("gemini-2.5-flash-lite"));
        assert_eq!(gemini.poll_interval_ms, Some(500));
        assert_eq!(gemini.ready_timeout_secs, Some(30));
        assert_eq!(gemini.request_timeout_secs, Some(60));
    }

    #[test]
    fn empty_config_is_all_defaults() {
        let cfg = parse_config("").unwrap();
        assert!(cfg.check_verdicts.is_none());
        assert!(cfg.gemini.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(parse_config("colour = \"blue\"").is_err());
        assert!(parse_config("[gemini]\ntemperature = 0.2").is_err());
    }

    #[test]
    fn explicit_path_must_exist() {
        let tmp = tempdir().unwrap();
        let missing = tmp.path().join("missing.toml");
        assert!(load(Some(missing.as_path())).is_err());
    }

    #[test]
    fn explicit_path_is_reported_as_cli_source() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("judge.toml");
        fs::write(&path, "[gemini]\nmodel = \"m\"\n").unwrap();

        let (cfg, source) = load(Some(path.as_path())).unwrap().expect("config loaded");
        assert_eq!(source, ConfigSource::Cli(path.clone()));
        assert_eq!(source.path(), path.as_path());
        assert_eq!(cfg.gemini.and_then(|g| g.model).as_deref(), Some("m"));
    }

    #[test]
    fn default_candidates_follow_search_order() {
        let candidates = default_config_candidates();
        assert_eq!(
            candidates.last().map(PathBuf::as_path),
            Some(Path::new("/etc/video-judge/config.toml"))
        );

        let Some(home) = env::var_os("HOME").filter(|val| !val.is_empty()) else {
            return;
        };
        let home = PathBuf::from(home);
        let position = |path: PathBuf| candidates.iter().position(|c| *c == path);
        let dot_config = position(home.join(".config/video-judge/config.toml"))
            .expect("~/.config candidate");
        let home_file = position(home.join(CONFIG_FILE_NAME)).expect("~/video-judge.toml candidate");
        assert!(dot_config < home_file);
    }
}
