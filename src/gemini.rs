use crate::config::GeminiSettings;
use crate::logging::redact_secret;
use crate::pipeline::RemoteAnalyzer;
use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::json;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use ureq::{Agent, AgentBuilder, Error as UreqError};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
/// Upper bounds accepted for the ready and per-request timeouts, in seconds.
pub const MAX_READY_TIMEOUT_SECS: u64 = 24 * 60 * 60;
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 60 * 60;

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV_VARS: &[&str] = &["VIDEO_JUDGE_API_KEY", "GEMINI_API_KEY", "GOOGLE_API_KEY"];
pub const API_BASE_ENV_VAR: &str = "VIDEO_JUDGE_API_BASE";
pub const MODEL_ENV_VAR: &str = "VIDEO_JUDGE_MODEL";

const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("Gemini {context} failed with HTTP {status}{}", format_body(.body))]
    Http {
        context: &'static str,
        status: u16,
        body: String,
    },
    #[error("Gemini {context} transport error: {message}")]
    Transport {
        context: &'static str,
        message: String,
    },
    #[error("Gemini upload start response did not include an upload URL")]
    MissingUploadUrl,
    #[error("Failed to decode Gemini {context} response: {message}")]
    Decode {
        context: &'static str,
        message: String,
    },
    #[error("Remote asset '{name}' failed processing{}", format_body(.reason))]
    AssetFailed { name: String, reason: String },
    #[error("Remote asset '{name}' still {state} after {waited:?}")]
    NotReady {
        name: String,
        state: FileState,
        waited: Duration,
    },
    #[error("Gemini returned no text{}", format_block_reason(.block_reason))]
    EmptyResponse { block_reason: Option<String> },
}

fn format_body(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {}", body)
    }
}

fn format_block_reason(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(" (blocked: {})", reason),
        None => String::new(),
    }
}

/// Processing state of an uploaded file as reported by the Files API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    StateUnspecified,
    Processing,
    Active,
    Failed,
}

impl FileState {
    fn parse_lenient(raw: Option<&str>) -> Self {
        match raw {
            Some(value) => FileState::from_str(value).unwrap_or_else(|_| {
                warn!("Unknown remote file state '{}'; treating as unspecified.", value);
                FileState::StateUnspecified
            }),
            None => FileState::StateUnspecified,
        }
    }
}

/// Handle to a video the remote service knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub uri: String,
    pub mime_type: String,
    pub state: FileState,
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    mime_type: String,
    state: Option<String>,
    error: Option<StatusMessage>,
}

#[derive(Debug, Deserialize)]
struct StatusMessage {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: FileResource,
}

impl From<FileResource> for UploadedFile {
    fn from(resource: FileResource) -> Self {
        UploadedFile {
            state: FileState::parse_lenient(resource.state.as_deref()),
            error_message: resource.error.and_then(|e| e.message),
            name: resource.name,
            uri: resource.uri,
            mime_type: resource.mime_type,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, GeminiError> {
        let block_reason = self.prompt_feedback.and_then(|fb| fb.block_reason);
        let candidate = match self.candidates.into_iter().next() {
            Some(candidate) => candidate,
            None => return Err(GeminiError::EmptyResponse { block_reason }),
        };

        if let Some(reason) = candidate.finish_reason.as_deref() {
            debug!("Gemini finish reason: {}", reason);
        }

        let texts: Vec<String> = candidate
            .content
            .map(|content| content.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|part| part.text)
            .collect();

        if texts.is_empty() {
            return Err(GeminiError::EmptyResponse {
                block_reason: block_reason.or(candidate.finish_reason),
            });
        }

        Ok(texts.concat())
    }
}

/// Command-line values that take precedence over config and environment.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides<'a> {
    pub api_base: Option<&'a str>,
    pub model: Option<&'a str>,
    pub poll_interval_ms: Option<u64>,
    pub ready_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Clone)]
pub struct ClientSettings {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub poll_interval: Duration,
    pub ready_timeout: Duration,
    pub request_timeout: Duration,
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("api_key", &redact_secret(&self.api_key))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("poll_interval", &self.poll_interval)
            .field("ready_timeout", &self.ready_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ClientSettings {
    /// Resolves settings with precedence CLI > config file > environment > default.
    pub fn from_sources(config: Option<&GeminiSettings>, cli: &CliOverrides<'_>) -> Result<Self> {
        Self::from_sources_with_env(config, cli, |key| env::var(key).ok())
    }

    pub fn from_sources_with_env<F>(
        config: Option<&GeminiSettings>,
        cli: &CliOverrides<'_>,
        lookup_env: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |value: String| {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        };

        let api_key = config
            .and_then(|cfg| cfg.api_key.clone())
            .and_then(non_empty)
            .or_else(|| {
                API_KEY_ENV_VARS
                    .iter()
                    .find_map(|key| lookup_env(*key).and_then(non_empty))
            })
            .ok_or_else(|| {
                anyhow!(
                    "No Gemini API key configured. Set {} (or add api_key to the [gemini] \
                     section of the config file).",
                    API_KEY_ENV_VARS.join(" / ")
                )
            })?;

        let api_base = cli
            .api_base
            .map(str::to_string)
            .or_else(|| config.and_then(|cfg| cfg.api_base.clone()))
            .or_else(|| lookup_env(API_BASE_ENV_VAR))
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let model = cli
            .model
            .map(str::to_string)
            .or_else(|| config.and_then(|cfg| cfg.model.clone()))
            .or_else(|| lookup_env(MODEL_ENV_VAR))
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let model = model
            .strip_prefix("models/")
            .map(str::to_string)
            .unwrap_or(model);

        let poll_interval = cli
            .poll_interval_ms
            .or_else(|| config.and_then(|cfg| cfg.poll_interval_ms))
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        let ready_timeout = cli
            .ready_timeout_secs
            .or_else(|| config.and_then(|cfg| cfg.ready_timeout_secs))
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_READY_TIMEOUT);
        let request_timeout = cli
            .request_timeout_secs
            .or_else(|| config.and_then(|cfg| cfg.request_timeout_secs))
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        if poll_interval.is_zero() {
            return Err(anyhow!("Poll interval must be greater than zero"));
        }
        if ready_timeout > Duration::from_secs(MAX_READY_TIMEOUT_SECS) {
            return Err(anyhow!(
                "Ready timeout of {}s exceeds the maximum of {}s",
                ready_timeout.as_secs(),
                MAX_READY_TIMEOUT_SECS
            ));
        }
        if request_timeout.is_zero()
            || request_timeout > Duration::from_secs(MAX_REQUEST_TIMEOUT_SECS)
        {
            return Err(anyhow!(
                "Request timeout must be between 1s and {}s (got {}s)",
                MAX_REQUEST_TIMEOUT_SECS,
                request_timeout.as_secs()
            ));
        }

        Ok(ClientSettings {
            api_key,
            api_base,
            model,
            poll_interval,
            ready_timeout,
            request_timeout,
        })
    }
}

/// Blocking client for the Gemini Files and generateContent endpoints.
#[derive(Debug)]
pub struct GeminiClient {
    settings: ClientSettings,
    mime_override: Option<String>,
    agent: Agent,
}

impl GeminiClient {
    pub fn new(settings: ClientSettings) -> Self {
        let agent = AgentBuilder::new()
            .timeout(settings.request_timeout)
            .build();
        GeminiClient {
            settings,
            mime_override: None,
            agent,
        }
    }

    pub fn with_mime_type(mut self, mime_type: Option<String>) -> Self {
        self.mime_override = mime_type;
        self
    }

    /// Uploads the whole file with the resumable protocol in a single chunk.
    pub fn upload_video(&self, path: &Path, mime_type: &str) -> Result<UploadedFile> {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read video file at {}", path.display()))?;
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("video"));

        info!(
            "Uploading '{}' ({} bytes, {}) to Gemini.",
            path.display(),
            bytes.len(),
            mime_type
        );

        let start_url = format!("{}/upload/v1beta/files", self.settings.api_base);
        let start = self
            .agent
            .post(&start_url)
            .set(API_KEY_HEADER, &self.settings.api_key)
            .set("X-Goog-Upload-Protocol", "resumable")
            .set("X-Goog-Upload-Command", "start")
            .set("X-Goog-Upload-Header-Content-Length", &bytes.len().to_string())
            .set("X-Goog-Upload-Header-Content-Type", mime_type)
            .send_json(json!({ "file": { "display_name": display_name } }))
            .map_err(|err| map_ureq_error(err, "upload start"))?;

        let upload_url = start
            .header(UPLOAD_URL_HEADER)
            .map(str::to_string)
            .ok_or(GeminiError::MissingUploadUrl)?;
        debug!("Gemini upload session opened.");

        let response = self
            .agent
            .post(&upload_url)
            .set(API_KEY_HEADER, &self.settings.api_key)
            .set("X-Goog-Upload-Offset", "0")
            .set("X-Goog-Upload-Command", "upload, finalize")
            .send_bytes(&bytes)
            .map_err(|err| map_ureq_error(err, "upload"))?;

        let uploaded: UploadResponse = response.into_json().map_err(|err| GeminiError::Decode {
            context: "upload",
            message: err.to_string(),
        })?;
        let file = UploadedFile::from(uploaded.file);

        info!("Uploaded as '{}' (state {}).", file.name, file.state);
        Ok(file)
    }

    pub fn get_file(&self, name: &str) -> Result<UploadedFile> {
        let url = format!("{}/v1beta/{}", self.settings.api_base, name);
        let response = self
            .agent
            .get(&url)
            .set(API_KEY_HEADER, &self.settings.api_key)
            .call()
            .map_err(|err| map_ureq_error(err, "file status"))?;

        let resource: FileResource = response.into_json().map_err(|err| GeminiError::Decode {
            context: "file status",
            message: err.to_string(),
        })?;
        Ok(UploadedFile::from(resource))
    }

    /// Polls the asset until it is `ACTIVE`, failing on `FAILED` or when the
    /// ready timeout elapses.
    pub fn wait_until_active(&self, file: UploadedFile) -> Result<UploadedFile> {
        let started = Instant::now();
        // No deadline when the timeout does not fit in an Instant.
        let deadline = started.checked_add(self.settings.ready_timeout);
        let mut current = file;
        let mut logged_wait = false;

        loop {
            match current.state {
                FileState::Active => {
                    if logged_wait {
                        info!(
                            "Remote asset '{}' is ready after {:.1}s.",
                            current.name,
                            started.elapsed().as_secs_f64()
                        );
                    }
                    return Ok(current);
                }
                FileState::Failed => {
                    return Err(GeminiError::AssetFailed {
                        reason: current.error_message.clone().unwrap_or_default(),
                        name: current.name,
                    }
                    .into());
                }
                FileState::Processing | FileState::StateUnspecified => {}
            }

            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                return Err(GeminiError::NotReady {
                    name: current.name,
                    state: current.state,
                    waited: started.elapsed(),
                }
                .into());
            }

            if !logged_wait {
                info!(
                    "Waiting up to {:?} for remote asset '{}' to become active...",
                    self.settings.ready_timeout, current.name
                );
                logged_wait = true;
            }

            let pause = match deadline {
                Some(deadline) => self.settings.poll_interval.min(deadline - now),
                None => self.settings.poll_interval,
            };
            thread::sleep(pause);
            current = self.get_file(&current.name)?;
            debug!("Remote asset '{}' state: {}.", current.name, current.state);
        }
    }

    pub fn generate(&self, file: &UploadedFile, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.api_base, self.settings.model
        );
        info!("Requesting analysis from model '{}'.", self.settings.model);

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "fileData": { "mimeType": file.mime_type, "fileUri": file.uri } },
                    { "text": prompt }
                ]
            }]
        });

        let response = self
            .agent
            .post(&url)
            .set(API_KEY_HEADER, &self.settings.api_key)
            .send_json(body)
            .map_err(|err| map_ureq_error(err, "generateContent"))?;

        let parsed: GenerateContentResponse =
            response.into_json().map_err(|err| GeminiError::Decode {
                context: "generateContent",
                message: err.to_string(),
            })?;
        let text = parsed.into_text()?;

        info!("Received {} characters from Gemini.", text.chars().count());
        Ok(text)
    }

    fn mime_type_for(&self, path: &Path) -> String {
        match &self.mime_override {
            Some(mime) => mime.clone(),
            None => guess_mime_type(path).to_string(),
        }
    }
}

impl RemoteAnalyzer for GeminiClient {
    fn analyze(&self, video: &Path, prompt: &str) -> Result<String> {
        let mime_type = self.mime_type_for(video);
        let uploaded = self.upload_video(video, &mime_type)?;
        let ready = self.wait_until_active(uploaded)?;
        self.generate(&ready, prompt)
    }
}

/// Maps a video file extension to the MIME type announced on upload.
pub fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "m4v" => "video/x-m4v",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mpeg" | "mpg" => "video/mpeg",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "3gp" => "video/3gpp",
        _ => "video/mp4",
    }
}

fn map_ureq_error(err: UreqError, context: &'static str) -> GeminiError {
    match err {
        UreqError::Status(status, resp) => {
            let body = resp.into_string().unwrap_or_default();
            GeminiError::Http {
                context,
                status,
                body: summarize_error_body(&body),
            }
        }
        UreqError::Transport(transport) => GeminiError::Transport {
            context,
            message: transport.to_string(),
        },
    }
}

/// Pulls `error.message` out of a Google API error payload, falling back to
/// the raw body.
fn summarize_error_body(body: &str) -> String {
    #[derive(Deserialize)]
    struct Envelope {
        error: StatusMessage,
    }

    match serde_json::from_str::<Envelope>(body) {
        Ok(Envelope {
            error: StatusMessage {
                message: Some(message),
            },
        }) => message,
        _ => body.trim().to_string(),
    }
}
