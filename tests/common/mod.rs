#![allow(dead_code)]

use mockito::{Matcher, Mock, ServerGuard};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub const TEST_API_KEY: &str = "test-api-key-0000";
pub const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";
pub const FILE_NAME: &str = "files/clip-1";

const SCRUBBED_ENV: &[&str] = &[
    "VIDEO_JUDGE_API_KEY",
    "GEMINI_API_KEY",
    "GOOGLE_API_KEY",
    "VIDEO_JUDGE_API_BASE",
    "VIDEO_JUDGE_MODEL",
    "VIDEO_JUDGE_CONFIG",
    "XDG_CONFIG_HOME",
    "RUST_LOG",
];

pub fn write_criteria(tmp: &TempDir, contents: &str) -> PathBuf {
    let path = tmp.path().join("criteria.json");
    fs::write(&path, contents).expect("write criteria");
    path
}

pub fn write_video(tmp: &TempDir) -> PathBuf {
    let path = tmp.path().join("clip.mp4");
    fs::write(&path, b"\x00\x00\x00\x18ftypmp42fake-video").expect("write video");
    path
}

/// Binary invocation isolated from the user's config and credentials.
pub fn judge_cmd(tmp: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("video_judge"));
    for key in SCRUBBED_ENV {
        cmd.env_remove(key);
    }
    cmd.env("HOME", tmp.path());
    cmd.current_dir(tmp.path());
    cmd
}

/// Same as [`judge_cmd`] with an API key and the API base pointed at `server`.
pub fn judge_cmd_against(tmp: &TempDir, server: &ServerGuard) -> Command {
    let mut cmd = judge_cmd(tmp);
    cmd.env("GEMINI_API_KEY", TEST_API_KEY)
        .env("VIDEO_JUDGE_API_BASE", server.url());
    cmd
}

pub fn file_json(state: &str) -> String {
    serde_json::json!({
        "name": FILE_NAME,
        "uri": "https://generativelanguage.example/v1beta/files/clip-1",
        "mimeType": "video/mp4",
        "state": state
    })
    .to_string()
}

pub fn generate_body(text: &str) -> String {
    serde_json::json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
    .to_string()
}

/// Mocks for the two upload requests; the finalize step reports `state`.
pub fn mock_upload(server: &mut ServerGuard, state: &str) -> (Mock, Mock) {
    let session_url = format!("{}/upload-session/clip-1", server.url());
    let start = server
        .mock("POST", "/upload/v1beta/files")
        .match_header("x-goog-api-key", TEST_API_KEY)
        .match_header("x-goog-upload-command", "start")
        .with_status(200)
        .with_header("x-goog-upload-url", session_url.as_str())
        .create();
    let finalize = server
        .mock("POST", "/upload-session/clip-1")
        .match_header("x-goog-upload-command", "upload, finalize")
        .with_status(200)
        .with_body(format!("{{\"file\": {}}}", file_json(state)))
        .create();
    (start, finalize)
}

pub fn mock_generate(server: &mut ServerGuard, text: &str) -> Mock {
    server
        .mock("POST", GENERATE_PATH)
        .match_header("x-goog-api-key", TEST_API_KEY)
        .with_status(200)
        .with_body(generate_body(text))
        .create()
}

/// Catch-alls that must never be hit.
pub fn mock_no_traffic(server: &mut ServerGuard) -> Vec<Mock> {
    ["GET", "POST"]
        .into_iter()
        .map(|method| server.mock(method, Matcher::Any).expect(0).create())
        .collect()
}

pub fn assert_no_traffic(mocks: &[Mock]) {
    for mock in mocks {
        mock.assert();
    }
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
