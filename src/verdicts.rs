//! Best-effort reading of the model's answer.
//!
//! The prompt asks for `{ id, answer, why }` objects, but nothing forces the
//! model to comply. This module only reports on what came back; the printed
//! output is never altered.

use crate::criteria::Criterion;
use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use serde::Deserialize;
use std::collections::BTreeSet;

const FENCE: &str = "```";
const JSON_FENCE: &str = "```json";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Verdict {
    pub id: serde_json::Value,
    pub answer: bool,
    #[serde(default)]
    pub why: String,
}

impl Verdict {
    pub fn id_label(&self) -> String {
        match &self.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Verdict>),
    One(Verdict),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VerdictReport {
    pub answered: usize,
    pub fulfilled: usize,
    pub missing: Vec<String>,
    pub unknown: Vec<String>,
}

/// Returns the body of the first ```` ```json ```` fenced block, trimmed.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find(JSON_FENCE)? + JSON_FENCE.len();
    let rest = &text[start..];
    let end = rest.find(FENCE)?;
    Some(rest[..end].trim())
}

pub fn parse_verdicts(text: &str) -> Result<Vec<Verdict>> {
    let payload = match extract_json_block(text) {
        Some(block) => block,
        None => {
            let trimmed = text.trim();
            if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
                return Err(anyhow!("No JSON block found in model response"));
            }
            trimmed
        }
    };

    let parsed: OneOrMany =
        serde_json::from_str(payload).context("Model response JSON is not a verdict list")?;
    Ok(match parsed {
        OneOrMany::Many(list) => list,
        OneOrMany::One(single) => vec![single],
    })
}

pub fn check_verdicts(criteria: &[Criterion], verdicts: &[Verdict]) -> VerdictReport {
    let expected: BTreeSet<String> = criteria.iter().map(|c| c.id.to_string()).collect();
    let seen: BTreeSet<String> = verdicts.iter().map(Verdict::id_label).collect();

    VerdictReport {
        answered: verdicts.len(),
        fulfilled: verdicts.iter().filter(|v| v.answer).count(),
        missing: criteria
            .iter()
            .map(|c| c.id.to_string())
            .filter(|id| !seen.contains(id))
            .collect(),
        unknown: seen.difference(&expected).cloned().collect(),
    }
}

/// Logs how the model's answer lines up with the criteria. Never fails.
pub fn log_verdict_report(criteria: &[Criterion], text: &str) -> Option<VerdictReport> {
    let verdicts = match parse_verdicts(text) {
        Ok(verdicts) => verdicts,
        Err(err) => {
            warn!("Could not read verdicts from model response: {:#}", err);
            return None;
        }
    };

    let report = check_verdicts(criteria, &verdicts);
    info!(
        "Model answered {} of {} criteria ({} fulfilled).",
        report.answered,
        criteria.len(),
        report.fulfilled
    );
    if !report.missing.is_empty() {
        warn!("No verdict for criteria: {}", report.missing.join(", "));
    }
    if !report.unknown.is_empty() {
        warn!("Verdicts for unknown ids: {}", report.unknown.join(", "));
    }
    Some(report)
}
