use anyhow::{Context, Result};
use log::{debug, info};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;

/// Identifier of a criterion as written in the criteria file.
///
/// Both JSON numbers and strings are accepted and rendered verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CriterionId {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for CriterionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CriterionId::Number(n) => write!(f, "{}", n),
            CriterionId::Text(s) => f.write_str(s),
        }
    }
}

/// One evaluation question to be judged against the video.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Criterion {
    pub id: CriterionId,
    pub description: String,
}

pub fn parse_criteria(contents: &str) -> Result<Vec<Criterion>> {
    let criteria: Vec<Criterion> = serde_json::from_str(contents)
        .context("Criteria must be a JSON array of {\"id\", \"description\"} objects")?;
    Ok(criteria)
}

pub fn load_criteria(path: &Path) -> Result<Vec<Criterion>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read criteria file at {}", path.display()))?;

    let criteria = parse_criteria(&contents)
        .with_context(|| format!("Invalid criteria file {}", path.display()))?;

    info!(
        "Loaded {} criteria from {}.",
        criteria.len(),
        path.display()
    );
    for criterion in &criteria {
        debug!("  criterion {}: {}", criterion.id, criterion.description);
    }

    Ok(criteria)
}
