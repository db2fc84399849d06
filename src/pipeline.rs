use crate::criteria::{load_criteria, Criterion};
use crate::output::AnalysisOutput;
use crate::prompt::build_prompt;
use anyhow::{Context, Result};
use log::info;
use std::path::{Path, PathBuf};

/// Something that can judge a local video against a prompt.
pub trait RemoteAnalyzer {
    /// Returns the model's raw text for `prompt` about `video`.
    fn analyze(&self, video: &Path, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub video_path: PathBuf,
    pub criteria_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub criteria: Vec<Criterion>,
    pub output: AnalysisOutput,
}

/// Loads criteria, builds the prompt and asks the analyzer.
///
/// Criteria problems are reported before the analyzer is touched.
pub fn run<A: RemoteAnalyzer + ?Sized>(request: &AnalysisRequest, analyzer: &A) -> Result<AnalysisRun> {
    let criteria = load_criteria(&request.criteria_path)?;
    let prompt = build_prompt(&criteria);

    info!(
        "Analyzing '{}' against {} criteria.",
        request.video_path.display(),
        criteria.len()
    );
    let text = analyzer
        .analyze(&request.video_path, &prompt)
        .with_context(|| format!("Video analysis failed for {}", request.video_path.display()))?;

    Ok(AnalysisRun {
        criteria,
        output: AnalysisOutput::new(text),
    })
}
