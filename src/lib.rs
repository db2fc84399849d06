pub mod config;
pub mod criteria;
pub mod gemini;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod prompt;
pub mod verdicts;
