use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::reddit::FetchError;

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("post contains no usable text after normalization")]
    EmptyContent,
}

#[derive(Error, Debug)]
#[error("narration synthesis failed for unit {unit_index} after {attempts} attempt(s): {source}")]
pub struct SynthesisFailure {
    pub unit_index: usize,
    pub attempts: u32,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("no background asset available in {}", dir.display())]
    NoBackgroundAsset { dir: PathBuf },

    #[error("failed to probe background asset {}: {source}", path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("ffmpeg exited with {status}: {stderr}")]
    Encode { status: String, stderr: String },

    #[error("failed to concatenate narration: {0}")]
    Concat(#[source] anyhow::Error),

    #[error("render I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisFailure),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("invalid configuration: {0:#}")]
    Config(anyhow::Error),

    #[error("run exceeded the {0:?} timeout")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Fetch(_) => 2,
            PipelineError::Synthesis(_) => 3,
            PipelineError::Render(_) => 4,
            PipelineError::Content(_) => 5,
            PipelineError::Asset(_) => 6,
            PipelineError::Timeout(_) => 7,
            PipelineError::Config(_) | PipelineError::Io(_) => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Degradation {
    FallbackFont { requested: PathBuf, used: Option<PathBuf> },
    MutedNarration { unit_index: usize, estimated_seconds: f64 },
    SkippedBackground { path: PathBuf },
}

impl std::fmt::Display for Degradation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Degradation::FallbackFont { requested, used: Some(used) } => write!(
                f,
                "font {} unavailable, using {}",
                requested.display(),
                used.display()
            ),
            Degradation::FallbackFont { requested, used: None } => write!(
                f,
                "font {} unavailable, using approximate metrics and the renderer default font",
                requested.display()
            ),
            Degradation::MutedNarration { unit_index, estimated_seconds } => write!(
                f,
                "unit {} narrated as {:.2}s of silence",
                unit_index, estimated_seconds
            ),
            Degradation::SkippedBackground { path } => {
                write!(f, "background {} could not be probed", path.display())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_family() {
        let codes = [
            PipelineError::Fetch(FetchError::NoContent {
                subreddit: "x".into(),
            })
            .exit_code(),
            PipelineError::Synthesis(SynthesisFailure {
                unit_index: 0,
                attempts: 2,
                source: anyhow::anyhow!("boom"),
            })
            .exit_code(),
            PipelineError::Render(RenderError::Encode {
                status: "exit status: 1".into(),
                stderr: String::new(),
            })
            .exit_code(),
        ];
        assert_eq!(codes, [2, 3, 4]);
    }

    #[test]
    fn synthesis_failure_names_the_unit() {
        let err = SynthesisFailure {
            unit_index: 1,
            attempts: 2,
            source: anyhow::anyhow!("piper exited with 1"),
        };
        assert!(err.to_string().contains("unit 1"));
    }
}
