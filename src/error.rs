use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no video file was provided")]
    MissingUpload,
    #[error("uploaded file {path} does not exist or is not a regular file")]
    InvalidUpload { path: PathBuf },
    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("{path} contains no decodable frames")]
    EmptyVideo { path: PathBuf },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to run {tool}: {source}")]
    Tool {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("pose model error: {0:#}")]
    Model(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PipelineError::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PipelineError::Write {
            path: path.into(),
            source,
        }
    }

    pub fn write_msg(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        PipelineError::Write {
            path: path.into(),
            source: io::Error::other(message.into()),
        }
    }

    /// Failures raised before anything is written to disk.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            PipelineError::MissingUpload
                | PipelineError::InvalidUpload { .. }
                | PipelineError::Decode { .. }
                | PipelineError::EmptyVideo { .. }
        )
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
