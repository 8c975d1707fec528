use std::path::{Path, PathBuf};

use crate::{
    error::{PipelineError, PipelineResult},
    types::OutputArtifact,
};

pub const MSG_MISSING_UPLOAD: &str = "エラー: 動画ファイルを選択してください。";
pub const MSG_DECODE_FAILED: &str =
    "エラー: 動画解析に失敗しました。サポートされていない動画形式か、動画が破損している可能性があります。";
pub const MSG_EMPTY_VIDEO: &str =
    "警告: 動画からフレームを処理できませんでした。動画が空か非常に短い可能性があります。";
pub const MSG_WRITE_FAILED: &str = "エラー: 解析結果の保存に失敗しました。";
pub const MSG_SUCCESS: &str = "処理が正常に完了しました。";
const NOTE_VIDEO_MISSING: &str = " (注意: 可視化動画の保存に失敗)";
const NOTE_DATA_MISSING: &str = " (注意: ランドマークデータの保存に失敗)";

/// What the UI shows for a finished run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Presentation {
    pub playback: Option<PathBuf>,
    pub download: Option<PathBuf>,
    pub status: String,
    pub is_error: bool,
}

impl Presentation {
    fn failure(status: impl Into<String>) -> Self {
        Self {
            playback: None,
            download: None,
            status: status.into(),
            is_error: true,
        }
    }
}

pub fn present(result: &PipelineResult<OutputArtifact>) -> Presentation {
    match result {
        Ok(artifact) => present_artifact(artifact),
        Err(err) => present_error(err),
    }
}

fn present_artifact(artifact: &OutputArtifact) -> Presentation {
    let playback = existing(&artifact.video_path);
    let download = existing(&artifact.data_path);
    if playback.is_none() && download.is_none() {
        return Presentation::failure(MSG_WRITE_FAILED);
    }

    let mut status = format!("{MSG_SUCCESS} ({} フレーム)", artifact.frame_count);
    if playback.is_none() {
        status.push_str(NOTE_VIDEO_MISSING);
    }
    if download.is_none() {
        status.push_str(NOTE_DATA_MISSING);
    }

    Presentation {
        playback,
        download,
        status,
        is_error: false,
    }
}

fn present_error(err: &PipelineError) -> Presentation {
    let status = match err {
        PipelineError::MissingUpload | PipelineError::InvalidUpload { .. } => {
            MSG_MISSING_UPLOAD.to_string()
        }
        PipelineError::Decode { .. } => MSG_DECODE_FAILED.to_string(),
        PipelineError::EmptyVideo { .. } => MSG_EMPTY_VIDEO.to_string(),
        PipelineError::Write { .. } => MSG_WRITE_FAILED.to_string(),
        PipelineError::Tool { .. } | PipelineError::Model(_) => {
            format!("予期せぬエラーが発生しました: {err}")
        }
    };
    Presentation::failure(status)
}

fn existing(path: &Path) -> Option<PathBuf> {
    path.is_file().then(|| path.to_path_buf())
}
