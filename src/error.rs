use thiserror::Error;

use crate::voice_samples::SampleId;

/// Errors surfaced by the composition, playback and recording state machines.
///
/// Every variant is scoped to one entity: a failure on one voice sample never
/// changes the state of another.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComposerError {
    #[error("capture device unavailable: {reason}")]
    CaptureUnavailable { reason: String },

    #[error("upload failed for sample {id}: {message}")]
    UploadFailed { id: SampleId, message: String },

    #[error("preview failed for sample {id}: {message}")]
    PreviewFailed { id: SampleId, message: String },

    #[error("alignment malformed: {message}")]
    AlignmentMalformed { message: String },

    #[error("sample {id} cannot {action} while {status}")]
    InvalidTransition {
        id: SampleId,
        action: &'static str,
        status: &'static str,
    },

    #[error("unknown voice sample {0}")]
    UnknownSample(SampleId),

    #[error("sample {0} has no audio to play")]
    NoAudio(SampleId),

    #[error("background task worker has stopped")]
    WorkerStopped,
}

impl ComposerError {
    pub(crate) fn capture_unavailable(reason: impl Into<String>) -> Self {
        Self::CaptureUnavailable {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(id: SampleId, action: &'static str, status: &'static str) -> Self {
        Self::InvalidTransition { id, action, status }
    }
}

/// Failure reported by a [`BlobStorage`](crate::services::BlobStorage) call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("storage error: {message}")]
pub struct StorageError {
    pub message: String,
}

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure reported by an [`AudioCaptureDevice`](crate::services::AudioCaptureDevice).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("capture device is held by another session")]
    Busy,
    #[error("capture device error: {0}")]
    Device(String),
}

/// Failure reported by a [`SpeechGenerationService`](crate::services::SpeechGenerationService).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("speech generation failed: {message}")]
pub struct SpeechError {
    pub message: String,
}

impl SpeechError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type Result<T, E = ComposerError> = std::result::Result<T, E>;
