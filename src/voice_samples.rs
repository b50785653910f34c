/// Voice sample lifecycle: capture, upload, preview and delete
///
/// Each sample moves through its own state machine:
///
/// ```text
/// idle --start--> recording --stop--> uploading --ok--> idle
///                                        |
///                                        +--fail--> error --retry--> uploading
/// idle/error --play--> playing --stop/end--> idle
/// ```
///
/// Samples are independent: a failure is recorded on the sample it belongs to
/// and never touches another one. Only two things are shared. The capture
/// device is held by at most one recording sample, and at most one sample
/// previews at a time. The collection performs no I/O; operations return
/// [`SampleCommand`]s for the studio to execute.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ComposerError, Result, StorageError};
use crate::services::BlobRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampleId(pub u64);

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// Selected from a file
    Upload,
    /// Captured from the microphone
    Recording,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleStatus {
    Idle,
    Recording,
    Uploading,
    Playing,
    Error(ComposerError),
}

impl SampleStatus {
    pub fn name(&self) -> &'static str {
        match self {
            SampleStatus::Idle => "idle",
            SampleStatus::Recording => "recording",
            SampleStatus::Uploading => "uploading",
            SampleStatus::Playing => "playing",
            SampleStatus::Error(_) => "error",
        }
    }
}

/// What happens when a second sample asks for the capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturePolicy {
    /// Stop the current recorder (its audio is discarded) and hand over
    #[default]
    RevokePrevious,
    /// Refuse with `CaptureUnavailable` until the current recorder stops
    RejectWhileHeld,
}

/// Side effects requested by the collection
#[derive(Debug, Clone, PartialEq)]
pub enum SampleCommand {
    /// Stop the capture device and drop whatever it recorded
    DiscardCapture { id: SampleId },
    StartCapture { id: SampleId },
    /// Stop the capture device and feed the bytes to `attach_capture`
    FinishCapture { id: SampleId, request_id: u64 },
    Upload {
        id: SampleId,
        request_id: u64,
        audio: Arc<[u8]>,
    },
    PlayPreview {
        id: SampleId,
        generation: u64,
        blob: BlobRef,
    },
    StopPreview { id: SampleId, generation: u64 },
    /// Fire-and-forget removal from storage
    DeleteBlob { blob: BlobRef },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Applied once the in-flight upload settles
    Queued,
}

#[derive(Debug, Clone)]
pub struct VoiceSample {
    id: SampleId,
    kind: SampleKind,
    blob_ref: Option<BlobRef>,
    status: SampleStatus,
    /// Audio kept until an upload succeeds so it can be retried
    pending_audio: Option<Arc<[u8]>>,
    pending_upload: Option<u64>,
    preview_generation: u64,
    delete_queued: bool,
    /// Status to restore if the capture device refuses to start
    before_capture: Option<SampleStatus>,
}

impl VoiceSample {
    fn new(id: SampleId, kind: SampleKind, status: SampleStatus) -> Self {
        Self {
            id,
            kind,
            blob_ref: None,
            status,
            pending_audio: None,
            pending_upload: None,
            preview_generation: 0,
            delete_queued: false,
            before_capture: None,
        }
    }

    pub fn id(&self) -> SampleId {
        self.id
    }

    pub fn kind(&self) -> SampleKind {
        self.kind
    }

    pub fn blob_ref(&self) -> Option<&BlobRef> {
        self.blob_ref.as_ref()
    }

    pub fn status(&self) -> &SampleStatus {
        &self.status
    }

    pub fn error(&self) -> Option<&ComposerError> {
        match &self.status {
            SampleStatus::Error(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_delete_queued(&self) -> bool {
        self.delete_queued
    }

    pub fn can_retry(&self) -> bool {
        matches!(self.status, SampleStatus::Error(_)) && self.pending_audio.is_some()
    }
}

pub struct VoiceSamples {
    samples: BTreeMap<SampleId, VoiceSample>,
    next_id: u64,
    next_request_id: u64,
    /// Sample currently holding the capture device
    capturing: Option<SampleId>,
    policy: CapturePolicy,
}

impl VoiceSamples {
    pub fn new(policy: CapturePolicy) -> Self {
        Self {
            samples: BTreeMap::new(),
            next_id: 1,
            next_request_id: 1,
            capturing: None,
            policy,
        }
    }

    pub fn get(&self, id: SampleId) -> Option<&VoiceSample> {
        self.samples.get(&id)
    }

    pub fn status(&self, id: SampleId) -> Option<&SampleStatus> {
        self.samples.get(&id).map(|s| &s.status)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VoiceSample> {
        self.samples.values()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capturing(&self) -> Option<SampleId> {
        self.capturing
    }

    /// Sample currently previewing, with its preview generation
    pub fn playing(&self) -> Option<(SampleId, u64)> {
        self.samples
            .values()
            .find(|s| s.status == SampleStatus::Playing)
            .map(|s| (s.id, s.preview_generation))
    }

    pub fn is_previewing(&self, id: SampleId, generation: u64) -> bool {
        self.samples
            .get(&id)
            .map_or(false, |s| s.status == SampleStatus::Playing && s.preview_generation == generation)
    }

    /// Register a sample from a selected file and start uploading it
    pub fn add_file(&mut self, bytes: Vec<u8>) -> (SampleId, Vec<SampleCommand>) {
        let id = self.allocate_id();
        let mut sample = VoiceSample::new(id, SampleKind::Upload, SampleStatus::Idle);

        if bytes.is_empty() {
            sample.status = SampleStatus::Error(ComposerError::UploadFailed {
                id,
                message: "selected file is empty".to_string(),
            });
            self.samples.insert(id, sample);
            return (id, Vec::new());
        }

        let request_id = self.generate_request_id();
        let audio: Arc<[u8]> = bytes.into();
        sample.status = SampleStatus::Uploading;
        sample.pending_audio = Some(Arc::clone(&audio));
        sample.pending_upload = Some(request_id);
        self.samples.insert(id, sample);

        info!(sample = %id, bytes = audio.len(), "uploading selected file");
        (id, vec![SampleCommand::Upload { id, request_id, audio }])
    }

    /// Create a new recording sample and start capturing into it
    pub fn start_new_capture(&mut self) -> Result<(SampleId, Vec<SampleCommand>)> {
        if let (CapturePolicy::RejectWhileHeld, Some(holder)) = (self.policy, self.capturing) {
            return Err(ComposerError::capture_unavailable(format!(
                "held by sample {}",
                holder
            )));
        }

        let id = self.allocate_id();
        self.samples
            .insert(id, VoiceSample::new(id, SampleKind::Recording, SampleStatus::Idle));

        match self.start_capture(id) {
            Ok(commands) => {
                if let Some(sample) = self.samples.get_mut(&id) {
                    sample.before_capture = None;
                }
                Ok((id, commands))
            }
            Err(err) => {
                self.samples.remove(&id);
                Err(err)
            }
        }
    }

    /// Start (re-)recording into an existing sample
    pub fn start_capture(&mut self, id: SampleId) -> Result<Vec<SampleCommand>> {
        let status = self.require(id)?.status.clone();
        match status {
            SampleStatus::Recording => return Ok(Vec::new()),
            SampleStatus::Uploading => return Err(ComposerError::invalid(id, "record", status.name())),
            SampleStatus::Idle | SampleStatus::Playing | SampleStatus::Error(_) => {}
        }

        let mut commands = Vec::new();

        if let Some(holder) = self.capturing.filter(|holder| *holder != id) {
            match self.policy {
                CapturePolicy::RejectWhileHeld => {
                    return Err(ComposerError::capture_unavailable(format!(
                        "held by sample {}",
                        holder
                    )));
                }
                CapturePolicy::RevokePrevious => {
                    info!(revoked = %holder, sample = %id, "capture device handed over");
                    if let Some(previous) = self.samples.get_mut(&holder) {
                        previous.status = SampleStatus::Idle;
                        previous.before_capture = None;
                    }
                    commands.push(SampleCommand::DiscardCapture { id: holder });
                }
            }
        }

        let sample = self.require_mut(id)?;
        if sample.status == SampleStatus::Playing {
            commands.push(SampleCommand::StopPreview {
                id,
                generation: sample.preview_generation,
            });
            sample.preview_generation += 1;
            sample.status = SampleStatus::Idle;
        }

        sample.before_capture = Some(sample.status.clone());
        sample.status = SampleStatus::Recording;
        self.capturing = Some(id);

        debug!(sample = %id, "capture started");
        commands.push(SampleCommand::StartCapture { id });
        Ok(commands)
    }

    /// The capture device refused to start; roll the sample back
    pub fn capture_failed(&mut self, id: SampleId, reason: &str) -> ComposerError {
        warn!(sample = %id, reason, "capture device unavailable");
        if self.capturing == Some(id) {
            self.capturing = None;
        }

        let previous = self.samples.get_mut(&id).and_then(|s| s.before_capture.take());
        match previous {
            Some(status) => {
                if let Some(sample) = self.samples.get_mut(&id) {
                    sample.status = status;
                }
            }
            None => {
                // Fresh sample with nothing recorded yet
                self.samples.remove(&id);
            }
        }

        ComposerError::capture_unavailable(reason)
    }

    /// Stop recording; the sample moves to `uploading` right away
    pub fn stop_capture(&mut self, id: SampleId) -> Result<Vec<SampleCommand>> {
        let sample = self.require(id)?;
        if sample.status != SampleStatus::Recording {
            return Err(ComposerError::invalid(id, "stop recording", sample.status.name()));
        }

        let request_id = self.generate_request_id();
        let sample = self.require_mut(id)?;
        sample.status = SampleStatus::Uploading;
        sample.pending_upload = Some(request_id);
        sample.before_capture = None;
        self.capturing = None;

        debug!(sample = %id, request_id, "capture stopped, upload pending");
        Ok(vec![SampleCommand::FinishCapture { id, request_id }])
    }

    /// Hand the captured bytes over for upload
    pub fn attach_capture(&mut self, id: SampleId, request_id: u64, bytes: Vec<u8>) -> Vec<SampleCommand> {
        let awaiting = self
            .samples
            .get(&id)
            .map_or(false, |s| s.pending_upload == Some(request_id));
        if !awaiting {
            return Vec::new();
        }

        if bytes.is_empty() {
            return self.upload_finished(id, request_id, Err(StorageError::new("no audio captured")));
        }

        let audio: Arc<[u8]> = bytes.into();
        if let Some(sample) = self.samples.get_mut(&id) {
            sample.pending_audio = Some(Arc::clone(&audio));
        }
        info!(sample = %id, bytes = audio.len(), "uploading recording");
        vec![SampleCommand::Upload { id, request_id, audio }]
    }

    /// Settle an upload; stale completions are ignored
    pub fn upload_finished(
        &mut self,
        id: SampleId,
        request_id: u64,
        result: std::result::Result<BlobRef, StorageError>,
    ) -> Vec<SampleCommand> {
        let Some(sample) = self.samples.get_mut(&id) else {
            return Vec::new();
        };
        if sample.pending_upload != Some(request_id) {
            debug!(sample = %id, request_id, "ignoring stale upload result");
            return Vec::new();
        }
        sample.pending_upload = None;

        let mut commands = Vec::new();
        match result {
            Ok(blob) => {
                info!(sample = %id, blob = %blob, "upload complete");
                if let Some(old) = sample.blob_ref.replace(blob.clone()) {
                    if old != blob {
                        commands.push(SampleCommand::DeleteBlob { blob: old });
                    }
                }
                sample.pending_audio = None;
                sample.status = SampleStatus::Idle;
            }
            Err(err) => {
                warn!(sample = %id, error = %err, "upload failed");
                sample.status = SampleStatus::Error(ComposerError::UploadFailed {
                    id,
                    message: err.message,
                });
            }
        }

        if sample.delete_queued {
            debug!(sample = %id, "applying queued delete");
            commands.extend(self.remove(id));
        }

        commands
    }

    /// Upload the retained audio again after a failure
    pub fn retry(&mut self, id: SampleId) -> Result<Vec<SampleCommand>> {
        let sample = self.require(id)?;
        if !matches!(sample.status, SampleStatus::Error(_)) {
            return Err(ComposerError::invalid(id, "retry", sample.status.name()));
        }
        let Some(audio) = sample.pending_audio.clone() else {
            return Err(ComposerError::NoAudio(id));
        };

        let request_id = self.generate_request_id();
        let sample = self.require_mut(id)?;
        sample.status = SampleStatus::Uploading;
        sample.pending_upload = Some(request_id);

        info!(sample = %id, request_id, "retrying upload");
        Ok(vec![SampleCommand::Upload { id, request_id, audio }])
    }

    /// Delete a sample, or queue the delete while an upload is in flight
    pub fn delete(&mut self, id: SampleId) -> Result<(DeleteOutcome, Vec<SampleCommand>)> {
        let sample = self.require_mut(id)?;
        match sample.status {
            SampleStatus::Recording => Err(ComposerError::invalid(id, "delete", "recording")),
            SampleStatus::Uploading => {
                sample.delete_queued = true;
                info!(sample = %id, "delete queued until upload settles");
                Ok((DeleteOutcome::Queued, Vec::new()))
            }
            _ => Ok((DeleteOutcome::Deleted, self.remove(id))),
        }
    }

    /// Preview a sample, stopping any other preview
    pub fn play(&mut self, id: SampleId) -> Result<Vec<SampleCommand>> {
        let sample = self.require(id)?;
        match &sample.status {
            SampleStatus::Playing => return Ok(Vec::new()),
            SampleStatus::Idle | SampleStatus::Error(_) => {}
            other => return Err(ComposerError::invalid(id, "play", other.name())),
        }
        let Some(blob) = sample.blob_ref.clone() else {
            return Err(ComposerError::NoAudio(id));
        };

        let mut commands = Vec::new();
        if let Some((other, generation)) = self.playing() {
            if let Some(previous) = self.samples.get_mut(&other) {
                previous.status = SampleStatus::Idle;
            }
            commands.push(SampleCommand::StopPreview { id: other, generation });
        }

        let sample = self.require_mut(id)?;
        sample.preview_generation += 1;
        sample.status = SampleStatus::Playing;
        commands.push(SampleCommand::PlayPreview {
            id,
            generation: sample.preview_generation,
            blob,
        });
        Ok(commands)
    }

    pub fn stop(&mut self, id: SampleId) -> Result<Vec<SampleCommand>> {
        let sample = self.require_mut(id)?;
        if sample.status != SampleStatus::Playing {
            return Ok(Vec::new());
        }
        sample.status = SampleStatus::Idle;
        Ok(vec![SampleCommand::StopPreview {
            id,
            generation: sample.preview_generation,
        }])
    }

    pub fn preview_ended(&mut self, id: SampleId, generation: u64) {
        if self.is_previewing(id, generation) {
            if let Some(sample) = self.samples.get_mut(&id) {
                sample.status = SampleStatus::Idle;
            }
        }
    }

    /// The output channel was taken by utterance playback
    pub fn preview_revoked(&mut self, id: SampleId, generation: u64) -> bool {
        if !self.is_previewing(id, generation) {
            return false;
        }
        if let Some(sample) = self.samples.get_mut(&id) {
            sample.status = SampleStatus::Idle;
        }
        true
    }

    pub fn preview_failed(&mut self, id: SampleId, generation: u64, message: String) {
        if !self.is_previewing(id, generation) {
            return;
        }
        warn!(sample = %id, message = message.as_str(), "preview failed");
        if let Some(sample) = self.samples.get_mut(&id) {
            sample.status = SampleStatus::Error(ComposerError::PreviewFailed { id, message });
        }
    }

    fn remove(&mut self, id: SampleId) -> Vec<SampleCommand> {
        let Some(sample) = self.samples.remove(&id) else {
            return Vec::new();
        };
        info!(sample = %id, "sample deleted");

        let mut commands = Vec::new();
        if sample.status == SampleStatus::Playing {
            commands.push(SampleCommand::StopPreview {
                id,
                generation: sample.preview_generation,
            });
        }
        if let Some(blob) = sample.blob_ref {
            commands.push(SampleCommand::DeleteBlob { blob });
        }
        commands
    }

    fn require(&self, id: SampleId) -> Result<&VoiceSample> {
        self.samples.get(&id).ok_or(ComposerError::UnknownSample(id))
    }

    fn require_mut(&mut self, id: SampleId) -> Result<&mut VoiceSample> {
        self.samples.get_mut(&id).ok_or(ComposerError::UnknownSample(id))
    }

    fn allocate_id(&mut self) -> SampleId {
        let id = SampleId(self.next_id);
        self.next_id += 1;
        id
    }

    fn generate_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }
}
