/// External collaborators consumed by the studio
///
/// Speech generation, blob storage, audio capture and audio output are
/// provided by the host. Storage and speech calls may block and run on the
/// [`TaskWorker`](crate::task_worker::TaskWorker) thread, so they must be
/// `Send + Sync`. Capture and output are driven from the host's event loop
/// only.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::alignment::AlignmentEntry;
use crate::config::SpeechProvider;
use crate::error::{CaptureError, SpeechError, StorageError};
use crate::studio::{OutputOwner, StudioEvent};

/// Opaque reference to an object held by blob storage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobRef(pub String);

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Audio and character timing for one utterance
#[derive(Debug, Clone, Default)]
pub struct GeneratedSpeech {
    pub audio: Vec<u8>,
    /// Ordered by character position; may be empty for voices without timing
    pub alignment: Vec<AlignmentEntry>,
}

pub trait SpeechGenerationService: Send + Sync {
    fn generate(&self, text: &str, provider: &SpeechProvider)
        -> Result<GeneratedSpeech, SpeechError>;
}

pub trait BlobStorage: Send + Sync {
    fn upload(&self, bytes: &[u8]) -> Result<BlobRef, StorageError>;
    fn download(&self, blob: &BlobRef) -> Result<Vec<u8>, StorageError>;
    fn delete(&self, blob: &BlobRef) -> Result<(), StorageError>;
}

/// The single microphone shared by all voice samples
pub trait AudioCaptureDevice {
    fn start(&mut self) -> Result<(), CaptureError>;
    /// Stop capturing and hand over everything recorded since `start`
    fn stop(&mut self) -> Result<Vec<u8>, CaptureError>;
}

/// The single speaker shared by utterance playback and sample previews
///
/// `play` must report progress through the given clock until it ends or
/// `stop` is called. A clock whose [`PlaybackClock::tick`] returns `false` has
/// been revoked and its timer should be torn down.
pub trait AudioOutputChannel {
    fn play(&mut self, audio: Arc<[u8]>, clock: PlaybackClock);
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
}

/// Tick and end notifications for one playback, posted to the studio queue
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    owner: OutputOwner,
    events: Sender<StudioEvent>,
    cancelled: Arc<AtomicBool>,
    interval_ms: u64,
}

impl PlaybackClock {
    pub(crate) fn new(owner: OutputOwner, events: Sender<StudioEvent>, interval_ms: u64) -> Self {
        Self {
            owner,
            events,
            cancelled: Arc::new(AtomicBool::new(false)),
            interval_ms,
        }
    }

    pub fn owner(&self) -> OutputOwner {
        self.owner
    }

    /// Requested tick cadence
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Report the playback position in seconds
    ///
    /// Returns `false` once the clock is revoked; nothing is posted then.
    pub fn tick(&self, time: f64) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.events
            .send(StudioEvent::Tick {
                owner: self.owner,
                time,
            })
            .is_ok()
    }

    pub fn ended(&self) {
        if self.is_cancelled() {
            return;
        }
        let _ = self.events.send(StudioEvent::PlaybackEnded { owner: self.owner });
    }

    pub(crate) fn cancel_handle(&self) -> ClockCancel {
        ClockCancel(Arc::clone(&self.cancelled))
    }
}

/// Studio-side handle revoking a clock handed to the output channel
#[derive(Debug)]
pub(crate) struct ClockCancel(Arc<AtomicBool>);

impl ClockCancel {
    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}
