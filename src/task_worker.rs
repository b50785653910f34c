/// Background threads for blocking collaborator calls
///
/// Storage and speech generation run off the host loop. Each finished call
/// is posted back to the studio as a [`StudioEvent`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

use crate::config::SpeechProvider;
use crate::error::{ComposerError, Result};
use crate::services::{BlobRef, BlobStorage, SpeechGenerationService};
use crate::studio::StudioEvent;
use crate::voice_samples::SampleId;

/// Message sent to the storage thread
#[derive(Debug)]
enum StorageTask {
    Upload {
        sample: SampleId,
        request_id: u64,
        audio: Arc<[u8]>,
    },
    Download {
        sample: SampleId,
        generation: u64,
        blob: BlobRef,
    },
    /// Fire-and-forget; failures are only logged
    Delete { blob: BlobRef },
}

/// Message sent to the speech thread
#[derive(Debug)]
struct SpeechTask {
    request_id: u64,
    text: String,
    provider: SpeechProvider,
}

/// Handle for the background threads that run blocking collaborator calls
///
/// Results come back as [`StudioEvent`]s on the studio queue. A call that is
/// already running cannot be aborted; the studio ignores its result instead.
pub struct TaskWorker {
    storage_sender: Sender<StorageTask>,
    speech_sender: Sender<SpeechTask>,
    /// Newest speech request; queued older ones are skipped
    latest_speech: Arc<AtomicU64>,
}

impl TaskWorker {
    /// Spawn one storage thread and one speech thread
    pub fn spawn(
        storage: Arc<dyn BlobStorage>,
        speech: Arc<dyn SpeechGenerationService>,
        events: Sender<StudioEvent>,
    ) -> Self {
        let (storage_tx, storage_rx) = channel();
        let (speech_tx, speech_rx) = channel();

        let latest_speech = Arc::new(AtomicU64::new(0));

        let storage_events = events.clone();
        thread::spawn(move || {
            Self::storage_loop(storage_rx, storage_events, storage);
        });

        let latest = Arc::clone(&latest_speech);
        thread::spawn(move || {
            Self::speech_loop(speech_rx, events, speech, latest);
        });

        TaskWorker {
            storage_sender: storage_tx,
            speech_sender: speech_tx,
            latest_speech,
        }
    }

    pub fn upload(&self, sample: SampleId, request_id: u64, audio: Arc<[u8]>) -> Result<()> {
        self.send_storage(StorageTask::Upload {
            sample,
            request_id,
            audio,
        })
    }

    pub fn download(&self, sample: SampleId, generation: u64, blob: BlobRef) -> Result<()> {
        self.send_storage(StorageTask::Download {
            sample,
            generation,
            blob,
        })
    }

    pub fn delete_blob(&self, blob: BlobRef) -> Result<()> {
        self.send_storage(StorageTask::Delete { blob })
    }

    /// Queue a generation and drop any older ones still waiting
    pub fn generate(&self, request_id: u64, text: String, provider: SpeechProvider) -> Result<()> {
        self.latest_speech.fetch_max(request_id, Ordering::AcqRel);
        self.speech_sender
            .send(SpeechTask {
                request_id,
                text,
                provider,
            })
            .map_err(|_| {
                warn!("speech worker disconnected");
                ComposerError::WorkerStopped
            })
    }

    fn send_storage(&self, task: StorageTask) -> Result<()> {
        self.storage_sender.send(task).map_err(|_| {
            warn!("storage worker disconnected");
            ComposerError::WorkerStopped
        })
    }

    fn storage_loop(
        task_rx: Receiver<StorageTask>,
        events: Sender<StudioEvent>,
        storage: Arc<dyn BlobStorage>,
    ) {
        debug!("storage worker thread started");

        for task in task_rx {
            let event = match task {
                StorageTask::Upload {
                    sample,
                    request_id,
                    audio,
                } => StudioEvent::UploadFinished {
                    sample,
                    request_id,
                    result: storage.upload(&audio),
                },
                StorageTask::Download {
                    sample,
                    generation,
                    blob,
                } => StudioEvent::PreviewLoaded {
                    sample,
                    generation,
                    result: storage.download(&blob),
                },
                StorageTask::Delete { blob } => {
                    match storage.delete(&blob) {
                        Ok(()) => info!(blob = %blob, "blob deleted"),
                        Err(e) => warn!(blob = %blob, error = %e, "blob delete failed"),
                    }
                    continue;
                }
            };

            if events.send(event).is_err() {
                debug!("storage worker: studio disconnected");
                break;
            }
        }

        debug!("storage worker thread stopped");
    }

    fn speech_loop(
        task_rx: Receiver<SpeechTask>,
        events: Sender<StudioEvent>,
        speech: Arc<dyn SpeechGenerationService>,
        latest: Arc<AtomicU64>,
    ) {
        debug!("speech worker thread started");

        for task in task_rx {
            if task.request_id < latest.load(Ordering::Acquire) {
                debug!(request_id = task.request_id, "skipping superseded speech request");
                continue;
            }

            let result = speech.generate(&task.text, &task.provider);
            let event = StudioEvent::SpeechReady {
                request_id: task.request_id,
                text: task.text,
                provider: task.provider,
                result,
            };
            if events.send(event).is_err() {
                debug!("speech worker: studio disconnected");
                break;
            }
        }

        debug!("speech worker thread stopped");
    }
}
