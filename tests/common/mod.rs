// Hand-written fakes for the studio's collaborators
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use voice_composer::alignment::AlignmentEntry;
use voice_composer::config::{Config, SpeechProvider};
use voice_composer::error::{CaptureError, SpeechError, StorageError};
use voice_composer::services::{
    AudioCaptureDevice, AudioOutputChannel, BlobRef, BlobStorage, GeneratedSpeech, PlaybackClock,
    SpeechGenerationService,
};
use voice_composer::{Collaborators, Studio, StudioUpdate};

/// Seconds each character lasts in generated speech
pub const CHAR_SECS: f64 = 0.1;

// ---- storage ----

#[derive(Default)]
pub struct StorageLog {
    pub blobs: HashMap<String, Vec<u8>>,
    pub uploads: usize,
    pub deleted: Vec<BlobRef>,
    next_blob: u64,
}

/// In-memory storage; uploads of payloads starting with `b"bad"` fail
#[derive(Default, Clone)]
pub struct FakeStorage {
    pub log: Arc<Mutex<StorageLog>>,
}

impl BlobStorage for FakeStorage {
    fn upload(&self, bytes: &[u8]) -> Result<BlobRef, StorageError> {
        let mut log = self.log.lock().unwrap();
        log.uploads += 1;
        if bytes.starts_with(b"bad") {
            return Err(StorageError::new("quota exceeded"));
        }
        log.next_blob += 1;
        let key = format!("blob-{}", log.next_blob);
        log.blobs.insert(key.clone(), bytes.to_vec());
        Ok(BlobRef(key))
    }

    fn download(&self, blob: &BlobRef) -> Result<Vec<u8>, StorageError> {
        self.log
            .lock()
            .unwrap()
            .blobs
            .get(&blob.0)
            .cloned()
            .ok_or_else(|| StorageError::new(format!("missing {}", blob)))
    }

    fn delete(&self, blob: &BlobRef) -> Result<(), StorageError> {
        let mut log = self.log.lock().unwrap();
        log.blobs.remove(&blob.0);
        log.deleted.push(blob.clone());
        Ok(())
    }
}

// ---- speech ----

/// Speaks every character for [`CHAR_SECS`]; text containing "fail" errors
#[derive(Default, Clone)]
pub struct FakeSpeech {
    /// Skip timing, like a browser voice
    pub without_alignment: bool,
}

impl SpeechGenerationService for FakeSpeech {
    fn generate(&self, text: &str, _provider: &SpeechProvider) -> Result<GeneratedSpeech, SpeechError> {
        if text.contains("fail") {
            return Err(SpeechError::new("voice unavailable"));
        }
        let alignment = if self.without_alignment {
            Vec::new()
        } else {
            text.chars()
                .enumerate()
                .map(|(i, c)| AlignmentEntry::new(c, i as f64 * CHAR_SECS, CHAR_SECS))
                .collect()
        };
        Ok(GeneratedSpeech {
            audio: text.as_bytes().to_vec(),
            alignment,
        })
    }
}

// ---- capture ----

#[derive(Default)]
pub struct CaptureLog {
    pub starts: usize,
    pub stops: usize,
    pub active: bool,
    pub fail_next_start: bool,
    /// Bytes returned by the next stop; defaults to a short recording
    pub next_recording: Option<Vec<u8>>,
}

#[derive(Default, Clone)]
pub struct FakeCapture {
    pub log: Arc<Mutex<CaptureLog>>,
}

impl AudioCaptureDevice for FakeCapture {
    fn start(&mut self) -> Result<(), CaptureError> {
        let mut log = self.log.lock().unwrap();
        if log.fail_next_start {
            log.fail_next_start = false;
            return Err(CaptureError::Device("permission denied".to_string()));
        }
        if log.active {
            return Err(CaptureError::Busy);
        }
        log.starts += 1;
        log.active = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<Vec<u8>, CaptureError> {
        let mut log = self.log.lock().unwrap();
        log.stops += 1;
        log.active = false;
        Ok(log.next_recording.take().unwrap_or_else(|| b"voice".to_vec()))
    }
}

// ---- output ----

#[derive(Debug, Clone, PartialEq)]
pub enum OutputCall {
    Play(Vec<u8>),
    Pause,
    Resume,
    Stop,
}

#[derive(Default)]
pub struct OutputLog {
    pub calls: Vec<OutputCall>,
    pub clocks: Vec<PlaybackClock>,
}

#[derive(Default, Clone)]
pub struct FakeOutput {
    pub log: Arc<Mutex<OutputLog>>,
}

impl FakeOutput {
    pub fn last_clock(&self) -> PlaybackClock {
        self.log.lock().unwrap().clocks.last().cloned().expect("nothing played")
    }

    pub fn calls(&self) -> Vec<OutputCall> {
        self.log.lock().unwrap().calls.clone()
    }
}

impl AudioOutputChannel for FakeOutput {
    fn play(&mut self, audio: Arc<[u8]>, clock: PlaybackClock) {
        let mut log = self.log.lock().unwrap();
        log.calls.push(OutputCall::Play(audio.to_vec()));
        log.clocks.push(clock);
    }

    fn pause(&mut self) {
        self.log.lock().unwrap().calls.push(OutputCall::Pause);
    }

    fn resume(&mut self) {
        self.log.lock().unwrap().calls.push(OutputCall::Resume);
    }

    fn stop(&mut self) {
        self.log.lock().unwrap().calls.push(OutputCall::Stop);
    }
}

// ---- harness ----

pub struct Harness {
    pub studio: Studio,
    pub storage: FakeStorage,
    pub capture: FakeCapture,
    pub output: FakeOutput,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config::default(), FakeSpeech::default())
    }

    pub fn with_config(config: Config, speech: FakeSpeech) -> Self {
        let storage = FakeStorage::default();
        let capture = FakeCapture::default();
        let output = FakeOutput::default();

        let studio = Studio::new(
            config,
            Collaborators {
                speech: Arc::new(speech),
                storage: Arc::new(storage.clone()),
                capture: Box::new(capture.clone()),
                output: Box::new(output.clone()),
            },
        );

        Self {
            studio,
            storage,
            capture,
            output,
        }
    }

    /// Pump events until `done` matches an update, or panic after two seconds
    pub fn pump_until(&mut self, mut done: impl FnMut(&StudioUpdate) -> bool) -> Vec<StudioUpdate> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut seen = Vec::new();
        while Instant::now() < deadline {
            if let Some(updates) = self.studio.pump(Duration::from_millis(20)) {
                let hit = updates.iter().any(&mut done);
                seen.extend(updates);
                if hit {
                    return seen;
                }
            }
        }
        panic!("timed out waiting for studio update; saw {:?}", seen);
    }

    /// Speak `text` and wait until its playback starts
    pub fn speak_and_wait(&mut self, text: &str) -> u64 {
        self.studio.speak(text).unwrap().expect("text was blank");
        let updates = self.pump_until(|u| matches!(u, StudioUpdate::PlaybackStarted(_)));
        updates
            .iter()
            .find_map(|u| match u {
                StudioUpdate::PlaybackStarted(session) => Some(*session),
                _ => None,
            })
            .unwrap()
    }
}
