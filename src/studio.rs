/// Coordinator for utterance playback and voice sample recording
///
/// The studio is constructed once with its collaborators and owns one
/// [`PlaybackSync`] and one [`VoiceSamples`]. It runs on the host's event
/// loop: user actions are method calls, and everything asynchronous (clock
/// ticks, playback ends, upload/download/speech completions) arrives as a
/// [`StudioEvent`] on a single queue drained with [`Studio::pump`] or
/// [`Studio::drain`]. State machines only advance inside those calls.
///
/// The output channel and the capture device each have one holder at a time.
/// Handing either to a new session first stops the previous holder.

use std::collections::VecDeque;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::alignment::AlignmentIndex;
use crate::config::{Config, SpeechProvider};
use crate::constants;
use crate::error::{Result, SpeechError, StorageError};
use crate::playback::{HighlightChange, PlaybackCommand, PlaybackState, PlaybackSync, SessionId, Utterance};
use crate::services::{
    AudioCaptureDevice, AudioOutputChannel, BlobRef, BlobStorage, ClockCancel, GeneratedSpeech,
    PlaybackClock, SpeechGenerationService,
};
use crate::task_worker::TaskWorker;
use crate::voice_samples::{DeleteOutcome, SampleCommand, SampleId, VoiceSamples};

/// Who is currently using the output channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputOwner {
    Utterance(SessionId),
    Sample { id: SampleId, generation: u64 },
}

/// Completion signals delivered to the studio's queue
#[derive(Debug)]
pub enum StudioEvent {
    Tick {
        owner: OutputOwner,
        time: f64,
    },
    PlaybackEnded {
        owner: OutputOwner,
    },
    UploadFinished {
        sample: SampleId,
        request_id: u64,
        result: std::result::Result<BlobRef, StorageError>,
    },
    PreviewLoaded {
        sample: SampleId,
        generation: u64,
        result: std::result::Result<Vec<u8>, StorageError>,
    },
    SpeechReady {
        request_id: u64,
        text: String,
        provider: SpeechProvider,
        result: std::result::Result<GeneratedSpeech, SpeechError>,
    },
}

/// What changed while handling an event
#[derive(Debug, Clone, PartialEq)]
pub enum StudioUpdate {
    Highlight(HighlightChange),
    PlaybackStarted(SessionId),
    PlaybackFinished(SessionId),
    SpeechFailed(String),
    SampleChanged(SampleId),
}

/// Collaborators injected at construction
pub struct Collaborators {
    pub speech: Arc<dyn SpeechGenerationService>,
    pub storage: Arc<dyn BlobStorage>,
    pub capture: Box<dyn AudioCaptureDevice>,
    pub output: Box<dyn AudioOutputChannel>,
}

pub struct Studio {
    config: Config,
    playback: PlaybackSync,
    samples: VoiceSamples,
    capture: Box<dyn AudioCaptureDevice>,
    output: Box<dyn AudioOutputChannel>,
    worker: TaskWorker,
    events_tx: Sender<StudioEvent>,
    events_rx: Receiver<StudioEvent>,
    /// Current output holder and the handle revoking its clock
    output_holder: Option<(OutputOwner, ClockCancel)>,
    pending_speech: Option<u64>,
    next_speech_request: u64,
}

impl Studio {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let (events_tx, events_rx) = channel();
        let worker = TaskWorker::spawn(
            collaborators.storage,
            collaborators.speech,
            events_tx.clone(),
        );

        let mut config = config;
        let tick_ms = config
            .playback
            .tick_interval_ms
            .clamp(1, constants::playback::MAX_TICK_INTERVAL_MS);
        if tick_ms != config.playback.tick_interval_ms {
            warn!(
                requested = config.playback.tick_interval_ms,
                using = tick_ms,
                "tick interval out of range"
            );
            config.playback.tick_interval_ms = tick_ms;
        }

        let tick = Duration::from_millis(tick_ms);
        let policy = config.recording.capture_policy;

        info!(
            provider = ?config.speech.kind(),
            tick_ms = config.playback.tick_interval_ms,
            ?policy,
            "studio ready"
        );

        Self {
            playback: PlaybackSync::new(tick),
            samples: VoiceSamples::new(policy),
            capture: collaborators.capture,
            output: collaborators.output,
            worker,
            events_tx,
            events_rx,
            output_holder: None,
            pending_speech: None,
            next_speech_request: 1,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn playback(&self) -> &PlaybackSync {
        &self.playback
    }

    pub fn playback_state(&self) -> &PlaybackState {
        self.playback.state()
    }

    pub fn subscribe_playback(&mut self) -> Receiver<PlaybackState> {
        self.playback.subscribe()
    }

    pub fn samples(&self) -> &VoiceSamples {
        &self.samples
    }

    pub fn output_owner(&self) -> Option<OutputOwner> {
        self.output_holder.as_ref().map(|(owner, _)| *owner)
    }

    // ---- utterance playback ----

    /// Generate speech for `text` and play it once ready
    ///
    /// Blank text is not an error; nothing is requested and `None` returned.
    /// Only the most recent request is played.
    pub fn speak(&mut self, text: &str) -> Result<Option<u64>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let request_id = self.next_speech_request;
        self.next_speech_request = self.next_speech_request.wrapping_add(1);
        self.pending_speech = Some(request_id);

        debug!(request_id, chars = text.chars().count(), "requesting speech");
        self.worker
            .generate(request_id, text.to_string(), self.config.speech.clone())?;
        Ok(Some(request_id))
    }

    /// Start playing an already generated utterance
    pub fn play_utterance(&mut self, utterance: Utterance) -> SessionId {
        let (session, commands) = self.playback.start_session(utterance);
        self.apply_playback(commands);
        session
    }

    pub fn toggle_play_pause(&mut self) {
        self.toggle_play_pause_at(Instant::now());
    }

    pub fn toggle_play_pause_at(&mut self, now: Instant) {
        let commands = self.playback.toggle_play_pause(now);
        self.apply_playback(commands);
    }

    /// Stop the current utterance and drop any speech still being generated
    pub fn stop_playback(&mut self) {
        self.pending_speech = None;
        let commands = self.playback.halt();
        self.apply_playback(commands);
    }

    // ---- voice samples ----

    pub fn add_file(&mut self, bytes: Vec<u8>) -> Result<SampleId> {
        let (id, commands) = self.samples.add_file(bytes);
        self.apply_samples(commands)?;
        Ok(id)
    }

    pub fn start_new_recording(&mut self) -> Result<SampleId> {
        let (id, commands) = self.samples.start_new_capture()?;
        self.apply_samples(commands)?;
        Ok(id)
    }

    pub fn start_recording(&mut self, id: SampleId) -> Result<()> {
        let commands = self.samples.start_capture(id)?;
        self.apply_samples(commands)
    }

    pub fn stop_recording(&mut self, id: SampleId) -> Result<()> {
        let commands = self.samples.stop_capture(id)?;
        self.apply_samples(commands)
    }

    pub fn retry_upload(&mut self, id: SampleId) -> Result<()> {
        let commands = self.samples.retry(id)?;
        self.apply_samples(commands)
    }

    pub fn delete_sample(&mut self, id: SampleId) -> Result<DeleteOutcome> {
        let (outcome, commands) = self.samples.delete(id)?;
        self.apply_samples(commands)?;
        Ok(outcome)
    }

    /// Preview a sample; stops utterance playback and any other preview
    pub fn play_sample(&mut self, id: SampleId) -> Result<()> {
        let commands = self.samples.play(id)?;
        self.apply_samples(commands)
    }

    pub fn stop_sample(&mut self, id: SampleId) -> Result<()> {
        let commands = self.samples.stop(id)?;
        self.apply_samples(commands)
    }

    // ---- event loop ----

    /// Wait up to `timeout` for one event and handle it
    ///
    /// Returns `None` when nothing arrived in time.
    pub fn pump(&mut self, timeout: Duration) -> Option<Vec<StudioUpdate>> {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => Some(self.handle_event(event)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("studio event queue disconnected");
                None
            }
        }
    }

    /// Handle every event already queued
    pub fn drain(&mut self) -> Vec<StudioUpdate> {
        let mut updates = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            updates.extend(self.handle_event(event));
        }
        updates
    }

    pub fn handle_event(&mut self, event: StudioEvent) -> Vec<StudioUpdate> {
        match event {
            StudioEvent::Tick { owner, time } => {
                if self.output_owner() != Some(owner) {
                    return Vec::new();
                }
                match owner {
                    OutputOwner::Utterance(session) => self
                        .playback
                        .on_tick(session, time)
                        .map(StudioUpdate::Highlight)
                        .into_iter()
                        .collect(),
                    OutputOwner::Sample { .. } => Vec::new(),
                }
            }
            StudioEvent::PlaybackEnded { owner } => {
                if self.output_owner() != Some(owner) {
                    return Vec::new();
                }
                self.output_holder = None;
                match owner {
                    OutputOwner::Utterance(session) => {
                        self.playback.on_ended(session);
                        vec![StudioUpdate::PlaybackFinished(session)]
                    }
                    OutputOwner::Sample { id, generation } => {
                        self.samples.preview_ended(id, generation);
                        vec![StudioUpdate::SampleChanged(id)]
                    }
                }
            }
            StudioEvent::UploadFinished {
                sample,
                request_id,
                result,
            } => {
                let commands = self.samples.upload_finished(sample, request_id, result);
                if let Err(e) = self.apply_samples(commands) {
                    warn!(sample = %sample, error = %e, "follow-up after upload failed");
                }
                vec![StudioUpdate::SampleChanged(sample)]
            }
            StudioEvent::PreviewLoaded {
                sample,
                generation,
                result,
            } => {
                if !self.samples.is_previewing(sample, generation) {
                    debug!(sample = %sample, generation, "dropping stale preview audio");
                    return Vec::new();
                }
                match result {
                    Ok(bytes) => {
                        self.acquire_output(OutputOwner::Sample { id: sample, generation }, bytes.into());
                    }
                    Err(e) => self.samples.preview_failed(sample, generation, e.message),
                }
                vec![StudioUpdate::SampleChanged(sample)]
            }
            StudioEvent::SpeechReady {
                request_id,
                text,
                provider,
                result,
            } => self.on_speech_ready(request_id, text, provider, result),
        }
    }

    fn on_speech_ready(
        &mut self,
        request_id: u64,
        text: String,
        provider: SpeechProvider,
        result: std::result::Result<GeneratedSpeech, SpeechError>,
    ) -> Vec<StudioUpdate> {
        if self.pending_speech != Some(request_id) {
            debug!(request_id, "ignoring superseded speech result");
            return Vec::new();
        }
        self.pending_speech = None;

        let speech = match result {
            Ok(speech) => speech,
            Err(e) => {
                warn!(request_id, error = %e, "speech generation failed");
                self.playback.record_error(e.message.clone());
                return vec![StudioUpdate::SpeechFailed(e.message)];
            }
        };

        let index = match provider.estimated_chars_per_second() {
            Some(rate) if speech.alignment.is_empty() => {
                debug!(request_id, rate, "estimating alignment for voice without timing");
                AlignmentIndex::estimate(&text, rate)
            }
            _ => AlignmentIndex::build_with_threshold(
                &speech.alignment,
                self.config.alignment.clamp_warn_threshold_secs,
            ),
        };

        let session = self.play_utterance(Utterance::new(text, speech.audio, index));
        vec![StudioUpdate::PlaybackStarted(session)]
    }

    // ---- command execution ----

    fn apply_playback(&mut self, commands: Vec<PlaybackCommand>) {
        for command in commands {
            match command {
                PlaybackCommand::Play { session, audio } => {
                    // A preview still downloading must not claim the channel later
                    if let Some((id, _)) = self.samples.playing() {
                        if let Ok(stops) = self.samples.stop(id) {
                            if let Err(e) = self.apply_samples(stops) {
                                warn!(sample = %id, error = %e, "failed to stop preview");
                            }
                        }
                    }
                    self.acquire_output(OutputOwner::Utterance(session), audio);
                }
                PlaybackCommand::Stop { session } => {
                    self.stop_output_if(OutputOwner::Utterance(session));
                }
                PlaybackCommand::Pause { session } => {
                    if self.output_owner() == Some(OutputOwner::Utterance(session)) {
                        self.output.pause();
                    }
                }
                PlaybackCommand::Resume { session } => {
                    if self.output_owner() == Some(OutputOwner::Utterance(session)) {
                        self.output.resume();
                    }
                }
            }
        }
    }

    fn apply_samples(&mut self, commands: Vec<SampleCommand>) -> Result<()> {
        let mut queue: VecDeque<SampleCommand> = commands.into();

        while let Some(command) = queue.pop_front() {
            match command {
                SampleCommand::DiscardCapture { id } => match self.capture.stop() {
                    Ok(bytes) => debug!(sample = %id, bytes = bytes.len(), "discarded revoked capture"),
                    Err(e) => warn!(sample = %id, error = %e, "failed to stop revoked capture"),
                },
                SampleCommand::StartCapture { id } => {
                    if let Err(e) = self.capture.start() {
                        return Err(self.samples.capture_failed(id, &e.to_string()));
                    }
                }
                SampleCommand::FinishCapture { id, request_id } => {
                    let follow_up = match self.capture.stop() {
                        Ok(bytes) => self.samples.attach_capture(id, request_id, bytes),
                        Err(e) => self.samples.upload_finished(
                            id,
                            request_id,
                            Err(StorageError::new(e.to_string())),
                        ),
                    };
                    queue.extend(follow_up);
                }
                SampleCommand::Upload {
                    id,
                    request_id,
                    audio,
                } => {
                    if let Err(e) = self.worker.upload(id, request_id, audio) {
                        let follow_up = self.samples.upload_finished(
                            id,
                            request_id,
                            Err(StorageError::new(e.to_string())),
                        );
                        queue.extend(follow_up);
                    }
                }
                SampleCommand::PlayPreview {
                    id,
                    generation,
                    blob,
                } => {
                    // Utterance playback loses the channel before the preview starts
                    self.release_output();
                    if let Err(e) = self.worker.download(id, generation, blob) {
                        self.samples.preview_failed(id, generation, e.to_string());
                    }
                }
                SampleCommand::StopPreview { id, generation } => {
                    self.stop_output_if(OutputOwner::Sample { id, generation });
                }
                SampleCommand::DeleteBlob { blob } => {
                    if let Err(e) = self.worker.delete_blob(blob) {
                        warn!(error = %e, "could not queue blob delete");
                    }
                }
            }
        }

        Ok(())
    }

    fn acquire_output(&mut self, owner: OutputOwner, audio: Arc<[u8]>) {
        self.release_output();

        let clock = PlaybackClock::new(
            owner,
            self.events_tx.clone(),
            self.config.playback.tick_interval_ms,
        );
        self.output_holder = Some((owner, clock.cancel_handle()));
        debug!(?owner, bytes = audio.len(), "output channel acquired");
        self.output.play(audio, clock);
    }

    /// Stop whoever holds the output channel and tell them they lost it
    fn release_output(&mut self) {
        let Some((owner, cancel)) = self.output_holder.take() else {
            return;
        };
        cancel.cancel();
        self.output.stop();
        debug!(?owner, "output channel released");

        match owner {
            OutputOwner::Utterance(session) => {
                self.playback.revoke(session);
            }
            OutputOwner::Sample { id, generation } => {
                self.samples.preview_revoked(id, generation);
            }
        }
    }

    /// Stop the output only if `owner` still holds it; state was already updated
    fn stop_output_if(&mut self, owner: OutputOwner) {
        if self.output_owner() != Some(owner) {
            return;
        }
        if let Some((_, cancel)) = self.output_holder.take() {
            cancel.cancel();
        }
        self.output.stop();
        debug!(?owner, "output channel stopped");
    }
}

impl Drop for Studio {
    fn drop(&mut self) {
        if let Some((_, cancel)) = self.output_holder.take() {
            cancel.cancel();
            self.output.stop();
        }
        if self.samples.capturing().is_some() {
            let _ = self.capture.stop();
        }
    }
}

