/// Alignment-driven word highlighting for utterance playback
///
/// [`PlaybackSync`] owns at most one playback session. The output channel's
/// clock drives it through [`PlaybackSync::on_tick`]; each tick maps the
/// playback position to the audible character, then to the word or gap
/// segment that owns it, and reports a [`HighlightChange`] only when that
/// segment differs from the previous tick.
///
/// Like the other state machines in this crate it performs no I/O: operations
/// return [`PlaybackCommand`]s for the caller to carry out on the output
/// channel.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::alignment::AlignmentIndex;
use crate::segmenter::{segment, WordSegment, WordSegments};

pub type SessionId = u64;

/// One generated utterance ready for playback
#[derive(Debug, Clone)]
pub struct Utterance {
    pub text: String,
    pub audio: Arc<[u8]>,
    pub index: Arc<AlignmentIndex>,
    pub segments: Arc<WordSegments>,
}

impl Utterance {
    pub fn new(text: impl Into<String>, audio: impl Into<Arc<[u8]>>, index: AlignmentIndex) -> Self {
        let segments = segment(&index);
        Self {
            text: text.into(),
            audio: audio.into(),
            index: Arc::new(index),
            segments: Arc::new(segments),
        }
    }
}

/// Snapshot published to subscribers
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackState {
    pub session: Option<SessionId>,
    pub current_time: f64,
    pub active_segment_index: Option<usize>,
    pub is_playing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HighlightChange {
    pub session: SessionId,
    pub segment_index: Option<usize>,
    pub segment: Option<WordSegment>,
}

/// Output channel operations requested by the sync
#[derive(Debug, Clone)]
pub enum PlaybackCommand {
    Play { session: SessionId, audio: Arc<[u8]> },
    Pause { session: SessionId },
    Resume { session: SessionId },
    Stop { session: SessionId },
}

struct ActiveSession {
    id: SessionId,
    utterance: Utterance,
}

pub struct PlaybackSync {
    session: Option<ActiveSession>,
    next_session_id: SessionId,
    state: PlaybackState,
    /// Repeated toggles inside this window count as one
    toggle_window: Duration,
    last_toggle: Option<Instant>,
    subscribers: Vec<Sender<PlaybackState>>,
    last_error: Option<String>,
}

impl PlaybackSync {
    pub fn new(toggle_window: Duration) -> Self {
        Self {
            session: None,
            next_session_id: 1,
            state: PlaybackState::default(),
            toggle_window,
            last_toggle: None,
            subscribers: Vec::new(),
            last_error: None,
        }
    }

    /// Stream of state snapshots, one per visible change
    pub fn subscribe(&mut self) -> Receiver<PlaybackState> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn utterance(&self) -> Option<&Utterance> {
        self.session.as_ref().map(|s| &s.utterance)
    }

    pub fn active_segment(&self) -> Option<&WordSegment> {
        let session = self.session.as_ref()?;
        session.utterance.segments.get(self.state.active_segment_index?)
    }

    /// Most recent speech generation failure, cleared by the next session
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn record_error(&mut self, message: String) {
        self.last_error = Some(message);
    }

    /// Replace any current session with a new one and start it
    pub fn start_session(&mut self, utterance: Utterance) -> (SessionId, Vec<PlaybackCommand>) {
        let mut commands = Vec::new();

        if let Some(previous) = self.session.take() {
            debug!(session = previous.id, "cancelling previous playback session");
            commands.push(PlaybackCommand::Stop {
                session: previous.id,
            });
        }

        let id = self.next_session_id;
        self.next_session_id = self.next_session_id.wrapping_add(1);

        info!(
            session = id,
            chars = utterance.index.len(),
            segments = utterance.segments.len(),
            "starting playback session"
        );

        commands.push(PlaybackCommand::Play {
            session: id,
            audio: Arc::clone(&utterance.audio),
        });

        self.session = Some(ActiveSession { id, utterance });
        self.state = PlaybackState {
            session: Some(id),
            current_time: 0.0,
            active_segment_index: None,
            is_playing: true,
        };
        self.last_toggle = None;
        self.last_error = None;
        self.publish();

        (id, commands)
    }

    /// Advance to `time` seconds; returns a change only when the highlighted
    /// segment moves
    pub fn on_tick(&mut self, session: SessionId, time: f64) -> Option<HighlightChange> {
        let active = self.session.as_ref()?;
        if active.id != session {
            debug!(session, active = active.id, "ignoring tick from stale session");
            return None;
        }
        if !self.state.is_playing {
            return None;
        }

        let time = if time.is_finite() { time.max(0.0) } else { 0.0 };
        self.state.current_time = time;

        let utterance = &active.utterance;
        let segment_index = utterance.segments.segment_at_time(&utterance.index, time);
        if segment_index == self.state.active_segment_index {
            return None;
        }

        let change = HighlightChange {
            session,
            segment_index,
            segment: segment_index.and_then(|i| utterance.segments.get(i).cloned()),
        };
        debug!(session, time, ?segment_index, "highlight moved");

        self.state.active_segment_index = segment_index;
        self.publish();
        Some(change)
    }

    /// Pause or resume the current session
    ///
    /// A second call within the toggle window of the first is ignored, so a
    /// double press inside one tick does not cancel itself out.
    pub fn toggle_play_pause(&mut self, now: Instant) -> Vec<PlaybackCommand> {
        let Some(session) = self.active_session() else {
            return Vec::new();
        };

        if let Some(last) = self.last_toggle {
            if now.saturating_duration_since(last) < self.toggle_window {
                debug!(session, "ignoring repeated toggle within one tick");
                return Vec::new();
            }
        }
        self.last_toggle = Some(now);

        let command = if self.state.is_playing {
            self.state.is_playing = false;
            PlaybackCommand::Pause { session }
        } else {
            self.state.is_playing = true;
            PlaybackCommand::Resume { session }
        };
        self.publish();
        vec![command]
    }

    /// Stop the current session, e.g. because a sample preview needs the
    /// output channel
    pub fn halt(&mut self) -> Vec<PlaybackCommand> {
        match self.session.take() {
            Some(previous) => {
                info!(session = previous.id, "halting playback");
                self.clear_state();
                vec![PlaybackCommand::Stop {
                    session: previous.id,
                }]
            }
            None => Vec::new(),
        }
    }

    /// The output channel was taken over by someone else
    pub fn revoke(&mut self, session: SessionId) -> bool {
        if self.active_session() != Some(session) {
            return false;
        }
        self.session = None;
        self.clear_state();
        true
    }

    pub fn on_ended(&mut self, session: SessionId) {
        if self.active_session() != Some(session) {
            return;
        }
        info!(session, "playback finished");
        self.session = None;
        self.clear_state();
    }

    fn clear_state(&mut self) {
        self.state.session = None;
        self.state.active_segment_index = None;
        self.state.is_playing = false;
        self.last_toggle = None;
        self.publish();
    }

    fn publish(&mut self) {
        let snapshot = self.state.clone();
        self.subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
    }
}
