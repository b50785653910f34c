/// Per-character speech timing and "which character is audible at t" lookup
///
/// Speech services return one timing entry per source character. Their clocks
/// are noisy: entries occasionally overlap their predecessor or carry negative
/// or non-finite values. [`AlignmentIndex::build`] never rejects such input.
/// It clamps every entry's effective start to `max(previous_end, start)` and
/// records what it had to fix as [`AlignmentAnomaly`] values, so playback
/// always has a monotonic, gap-tolerant timeline to search.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::alignment::CLAMP_WARN_THRESHOLD_SECS;
use crate::error::{ComposerError, Result};

/// Shifts below this are float rounding, not service noise
const CLAMP_EPSILON_SECS: f64 = 1e-9;

/// Timing for one source character as reported by the speech service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentEntry {
    pub character: char,
    /// Seconds from the start of the audio
    pub start: f64,
    /// Seconds
    pub duration: f64,
}

impl AlignmentEntry {
    pub fn new(character: char, start: f64, duration: f64) -> Self {
        Self {
            character,
            start,
            duration,
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Character alignment payload in the parallel-array shape used by neural
/// speech APIs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CharacterAlignment {
    pub characters: Vec<String>,
    pub character_start_times_seconds: Vec<f64>,
    pub character_end_times_seconds: Vec<f64>,
}

impl CharacterAlignment {
    /// Convert to entries, truncating to the shortest array
    ///
    /// Multi-character strings contribute their first character; empty strings
    /// are skipped.
    pub fn to_entries(&self) -> (Vec<AlignmentEntry>, Option<AlignmentAnomaly>) {
        let len = self
            .characters
            .len()
            .min(self.character_start_times_seconds.len())
            .min(self.character_end_times_seconds.len());

        let longest = self
            .characters
            .len()
            .max(self.character_start_times_seconds.len())
            .max(self.character_end_times_seconds.len());

        let anomaly = (len < longest).then_some(AlignmentAnomaly::Truncated {
            kept: len,
            dropped: longest - len,
        });

        let entries = (0..len)
            .filter_map(|i| {
                let character = self.characters[i].chars().next()?;
                let start = self.character_start_times_seconds[i];
                let end = self.character_end_times_seconds[i];
                Some(AlignmentEntry::new(character, start, end - start))
            })
            .collect();

        (entries, anomaly)
    }
}

/// A timing problem corrected while building the index
#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentAnomaly {
    /// The entry started before its predecessor ended and was pushed back
    Overlap { position: usize, shift: f64 },
    /// Negative or non-finite start/duration replaced with zero
    InvalidTiming { position: usize },
    /// Payload arrays had different lengths
    Truncated { kept: usize, dropped: usize },
}

/// An entry with its clamped, monotonic timing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedChar {
    pub character: char,
    pub start: f64,
    pub end: f64,
}

impl TimedChar {
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }
}

/// Immutable timeline built from one utterance's alignment
#[derive(Debug, Clone, Default)]
pub struct AlignmentIndex {
    chars: Vec<TimedChar>,
    anomalies: Vec<AlignmentAnomaly>,
}

impl AlignmentIndex {
    /// Build with the default warning threshold
    pub fn build(entries: &[AlignmentEntry]) -> Self {
        Self::build_with_threshold(entries, CLAMP_WARN_THRESHOLD_SECS)
    }

    /// Build the index, clamping out-of-order timing
    ///
    /// Entries are taken in character-position order. Clamp shifts larger than
    /// `warn_threshold` are logged as warnings.
    pub fn build_with_threshold(entries: &[AlignmentEntry], warn_threshold: f64) -> Self {
        let mut chars = Vec::with_capacity(entries.len());
        let mut anomalies = Vec::new();
        let mut previous_end = 0.0_f64;

        for (position, entry) in entries.iter().enumerate() {
            let mut start = entry.start;
            let mut duration = entry.duration;

            if !start.is_finite() || start < 0.0 || !duration.is_finite() || duration < 0.0 {
                anomalies.push(AlignmentAnomaly::InvalidTiming { position });
                if !start.is_finite() || start < 0.0 {
                    start = 0.0;
                }
                if !duration.is_finite() || duration < 0.0 {
                    duration = 0.0;
                }
            }

            let effective_start = start.max(previous_end);
            let shift = effective_start - start;
            if shift > CLAMP_EPSILON_SECS {
                if shift > warn_threshold {
                    warn!(position, shift, "alignment entry overlaps predecessor, clamping");
                } else {
                    debug!(position, shift, "alignment entry clamped");
                }
                anomalies.push(AlignmentAnomaly::Overlap { position, shift });
            }

            let end = effective_start + duration;
            chars.push(TimedChar {
                character: entry.character,
                start: effective_start,
                end,
            });
            previous_end = end;
        }

        debug!(
            chars = chars.len(),
            anomalies = anomalies.len(),
            "alignment index built"
        );

        Self { chars, anomalies }
    }

    /// Build from a parallel-array payload, keeping any truncation anomaly
    pub fn from_payload(payload: &CharacterAlignment, warn_threshold: f64) -> Self {
        let (entries, truncated) = payload.to_entries();
        let mut index = Self::build_with_threshold(&entries, warn_threshold);
        if let Some(anomaly) = truncated {
            warn!(?anomaly, "alignment payload arrays differ in length");
            index.anomalies.insert(0, anomaly);
        }
        index
    }

    /// Synthesize uniform timing for voices that report no alignment
    pub fn estimate(text: &str, chars_per_second: f32) -> Self {
        let rate = if chars_per_second.is_finite() && chars_per_second > 0.0 {
            chars_per_second as f64
        } else {
            crate::constants::speech::BROWSER_CHARS_PER_SECOND as f64
        };
        let step = 1.0 / rate;
        let entries: Vec<AlignmentEntry> = text
            .chars()
            .enumerate()
            .map(|(i, c)| AlignmentEntry::new(c, i as f64 * step, step))
            .collect();
        Self::build(&entries)
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn entry(&self, index: usize) -> Option<&TimedChar> {
        self.chars.get(index)
    }

    pub fn chars(&self) -> &[TimedChar] {
        &self.chars
    }

    pub fn anomalies(&self) -> &[AlignmentAnomaly] {
        &self.anomalies
    }

    /// End of the last entry, in seconds
    pub fn total_duration(&self) -> f64 {
        self.chars.last().map_or(0.0, |c| c.end)
    }

    /// Strict validation for callers that want to reject noisy payloads
    pub fn check(&self) -> Result<()> {
        if self.chars.is_empty() {
            return Err(ComposerError::AlignmentMalformed {
                message: "alignment is empty".to_string(),
            });
        }
        match self.anomalies.first() {
            None => Ok(()),
            Some(first) => Err(ComposerError::AlignmentMalformed {
                message: format!("{} anomalies, first: {:?}", self.anomalies.len(), first),
            }),
        }
    }

    /// Index of the character audible at `t` seconds
    ///
    /// Returns the entry whose `[start, end)` contains `t`. Inside a gap
    /// between entries the preceding entry stays active; before the first
    /// entry the first one is returned and past the end the last one. Only an
    /// empty index returns `None`.
    pub fn active_index_at(&self, t: f64) -> Option<usize> {
        if self.chars.is_empty() {
            return None;
        }
        let t = if t.is_nan() { 0.0 } else { t };

        // Starts are non-decreasing, so this is the last entry starting at or
        // before t. Zero-length entries sharing a start resolve to the later,
        // non-empty one.
        let after = self.chars.partition_point(|c| c.start <= t);
        Some(after.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hi_there() -> Vec<AlignmentEntry> {
        "hi there"
            .chars()
            .enumerate()
            .map(|(i, c)| AlignmentEntry::new(c, i as f64 * 0.1, 0.1))
            .collect()
    }

    #[test]
    fn test_lookup_inside_entries() {
        let index = AlignmentIndex::build(&hi_there());
        assert_eq!(index.active_index_at(0.0), Some(0));
        assert_eq!(index.active_index_at(0.05), Some(0));
        assert_eq!(index.active_index_at(0.15), Some(1));
        assert_eq!(index.active_index_at(0.25), Some(2));
        assert_eq!(index.active_index_at(0.35), Some(3));
        assert!(index.anomalies().is_empty());
    }

    #[test]
    fn test_lookup_clamps_out_of_range() {
        let index = AlignmentIndex::build(&hi_there());
        assert_eq!(index.active_index_at(-1.0), Some(0));
        assert_eq!(index.active_index_at(42.0), Some(7));
        assert_eq!(index.active_index_at(f64::NAN), Some(0));
    }

    #[test]
    fn test_micro_gap_keeps_previous() {
        let entries = vec![
            AlignmentEntry::new('a', 0.0, 0.1),
            AlignmentEntry::new('b', 0.15, 0.1),
        ];
        let index = AlignmentIndex::build(&entries);
        assert_eq!(index.active_index_at(0.12), Some(0));
        assert_eq!(index.active_index_at(0.15), Some(1));
    }

    #[test]
    fn test_empty_index() {
        let index = AlignmentIndex::build(&[]);
        assert!(index.is_empty());
        assert_eq!(index.active_index_at(0.5), None);
        assert_eq!(index.total_duration(), 0.0);
        assert!(index.check().is_err());
    }

    #[test]
    fn test_overlap_is_clamped() {
        let entries = vec![
            AlignmentEntry::new('a', 0.0, 0.2),
            AlignmentEntry::new('b', 0.1, 0.2),
            AlignmentEntry::new('c', 0.4, 0.1),
        ];
        let index = AlignmentIndex::build(&entries);
        let b = index.entry(1).copied();
        assert_eq!(b.map(|c| c.start), Some(0.2));
        assert!(matches!(
            index.anomalies(),
            [AlignmentAnomaly::Overlap { position: 1, .. }]
        ));
        assert!(matches!(
            index.check(),
            Err(ComposerError::AlignmentMalformed { .. })
        ));
        for pair in index.chars().windows(2) {
            assert!(pair[0].end <= pair[1].start + 1e-12);
        }
    }

    #[test]
    fn test_invalid_timing_replaced() {
        let entries = vec![
            AlignmentEntry::new('a', -0.5, 0.1),
            AlignmentEntry::new('b', f64::NAN, -1.0),
        ];
        let index = AlignmentIndex::build(&entries);
        assert_eq!(index.entry(0).map(|c| c.start), Some(0.0));
        assert_eq!(index.entry(1).map(|c| (c.start, c.end)), Some((0.1, 0.1)));
        assert_eq!(index.active_index_at(0.1), Some(1));
    }

    #[test]
    fn test_zero_length_entry_prefers_following() {
        let entries = vec![
            AlignmentEntry::new('a', 0.0, 0.1),
            AlignmentEntry::new('\'', 0.1, 0.0),
            AlignmentEntry::new('s', 0.1, 0.1),
        ];
        let index = AlignmentIndex::build(&entries);
        assert_eq!(index.active_index_at(0.1), Some(2));
    }

    #[test]
    fn test_payload_truncation() {
        let payload = CharacterAlignment {
            characters: vec!["h".into(), "i".into(), "!".into()],
            character_start_times_seconds: vec![0.0, 0.1],
            character_end_times_seconds: vec![0.1, 0.2, 0.3],
        };
        let index = AlignmentIndex::from_payload(&payload, 0.05);
        assert_eq!(index.len(), 2);
        assert_eq!(
            index.anomalies().first(),
            Some(&AlignmentAnomaly::Truncated { kept: 2, dropped: 1 })
        );
    }

    #[test]
    fn test_payload_json() {
        let json = r#"{
            "characters": ["o", "k"],
            "character_start_times_seconds": [0.0, 0.2],
            "character_end_times_seconds": [0.2, 0.5]
        }"#;
        let payload: CharacterAlignment = serde_json::from_str(json).unwrap();
        let index = AlignmentIndex::from_payload(&payload, 0.05);
        assert_eq!(index.len(), 2);
        assert!((index.total_duration() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_uniform_timing() {
        let index = AlignmentIndex::estimate("abcd", 4.0);
        assert_eq!(index.len(), 4);
        assert!((index.total_duration() - 1.0).abs() < 1e-9);
        assert_eq!(index.active_index_at(0.6), Some(2));
    }
}
