/// Grouping of timed characters into word and gap segments
///
/// Segments tile the whole character range of an utterance: every character
/// belongs to exactly one segment, runs of whitespace form gap segments and
/// everything else forms word segments. The list is computed once per
/// utterance and never changes afterwards, so iterating it again is just
/// re-indexing.

use std::ops::Range;

use crate::alignment::AlignmentIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Word,
    Gap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WordSegment {
    pub kind: SegmentKind,
    /// Word text; `None` for gaps
    pub text: Option<String>,
    pub start_time: f64,
    pub end_time: f64,
    /// Character positions (not bytes) covered by this segment
    pub char_range: Range<usize>,
}

impl WordSegment {
    pub fn is_word(&self) -> bool {
        self.kind == SegmentKind::Word
    }
}

/// Immutable, ordered segment list with a character-to-segment lookup
#[derive(Debug, Clone, Default)]
pub struct WordSegments {
    segments: Vec<WordSegment>,
    /// `owner[i]` is the segment containing character `i`
    owner: Vec<usize>,
}

impl WordSegments {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&WordSegment> {
        self.segments.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WordSegment> {
        self.segments.iter()
    }

    pub fn words(&self) -> impl Iterator<Item = &WordSegment> {
        self.segments.iter().filter(|s| s.is_word())
    }

    /// Segment that owns the character at `char_index`
    pub fn segment_for_char(&self, char_index: usize) -> Option<usize> {
        self.owner.get(char_index).copied()
    }

    /// Segment audible at `t` seconds on `index`'s timeline
    pub fn segment_at_time(&self, index: &AlignmentIndex, t: f64) -> Option<usize> {
        index
            .active_index_at(t)
            .and_then(|c| self.segment_for_char(c))
    }
}

impl<'a> IntoIterator for &'a WordSegments {
    type Item = &'a WordSegment;
    type IntoIter = std::slice::Iter<'a, WordSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

/// Segment an alignment index in a single pass
pub fn segment(index: &AlignmentIndex) -> WordSegments {
    let mut segments: Vec<WordSegment> = Vec::new();
    let mut owner = Vec::with_capacity(index.len());

    for (position, timed) in index.chars().iter().enumerate() {
        let kind = if timed.character.is_whitespace() {
            SegmentKind::Gap
        } else {
            SegmentKind::Word
        };

        match segments.last_mut() {
            Some(current) if current.kind == kind => {
                current.char_range.end = position + 1;
                current.start_time = current.start_time.min(timed.start);
                current.end_time = current.end_time.max(timed.end);
                if let Some(text) = current.text.as_mut() {
                    text.push(timed.character);
                }
            }
            _ => segments.push(WordSegment {
                kind,
                text: (kind == SegmentKind::Word).then(|| timed.character.to_string()),
                start_time: timed.start,
                end_time: timed.end,
                char_range: position..position + 1,
            }),
        }

        owner.push(segments.len() - 1);
    }

    WordSegments { segments, owner }
}
