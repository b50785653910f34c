/// Composition buffer driven by word prediction and phrase insertion
///
/// The assembler owns the in-progress text and a cached token list. All
/// mutations go through [`TextAssembler::commit`], which refreshes the cache
/// and reports the change as a [`BufferEdit`]. Malformed spacing is never an
/// error: each operation normalizes the boundary it touches to exactly one
/// space.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::text_diff::{compute_text_diff, BufferEdit};
use crate::tokenizer::{last_token, token_ranges, tokenize, Token};

/// Case handling applied to words entering the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseMode {
    /// Words are inserted exactly as given
    #[default]
    Verbatim,
    /// Words are lowercased unless they start the buffer or follow a
    /// sentence-ending token
    SentenceCase,
}

#[derive(Debug, Clone, Default)]
pub struct TextAssembler {
    text: String,
    /// Always equal to `token_ranges(&text)`
    tokens: Vec<Range<usize>>,
    mode: CaseMode,
}

impl TextAssembler {
    pub fn new(mode: CaseMode) -> Self {
        Self {
            text: String::new(),
            tokens: Vec::new(),
            mode,
        }
    }

    pub fn mode(&self) -> CaseMode {
        self.mode
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn tokens(&self) -> Vec<Token<'_>> {
        tokenize(&self.text)
    }

    /// Text of the token at `index`, served from the cache
    pub fn token_text(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(|r| &self.text[r.clone()])
    }

    /// Append `word` as a new token, separated by exactly one space
    pub fn add_word(&mut self, word: &str) -> BufferEdit {
        let word = collapse_whitespace(word);
        if word.is_empty() {
            return BufferEdit::default();
        }

        let base = self.text.trim_end();
        let cased = self.apply_case(&word, base);
        let next = join_with_space(base, &cased);
        self.commit(next)
    }

    /// Replace the in-progress word (autocomplete correction)
    ///
    /// When nothing is being typed (empty buffer, or trailing whitespace) this
    /// behaves like [`add_word`](Self::add_word).
    pub fn set_current_word(&mut self, word: &str) -> BufferEdit {
        let word = collapse_whitespace(word);
        if word.is_empty() {
            return BufferEdit::default();
        }

        let Some(current) = last_token(&self.text).map(|t| t.range) else {
            return self.add_word(&word);
        };

        let prefix = self.text[..current.start].trim_end();
        let cased = self.apply_case(&word, prefix);
        let next = join_with_space(prefix, &cased);
        self.commit(next)
    }

    /// Insert a multi-word phrase followed by one trailing space
    ///
    /// Whitespace runs inside the phrase collapse to single spaces.
    pub fn append_text(&mut self, phrase: &str) -> BufferEdit {
        let collapsed = collapse_whitespace(phrase);
        if collapsed.is_empty() {
            return BufferEdit::default();
        }

        let mut next = join_with_space(self.text.trim_end(), &collapsed);
        next.push(' ');
        self.commit(next)
    }

    pub fn reset(&mut self) -> BufferEdit {
        self.commit(String::new())
    }

    fn apply_case(&self, word: &str, preceding: &str) -> String {
        match self.mode {
            CaseMode::Verbatim => word.to_string(),
            CaseMode::SentenceCase => {
                let starts_sentence = tokenize(preceding)
                    .last()
                    .map_or(true, |prev| prev.ends_sentence());
                if starts_sentence {
                    word.to_string()
                } else {
                    word.to_lowercase()
                }
            }
        }
    }

    fn commit(&mut self, next: String) -> BufferEdit {
        let edit = compute_text_diff(&self.text, &next);
        self.text = next;
        self.tokens = token_ranges(&self.text);
        debug!(
            tokens = self.tokens.len(),
            deleted = edit.chars_to_delete,
            inserted = edit.inserted.as_str(),
            "composition buffer updated"
        );
        edit
    }
}

/// Trim and reduce every whitespace run to one space
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn join_with_space(base: &str, addition: &str) -> String {
    if base.is_empty() {
        addition.to_string()
    } else {
        format!("{} {}", base, addition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_cache_consistent(assembler: &TextAssembler) {
        let fresh: Vec<&str> = tokenize(assembler.text()).iter().map(|t| t.text).collect();
        let cached: Vec<&str> = (0..assembler.word_count())
            .filter_map(|i| assembler.token_text(i))
            .collect();
        assert_eq!(fresh, cached);
    }

    #[test]
    fn test_add_word_spacing() {
        let mut assembler = TextAssembler::default();
        for word in ["I", "want", "water"] {
            assembler.add_word(word);
        }
        assert_eq!(assembler.text(), "I want water");
        assert_eq!(assembler.word_count(), 3);
        assert_cache_consistent(&assembler);
    }

    #[test]
    fn test_add_word_after_trailing_space() {
        let mut assembler = TextAssembler::default();
        assembler.append_text("good morning");
        assert_eq!(assembler.text(), "good morning ");
        assembler.add_word("Sam");
        assert_eq!(assembler.text(), "good morning Sam");
    }

    #[test]
    fn test_add_empty_word_is_noop() {
        let mut assembler = TextAssembler::default();
        assembler.add_word("hi");
        let edit = assembler.add_word("   ");
        assert!(edit.is_noop());
        assert_eq!(assembler.text(), "hi");
    }

    #[test]
    fn test_set_current_word_replaces_last_token() {
        let mut assembler = TextAssembler::default();
        for word in ["I", "see", "a", "ca"] {
            assembler.add_word(word);
        }
        let edit = assembler.set_current_word("cat");
        assert_eq!(assembler.text(), "I see a cat");
        assert_eq!(edit.chars_to_delete, 0);
        assert_eq!(edit.inserted, "t");
        assert_cache_consistent(&assembler);
    }

    #[test]
    fn test_set_current_word_on_empty_buffer_adds() {
        let mut assembler = TextAssembler::default();
        assembler.set_current_word("Hello");
        assert_eq!(assembler.text(), "Hello");
    }

    #[test]
    fn test_set_current_word_after_phrase_appends() {
        let mut assembler = TextAssembler::default();
        assembler.append_text("I would like");
        assembler.set_current_word("tea");
        assert_eq!(assembler.text(), "I would like tea");
    }

    #[test]
    fn test_append_text_normalizes_spacing() {
        let mut assembler = TextAssembler::default();
        assembler.add_word("Hello");
        assembler.append_text("  how   are\tyou ");
        assert_eq!(assembler.text(), "Hello how are you ");
        assert_eq!(assembler.word_count(), 4);
        assembler.append_text("   ");
        assert_eq!(assembler.text(), "Hello how are you ");
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut assembler = TextAssembler::default();
        assembler.add_word("bye");
        let edit = assembler.reset();
        assert!(assembler.is_empty());
        assert_eq!(assembler.word_count(), 0);
        assert_eq!(edit.chars_to_delete, 3);
    }

    #[test]
    fn test_sentence_case_mode() {
        let mut assembler = TextAssembler::new(CaseMode::SentenceCase);
        for word in ["Hello", "There.", "How", "ARE", "You"] {
            assembler.add_word(word);
        }
        assert_eq!(assembler.text(), "Hello there. How are you");
    }

    #[test]
    fn test_sentence_case_on_correction() {
        let mut assembler = TextAssembler::new(CaseMode::SentenceCase);
        assembler.add_word("Done.");
        assembler.add_word("Th");
        assembler.set_current_word("That");
        assert_eq!(assembler.text(), "Done. That");
        assembler.add_word("Works");
        assert_eq!(assembler.text(), "Done. That works");
    }

    #[test]
    fn test_verbatim_keeps_case() {
        let mut assembler = TextAssembler::new(CaseMode::Verbatim);
        assembler.add_word("NASA");
        assembler.add_word("Rocks");
        assert_eq!(assembler.text(), "NASA Rocks");
    }

    #[test]
    fn test_words_with_inner_whitespace_are_collapsed() {
        let mut assembler = TextAssembler::default();
        assembler.add_word("I");
        assembler.add_word("ice  cream");
        assert_eq!(assembler.text(), "I ice cream");

        assembler.set_current_word("hot\t dog");
        assert_eq!(assembler.text(), "I ice hot dog");
        assert!(!assembler.text().contains("  "));
        assert!(!assembler.text().contains('\t'));
        assert_eq!(assembler.word_count(), 4);
        assert_cache_consistent(&assembler);
    }
}
