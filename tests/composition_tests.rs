// Test that the edits reported by the assembler reproduce the buffer on a
// mirrored display, the way a host text field would apply them

use voice_composer::text_assembler::{CaseMode, TextAssembler};
use voice_composer::text_diff::BufferEdit;
use voice_composer::tokenizer::tokenize;

#[derive(Debug, Default)]
struct Screen {
    text: String,
    edits: Vec<BufferEdit>,
}

impl Screen {
    /// Delete from the end char by char, then type the insertion
    fn replay(&mut self, edit: BufferEdit) {
        for _ in 0..edit.chars_to_delete {
            self.text.pop();
        }
        self.text.push_str(&edit.inserted);
        self.edits.push(edit);
    }

    fn total_deleted(&self) -> usize {
        self.edits.iter().map(|e| e.chars_to_delete).sum()
    }
}

fn assert_spacing(text: &str) {
    assert!(!text.starts_with(' '), "leading space in {:?}", text);
    assert!(!text.contains("  "), "double space in {:?}", text);
}

#[test]
fn test_word_by_word_sentence() {
    let mut assembler = TextAssembler::default();
    let mut screen = Screen::default();

    for word in ["I", "would", "like", "some", "tea"] {
        screen.replay(assembler.add_word(word));
    }

    assert_eq!(screen.text, "I would like some tea");
    assert_eq!(screen.text, assembler.text());
    assert_eq!(screen.total_deleted(), 0);
    assert_eq!(assembler.word_count(), 5);
}

#[test]
fn test_autocomplete_correction_only_touches_tail() {
    let mut assembler = TextAssembler::default();
    let mut screen = Screen::default();

    screen.replay(assembler.append_text("I see a"));
    screen.replay(assembler.add_word("ca"));
    assert_eq!(screen.text, "I see a ca");

    let edit = assembler.set_current_word("cat");
    assert_eq!(edit.chars_to_delete, 0);
    assert_eq!(edit.inserted, "t");
    screen.replay(edit);

    assert_eq!(screen.text, "I see a cat");
    assert_eq!(assembler.word_count(), 4);
}

#[test]
fn test_correction_replaces_whole_word() {
    let mut assembler = TextAssembler::default();
    let mut screen = Screen::default();

    screen.replay(assembler.add_word("hello"));
    screen.replay(assembler.add_word("wrold"));
    screen.replay(assembler.set_current_word("world"));

    assert_eq!(screen.text, "hello world");
    assert_eq!(screen.total_deleted(), 4);
}

#[test]
fn test_correction_after_phrase_appends() {
    let mut assembler = TextAssembler::default();
    let mut screen = Screen::default();

    screen.replay(assembler.append_text("thank you"));
    screen.replay(assembler.set_current_word("so"));
    screen.replay(assembler.add_word("much"));

    assert_eq!(screen.text, "thank you so much");
}

#[test]
fn test_mixed_operations_keep_spacing_and_tokens() {
    let mut assembler = TextAssembler::default();
    let mut screen = Screen::default();

    screen.replay(assembler.add_word("  Can "));
    screen.replay(assembler.append_text("you   help\tme"));
    screen.replay(assembler.add_word("please"));
    screen.replay(assembler.set_current_word("please?"));
    screen.replay(assembler.append_text("   "));

    assert_eq!(screen.text, "Can you help me please?");
    assert_spacing(&screen.text);

    let words: Vec<&str> = tokenize(assembler.text()).iter().map(|t| t.text).collect();
    assert_eq!(words, vec!["Can", "you", "help", "me", "please?"]);
    assert_eq!(assembler.word_count(), words.len());
}

#[test]
fn test_sentence_case_across_sentences() {
    let mut assembler = TextAssembler::new(CaseMode::SentenceCase);
    let mut screen = Screen::default();

    for word in ["Hello", "There.", "How", "Are", "You?"] {
        screen.replay(assembler.add_word(word));
    }

    assert_eq!(screen.text, "Hello there. How are you?");
}

#[test]
fn test_verbatim_keeps_case() {
    let mut assembler = TextAssembler::new(CaseMode::Verbatim);
    for word in ["Call", "Mom", "Now"] {
        assembler.add_word(word);
    }
    assert_eq!(assembler.text(), "Call Mom Now");
}

#[test]
fn test_reset_clears_screen() {
    let mut assembler = TextAssembler::default();
    let mut screen = Screen::default();

    screen.replay(assembler.append_text("see you later"));
    screen.replay(assembler.reset());

    assert_eq!(screen.text, "");
    assert!(assembler.is_empty());
    assert_eq!(assembler.word_count(), 0);
}

#[test]
fn test_multibyte_words_replay() {
    let mut assembler = TextAssembler::default();
    let mut screen = Screen::default();

    screen.replay(assembler.add_word("café"));
    screen.replay(assembler.add_word("naïv"));
    screen.replay(assembler.set_current_word("naïve"));
    screen.replay(assembler.set_current_word("crème"));

    assert_eq!(screen.text, "café crème");
    assert_eq!(screen.text, assembler.text());
}
