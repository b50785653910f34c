/// Word tokenization for composition buffers
///
/// Text is split on whitespace runs. Punctuation stays glued to the word it
/// touches ("hello," is one token); punctuation with whitespace on both sides
/// ("a - b") becomes its own token. Offsets are UTF-8 byte offsets into the
/// source text so tokens can be sliced back out without copying.

use std::ops::Range;

/// Whether a token carries any letters or digits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    Punctuation,
}

/// A word borrowed from its parent text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    /// Byte range of `text` inside the parent string
    pub range: Range<usize>,
    pub kind: TokenKind,
}

impl<'a> Token<'a> {
    fn new(source: &'a str, range: Range<usize>) -> Self {
        let text = &source[range.clone()];
        let kind = if text.chars().any(char::is_alphanumeric) {
            TokenKind::Word
        } else {
            TokenKind::Punctuation
        };
        Token { text, range, kind }
    }

    /// True when the token closes a sentence (`.`, `!` or `?`)
    pub fn ends_sentence(&self) -> bool {
        matches!(self.text.chars().last(), Some('.' | '!' | '?'))
    }
}

/// Split `text` into ordered tokens.
///
/// Empty or whitespace-only input yields an empty vector.
///
/// # Examples
///
/// ```
/// use voice_composer::tokenizer::tokenize;
///
/// let tokens = tokenize("Hello,  world - again");
/// let words: Vec<&str> = tokens.iter().map(|t| t.text).collect();
/// assert_eq!(words, ["Hello,", "world", "-", "again"]);
/// assert_eq!(tokens[1].range, 8..13);
/// ```
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    token_ranges(text)
        .into_iter()
        .map(|range| Token::new(text, range))
        .collect()
}

/// Byte ranges of every token, without borrowing the text
pub fn token_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start: Option<usize> = None;

    for (offset, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                ranges.push(s..offset);
            }
        } else if start.is_none() {
            start = Some(offset);
        }
    }

    if let Some(s) = start {
        ranges.push(s..text.len());
    }

    ranges
}

/// The token being typed: the final token, unless the text ends in whitespace
pub fn last_token(text: &str) -> Option<Token<'_>> {
    if text.chars().last().map_or(true, char::is_whitespace) {
        return None;
    }
    token_ranges(text)
        .pop()
        .map(|range| Token::new(text, range))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(s: &str) -> Vec<&str> {
        tokenize(s).into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \t\n ").is_empty());
    }

    #[test]
    fn test_whitespace_runs_collapse() {
        assert_eq!(texts("  I   see\ta\n cat "), ["I", "see", "a", "cat"]);
    }

    #[test]
    fn test_punctuation_stays_attached() {
        assert_eq!(texts("Hello, world! (yes)"), ["Hello,", "world!", "(yes)"]);
    }

    #[test]
    fn test_isolated_punctuation_is_own_token() {
        let tokens = tokenize("wait - what ?");
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[1].text, "-");
        assert_eq!(tokens[1].kind, TokenKind::Punctuation);
        assert_eq!(tokens[3].kind, TokenKind::Punctuation);
        assert_eq!(tokens[0].kind, TokenKind::Word);
    }

    #[test]
    fn test_offsets_slice_back_to_text() {
        let text = "café  au lait";
        for token in tokenize(text) {
            assert_eq!(&text[token.range.clone()], token.text);
        }
        assert_eq!(tokenize(text)[1].range, 7..9);
    }

    #[test]
    fn test_rejoin_reproduces_tokens() {
        for s in ["", "a", " lead", "trail ", "a  b   c", "x , y", "¿qué?  sí."] {
            let original = texts(s);
            let joined = original.join(" ");
            assert_eq!(texts(&joined), original, "input {:?}", s);
        }
    }

    #[test]
    fn test_last_token() {
        assert_eq!(last_token("I see a ca").map(|t| t.text), Some("ca"));
        assert!(last_token("I see ").is_none());
        assert!(last_token("").is_none());
    }

    #[test]
    fn test_ends_sentence() {
        let tokens = tokenize("Done. ok? yes! no");
        assert!(tokens[0].ends_sentence());
        assert!(tokens[1].ends_sentence());
        assert!(tokens[2].ends_sentence());
        assert!(!tokens[3].ends_sentence());
    }
}
