/// Edit descriptions for composition buffer updates
///
/// Hosts that mirror the buffer on screen (or in a platform text field) can
/// apply a [`BufferEdit`] instead of redrawing the whole text. The edit is the
/// longest-common-prefix diff between the old and new buffer, so autocomplete
/// corrections only touch the tail of the text.

/// Minimal change turning one buffer value into the next
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BufferEdit {
    /// Number of bytes in the common prefix (UTF-8 byte offset)
    pub common_prefix_bytes: usize,

    /// Characters to remove from the end of the old text
    pub chars_to_delete: usize,

    /// Text to append after the deletion
    pub inserted: String,
}

impl BufferEdit {
    pub fn is_noop(&self) -> bool {
        self.chars_to_delete == 0 && self.inserted.is_empty()
    }

    /// Replay this edit onto a mirror of the old text
    pub fn apply(&self, mirror: &mut String) {
        if self.chars_to_delete > 0 {
            let keep = mirror.chars().count().saturating_sub(self.chars_to_delete);
            let cut = mirror
                .char_indices()
                .nth(keep)
                .map_or(mirror.len(), |(offset, _)| offset);
            mirror.truncate(cut);
        }
        mirror.push_str(&self.inserted);
    }
}

/// Compute the edit that transforms `old_text` into `new_text`
///
/// # Examples
///
/// ```
/// use voice_composer::text_diff::compute_text_diff;
///
/// let edit = compute_text_diff("I see a ca", "I see a cat");
/// assert_eq!(edit.common_prefix_bytes, 10);
/// assert_eq!(edit.chars_to_delete, 0);
/// assert_eq!(edit.inserted, "t");
/// ```
///
/// Multi-byte characters are compared whole, so the prefix never ends in the
/// middle of a UTF-8 sequence.
pub fn compute_text_diff(old_text: &str, new_text: &str) -> BufferEdit {
    let mut common_prefix_bytes = 0;

    for (c1, c2) in old_text.chars().zip(new_text.chars()) {
        if c1 == c2 {
            common_prefix_bytes += c1.len_utf8();
        } else {
            break;
        }
    }

    BufferEdit {
        common_prefix_bytes,
        chars_to_delete: old_text[common_prefix_bytes..].chars().count(),
        inserted: new_text[common_prefix_bytes..].to_string(),
    }
}
