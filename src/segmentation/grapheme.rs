//! Grapheme-to-byte offset table.
//!
//! The segmentation model counts user-perceived characters: one ZWJ-joined
//! emoji sequence is one character. Its boundary integers are therefore
//! grapheme indices, and every translation to a byte offset for slicing goes
//! through this table. Raw byte offsets never cross a provider boundary
//! unlabeled.

use unicode_segmentation::UnicodeSegmentation;

/// Byte offset of every extended grapheme cluster in a text, plus the text
/// length as the exclusive end position.
#[derive(Debug, Clone)]
pub struct GraphemeTable {
    offsets: Vec<usize>,
    text_len: usize,
}

impl GraphemeTable {
    pub fn new(text: &str) -> Self {
        Self {
            offsets: text.grapheme_indices(true).map(|(i, _)| i).collect(),
            text_len: text.len(),
        }
    }

    pub fn grapheme_count(&self) -> usize {
        self.offsets.len()
    }

    /// Byte offset of the exclusive boundary `g`, valid for
    /// `0 ..= grapheme_count()`; `grapheme_count()` maps to the text length.
    pub fn byte_of(&self, g: usize) -> Option<usize> {
        match g.cmp(&self.offsets.len()) {
            std::cmp::Ordering::Less => Some(self.offsets[g]),
            std::cmp::Ordering::Equal => Some(self.text_len),
            std::cmp::Ordering::Greater => None,
        }
    }

    /// Grapheme boundary index for a byte offset, rounding down to the start
    /// of the cluster containing it.
    pub fn grapheme_of(&self, byte: usize) -> usize {
        if byte >= self.text_len {
            return self.offsets.len();
        }
        self.offsets.partition_point(|&o| o <= byte) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_identity() {
        let table = GraphemeTable::new("abc");
        assert_eq!(table.grapheme_count(), 3);
        assert_eq!(table.byte_of(0), Some(0));
        assert_eq!(table.byte_of(2), Some(2));
        assert_eq!(table.byte_of(3), Some(3));
        assert_eq!(table.byte_of(4), None);
        assert_eq!(table.grapheme_of(1), 1);
    }

    #[test]
    fn zwj_emoji_is_one_grapheme() {
        // 🙋‍♂️ = U+1F64B U+200D U+2642 U+FE0F, 13 bytes, one cluster.
        let text = "Hello 🙋‍♂️! Bye.";
        let table = GraphemeTable::new(text);
        assert_eq!(table.grapheme_count(), 13);
        // graphemes 0..6 are "Hello ", grapheme 6 is the emoji.
        assert_eq!(table.byte_of(6), Some(6));
        assert_eq!(table.byte_of(7), Some(19)); // the '!'
        assert_eq!(table.byte_of(8), Some(20)); // just past the '!'
        assert_eq!(table.byte_of(13), Some(text.len()));
    }

    #[test]
    fn four_byte_scalar() {
        let text = "a𝄞b"; // U+1D11E is 4 bytes
        let table = GraphemeTable::new(text);
        assert_eq!(table.grapheme_count(), 3);
        assert_eq!(table.byte_of(1), Some(1));
        assert_eq!(table.byte_of(2), Some(5));
        assert_eq!(table.grapheme_of(5), 2);
        // inside the 4-byte scalar rounds down to its cluster start
        assert_eq!(table.grapheme_of(3), 1);
    }

    #[test]
    fn empty_text() {
        let table = GraphemeTable::new("");
        assert_eq!(table.grapheme_count(), 0);
        assert_eq!(table.byte_of(0), Some(0));
        assert_eq!(table.grapheme_of(0), 0);
    }
}
