//! Sentence-boundary adjustment.
//!
//! Model-proposed boundaries are nudged so that every cut (except the text
//! end) lies just past sentence-ending punctuation. A boundary already
//! separated from a terminator only by trailing space/quote/paren characters
//! is kept as proposed; otherwise the cut moves back to just past the
//! nearest terminator on the left. With no terminator to the left, the
//! proposal stands.

pub fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Characters that may trail sentence punctuation without breaking the
/// "lands at a sentence end" rule.
fn is_trailing(c: char) -> bool {
    matches!(
        c,
        ' ' | '\t' | '\n' | '\r' | '"' | '\'' | '\u{201d}' | '\u{2019}' | ')' | ']'
    )
}

/// Adjust one boundary. `byte_pos` must lie on a char boundary strictly
/// inside `text`; the result does too.
pub fn adjust_to_sentence_end(text: &str, byte_pos: usize) -> usize {
    // Walk back over trailing characters to the first "real" char end.
    let mut q = byte_pos;
    for (i, c) in text[..byte_pos].char_indices().rev() {
        if is_trailing(c) {
            q = i;
        } else {
            break;
        }
    }

    // Already just past a sentence end: keep the proposed position.
    if text[..q].chars().next_back().is_some_and(is_terminator) {
        return byte_pos;
    }

    // Move back to just past the nearest terminator, then forward over its
    // trailing characters.
    if let Some((i, c)) = text[..q].char_indices().rev().find(|(_, c)| is_terminator(*c)) {
        let mut b = i + c.len_utf8();
        for (j, c2) in text[b..].char_indices() {
            if is_trailing(c2) {
                continue;
            }
            b += j;
            return b;
        }
        return text.len();
    }

    // No sentence-ending punctuation to the left.
    byte_pos
}
