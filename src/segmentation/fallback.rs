//! Rule-based segmentation fallback.
//!
//! Used only when both segmentation models fail. Texts with newlines split
//! at line breaks, merging short lines, list items, and lines introduced by
//! a trailing colon into their predecessor block. Texts without newlines
//! split after sentence punctuation. Returned boundaries are ascending byte
//! offsets whose last element is the text length.

use std::sync::LazyLock;

use regex::Regex;

static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s").expect("static regex"));
static LETTERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]\.\s").expect("static regex"));

const BULLET_GLYPHS: &[char] = &[
    '-', '*', '+', '•', '·', '‐', '–', '—', '(', '[', '●', '○', '▪', '▫',
];

const MIN_BLOCK_WORDS: usize = 10;

pub fn split(text: &str) -> Vec<usize> {
    if text.is_empty() {
        return Vec::new();
    }
    if text.contains('\n') {
        split_blocks(text)
    } else {
        split_sentences(text)
    }
}

/// Words as the heuristic counts them: 1 + spaces in the trimmed line.
fn word_count(line: &str) -> usize {
    1 + line.trim().matches(' ').count()
}

fn is_list_item(line: &str) -> bool {
    line.starts_with(' ')
        || line.starts_with('\t')
        || NUMBERED_ITEM.is_match(line)
        || LETTERED_ITEM.is_match(line)
        || line
            .chars()
            .next()
            .is_some_and(|c| BULLET_GLYPHS.contains(&c))
}

fn split_blocks(text: &str) -> Vec<usize> {
    // Block start offsets; a line merges into the running block unless it
    // opens a new one.
    let mut block_starts: Vec<usize> = Vec::new();
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);

        let merge = match block_starts.last() {
            None => false,
            Some(&block_start) => {
                let prev_block = &text[block_start..offset];
                word_count(content) < MIN_BLOCK_WORDS
                    || is_list_item(content)
                    || prev_block.trim_end().ends_with(':')
            }
        };

        if !merge {
            block_starts.push(offset);
        }
        offset += line.len();
    }

    let mut boundaries: Vec<usize> = block_starts.into_iter().skip(1).collect();
    boundaries.push(text.len());
    boundaries
}

fn split_sentences(text: &str) -> Vec<usize> {
    let mut boundaries = Vec::new();
    let mut iter = text.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        if matches!(c, '.' | '!' | '?') {
            let mut end = i + c.len_utf8();
            while let Some(&(j, c2)) = iter.peek() {
                if matches!(
                    c2,
                    ' ' | '\t' | '"' | '\'' | '\u{2019}' | '\u{201d}' | ')' | '('
                ) {
                    end = j + c2.len_utf8();
                    iter.next();
                } else {
                    break;
                }
            }
            if end < text.len() {
                boundaries.push(end);
            }
        }
    }

    boundaries.push(text.len());
    boundaries.dedup();
    boundaries
}
