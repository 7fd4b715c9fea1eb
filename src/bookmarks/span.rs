//! Line numbers for character-offset selections.
//!
//! Offsets count `char`s, and every line is followed by a one-char terminator
//! (a `\r` before the `\n` stays part of its line).

use crate::store::types::LineRange;

/// 1-based inclusive lines covered by `[start_offset, end_offset)` in `text`.
/// Offsets past the end resolve to the last line.
pub fn locate(text: &str, start_offset: usize, end_offset: usize) -> LineRange {
    let end_offset = end_offset.max(start_offset);
    let mut start = None;
    let mut end = None;
    let mut consumed = 0usize;
    let mut last = 1;

    for (idx, line) in text.split('\n').enumerate() {
        let number = idx + 1;
        last = number;
        consumed += line.chars().count() + 1;

        if start.is_none() && consumed > start_offset {
            start = Some(number);
        }
        if end.is_none() && consumed >= end_offset {
            end = Some(number);
        }
        if start.is_some() && end.is_some() {
            break;
        }
    }

    let start = start.unwrap_or(last);
    let end = end.unwrap_or(last).max(start);
    LineRange { start, end }
}

/// Char offsets of the first occurrence of `needle`.
pub fn find_selection(text: &str, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }
    let byte_pos = text.find(needle)?;
    let start = text[..byte_pos].chars().count();
    Some((start, start + needle.chars().count()))
}

/// Verbatim text of a 1-based inclusive line range. The end is clamped to the
/// last line; `None` if the start is out of range.
pub fn slice_lines(text: &str, lines: LineRange) -> Option<String> {
    if lines.start == 0 || lines.end < lines.start {
        return None;
    }
    let selected: Vec<&str> = text
        .split('\n')
        .skip(lines.start - 1)
        .take(lines.end - lines.start + 1)
        .collect();
    if selected.is_empty() {
        None
    } else {
        Some(selected.join("\n"))
    }
}
