//! Run-length row codec.
//!
//! A run of [`RUN_THRESHOLD`] or more identical non-diagonal symbols is written as
//! `<char><count>`. Digits are not part of the relation alphabet, so the decoded
//! width is a function of the encoded text alone.

use crate::relation::Relation;

pub const RUN_THRESHOLD: usize = 3;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum DecodeError {
    #[error("unknown relation symbol {ch:?} at offset {offset}")]
    UnknownSymbol { ch: char, offset: usize },
    #[error("run count without a symbol at offset {offset}")]
    DanglingCount { offset: usize },
    #[error("zero-length run at offset {offset}")]
    ZeroCount { offset: usize },
    #[error("run count overflows at offset {offset}")]
    CountOverflow { offset: usize },
    #[error("row exceeds {limit} cells at offset {offset}")]
    TooWide { limit: usize, offset: usize },
}

#[must_use]
pub fn encode(row: &[Relation]) -> String {
    let mut out = String::with_capacity(row.len());
    let mut index = 0;
    while index < row.len() {
        let symbol = row[index];
        let run = row[index..].iter().take_while(|candidate| **candidate == symbol).count();
        if symbol != Relation::Diagonal && run >= RUN_THRESHOLD {
            out.push(symbol.as_char());
            out.push_str(&run.to_string());
        } else {
            for _ in 0..run {
                out.push(symbol.as_char());
            }
        }
        index += run;
    }
    out
}

/// Expand an encoded row into its symbols.
///
/// # Errors
/// Returns [`DecodeError`] for characters outside the alphabet, counts that do not
/// follow a symbol, zero counts, and counts that overflow `usize`.
pub fn decode(encoded: &str) -> Result<Vec<Relation>, DecodeError> {
    decode_bounded(encoded, usize::MAX)
}

/// [`decode`] that stops with [`DecodeError::TooWide`] once the row would grow
/// past `max_width` cells, before allocating them.
///
/// # Errors
/// Same as [`decode`], plus [`DecodeError::TooWide`].
pub fn decode_bounded(encoded: &str, max_width: usize) -> Result<Vec<Relation>, DecodeError> {
    let mut row = Vec::new();
    let mut chars = encoded.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        if ch.is_ascii_digit() {
            return Err(DecodeError::DanglingCount { offset });
        }
        let symbol = Relation::from_char(ch).ok_or(DecodeError::UnknownSymbol { ch, offset })?;

        let mut count: Option<usize> = None;
        while let Some((digit_offset, digit)) = chars.peek().copied() {
            let Some(value) = digit.to_digit(10) else {
                break;
            };
            chars.next();
            let next = count
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|current| current.checked_add(value as usize))
                .ok_or(DecodeError::CountOverflow { offset: digit_offset })?;
            count = Some(next);
        }

        let run = match count {
            None => 1,
            Some(0) => return Err(DecodeError::ZeroCount { offset }),
            Some(run) => run,
        };
        if run > max_width - row.len() {
            return Err(DecodeError::TooWide { limit: max_width, offset });
        }
        row.extend(std::iter::repeat(symbol).take(run));
    }

    Ok(row)
}

/// Placeholder row of `width` cells with the diagonal at `diagonal` (when in range).
#[must_use]
pub fn initial_row(width: usize, diagonal: usize) -> Vec<Relation> {
    let mut row = vec![Relation::Placeholder; width];
    if let Some(cell) = row.get_mut(diagonal) {
        *cell = Relation::Diagonal;
    }
    row
}
