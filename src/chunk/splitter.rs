//! Overlapping window splitter. Positions are counted in chars, never bytes.

use crate::error::ChunkingError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        let config = Self { size, overlap };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.size == 0 {
            return Err(ChunkingError::ZeroSize);
        }
        if self.overlap >= self.size {
            return Err(ChunkingError::OverlapTooLarge {
                size: self.size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }
}

/// A slice of the source text plus its char offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window<'a> {
    pub offset: usize,
    pub text: &'a str,
}

/// Split `text` into windows of at most `config.size` chars.
///
/// A window that would end inside a word is pulled back to the last whitespace it
/// contains, as long as that keeps more than half of the window. The next window starts
/// at `min(start + size - overlap, end)`, so consecutive windows never leave a gap and
/// overlap by at most `overlap` chars. A pull-back never ends a window at or before the
/// end of the previous one. Windows holding only whitespace are dropped.
pub fn split<'a>(text: &'a str, config: &ChunkingConfig) -> Result<Vec<Window<'a>>, ChunkingError> {
    config.validate()?;

    // Byte position of every char, plus the end of the string.
    let mut bounds: Vec<usize> = text.char_indices().map(|(pos, _)| pos).collect();
    let char_len = bounds.len();
    bounds.push(text.len());

    let chars: Vec<char> = text.chars().collect();
    let mut windows = Vec::new();
    let mut push = |start: usize, end: usize| {
        let slice = &text[bounds[start]..bounds[end]];
        if !slice.trim().is_empty() {
            windows.push(Window {
                offset: start,
                text: slice,
            });
        }
    };

    if char_len <= config.size {
        push(0, char_len);
        return Ok(windows);
    }

    let mut start = 0;
    let mut prev_end = 0;
    loop {
        let mut end = (start + config.size).min(char_len);

        // Window ends only move forward, whatever the overlap.
        let splits_word = end < char_len && !chars[end - 1].is_whitespace() && !chars[end].is_whitespace();
        if splits_word {
            if let Some(space) = (start..end).rev().find(|&i| chars[i].is_whitespace()) {
                if space - start > config.size / 2 && space > prev_end {
                    end = space;
                }
            }
        }

        push(start, end);
        if end >= char_len {
            break;
        }
        prev_end = end;
        start = (start + config.size - config.overlap).min(end);
    }

    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig::new(size, overlap).unwrap()
    }

    #[test]
    fn short_text_is_one_window() {
        let windows = split("hello world", &cfg(1000, 100)).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].text, "hello world");
        assert_eq!(windows[0].offset, 0);
    }

    #[test]
    fn text_of_exactly_size_is_one_window() {
        let text = "a".repeat(50);
        assert_eq!(split(&text, &cfg(50, 10)).unwrap().len(), 1);
    }

    #[test]
    fn whitespace_only_text_yields_nothing() {
        assert!(split("   \n\t  ", &cfg(10, 2)).unwrap().is_empty());
        assert!(split("", &cfg(10, 2)).unwrap().is_empty());
    }

    #[test]
    fn unbroken_text_steps_by_size_minus_overlap() {
        let text = "x".repeat(25);
        let windows = split(&text, &cfg(10, 2)).unwrap();
        let offsets: Vec<_> = windows.iter().map(|w| w.offset).collect();
        assert_eq!(offsets, vec![0, 8, 16]);
        assert_eq!(windows[2].text.len(), 9);
    }

    #[test]
    fn window_is_pulled_back_to_a_word_boundary() {
        // "aaaaaaa bbbbbbb": the first window of 10 would cut "bbbbbbb".
        let windows = split("aaaaaaa bbbbbbb", &cfg(10, 2)).unwrap();
        assert_eq!(windows[0].text, "aaaaaaa");
        assert_eq!(windows[1].offset, 7);
        assert!(windows[1].text.ends_with("bbbbbbb"));
    }

    #[test]
    fn boundary_too_early_is_ignored() {
        // The only space keeps less than half the window.
        let windows = split("ab cdefghijklmnop", &cfg(10, 2)).unwrap();
        assert_eq!(windows[0].text, "ab cdefghi");
    }

    #[test]
    fn offsets_count_chars_not_bytes() {
        let text = "é".repeat(15);
        let windows = split(&text, &cfg(10, 0)).unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].offset, 10);
        assert_eq!(windows[1].text.chars().count(), 5);
    }

    #[test]
    fn window_ends_increase_with_large_overlap() {
        let text = "lorem ipsum dolor sit amet consectetur adipiscing elit ".repeat(20);
        let windows = split(&text, &cfg(33, 32)).unwrap();
        let ends: Vec<usize> = windows
            .iter()
            .map(|w| w.offset + w.text.chars().count())
            .collect();
        assert!(ends.windows(2).all(|pair| pair[1] > pair[0]), "{ends:?}");
        assert_eq!(ends.last(), Some(&text.chars().count()));
        for pair in windows.windows(2) {
            let prev_end = pair[0].offset + pair[0].text.chars().count();
            assert!(pair[1].offset <= prev_end);
            assert!(prev_end - pair[1].offset <= 32);
        }
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert_eq!(ChunkingConfig::new(0, 0), Err(ChunkingError::ZeroSize));
        assert_eq!(
            ChunkingConfig::new(10, 10),
            Err(ChunkingError::OverlapTooLarge { size: 10, overlap: 10 })
        );
    }
}
