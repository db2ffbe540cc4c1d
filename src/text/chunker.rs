//! Fixed-size character chunking for oversized documents.

use crate::error::{Error, Result};

/// Default characters per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 15_000;

/// Splits text into contiguous, non-overlapping runs of at most
/// `chunk_size` characters.
///
/// Boundaries are purely positional; rows and lines are not respected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl Chunker {
    /// A size of zero is treated as one.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Iterate over the chunks of `text`. Clone the iterator to restart it.
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            rest: text,
            chunk_size: self.chunk_size,
        }
    }

    /// ceil(chars / chunk_size); zero for empty text.
    pub fn chunk_count(&self, text: &str) -> usize {
        let chars = text.chars().count();
        (chars + self.chunk_size - 1) / self.chunk_size
    }
}

/// Iterator returned by [`Chunker::chunks`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    rest: &'a str,
    chunk_size: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }
        let end = self
            .rest
            .char_indices()
            .nth(self.chunk_size)
            .map(|(idx, _)| idx)
            .unwrap_or(self.rest.len());
        let (head, tail) = self.rest.split_at(end);
        self.rest = tail;
        Some(head)
    }
}

/// Rough token estimate used for batching decisions: two characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 2
}

/// Reject documents whose estimate exceeds `limit` before any call is made.
pub fn check_token_budget(text: &str, limit: usize) -> Result<usize> {
    let estimated_tokens = estimate_tokens(text);
    if estimated_tokens > limit {
        return Err(Error::InputTooLarge {
            estimated_tokens,
            limit,
        });
    }
    Ok(estimated_tokens)
}
