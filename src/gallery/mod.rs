//! Gallery navigation state.
//!
//! `GalleryState` is the explicit session object for one viewer: the ordered
//! image URLs and the index currently shown. Navigation never leaves the
//! state out of bounds; a move that would do so is reported as `Unchanged`
//! so the caller knows not to start a load.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::error::{GalleryError, Result};
use serde::Serialize;
use tracing::debug;

/// Upper bound for a single "cache the next N images" request.
pub const MAX_PREFETCH: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GalleryState {
    items: Vec<String>,
    current_index: usize,
}

/// Outcome of a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation<'a> {
    /// The index changed; load this URL.
    Moved(&'a str),
    /// Already at the boundary; nothing to load.
    Unchanged,
}

impl GalleryState {
    pub fn new(items: Vec<String>) -> Result<Self> {
        if items.is_empty() {
            return Err(GalleryError::NoImages);
        }
        Ok(Self {
            items,
            current_index: 0,
        })
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> &str {
        &self.items[self.current_index]
    }

    pub fn is_first(&self) -> bool {
        self.current_index == 0
    }

    pub fn is_last(&self) -> bool {
        self.current_index + 1 == self.items.len()
    }

    pub fn next(&mut self) -> Navigation<'_> {
        if self.is_last() {
            debug!("Already at the last image");
            return Navigation::Unchanged;
        }
        self.current_index += 1;
        Navigation::Moved(&self.items[self.current_index])
    }

    pub fn prev(&mut self) -> Navigation<'_> {
        if self.is_first() {
            debug!("Already at the first image");
            return Navigation::Unchanged;
        }
        self.current_index -= 1;
        Navigation::Moved(&self.items[self.current_index])
    }

    /// Jump to `index`. Out-of-range requests are rejected and leave the
    /// state as it was.
    pub fn go_to(&mut self, index: usize) -> Result<&str> {
        if index >= self.items.len() {
            return Err(GalleryError::Index {
                index,
                len: self.items.len(),
            });
        }
        self.current_index = index;
        Ok(&self.items[index])
    }

    /// `count` URLs starting at `start`, wrapping past the end. The count is
    /// clamped to the number of items so nothing is listed twice.
    pub fn window(&self, start: usize, count: usize) -> Result<Vec<&str>> {
        if start >= self.items.len() {
            return Err(GalleryError::Index {
                index: start,
                len: self.items.len(),
            });
        }
        let count = count.min(self.items.len());
        Ok((start..start + count)
            .map(|i| self.items[i % self.items.len()].as_str())
            .collect())
    }

    /// "3/12" style position label.
    pub fn page_info(&self) -> String {
        format!("{}/{}", self.current_index + 1, self.items.len())
    }
}

/// Validate a requested prefetch count (1 to 500).
pub fn validate_prefetch_count(count: usize) -> Result<usize> {
    if (1..=MAX_PREFETCH).contains(&count) {
        Ok(count)
    } else {
        Err(GalleryError::InvalidRequest(format!(
            "prefetch count must be between 1 and {} (got {})",
            MAX_PREFETCH, count
        )))
    }
}
