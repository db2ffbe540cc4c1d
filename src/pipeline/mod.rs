//! Batch pipelines
//!
//! - Generation: document → chunks → model calls → personas on disk
//! - Scoring: personas × marketing copy → feedback report
//!
//! Both run their model calls strictly one after another, paced by the
//! delays in configuration.

mod generation;
mod scoring;

pub use generation::*;
pub use scoring::*;

/// Position of one unit of work within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    /// 1-based
    pub index: usize,
    pub total: usize,
    /// Attempts beyond the first spent on this batch
    pub retries: u32,
}

impl Batch {
    pub fn new(index: usize, total: usize) -> Self {
        Self {
            index,
            total,
            retries: 0,
        }
    }

    pub fn is_last(&self) -> bool {
        self.index >= self.total
    }

    /// `"Batch i/N"`
    pub fn label(&self) -> String {
        format!("Batch {}/{}", self.index, self.total)
    }
}
