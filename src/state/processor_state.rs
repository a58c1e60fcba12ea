/// Processor state definitions for tracking a vendor run
///
/// A run moves through these states in order; `Crawling` repeats once per
/// fetched batch and `Validating` only happens outside production.
use std::fmt;

/// Represents the current phase of a processor run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessorState {
    /// Downloader not built yet
    Init,

    /// Seed pages are being pushed into the frontier
    Seeding,

    /// Batches are being fetched and dispatched
    Crawling,

    /// Frontier exhausted or debug cap reached
    Draining,

    /// Crawled records are reconciled with price-list records
    Merging,

    /// QA rules run over the final record set (dev runs only)
    Validating,

    /// Records are handed to the storage sink
    Persisting,

    /// Run finished
    Done,
}

impl ProcessorState {
    /// Returns true if moving from `self` to `next` is a legal step
    pub fn can_transition_to(&self, next: ProcessorState) -> bool {
        use ProcessorState::*;
        matches!(
            (self, next),
            (Init, Seeding)
                | (Seeding, Crawling)
                | (Crawling, Crawling)
                | (Crawling, Draining)
                | (Draining, Merging)
                | (Merging, Validating)
                | (Merging, Persisting)
                | (Validating, Persisting)
                | (Persisting, Done)
        )
    }

    /// Returns true once the run has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns true while the frontier is still being worked
    pub fn is_crawling(&self) -> bool {
        matches!(self, Self::Seeding | Self::Crawling)
    }

    /// Short lowercase name used in log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Seeding => "seeding",
            Self::Crawling => "crawling",
            Self::Draining => "draining",
            Self::Merging => "merging",
            Self::Validating => "validating",
            Self::Persisting => "persisting",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
