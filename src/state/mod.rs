//! State module for tracking a vendor run
//!
//! # Components
//!
//! - `ProcessorState`: the phase of a processor run (seeding, crawling, merging, ...)
//! - `ProxyState`: the downloader's proxy session (disconnected, probing, connected)

mod processor_state;
mod proxy_state;

// Re-export main types
pub use processor_state::ProcessorState;
pub use proxy_state::ProxyState;
