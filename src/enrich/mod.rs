pub mod summary;

pub use summary::{cached_or_local, Summarizer, SummaryCache};
