//! Core download logic: candidates, naming, ordering and filing

pub mod dedupe;
pub mod entry;
pub mod orchestrator;
pub mod progress;
pub mod resolver;
pub mod selector;
pub mod sorter;

pub use dedupe::{dedupe_entries, dedupe_urls};
pub use entry::{ExtractedInfo, FormatCandidate, MediaCandidate, MediaSource, QualityPreference, RawEntry};
pub use orchestrator::{BatchReport, Orchestrator, OrchestratorOptions, PageResult, StatusReporter};
pub use progress::{Progress, ProgressSink};
pub use resolver::SessionRegistry;
pub use selector::{pick_format, select_candidate};
pub use sorter::sort_downloaded;
