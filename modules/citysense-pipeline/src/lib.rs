pub mod analysis;
pub mod cause;
pub mod classify;
pub mod discovery;
pub mod newsfeed;
pub mod partition;
pub mod providers;
pub mod stats;
pub mod summary;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use analysis::{AnalysisReport, Analyzer, Capabilities, PipelineOptions};
pub use classify::{Classified, Classifier, FailurePolicy, RowFailure};
pub use discovery::TopicDiscoverer;
pub use newsfeed::Synthesizer;
pub use stats::RunStats;
