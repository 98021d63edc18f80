pub mod batch;
pub mod cache;
pub mod environment;
pub mod ingest;
pub mod logging;
pub mod matching;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod retry;
pub mod services;

#[cfg(test)]
mod testing;

pub const TARGET_WEB_REQUEST: &str = "web_request";
pub const TARGET_LLM_REQUEST: &str = "llm_request";
pub const TARGET_CACHE: &str = "result_cache";
pub const TARGET_PIPELINE: &str = "pipeline";

pub use batch::{process_batch, BatchProgress, BatchReport, NoProgress, ProgressSink, RecordFailure};
pub use cache::ResultCache;
pub use pipeline::RecordPipeline;
pub use record::{BusinessRecord, CandidateContact, ContactSource};
pub use retry::{Outcome, RetryPolicy, ServiceFault};
