pub mod conformance;
mod error;
mod filter;
mod jsonl;
mod memory;
mod traits;

pub use error::RecorderError;
pub use filter::EpisodeFilter;
pub use jsonl::JsonlRecorder;
pub use memory::InMemoryRecorder;
pub use traits::EpisodeRecorder;
