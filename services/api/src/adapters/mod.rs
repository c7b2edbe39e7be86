pub mod coach_llm;
pub mod db;
pub mod sst;
pub mod storage;
pub mod tts;

pub use coach_llm::OpenAiCoachAdapter;
pub use db::DbAdapter;
pub use sst::OpenAiSttAdapter;
pub use storage::LocalStorageAdapter;
pub use tts::{FallbackTtsAdapter, OpenAiTtsAdapter, VoiceServerTtsAdapter};
