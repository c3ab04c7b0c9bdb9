pub mod llm;
pub mod warehouse;

pub use llm::{extract_json, LlmClient, LlmReply};
pub use warehouse::WarehouseClient;
