pub mod chat_stream;
pub mod config;
pub mod constants;
pub mod error;
pub mod history;
pub mod message;
pub mod orchestrator;
pub mod transcript;
