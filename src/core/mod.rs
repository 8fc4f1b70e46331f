pub mod app;
pub mod backend;
pub mod chat_stream;
pub mod classifier;
pub mod config;
pub mod connectivity;
pub mod frame_parser;
pub mod message;
pub mod preferences;
pub mod retrieval;
pub mod sessions;
pub mod storage;
