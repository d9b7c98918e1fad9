pub mod block_markdown;
pub mod config;
pub mod error;
pub mod notes_client;
pub mod schedule_parser;
