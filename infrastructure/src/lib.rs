pub mod config;
pub mod file_scanner;
pub mod ollama_client;
pub mod search;
