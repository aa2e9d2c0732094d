pub mod index;
pub mod prompt;
pub mod rag_service;
