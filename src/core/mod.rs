pub mod config;
pub mod error;
pub mod harness;
pub mod llm;
pub mod store;
pub mod terminal;
pub mod tools;
