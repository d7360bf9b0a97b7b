pub mod agent;
pub mod browser;
pub mod context;
pub mod errors;
pub mod filter;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod secondary;
pub mod service;
pub mod settings;
pub mod store;
pub mod tools;
pub mod verifier;
pub mod workflow;
