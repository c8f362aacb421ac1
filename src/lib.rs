pub mod config;
pub mod error;
pub mod fields;
pub mod generate;
pub mod models;
pub mod ping;
pub mod prompts;
pub mod server;
pub mod transport;
pub mod tree;
pub mod wizard;

pub use crate::config::Config;
pub use crate::error::{PromptBoostrError, Result};
pub use crate::server::{AppState, router};
