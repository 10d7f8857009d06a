pub mod agent;
pub mod config;
pub mod console;
pub mod credentials;
pub mod fs_util;
pub mod gateway;
pub mod interpret;
pub mod ledger;
pub mod memory;
pub mod pipeline;
pub mod prompt;
pub mod protocol;
pub mod retrieval;
pub mod types;
