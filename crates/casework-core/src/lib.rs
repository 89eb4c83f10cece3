pub mod action;
pub mod config;
pub mod context;
pub mod decision;
pub mod error;
pub mod executor;
pub mod io;
pub mod orchestrator;
pub mod paths;
pub mod retry;
pub mod review;
pub mod rules;
pub mod schema;
pub mod stage;
pub mod store;
pub mod trigger;
pub mod types;

pub use error::{CaseworkError, Result};
