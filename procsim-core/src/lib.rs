//! # procsim-core
//!
//! Core library for procsim - model a sequential process, simulate it with an
//! LLM oracle, and iterate on it conversationally.
//!
//! This library provides:
//! - Domain types for steps, simulation runs and the chat transcript
//! - Snapshot persistence on SQLite
//! - The oracle client and its structured response contracts
//! - Simulation, import and optimization-chat operations
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use procsim_core::oracle::create_oracle_client;
//! use procsim_core::{Config, Database, ProcessStore, Workspace};
//!
//! let config = Config::load().expect("failed to load config");
//!
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let store = ProcessStore::new(db, config.process.default_name.clone());
//! let oracle = create_oracle_client(&config.oracle, store.credential().ok().flatten())
//!     .expect("failed to create oracle client");
//! let workspace = Workspace::open(store, oracle);
//! println!("{} steps", workspace.snapshot().steps.len());
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use store::ProcessStore;
pub use types::*;
pub use workspace::{Activity, Workspace};

// Public modules
pub mod compare;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod import;
pub mod logging;
pub mod optimize;
pub mod oracle;
pub mod simulate;
pub mod store;
pub mod types;
pub mod workspace;
