//! pwkeep library API
//!
//! The modules are exposed for fuzzing and integration tests.
//! The interactive binary interface is in main.rs.

pub mod aead;
pub mod archive;
pub mod cli;
pub mod command;
pub mod error;
pub mod format;
pub mod kdf;
pub mod repl;
pub mod securemem;
pub mod store;
pub mod token;

pub use error::Error;
pub use format::{Header, HEADER_LEN};
