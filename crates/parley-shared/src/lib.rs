//! # parley-shared
//!
//! Domain vocabulary shared by every Parley crate: typed identifiers, the
//! error taxonomy, the message content envelope, and outgoing-input command
//! parsing. Nothing in here performs I/O.

pub mod command;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod types;

pub use envelope::Envelope;
