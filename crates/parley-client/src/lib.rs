//! # parley-client
//!
//! The session orchestrator: one live client session composed over the
//! identity, room and message services. It owns no persistent state, only
//! the per-session view caches and the live subscriptions that keep them
//! consistent with the backing store.

pub mod config;
pub mod error;
pub mod events;
pub mod generate;
pub mod session;
pub mod state;

pub use config::CoreConfig;
pub use error::SessionError;
pub use events::{ChatView, EvictionReason, SessionEvent};
pub use generate::{GenerationError, Generator};
pub use session::SessionOrchestrator;
pub use state::SessionPhase;

use tracing_subscriber::{fmt, EnvFilter};

/// Install the process-wide tracing subscriber.
///
/// `RUST_LOG` overrides the default per-crate levels. Calling this more
/// than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("parley_client=debug,parley_service=debug,parley_store=info,warn")
    });

    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
