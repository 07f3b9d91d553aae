/// Application name
pub const APP_NAME: &str = "Parley";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Structural marker prefixed to every sealed content envelope.
/// Anything without this prefix is treated as legacy plaintext.
pub const ENVELOPE_TAG: &str = "pv1.";

/// PBKDF2-HMAC-SHA256 iteration count for envelope key derivation
pub const KDF_ITERATIONS: u32 = 100_000;

/// Fixed envelope KDF salt. The derived key protects content at rest
/// against the storage provider only; the salt being public is consistent
/// with that threat model.
pub const KDF_SALT: &[u8] = b"parley-envelope-key-v1";

/// Maximum qualifying messages patched per read-receipt batch
pub const READ_BATCH_CAP: usize = 400;

/// Most recent messages delivered per room snapshot
pub const MESSAGE_WINDOW: usize = 200;

/// Number of digits in a group room share code
pub const ROOM_CODE_DIGITS: u32 = 7;

/// Prefix of the deterministic 1:1 room identifier
pub const PRIVATE_ROOM_PREFIX: &str = "private-";

/// Most recent audit records returned by default
pub const AUDIT_WINDOW: usize = 100;

/// Marker that invokes the assistant from within a chat message
pub const ASSISTANT_MARKER: &str = "@ai";

/// Prefix of moderation commands typed into the send box
pub const COMMAND_PREFIX: char = '/';

/// Default timeout for store calls made while establishing a session (seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
