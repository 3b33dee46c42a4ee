//! Latchkey Storage - durable key-value substrate
//!
//! Everything the rotation engine persists (role records, write-ahead
//! intents) goes through the [`Store`] trait. Keys are plain strings that the
//! callers namespace with `/`-separated prefixes; values are opaque bytes.
//!
//! Two backends ship with the crate:
//!
//! - [`MemoryStore`] - process-local map, used by tests and by embedders that
//!   bring their own persistence behind a facade
//! - [`FileStore`] - one file per key with atomic replace, enough to survive a
//!   process restart
#![forbid(unsafe_code)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StoreError, StoreResult};
pub use file::{FileStore, MAX_KEY_LEN};
pub use memory::MemoryStore;
pub use store::Store;
