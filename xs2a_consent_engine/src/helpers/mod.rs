mod checksum;
mod keyed_locks;

pub use checksum::{calculate_checksum, is_checksum_updatable};
pub use keyed_locks::{KeyedGuard, KeyedLocks};
