//! Client-side query cache: key resolution, atomic patches and the shared
//! store.

pub mod keys;
pub mod patch;
pub mod store;

pub use keys::{CacheAddress, KeyPattern, QueryKey, ViewKind};
pub use patch::CachePatch;
pub use store::{AppliedPatch, EntrySnapshot, FetchTicket, QueryCache};
