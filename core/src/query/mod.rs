//! Client-side query cache.
//!
//! Reads are keyed by [`QueryKey`] and go through [`QueryClient::fetch`];
//! writes go through [`QueryClient::mutate`] and declare which keys they
//! invalidate. Invalidation is always explicit at the call site.

mod cache;
mod key;

pub use cache::{EntryState, QueryClient, QueryError, QueryOptions};
pub use key::{KeyMatch, QueryKey};
