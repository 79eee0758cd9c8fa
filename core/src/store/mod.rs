//! Persisted client state containers.
//!
//! Two independent stores, each constructed explicitly over a
//! [`Storage`](crate::storage::Storage) and handed to whoever needs it.

mod filters;
mod session;

pub use filters::{FilterState, FilterStore, FILTERS_KEY};
pub use session::{AuthStatus, Session, SessionStore, SESSION_KEY};
