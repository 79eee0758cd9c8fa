//! Client core for the lost-pets classifieds API.
//!
//! # Overview
//! Typed access to the remote REST API, a query cache over it, and the two
//! pieces of persisted client state (session and listing filters). All
//! persistence, authentication and business rules live on the server; this
//! crate only moves, caches and remembers.
//!
//! # Design
//! - `PetsClient` is stateless: each endpoint is a `build_*` method that
//!   produces an `HttpRequest` and a `parse_*` method that consumes an
//!   `HttpResponse`. I/O happens only behind the `Transport` trait.
//! - `Api` executes one request per operation and attaches the bearer token.
//! - `QueryClient` de-duplicates concurrent reads per key, serves stale data
//!   while revalidating, and is invalidated explicitly by mutations
//!   (`Queries` declares which).
//! - `SessionStore` and `FilterStore` are independent containers persisted
//!   through a `Storage` implementation and injected via `AppContext`.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod api;
pub mod app;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod queries;
pub mod query;
pub mod stats;
pub mod storage;
pub mod store;
pub mod transport;
pub mod types;

pub use api::{Api, TokenHandle};
pub use app::{AppContext, StartupError};
pub use client::PetsClient;
pub use config::ClientConfig;
pub use error::{ApiError, ConfigError, ErrorKind, StorageError};
pub use http::{FormPart, HttpMethod, HttpRequest, HttpResponse, RequestBody};
pub use queries::Queries;
pub use query::{EntryState, KeyMatch, QueryClient, QueryError, QueryKey, QueryOptions};
pub use stats::AdminStats;
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::{AuthStatus, FilterStore, Session, SessionStore};
pub use transport::{ReqwestTransport, Transport};
pub use types::{
    AuthResponse, Comment, CommentAuthor, CreateComment, CreateListing, FavoriteToggle, Listing, ListingFilters,
    ListingsPage, LoginInput, PhotoUpload, RegisterInput, UpdateListing, UpdateProfile, User, UserStats,
};
