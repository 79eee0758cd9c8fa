//! Wiring for a running client: one transport, one query cache, and the two
//! persisted stores, built from a [`ClientConfig`] and passed around by
//! reference instead of living in globals.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::api::{Api, TokenHandle};
use crate::config::ClientConfig;
use crate::error::{ApiError, StorageError};
use crate::queries::Queries;
use crate::query::{QueryClient, QueryError};
use crate::stats::{admin_stats, AdminStats};
use crate::storage::{FileStorage, Storage};
use crate::store::{FilterStore, SessionStore};
use crate::transport::{ReqwestTransport, Transport};
use crate::types::ListingsPage;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Transport(#[from] ApiError),
}

pub struct AppContext {
    pub queries: Queries,
    pub session: SessionStore,
    pub filters: FilterStore,
}

impl AppContext {
    /// Production wiring: reqwest transport and file-backed storage.
    pub fn from_config(config: &ClientConfig) -> Result<Self, StartupError> {
        let transport = ReqwestTransport::new(config.request_timeout)?;
        let storage = FileStorage::open(&config.storage_dir)?;
        info!(base_url = %config.base_url, storage = %config.storage_dir.display(), "client starting");
        Ok(Self::with_parts(&config.base_url, Arc::new(transport), Arc::new(storage)))
    }

    pub fn with_parts(base_url: &str, transport: Arc<dyn Transport>, storage: Arc<dyn Storage>) -> Self {
        let api = Api::new(base_url, transport, TokenHandle::new());
        let session = SessionStore::restore(api.clone(), Arc::clone(&storage));
        let filters = FilterStore::restore(storage);
        Self {
            queries: Queries::new(api, QueryClient::new()),
            session,
            filters,
        }
    }

    /// Search with the filters currently held by the filter store.
    pub async fn search_with_saved_filters(&self) -> Result<Arc<ListingsPage>, QueryError<ListingsPage>> {
        self.queries.listings(&self.filters.filters()).await
    }

    pub async fn admin_stats(&self) -> Result<AdminStats, ApiError> {
        admin_stats(self.queries.api(), Utc::now()).await
    }

    /// Log out and drop every cached response, which may belong to the
    /// previous user.
    pub fn logout(&self) -> Result<(), StorageError> {
        self.queries.cache().clear();
        self.session.logout()
    }
}
