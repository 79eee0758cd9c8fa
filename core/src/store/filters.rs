//! Listing filter UI state, persisted under [`FILTERS_KEY`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::warn;

use crate::error::StorageError;
use crate::storage::{load_json, save_json, Storage};
use crate::types::ListingFilters;

pub const FILTERS_KEY: &str = "listing-ui-storage";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub filters: ListingFilters,
    /// Listing currently open in the detail view. Not persisted.
    pub current_listing_id: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedFilters {
    #[serde(default)]
    filters: ListingFilters,
}

pub struct FilterStore {
    storage: Arc<dyn Storage>,
    state: watch::Sender<FilterState>,
}

impl FilterStore {
    pub fn restore(storage: Arc<dyn Storage>) -> Self {
        let filters = match load_json::<PersistedFilters>(storage.as_ref(), FILTERS_KEY) {
            Ok(persisted) => persisted.unwrap_or_default().filters,
            Err(e) => {
                warn!(error = %e, "cannot read persisted filters");
                ListingFilters::default()
            }
        };
        let (state, _) = watch::channel(FilterState {
            filters,
            current_listing_id: None,
        });
        Self { storage, state }
    }

    pub fn filters(&self) -> ListingFilters {
        self.state.borrow().filters.clone()
    }

    pub fn current_listing_id(&self) -> Option<String> {
        self.state.borrow().current_listing_id.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FilterState> {
        self.state.subscribe()
    }

    pub fn set_filters(&self, filters: ListingFilters) -> Result<(), StorageError> {
        save_json(
            self.storage.as_ref(),
            FILTERS_KEY,
            &PersistedFilters {
                filters: filters.clone(),
            },
        )?;
        self.state.send_modify(|s| s.filters = filters);
        Ok(())
    }

    pub fn clear_filters(&self) -> Result<(), StorageError> {
        self.set_filters(ListingFilters::default())
    }

    pub fn set_current_listing(&self, id: Option<String>) {
        self.state.send_modify(|s| s.current_listing_id = id);
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::storage::MemoryStorage;

    fn dog_filters() -> ListingFilters {
        ListingFilters {
            animal_type: Some("Собака".to_string()),
            date_to: NaiveDate::from_ymd_opt(2024, 7, 1),
            limit: Some(20),
            ..ListingFilters::default()
        }
    }

    #[test]
    fn filters_survive_restore() {
        let storage = MemoryStorage::new();
        let store = FilterStore::restore(Arc::new(storage.clone()));
        store.set_filters(dog_filters()).unwrap();
        store.set_current_listing(Some("l1".to_string()));

        let restored = FilterStore::restore(Arc::new(storage));
        assert_eq!(restored.filters(), dog_filters());
        assert!(restored.current_listing_id().is_none());
    }

    #[test]
    fn clear_resets_to_empty() {
        let storage = MemoryStorage::new();
        let store = FilterStore::restore(Arc::new(storage.clone()));
        store.set_filters(dog_filters()).unwrap();
        store.clear_filters().unwrap();

        assert!(store.filters().is_empty());
        assert_eq!(storage.get(FILTERS_KEY).unwrap().as_deref(), Some(r#"{"filters":{}}"#));
    }

    #[test]
    fn unreadable_blob_starts_empty() {
        let storage = MemoryStorage::new();
        storage.set(FILTERS_KEY, r#"{"filters":{"limit":"ten"}}"#).unwrap();
        let store = FilterStore::restore(Arc::new(storage));
        assert!(store.filters().is_empty());
    }
}
