//! Cached reads and cache-aware mutations for every API operation.
//!
//! Reads go through the shared [`QueryClient`] under the keys in [`keys`].
//! Each mutation declares the keys it makes stale, and some write their
//! result straight into the cache to save a round trip.

use std::sync::Arc;
use std::time::Duration;

use crate::api::Api;
use crate::error::ApiError;
use crate::query::{KeyMatch, QueryClient, QueryError, QueryKey, QueryOptions};
use crate::types::{
    Comment, CreateComment, CreateListing, FavoriteToggle, Listing, ListingFilters, ListingsPage, PhotoUpload,
    UpdateListing, UpdateProfile, User, UserStats,
};

/// Cache keys, one scope per read operation.
pub mod keys {
    use super::{ListingFilters, QueryKey};

    pub const LISTINGS: &str = "listings";
    pub const LISTING: &str = "listing";
    pub const FAVORITES: &str = "favorites";
    pub const USER_LISTINGS: &str = "user-listings";
    pub const COMMENTS: &str = "comments";
    pub const PROFILE: &str = "profile";
    pub const USERS: &str = "users";
    pub const USER_STATS: &str = "user-stats";

    pub fn listings(filters: &ListingFilters) -> QueryKey {
        QueryKey::with_params(LISTINGS, filters)
    }

    pub fn listing(id: &str) -> QueryKey {
        QueryKey::new(LISTING, id)
    }

    pub fn favorites() -> QueryKey {
        QueryKey::scope(FAVORITES)
    }

    pub fn user_listings() -> QueryKey {
        QueryKey::scope(USER_LISTINGS)
    }

    pub fn comments(listing_id: &str) -> QueryKey {
        QueryKey::new(COMMENTS, listing_id)
    }

    pub fn profile() -> QueryKey {
        QueryKey::scope(PROFILE)
    }

    pub fn users() -> QueryKey {
        QueryKey::scope(USERS)
    }

    pub fn user_stats() -> QueryKey {
        QueryKey::scope(USER_STATS)
    }
}

const FIVE_MINUTES: QueryOptions = QueryOptions::stale_after(Duration::from_secs(5 * 60));
const TEN_MINUTES: QueryOptions = QueryOptions::stale_after(Duration::from_secs(10 * 60));

/// The API as seen through the cache.
#[derive(Clone)]
pub struct Queries {
    api: Api,
    cache: QueryClient,
}

impl Queries {
    pub fn new(api: Api, cache: QueryClient) -> Self {
        Self { api, cache }
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn cache(&self) -> &QueryClient {
        &self.cache
    }

    // -- reads ------------------------------------------------------------

    pub async fn listings(&self, filters: &ListingFilters) -> Result<Arc<ListingsPage>, QueryError<ListingsPage>> {
        let api = self.api.clone();
        let params = filters.clone();
        self.cache
            .fetch(keys::listings(filters), FIVE_MINUTES, move || async move {
                api.search_listings(&params).await
            })
            .await
    }

    pub async fn listing(&self, id: &str) -> Result<Arc<Listing>, QueryError<Listing>> {
        let api = self.api.clone();
        let owned = id.to_string();
        self.cache
            .fetch(keys::listing(id), TEN_MINUTES, move || async move { api.get_listing(&owned).await })
            .await
    }

    pub async fn favorites(&self) -> Result<Arc<Vec<Listing>>, QueryError<Vec<Listing>>> {
        let api = self.api.clone();
        self.cache
            .fetch(keys::favorites(), FIVE_MINUTES, move || async move { api.favorites().await })
            .await
    }

    pub async fn user_listings(&self) -> Result<Arc<Vec<Listing>>, QueryError<Vec<Listing>>> {
        let api = self.api.clone();
        self.cache
            .fetch(keys::user_listings(), FIVE_MINUTES, move || async move {
                api.user_listings().await
            })
            .await
    }

    pub async fn comments(&self, listing_id: &str) -> Result<Arc<Vec<Comment>>, QueryError<Vec<Comment>>> {
        let api = self.api.clone();
        let owned = listing_id.to_string();
        self.cache
            .fetch(keys::comments(listing_id), QueryOptions::default(), move || async move {
                api.comments(&owned).await
            })
            .await
    }

    pub async fn profile(&self) -> Result<Arc<User>, QueryError<User>> {
        let api = self.api.clone();
        self.cache
            .fetch(keys::profile(), QueryOptions::default(), move || async move { api.profile().await })
            .await
    }

    pub async fn users(&self) -> Result<Arc<Vec<User>>, QueryError<Vec<User>>> {
        let api = self.api.clone();
        self.cache
            .fetch(keys::users(), QueryOptions::default(), move || async move { api.list_users().await })
            .await
    }

    pub async fn user_stats(&self) -> Result<Arc<UserStats>, QueryError<UserStats>> {
        let api = self.api.clone();
        self.cache
            .fetch(keys::user_stats(), QueryOptions::default(), move || async move {
                api.user_stats().await
            })
            .await
    }

    // -- mutations --------------------------------------------------------

    pub async fn create_listing(&self, input: &CreateListing, photos: &[PhotoUpload]) -> Result<Listing, ApiError> {
        self.cache
            .mutate(self.api.create_listing(input, photos), |cache, _| {
                cache.invalidate(KeyMatch::Scope(keys::LISTINGS));
                cache.invalidate(keys::user_listings());
            })
            .await
    }

    pub async fn update_listing(&self, id: &str, input: &UpdateListing) -> Result<Listing, ApiError> {
        self.cache
            .mutate(self.api.update_listing(id, input), |cache, updated| {
                cache.set_data(keys::listing(&updated.id), updated.clone());
                cache.invalidate(KeyMatch::Scope(keys::LISTINGS));
                cache.invalidate(keys::user_listings());
            })
            .await
    }

    pub async fn delete_listing(&self, id: &str) -> Result<(), ApiError> {
        self.cache
            .mutate(self.api.delete_listing(id), |cache, _| {
                cache.remove(&keys::listing(id));
                cache.invalidate(KeyMatch::Scope(keys::LISTINGS));
                cache.invalidate(keys::user_listings());
                cache.invalidate(keys::favorites());
            })
            .await
    }

    pub async fn toggle_favorite(&self, id: &str) -> Result<FavoriteToggle, ApiError> {
        self.cache
            .mutate(self.api.toggle_favorite(id), |cache, toggle| {
                cache.update_data::<Listing, _>(keys::listing(id), |listing| Listing {
                    is_favorite: Some(toggle.is_favorite),
                    ..listing.clone()
                });
                cache.invalidate(keys::favorites());
                cache.invalidate(KeyMatch::Scope(keys::LISTINGS));
            })
            .await
    }

    pub async fn create_comment(&self, input: &CreateComment) -> Result<Comment, ApiError> {
        self.cache
            .mutate(self.api.create_comment(input), |cache, _| {
                cache.invalidate(keys::comments(&input.announcement_id));
            })
            .await
    }

    pub async fn delete_comment(&self, id: &str) -> Result<(), ApiError> {
        self.cache
            .mutate(self.api.delete_comment(id), |cache, _| {
                cache.invalidate(KeyMatch::Scope(keys::COMMENTS));
            })
            .await
    }

    pub async fn update_profile(&self, input: &UpdateProfile) -> Result<User, ApiError> {
        self.cache
            .mutate(self.api.update_profile(input), |cache, user| {
                cache.set_data(keys::profile(), user.clone());
                cache.invalidate(keys::users());
            })
            .await
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), ApiError> {
        self.cache
            .mutate(self.api.delete_user(id), |cache, _| {
                cache.invalidate(keys::users());
                cache.invalidate(keys::user_stats());
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{api_with, ScriptedTransport};
    use crate::query::EntryState;

    const LISTING: &str = r#"{"id":"l1","title":"Пропал пёс","description":"Чёрный","animalType":"Собака",
        "location":"Омск","photos":[],"dateLost":"2024-04-01","contactPhone":"+7900",
        "userId":"u1","createdAt":"2024-04-01T00:00:00Z","updatedAt":"2024-04-01T00:00:00Z"}"#;

    fn page(listing: &str) -> String {
        format!(r#"{{"listings":[{listing}],"total":1,"limit":10,"offset":0,"hasNext":false}}"#)
    }

    fn queries(transport: &Arc<ScriptedTransport>) -> Queries {
        Queries::new(api_with(Arc::clone(transport)), QueryClient::new())
    }

    #[tokio::test]
    async fn repeated_reads_hit_the_network_once() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.reply(200, LISTING);
        let queries = queries(&transport);

        queries.listing("l1").await.unwrap();
        let listing = queries.listing("l1").await.unwrap();

        assert_eq!(listing.title, "Пропал пёс");
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn update_writes_listing_and_invalidates_lists() {
        let transport = Arc::new(ScriptedTransport::default());
        let updated = LISTING.replace("Пропал пёс", "Найден пёс");
        transport
            .reply(200, &page(LISTING))
            .reply(200, &updated)
            .reply(200, &page(&updated));
        let queries = queries(&transport);
        let filters = ListingFilters::default();

        queries.listings(&filters).await.unwrap();
        queries
            .update_listing(
                "l1",
                &UpdateListing {
                    title: Some("Найден пёс".to_string()),
                    ..UpdateListing::default()
                },
            )
            .await
            .unwrap();

        let cached = queries.listing("l1").await.unwrap();
        assert_eq!(cached.title, "Найден пёс");
        assert_eq!(transport.requests().len(), 2, "listing served from the direct write");

        let refreshed = queries.listings(&filters).await.unwrap();
        assert_eq!(refreshed.listings[0].title, "Найден пёс");
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn toggle_favorite_patches_cached_listing() {
        let transport = Arc::new(ScriptedTransport::default());
        transport
            .reply(200, LISTING)
            .reply(200, r#"{"isFavorite":true,"message":"Добавлено в избранное"}"#);
        let queries = queries(&transport);

        queries.listing("l1").await.unwrap();
        queries.toggle_favorite("l1").await.unwrap();

        let listing = queries.cache().peek::<Listing>(&keys::listing("l1")).unwrap();
        assert_eq!(listing.is_favorite, Some(true));
        assert_eq!(queries.cache().state(&keys::listing("l1")), Some(EntryState::Fresh));
    }

    #[tokio::test]
    async fn failed_mutation_leaves_cache_untouched() {
        let transport = Arc::new(ScriptedTransport::default());
        transport
            .reply(200, "[]")
            .reply(403, r#"{"message":"Недостаточно прав"}"#);
        let queries = queries(&transport);

        queries.user_listings().await.unwrap();
        let err = queries.delete_listing("l1").await.unwrap_err();

        assert_eq!(err.user_message("Ошибка"), "Недостаточно прав");
        assert_eq!(queries.cache().state(&keys::user_listings()), Some(EntryState::Fresh));
    }

    #[tokio::test]
    async fn new_comment_invalidates_only_its_listing() {
        let transport = Arc::new(ScriptedTransport::default());
        let comment = r#"{"id":"c1","content":"Видел у парка","authorId":"u2","announcementId":"l1",
            "createdAt":"2024-04-02T00:00:00Z","updatedAt":"2024-04-02T00:00:00Z",
            "author":{"id":"u2","email":"b@example.com"}}"#;
        transport.reply(200, "[]").reply(200, "[]").reply(201, comment);
        let queries = queries(&transport);

        queries.comments("l1").await.unwrap();
        queries.comments("l2").await.unwrap();
        queries
            .create_comment(&CreateComment {
                content: "Видел у парка".to_string(),
                announcement_id: "l1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(queries.cache().state(&keys::comments("l1")), Some(EntryState::Stale));
        assert_eq!(queries.cache().state(&keys::comments("l2")), Some(EntryState::Fresh));
    }
}
