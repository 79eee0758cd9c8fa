//! The request wrapper every domain operation goes through.
//!
//! # Design
//! `Api` pairs the stateless [`PetsClient`] with a [`Transport`]. For each
//! operation it builds the request, attaches `Authorization: Bearer <token>`
//! when the shared [`TokenHandle`] holds a token, executes it, and parses the
//! response. Exactly one HTTP call per operation; errors propagate unchanged
//! and nothing is retried or cached here.
//!
//! The token handle is written by the session store and only read here.

use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::client::PetsClient;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::Transport;
use crate::types::{
    AuthResponse, Comment, CreateComment, CreateListing, FavoriteToggle, Listing, ListingFilters, ListingsPage,
    LoginInput, PhotoUpload, RegisterInput, UpdateListing, UpdateProfile, User, UserStats,
};

/// Shared, in-memory bearer token. Cloning shares the same slot.
#[derive(Debug, Clone, Default)]
pub struct TokenHandle {
    slot: Arc<RwLock<Option<String>>>,
}

impl TokenHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.slot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, token: Option<String>) {
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    pub fn clear(&self) {
        self.set(None);
    }
}

type Parser<T> = fn(&PetsClient, HttpResponse) -> Result<T, ApiError>;

/// Typed, authenticated access to the REST API.
#[derive(Clone)]
pub struct Api {
    client: PetsClient,
    transport: Arc<dyn Transport>,
    token: TokenHandle,
}

impl Api {
    pub fn new(base_url: &str, transport: Arc<dyn Transport>, token: TokenHandle) -> Self {
        Self {
            client: PetsClient::new(base_url),
            transport,
            token,
        }
    }

    pub fn token(&self) -> &TokenHandle {
        &self.token
    }

    pub fn client(&self) -> &PetsClient {
        &self.client
    }

    /// A copy that sends `token` from its own slot, leaving the shared
    /// handle untouched.
    pub fn with_token(&self, token: &str) -> Api {
        let scoped = TokenHandle::new();
        scoped.set(Some(token.to_string()));
        Self {
            client: self.client.clone(),
            transport: Arc::clone(&self.transport),
            token: scoped,
        }
    }

    async fn send<T>(&self, mut request: HttpRequest, parse: Parser<T>) -> Result<T, ApiError> {
        if let Some(token) = self.token.get() {
            request.headers.push(("authorization".to_string(), format!("Bearer {token}")));
        }
        let method = request.method;
        let path = request.path.clone();
        debug!(%method, %path, "sending request");

        let response = self.transport.execute(request).await?;
        debug!(%method, %path, status = response.status, "received response");
        parse(&self.client, response)
    }

    // -- auth -------------------------------------------------------------

    pub async fn login(&self, input: &LoginInput) -> Result<AuthResponse, ApiError> {
        self.send(self.client.build_login(input)?, PetsClient::parse_login).await
    }

    pub async fn register(&self, input: &RegisterInput) -> Result<AuthResponse, ApiError> {
        self.send(self.client.build_register(input)?, PetsClient::parse_register).await
    }

    // -- users ------------------------------------------------------------

    pub async fn profile(&self) -> Result<User, ApiError> {
        self.send(self.client.build_profile(), PetsClient::parse_profile).await
    }

    pub async fn update_profile(&self, input: &UpdateProfile) -> Result<User, ApiError> {
        self.send(self.client.build_update_profile(input)?, PetsClient::parse_update_profile)
            .await
    }

    pub async fn user_stats(&self) -> Result<UserStats, ApiError> {
        self.send(self.client.build_user_stats(), PetsClient::parse_user_stats).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.send(self.client.build_list_users(), PetsClient::parse_list_users).await
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), ApiError> {
        self.send(self.client.build_delete_user(id), PetsClient::parse_delete_user).await
    }

    // -- listings ---------------------------------------------------------

    pub async fn search_listings(&self, filters: &ListingFilters) -> Result<ListingsPage, ApiError> {
        self.send(self.client.build_search_listings(filters), PetsClient::parse_search_listings)
            .await
    }

    pub async fn get_listing(&self, id: &str) -> Result<Listing, ApiError> {
        self.send(self.client.build_get_listing(id), PetsClient::parse_get_listing).await
    }

    pub async fn create_listing(&self, input: &CreateListing, photos: &[PhotoUpload]) -> Result<Listing, ApiError> {
        self.send(
            self.client.build_create_listing(input, photos)?,
            PetsClient::parse_create_listing,
        )
        .await
    }

    pub async fn update_listing(&self, id: &str, input: &UpdateListing) -> Result<Listing, ApiError> {
        self.send(self.client.build_update_listing(id, input)?, PetsClient::parse_update_listing)
            .await
    }

    pub async fn delete_listing(&self, id: &str) -> Result<(), ApiError> {
        self.send(self.client.build_delete_listing(id), PetsClient::parse_delete_listing)
            .await
    }

    pub async fn toggle_favorite(&self, id: &str) -> Result<FavoriteToggle, ApiError> {
        self.send(self.client.build_toggle_favorite(id), PetsClient::parse_toggle_favorite)
            .await
    }

    pub async fn favorites(&self) -> Result<Vec<Listing>, ApiError> {
        self.send(self.client.build_favorites(), PetsClient::parse_favorites).await
    }

    pub async fn user_listings(&self) -> Result<Vec<Listing>, ApiError> {
        self.send(self.client.build_user_listings(), PetsClient::parse_user_listings).await
    }

    // -- comments ---------------------------------------------------------

    pub async fn create_comment(&self, input: &CreateComment) -> Result<Comment, ApiError> {
        self.send(self.client.build_create_comment(input)?, PetsClient::parse_create_comment)
            .await
    }

    pub async fn comments(&self, listing_id: &str) -> Result<Vec<Comment>, ApiError> {
        self.send(self.client.build_comments(listing_id), PetsClient::parse_comments).await
    }

    pub async fn delete_comment(&self, id: &str) -> Result<(), ApiError> {
        self.send(self.client.build_delete_comment(id), PetsClient::parse_delete_comment)
            .await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{api_with, ScriptedTransport};
    use super::*;

    #[tokio::test]
    async fn token_is_attached_when_present() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.reply(200, "[]").reply(200, "[]");
        let api = api_with(transport.clone());

        api.favorites().await.unwrap();
        api.token().set(Some("abc".to_string()));
        api.favorites().await.unwrap();

        let seen = transport.requests();
        assert!(seen[0].header("authorization").is_none());
        assert_eq!(seen[1].header("authorization"), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn http_errors_propagate_unchanged() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.reply(404, r#"{"message":"Объявление не найдено"}"#);
        let api = api_with(transport);

        let err = api.get_listing("missing").await.unwrap_err();
        assert_eq!(
            err,
            ApiError::NotFound {
                message: "Объявление не найдено".to_string()
            }
        );
    }

    #[tokio::test]
    async fn transport_failure_is_a_network_error() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.fail(ApiError::Network("connection refused".to_string()));
        let api = api_with(transport);

        let err = api.profile().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Network);
    }

    #[test]
    fn token_handle_clones_share_the_slot() {
        let a = TokenHandle::new();
        let b = a.clone();
        a.set(Some("t".to_string()));
        assert_eq!(b.get().as_deref(), Some("t"));
        b.clear();
        assert!(a.get().is_none());
    }
}
