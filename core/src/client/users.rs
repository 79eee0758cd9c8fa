use urlencoding::encode;

use super::{parse_empty, parse_json, PetsClient};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{UpdateProfile, User, UserStats};

impl PetsClient {
    pub fn build_profile(&self) -> HttpRequest {
        self.bare(HttpMethod::Get, "/api/users/profile")
    }

    pub fn parse_profile(&self, response: HttpResponse) -> Result<User, ApiError> {
        parse_json(response)
    }

    pub fn build_update_profile(&self, input: &UpdateProfile) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Put, "/api/users/profile", input)
    }

    pub fn parse_update_profile(&self, response: HttpResponse) -> Result<User, ApiError> {
        parse_json(response)
    }

    pub fn build_user_stats(&self) -> HttpRequest {
        self.bare(HttpMethod::Get, "/api/users/stats")
    }

    pub fn parse_user_stats(&self, response: HttpResponse) -> Result<UserStats, ApiError> {
        parse_json(response)
    }

    pub fn build_list_users(&self) -> HttpRequest {
        self.bare(HttpMethod::Get, "/api/users")
    }

    pub fn parse_list_users(&self, response: HttpResponse) -> Result<Vec<User>, ApiError> {
        parse_json(response)
    }

    pub fn build_delete_user(&self, id: &str) -> HttpRequest {
        self.bare(HttpMethod::Delete, &format!("/api/users/{}", encode(id)))
    }

    pub fn parse_delete_user(&self, response: HttpResponse) -> Result<(), ApiError> {
        parse_empty(response)
    }
}
