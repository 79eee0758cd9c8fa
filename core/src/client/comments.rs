use urlencoding::encode;

use super::{parse_empty, parse_json, PetsClient};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{Comment, CreateComment};

impl PetsClient {
    pub fn build_create_comment(&self, input: &CreateComment) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Post, "/api/comments", input)
    }

    pub fn parse_create_comment(&self, response: HttpResponse) -> Result<Comment, ApiError> {
        parse_json(response)
    }

    pub fn build_comments(&self, listing_id: &str) -> HttpRequest {
        self.bare(HttpMethod::Get, &format!("/api/comments/{}", encode(listing_id)))
    }

    pub fn parse_comments(&self, response: HttpResponse) -> Result<Vec<Comment>, ApiError> {
        parse_json(response)
    }

    pub fn build_delete_comment(&self, id: &str) -> HttpRequest {
        self.bare(HttpMethod::Delete, &format!("/api/comments/{}", encode(id)))
    }

    pub fn parse_delete_comment(&self, response: HttpResponse) -> Result<(), ApiError> {
        parse_empty(response)
    }
}
