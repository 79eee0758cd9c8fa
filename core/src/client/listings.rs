use url::form_urlencoded;
use urlencoding::encode;

use super::{parse_empty, parse_json, PetsClient};
use crate::error::ApiError;
use crate::http::{FormPart, HttpMethod, HttpRequest, HttpResponse, RequestBody};
use crate::types::{CreateListing, FavoriteToggle, Listing, ListingFilters, ListingsPage, PhotoUpload, UpdateListing};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Query parameters for a listings search, in wire order. Absent fields and
/// blank strings are left out; dates are plain `YYYY-MM-DD` days.
pub fn search_query(filters: &ListingFilters) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    let text = |value: &Option<String>| value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);

    if let Some(animal_type) = text(&filters.animal_type) {
        params.push(("animalType", animal_type));
    }
    if let Some(location) = text(&filters.location) {
        params.push(("location", location));
    }
    if let Some(date_from) = filters.date_from {
        params.push(("dateFrom", date_from.format(DATE_FORMAT).to_string()));
    }
    if let Some(date_to) = filters.date_to {
        params.push(("dateTo", date_to.format(DATE_FORMAT).to_string()));
    }
    if let Some(limit) = filters.limit {
        params.push(("limit", limit.to_string()));
    }
    if let Some(offset) = filters.offset {
        params.push(("offset", offset.to_string()));
    }
    params
}

impl PetsClient {
    pub fn build_search_listings(&self, filters: &ListingFilters) -> HttpRequest {
        let params = search_query(filters);
        if params.is_empty() {
            return self.bare(HttpMethod::Get, "/api/listings");
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
            .finish();
        self.bare(HttpMethod::Get, &format!("/api/listings?{query}"))
    }

    pub fn parse_search_listings(&self, response: HttpResponse) -> Result<ListingsPage, ApiError> {
        parse_json(response)
    }

    pub fn build_get_listing(&self, id: &str) -> HttpRequest {
        self.bare(HttpMethod::Get, &format!("/api/listings/{}", encode(id)))
    }

    pub fn parse_get_listing(&self, response: HttpResponse) -> Result<Listing, ApiError> {
        parse_json(response)
    }

    /// With no photos the listing goes out as JSON; with photos it becomes a
    /// multipart form where every file part is named `photos`.
    pub fn build_create_listing(&self, input: &CreateListing, photos: &[PhotoUpload]) -> Result<HttpRequest, ApiError> {
        if photos.is_empty() {
            return self.json(HttpMethod::Post, "/api/listings", input);
        }

        let mut parts = listing_text_parts(input)?;
        parts.extend(photos.iter().map(|photo| FormPart::File {
            name: "photos".to_string(),
            file_name: photo.file_name.clone(),
            content_type: photo.content_type.clone(),
            bytes: photo.bytes.clone(),
        }));

        Ok(HttpRequest {
            method: HttpMethod::Post,
            path: self.url("/api/listings"),
            headers: Vec::new(),
            body: Some(RequestBody::Multipart(parts)),
        })
    }

    pub fn parse_create_listing(&self, response: HttpResponse) -> Result<Listing, ApiError> {
        parse_json(response)
    }

    pub fn build_update_listing(&self, id: &str, input: &UpdateListing) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Put, &format!("/api/listings/{}", encode(id)), input)
    }

    pub fn parse_update_listing(&self, response: HttpResponse) -> Result<Listing, ApiError> {
        parse_json(response)
    }

    pub fn build_delete_listing(&self, id: &str) -> HttpRequest {
        self.bare(HttpMethod::Delete, &format!("/api/listings/{}", encode(id)))
    }

    pub fn parse_delete_listing(&self, response: HttpResponse) -> Result<(), ApiError> {
        parse_empty(response)
    }

    pub fn build_toggle_favorite(&self, id: &str) -> HttpRequest {
        self.bare(HttpMethod::Post, &format!("/api/listings/{}/favorite", encode(id)))
    }

    pub fn parse_toggle_favorite(&self, response: HttpResponse) -> Result<FavoriteToggle, ApiError> {
        parse_json(response)
    }

    pub fn build_favorites(&self) -> HttpRequest {
        self.bare(HttpMethod::Get, "/api/listings/favorites")
    }

    pub fn parse_favorites(&self, response: HttpResponse) -> Result<Vec<Listing>, ApiError> {
        parse_json(response)
    }

    pub fn build_user_listings(&self) -> HttpRequest {
        self.bare(HttpMethod::Get, "/api/users/listings")
    }

    pub fn parse_user_listings(&self, response: HttpResponse) -> Result<Vec<Listing>, ApiError> {
        parse_json(response)
    }
}

/// Flatten the listing fields into multipart text parts, reusing the JSON
/// field names so both encodings agree.
fn listing_text_parts(input: &CreateListing) -> Result<Vec<FormPart>, ApiError> {
    let value = serde_json::to_value(input).map_err(|e| ApiError::Serialization(e.to_string()))?;
    let serde_json::Value::Object(fields) = value else {
        return Err(ApiError::Serialization("listing did not serialize to an object".to_string()));
    };

    let mut parts = Vec::with_capacity(fields.len());
    for (name, value) in fields {
        match value {
            serde_json::Value::String(text) => parts.push(FormPart::Text { name, value: text }),
            serde_json::Value::Array(items) => {
                for item in items {
                    if let serde_json::Value::String(text) = item {
                        parts.push(FormPart::Text {
                            name: name.clone(),
                            value: text,
                        });
                    }
                }
            }
            serde_json::Value::Null => {}
            other => parts.push(FormPart::Text {
                name,
                value: other.to_string(),
            }),
        }
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn client() -> PetsClient {
        PetsClient::new("http://localhost:3000")
    }

    fn new_listing() -> CreateListing {
        CreateListing {
            title: "Пропал кот".to_string(),
            description: "Серый, без ошейника".to_string(),
            animal_type: "Кошка".to_string(),
            breed: None,
            location: "Казань".to_string(),
            photos: Vec::new(),
            date_lost: "2024-06-02".to_string(),
            contact_phone: "+79001234567".to_string(),
        }
    }

    #[test]
    fn ids_are_encoded_as_single_path_segments() {
        let c = client();
        assert_eq!(
            c.build_get_listing("a/b?x=1").path,
            "http://localhost:3000/api/listings/a%2Fb%3Fx%3D1"
        );
        assert_eq!(
            c.build_toggle_favorite("../users").path,
            "http://localhost:3000/api/listings/..%2Fusers/favorite"
        );
        assert_eq!(
            c.build_delete_comment("c 1#top").path,
            "http://localhost:3000/api/comments/c%201%23top"
        );
        assert_eq!(
            c.build_get_listing("3f2b-11ef_a.b~c").path,
            "http://localhost:3000/api/listings/3f2b-11ef_a.b~c"
        );
    }

    #[test]
    fn search_without_filters_has_no_query_string() {
        let req = client().build_search_listings(&ListingFilters::default());
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "http://localhost:3000/api/listings");
    }

    #[test]
    fn search_keeps_wire_order_and_omits_absent_dates() {
        let filters = ListingFilters {
            animal_type: Some("Собака".to_string()),
            limit: Some(10),
            offset: Some(0),
            ..ListingFilters::default()
        };
        assert_eq!(
            search_query(&filters),
            vec![
                ("animalType", "Собака".to_string()),
                ("limit", "10".to_string()),
                ("offset", "0".to_string()),
            ]
        );
    }

    #[test]
    fn search_formats_dates_as_days() {
        let filters = ListingFilters {
            date_from: NaiveDate::from_ymd_opt(2024, 1, 5),
            date_to: NaiveDate::from_ymd_opt(2024, 2, 29),
            ..ListingFilters::default()
        };
        let req = client().build_search_listings(&filters);
        assert_eq!(
            req.path,
            "http://localhost:3000/api/listings?dateFrom=2024-01-05&dateTo=2024-02-29"
        );
    }

    #[test]
    fn search_treats_blank_text_as_absent() {
        let filters = ListingFilters {
            location: Some("   ".to_string()),
            ..ListingFilters::default()
        };
        assert!(search_query(&filters).is_empty());
    }

    #[test]
    fn create_without_photos_sends_json() {
        let req = client().build_create_listing(&new_listing(), &[]).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.header("content-type"), Some("application/json"));
        let body: serde_json::Value = serde_json::from_str(req.json_body().unwrap()).unwrap();
        assert_eq!(body["animalType"], "Кошка");
        assert!(body.get("breed").is_none());
        assert!(body.get("photos").is_none());
    }

    #[test]
    fn create_with_photos_sends_multipart() {
        let photo = PhotoUpload {
            file_name: "cat.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: vec![0xff, 0xd8, 0xff],
        };
        let req = client().build_create_listing(&new_listing(), &[photo.clone(), photo]).unwrap();
        assert!(req.is_multipart());
        assert!(req.header("content-type").is_none());

        let Some(RequestBody::Multipart(parts)) = req.body else {
            panic!("expected multipart body");
        };
        let files = parts.iter().filter(|p| matches!(p, FormPart::File { .. })).count();
        assert_eq!(files, 2);
        assert!(parts.iter().filter(|p| matches!(p, FormPart::File { .. })).all(|p| p.name() == "photos"));
        assert!(parts.contains(&FormPart::Text {
            name: "location".to_string(),
            value: "Казань".to_string()
        }));
        assert!(!parts.iter().any(|p| p.name() == "breed"));
    }

    #[test]
    fn toggle_favorite_posts_without_body() {
        let req = client().build_toggle_favorite("l7");
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:3000/api/listings/l7/favorite");
        assert!(req.body.is_none());
    }
}
