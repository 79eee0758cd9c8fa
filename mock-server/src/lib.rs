use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub role: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub description: String,
    pub animal_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,
    pub location: String,
    pub photos: Vec<String>,
    pub date_lost: String,
    pub contact_phone: String,
    pub user_id: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub id: String,
    pub email: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub content: String,
    pub author_id: String,
    pub announcement_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub author: CommentAuthor,
}

#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListing {
    pub title: String,
    pub description: String,
    pub animal_type: String,
    pub breed: Option<String>,
    pub location: String,
    #[serde(default)]
    pub photos: Vec<String>,
    pub date_lost: String,
    pub contact_phone: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateListing {
    pub title: Option<String>,
    pub description: Option<String>,
    pub animal_type: Option<String>,
    pub breed: Option<String>,
    pub location: Option<String>,
    pub photos: Option<Vec<String>>,
    pub date_lost: Option<String>,
    pub contact_phone: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateComment {
    pub content: String,
    pub announcement_id: String,
}

#[derive(Deserialize)]
pub struct UpdateProfile {
    pub role: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub animal_type: Option<String>,
    pub location: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Default)]
pub struct Data {
    users: HashMap<String, (User, String)>,
    tokens: HashMap<String, String>,
    listings: Vec<Listing>,
    favorites: HashMap<String, Vec<String>>,
    comments: Vec<Comment>,
}

pub type Db = Arc<RwLock<Data>>;

/// JSON error body `{"message": ...}` with a status code.
#[derive(Debug, Clone, Copy)]
pub struct ApiError(StatusCode, &'static str);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "message": self.1 }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

const UNAUTHORIZED: ApiError = ApiError(StatusCode::UNAUTHORIZED, "Требуется авторизация");
const FORBIDDEN: ApiError = ApiError(StatusCode::FORBIDDEN, "Недостаточно прав");
const LISTING_NOT_FOUND: ApiError = ApiError(StatusCode::NOT_FOUND, "Объявление не найдено");

/// The first account registered becomes the admin.
pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Data::default()));
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/api/users", get(list_users))
        .route("/api/users/{id}", delete(delete_user))
        .route("/api/users/profile", get(profile).put(update_profile))
        .route("/api/users/stats", get(user_stats))
        .route("/api/users/listings", get(user_listings))
        .route("/api/listings", get(search_listings).post(create_listing))
        .route("/api/listings/favorites", get(favorites))
        .route(
            "/api/listings/{id}",
            get(get_listing).put(update_listing).delete(delete_listing),
        )
        .route("/api/listings/{id}/favorite", post(toggle_favorite))
        .route("/api/comments", post(create_comment))
        .route("/api/comments/{id}", get(list_comments).delete(delete_comment))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn current_user(data: &Data, headers: &HeaderMap) -> ApiResult<User> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(UNAUTHORIZED)?;
    let email = data.tokens.get(token).ok_or(UNAUTHORIZED)?;
    data.users.get(email).map(|(user, _)| user.clone()).ok_or(UNAUTHORIZED)
}

fn issue_token(data: &mut Data, user: &User) -> serde_json::Value {
    let token = Uuid::new_v4().to_string();
    data.tokens.insert(token.clone(), user.email.clone());
    serde_json::json!({ "token": token, "user": user })
}

fn with_favorite(data: &Data, user: Option<&User>, mut listing: Listing) -> Listing {
    if let Some(user) = user {
        let favorite = data.favorites.get(&user.id).is_some_and(|ids| ids.contains(&listing.id));
        listing.is_favorite = Some(favorite);
    }
    listing
}

async fn register(State(db): State<Db>, Json(input): Json<Credentials>) -> ApiResult<impl IntoResponse> {
    if !input.email.contains('@') || input.password.len() < 6 {
        return Err(ApiError(StatusCode::BAD_REQUEST, "Некорректный email или пароль"));
    }
    let mut data = db.write().await;
    if data.users.contains_key(&input.email) {
        return Err(ApiError(StatusCode::CONFLICT, "Пользователь с таким email уже существует"));
    }
    let role = if data.users.is_empty() { "admin" } else { "user" };
    let user = User {
        id: Uuid::new_v4().to_string(),
        email: input.email.clone(),
        role: role.to_string(),
        created_at: now(),
        updated_at: now(),
    };
    data.users.insert(input.email, (user.clone(), input.password));
    info!(user_id = %user.id, role = %user.role, "registered");
    let body = issue_token(&mut data, &user);
    Ok((StatusCode::CREATED, Json(body)))
}

async fn login(State(db): State<Db>, Json(input): Json<Credentials>) -> ApiResult<Json<serde_json::Value>> {
    let mut data = db.write().await;
    let user = match data.users.get(&input.email) {
        Some((user, password)) if *password == input.password => user.clone(),
        _ => return Err(ApiError(StatusCode::UNAUTHORIZED, "Неверный email или пароль")),
    };
    Ok(Json(issue_token(&mut data, &user)))
}

async fn profile(State(db): State<Db>, headers: HeaderMap) -> ApiResult<Json<User>> {
    let data = db.read().await;
    current_user(&data, &headers).map(Json)
}

async fn update_profile(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<UpdateProfile>,
) -> ApiResult<Json<User>> {
    let mut data = db.write().await;
    let user = current_user(&data, &headers)?;
    let (stored, _) = data.users.get_mut(&user.email).ok_or(UNAUTHORIZED)?;
    if let Some(role) = input.role {
        stored.role = role;
    }
    stored.updated_at = now();
    Ok(Json(stored.clone()))
}

async fn user_stats(State(db): State<Db>, headers: HeaderMap) -> ApiResult<Json<serde_json::Value>> {
    let data = db.read().await;
    current_user(&data, &headers)?;
    Ok(Json(serde_json::json!({
        "totalUsers": data.users.len(),
        "totalListings": data.listings.len(),
    })))
}

async fn list_users(State(db): State<Db>, headers: HeaderMap) -> ApiResult<Json<Vec<User>>> {
    let data = db.read().await;
    if current_user(&data, &headers)?.role != "admin" {
        return Err(FORBIDDEN);
    }
    Ok(Json(data.users.values().map(|(user, _)| user.clone()).collect()))
}

async fn delete_user(State(db): State<Db>, headers: HeaderMap, Path(id): Path<String>) -> ApiResult<StatusCode> {
    let mut data = db.write().await;
    if current_user(&data, &headers)?.role != "admin" {
        return Err(FORBIDDEN);
    }
    let email = data
        .users
        .values()
        .find(|(user, _)| user.id == id)
        .map(|(user, _)| user.email.clone())
        .ok_or(ApiError(StatusCode::NOT_FOUND, "Пользователь не найден"))?;
    data.users.remove(&email);
    data.tokens.retain(|_, owner| *owner != email);
    Ok(StatusCode::NO_CONTENT)
}

async fn user_listings(State(db): State<Db>, headers: HeaderMap) -> ApiResult<Json<Vec<Listing>>> {
    let data = db.read().await;
    let user = current_user(&data, &headers)?;
    let mine = data
        .listings
        .iter()
        .filter(|l| l.user_id == user.id)
        .map(|l| with_favorite(&data, Some(&user), l.clone()))
        .collect();
    Ok(Json(mine))
}

async fn search_listings(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Json<serde_json::Value> {
    let data = db.read().await;
    let viewer = current_user(&data, &headers).ok();
    let matches: Vec<&Listing> = data
        .listings
        .iter()
        .filter(|l| params.animal_type.as_ref().is_none_or(|t| &l.animal_type == t))
        .filter(|l| params.location.as_ref().is_none_or(|loc| l.location.contains(loc.as_str())))
        .filter(|l| {
            let day = NaiveDate::parse_from_str(&l.date_lost, "%Y-%m-%d").ok();
            params.date_from.is_none_or(|from| day.is_some_and(|d| d >= from))
                && params.date_to.is_none_or(|to| day.is_some_and(|d| d <= to))
        })
        .collect();

    let total = matches.len();
    let limit = params.limit.unwrap_or(20);
    let offset = params.offset.unwrap_or(0);
    let page: Vec<Listing> = matches
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|l| with_favorite(&data, viewer.as_ref(), l.clone()))
        .collect();

    Json(serde_json::json!({
        "listings": page,
        "total": total,
        "limit": limit,
        "offset": offset,
        "hasNext": offset + limit < total,
    }))
}

async fn get_listing(State(db): State<Db>, headers: HeaderMap, Path(id): Path<String>) -> ApiResult<Json<Listing>> {
    let data = db.read().await;
    let viewer = current_user(&data, &headers).ok();
    let listing = data.listings.iter().find(|l| l.id == id).cloned().ok_or(LISTING_NOT_FOUND)?;
    Ok(Json(with_favorite(&data, viewer.as_ref(), listing)))
}

/// Accepts either a JSON body or a multipart form whose `photos` parts are
/// files. Stored photo URLs are synthesized from the uploaded file names.
async fn create_listing(State(db): State<Db>, request: Request) -> ApiResult<impl IntoResponse> {
    let user = {
        let data = db.read().await;
        current_user(&data, request.headers())?
    };

    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    let input = if is_multipart {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|_| ApiError(StatusCode::BAD_REQUEST, "Некорректная форма"))?;
        read_listing_form(multipart).await?
    } else {
        let Json(input) = Json::<CreateListing>::from_request(request, &())
            .await
            .map_err(|_| ApiError(StatusCode::UNPROCESSABLE_ENTITY, "Некорректные данные объявления"))?;
        input
    };

    let listing = Listing {
        id: Uuid::new_v4().to_string(),
        title: input.title,
        description: input.description,
        animal_type: input.animal_type,
        breed: input.breed,
        location: input.location,
        photos: input.photos,
        date_lost: input.date_lost,
        contact_phone: input.contact_phone,
        user_id: user.id,
        created_at: now(),
        updated_at: now(),
        is_favorite: None,
    };
    info!(listing_id = %listing.id, photos = listing.photos.len(), "listing created");
    db.write().await.listings.push(listing.clone());
    Ok((StatusCode::CREATED, Json(listing)))
}

async fn read_listing_form(mut multipart: Multipart) -> ApiResult<CreateListing> {
    let bad_form = ApiError(StatusCode::BAD_REQUEST, "Некорректная форма");
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut photos = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|_| bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(file_name) = field.file_name().map(str::to_string) {
            field.bytes().await.map_err(|_| bad_form)?;
            photos.push(format!("/uploads/{}-{file_name}", Uuid::new_v4()));
        } else {
            let value = field.text().await.map_err(|_| bad_form)?;
            if name == "photos" {
                photos.push(value);
            } else {
                fields.insert(name, value);
            }
        }
    }

    let missing = ApiError(StatusCode::UNPROCESSABLE_ENTITY, "Не заполнены обязательные поля");
    let mut take = |name: &str| fields.remove(name).ok_or(missing);
    Ok(CreateListing {
        title: take("title")?,
        description: take("description")?,
        animal_type: take("animalType")?,
        location: take("location")?,
        date_lost: take("dateLost")?,
        contact_phone: take("contactPhone")?,
        breed: fields.remove("breed"),
        photos,
    })
}

async fn update_listing(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<UpdateListing>,
) -> ApiResult<Json<Listing>> {
    let mut data = db.write().await;
    let user = current_user(&data, &headers)?;
    let listing = data.listings.iter_mut().find(|l| l.id == id).ok_or(LISTING_NOT_FOUND)?;
    if listing.user_id != user.id && user.role != "admin" {
        return Err(FORBIDDEN);
    }
    if let Some(title) = input.title {
        listing.title = title;
    }
    if let Some(description) = input.description {
        listing.description = description;
    }
    if let Some(animal_type) = input.animal_type {
        listing.animal_type = animal_type;
    }
    if let Some(breed) = input.breed {
        listing.breed = Some(breed);
    }
    if let Some(location) = input.location {
        listing.location = location;
    }
    if let Some(photos) = input.photos {
        listing.photos = photos;
    }
    if let Some(date_lost) = input.date_lost {
        listing.date_lost = date_lost;
    }
    if let Some(contact_phone) = input.contact_phone {
        listing.contact_phone = contact_phone;
    }
    listing.updated_at = now();
    let updated = listing.clone();
    Ok(Json(with_favorite(&data, Some(&user), updated)))
}

async fn delete_listing(State(db): State<Db>, headers: HeaderMap, Path(id): Path<String>) -> ApiResult<StatusCode> {
    let mut data = db.write().await;
    let user = current_user(&data, &headers)?;
    let index = data.listings.iter().position(|l| l.id == id).ok_or(LISTING_NOT_FOUND)?;
    if data.listings[index].user_id != user.id && user.role != "admin" {
        return Err(FORBIDDEN);
    }
    data.listings.remove(index);
    data.comments.retain(|c| c.announcement_id != id);
    for ids in data.favorites.values_mut() {
        ids.retain(|fav| *fav != id);
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_favorite(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut data = db.write().await;
    let user = current_user(&data, &headers)?;
    if !data.listings.iter().any(|l| l.id == id) {
        return Err(LISTING_NOT_FOUND);
    }
    let ids = data.favorites.entry(user.id).or_default();
    let is_favorite = match ids.iter().position(|fav| *fav == id) {
        Some(index) => {
            ids.remove(index);
            false
        }
        None => {
            ids.push(id);
            true
        }
    };
    let message = if is_favorite { "Добавлено в избранное" } else { "Удалено из избранного" };
    Ok(Json(serde_json::json!({ "isFavorite": is_favorite, "message": message })))
}

async fn favorites(State(db): State<Db>, headers: HeaderMap) -> ApiResult<Json<Vec<Listing>>> {
    let data = db.read().await;
    let user = current_user(&data, &headers)?;
    let ids = data.favorites.get(&user.id).cloned().unwrap_or_default();
    let listings = data
        .listings
        .iter()
        .filter(|l| ids.contains(&l.id))
        .map(|l| with_favorite(&data, Some(&user), l.clone()))
        .collect();
    Ok(Json(listings))
}

async fn create_comment(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreateComment>,
) -> ApiResult<impl IntoResponse> {
    let mut data = db.write().await;
    let user = current_user(&data, &headers)?;
    if input.content.trim().is_empty() {
        return Err(ApiError(StatusCode::BAD_REQUEST, "Комментарий не может быть пустым"));
    }
    if !data.listings.iter().any(|l| l.id == input.announcement_id) {
        return Err(LISTING_NOT_FOUND);
    }
    let comment = Comment {
        id: Uuid::new_v4().to_string(),
        content: input.content,
        author_id: user.id.clone(),
        announcement_id: input.announcement_id,
        created_at: now(),
        updated_at: now(),
        author: CommentAuthor {
            id: user.id,
            email: user.email,
        },
    };
    data.comments.push(comment.clone());
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn list_comments(State(db): State<Db>, Path(listing_id): Path<String>) -> Json<Vec<Comment>> {
    let data = db.read().await;
    Json(
        data.comments
            .iter()
            .filter(|c| c.announcement_id == listing_id)
            .cloned()
            .collect(),
    )
}

async fn delete_comment(State(db): State<Db>, headers: HeaderMap, Path(id): Path<String>) -> ApiResult<StatusCode> {
    let mut data = db.write().await;
    let user = current_user(&data, &headers)?;
    let index = data
        .comments
        .iter()
        .position(|c| c.id == id)
        .ok_or(ApiError(StatusCode::NOT_FOUND, "Комментарий не найден"))?;
    if data.comments[index].author_id != user.id && user.role != "admin" {
        return Err(FORBIDDEN);
    }
    data.comments.remove(index);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_serializes_camel_case() {
        let listing = Listing {
            id: "l1".to_string(),
            title: "Пропал кот".to_string(),
            description: "Серый".to_string(),
            animal_type: "Кошка".to_string(),
            breed: None,
            location: "Пермь".to_string(),
            photos: Vec::new(),
            date_lost: "2024-05-01".to_string(),
            contact_phone: "+7".to_string(),
            user_id: "u1".to_string(),
            created_at: "2024-05-01T00:00:00Z".to_string(),
            updated_at: "2024-05-01T00:00:00Z".to_string(),
            is_favorite: None,
        };
        let json = serde_json::to_value(&listing).unwrap();
        assert_eq!(json["animalType"], "Кошка");
        assert_eq!(json["dateLost"], "2024-05-01");
        assert!(json.get("breed").is_none());
        assert!(json.get("isFavorite").is_none());
    }

    #[test]
    fn search_params_parse_dates() {
        let params: SearchParams =
            serde_json::from_str(r#"{"dateFrom":"2024-01-02","limit":5}"#).unwrap();
        assert_eq!(params.date_from, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(params.limit, Some(5));
        assert!(params.offset.is_none());
    }

    #[test]
    fn create_listing_requires_core_fields() {
        let result: Result<CreateListing, _> = serde_json::from_str(r#"{"title":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn error_body_carries_message() {
        let response = ApiError(StatusCode::CONFLICT, "занято").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
