use super::{parse_json, PetsClient};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{AuthResponse, LoginInput, RegisterInput};

impl PetsClient {
    pub fn build_login(&self, input: &LoginInput) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Post, "/auth/login", input)
    }

    pub fn parse_login(&self, response: HttpResponse) -> Result<AuthResponse, ApiError> {
        parse_json(response)
    }

    pub fn build_register(&self, input: &RegisterInput) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Post, "/auth/register", input)
    }

    pub fn parse_register(&self, response: HttpResponse) -> Result<AuthResponse, ApiError> {
        parse_json(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_login_posts_credentials() {
        let client = PetsClient::new("http://localhost:3000");
        let req = client
            .build_login(&LoginInput {
                email: "kate@example.com".to_string(),
                password: "secret1".to_string(),
            })
            .unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:3000/auth/login");
        let body: serde_json::Value = serde_json::from_str(req.json_body().unwrap()).unwrap();
        assert_eq!(body["email"], "kate@example.com");
        assert_eq!(body["password"], "secret1");
    }

    #[test]
    fn parse_register_reads_token_and_user() {
        let client = PetsClient::new("http://localhost:3000");
        let response = HttpResponse {
            status: 201,
            headers: Vec::new(),
            body: r#"{"token":"t1","user":{"id":"u1","email":"a@b.c","role":"user"}}"#.to_string(),
        };
        let auth = client.parse_register(response).unwrap();
        assert_eq!(auth.token, "t1");
        assert_eq!(auth.user.id, "u1");
    }
}
