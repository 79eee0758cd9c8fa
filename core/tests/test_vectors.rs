//! Verify build/parse methods against JSON test vectors stored in `test-vectors/`.
//!
//! Each vector file describes inputs, expected requests, simulated responses,
//! and expected parse results. Comparing parsed JSON (not raw strings) avoids
//! false negatives from field-ordering differences.

use pets_core::{
    AuthResponse, CreateListing, ErrorKind, HttpMethod, HttpRequest, HttpResponse, Listing, ListingFilters,
    LoginInput, PetsClient,
};

const BASE_URL: &str = "http://localhost:3000";

fn client() -> PetsClient {
    PetsClient::new(BASE_URL)
}

fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

fn parse_kind(s: &str) -> ErrorKind {
    match s {
        "Network" => ErrorKind::Network,
        "Unauthorized" => ErrorKind::Unauthorized,
        "Forbidden" => ErrorKind::Forbidden,
        "NotFound" => ErrorKind::NotFound,
        "Client" => ErrorKind::Client,
        "Server" => ErrorKind::Server,
        "Decode" => ErrorKind::Decode,
        other => panic!("unknown error kind: {other}"),
    }
}

fn simulated(case: &serde_json::Value) -> HttpResponse {
    let sim = &case["simulated_response"];
    HttpResponse {
        status: sim["status"].as_u64().unwrap() as u16,
        headers: Vec::new(),
        body: sim["body"].as_str().unwrap().to_string(),
    }
}

/// Compare method, path, headers and JSON body with the vector's `expected_request`.
fn assert_json_request(name: &str, req: &HttpRequest, expected: &serde_json::Value) {
    assert_eq!(req.method, parse_method(expected["method"].as_str().unwrap()), "{name}: method");
    assert_eq!(req.path, format!("{BASE_URL}{}", expected["path"].as_str().unwrap()), "{name}: path");

    let expected_headers: Vec<(String, String)> = expected["headers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| {
            let arr = h.as_array().unwrap();
            (arr[0].as_str().unwrap().to_string(), arr[1].as_str().unwrap().to_string())
        })
        .collect();
    assert_eq!(req.headers, expected_headers, "{name}: headers");

    let body: serde_json::Value = serde_json::from_str(req.json_body().unwrap()).unwrap();
    assert_eq!(body, expected["body"], "{name}: body");
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[test]
fn search_test_vectors() {
    let raw = include_str!("../../test-vectors/search.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    let c = client();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let filters: ListingFilters = serde_json::from_value(case["filters"].clone()).unwrap();

        let req = c.build_search_listings(&filters);
        assert_eq!(req.method, HttpMethod::Get, "{name}: method");
        assert_eq!(
            req.path,
            format!("{BASE_URL}{}", case["expected_path"].as_str().unwrap()),
            "{name}: path"
        );
        assert!(req.body.is_none(), "{name}: no body");
    }
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[test]
fn login_test_vectors() {
    let raw = include_str!("../../test-vectors/login.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    let c = client();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let input: LoginInput = serde_json::from_value(case["input"].clone()).unwrap();

        let req = c.build_login(&input).unwrap();
        assert_json_request(name, &req, &case["expected_request"]);

        let auth = c.parse_login(simulated(case)).unwrap();
        let expected: AuthResponse = serde_json::from_value(case["expected_result"].clone()).unwrap();
        assert_eq!(auth, expected, "{name}: parsed result");
    }
}

// ---------------------------------------------------------------------------
// Create listing
// ---------------------------------------------------------------------------

#[test]
fn create_listing_test_vectors() {
    let raw = include_str!("../../test-vectors/create_listing.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    let c = client();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let input: CreateListing = serde_json::from_value(case["input"].clone()).unwrap();

        let req = c.build_create_listing(&input, &[]).unwrap();
        assert!(!req.is_multipart(), "{name}: json without photos");
        assert_json_request(name, &req, &case["expected_request"]);

        let listing = c.parse_create_listing(simulated(case)).unwrap();
        let expected: Listing = serde_json::from_value(case["expected_result"].clone()).unwrap();
        assert_eq!(listing, expected, "{name}: parsed result");
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn error_test_vectors() {
    let raw = include_str!("../../test-vectors/errors.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    let c = client();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let status = case["status"].as_u64().unwrap() as u16;
        let response = HttpResponse {
            status,
            headers: Vec::new(),
            body: case["body"].as_str().unwrap().to_string(),
        };

        let err = c.parse_get_listing(response).unwrap_err();
        assert_eq!(err.kind(), parse_kind(case["kind"].as_str().unwrap()), "{name}: kind");
        assert_eq!(err.status(), Some(status), "{name}: status");
        assert_eq!(err.server_message(), case["message"].as_str(), "{name}: message");
    }
}
