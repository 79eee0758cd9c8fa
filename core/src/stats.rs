//! Aggregate listing statistics for the admin dashboard.
//!
//! The API has no aggregate endpoint for these numbers, so they are computed
//! client-side from every listing, fetched page by page.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::debug;

use crate::api::Api;
use crate::error::ApiError;
use crate::types::{Listing, ListingFilters};

const PAGE_SIZE: u32 = 100;
const RECENT_DAYS: i64 = 30;
const TOP_LOCATIONS: usize = 5;
const UNKNOWN_TYPE: &str = "Не указан";
const UNKNOWN_LOCATION: &str = "Не указано";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationCount {
    pub location: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_listings: u64,
    pub last_30_days: u64,
    pub by_type: BTreeMap<String, u64>,
    pub top_locations: Vec<LocationCount>,
}

/// Fetch every listing and summarize them relative to `now`.
pub async fn admin_stats(api: &Api, now: DateTime<Utc>) -> Result<AdminStats, ApiError> {
    let mut all = Vec::new();
    let mut offset = 0;
    loop {
        let filters = ListingFilters {
            limit: Some(PAGE_SIZE),
            offset: Some(offset),
            ..ListingFilters::default()
        };
        let page = api.search_listings(&filters).await?;
        let fetched = page.listings.len();
        all.extend(page.listings);
        debug!(offset, fetched, has_next = page.has_next, "fetched listings page");
        if !page.has_next || fetched == 0 {
            break;
        }
        offset += PAGE_SIZE;
    }
    Ok(summarize(&all, now))
}

pub fn summarize(listings: &[Listing], now: DateTime<Utc>) -> AdminStats {
    let cutoff = now - Duration::days(RECENT_DAYS);
    let mut by_type = BTreeMap::new();
    let mut by_location: HashMap<String, u64> = HashMap::new();
    let mut last_30_days = 0;

    for listing in listings {
        *by_type.entry(bucket(&listing.animal_type, UNKNOWN_TYPE)).or_insert(0) += 1;
        *by_location.entry(bucket(&listing.location, UNKNOWN_LOCATION)).or_insert(0) += 1;

        let date = if listing.created_at.trim().is_empty() {
            &listing.date_lost
        } else {
            &listing.created_at
        };
        if parse_timestamp(date).is_some_and(|at| at >= cutoff) {
            last_30_days += 1;
        }
    }

    let mut top_locations: Vec<LocationCount> = by_location
        .into_iter()
        .map(|(location, count)| LocationCount { location, count })
        .collect();
    top_locations.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.location.cmp(&b.location)));
    top_locations.truncate(TOP_LOCATIONS);

    AdminStats {
        total_listings: listings.len() as u64,
        last_30_days,
        by_type,
        top_locations,
    }
}

fn bucket(value: &str, unknown: &str) -> String {
    let value = value.trim();
    if value.is_empty() { unknown } else { value }.to_string()
}

/// RFC 3339 timestamps, or plain days taken as UTC midnight.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::testing::{api_with, ScriptedTransport};

    fn listing(id: &str, animal_type: &str, location: &str, created_at: &str) -> Listing {
        Listing {
            id: id.to_string(),
            title: "t".to_string(),
            description: "d".to_string(),
            animal_type: animal_type.to_string(),
            breed: None,
            location: location.to_string(),
            photos: Vec::new(),
            date_lost: "2024-05-20".to_string(),
            contact_phone: "+7".to_string(),
            user_id: "u1".to_string(),
            created_at: created_at.to_string(),
            updated_at: created_at.to_string(),
            is_favorite: None,
        }
    }

    fn now() -> DateTime<Utc> {
        "2024-06-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn counts_types_locations_and_recent() {
        let listings = vec![
            listing("1", "Собака", "Москва", "2024-05-30T10:00:00Z"),
            listing("2", "Собака", "Москва", "2024-01-01T10:00:00Z"),
            listing("3", "Кошка", "Тверь", "2024-05-15T10:00:00+03:00"),
            listing("4", "", "", "garbage"),
            listing("5", "Кошка", "Москва", ""),
        ];

        let stats = summarize(&listings, now());

        assert_eq!(stats.total_listings, 5);
        assert_eq!(stats.last_30_days, 3, "1, 3 and 5 (via dateLost)");
        assert_eq!(stats.by_type.get("Собака"), Some(&2));
        assert_eq!(stats.by_type.get("Кошка"), Some(&2));
        assert_eq!(stats.by_type.get(UNKNOWN_TYPE), Some(&1));
        assert_eq!(
            stats.top_locations[0],
            LocationCount {
                location: "Москва".to_string(),
                count: 3
            }
        );
        assert_eq!(stats.top_locations.len(), 3);
    }

    #[test]
    fn top_locations_are_capped_and_tie_broken_by_name() {
        let listings: Vec<Listing> = ["Е", "Д", "Г", "В", "Б", "А"]
            .iter()
            .enumerate()
            .map(|(i, loc)| listing(&i.to_string(), "Собака", loc, ""))
            .collect();
        let stats = summarize(&listings, now());
        let names: Vec<&str> = stats.top_locations.iter().map(|l| l.location.as_str()).collect();
        assert_eq!(names, vec!["А", "Б", "В", "Г", "Д"]);
    }

    #[tokio::test]
    async fn pages_until_has_next_is_false() {
        let one = serde_json::to_string(&listing("1", "Собака", "Орёл", "2024-05-31T00:00:00Z")).unwrap();
        let transport = Arc::new(ScriptedTransport::default());
        transport
            .reply(
                200,
                &format!(r#"{{"listings":[{one}],"total":2,"limit":100,"offset":0,"hasNext":true}}"#),
            )
            .reply(
                200,
                &format!(r#"{{"listings":[{one}],"total":2,"limit":100,"offset":100,"hasNext":false}}"#),
            );

        let stats = admin_stats(&api_with(transport.clone()), now()).await.unwrap();

        assert_eq!(stats.total_listings, 2);
        let paths: Vec<String> = transport.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(
            paths,
            vec![
                "http://api.test/api/listings?limit=100&offset=0",
                "http://api.test/api/listings?limit=100&offset=100",
            ]
        );
    }

    #[tokio::test]
    async fn page_failure_propagates() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.reply(503, "");
        let err = admin_stats(&api_with(transport), now()).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }
}
