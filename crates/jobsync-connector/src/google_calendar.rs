//! Google Calendar adapter.
//!
//! Each calendar in the account's calendar list is a sub-resource with its
//! own `nextSyncToken` cursor. Full fetches list expanded single events in
//! the window; incremental fetches replay changes since the sync token,
//! including cancellations.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Url;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use jobsync_core::types::time::{format_timestamp, parse_timestamp};
use jobsync_entity::account::{ConnectorAccount, ConnectorSource};
use jobsync_entity::record::RemoteRecord;

use crate::adapter::{FetchBatch, FetchRequest, SourceAdapter, SubResource};
use crate::error::AdapterError;
use crate::http::ApiClient;

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const MAX_PAGES: usize = 100;

/// Google Calendar v3 adapter.
#[derive(Debug, Clone)]
pub struct GoogleCalendarAdapter {
    http: ApiClient,
    page_size: u32,
    max_pages: usize,
}

impl GoogleCalendarAdapter {
    pub fn new(http: ApiClient, page_size: u32) -> Self {
        Self {
            http,
            page_size,
            max_pages: MAX_PAGES,
        }
    }

    /// Cap on page requests per listing.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    fn api_url(account: &ConnectorAccount, segments: &[&str]) -> Result<Url, AdapterError> {
        let base = account.setting("api_base").unwrap_or(DEFAULT_API_BASE);
        let mut url = Url::parse(base.trim_end_matches('/'))
            .map_err(|e| AdapterError::Config(format!("invalid api_base: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| AdapterError::Config("api_base cannot be a base URL".into()))?
            .extend(segments);
        Ok(url)
    }

    fn access_token(account: &ConnectorAccount) -> Result<&str, AdapterError> {
        account.credential("access_token").ok_or_else(|| {
            AdapterError::Auth(
                "no access token found for this calendar account; reconnect it".into(),
            )
        })
    }
}

#[async_trait]
impl SourceAdapter for GoogleCalendarAdapter {
    fn source(&self) -> ConnectorSource {
        ConnectorSource::Calendar
    }

    #[instrument(level = "debug", skip_all, fields(account_id = %account.account_id))]
    async fn list_sub_resources(
        &self,
        account: &ConnectorAccount,
    ) -> Result<Vec<SubResource>, AdapterError> {
        let token = Self::access_token(account)?;
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..self.max_pages {
            let mut url = Self::api_url(account, &["users", "me", "calendarList"])?;
            if let Some(page) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", page);
            }
            let body = self
                .http
                .send_json(|c| c.get(url.clone()).bearer_auth(token))
                .await?;

            let items = body.get("items").and_then(Value::as_array);
            for item in items.into_iter().flatten() {
                let Some(id) = item.get("id").and_then(Value::as_str) else {
                    continue;
                };
                calendars.push(SubResource {
                    id: id.to_string(),
                    name: item
                        .get("summary")
                        .and_then(Value::as_str)
                        .unwrap_or(id)
                        .to_string(),
                    time_zone: item
                        .get("timeZone")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                });
            }

            page_token = body
                .get("nextPageToken")
                .and_then(Value::as_str)
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }
        if page_token.is_some() {
            return Err(AdapterError::page_limit(self.max_pages));
        }

        Ok(calendars)
    }

    #[instrument(level = "debug", skip_all, fields(account_id = %account.account_id, calendar = %sub.id))]
    async fn fetch(
        &self,
        account: &ConnectorAccount,
        sub: &SubResource,
        request: &FetchRequest,
    ) -> Result<FetchBatch, AdapterError> {
        let token = Self::access_token(account)?;
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        let mut next_sync_token = None;

        for _ in 0..self.max_pages {
            let mut url = Self::api_url(account, &["calendars", sub.id.as_str(), "events"])?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("singleEvents", "true")
                    .append_pair("showDeleted", "true")
                    .append_pair("maxResults", &self.page_size.to_string());
                match request {
                    FetchRequest::Incremental { cursor } => {
                        query.append_pair("syncToken", cursor);
                    }
                    FetchRequest::Full { window } => {
                        query
                            .append_pair("timeMin", &format_timestamp(window.start))
                            .append_pair("timeMax", &format_timestamp(window.end));
                    }
                }
                if let Some(page) = &page_token {
                    query.append_pair("pageToken", page);
                }
            }

            let body = self
                .http
                .send_json(|c| c.get(url.clone()).bearer_auth(token))
                .await?;

            let items = body.get("items").and_then(Value::as_array);
            records.extend(
                items
                    .into_iter()
                    .flatten()
                    .filter_map(|item| parse_event(item, sub)),
            );

            page_token = body
                .get("nextPageToken")
                .and_then(Value::as_str)
                .map(str::to_string);
            if page_token.is_none() {
                next_sync_token = body
                    .get("nextSyncToken")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                break;
            }
        }
        if page_token.is_some() {
            return Err(AdapterError::page_limit(self.max_pages));
        }

        debug!(records = records.len(), "Fetched calendar events");
        Ok(FetchBatch {
            records,
            next_cursor: next_sync_token,
            full_window: match request {
                FetchRequest::Full { window } => Some(*window),
                FetchRequest::Incremental { .. } => None,
            },
        })
    }
}

/// Start or end of an event: all-day `date` (midnight UTC) or `dateTime`.
fn event_time(value: Option<&Value>) -> (Option<DateTime<Utc>>, bool) {
    let Some(value) = value else {
        return (None, false);
    };
    if let Some(date) = value.get("date").and_then(Value::as_str) {
        let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());
        return (parsed, true);
    }
    let parsed = value
        .get("dateTime")
        .and_then(Value::as_str)
        .and_then(parse_timestamp);
    (parsed, false)
}

fn conference_url(item: &Value) -> Option<String> {
    if let Some(link) = item.get("hangoutLink").and_then(Value::as_str) {
        return Some(link.to_string());
    }
    item.get("conferenceData")
        .and_then(|c| c.get("entryPoints"))
        .and_then(Value::as_array)?
        .iter()
        .find_map(|entry| entry.get("uri").and_then(Value::as_str))
        .map(str::to_string)
}

fn parse_event(item: &Value, calendar: &SubResource) -> Option<RemoteRecord> {
    let id = item.get("id").and_then(Value::as_str)?;
    let status = item
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("confirmed");
    if status == "cancelled" {
        return Some(RemoteRecord::removed(id));
    }

    let (starts_at, all_day) = event_time(item.get("start"));
    let (ends_at, _) = event_time(item.get("end"));
    let organizer = item.get("organizer");
    let actor = organizer
        .and_then(|o| o.get("displayName").or_else(|| o.get("email")))
        .and_then(Value::as_str)
        .map(str::to_string);
    let time_zone = item
        .get("start")
        .and_then(|s| s.get("timeZone"))
        .and_then(Value::as_str)
        .or(calendar.time_zone.as_deref());

    Some(RemoteRecord {
        external_id: id.to_string(),
        record_type: "event".to_string(),
        title: item
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or("(No title)")
            .to_string(),
        description: item
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        url: item
            .get("htmlLink")
            .and_then(Value::as_str)
            .map(str::to_string),
        actor,
        status: Some(status.to_string()),
        starts_at,
        ends_at,
        data: json!({
            "calendar_id": calendar.id,
            "all_day": all_day,
            "location": item.get("location"),
            "visibility": item.get("visibility"),
            "organizer": organizer,
            "attendees": item.get("attendees"),
            "conference_url": conference_url(item),
            "time_zone": time_zone,
            "remote_updated_at": item.get("updated"),
        }),
        removed: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::tests::{serve, test_client};
    use axum::Router;
    use axum::extract::Query;
    use axum::routing::get;
    use jobsync_core::types::AccountId;
    use jobsync_entity::sync::SyncWindow;
    use std::collections::HashMap;

    fn account(api_base: &str) -> ConnectorAccount {
        ConnectorAccount {
            account_id: AccountId::from_string("acct_cal"),
            source: ConnectorSource::Calendar,
            display_name: "Work calendar".into(),
            settings: json!({"api_base": api_base}),
            credentials: json!({"access_token": "ya29"}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_all_day_and_cancelled() {
        let cal = SubResource {
            id: "primary".into(),
            name: "Primary".into(),
            time_zone: Some("Europe/Berlin".into()),
        };
        let all_day = parse_event(
            &json!({"id": "e1", "summary": "Offsite", "start": {"date": "2024-05-01"}, "end": {"date": "2024-05-02"}}),
            &cal,
        )
        .unwrap();
        assert_eq!(all_day.starts_ts(), Some(1_714_521_600));
        assert_eq!(all_day.data["all_day"], true);
        assert_eq!(all_day.data["time_zone"], "Europe/Berlin");

        let cancelled = parse_event(&json!({"id": "e2", "status": "cancelled"}), &cal).unwrap();
        assert!(cancelled.removed);
        assert!(parse_event(&json!({"summary": "no id"}), &cal).is_none());
    }

    #[tokio::test]
    async fn test_list_and_fetch_against_server() {
        let router = Router::new()
            .route(
                "/users/me/calendarList",
                get(|| async {
                    axum::Json(json!({"items": [{"id": "team@group", "summary": "Team", "timeZone": "UTC"}]}))
                }),
            )
            .route(
                "/calendars/{calendar_id}/events",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    if q.get("syncToken").map(String::as_str) == Some("sync-1") {
                        axum::Json(json!({"items": [{"id": "a", "status": "cancelled"}], "nextSyncToken": "sync-2"}))
                    } else if q.contains_key("pageToken") {
                        axum::Json(json!({"items": [{"id": "b", "summary": "Retro",
                            "start": {"dateTime": "2024-05-02T10:00:00Z"}, "end": {"dateTime": "2024-05-02T11:00:00Z"}}],
                            "nextSyncToken": "sync-1"}))
                    } else {
                        assert!(q.contains_key("timeMin"));
                        axum::Json(json!({"items": [{"id": "a", "summary": "Standup",
                            "start": {"dateTime": "2024-05-01T09:00:00+02:00"}}],
                            "nextPageToken": "p2"}))
                    }
                }),
            );
        let base = serve(router).await;
        let adapter = GoogleCalendarAdapter::new(test_client(), 50);
        let acct = account(&base);

        let calendars = adapter.list_sub_resources(&acct).await.unwrap();
        assert_eq!(calendars.len(), 1);
        assert_eq!(calendars[0].id, "team@group");

        let window = SyncWindow::around(Utc::now(), 30, 90);
        let full = adapter
            .fetch(&acct, &calendars[0], &FetchRequest::Full { window })
            .await
            .unwrap();
        assert_eq!(full.records.len(), 2);
        assert_eq!(full.next_cursor.as_deref(), Some("sync-1"));
        assert_eq!(full.full_window, Some(window));
        assert_eq!(full.records[0].starts_ts(), Some(1_714_546_800));

        let incremental = adapter
            .fetch(
                &acct,
                &calendars[0],
                &FetchRequest::Incremental {
                    cursor: "sync-1".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(incremental.records, vec![RemoteRecord::removed("a")]);
        assert_eq!(incremental.next_cursor.as_deref(), Some("sync-2"));
        assert!(incremental.full_window.is_none());
    }

    #[tokio::test]
    async fn test_endless_pagination_is_an_error() {
        let router = Router::new()
            .route(
                "/users/me/calendarList",
                get(|| async {
                    axum::Json(json!({"items": [{"id": "team@group"}], "nextPageToken": "more"}))
                }),
            )
            .route(
                "/calendars/{calendar_id}/events",
                get(|| async {
                    axum::Json(json!({"items": [{"id": "a", "summary": "Standup",
                        "start": {"dateTime": "2024-05-01T09:00:00Z"}}],
                        "nextPageToken": "more"}))
                }),
            );
        let base = serve(router).await;
        let adapter = GoogleCalendarAdapter::new(test_client(), 50).with_max_pages(3);
        let acct = account(&base);

        let err = adapter.list_sub_resources(&acct).await.unwrap_err();
        assert_eq!(err, AdapterError::page_limit(3));

        let window = SyncWindow::around(Utc::now(), 30, 90);
        let err = adapter
            .fetch(&acct, &SubResource::activity(), &FetchRequest::Full { window })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "transient");
    }

    #[tokio::test]
    async fn test_missing_access_token() {
        let mut acct = account("http://127.0.0.1:1");
        acct.credentials = json!({"refresh_token": "r"});
        let adapter = GoogleCalendarAdapter::new(test_client(), 50);
        let err = adapter.list_sub_resources(&acct).await.unwrap_err();
        assert!(matches!(err, AdapterError::Auth(_)));
    }
}
