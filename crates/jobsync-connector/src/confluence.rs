//! Confluence activity adapter.
//!
//! Pages and blog posts the user created or last modified, plus comments
//! the user wrote, found through CQL search.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use jobsync_core::types::time::format_timestamp;
use jobsync_entity::account::{ConnectorAccount, ConnectorSource};
use jobsync_entity::record::RemoteRecord;

use crate::adapter::{FetchBatch, FetchRequest, SourceAdapter, SubResource};
use crate::atlassian::{Activity, AtlassianSite, epoch, lookback_days, since_for, user_ref};
use crate::error::AdapterError;
use crate::http::ApiClient;

const MAX_PAGES: usize = 100;

/// Confluence Cloud activity adapter.
#[derive(Debug, Clone)]
pub struct ConfluenceAdapter {
    http: ApiClient,
    page_size: u32,
    max_pages: usize,
}

/// Who "me" is and how far back to look.
struct Viewer<'a> {
    base_url: &'a str,
    me_id: Option<&'a str>,
    me_name: &'a str,
    since_ts: i64,
}

impl ConfluenceAdapter {
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

    /// Run a CQL search to exhaustion and return the content objects.
    async fn search(
        &self,
        site: &AtlassianSite,
        cql: &str,
        expand: &str,
    ) -> Result<Vec<Value>, AdapterError> {
        let mut contents = Vec::new();
        let mut start: u64 = 0;
        let mut exhausted = false;

        for _ in 0..self.max_pages {
            let mut url = reqwest::Url::parse(&format!("{}/wiki/rest/api/search", site.base_url))
                .map_err(|e| AdapterError::Config(format!("invalid base_url: {e}")))?;
            url.query_pairs_mut()
                .append_pair("cql", cql)
                .append_pair("start", &start.to_string())
                .append_pair("limit", &self.page_size.to_string())
                .append_pair("expand", expand);

            let page = self
                .http
                .send_json(|c| {
                    c.get(url.clone())
                        .basic_auth(&site.email, Some(&site.api_token))
                })
                .await?;

            let results = page
                .get("results")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if results.is_empty() {
                exhausted = true;
                break;
            }
            start += results.len() as u64;
            contents.extend(results.into_iter().filter_map(|result| {
                if result.get("content").is_some_and(Value::is_object) {
                    result.get("content").cloned()
                } else if result.is_object() {
                    Some(result)
                } else {
                    None
                }
            }));

            let total = page.get("totalSize").and_then(Value::as_u64).unwrap_or(0);
            if start >= total {
                exhausted = true;
                break;
            }
        }
        if !exhausted {
            return Err(AdapterError::page_limit(self.max_pages));
        }

        Ok(contents)
    }
}

#[async_trait]
impl SourceAdapter for ConfluenceAdapter {
    fn source(&self) -> ConnectorSource {
        ConnectorSource::Confluence
    }

    async fn list_sub_resources(
        &self,
        _account: &ConnectorAccount,
    ) -> Result<Vec<SubResource>, AdapterError> {
        Ok(vec![SubResource::activity()])
    }

    #[instrument(level = "debug", skip_all, fields(account_id = %account.account_id))]
    async fn fetch(
        &self,
        account: &ConnectorAccount,
        _sub: &SubResource,
        request: &FetchRequest,
    ) -> Result<FetchBatch, AdapterError> {
        let site = AtlassianSite::from_account(account)?;
        let started = Utc::now();
        let since = since_for(request)?;
        let days = lookback_days(since, started);

        let me = self
            .http
            .send_json(|c| {
                c.get(format!("{}/wiki/rest/api/user/current", site.base_url))
                    .basic_auth(&site.email, Some(&site.api_token))
            })
            .await?;
        let (me_id, me_name) = user_ref(&me);
        let viewer = Viewer {
            base_url: &site.base_url,
            me_id,
            me_name: me_name.unwrap_or(&site.email),
            since_ts: since.timestamp(),
        };

        let content_cql = format!(
            "type in (\"page\",\"blogpost\") AND (creator = currentUser() OR \
             lastmodifiedby = currentUser()) AND lastmodified >= now(\"-{days}d\") \
             ORDER BY lastmodified DESC"
        );
        let comment_cql = format!(
            "type = comment AND creator = currentUser() AND created >= now(\"-{days}d\") \
             ORDER BY created DESC"
        );

        let mut records = Vec::new();
        for content in self
            .search(&site, &content_cql, "content.history,content.version,content._links")
            .await?
        {
            records.extend(parse_content(&viewer, &content));
        }
        for comment in self
            .search(&site, &comment_cql, "content.history,content.container,content._links")
            .await?
        {
            records.extend(parse_comment(&viewer, &comment));
        }

        debug!(records = records.len(), days, "Fetched Confluence activity");
        Ok(FetchBatch {
            records,
            next_cursor: Some(format_timestamp(started)),
            full_window: match request {
                FetchRequest::Full { window } => Some(*window),
                FetchRequest::Incremental { .. } => None,
            },
        })
    }
}

fn web_url(base_url: &str, content: &Value) -> Option<String> {
    let webui = content
        .get("_links")
        .and_then(|l| l.get("webui"))
        .and_then(Value::as_str)?;
    if webui.starts_with("http") {
        Some(webui.to_string())
    } else {
        Some(format!("{base_url}/wiki{webui}"))
    }
}

fn parse_content(viewer: &Viewer<'_>, content: &Value) -> Vec<RemoteRecord> {
    let mut out = Vec::new();
    let null = Value::Null;
    let content_id = content.get("id").and_then(Value::as_str).unwrap_or("unknown");
    let content_type = content.get("type").and_then(Value::as_str).unwrap_or("page");
    let title = content
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("Untitled page");
    let url = web_url(viewer.base_url, content);

    let history = content.get("history").unwrap_or(&null);
    let (creator_id, creator_name) = user_ref(history.get("createdBy").unwrap_or(&null));
    let created_ts = epoch(history.get("createdDate"));

    let version = content.get("version").unwrap_or(&null);
    let (editor_id, editor_name) = user_ref(version.get("by").unwrap_or(&null));
    let updated_ts = epoch(version.get("when"));

    let activity = |event_id: String, kind: &str, description: &str, actor: Option<&str>, ts: i64| {
        Activity {
            event_id,
            event_type: format!("{content_type}.{kind}"),
            title: title.to_string(),
            description: Some(description.to_string()),
            url: url.clone(),
            actor: actor.or(Some(viewer.me_name)).map(str::to_string),
            status: None,
            event_ts: ts,
            raw: json!({"content_id": content_id, "type": content_type}),
            source: "confluence",
        }
        .into_record()
    };

    if let Some(ts) = created_ts {
        if ts >= viewer.since_ts && creator_id.is_some() && creator_id == viewer.me_id {
            out.push(activity(
                format!("confluence:created:{content_id}"),
                "created",
                "Content created",
                creator_name,
                ts,
            ));
        }
    }

    if let Some(ts) = updated_ts {
        let same_as_created = created_ts == Some(ts);
        if ts >= viewer.since_ts
            && editor_id.is_some()
            && editor_id == viewer.me_id
            && !same_as_created
        {
            let suffix = version
                .get("number")
                .and_then(Value::as_i64)
                .map(|n| format!(":{n}"))
                .unwrap_or_default();
            out.push(activity(
                format!("confluence:updated:{content_id}{suffix}"),
                "updated",
                "Content updated",
                editor_name,
                ts,
            ));
        }
    }

    out
}

fn parse_comment(viewer: &Viewer<'_>, content: &Value) -> Option<RemoteRecord> {
    let null = Value::Null;
    let history = content.get("history").unwrap_or(&null);
    let created_ts = epoch(history.get("createdDate"))?;
    if created_ts < viewer.since_ts {
        return None;
    }
    let (author_id, author_name) = user_ref(history.get("createdBy").unwrap_or(&null));
    if viewer.me_id.is_some() && author_id != viewer.me_id {
        return None;
    }

    let content_id = content.get("id").and_then(Value::as_str).unwrap_or("unknown");
    let container = content
        .get("container")
        .and_then(|c| c.get("title"))
        .and_then(Value::as_str);
    let description = match container {
        Some(title) => format!("Commented on {title}"),
        None => "Comment added".to_string(),
    };

    Some(
        Activity {
            event_id: format!("confluence:comment:{content_id}"),
            event_type: "comment.created".to_string(),
            title: content
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("Comment")
                .to_string(),
            description: Some(description),
            url: web_url(viewer.base_url, content),
            actor: author_name.or(Some(viewer.me_name)).map(str::to_string),
            status: None,
            event_ts: created_ts,
            raw: json!({"content_id": content_id, "container": container}),
            source: "confluence",
        }
        .into_record(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::tests::{serve, test_client};
    use axum::Router;
    use axum::routing::get;
    use chrono::Duration;
    use jobsync_core::types::AccountId;
    use jobsync_entity::sync::SyncWindow;

    fn account(base_url: &str) -> ConnectorAccount {
        ConnectorAccount {
            account_id: AccountId::from_string("acct_conf"),
            source: ConnectorSource::Confluence,
            display_name: "Confluence".into(),
            settings: json!({"base_url": base_url, "email": "me@example.com"}),
            credentials: json!({"api_token": "tok"}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn viewer() -> Viewer<'static> {
        Viewer {
            base_url: "https://acme.atlassian.net",
            me_id: Some("me"),
            me_name: "Me",
            since_ts: (Utc::now() - Duration::days(7)).timestamp(),
        }
    }

    #[test]
    fn test_page_created_and_updated() {
        let recent = format_timestamp(Utc::now() - Duration::hours(3));
        let later = format_timestamp(Utc::now() - Duration::hours(1));
        let page = json!({
            "id": "42",
            "type": "page",
            "title": "Runbook",
            "_links": {"webui": "/spaces/OPS/pages/42"},
            "history": {"createdDate": recent, "createdBy": {"accountId": "me"}},
            "version": {"when": later, "number": 3, "by": {"accountId": "me", "displayName": "Me"}}
        });

        let records = parse_content(&viewer(), &page);
        let ids: Vec<&str> = records.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, vec!["confluence:created:42", "confluence:updated:42:3"]);
        assert_eq!(records[0].record_type, "page.created");
        assert_eq!(
            records[0].url.as_deref(),
            Some("https://acme.atlassian.net/wiki/spaces/OPS/pages/42")
        );
    }

    #[test]
    fn test_comment_by_someone_else_is_ignored() {
        let recent = format_timestamp(Utc::now() - Duration::hours(3));
        let mut comment = json!({
            "id": "c9",
            "history": {"createdDate": recent, "createdBy": {"accountId": "other"}},
            "container": {"title": "Runbook"}
        });
        assert!(parse_comment(&viewer(), &comment).is_none());

        comment["history"]["createdBy"]["accountId"] = json!("me");
        let record = parse_comment(&viewer(), &comment).unwrap();
        assert_eq!(record.external_id, "confluence:comment:c9");
        assert_eq!(record.description.as_deref(), Some("Commented on Runbook"));
    }

    #[tokio::test]
    async fn test_search_exhausts_pages() {
        let router = Router::new()
            .route(
                "/wiki/rest/api/user/current",
                get(|| async { axum::Json(json!({"accountId": "me"})) }),
            )
            .route(
                "/wiki/rest/api/search",
                get(|| async { axum::Json(json!({"results": [], "totalSize": 0})) }),
            );
        let base = serve(router).await;

        let adapter = ConfluenceAdapter::new(test_client(), 25);
        let window = SyncWindow::around(Utc::now(), 7, 0);
        let batch = adapter
            .fetch(&account(&base), &SubResource::activity(), &FetchRequest::Full { window })
            .await
            .unwrap();
        assert!(batch.records.is_empty());
        assert_eq!(batch.full_window, Some(window));
    }

    #[tokio::test]
    async fn test_endless_pagination_is_an_error() {
        let router = Router::new()
            .route(
                "/wiki/rest/api/user/current",
                get(|| async { axum::Json(json!({"accountId": "me"})) }),
            )
            .route(
                "/wiki/rest/api/search",
                get(|| async {
                    axum::Json(json!({"results": [{"content": {"id": "1", "type": "page"}}],
                        "totalSize": 1_000_000}))
                }),
            );
        let base = serve(router).await;

        let adapter = ConfluenceAdapter::new(test_client(), 25).with_max_pages(2);
        let window = SyncWindow::around(Utc::now(), 7, 0);
        let err = adapter
            .fetch(&account(&base), &SubResource::activity(), &FetchRequest::Full { window })
            .await
            .unwrap_err();
        assert_eq!(err, AdapterError::page_limit(2));
    }
}
