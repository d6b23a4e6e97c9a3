//! Jira activity adapter.
//!
//! Reports the issues the user created, was assigned, or commented on as
//! activity records: creation, status transitions, comments, and updates.

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
const FIELDS: [&str; 8] = [
    "summary", "created", "updated", "status", "creator", "reporter", "assignee", "comment",
];

/// Jira Cloud activity adapter.
#[derive(Debug, Clone)]
pub struct JiraAdapter {
    http: ApiClient,
    page_size: u32,
    max_pages: usize,
}

impl JiraAdapter {
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

    fn search_body(&self, days: i64, next_page_token: Option<&str>) -> Value {
        let jql = format!(
            "(creator = currentUser() OR reporter = currentUser() OR assignee = currentUser() \
             OR commenter = currentUser()) AND updated >= -{days}d ORDER BY updated DESC"
        );
        let mut body = json!({
            "jql": jql,
            "maxResults": self.page_size,
            "fieldsByKeys": false,
            "fields": FIELDS,
        });
        if let Some(token) = next_page_token {
            body["nextPageToken"] = json!(token);
        }
        body
    }
}

#[async_trait]
impl SourceAdapter for JiraAdapter {
    fn source(&self) -> ConnectorSource {
        ConnectorSource::Jira
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
        let since_ts = since.timestamp();
        let days = lookback_days(since, started);

        let me = self
            .http
            .send_json(|c| {
                c.get(format!("{}/rest/api/3/myself", site.base_url))
                    .basic_auth(&site.email, Some(&site.api_token))
            })
            .await?;
        let (me_id, me_name) = user_ref(&me);
        let me_name = me_name.unwrap_or(&site.email);

        let search_url = format!("{}/rest/api/3/search/jql?expand=changelog", site.base_url);
        let mut records = Vec::new();
        let mut next_page_token: Option<String> = None;
        let mut exhausted = false;
        for _ in 0..self.max_pages {
            let body = self.search_body(days, next_page_token.as_deref());
            let page = self
                .http
                .send_json(|c| {
                    c.post(&search_url)
                        .basic_auth(&site.email, Some(&site.api_token))
                        .json(&body)
                })
                .await?;

            let issues = page
                .get("issues")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if issues.is_empty() {
                exhausted = true;
                break;
            }
            for issue in &issues {
                records.extend(parse_issue(&issue_context(&site, me_id, me_name, since_ts), issue));
            }

            next_page_token = page
                .get("nextPageToken")
                .and_then(Value::as_str)
                .map(str::to_string);
            let is_last = page.get("isLast").and_then(Value::as_bool).unwrap_or(false);
            if is_last || next_page_token.is_none() {
                exhausted = true;
                break;
            }
        }
        if !exhausted {
            return Err(AdapterError::page_limit(self.max_pages));
        }

        debug!(records = records.len(), days, "Fetched Jira activity");
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

struct IssueContext<'a> {
    base_url: &'a str,
    me_id: Option<&'a str>,
    me_name: &'a str,
    since_ts: i64,
}

fn issue_context<'a>(
    site: &'a AtlassianSite,
    me_id: Option<&'a str>,
    me_name: &'a str,
    since_ts: i64,
) -> IssueContext<'a> {
    IssueContext {
        base_url: &site.base_url,
        me_id,
        me_name,
        since_ts,
    }
}

fn parse_issue(ctx: &IssueContext<'_>, issue: &Value) -> Vec<RemoteRecord> {
    let mut out = Vec::new();
    let null = Value::Null;
    let fields = issue.get("fields").unwrap_or(&null);
    let issue_id = issue.get("id").and_then(Value::as_str).unwrap_or("unknown");
    let issue_key = issue.get("key").and_then(Value::as_str);
    let summary = fields
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or("Untitled issue");
    let title = match issue_key {
        Some(key) => format!("{key}: {summary}"),
        None => summary.to_string(),
    };
    let url = issue_key.map(|key| format!("{}/browse/{key}", ctx.base_url));
    let (assignee_id, _) = user_ref(fields.get("assignee").unwrap_or(&null));
    let assigned_to_me = ctx.me_id.is_some() && assignee_id == ctx.me_id;
    let status_name = fields
        .get("status")
        .and_then(|s| s.get("name"))
        .and_then(Value::as_str);
    let mine = |author: Option<&str>| ctx.me_id.is_none() || assigned_to_me || author == ctx.me_id;

    let activity = |event_id: String, event_type: &str, description: String, actor: Option<&str>, ts: i64, raw: Value| {
        Activity {
            event_id,
            event_type: event_type.to_string(),
            title: title.clone(),
            description: Some(description),
            url: url.clone(),
            actor: actor.map(str::to_string),
            status: status_name.map(str::to_string),
            event_ts: ts,
            raw,
            source: "jira",
        }
        .into_record()
    };

    let (creator_id, creator_name) = user_ref(fields.get("creator").unwrap_or(&null));
    if let Some(created_ts) = epoch(fields.get("created")) {
        if creator_id.is_some() && creator_id == ctx.me_id && created_ts >= ctx.since_ts {
            out.push(activity(
                format!("jira:issue:created:{issue_id}"),
                "issue.created",
                "Issue created".to_string(),
                creator_name.or(Some(ctx.me_name)),
                created_ts,
                json!({"issue": issue_key, "summary": summary}),
            ));
        }
    }

    let histories = issue
        .get("changelog")
        .and_then(|c| c.get("histories"))
        .and_then(Value::as_array);
    for history in histories.into_iter().flatten() {
        let (author_id, author_name) = user_ref(history.get("author").unwrap_or(&null));
        if !mine(author_id) {
            continue;
        }
        let Some(history_ts) = epoch(history.get("created")) else {
            continue;
        };
        if history_ts < ctx.since_ts {
            continue;
        }
        let history_id = history.get("id").and_then(Value::as_str).unwrap_or("unknown");
        let items = history.get("items").and_then(Value::as_array);
        for item in items.into_iter().flatten() {
            if item.get("field").and_then(Value::as_str) != Some("status") {
                continue;
            }
            let from = item.get("fromString").and_then(Value::as_str).unwrap_or("unknown");
            let to = item.get("toString").and_then(Value::as_str).unwrap_or("unknown");
            let item_key = item.get("to").and_then(Value::as_str).unwrap_or(to);
            out.push(activity(
                format!("jira:status:{history_id}:{issue_id}:{item_key}"),
                "issue.status.changed",
                format!("Status: {from} -> {to}"),
                author_name.or(Some(ctx.me_name)),
                history_ts,
                json!({"issue": issue_key, "from": from, "to": to}),
            ));
        }
    }

    let comments = fields
        .get("comment")
        .and_then(|c| c.get("comments"))
        .and_then(Value::as_array);
    for comment in comments.into_iter().flatten() {
        let (author_id, author_name) = user_ref(comment.get("author").unwrap_or(&null));
        if !mine(author_id) {
            continue;
        }
        let Some(created_ts) = epoch(comment.get("created")) else {
            continue;
        };
        if created_ts < ctx.since_ts {
            continue;
        }
        let comment_id = comment.get("id").and_then(Value::as_str).unwrap_or("unknown");
        out.push(activity(
            format!("jira:comment:{comment_id}"),
            "issue.commented",
            "Comment added".to_string(),
            author_name.or(Some(ctx.me_name)),
            created_ts,
            json!({"issue": issue_key, "comment_id": comment_id}),
        ));
    }

    if let Some(updated_ts) = epoch(fields.get("updated")) {
        if updated_ts >= ctx.since_ts {
            let description = match status_name {
                Some(status) => format!("Updated (status: {status})"),
                None => "Updated".to_string(),
            };
            out.push(activity(
                format!("jira:issue:updated:{issue_id}:{updated_ts}"),
                "issue.updated",
                description,
                None,
                updated_ts,
                json!({"issue": issue_key, "status": status_name}),
            ));
        }
    }

    out
}
