//! Slack workspace statistics over raw HTTP.
//!
//! Slack paginates with an opaque cursor in `response_metadata.next_cursor`
//! instead of Link headers; an empty cursor ends the chain. Active
//! membership uses the billing view of the workspace, which is the official
//! definition of an active seat and requires an admin user token.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use backon::Retryable;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::collect::records::{WorkspaceStatsRecord, WorkspaceUserDetail};
use crate::collect::{CollectProgress, DomainOutcome, ProgressCallback, emit};
use crate::http::{HttpRequest, HttpTransport, reqwest_transport::ReqwestTransport};
use crate::ratelimit::RetryPolicy;

pub const DOMAIN: &str = "workspace_stats";

/// Default Slack Web API root.
pub const SLACK_API_ROOT: &str = "https://slack.com/api";

/// Page size for cursor pagination.
const PAGE_LIMIT: u32 = 1000;

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("slack transport error: {0}")]
    Http(String),

    #[error("slack API error ({status})")]
    Status { status: u16 },

    /// `ok: false` envelope with Slack's error code.
    #[error("slack API refused {method}: {code}")]
    Refused { method: String, code: String },

    #[error("slack rate limit hit, retry after {retry_after_secs}s")]
    Throttled { retry_after_secs: u64 },

    #[error("slack decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SlackError {
    fn is_transient(&self) -> bool {
        match self {
            SlackError::Http(_) => true,
            SlackError::Status { status } => *status >= 500,
            _ => false,
        }
    }
}

/// One workspace member from `users.list`.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub real_name_normalized: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub profile: SlackProfile,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackProfile {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct SlackClient {
    transport: Arc<dyn HttpTransport>,
    api_root: String,
    token: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackClient")
            .field("api_root", &self.api_root)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl SlackClient {
    pub fn new(token: &str) -> Result<Self, SlackError> {
        let transport = ReqwestTransport::with_timeout(StdDuration::from_secs(60))
            .map_err(|e| SlackError::Http(e.to_string()))?;
        Self::with_transport(token, SLACK_API_ROOT, RetryPolicy::default(), Arc::new(transport))
    }

    pub fn with_transport(
        token: &str,
        api_root: &str,
        retry: RetryPolicy,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, SlackError> {
        if token.trim().is_empty() {
            return Err(SlackError::Config(
                "Slack API token is not configured".to_string(),
            ));
        }
        Ok(Self {
            transport,
            api_root: api_root.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retry,
        })
    }

    /// Call one Web API method. The envelope's `ok` field is authoritative:
    /// an `ok: false` body on a 200 is still a refusal.
    pub async fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Value, SlackError> {
        let mut url = format!("{}/{method}", self.api_root);
        for (i, (key, value)) in params.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(key);
            url.push('=');
            url.push_str(value);
        }
        let headers = vec![(
            "Authorization".to_string(),
            format!("Bearer {}", self.token),
        )];

        let transport = Arc::clone(&self.transport);
        let method_name = method.to_string();
        let op = || {
            let transport = Arc::clone(&transport);
            let url = url.clone();
            let headers = headers.clone();
            let method_name = method_name.clone();
            async move {
                let response = transport
                    .send(HttpRequest::get(url, headers))
                    .await
                    .map_err(|e| SlackError::Http(e.to_string()))?;

                if response.status == 429 {
                    let retry_after_secs = response
                        .header("retry-after")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(60);
                    return Err(SlackError::Throttled { retry_after_secs });
                }
                if !response.is_success() {
                    return Err(SlackError::Status {
                        status: response.status,
                    });
                }

                let body: Value = serde_json::from_slice(&response.body)?;
                if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
                    let code = body
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown_error")
                        .to_string();
                    return Err(SlackError::Refused {
                        method: method_name,
                        code,
                    });
                }
                Ok(body)
            }
        };

        op.retry(self.retry.clone().into_backoff())
            .when(|e: &SlackError| e.is_transient())
            .notify(|err: &SlackError, dur| {
                tracing::debug!(delay = ?dur, error = %err, "retrying slack call");
            })
            .await
    }

    /// Follow the cursor chain of `method`, concatenating the array under
    /// `data_key` from each page.
    pub async fn paginate(
        &self,
        method: &str,
        data_key: &str,
    ) -> Result<Vec<Value>, SlackError> {
        let mut all: Vec<Value> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut params = vec![("limit", PAGE_LIMIT.to_string())];
            if let Some(ref c) = cursor {
                params.push(("cursor", c.clone()));
            }
            let body = self.call(method, &params).await?;

            if let Some(batch) = body.get(data_key).and_then(Value::as_array) {
                all.extend(batch.iter().cloned());
            }
            tracing::debug!(method, total = all.len(), "retrieved slack page");

            cursor = body
                .get("response_metadata")
                .and_then(|m| m.get("next_cursor"))
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(String::from);
            if cursor.is_none() {
                break;
            }
        }

        Ok(all)
    }

    /// Verify the token before any paginated work.
    pub async fn auth_test(&self) -> Result<(), SlackError> {
        let body = self.call("auth.test", &[]).await?;
        tracing::info!(
            user = body.get("user").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            team = body.get("team").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            "slack authentication successful"
        );
        Ok(())
    }

    /// Billing-active user ids, restricted to `valid_user_ids`.
    ///
    /// `team.billableInfo` pages a map rather than an array, so it does not
    /// go through [`Self::paginate`].
    pub async fn billing_active_users(
        &self,
        valid_user_ids: &HashSet<String>,
    ) -> Result<HashSet<String>, SlackError> {
        let mut billing: HashMap<String, bool> = HashMap::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut params = vec![("limit", PAGE_LIMIT.to_string())];
            if let Some(ref c) = cursor {
                params.push(("cursor", c.clone()));
            }
            let body = self.call("team.billableInfo", &params).await?;

            if let Some(map) = body.get("billable_info").and_then(Value::as_object) {
                for (user_id, info) in map {
                    let active = info
                        .get("billing_active")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    billing.insert(user_id.clone(), active);
                }
            }

            cursor = body
                .get("response_metadata")
                .and_then(|m| m.get("next_cursor"))
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(String::from);
            if cursor.is_none() {
                break;
            }
        }

        tracing::info!(users = billing.len(), "retrieved billing info");
        Ok(billing
            .into_iter()
            .filter(|(id, active)| *active && valid_user_ids.contains(id))
            .map(|(id, _)| id)
            .collect())
    }
}

/// Collect one workspace-stats record.
pub async fn collect_workspace_stats(
    client: &SlackClient,
    on_progress: Option<&ProgressCallback>,
) -> Result<(Vec<WorkspaceStatsRecord>, DomainOutcome), SlackError> {
    client.auth_test().await?;
    emit(
        on_progress,
        CollectProgress::DomainStarted {
            domain: DOMAIN,
            entities: 1,
        },
    );

    let members_raw = client.paginate("users.list", "members").await?;
    let members: Vec<SlackUser> = members_raw
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();

    let active_accounts: Vec<&SlackUser> = members.iter().filter(|u| !u.deleted).collect();
    let valid_user_ids: HashSet<String> =
        active_accounts.iter().map(|u| u.id.clone()).collect();
    tracing::info!(total = active_accounts.len(), "retrieved workspace members");

    let active_ids = client.billing_active_users(&valid_user_ids).await?;
    let active_users = active_ids.len();
    let inactive_users = active_accounts.len() - active_users;
    tracing::info!(active_users, inactive_users, "classified workspace members");

    let user_details = active_accounts
        .iter()
        .map(|user| WorkspaceUserDetail {
            id: user.id.clone(),
            name: user
                .real_name_normalized
                .clone()
                .unwrap_or_else(|| user.name.clone()),
            email: user.profile.email.clone(),
            is_admin: user.is_admin,
            is_bot: user.is_bot,
            is_active: active_ids.contains(&user.id),
        })
        .collect();

    let records = vec![WorkspaceStatsRecord {
        timestamp: Utc::now(),
        total_users: active_accounts.len(),
        active_users,
        inactive_users,
        user_details,
    }];

    let mut outcome = DomainOutcome::new(DOMAIN);
    outcome.succeeded = 1;
    outcome.rows = records.len();
    emit(
        on_progress,
        CollectProgress::DomainComplete {
            domain: DOMAIN,
            rows: outcome.rows,
            succeeded: outcome.succeeded,
            skipped: outcome.skipped,
        },
    );

    Ok((records, outcome))
}
