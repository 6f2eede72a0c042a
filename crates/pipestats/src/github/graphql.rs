//! Cursor pagination over the GraphQL endpoint.
//!
//! The GraphQL side of the API paginates with `pageInfo.endCursor` /
//! `pageInfo.hasNextPage` instead of Link headers, but maps onto the same
//! contract as the REST paginator: follow the continuation signal until it
//! runs out, accumulate nodes in fetch order.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::http::HttpRequest;

use super::client::GithubClient;
use super::error::GithubError;

impl GithubClient {
    /// Execute one GraphQL query. A 200 response carrying an `errors` array
    /// is still a failure.
    pub async fn graphql(&self, query: &str, variables: Value) -> Result<Value, GithubError> {
        let body = serde_json::to_vec(&serde_json::json!({
            "query": query,
            "variables": variables,
        }))?;
        let request = HttpRequest::post_json(self.url("/graphql"), self.request_headers(), body);
        let response = self.send(request).await?;

        let value: Value = serde_json::from_slice(&response.body)?;
        if let Some(errors) = value.get("errors").and_then(Value::as_array)
            && !errors.is_empty()
        {
            let message = errors[0]
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown GraphQL error")
                .to_string();
            return Err(GithubError::Api {
                status: response.status,
                message,
            });
        }
        Ok(value)
    }

    /// Fetch every node of a connection, following the cursor chain.
    ///
    /// `query` must declare an `$after: String` variable and select
    /// `pageInfo { endCursor hasNextPage }` on the connection; `path` walks
    /// from `data` to the connection object (e.g.
    /// `["organization", "repositories"]`).
    pub async fn fetch_connection<T: DeserializeOwned>(
        &self,
        query: &str,
        mut variables: Value,
        path: &[&str],
    ) -> Result<Vec<T>, GithubError> {
        let mut nodes: Vec<T> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            variables["after"] = match &cursor {
                Some(c) => Value::String(c.clone()),
                None => Value::Null,
            };

            let reply = self.graphql(query, variables.clone()).await?;
            let mut connection = reply.get("data");
            for segment in path {
                connection = connection.and_then(|v| v.get(segment));
            }
            let connection = connection.ok_or_else(|| GithubError::Api {
                status: 200,
                message: format!("missing connection at data.{}", path.join(".")),
            })?;

            let batch: Vec<T> = serde_json::from_value(
                connection
                    .get("nodes")
                    .cloned()
                    .unwrap_or_else(|| Value::Array(Vec::new())),
            )?;
            nodes.extend(batch);

            let page_info = connection.get("pageInfo");
            let has_next = page_info
                .and_then(|p| p.get("hasNextPage"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !has_next {
                break;
            }

            // endCursor must accompany hasNextPage: true.
            cursor = page_info
                .and_then(|p| p.get("endCursor"))
                .and_then(Value::as_str)
                .map(String::from);
            if cursor.is_none() {
                return Err(GithubError::Api {
                    status: 200,
                    message: "hasNextPage without an endCursor".to_string(),
                });
            }
        }

        Ok(nodes)
    }
}
