//! Organization member count, the cheapest collector: one paginated
//! listing, one record.

use chrono::Utc;

use crate::github::types::{OrgMember, OrgRepo};
use crate::github::{GithubClient, GithubError};

use super::DomainOutcome;
use super::progress::{CollectProgress, ProgressCallback, emit};
use super::records::MemberCountRecord;

pub const DOMAIN: &str = "org_members";

pub async fn collect_members(
    client: &GithubClient,
    org: &str,
    _repos: &[OrgRepo],
    on_progress: Option<&ProgressCallback>,
) -> Result<(Vec<MemberCountRecord>, DomainOutcome), GithubError> {
    emit(
        on_progress,
        CollectProgress::DomainStarted {
            domain: DOMAIN,
            entities: 1,
        },
    );

    let set = client
        .fetch_all::<OrgMember>(&format!("/orgs/{org}/members"))
        .await?
        .into_result_set();

    let mut outcome = DomainOutcome::new(DOMAIN);
    if let Some(partial) = &set.partial {
        outcome
            .errors
            .push(format!("partial member list ({})", partial.url));
        emit(
            on_progress,
            CollectProgress::PartialResult {
                domain: DOMAIN,
                entity: org.to_string(),
                failed_url: partial.url.clone(),
            },
        );
    }

    tracing::info!(org = %org, members = set.items.len(), "collected organization members");

    let records = vec![MemberCountRecord {
        timestamp: Utc::now(),
        num_members: set.items.len(),
    }];
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::http::{HttpMethod, HttpResponse, MockTransport};
    use crate::ratelimit::RetryPolicy;

    const ROOT: &str = "https://api.example.com";

    fn test_client(transport: MockTransport) -> GithubClient {
        GithubClient::with_transport(
            "test-token",
            ROOT,
            RetryPolicy::default().with_jitter(false),
            None,
            Arc::new(transport),
        )
        .expect("client")
    }

    #[tokio::test]
    async fn counts_members_across_pages() {
        let transport = MockTransport::new();
        let page2 = format!("{ROOT}/orgs/nf-core/members?page=2");
        transport.push_response(
            HttpMethod::Get,
            format!("{ROOT}/orgs/nf-core/members"),
            HttpResponse {
                status: 200,
                headers: vec![("Link".to_string(), format!(r#"<{page2}>; rel="next""#))],
                body: br#"[{"login":"ada"},{"login":"bob"}]"#.to_vec(),
            },
        );
        transport.push_json(&page2, 200, r#"[{"login":"grace"}]"#);

        let client = test_client(transport);
        let (records, outcome) = collect_members(&client, "nf-core", &[], None)
            .await
            .expect("collect");

        assert_eq!(outcome.rows, 1);
        assert_eq!(records[0].num_members, 3);
    }
}
