//! Integration test: collected records all the way to the scored report.

use chrono::{Duration, Utc};

use pipestats::collect::records::{
    CatalogRecord, IssueRecord, IssueType, RepoCategory,
};
use pipestats::report::{PipelineStatus, aggregate, score_pipelines};

fn catalog_record(
    name: &str,
    category: RepoCategory,
    stars: u32,
    forks: u32,
    releases: u64,
    last_release_days_ago: Option<i64>,
) -> CatalogRecord {
    CatalogRecord {
        name: name.to_string(),
        description: format!("{name} description"),
        gh_created_at: Utc::now() - Duration::days(1000),
        gh_updated_at: Utc::now(),
        gh_pushed_at: Some(Utc::now()),
        stargazers_count: stars,
        watchers_count: stars,
        forks_count: forks,
        open_issues_count: 3,
        topics: vec!["genomics".to_string()],
        default_branch: Some("master".to_string()),
        archived: false,
        last_release_date: last_release_days_ago.map(|d| Utc::now() - Duration::days(d)),
        number_of_releases: Some(releases),
        category,
    }
}

fn issue_record(
    pipeline: &str,
    number: u64,
    issue_type: IssueType,
    state: &str,
    closed_wait_days: Option<f64>,
) -> IssueRecord {
    IssueRecord {
        pipeline_name: pipeline.to_string(),
        issue_number: number,
        issue_type,
        state: state.to_string(),
        created_by: "ada".to_string(),
        created_at: Utc::now() - Duration::days(30),
        updated_at: Utc::now(),
        closed_at: None,
        closed_wait_seconds: closed_wait_days.map(|d| d * 86_400.0),
        first_response_seconds: Some(3_600.0),
        first_responder: Some("grace".to_string()),
        num_comments: 2,
        html_url: format!("https://github.com/nf-core/{pipeline}/issues/{number}"),
    }
}

#[test]
fn records_flow_into_a_scored_report() {
    let catalog = vec![
        // Healthy pipeline: recent release, good numbers.
        catalog_record("rnaseq", RepoCategory::Pipeline, 800, 600, 30, Some(20)),
        // Dormant pipeline: last release long ago, nothing closed.
        catalog_record("oldtool", RepoCategory::Pipeline, 3, 1, 2, Some(500)),
        // Core repos never enter the report.
        catalog_record("tools", RepoCategory::Core, 300, 150, 10, Some(5)),
    ];

    let issues = vec![
        issue_record("rnaseq", 1, IssueType::Issue, "closed", Some(2.0)),
        issue_record("rnaseq", 2, IssueType::Issue, "closed", Some(4.0)),
        issue_record("rnaseq", 3, IssueType::Issue, "open", None),
        issue_record("rnaseq", 4, IssueType::Pr, "closed", Some(1.0)),
        issue_record("oldtool", 1, IssueType::Issue, "open", None),
        issue_record("tools", 1, IssueType::Issue, "open", None),
    ];

    let rows = aggregate(&catalog, &issues);
    assert_eq!(rows.len(), 2, "only pipelines are scored");

    let rnaseq = rows.iter().find(|r| r.pipeline_name == "rnaseq").unwrap();
    assert_eq!(rnaseq.issue_count, 3);
    assert_eq!(rnaseq.closed_issue_count, 2);
    assert_eq!(rnaseq.median_seconds_to_issue_closed, Some(3.0 * 86_400.0));
    assert_eq!(rnaseq.pr_count, 1);

    let now = Utc::now();
    let scored = score_pipelines(&rows, now);

    let rnaseq = scored.iter().find(|p| p.pipeline_name == "rnaseq").unwrap();
    let oldtool = scored.iter().find(|p| p.pipeline_name == "oldtool").unwrap();

    assert_eq!(rnaseq.status, PipelineStatus::Active);
    assert_eq!(oldtool.status, PipelineStatus::Legacy);
    assert!(
        rnaseq.trust_score > oldtool.trust_score,
        "healthy pipeline must outscore the dormant one ({} vs {})",
        rnaseq.trust_score,
        oldtool.trust_score
    );
    assert!(rnaseq.trust_score > 70.0);
    assert!(oldtool.trust_score < 50.0);

    // Components travel with the score for inspection.
    assert!(rnaseq.components.maintenance > 80.0);
    assert!(oldtool.components.maintenance < 15.0);

    // The report serializes cleanly for the output file.
    let json = serde_json::to_string_pretty(&scored).expect("serialize");
    assert!(json.contains("trust_score"));
    assert!(json.contains("rnaseq"));
}
