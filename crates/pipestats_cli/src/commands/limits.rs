//! Show the current API quota.

use pipestats::github::GithubClient;

use crate::config::Config;

pub async fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let token = config
        .github
        .token
        .as_deref()
        .ok_or("GitHub token is not configured (set PIPESTATS_GITHUB_TOKEN)")?;
    let client = GithubClient::new(token, None)?;

    let status = client.rate_limit().await?;
    println!(
        "core quota: {}/{} remaining, resets at {}",
        status.remaining, status.limit, status.reset_at
    );
    Ok(())
}
