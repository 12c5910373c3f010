//! The `check-update` subcommand: compare the installed version against the
//! latest GitHub release tag.

use anyhow::Context;

const RELEASES_URL: &str = "https://api.github.com/repos/herald-app/herald/releases/latest";

pub async fn run() -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("herald/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(5))
        .build()?;

    let response = client
        .get(RELEASES_URL)
        .send()
        .await
        .context("update check request failed")?;
    if !response.status().is_success() {
        anyhow::bail!("update check failed: HTTP {}", response.status());
    }

    let body: serde_json::Value = response
        .json()
        .await
        .context("update check: malformed response body")?;
    let latest = body
        .get("tag_name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    println!(
        "latest release: {latest} (installed: v{})",
        env!("CARGO_PKG_VERSION")
    );
    Ok(())
}
