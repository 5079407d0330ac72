//! `parley doctor`: check every external dependency and print a report.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::ParleyConfig;
use crate::db;

/// Print configuration, model server reachability, observability keys and
/// index health. Problems are reported, not returned as errors.
pub async fn doctor(config: &ParleyConfig) -> Result<()> {
    println!("Parley Health Report");
    println!("====================");
    println!();
    println!("Model:");
    println!("  Endpoint:        {}", config.model.endpoint);
    println!("  Model:           {}", config.model.model);
    match check_model_server(&config.model.endpoint).await {
        Ok(models) if models.iter().any(|m| m.starts_with(&config.model.model)) => {
            println!("  Status:          reachable, model installed")
        }
        Ok(models) => {
            println!("  Status:          reachable, model NOT installed");
            println!("  Installed:       {}", models.join(", "));
        }
        Err(e) => println!("  Status:          UNREACHABLE ({e:#})"),
    }

    println!();
    println!("Observability:");
    println!("  Host:            {}", config.observability.host);
    if config.observability.has_credentials() {
        println!("  Keys:            present");
    } else {
        println!("  Keys:            missing (traces go to the log only)");
    }

    println!();
    println!("Storage:");
    println!("  Memory dir:      {}", config.resolved_memory_dir().display());
    println!("  Archive dir:     {}", config.resolved_archive_dir().display());

    println!();
    let index_path = config.resolved_index_path();
    println!("Index:             {}", index_path.display());
    if !index_path.exists() {
        println!("  Not found. Build one with `parley index add`.");
        return Ok(());
    }

    let conn = db::open_index_read_only(&index_path)
        .context("failed to open index (may be corrupt or outdated)")?;
    let report = db::check_index_health(&conn).context("failed to run health check")?;

    println!("  Schema version:  {}", report.schema_version);
    println!("  sqlite-vec:      {}", report.sqlite_vec_version);
    let stored = report.embedding_model.as_deref().unwrap_or("(not set)");
    println!("  Embedding model: {stored}");
    if report
        .embedding_model
        .as_deref()
        .is_some_and(|m| m != config.embedding.model)
    {
        println!("  WARNING: configured embedding model is {}", config.embedding.model);
    }
    if report.collections.is_empty() {
        println!("  Collections:     none");
    } else {
        println!("  Collections:");
        for c in &report.collections {
            println!("    {:<20} {} documents", c.name, c.documents);
        }
    }
    if report.integrity_ok {
        println!("  Integrity check: PASSED");
    } else {
        println!("  Integrity check: FAILED ({})", report.integrity_details);
    }

    Ok(())
}

#[derive(serde::Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(serde::Deserialize)]
struct TagEntry {
    name: String,
}

/// Names of the models installed on the server, via `GET /api/tags`.
pub async fn check_model_server(endpoint: &str) -> Result<Vec<String>> {
    let url = format!("{}/api/tags", endpoint.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let tags: TagsResponse = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("GET {url} failed"))?
        .error_for_status()?
        .json()
        .await
        .context("unexpected /api/tags payload")?;
    Ok(tags.models.into_iter().map(|m| m.name).collect())
}
