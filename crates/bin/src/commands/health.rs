//! Health check command - checks a running Telegate gateway.

use std::time::Duration;

use serde::Deserialize;

use crate::cli::HealthArgs;

#[derive(Deserialize)]
struct HealthBody {
    status: String,
    #[serde(default)]
    backend: String,
}

/// Run the health check command. Exits non-zero when the gateway is down.
pub async fn run(args: &HealthArgs) -> Result<(), Box<dyn std::error::Error>> {
    let base = args.url.trim_end_matches('/');
    let url = if base.ends_with("/health") {
        base.to_string()
    } else {
        format!("{base}/health")
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()?;

    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            eprintln!("unhealthy: failed to connect to {url}: {e}");
            std::process::exit(1);
        }
    };
    if !response.status().is_success() {
        eprintln!("unhealthy: gateway returned HTTP status {}", response.status());
        std::process::exit(1);
    }

    let body: HealthBody = response.json().await?;
    if body.status != "healthy" {
        eprintln!("unhealthy: gateway reported status {}", body.status);
        std::process::exit(1);
    }
    println!("healthy (backend: {})", body.backend);
    Ok(())
}
