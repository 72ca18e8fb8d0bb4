//! Clients command - lists enrolled clients of a running gateway.

use std::time::Duration;

use telegate::clock::format_millis;
use telegate::gateway::ClientSummary;

use crate::cli::ClientsArgs;
use crate::output::{OutputFormat, print_json, print_table};

/// Run the clients command
pub async fn run(args: &ClientsArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!("{}/admin/clients", args.url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()?;

    let mut request = client.get(&url);
    if let Some(token) = &args.admin_token {
        request = request.bearer_auth(token);
    }
    let response = request.send().await?;
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(format!("gateway returned HTTP status {status}: {body}").into());
    }
    let clients: Vec<ClientSummary> = response.json().await?;

    match format {
        OutputFormat::Json => print_json(&clients)?,
        OutputFormat::Human if clients.is_empty() => println!("No clients enrolled"),
        OutputFormat::Human => {
            let rows: Vec<Vec<String>> = clients.iter().map(summary_row).collect();
            print_table(
                &["CLIENT", "STATUS", "ADDRESS", "REQUESTS", "LAST ACCESS", "EPOCH", "ENDPOINTS"],
                &rows,
            );
        }
    }
    Ok(())
}

fn summary_row(client: &ClientSummary) -> Vec<String> {
    vec![
        client.client_id.to_string(),
        client.status.to_string(),
        client.address.to_string(),
        client.request_count.to_string(),
        client
            .last_access_at
            .map_or_else(|| "never".to_string(), format_millis),
        client.rotation_epoch.to_string(),
        client
            .endpoints
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(","),
    ]
}
