//! Fetch command - runs one signed request against a gateway.

use std::io::Write;
use std::time::Duration;

use serde::Deserialize;
use telegate::{AuthDecision, challenge::Nonce};

use super::sign::load_signer;
use crate::cli::FetchArgs;
use crate::output::{OutputFormat, print_json};

#[derive(Deserialize)]
struct ChallengeBody {
    nonce: Nonce,
    expires_at: u64,
}

/// Run the fetch command
pub async fn run(args: &FetchArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let signer = load_signer(&args.client_id, &args.bundle, &args.passphrase)?;
    let base = args.url.trim_end_matches('/');
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()?;

    let response = client
        .post(format!("{base}/auth/challenge"))
        .json(&serde_json::json!({ "client_id": signer.client_id() }))
        .send()
        .await?;
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(format!("challenge refused with HTTP status {status}: {body}").into());
    }
    let challenge: ChallengeBody = response.json().await?;
    tracing::debug!(
        nonce = %challenge.nonce.fingerprint(),
        expires_at = challenge.expires_at,
        "Received challenge"
    );

    let endpoint = args.endpoint.trim_start_matches('/');
    let signature = hex::encode(signer.sign_challenge(&challenge.nonce));
    let response = client
        .post(format!("{base}/data/{endpoint}"))
        .header("x-client-id", signer.client_id().as_str())
        .header("x-nonce", challenge.nonce.to_hex())
        .header("x-signature", signature)
        .send()
        .await?;

    let status = response.status();
    if status.is_success() {
        let body = response.bytes().await?;
        std::io::stdout().write_all(&body)?;
        return Ok(());
    }

    let text = response.text().await.unwrap_or_default();
    match (format, serde_json::from_str::<AuthDecision>(&text)) {
        (OutputFormat::Json, Ok(decision)) => print_json(&decision)?,
        (OutputFormat::Human, Ok(decision)) => match decision.reason {
            Some(reason) => eprintln!("denied: {reason}"),
            None => eprintln!("failed: HTTP status {status}"),
        },
        (_, Err(_)) => eprintln!("failed: HTTP status {status}: {text}"),
    }
    std::process::exit(1);
}
