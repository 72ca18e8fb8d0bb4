//! Sign command - answers a challenge nonce with a provisioned key.

use telegate::{ClientId, ClientSigner, challenge::Nonce};

use crate::cli::SignArgs;
use crate::output::{OutputFormat, print_json};

/// Load and unseal the key bundle named by the arguments.
pub fn load_signer(
    client_id: &str,
    bundle: &std::path::Path,
    passphrase: &str,
) -> Result<ClientSigner, Box<dyn std::error::Error>> {
    let client_id = ClientId::new(client_id)?;
    let json = std::fs::read_to_string(bundle)
        .map_err(|e| format!("failed to read key bundle {}: {e}", bundle.display()))?;
    Ok(ClientSigner::from_bundle_json(client_id, &json, passphrase)?)
}

/// Run the sign command
pub fn run(args: &SignArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let signer = load_signer(&args.client_id, &args.bundle, &args.passphrase)?;
    let nonce = Nonce::from_hex(args.nonce.trim())?;
    let signature = hex::encode(signer.sign_challenge(&nonce));

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "client_id": signer.client_id(),
            "address": signer.address(),
            "nonce": nonce,
            "signature": signature,
        }))?,
        OutputFormat::Human => println!("{signature}"),
    }
    Ok(())
}
