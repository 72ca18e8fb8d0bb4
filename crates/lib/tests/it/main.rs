/*! Integration tests for Telegate.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * Modules:
 * - properties: The guarantees of the handshake (replay, rotation, revocation) and end-to-end scenarios
 * - rotation: Key rotation, with and without a grace window
 * - persistence: Write-through durability and atomicity under storage failure
 * - gateway: Request forwarding, auditing, provisioning and the admin surface
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("telegate=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod gateway;
mod helpers;
mod persistence;
mod properties;
mod rotation;
