//! `safs request`: submit one raw request and print the status pair.

use log::debug;
use safs_embedded::{EmbeddedConfig, EmbeddedServices};

const CLIENT_HANDLE: &str = "safs-cli";

pub fn execute(config: &EmbeddedConfig, service: &str, request: &str) -> anyhow::Result<()> {
    let services = EmbeddedServices::start(config)?;
    let client = services.client(CLIENT_HANDLE)?;
    debug!("Submitting to {}: {}", service, request);

    let outcome = client.submit2(service, request);
    services.shutdown();

    let result = outcome?;
    println!("rc:     {}", result.rc);
    if !result.result.is_empty() {
        println!("result: {}", result.result);
    }
    if !result.is_ok() {
        anyhow::bail!("request failed with {}", result.rc);
    }
    Ok(())
}
