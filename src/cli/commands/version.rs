//! Version command implementation.

use crate::config::DEFAULT_API_URL;
use crate::error::Result;
use crate::sync::{BATCH_SIZE, MIN_SESSION_SECS};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionOutput {
    name: &'static str,
    version: &'static str,
    build: &'static str,
    default_api_url: &'static str,
    batch_size: usize,
    min_session_secs: u64,
}

impl VersionOutput {
    fn current() -> Self {
        Self {
            name: "sessync",
            version: env!("CARGO_PKG_VERSION"),
            build: if cfg!(debug_assertions) { "dev" } else { "release" },
            default_api_url: DEFAULT_API_URL,
            batch_size: BATCH_SIZE,
            min_session_secs: MIN_SESSION_SECS,
        }
    }
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let output = VersionOutput::current();

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{} version {} ({})", output.name, output.version, output.build);
    Ok(())
}
