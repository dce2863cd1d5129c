//! Relay Segment Files
//!
//! Relay segments follow the same shape as value log segments: files named
//! by zero-padded numeric suffix, listed in ascending suffix order.

use std::path::Path;

use crate::error::Result;

/// Extension of relay segment files.
pub const RELAY_FILE_EXT: &str = "relay";

pub fn relay_file_name(suffix: u64) -> String {
    format!("{:016}.{}", suffix, RELAY_FILE_EXT)
}

pub fn parse_relay_suffix(name: &str) -> Option<u64> {
    name.strip_suffix(".relay")?.parse().ok()
}

/// List relay segment file names in `dir`, ascending by suffix.
pub async fn read_relay_names(dir: impl AsRef<Path>) -> Result<Vec<String>> {
    let mut suffixes = Vec::new();
    let mut entries = tokio::fs::read_dir(dir.as_ref()).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(suffix) = parse_relay_suffix(&name) {
            suffixes.push((suffix, name));
        }
    }
    suffixes.sort_unstable_by_key(|(suffix, _)| *suffix);
    Ok(suffixes.into_iter().map(|(_, name)| name).collect())
}
