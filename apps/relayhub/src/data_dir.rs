use std::path::PathBuf;

/// Resolve the data directory: `DATA` env, then `--data-dir`, then
/// `~/.relayhub`.
pub(crate) fn resolve(cli_value: &str) -> PathBuf {
    if let Ok(value) = std::env::var("DATA")
        && !value.trim().is_empty()
    {
        return PathBuf::from(value);
    }
    if !cli_value.trim().is_empty() {
        return PathBuf::from(cli_value);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".relayhub")
}
