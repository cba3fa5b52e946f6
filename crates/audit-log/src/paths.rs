use std::path::PathBuf;

/// Per-application directory holding the shared log.
pub const APP_DIR_NAME: &str = "dev.flowgate";

/// File name of the shared flow log.
pub const LOG_FILE_NAME: &str = "flowgate-flow-log.jsonl";

/// Default location of the shared log: `<data dir>/dev.flowgate/flowgate-flow-log.jsonl`.
///
/// Returns `None` when the platform has no per-user data directory. The
/// directory itself is created by [`LogWriter`](crate::LogWriter) on first
/// flush.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(APP_DIR_NAME).join(LOG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_ends_with_app_dir_and_file() {
        if let Some(path) = default_log_path() {
            assert!(path.ends_with(format!("{APP_DIR_NAME}/{LOG_FILE_NAME}")));
        }
    }
}
