//! Application paths and constants.

use std::path::PathBuf;

pub const APP_NAME: &str = "VitalTrend";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Root data directory, `~/VitalTrend` on every platform.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

pub fn patient_docs_dir() -> PathBuf {
    app_data_dir().join("patient_docs")
}

pub fn knowledge_docs_dir() -> PathBuf {
    app_data_dir().join("knowledge_docs")
}

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> String {
    format!("{}=info", env!("CARGO_CRATE_NAME"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dirs_nest_under_app_root() {
        let root = app_data_dir();
        assert!(root.ends_with(APP_NAME));
        assert!(patient_docs_dir().starts_with(&root));
        assert!(knowledge_docs_dir().starts_with(&root));
    }

    #[test]
    fn version_is_set() {
        assert!(!APP_VERSION.is_empty());
    }
}
