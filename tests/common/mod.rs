//! Common test utilities and fixtures
//!
//! This module provides shared test infrastructure

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use tempfile::TempDir;

/// Get the path to the test fixtures directory
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Get a path to a specific fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

/// Get the valid config fixture path
pub fn valid_config_fixture() -> PathBuf {
    fixture_path("valid_config.toml")
}

/// Get the invalid config fixture path
pub fn invalid_config_fixture() -> PathBuf {
    fixture_path("invalid_config.toml")
}

/// Command for the persona-pipeline binary with PERSONA_* overrides cleared
pub fn pipeline_cmd() -> Command {
    let mut cmd = Command::cargo_bin("persona-pipeline").unwrap();
    for var in [
        "PERSONA_CONFIG",
        "PERSONA_PROVIDER",
        "PERSONA_BASE_URL",
        "PERSONA_MODEL",
        "PERSONA_API_KEY",
        "PERSONA_TIMEOUT_SECS",
        "PERSONA_MAX_ATTEMPTS",
        "PERSONA_CHUNK_SIZE",
        "PERSONA_BATCH_SIZE",
        "PERSONA_OUTPUT_DIR",
        "PERSONA_LOG_LEVEL",
        "PERSONA_LOG_FILE",
        "PERSONA_LOG_JSON",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Temporary workspace with an offline (mock provider) configuration
pub struct MockWorkspace {
    pub root: TempDir,
    pub config_path: PathBuf,
    pub output_dir: PathBuf,
}

impl MockWorkspace {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let output_dir = root.path().join("outputs");
        let config_path = root.path().join("persona-pipeline.toml");

        let config = format!(
            r#"
[model]
provider = "mock"

[generation]
chunk_delay_secs = 0

[generation.chunk_delay_overrides]
csv2 = 0

[scoring]
call_delay_secs = 0
batch_delay_secs = 0

[storage]
output_dir = '{}'

[logging]
level = "warn"
"#,
            output_dir.display()
        );
        fs::write(&config_path, config).unwrap();

        Self {
            root,
            config_path,
            output_dir,
        }
    }

    /// Command preconfigured with `--config` pointing at this workspace
    pub fn cmd(&self) -> Command {
        let mut cmd = pipeline_cmd();
        cmd.arg("--config").arg(&self.config_path);
        cmd
    }

    pub fn output(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.output_dir.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_dir_exists() {
        assert!(fixtures_dir().exists(), "Fixtures directory should exist");
    }

    #[test]
    fn test_valid_config_exists() {
        assert!(
            valid_config_fixture().exists(),
            "Valid config fixture should exist"
        );
    }

    #[test]
    fn test_invalid_config_exists() {
        assert!(
            invalid_config_fixture().exists(),
            "Invalid config fixture should exist"
        );
    }
}
