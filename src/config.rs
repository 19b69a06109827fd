use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};

use crate::{Error, LocatorResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocatorConfig {
    /// Bundles started by the locator on startup unless already active or
    /// starting.
    #[serde(default = "default_auto_start_bundles")]
    pub auto_start_bundles: Vec<String>,

    /// When false, a bundle that fails to start is logged and skipped instead
    /// of aborting startup.
    #[serde(default = "default_true")]
    pub fail_on_activation_error: bool,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            auto_start_bundles: default_auto_start_bundles(),
            fail_on_activation_error: default_true(),
        }
    }
}

impl LocatorConfig {
    // JSONファイルから設定を読み込む
    pub fn from_file<P: AsRef<Path>>(path: P) -> LocatorResult<Self> {
        let file = File::open(path)
            .map_err(|e| Error::Config(format!("Failed to open config file: {}", e)))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn from_str(s: &str) -> LocatorResult<Self> {
        serde_json::from_str(s).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn should_auto_start(&self, symbolic_name: &str) -> bool {
        self.auto_start_bundles
            .iter()
            .any(|name| name == symbolic_name)
    }
}

// デフォルト値の定義
fn default_auto_start_bundles() -> Vec<String> {
    vec![
        "org.eclipse.equinox.ds".to_string(),
        "org.eclipse.equinox.common".to_string(),
    ]
}

fn default_true() -> bool {
    true
}
