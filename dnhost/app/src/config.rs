use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "dnhost.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Bootstrap library to load. Relative paths resolve against the working
    /// directory; unset means next to this executable.
    pub bootstrap_path: Option<PathBuf>,

    /// Method called when none is given on the command line.
    #[serde(default = "default_method")]
    pub default_method: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bootstrap_path: None,
            default_method: default_method(),
        }
    }
}

fn default_method() -> String {
    "Main".to_string()
}

impl HostConfig {
    pub fn bootstrap_path(&self) -> PathBuf {
        self.bootstrap_path.clone().unwrap_or_else(default_bootstrap_path)
    }
}

/// `dotnet_bootstrap.dll` / `libdotnet_bootstrap.so` next to the executable.
pub fn default_bootstrap_path() -> PathBuf {
    let name = format!(
        "{}dotnet_bootstrap{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    );
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
        .unwrap_or_else(|| PathBuf::from(name))
}

pub fn load_config(path: &Path) -> Result<HostConfig> {
    if path.exists() {
        info!("Loading config from {:?}", path);
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    } else {
        Ok(HostConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = load_config(Path::new("definitely/not/here/dnhost.json")).unwrap();
        assert_eq!(config.bootstrap_path, None);
        assert_eq!(config.default_method, "Main");
        assert!(config
            .bootstrap_path()
            .to_string_lossy()
            .contains("dotnet_bootstrap"));
    }

    #[test]
    fn test_partial_config() {
        let config: HostConfig = serde_json::from_str(r#"{"bootstrap_path":"cpp_dll/x64/bootstrap.dll"}"#).unwrap();
        assert_eq!(config.bootstrap_path(), PathBuf::from("cpp_dll/x64/bootstrap.dll"));
        assert_eq!(config.default_method, "Main");
    }
}
