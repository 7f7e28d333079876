//! Optional TOML configuration.
//!
//! ```toml
//! check_package_name = true
//! pins_dir = "PINS"
//!
//! [defines]
//! _topdir = "."
//! dist = ".el7"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::defines::Defines;
use crate::error::{Error, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "PLANEX_CONFIG";

/// Configuration file looked for in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "planex.toml";

/// Settings shared by every subcommand.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Require spec file names to match their package names.
    #[serde(default = "default_true")]
    pub check_package_name: bool,

    /// Directory holding `*.pin` overlays.
    #[serde(default = "default_pins_dir")]
    pub pins_dir: PathBuf,

    /// Macro overrides applied before any given on the command line.
    #[serde(default)]
    pub defines: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            check_package_name: true,
            pins_dir: default_pins_dir(),
            defines: BTreeMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_pins_dir() -> PathBuf {
    PathBuf::from("PINS")
}

impl Config {
    /// Read the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Config::from_toml(path, &text)
    }

    /// Parse configuration text as if it had been read from `path`.
    pub fn from_toml(path: impl AsRef<Path>, text: &str) -> Result<Config> {
        let path = path.as_ref();
        toml::from_str(text).map_err(|e| Error::InvalidConfig {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Find and load the configuration.
    ///
    /// `explicit` (from `--config`) must exist. Otherwise `$PLANEX_CONFIG`
    /// is used when set, then `./planex.toml` when present; without either
    /// the defaults apply.
    pub fn discover(explicit: Option<&Path>) -> Result<Config> {
        if let Some(path) = explicit {
            return Config::load(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            debug!(path = ?path, "configuration from {CONFIG_ENV}");
            return Config::load(PathBuf::from(path));
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            debug!(path = %local.display(), "configuration from working directory");
            return Config::load(local);
        }
        Ok(Config::default())
    }

    /// The configured overrides, ahead of `extra` ones.
    pub fn defines_with(&self, extra: &Defines) -> Defines {
        let mut defines: Defines = self
            .defines
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        defines.extend(extra);
        defines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::from_toml("planex.toml", "").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.check_package_name);
        assert_eq!(config.pins_dir, PathBuf::from("PINS"));
    }

    #[test]
    fn full_file() {
        let config = Config::from_toml(
            "planex.toml",
            r#"
check_package_name = false
pins_dir = "overlays"

[defines]
_topdir = "."
dist = ".el7"
"#,
        )
        .unwrap();
        assert!(!config.check_package_name);
        assert_eq!(config.pins_dir, PathBuf::from("overlays"));
        assert_eq!(config.defines["dist"], ".el7");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_toml("planex.toml", "pin_dir = \"x\"\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn command_line_defines_win() {
        let config = Config::from_toml("planex.toml", "[defines]\ndist = \".el6\"\n").unwrap();
        let extra: Defines = [("dist", ".el7")].into_iter().collect();
        let defines = config.defines_with(&extra);
        assert_eq!(defines.get("dist"), Some(".el7"));
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::discover(Some(&missing)),
            Err(Error::NotFound(_))
        ));

        let present = dir.path().join("planex.toml");
        fs::write(&present, "pins_dir = \"P\"\n").unwrap();
        assert_eq!(
            Config::discover(Some(&present)).unwrap().pins_dir,
            PathBuf::from("P")
        );
    }
}
