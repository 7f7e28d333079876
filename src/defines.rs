use std::str::FromStr;

use crate::error::{Error, Result};
use crate::macros::MacroLayer;

/// Ordered macro overrides, as given with `-D/--define 'KEY VALUE'`.
///
/// Later definitions of the same key win, as they would with repeated
/// `rpmbuild --define` flags.
///
/// # Examples
///
/// ```
/// use planex::Defines;
///
/// let defines: Defines = ["dist .el7", "_topdir /build"]
///     .iter()
///     .map(|d| d.parse::<Defines>())
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(defines.get("dist"), Some(".el7"));
/// assert_eq!(defines.layers().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Defines {
    entries: Vec<(String, String)>,
}

impl Defines {
    /// Create an empty set of overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an override.
    pub fn define(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Append every override in `other` after this one's.
    pub fn extend(&mut self, other: &Defines) {
        self.entries.extend(other.entries.iter().cloned());
    }

    /// The effective value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether `key` is overridden.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterate over the overrides in the order they were given.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether no overrides were given.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The macro layers a spec operation pushes for these overrides.
    ///
    /// `_topdir` affects every other path macro, so when present it gets a
    /// layer of its own, pushed first. The second layer holds every
    /// override plus an empty `dist` unless one was given: the `%dist` of
    /// the host building the source package need not match that of the
    /// chroot building the binaries, and a mismatch would make derived
    /// package file names disagree with what mock actually writes.
    pub fn layers(&self) -> Vec<MacroLayer> {
        let mut layers = Vec::with_capacity(2);
        if let Some(topdir) = self.get("_topdir") {
            layers.push([("_topdir", topdir)].into_iter().collect());
        }

        let mut main = MacroLayer::new();
        if !self.contains("dist") {
            main.define("dist", "");
        }
        for (key, value) in self.iter() {
            main.define(key, value);
        }
        layers.push(main);
        layers
    }
}

impl FromStr for Defines {
    type Err = Error;

    /// Parse one `KEY VALUE` argument; the value is everything after the
    /// first run of whitespace and may itself contain spaces.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let (key, value) = trimmed
            .split_once(char::is_whitespace)
            .ok_or_else(|| Error::MalformedDefine(s.to_string()))?;
        let key = key.trim_start_matches('%');
        if key.is_empty() {
            return Err(Error::MalformedDefine(s.to_string()));
        }
        let mut defines = Defines::new();
        defines.define(key, value.trim_start());
        Ok(defines)
    }
}

impl FromIterator<Defines> for Defines {
    fn from_iter<I: IntoIterator<Item = Defines>>(iter: I) -> Self {
        let mut all = Defines::new();
        for defines in iter {
            all.extend(&defines);
        }
        all
    }
}

impl<K, V> FromIterator<(K, V)> for Defines
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut all = Defines::new();
        for (k, v) in iter {
            all.define(k, v);
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_key_value() {
        let d: Defines = "dist .el7".parse().unwrap();
        assert_eq!(d.get("dist"), Some(".el7"));
    }

    #[test]
    fn value_keeps_inner_spaces() {
        let d: Defines = "packager  Jane Doe <jane@example.com>".parse().unwrap();
        assert_eq!(d.get("packager"), Some("Jane Doe <jane@example.com>"));
    }

    #[test]
    fn leading_percent_is_dropped() {
        let d: Defines = "%_topdir /tmp".parse().unwrap();
        assert_eq!(d.get("_topdir"), Some("/tmp"));
    }

    #[test]
    fn malformed_define() {
        assert_eq!(
            "dist".parse::<Defines>().unwrap_err(),
            Error::MalformedDefine("dist".to_string())
        );
        assert!("".parse::<Defines>().is_err());
    }

    #[test]
    fn later_definition_wins() {
        let d: Defines = [("dist", ".el6"), ("dist", ".el7")].into_iter().collect();
        assert_eq!(d.get("dist"), Some(".el7"));
        let layers = d.layers();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].get("dist"), Some(Some(".el7")));
    }

    #[test]
    fn dist_defaults_to_empty() {
        let layers = Defines::new().layers();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].get("dist"), Some(Some("")));
    }

    #[test]
    fn topdir_gets_its_own_first_layer() {
        let d: Defines = [("_sourcedir", "%_topdir/SOURCES"), ("_topdir", ".")]
            .into_iter()
            .collect();
        let layers = d.layers();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].len(), 1);
        assert_eq!(layers[0].get("_topdir"), Some(Some(".")));
        assert!(layers[1].contains("_sourcedir"));
    }
}
