use std::fmt;

use crate::macros::MacroLayer;

/// Name, epoch, version, release and architecture of a package.
///
/// The identity tuple rpm uses for a built package; derived file names
/// are computed from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nevra {
    /// Package name.
    pub name: String,
    /// Epoch, if the spec declares one.
    pub epoch: Option<u32>,
    /// Upstream version.
    pub version: String,
    /// Packaging release, already macro-expanded (e.g. `1.el7`).
    pub release: String,
    /// Target architecture (`x86_64`, `noarch`, `src`, ...).
    pub arch: String,
}

impl Nevra {
    /// `name-version-release`, as used for source package file names.
    pub fn nvr(&self) -> String {
        format!("{}-{}-{}", self.name, self.version, self.release)
    }

    /// Macro definitions describing this package, for expanding path
    /// templates in its context.
    ///
    /// An absent epoch is presented as `1`, which is what the packaging
    /// scripts have always fed to rpm here.
    pub fn macro_layer(&self) -> MacroLayer {
        let epoch = self.epoch.unwrap_or(1).to_string();
        [
            ("name", self.name.as_str()),
            ("epoch", epoch.as_str()),
            ("version", self.version.as_str()),
            ("release", self.release.as_str()),
            ("arch", self.arch.as_str()),
        ]
        .into_iter()
        .collect()
    }

    /// Value of an rpm header tag, by (case-insensitive) tag name.
    pub fn tag(&self, tag: &str) -> Option<String> {
        match tag.to_ascii_uppercase().as_str() {
            "NAME" => Some(self.name.clone()),
            "VERSION" => Some(self.version.clone()),
            "RELEASE" => Some(self.release.clone()),
            "ARCH" => Some(self.arch.clone()),
            "EPOCH" => Some(self.epoch.map_or_else(|| "(none)".to_string(), |e| e.to_string())),
            "NVR" => Some(self.nvr()),
            "NEVRA" => Some(self.to_string()),
            _ => None,
        }
    }

    /// Fill `%{TAG}` placeholders in an rpm query format.
    ///
    /// Unknown tags are kept verbatim.
    ///
    /// # Examples
    ///
    /// ```
    /// use planex::Nevra;
    ///
    /// let nevra = Nevra {
    ///     name: "foo".into(),
    ///     epoch: None,
    ///     version: "1.2.3".into(),
    ///     release: "1".into(),
    ///     arch: "x86_64".into(),
    /// };
    /// assert_eq!(
    ///     nevra.query_format("%{ARCH}/%{NAME}-%{VERSION}-%{RELEASE}.%{ARCH}.rpm"),
    ///     "x86_64/foo-1.2.3-1.x86_64.rpm"
    /// );
    /// ```
    pub fn query_format(&self, format: &str) -> String {
        let mut out = String::with_capacity(format.len());
        let mut rest = format;
        while let Some(start) = rest.find("%{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let tag = &after[..end];
                    match self.tag(tag) {
                        Some(value) => out.push_str(&value),
                        None => {
                            out.push_str("%{");
                            out.push_str(tag);
                            out.push('}');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

impl fmt::Display for Nevra {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-", self.name)?;
        if let Some(epoch) = self.epoch {
            write!(f, "{epoch}:")?;
        }
        write!(f, "{}-{}.{}", self.version, self.release, self.arch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Nevra {
        Nevra {
            name: "ocaml-cohttp".to_string(),
            epoch: None,
            version: "0.9.8".to_string(),
            release: "1.el6".to_string(),
            arch: "x86_64".to_string(),
        }
    }

    #[test]
    fn nvr() {
        assert_eq!(sample().nvr(), "ocaml-cohttp-0.9.8-1.el6");
    }

    #[test]
    fn display_with_and_without_epoch() {
        let mut n = sample();
        assert_eq!(n.to_string(), "ocaml-cohttp-0.9.8-1.el6.x86_64");
        n.epoch = Some(2);
        assert_eq!(n.to_string(), "ocaml-cohttp-2:0.9.8-1.el6.x86_64");
    }

    #[test]
    fn macro_layer_defaults_epoch() {
        let layer = sample().macro_layer();
        assert_eq!(layer.get("epoch"), Some(Some("1")));
        assert_eq!(layer.get("release"), Some(Some("1.el6")));
    }

    #[test]
    fn query_format_keeps_unknown_tags() {
        let n = sample();
        assert_eq!(n.query_format("%{name}-%{BOGUS}"), "ocaml-cohttp-%{BOGUS}");
        assert_eq!(n.query_format("%{NAME"), "%{NAME");
        assert_eq!(n.query_format("%{EPOCH}"), "(none)");
    }
}
