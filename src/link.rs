use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Highest `SchemaVersion` this crate understands.
pub const MAX_SCHEMA_VERSION: u32 = 2;

/// A remote repository reference inside a link file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    /// Repository or archive URL.
    #[serde(rename = "URL")]
    pub url: String,
    /// Tag, branch or commit to take.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commitish: Option<String>,
    /// Directory inside the archive holding the patch queue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPatchQueue {
    Directory(String),
    Sources(BTreeMap<String, Remote>),
}

#[derive(Debug, Deserialize)]
struct RawLink {
    #[serde(rename = "SchemaVersion", default = "default_schema_version")]
    schema_version: u32,
    #[serde(rename = "URL", default)]
    url: Option<String>,
    #[serde(default)]
    commitish: Option<String>,
    #[serde(default)]
    specfile: Option<String>,
    #[serde(default)]
    patches: BTreeMap<String, Remote>,
    #[serde(default)]
    patchqueue: Option<RawPatchQueue>,
}

fn default_schema_version() -> u32 {
    1
}

/// A link (`.lnk`) or pin (`.pin`) file: where a package's upstream source
/// lives and which patches and patch queues apply to it.
///
/// Schema version 1 names a single repository (`URL`, `commitish`) and a
/// patch queue directory inside it. Version 2 adds named patch and patch
/// queue sources.
///
/// # Examples
///
/// ```
/// use planex::Link;
///
/// let link = Link::from_json(
///     "PINS/foo.pin",
///     r#"{"URL": "https://example.com/foo.git", "commitish": "v1.2", "patchqueue": "master"}"#,
/// )
/// .unwrap();
/// assert_eq!(link.name(), "foo");
/// assert_eq!(link.schema_version(), 1);
/// assert_eq!(link.patchqueue_sources()["patches"].url, "https://example.com/foo.git");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    path: PathBuf,
    schema_version: u32,
    url: Option<String>,
    commitish: Option<String>,
    specfile: Option<String>,
    patchqueue_dir: Option<String>,
    patches: BTreeMap<String, Remote>,
    patchqueues: BTreeMap<String, Remote>,
}

impl Link {
    /// Read a link or pin file.
    pub fn read(path: impl AsRef<Path>) -> Result<Link> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Link::from_json(path, &text)
    }

    /// Parse link JSON as if it had been read from `path`.
    pub fn from_json(path: impl AsRef<Path>, text: &str) -> Result<Link> {
        let path = path.as_ref();
        let invalid = |message: String| Error::InvalidLink {
            path: path.to_path_buf(),
            message,
        };

        let raw: RawLink = serde_json::from_str(text).map_err(|e| invalid(e.to_string()))?;
        if raw.schema_version == 0 || raw.schema_version > MAX_SCHEMA_VERSION {
            return Err(invalid(format!(
                "unsupported schema version {}",
                raw.schema_version
            )));
        }

        let (patchqueue_dir, patchqueues) = match (raw.schema_version, raw.patchqueue) {
            (_, None) => (None, BTreeMap::new()),
            (1, Some(RawPatchQueue::Directory(dir))) => (Some(dir), BTreeMap::new()),
            (1, Some(RawPatchQueue::Sources(_))) => {
                return Err(invalid(
                    "patchqueue must be a directory name in schema version 1".to_string(),
                ))
            }
            (_, Some(RawPatchQueue::Sources(sources))) => (None, sources),
            (_, Some(RawPatchQueue::Directory(_))) => {
                return Err(invalid(format!(
                    "patchqueue must be a map of sources in schema version {}",
                    raw.schema_version
                )))
            }
        };

        if raw.schema_version == 1 && raw.url.is_none() {
            return Err(invalid("missing URL".to_string()));
        }

        Ok(Link {
            path: path.to_path_buf(),
            schema_version: raw.schema_version,
            url: raw.url,
            commitish: raw.commitish,
            specfile: raw.specfile,
            patchqueue_dir,
            patches: raw.patches,
            patchqueues,
        })
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Logical package name: the file name without its extension.
    pub fn name(&self) -> &str {
        package_name(&self.path)
    }

    /// `SchemaVersion` of the file (1 when absent).
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Repository URL.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Tag, branch or commit of the repository.
    pub fn commitish(&self) -> Option<&str> {
        self.commitish.as_deref()
    }

    /// Spec named by the file, if any.
    pub fn specfile(&self) -> Option<&str> {
        self.specfile.as_deref()
    }

    /// Spec this link or pin applies to: `specfile`, else `SPECS/<name>.spec`.
    pub fn spec_path(&self) -> PathBuf {
        match &self.specfile {
            Some(specfile) => PathBuf::from(specfile),
            None => Path::new("SPECS").join(format!("{}.spec", self.name())),
        }
    }

    /// Patch queue directory of a schema version 1 file.
    pub fn patchqueue_dir(&self) -> Option<&str> {
        self.patchqueue_dir.as_deref()
    }

    /// Named patch sources. Always empty for schema version 1.
    pub fn patch_sources(&self) -> &BTreeMap<String, Remote> {
        &self.patches
    }

    /// Named patch queue sources.
    ///
    /// A schema version 1 file has exactly one, called `patches`, taken from
    /// the repository itself.
    pub fn patchqueue_sources(&self) -> BTreeMap<String, Remote> {
        if self.schema_version == 1 {
            let mut sources = BTreeMap::new();
            if let Some(url) = &self.url {
                sources.insert(
                    "patches".to_string(),
                    Remote {
                        url: url.clone(),
                        commitish: self.commitish.clone(),
                        prefix: self.patchqueue_dir.clone(),
                    },
                );
            }
            return sources;
        }
        self.patchqueues.clone()
    }

    /// URL to download `target` from.
    ///
    /// Schema version 1 files have a single archive. Otherwise the file
    /// stem of `target` selects a patch or patch queue source by name.
    pub fn source_url(&self, target: &str) -> Option<&str> {
        if self.schema_version == 1 {
            return self.url();
        }
        let stem = package_name(Path::new(target));
        self.patches
            .get(stem)
            .or_else(|| self.patchqueues.get(stem))
            .map(|remote| remote.url.as_str())
    }
}

/// File name of `path` without its (last) extension.
pub(crate) fn package_name(path: &Path) -> &str {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const V2: &str = r#"{
        "SchemaVersion": 2,
        "URL": "https://example.com/foo/archive/v1.0.tar.gz",
        "commitish": "v1.0",
        "specfile": "SPECS/foo.spec",
        "patches": {
            "foo-fixes": {"URL": "https://example.com/foo-fixes.patch"}
        },
        "patchqueue": {
            "foo-pq": {"URL": "https://example.com/foo-pq.tar.gz", "prefix": "master"}
        }
    }"#;

    #[test]
    fn schema_v1() {
        let link = Link::from_json(
            "foo.lnk",
            r#"{"URL": "https://example.com/foo.tar.gz", "patchqueue": "master"}"#,
        )
        .unwrap();
        assert_eq!(link.schema_version(), 1);
        assert_eq!(link.patchqueue_dir(), Some("master"));
        assert!(link.patch_sources().is_empty());
        let queues = link.patchqueue_sources();
        assert_eq!(queues.len(), 1);
        assert_eq!(queues["patches"].prefix.as_deref(), Some("master"));
        assert_eq!(link.source_url("SOURCES/foo/anything.tar"), Some("https://example.com/foo.tar.gz"));
        assert_eq!(link.spec_path(), PathBuf::from("SPECS/foo.spec"));
    }

    #[test]
    fn schema_v2() {
        let link = Link::from_json("LINKS/foo.lnk", V2).unwrap();
        assert_eq!(link.name(), "foo");
        assert_eq!(link.commitish(), Some("v1.0"));
        assert_eq!(link.specfile(), Some("SPECS/foo.spec"));
        assert_eq!(link.patch_sources().len(), 1);
        assert_eq!(link.patchqueue_sources()["foo-pq"].prefix.as_deref(), Some("master"));
        assert_eq!(
            link.source_url("SOURCES/foo/foo-fixes.patch"),
            Some("https://example.com/foo-fixes.patch")
        );
        assert_eq!(
            link.source_url("SOURCES/foo/foo-pq.tar"),
            Some("https://example.com/foo-pq.tar.gz")
        );
        assert_eq!(link.source_url("SOURCES/foo/other.tar"), None);
    }

    #[test]
    fn rejects_unknown_schema() {
        let err = Link::from_json("foo.lnk", r#"{"SchemaVersion": 3, "URL": "x"}"#).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidLink {
                path: PathBuf::from("foo.lnk"),
                message: "unsupported schema version 3".to_string()
            }
        );
    }

    #[test]
    fn rejects_mismatched_patchqueue() {
        assert!(Link::from_json(
            "foo.lnk",
            r#"{"SchemaVersion": 2, "URL": "x", "patchqueue": "master"}"#
        )
        .is_err());
        assert!(Link::from_json(
            "foo.lnk",
            r#"{"URL": "x", "patchqueue": {"a": {"URL": "y"}}}"#
        )
        .is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            Link::from_json("foo.lnk", "{not json"),
            Err(Error::InvalidLink { .. })
        ));
        assert!(matches!(
            Link::from_json("foo.lnk", "{}"),
            Err(Error::InvalidLink { .. })
        ));
    }

    #[test]
    fn remote_json_omits_unset_fields() {
        let remote = Remote {
            url: "https://example.com/foo.git".to_string(),
            commitish: Some("v1.2".to_string()),
            prefix: None,
        };
        assert_eq!(
            serde_json::to_string(&remote).unwrap(),
            r#"{"URL":"https://example.com/foo.git","commitish":"v1.2"}"#
        );
    }
}
