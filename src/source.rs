use std::fmt;
use std::path::PathBuf;

use url::Url;

use crate::macros::MacroEnvironment;
use crate::spec::Spec;

/// Whether a declaration is a `SourceN:` or a `PatchN:` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKind {
    /// An original source archive or auxiliary file.
    Source,
    /// A patch applied during `%prep`.
    Patch,
}

impl SourceKind {
    /// Prefix of the spec tag and of the per-entry macro (`SOURCE0`, `PATCH3`).
    pub fn tag(self) -> &'static str {
        match self {
            SourceKind::Source => "Source",
            SourceKind::Patch => "Patch",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One `Source` or `Patch` declaration of a spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Source {
    pub(crate) url: String,
    pub(crate) order: u32,
    pub(crate) kind: SourceKind,
    pub(crate) position: usize,
}

impl Source {
    /// The declared URL, macro-expanded. May be a bare file name.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The tag index (`3` for `Patch3:`).
    pub fn order(&self) -> u32 {
        self.order
    }

    /// Source or patch.
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Position among all declarations of the spec, counting from 0.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Whether this is a `SourceN:` entry.
    pub fn is_source(&self) -> bool {
        self.kind == SourceKind::Source
    }

    /// Whether this is a `PatchN:` entry.
    pub fn is_patch(&self) -> bool {
        self.kind == SourceKind::Patch
    }

    /// Whether the URL has no network authority, i.e. the file is expected
    /// to be shipped next to the spec rather than downloaded.
    ///
    /// # Examples
    ///
    /// ```
    /// # use planex::{Defines, MacroEnvironment, Spec, SpecOptions};
    /// # let text = "Name: foo\nVersion: 1\nRelease: 1\n\
    /// #   Source0: https://example.com/foo-1.tar.gz\nPatch0: fix.patch\n";
    /// # let mut env = MacroEnvironment::with_rpm_defaults();
    /// # let spec = Spec::from_text("foo.spec", text, &mut env, &Defines::new(), &SpecOptions::default()).unwrap();
    /// let sources = spec.sources();
    /// assert!(sources[0].is_remote());
    /// assert!(sources[1].is_local());
    /// ```
    pub fn is_local(&self) -> bool {
        match Url::parse(&self.url) {
            Ok(url) => url.host_str().map_or(true, str::is_empty),
            Err(_) => true,
        }
    }

    /// Whether the file has to be downloaded.
    pub fn is_remote(&self) -> bool {
        !self.is_local()
    }

    /// The final `/`-separated segment of the URL.
    ///
    /// Only this part of a declaration is significant to rpm when it looks
    /// for the file, so `http://example.com/a/foo.tar.gz` and
    /// `ftp://mirror/b/foo.tar.gz` are the same source on disk.
    pub fn basename(&self) -> &str {
        basename(&self.url)
    }

    /// Where rpm expects to find this file: the expansion of
    /// `%{_sourcedir}` in the spec's context, joined with [`basename`](Self::basename).
    pub fn path(&self, spec: &Spec, env: &mut MacroEnvironment) -> PathBuf {
        let dir = spec.expand_macro("%{_sourcedir}", env);
        PathBuf::from(dir).join(self.basename())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}: {}", self.kind, self.order, self.url)
    }
}

/// Text after the last `/` of `target`.
pub(crate) fn basename(target: &str) -> &str {
    target.rsplit('/').next().unwrap_or(target)
}
