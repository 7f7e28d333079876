use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::defines::Defines;
use crate::dependency::{strip_arch_suffix, Dependency};
use crate::diagnostic;
use crate::error::{Error, Result};
use crate::macros::{MacroEnvironment, MacroLayer};
use crate::nevra::Nevra;
use crate::parser::{self, ParsedSpec};
use crate::source::{basename, Source, SourceKind};

/// Options controlling [`Spec::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecOptions {
    /// Require the file name (up to its first `.`) to equal the package name.
    pub check_package_name: bool,
}

impl Default for SpecOptions {
    fn default() -> Self {
        SpecOptions {
            check_package_name: true,
        }
    }
}

/// One binary package produced by a spec: the main package or a
/// `%package` stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryPackage {
    nevra: Nevra,
    summary: Option<String>,
    provides: Vec<Dependency>,
    requires: Vec<Dependency>,
}

impl BinaryPackage {
    /// Package name.
    pub fn name(&self) -> &str {
        &self.nevra.name
    }

    /// Target architecture (`noarch` or the build target CPU).
    pub fn arch(&self) -> &str {
        &self.nevra.arch
    }

    /// Full identity of the package.
    pub fn nevra(&self) -> &Nevra {
        &self.nevra
    }

    /// The `Summary:` of the package, if it has one.
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Declared `Provides:`.
    pub fn provides(&self) -> &[Dependency] {
        &self.provides
    }

    /// Declared `Requires:`.
    pub fn requires(&self) -> &[Dependency] {
        &self.requires
    }

    /// File rpmbuild writes for this package: `%{_build_name_fmt}` filled in
    /// for this package and placed under `%{_rpmdir}`.
    pub fn path(&self, spec: &Spec, env: &mut MacroEnvironment) -> PathBuf {
        let (format, rpmdir) = env.scoped_all(spec.query_layers(&self.nevra), |env| {
            (env.expand("%{_build_name_fmt}"), env.expand("%{_rpmdir}"))
        });
        PathBuf::from(rpmdir).join(self.nevra.query_format(&format))
    }
}

/// A parsed rpm spec file.
///
/// A `Spec` is immutable. It keeps the overrides it was parsed with and
/// every query re-applies them (plus the spec's own definitions and the
/// relevant package identity) on top of the caller's environment for the
/// duration of the call. Nothing is cached, so queries reflect the state
/// of the environment at call time.
///
/// Those overrides sit above the caller's environment and always carry a
/// `dist`, empty unless one was given. A `dist` or `_topdir` pushed onto
/// `env` after parsing is therefore shadowed; use [`Spec::with_defines`]
/// to query the same spec under other overrides.
///
/// # Examples
///
/// ```
/// use planex::{Defines, MacroEnvironment, SourceKind, Spec, SpecOptions};
///
/// let text = "\
/// Name: foo
/// Version: 1.2.3
/// Release: 1%{?dist}
/// Source0: http://example.com/foo-1.2.3.tar.gz
/// Patch0: fix.patch
/// ";
/// let mut env = MacroEnvironment::with_rpm_defaults();
/// let defines: Defines = [("_topdir", "/build")].into_iter().collect();
/// let spec = Spec::from_text("foo.spec", text, &mut env, &defines, &SpecOptions::default()).unwrap();
///
/// let patch = spec.source("fix.patch", &mut env).unwrap();
/// assert_eq!(patch.kind(), SourceKind::Patch);
/// assert_eq!(patch.path(&spec, &mut env).to_str(), Some("/build/SOURCES/fix.patch"));
/// assert_eq!(
///     spec.source_package_path(&mut env).to_str(),
///     Some("/build/SRPMS/foo-1.2.3-1.src.rpm")
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spec {
    path: PathBuf,
    lines: Vec<String>,
    name: String,
    version: String,
    release: String,
    epoch: Option<u32>,
    sources: Vec<Source>,
    packages: Vec<BinaryPackage>,
    buildrequires: Vec<Dependency>,
    defines: Defines,
    local: MacroLayer,
}

impl Spec {
    /// Read and parse the spec file at `path`.
    pub fn parse(
        path: impl AsRef<Path>,
        env: &mut MacroEnvironment,
        defines: &Defines,
        options: &SpecOptions,
    ) -> Result<Spec> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Spec::from_text(path, &text, env, defines, options)
    }

    /// Parse spec text as if it had been read from `path`.
    ///
    /// `path` is used for the package name check, for `%include`s and in
    /// error messages; it is not read.
    pub fn from_text(
        path: impl AsRef<Path>,
        text: &str,
        env: &mut MacroEnvironment,
        defines: &Defines,
        options: &SpecOptions,
    ) -> Result<Spec> {
        let path = path.as_ref();
        debug!(path = %path.display(), "parsing spec");

        let parsed = env.scoped_all(defines.layers(), |env| parser::parse(path, text, env));
        diagnostic::resurface(path, &parsed.diagnostics)?;

        let ParsedSpec {
            name,
            version,
            release,
            epoch,
            sources,
            packages,
            buildrequires,
            local,
            ..
        } = parsed;
        let missing = |tag: &str| Error::parse(path, None, format!("{tag} field must be present in package"));
        let name = name.ok_or_else(|| missing("Name"))?;
        let version = version.ok_or_else(|| missing("Version"))?;
        let release = release.ok_or_else(|| missing("Release"))?;

        if options.check_package_name {
            let stem = path
                .file_name()
                .and_then(|f| f.to_str())
                .and_then(|f| f.split('.').next())
                .unwrap_or_default();
            if stem != name {
                return Err(Error::SpecNameMismatch {
                    file: path.to_path_buf(),
                    package: name,
                });
            }
        }

        let packages = packages
            .into_iter()
            .map(|decl| BinaryPackage {
                nevra: Nevra {
                    name: decl.name,
                    epoch,
                    version: version.clone(),
                    release: release.clone(),
                    arch: decl.arch.unwrap_or_default(),
                },
                summary: decl.summary,
                provides: decl.provides,
                requires: decl.requires,
            })
            .collect();

        Ok(Spec {
            path: path.to_path_buf(),
            lines: text.lines().map(str::to_string).collect(),
            name,
            version,
            release,
            epoch,
            sources,
            packages,
            buildrequires,
            defines: defines.clone(),
            local,
        })
    }

    /// The same spec, queried under different overrides from now on.
    ///
    /// Tag values were expanded when the spec was parsed and do not change.
    pub fn with_defines(&self, defines: Defines) -> Spec {
        Spec {
            defines,
            ..self.clone()
        }
    }

    /// Path of the spec file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The raw lines of the spec file.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Overrides every query is evaluated with.
    pub fn defines(&self) -> &Defines {
        &self.defines
    }

    /// Name of the source package.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Upstream version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Release, as expanded at parse time.
    pub fn release(&self) -> &str {
        &self.release
    }

    /// Epoch, if declared.
    pub fn epoch(&self) -> Option<u32> {
        self.epoch
    }

    /// Identity of the main package.
    pub fn nevra(&self) -> &Nevra {
        self.main_package().nevra()
    }

    /// Sources and patches, in declaration order.
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Produced packages: the main package first, then every `%package`
    /// in declaration order.
    pub fn packages(&self) -> &[BinaryPackage] {
        &self.packages
    }

    fn main_package(&self) -> &BinaryPackage {
        &self.packages[0]
    }

    /// Every capability the spec's packages provide: their names and their
    /// `Provides:`, with architecture qualifiers removed.
    pub fn provides(&self) -> BTreeSet<String> {
        self.packages
            .iter()
            .flat_map(|p| {
                std::iter::once(p.name().to_string()).chain(
                    p.provides
                        .iter()
                        .map(|d| strip_arch_suffix(&d.name).to_string()),
                )
            })
            .collect()
    }

    /// Union of the runtime requirements of every package.
    pub fn requires(&self) -> BTreeSet<String> {
        self.packages
            .iter()
            .flat_map(|p| p.requires.iter().map(|d| d.name.clone()))
            .collect()
    }

    /// Names needed to build the spec.
    pub fn buildrequires(&self) -> BTreeSet<String> {
        self.buildrequires.iter().map(|d| d.name.clone()).collect()
    }

    /// Highest patch number, or `None` if the spec has no patches.
    pub fn highest_patch(&self) -> Option<u32> {
        self.sources
            .iter()
            .filter(|s| s.kind() == SourceKind::Patch)
            .map(Source::order)
            .max()
    }

    /// Expand `text` in the context of the main package.
    pub fn expand_macro(&self, text: &str, env: &mut MacroEnvironment) -> String {
        env.scoped_all(self.query_layers(self.nevra()), |env| env.expand(text))
    }

    /// Find the declaration rpm would use for a file called like the last
    /// path segment of `target`.
    ///
    /// When several declarations resolve to the same file name the one
    /// declared last wins, as it does for rpmbuild.
    pub fn source(&self, target: &str, env: &mut MacroEnvironment) -> Result<&Source> {
        let wanted = basename(target);
        let dir = PathBuf::from(self.expand_macro("%{_sourcedir}", env));
        self.sources
            .iter()
            .filter(|s| {
                dir.join(s.basename())
                    .file_name()
                    .is_some_and(|name| name == wanted)
            })
            .max_by_key(|s| s.position())
            .ok_or_else(|| Error::NotFound(wanted.to_string()))
    }

    /// Source package rpmbuild writes: `%{_srcrpmdir}/<name>-<version>-<release>.src.rpm`.
    pub fn source_package_path(&self, env: &mut MacroEnvironment) -> PathBuf {
        let dir = self.expand_macro("%{_srcrpmdir}", env);
        PathBuf::from(dir).join(format!("{}.src.rpm", self.nevra().nvr()))
    }

    /// Binary packages rpmbuild writes, one per package in declaration order.
    pub fn binary_package_paths(&self, env: &mut MacroEnvironment) -> Vec<PathBuf> {
        self.packages.iter().map(|p| p.path(self, env)).collect()
    }

    /// Layers pushed for a query about the package `nevra`.
    pub(crate) fn query_layers(&self, nevra: &Nevra) -> Vec<MacroLayer> {
        let mut layers = self.defines.layers();
        layers.push(self.local.clone());
        layers.push(nevra.macro_layer());
        layers
    }
}
