//! Makefile dependency rules for spec, link and pin files.
//!
//! The build is driven by `make`; these rules tell it which generated spec
//! and patch queue files depend on which inputs, so that editing a link or
//! pin causes the right things to be rebuilt.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::defines::Defines;
use crate::error::{Error, Result};
use crate::link::package_name;
use crate::macros::{MacroEnvironment, MacroLayer};

/// One `target: prerequisite` line of a Makefile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MakeRule {
    /// File that has to be rebuilt.
    pub target: String,
    /// File it depends on.
    pub prerequisite: String,
}

impl MakeRule {
    /// Create a rule.
    pub fn new(target: impl Into<String>, prerequisite: impl Into<String>) -> Self {
        MakeRule {
            target: target.into(),
            prerequisite: prerequisite.into(),
        }
    }
}

impl fmt::Display for MakeRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.prerequisite)
    }
}

/// Every `*.pin` file directly inside `dir`, sorted by path.
///
/// A missing directory simply has no pins.
pub fn find_pins(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "no pins directory");
            return Ok(Vec::new());
        }
        Err(e) => return Err(Error::io(dir, e)),
    };

    let mut pins = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        if path.extension().is_some_and(|ext| ext == "pin") {
            pins.push(path);
        }
    }
    pins.sort();
    Ok(pins)
}

/// Directory macros resolved for one package.
struct Dirs {
    topdir: PathBuf,
    specdir: PathBuf,
    sourcedir: PathBuf,
}

impl Dirs {
    fn resolve(env: &mut MacroEnvironment, layers: Vec<MacroLayer>) -> Dirs {
        env.scoped_all(layers, |env| Dirs {
            topdir: PathBuf::from(env.expand("%{_topdir}")),
            specdir: PathBuf::from(env.expand("%{_specdir}")),
            sourcedir: PathBuf::from(env.expand("%{_sourcedir}")),
        })
    }

    fn spec(&self, name: &str) -> String {
        self.specdir.join(format!("{name}.spec")).display().to_string()
    }

    fn deps(&self) -> String {
        self.topdir.join("deps").display().to_string()
    }
}

/// Rules for the given pins and spec or link inputs.
///
/// Inputs are told apart by extension (`.spec` or `.lnk`); anything else
/// is skipped with a warning. A pin overlays the link of the same name, so
/// no rules are produced for such a link.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use planex::{deps, Defines, MacroEnvironment};
///
/// let mut env = MacroEnvironment::with_rpm_defaults();
/// let defines: Defines = [("_topdir", ".")].into_iter().collect();
/// let rules = deps::pin_rules(&[], &[PathBuf::from("SPECS/foo.spec")], &mut env, &defines);
/// let lines: Vec<String> = rules.iter().map(|r| r.to_string()).collect();
/// assert_eq!(lines, vec!["./SPECS/foo.spec: SPECS/foo.spec", "./deps: ./SPECS/foo.spec"]);
/// ```
pub fn pin_rules(
    pins: &[PathBuf],
    inputs: &[PathBuf],
    env: &mut MacroEnvironment,
    defines: &Defines,
) -> Vec<MakeRule> {
    let mut rules = Vec::new();
    let mut pinned = BTreeSet::new();

    for pin in pins {
        let name = package_name(pin);
        pinned.insert(name);
        let mut layers = defines.layers();
        layers.push([("name", name)].into_iter().collect());
        let dirs = Dirs::resolve(env, layers);

        let spec = dirs.spec(name);
        let patches = dirs.sourcedir.join("patches.tar").display().to_string();
        let pin = pin.display().to_string();
        rules.push(MakeRule::new(&spec, &pin));
        rules.push(MakeRule::new(&patches, &pin));
        rules.push(MakeRule::new(
            &patches,
            Path::new("SPECS").join(format!("{name}.spec")).display().to_string(),
        ));
        rules.push(MakeRule::new(dirs.deps(), spec));
    }

    let dirs = Dirs::resolve(env, defines.layers());
    let (links, specs): (Vec<&PathBuf>, Vec<&PathBuf>) = inputs
        .iter()
        .filter(|input| match input.extension().and_then(|e| e.to_str()) {
            Some("lnk") | Some("spec") => true,
            _ => {
                warn!(path = %input.display(), "ignoring input that is neither a spec nor a link");
                false
            }
        })
        .partition(|input| input.extension().is_some_and(|e| e == "lnk"));

    for link in links {
        let name = package_name(link);
        if pinned.contains(name) {
            debug!(link = %link.display(), "link overridden by pin");
            continue;
        }
        let spec = dirs.spec(name);
        let link = link.display().to_string();
        rules.push(MakeRule::new(&spec, &link));
        rules.push(MakeRule::new(dirs.deps(), spec));
        rules.push(MakeRule::new(dirs.deps(), link));
    }

    for spec_file in specs {
        let spec = dirs.spec(package_name(spec_file));
        rules.push(MakeRule::new(&spec, spec_file.display().to_string()));
        rules.push(MakeRule::new(dirs.deps(), spec));
    }

    rules
}
