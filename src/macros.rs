use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use tracing::{trace, warn};

use crate::error::{Error, Result};

/// Maximum nesting of macro-in-macro expansion, matching rpm's own limit.
const MAX_DEPTH: usize = 64;

/// One scope layer of macro definitions.
///
/// A name may be mapped to `None`, which hides any definition made in a
/// lower layer (this is what `%undefine` produces).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroLayer {
    entries: BTreeMap<String, Option<String>>,
}

impl MacroLayer {
    /// Create an empty layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define `name` as `value` in this layer, replacing an earlier entry.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), Some(value.into()));
    }

    /// Hide `name` from lower layers.
    pub fn undefine(&mut self, name: impl Into<String>) {
        self.entries.insert(name.into(), None);
    }

    /// Look up `name` in this layer only.
    ///
    /// Returns `None` if the layer says nothing about `name`, `Some(None)`
    /// if it hides it and `Some(Some(value))` if it defines it.
    pub fn get(&self, name: &str) -> Option<Option<&str>> {
        self.entries.get(name).map(|v| v.as_deref())
    }

    /// Whether this layer mentions `name` at all.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of entries in the layer.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the layer has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the definitions (hidden names are skipped).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
    }
}

impl<K, V> FromIterator<(K, V)> for MacroLayer
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut layer = MacroLayer::new();
        for (k, v) in iter {
            layer.define(k, v);
        }
        layer
    }
}

/// A stack of macro layers used to expand spec text and path templates.
///
/// Every logical operation owns its own environment; nothing here is
/// process-wide, so two specs processed side by side cannot see each
/// other's definitions.
///
/// # Examples
///
/// ```
/// use planex::{MacroEnvironment, MacroLayer};
///
/// let mut env = MacroEnvironment::new();
/// env.push([("dist", ".el6")].into_iter().collect());
/// env.push([("dist", ".el7")].into_iter().collect());
/// assert_eq!(env.expand("%{dist}"), ".el7");
/// env.pop().unwrap();
/// assert_eq!(env.expand("%{dist}"), ".el6");
/// env.pop().unwrap();
/// assert_eq!(env.expand("%{dist}"), "%{dist}");
/// assert!(env.pop().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MacroEnvironment {
    layers: Vec<MacroLayer>,
}

impl MacroEnvironment {
    /// Create an environment with no layers at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an environment whose bottom layer holds the rpmbuild defaults
    /// for directories, the binary package name format and the host
    /// architecture.
    pub fn with_rpm_defaults() -> Self {
        let mut env = Self::new();
        env.push(rpm_defaults());
        env
    }

    /// Push a layer; its definitions shadow those of every lower layer.
    pub fn push(&mut self, layer: MacroLayer) {
        trace!(depth = self.layers.len() + 1, entries = layer.len(), "push macro layer");
        self.layers.push(layer);
    }

    /// Remove the most recently pushed layer.
    pub fn pop(&mut self) -> Result<MacroLayer> {
        let layer = self.layers.pop().ok_or(Error::StackUnderflow)?;
        trace!(depth = self.layers.len(), "pop macro layer");
        Ok(layer)
    }

    /// Number of layers currently on the stack.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// The most recently pushed layer.
    pub fn top(&self) -> Option<&MacroLayer> {
        self.layers.last()
    }

    /// Define `name` in the topmost layer.
    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let top = self.layers.last_mut().ok_or(Error::StackUnderflow)?;
        top.define(name, value);
        Ok(())
    }

    /// Hide `name` in the topmost layer.
    pub fn undefine(&mut self, name: impl Into<String>) -> Result<()> {
        let top = self.layers.last_mut().ok_or(Error::StackUnderflow)?;
        top.undefine(name);
        Ok(())
    }

    /// The raw (unexpanded) value of `name`, resolved top-down.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.get(name))
            .flatten()
    }

    /// Whether `name` currently resolves to a definition.
    pub fn is_defined(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Push `layer` and return a guard that pops it (and anything pushed
    /// above it) when dropped.
    pub fn enter(&mut self, layer: MacroLayer) -> MacroScope<'_> {
        let base = self.layers.len();
        self.push(layer);
        MacroScope {
            env: self,
            base,
            expected: base + 1,
        }
    }

    /// Run `f` with `layer` pushed; the layer is popped on every exit path.
    pub fn scoped<T>(&mut self, layer: MacroLayer, f: impl FnOnce(&mut MacroEnvironment) -> T) -> T {
        let mut scope = self.enter(layer);
        f(&mut scope)
    }

    /// Run `f` with every layer in `layers` pushed in order.
    pub fn scoped_all<T>(
        &mut self,
        layers: impl IntoIterator<Item = MacroLayer>,
        f: impl FnOnce(&mut MacroEnvironment) -> T,
    ) -> T {
        let base = self.layers.len();
        let mut scope = MacroScope {
            env: self,
            base,
            expected: base,
        };
        for layer in layers {
            scope.env.push(layer);
            scope.expected += 1;
        }
        f(&mut scope)
    }

    /// Expand every macro reference in `text`.
    ///
    /// References to undefined macros are left as literal text. Shell
    /// (`%(...)`) and Lua (`%{lua:...}`) forms are never evaluated.
    pub fn expand(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        self.expand_into(text, 0, &mut out);
        out
    }

    fn expand_into(&self, text: &str, depth: usize, out: &mut String) {
        let mut rest = text;
        while let Some(pos) = rest.find('%') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            rest = match after.chars().next() {
                Some('%') => {
                    out.push('%');
                    &after[1..]
                }
                Some('{') => match matching_close(after, '{', '}') {
                    Some(end) => {
                        let body = &after[1..end];
                        self.expand_braced(body, depth, out);
                        &after[end + 1..]
                    }
                    None => {
                        out.push('%');
                        after
                    }
                },
                Some('(') => match matching_close(after, '(', ')') {
                    Some(end) => {
                        out.push('%');
                        out.push_str(&after[..=end]);
                        &after[end + 1..]
                    }
                    None => {
                        out.push('%');
                        after
                    }
                },
                Some('?') if starts_identifier(&after[1..]) => {
                    let len = identifier_len(&after[1..]);
                    let name = &after[1..1 + len];
                    if let Some(value) = self.get(name) {
                        self.expand_value(name, value, depth, out);
                    }
                    &after[1 + len..]
                }
                Some(_) if starts_identifier(after) => {
                    let len = identifier_len(after);
                    let name = &after[..len];
                    match self.get(name) {
                        Some(value) => self.expand_value(name, value, depth, out),
                        None => {
                            out.push('%');
                            out.push_str(name);
                        }
                    }
                    &after[len..]
                }
                _ => {
                    out.push('%');
                    after
                }
            };
        }
        out.push_str(rest);
    }

    /// Expand the body of a `%{...}` reference.
    fn expand_braced(&self, body: &str, depth: usize, out: &mut String) {
        let (head, arg) = match body.split_once(':') {
            Some((head, arg)) => (head, Some(arg)),
            None => (body, None),
        };
        let name = head.trim_start_matches(['!', '?']);
        let flags = &head[..head.len() - name.len()];
        let conditional = flags.contains('?');
        let negated = flags.contains('!');

        if conditional {
            let defined = self.is_defined(name);
            if defined != negated {
                match (arg, self.get(name)) {
                    (Some(text), _) => self.expand_nested(text, depth, out),
                    (None, Some(value)) if !negated => self.expand_value(name, value, depth, out),
                    _ => {}
                }
            }
            return;
        }

        if negated {
            out.push_str("%{");
            out.push_str(body);
            out.push('}');
            return;
        }

        if arg.is_none() {
            if let Some(enabled) = self.build_option(name) {
                out.push(if enabled { '1' } else { '0' });
                return;
            }
        }

        match (name, arg) {
            ("expand", Some(text)) => {
                let once = {
                    let mut tmp = String::new();
                    self.expand_nested(text, depth, &mut tmp);
                    tmp
                };
                self.expand_nested(&once, depth, out);
            }
            (_, None) => match self.get(name) {
                Some(value) => self.expand_value(name, value, depth, out),
                None => {
                    out.push_str("%{");
                    out.push_str(body);
                    out.push('}');
                }
            },
            // Built-ins such as %{lua:...} are not evaluated.
            (_, Some(_)) => {
                out.push_str("%{");
                out.push_str(body);
                out.push('}');
            }
        }
    }

    /// `%{with NAME}` and `%{without NAME}`.
    fn build_option(&self, body: &str) -> Option<bool> {
        let (word, option) = body.split_once(char::is_whitespace)?;
        let enabled = self.is_defined(&format!("with_{}", option.trim()));
        match word {
            "with" => Some(enabled),
            "without" => Some(!enabled),
            _ => None,
        }
    }

    fn expand_value(&self, name: &str, value: &str, depth: usize, out: &mut String) {
        if depth >= MAX_DEPTH {
            warn!(macro_name = name, "too many levels of macro recursion");
            out.push_str("%{");
            out.push_str(name);
            out.push('}');
            return;
        }
        self.expand_into(value, depth + 1, out);
    }

    fn expand_nested(&self, text: &str, depth: usize, out: &mut String) {
        if depth >= MAX_DEPTH {
            warn!("too many levels of macro recursion");
            out.push_str(text);
            return;
        }
        self.expand_into(text, depth + 1, out);
    }
}

/// Scope guard returned by [`MacroEnvironment::enter`].
///
/// Dereferences to the environment. Dropping the guard restores the stack
/// to the depth it had before the layer was pushed.
#[derive(Debug)]
pub struct MacroScope<'a> {
    env: &'a mut MacroEnvironment,
    base: usize,
    expected: usize,
}

impl Deref for MacroScope<'_> {
    type Target = MacroEnvironment;

    fn deref(&self) -> &MacroEnvironment {
        self.env
    }
}

impl DerefMut for MacroScope<'_> {
    fn deref_mut(&mut self) -> &mut MacroEnvironment {
        self.env
    }
}

impl Drop for MacroScope<'_> {
    fn drop(&mut self) {
        if self.env.layers.len() != self.expected {
            warn!(
                expected = self.expected,
                actual = self.env.layers.len(),
                "unbalanced macro layers inside scope"
            );
        }
        self.env.layers.truncate(self.base);
        trace!(depth = self.base, "leave macro scope");
    }
}

/// The rpmbuild defaults every spec query relies on.
pub fn rpm_defaults() -> MacroLayer {
    let topdir = dirs::home_dir()
        .map(|home| home.join("rpmbuild").display().to_string())
        .unwrap_or_else(|| "rpmbuild".to_string());
    let arch = host_arch();

    let mut layer = MacroLayer::new();
    layer.define("_topdir", topdir);
    layer.define("_sourcedir", "%{_topdir}/SOURCES");
    layer.define("_specdir", "%{_topdir}/SPECS");
    layer.define("_builddir", "%{_topdir}/BUILD");
    layer.define("_srcrpmdir", "%{_topdir}/SRPMS");
    layer.define("_rpmdir", "%{_topdir}/RPMS");
    layer.define(
        "_build_name_fmt",
        "%%{ARCH}/%%{NAME}-%%{VERSION}-%%{RELEASE}.%%{ARCH}.rpm",
    );
    layer.define("_arch", arch);
    layer.define("_target_cpu", arch);
    layer.define("_os", "linux");
    layer.define("_target_os", "linux");
    layer
}

/// RPM's name for the architecture this binary runs on.
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86" => "i386",
        "powerpc" => "ppc",
        "powerpc64" => "ppc64",
        other => other,
    }
}

/// Position of the delimiter closing the one at `text[0]`, honouring nesting.
fn matching_close(text: &str, open: char, close: char) -> Option<usize> {
    let mut level = 0usize;
    for (i, c) in text.char_indices() {
        if c == open {
            level += 1;
        } else if c == close {
            level -= 1;
            if level == 0 {
                return Some(i);
            }
        }
    }
    None
}

fn starts_identifier(s: &str) -> bool {
    s.starts_with(|c: char| c == '_' || c.is_ascii_alphabetic())
}

fn identifier_len(s: &str) -> usize {
    s.find(|c: char| !(c == '_' || c.is_ascii_alphanumeric()))
        .unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(pairs: &[(&str, &str)]) -> MacroLayer {
        pairs.iter().copied().collect()
    }

    #[test]
    fn later_layers_shadow_earlier() {
        let mut env = MacroEnvironment::new();
        env.push(layer(&[("dist", ".el6")]));
        env.push(layer(&[("dist", ".el7")]));
        assert_eq!(env.expand("%{dist}"), ".el7");
        env.pop().unwrap();
        assert_eq!(env.expand("%{dist}"), ".el6");
        env.pop().unwrap();
        assert_eq!(env.expand("%{dist}"), "%{dist}");
    }

    #[test]
    fn pop_empty_is_underflow() {
        let mut env = MacroEnvironment::new();
        assert_eq!(env.pop().unwrap_err(), Error::StackUnderflow);
    }

    #[test]
    fn define_without_layer_is_underflow() {
        let mut env = MacroEnvironment::new();
        assert_eq!(env.define("a", "b").unwrap_err(), Error::StackUnderflow);
    }

    #[test]
    fn bare_and_braced_references() {
        let mut env = MacroEnvironment::new();
        env.push(layer(&[("name", "foo"), ("version", "1.0")]));
        assert_eq!(env.expand("%name-%{version}.tar.gz"), "foo-1.0.tar.gz");
        assert_eq!(env.expand("%{name}_x"), "foo_x");
        // A bare reference consumes every identifier character.
        assert_eq!(env.expand("%name_x"), "%name_x");
    }

    #[test]
    fn recursive_values() {
        let mut env = MacroEnvironment::new();
        env.push(layer(&[
            ("_topdir", "."),
            ("_sourcedir", "%_topdir/SOURCES/%name"),
            ("name", "ocaml-cohttp"),
        ]));
        assert_eq!(env.expand("%{_sourcedir}"), "./SOURCES/ocaml-cohttp");
    }

    #[test]
    fn conditional_forms() {
        let mut env = MacroEnvironment::new();
        env.push(layer(&[("dist", ".el7")]));
        assert_eq!(env.expand("1%{?dist}"), "1.el7");
        assert_eq!(env.expand("1%{?nothing}"), "1");
        assert_eq!(env.expand("%{?dist:yes}"), "yes");
        assert_eq!(env.expand("%{?nothing:yes}"), "");
        assert_eq!(env.expand("%{!?nothing:fallback}"), "fallback");
        assert_eq!(env.expand("%{!?dist:fallback}"), "");
        assert_eq!(env.expand("%?dist"), ".el7");
        assert_eq!(env.expand("%?nothing-"), "-");
    }

    #[test]
    fn escaped_percent_is_not_rescanned() {
        let mut env = MacroEnvironment::new();
        env.push(layer(&[("fmt", "%%{NAME}-%%{VERSION}"), ("NAME", "oops")]));
        assert_eq!(env.expand("%{fmt}"), "%{NAME}-%{VERSION}");
        assert_eq!(env.expand("100%%"), "100%");
    }

    #[test]
    fn shell_and_lua_left_literal() {
        let env = MacroEnvironment::new();
        assert_eq!(env.expand("%(uname -m)"), "%(uname -m)");
        assert_eq!(env.expand("%{lua: print(1)}"), "%{lua: print(1)}");
    }

    #[test]
    fn expand_builtin() {
        let mut env = MacroEnvironment::new();
        env.push(layer(&[("inner", "%%{outer}"), ("outer", "done")]));
        assert_eq!(env.expand("%{expand:%{inner}}"), "done");
    }

    #[test]
    fn build_options() {
        let mut env = MacroEnvironment::new();
        env.push(layer(&[("with_tests", "1")]));
        assert_eq!(env.expand("%{with tests} %{without tests}"), "1 0");
        assert_eq!(env.expand("%{with docs} %{without docs}"), "0 1");
    }

    #[test]
    fn undefine_hides_lower_layers() {
        let mut env = MacroEnvironment::new();
        env.push(layer(&[("dist", ".el7")]));
        env.push(MacroLayer::new());
        env.undefine("dist").unwrap();
        assert_eq!(env.expand("x%{?dist}"), "x");
        assert!(!env.is_defined("dist"));
        env.pop().unwrap();
        assert!(env.is_defined("dist"));
    }

    #[test]
    fn self_reference_terminates() {
        let mut env = MacroEnvironment::new();
        env.push(layer(&[("loop", "%{loop}")]));
        assert_eq!(env.expand("%{loop}"), "%{loop}");
    }

    #[test]
    fn unterminated_brace_is_literal() {
        let env = MacroEnvironment::new();
        assert_eq!(env.expand("%{name"), "%{name");
        assert_eq!(env.expand("50% off"), "50% off");
    }

    #[test]
    fn scoped_pops_on_error() {
        let mut env = MacroEnvironment::new();
        env.push(layer(&[("dist", ".el6")]));
        let result: Result<()> = env.scoped(layer(&[("dist", ".el7")]), |env| {
            assert_eq!(env.expand("%{dist}"), ".el7");
            Err(Error::NotFound("x".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(env.depth(), 1);
        assert_eq!(env.expand("%{dist}"), ".el6");
    }

    #[test]
    fn scope_guard_restores_extra_pushes() {
        let mut env = MacroEnvironment::new();
        {
            let mut scope = env.enter(layer(&[("a", "1")]));
            scope.push(layer(&[("b", "2")]));
            assert_eq!(scope.expand("%a%b"), "12");
        }
        assert_eq!(env.depth(), 0);
    }

    #[test]
    fn scoped_all_pushes_in_order() {
        let mut env = MacroEnvironment::new();
        let depth = env.scoped_all(
            [layer(&[("x", "first")]), layer(&[("x", "second")])],
            |env| {
                assert_eq!(env.expand("%x"), "second");
                env.depth()
            },
        );
        assert_eq!(depth, 2);
        assert_eq!(env.depth(), 0);
    }

    #[test]
    fn independent_environments_do_not_share() {
        let mut a = MacroEnvironment::new();
        let mut b = MacroEnvironment::new();
        a.push(layer(&[("dist", ".el6")]));
        b.push(layer(&[("dist", ".el7")]));
        let handle = std::thread::spawn(move || b.expand("%{dist}"));
        assert_eq!(a.expand("%{dist}"), ".el6");
        assert_eq!(handle.join().unwrap(), ".el7");
    }

    #[test]
    fn rpm_defaults_resolve_paths() {
        let mut env = MacroEnvironment::with_rpm_defaults();
        env.push(layer(&[("_topdir", "/build")]));
        assert_eq!(env.expand("%{_sourcedir}"), "/build/SOURCES");
        assert_eq!(env.expand("%{_srcrpmdir}"), "/build/SRPMS");
        assert_eq!(
            env.expand("%{_build_name_fmt}"),
            "%{ARCH}/%{NAME}-%{VERSION}-%{RELEASE}.%{ARCH}.rpm"
        );
    }
}
