//! Line-oriented grammar for rpm spec files.
//!
//! The grammar covers what is needed to derive package metadata: the
//! preamble of the main package and of every `%package` stanza, macro
//! definitions, conditionals and `%include`. Section bodies (`%prep`,
//! `%build`, `%files`, ...) are skipped apart from the directives that
//! change the macro environment.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use winnow::ascii::space0;
use winnow::combinator::{delimited, opt, terminated};
use winnow::prelude::*;
use winnow::token::take_while;

use crate::dependency::Dependency;
use crate::diagnostic::Diagnostic;
use crate::expr::evaluate_condition;
use crate::macros::{host_arch, MacroEnvironment, MacroLayer};
use crate::source::{basename, Source, SourceKind};

/// Nesting limit for `%include`.
const MAX_INCLUDE_DEPTH: usize = 16;

/// Directives that start a section and end the current preamble.
const SECTIONS: &[&str] = &[
    "description",
    "prep",
    "generate_buildrequires",
    "conf",
    "build",
    "install",
    "check",
    "clean",
    "files",
    "changelog",
    "pre",
    "post",
    "preun",
    "postun",
    "pretrans",
    "posttrans",
    "preuntrans",
    "postuntrans",
    "verifyscript",
    "triggerprein",
    "triggerin",
    "triggerun",
    "triggerpostun",
    "filetriggerin",
    "filetriggerun",
    "filetriggerpostun",
    "transfiletriggerin",
    "transfiletriggerun",
    "transfiletriggerpostun",
    "sepolicy",
];

/// A package preamble as declared in the spec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PackageDecl {
    /// Full package name. Empty for the main package until `Name:` is known.
    pub name: String,
    pub arch: Option<String>,
    pub summary: Option<String>,
    pub provides: Vec<Dependency>,
    pub requires: Vec<Dependency>,
}

/// Everything the grammar extracted from one spec file.
#[derive(Debug, Clone, Default)]
pub(crate) struct ParsedSpec {
    pub name: Option<String>,
    pub version: Option<String>,
    pub release: Option<String>,
    pub epoch: Option<u32>,
    pub sources: Vec<Source>,
    /// Main package first, then `%package` stanzas in declaration order.
    pub packages: Vec<PackageDecl>,
    pub buildrequires: Vec<Dependency>,
    /// Definitions made by the spec itself (`%define`, `%global`, tags).
    pub local: MacroLayer,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble(usize),
    Body,
}

#[derive(Debug, Clone, Copy)]
struct Conditional {
    line: usize,
    parent_active: bool,
    taken: bool,
    active: bool,
    seen_else: bool,
}

/// Parse `text`, the contents of the spec at `path`.
///
/// A fresh layer is pushed onto `env` for the spec's own definitions and
/// popped again before returning; its contents end up in
/// [`ParsedSpec::local`].
pub(crate) fn parse(path: &Path, text: &str, env: &mut MacroEnvironment) -> ParsedSpec {
    let mut scope = env.enter(MacroLayer::new());
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut parser = SpecParser {
        env: &mut *scope,
        dir,
        origin: None,
        include_depth: 0,
        section: Section::Preamble(0),
        conditionals: Vec::new(),
        out: ParsedSpec {
            packages: vec![PackageDecl::default()],
            ..ParsedSpec::default()
        },
    };
    parser.process_text(text);
    parser.finish()
}

struct SpecParser<'a> {
    env: &'a mut MacroEnvironment,
    dir: PathBuf,
    /// Included file currently being read, if any.
    origin: Option<PathBuf>,
    include_depth: usize,
    section: Section,
    conditionals: Vec<Conditional>,
    out: ParsedSpec,
}

impl SpecParser<'_> {
    fn process_text(&mut self, text: &str) {
        let lines: Vec<&str> = text.lines().collect();
        let mut i = 0;
        while i < lines.len() {
            let line_no = i + 1;
            let mut line = lines[i].to_string();
            i += 1;
            if is_definition(&line) {
                while line.ends_with('\\') && i < lines.len() {
                    line.pop();
                    line.push('\n');
                    line.push_str(lines[i]);
                    i += 1;
                }
            }
            self.process_line(line_no, &line);
        }
    }

    fn process_line(&mut self, line_no: usize, raw: &str) {
        let line = raw.trim();

        if let Some((word, rest)) = directive(line) {
            match word {
                "if" => return self.begin_if(line_no, |p| p.condition(line_no, rest)),
                "ifarch" => return self.begin_if(line_no, |p| p.arch_matches(rest)),
                "ifnarch" => return self.begin_if(line_no, |p| !p.arch_matches(rest)),
                "ifos" => return self.begin_if(line_no, |p| p.os_matches(rest)),
                "ifnos" => return self.begin_if(line_no, |p| !p.os_matches(rest)),
                "elif" | "elseif" => return self.elif(line_no, rest),
                "else" => return self.else_branch(line_no),
                "endif" => return self.endif(line_no),
                _ => {}
            }
        }

        if !self.active() || line.is_empty() || line.starts_with('#') {
            return;
        }

        if let Some((word, rest)) = directive(line) {
            match word {
                "define" => return self.define(line_no, rest, false),
                "global" => return self.define(line_no, rest, true),
                "undefine" => return self.undefine(line_no, rest),
                "include" => return self.include(line_no, rest),
                "bcond_with" => return self.bcond(line_no, rest, Some(false)),
                "bcond_without" => return self.bcond(line_no, rest, Some(true)),
                "bcond" => return self.bcond(line_no, rest, None),
                "package" => return self.start_package(line_no, rest),
                w if SECTIONS.contains(&w) => {
                    trace!(section = w, line = line_no, "enter section");
                    self.section = Section::Body;
                    return;
                }
                _ => {}
            }
        }

        if line.starts_with('%') {
            // A bare macro invocation; `%{!?foo: %global foo 1}` defines
            // something when expanded.
            let expanded = self.env.expand(line);
            if let Some((word, rest)) = directive(expanded.trim()) {
                match word {
                    "define" => self.define(line_no, rest, false),
                    "global" => self.define(line_no, rest, true),
                    "undefine" => self.undefine(line_no, rest),
                    _ => {}
                }
            }
            return;
        }

        if let Section::Preamble(pkg) = self.section {
            match split_tag(line) {
                Some((tag, _qualifier, value)) => self.tag(line_no, pkg, tag, value),
                None => self.error(line_no, format!("unknown tag: {line}")),
            }
        }
    }

    // Diagnostics

    fn located(&self, message: String) -> String {
        match &self.origin {
            Some(origin) => format!("{}: {message}", origin.display()),
            None => message,
        }
    }

    fn error(&mut self, line_no: usize, message: impl Into<String>) {
        let message = self.located(message.into());
        self.out
            .diagnostics
            .push(Diagnostic::error(Some(line_no), message));
    }

    fn warning(&mut self, line_no: usize, message: impl Into<String>) {
        let message = self.located(message.into());
        self.out
            .diagnostics
            .push(Diagnostic::warning(Some(line_no), message));
    }

    // Conditionals

    fn active(&self) -> bool {
        self.conditionals.last().map_or(true, |c| c.active)
    }

    fn begin_if(&mut self, line_no: usize, test: impl FnOnce(&mut Self) -> bool) {
        let parent_active = self.active();
        let active = parent_active && test(self);
        self.conditionals.push(Conditional {
            line: line_no,
            parent_active,
            taken: active,
            active,
            seen_else: false,
        });
    }

    fn elif(&mut self, line_no: usize, rest: &str) {
        let Some(frame) = self.conditionals.last().copied() else {
            return self.error(line_no, "%elif without %if");
        };
        if frame.seen_else {
            return self.error(line_no, "%elif after %else");
        }
        let active = frame.parent_active && !frame.taken && self.condition(line_no, rest);
        if let Some(top) = self.conditionals.last_mut() {
            top.active = active;
            top.taken |= active;
        }
    }

    fn else_branch(&mut self, line_no: usize) {
        let Some(frame) = self.conditionals.last().copied() else {
            return self.error(line_no, "%else without %if");
        };
        if frame.seen_else {
            return self.error(line_no, "%else after %else");
        }
        if let Some(top) = self.conditionals.last_mut() {
            top.active = frame.parent_active && !frame.taken;
            top.taken = true;
            top.seen_else = true;
        }
    }

    fn endif(&mut self, line_no: usize) {
        if self.conditionals.pop().is_none() {
            self.error(line_no, "%endif without %if");
        }
    }

    fn condition(&mut self, line_no: usize, text: &str) -> bool {
        let expanded = self.env.expand(text);
        match evaluate_condition(&expanded) {
            Ok(value) => value,
            Err(e) => {
                self.error(line_no, format!("{e}: {}", expanded.trim()));
                false
            }
        }
    }

    fn target_value(&self, name: &str, fallback: &str) -> String {
        if self.env.is_defined(name) {
            self.env.expand(&format!("%{{{name}}}"))
        } else {
            fallback.to_string()
        }
    }

    fn arch_matches(&mut self, list: &str) -> bool {
        let arch = self.target_value("_target_cpu", host_arch());
        self.list_contains(list, &arch)
    }

    fn os_matches(&mut self, list: &str) -> bool {
        let os = self.target_value("_target_os", "linux");
        self.list_contains(list, &os)
    }

    fn list_contains(&self, list: &str, value: &str) -> bool {
        self.env
            .expand(list)
            .split(|c: char| c.is_whitespace() || c == ',')
            .any(|item| item == value)
    }

    // Macro definitions

    fn set_macro(&mut self, line_no: usize, name: &str, value: impl Into<String>) {
        if let Err(e) = self.env.define(name, value) {
            self.error(line_no, e.to_string());
        }
    }

    fn define(&mut self, line_no: usize, rest: &str, global: bool) {
        let (head, body) = match rest.split_once(char::is_whitespace) {
            Some((head, body)) => (head, body.trim()),
            None => (rest, ""),
        };
        // Parametric macros carry their option string in parentheses.
        let name = head.split('(').next().unwrap_or(head);
        if !is_macro_name(name) {
            return self.error(line_no, format!("macro name {name:?} is not valid"));
        }
        if body.is_empty() {
            return self.error(line_no, format!("macro %{name} has empty body"));
        }
        let value = if global {
            self.env.expand(body)
        } else {
            body.to_string()
        };
        trace!(name, global, line = line_no, "define macro");
        self.set_macro(line_no, name, value);
    }

    fn undefine(&mut self, line_no: usize, rest: &str) {
        let name = rest.trim();
        if !is_macro_name(name) {
            return self.error(line_no, format!("macro name {name:?} is not valid"));
        }
        if let Err(e) = self.env.undefine(name) {
            self.error(line_no, e.to_string());
        }
    }

    /// Declare a build option. It is on by default unless `_without_NAME`
    /// is defined, or off by default unless `_with_NAME` is defined. An
    /// enabled option defines `with_NAME`, which `%{with NAME}` tests.
    fn bcond(&mut self, line_no: usize, rest: &str, enabled_by_default: Option<bool>) {
        let mut args = rest.split_whitespace();
        let Some(name) = args.next().filter(|name| is_macro_name(name)) else {
            return self.error(line_no, format!("bad build option: {rest}"));
        };
        let default = match enabled_by_default {
            Some(default) => default,
            None => {
                let value = self.env.expand(&args.collect::<Vec<_>>().join(" "));
                match evaluate_condition(&value) {
                    Ok(default) => default,
                    Err(e) => return self.error(line_no, format!("{e}: {value}")),
                }
            }
        };
        let enabled = if default {
            !self.env.is_defined(&format!("_without_{name}"))
        } else {
            self.env.is_defined(&format!("_with_{name}"))
        };
        trace!(option = name, enabled, line = line_no, "build option");
        if enabled {
            self.set_macro(line_no, &format!("with_{name}"), "1");
        }
    }

    fn include(&mut self, line_no: usize, rest: &str) {
        let file = self.env.expand(rest.trim());
        if file.is_empty() {
            return self.error(line_no, "%include needs a file name");
        }
        if self.include_depth >= MAX_INCLUDE_DEPTH {
            return self.error(line_no, format!("too many nested %include: {file}"));
        }
        let path = self.dir.join(&file);
        match fs::read_to_string(&path) {
            Ok(text) => {
                debug!(path = %path.display(), "include");
                let saved = self.origin.replace(path);
                self.include_depth += 1;
                self.process_text(&text);
                self.include_depth -= 1;
                self.origin = saved;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => self
                .out
                .diagnostics
                .push(Diagnostic::missing_file(Some(line_no), &path)),
            Err(e) => self.error(line_no, format!("{}: {e}", path.display())),
        }
    }

    // Preamble

    fn start_package(&mut self, line_no: usize, rest: &str) {
        let mut args = rest.split_whitespace();
        let name = match args.next() {
            Some("-n") => match args.next() {
                Some(name) => self.env.expand(name),
                None => return self.error(line_no, "%package -n needs a name"),
            },
            Some(suffix) => match &self.out.name {
                Some(main) => format!("{main}-{}", self.env.expand(suffix)),
                None => {
                    return self.error(line_no, "Name field must be present before %package")
                }
            },
            None => return self.error(line_no, "%package needs a name"),
        };
        let exists = self.out.name.as_deref() == Some(name.as_str())
            || self.out.packages.iter().any(|p| p.name == name);
        if exists {
            return self.error(line_no, format!("package already exists: {name}"));
        }
        debug!(package = %name, line = line_no, "subpackage");
        self.out.packages.push(PackageDecl {
            name,
            ..PackageDecl::default()
        });
        self.section = Section::Preamble(self.out.packages.len() - 1);
    }

    fn dependencies(&mut self, line_no: usize, value: &str) -> Vec<Dependency> {
        match Dependency::parse_list(value) {
            Ok(deps) => deps,
            Err(e) => {
                self.error(line_no, e.to_string());
                Vec::new()
            }
        }
    }

    fn tag(&mut self, line_no: usize, pkg: usize, tag: &str, raw: &str) {
        let value = self.env.expand(raw);
        let value = value.trim();
        let lower = tag.to_ascii_lowercase();

        match lower.as_str() {
            "name" | "version" | "release" | "epoch" if pkg != 0 => {
                self.warning(line_no, format!("{tag} ignored in %package preamble"));
            }
            "name" => {
                if value.is_empty() {
                    return self.error(line_no, format!("empty tag: {tag}"));
                }
                self.out.name = Some(value.to_string());
                self.set_macro(line_no, "name", value);
            }
            "version" | "release" => {
                if value.is_empty() {
                    return self.error(line_no, format!("empty tag: {tag}"));
                }
                if value.contains('-') {
                    return self.error(line_no, format!("illegal char '-' in: {tag}: {value}"));
                }
                if lower == "version" {
                    self.out.version = Some(value.to_string());
                } else {
                    self.out.release = Some(value.to_string());
                }
                self.set_macro(line_no, &lower, value);
            }
            "epoch" => match value.parse::<u32>() {
                Ok(epoch) => {
                    self.out.epoch = Some(epoch);
                    self.set_macro(line_no, "epoch", value);
                }
                Err(_) => self.error(line_no, format!("epoch must be an unsigned number: {value}")),
            },
            "summary" => {
                self.out.packages[pkg].summary = Some(value.to_string());
                if pkg == 0 {
                    self.set_macro(line_no, "summary", value);
                }
            }
            "url" | "license" => {
                if pkg == 0 {
                    self.set_macro(line_no, &lower, value);
                }
            }
            "buildarch" | "buildarchitectures" => {
                self.out.packages[pkg].arch = value.split_whitespace().next().map(str::to_string);
            }
            "buildrequires" => {
                let deps = self.dependencies(line_no, value);
                self.out.buildrequires.extend(deps);
            }
            "requires" => {
                let deps = self.dependencies(line_no, value);
                self.out.packages[pkg].requires.extend(deps);
            }
            "provides" => {
                let deps = self.dependencies(line_no, value);
                self.out.packages[pkg].provides.extend(deps);
            }
            _ => match source_tag(&lower) {
                Some(Ok((kind, index))) => self.source(line_no, kind, index, value),
                Some(Err(())) => self.error(line_no, format!("bad source/patch number: {tag}")),
                None => debug!(tag, line = line_no, "ignoring tag"),
            },
        }
    }

    fn source(&mut self, line_no: usize, kind: SourceKind, index: Option<u32>, url: &str) {
        if url.is_empty() {
            return self.error(line_no, format!("empty tag: {kind}"));
        }
        let next = || {
            self.out
                .sources
                .iter()
                .filter(|s| s.kind == kind)
                .try_fold(0, |next: u32, s| s.order.checked_add(1).map(|n| next.max(n)))
        };
        let order = match index.or_else(next) {
            Some(order) => order,
            None => return self.error(line_no, format!("bad source/patch number: {kind}")),
        };
        if self
            .out
            .sources
            .iter()
            .any(|s| s.kind == kind && s.order == order)
        {
            return self.error(line_no, format!("duplicate {kind} number {order}"));
        }

        let macro_name = format!("{}{order}", kind.tag().to_ascii_uppercase());
        let location = format!("%{{_sourcedir}}/{}", basename(url));
        self.set_macro(line_no, &macro_name, location);

        let position = self.out.sources.len();
        self.out.sources.push(Source {
            url: url.to_string(),
            order,
            kind,
            position,
        });
    }

    fn finish(mut self) -> ParsedSpec {
        let unclosed: Vec<usize> = self.conditionals.drain(..).map(|c| c.line).collect();
        for line in unclosed {
            self.error(line, "unclosed %if");
        }

        let default_arch = self.target_value("_target_cpu", host_arch());
        let main_arch = self.out.packages[0].arch.clone();
        let main_name = self.out.name.clone().unwrap_or_default();
        for (i, package) in self.out.packages.iter_mut().enumerate() {
            if i == 0 {
                package.name = main_name.clone();
            }
            if package.arch.is_none() {
                package.arch = Some(main_arch.clone().unwrap_or_else(|| default_arch.clone()));
            }
        }

        self.out.local = self.env.top().cloned().unwrap_or_default();
        self.out
    }
}

fn is_definition(line: &str) -> bool {
    matches!(
        directive(line.trim_start()),
        Some(("define", _)) | Some(("global", _))
    )
}

fn is_macro_name(name: &str) -> bool {
    name.starts_with(|c: char| c == '_' || c.is_ascii_alphabetic())
        && name.chars().all(|c| c == '_' || c.is_ascii_alphanumeric())
        && !name.chars().all(|c| c == '_')
}

/// Split `%word rest` into `("word", "rest")`.
fn directive(line: &str) -> Option<(&str, &str)> {
    let body = line.strip_prefix('%')?;
    let len = body
        .find(|c: char| !(c == '_' || c.is_ascii_alphanumeric()))
        .unwrap_or(body.len());
    if len == 0 {
        return None;
    }
    Some((&body[..len], body[len..].trim()))
}

/// Classify `source`, `source3`, `patch`, `patch12`.
///
/// Returns `None` for tags that are not sources at all and `Some(Err(()))`
/// for a source tag with an unusable number.
fn source_tag(lower: &str) -> Option<std::result::Result<(SourceKind, Option<u32>), ()>> {
    let (kind, number) = if let Some(n) = lower.strip_prefix("source") {
        (SourceKind::Source, n)
    } else if let Some(n) = lower.strip_prefix("patch") {
        (SourceKind::Patch, n)
    } else {
        return None;
    };
    if number.is_empty() {
        return Some(Ok((kind, None)));
    }
    if !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(number.parse().map(|n| (kind, Some(n))).map_err(|_| ()))
}

// Winnow parsers

fn parse_tag_name<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)
}

/// `Tag:` or `Tag(qualifier):`, e.g. `Requires(post):`.
fn parse_tag_head<'s>(input: &mut &'s str) -> ModalResult<(&'s str, Option<&'s str>)> {
    terminated(
        (
            parse_tag_name,
            opt(delimited('(', take_while(0.., |c: char| c != ')'), ')')),
        ),
        (space0, ':'),
    )
    .parse_next(input)
}

fn split_tag(line: &str) -> Option<(&str, Option<&str>, &str)> {
    let mut input = line;
    let (tag, qualifier) = parse_tag_head(&mut input).ok()?;
    Some((tag, qualifier, input.trim()))
}
