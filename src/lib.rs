//! RPM spec file metadata engine.
//!
//! This crate answers questions about rpm spec files without running
//! `rpmbuild`: which packages a spec produces and where they will be
//! written, which sources and patches it declares and where they live,
//! what it provides and requires. It also reads the link and pin files
//! that point a spec at its upstream repository, and derives the Makefile
//! rules that tie those files together.
//!
//! # Macro environment
//!
//! RPM resolves nearly everything through macros, and most answers depend
//! on overrides given by the caller (`_topdir`, `dist`, ...). Every query
//! takes an explicit [`MacroEnvironment`], pushes the layers it needs on
//! top of it for the duration of the call, and leaves it exactly as it
//! found it.
//!
//! # Examples
//!
//! ```
//! use planex::{Defines, MacroEnvironment, Spec, SpecOptions};
//!
//! let text = "\
//! Name: ocaml-cohttp
//! Version: 0.9.8
//! Release: 1%{?dist}
//! BuildArch: noarch
//! Source0: https://github.com/mirage/ocaml-cohttp/archive/ocaml-cohttp-%{version}.tar.gz
//! ";
//! let mut env = MacroEnvironment::with_rpm_defaults();
//! let defines: Defines = [("_topdir", "."), ("dist", ".el6")].into_iter().collect();
//! let spec = Spec::from_text(
//!     "SPECS/ocaml-cohttp.spec",
//!     text,
//!     &mut env,
//!     &defines,
//!     &SpecOptions::default(),
//! )
//! .unwrap();
//!
//! assert_eq!(spec.release(), "1.el6");
//! assert_eq!(
//!     spec.binary_package_paths(&mut env)[0].to_str(),
//!     Some("./RPMS/noarch/ocaml-cohttp-0.9.8-1.el6.noarch.rpm")
//! );
//! ```

mod config;
mod defines;
mod dependency;
pub mod deps;
mod diagnostic;
mod error;
mod expr;
mod link;
mod macros;
mod nevra;
mod parser;
mod source;
mod spec;
pub mod version;

// Re-export public types
pub use config::{Config, CONFIG_ENV, DEFAULT_CONFIG_FILE};
pub use defines::Defines;
pub use dependency::{strip_arch_suffix, Dependency, Operator};
pub use deps::MakeRule;
pub use diagnostic::{Diagnostic, DiagnosticKind, Severity};
pub use error::{Error, Result};
pub use expr::{evaluate_condition, CompareOp, Expr, Value};
pub use link::{Link, Remote, MAX_SCHEMA_VERSION};
pub use macros::{host_arch, rpm_defaults, MacroEnvironment, MacroLayer, MacroScope};
pub use nevra::Nevra;
pub use source::{Source, SourceKind};
pub use spec::{BinaryPackage, Spec, SpecOptions};
