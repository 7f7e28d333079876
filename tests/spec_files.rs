use std::fs;
use std::path::{Path, PathBuf};

use planex::{host_arch, Defines, Error, MacroEnvironment, SourceKind, Spec, SpecOptions};

const OCAML_COHTTP: &str = "\
%global debug_package %{nil}

Name:           ocaml-cohttp
Version:        0.9.8
Release:        1%{?dist}
Summary:        Very lightweight HTTP server using Lwt or Async
License:        ISC
URL:            https://github.com/mirage/ocaml-cohttp
Source0:        https://github.com/mirage/%{name}/archive/%{name}-%{version}/%{name}-%{version}.tar.gz
Source1:        ocaml-cohttp-init
Source2:        ocaml-cohttp-service
Patch0:         cohttp0.patch
Patch1:         cohttp1.patch

BuildRequires:  ocaml ocaml-findlib ocaml-re-devel ocaml-uri-devel
BuildRequires:  ocaml-cstruct-devel ocaml-lwt-devel ocaml-ounit-devel
BuildRequires:  ocaml-ocamldoc ocaml-camlp4-devel openssl openssl-devel
Requires:       ocaml
Requires:       ocaml-findlib

%description
Cohttp is a very lightweight HTTP server using Lwt or Async.

%package        devel
Summary:        Development files for %{name}
Requires:       %{name} = %{version}-%{release}

%description    devel
The %{name}-devel package contains libraries and signature files for
developing applications that use %{name}.

%prep
%setup -q -n %{name}-%{name}-%{version}
%patch0 -p1

%build
make

%files
%doc README.md

%changelog
* Mon Jun 10 2013 Jon Ludlam <jonathan.ludlam@citrix.com> - 0.9.8-1
- Initial package
";

const FOO: &str = "\
Name: foo
Version: 1.2.3
Release: 1
Source0: http://example.com/foo-1.2.3.tar.gz
Patch0: fix.patch
";

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, text).unwrap();
    path
}

fn cohttp_defines() -> Defines {
    [
        ("dist", ".el6"),
        ("_topdir", "."),
        ("_sourcedir", "%_topdir/SOURCES/%name"),
    ]
    .into_iter()
    .collect()
}

fn cohttp() -> (tempfile::TempDir, Spec) {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "SPECS/ocaml-cohttp.spec", OCAML_COHTTP);
    let spec = Spec::parse(
        &path,
        &mut MacroEnvironment::with_rpm_defaults(),
        &cohttp_defines(),
        &SpecOptions::default(),
    )
    .unwrap();
    (dir, spec)
}

#[test]
fn test_identity() {
    let (dir, spec) = cohttp();
    assert_eq!(spec.name(), "ocaml-cohttp");
    assert_eq!(spec.version(), "0.9.8");
    assert_eq!(spec.release(), "1.el6");
    assert_eq!(spec.path(), dir.path().join("SPECS/ocaml-cohttp.spec"));
}

#[test]
fn test_provides() {
    let (_dir, spec) = cohttp();
    let provides: Vec<String> = spec.provides().into_iter().collect();
    assert_eq!(provides, vec!["ocaml-cohttp", "ocaml-cohttp-devel"]);
}

#[test]
fn test_sources() {
    let (_dir, spec) = cohttp();
    let mut env = MacroEnvironment::with_rpm_defaults();
    let sources: Vec<(String, String)> = spec
        .sources()
        .iter()
        .map(|s| {
            (
                s.path(&spec, &mut env).display().to_string(),
                s.url().to_string(),
            )
        })
        .collect();
    assert_eq!(
        sources,
        vec![
            (
                "./SOURCES/ocaml-cohttp/ocaml-cohttp-0.9.8.tar.gz".to_string(),
                "https://github.com/mirage/ocaml-cohttp/archive/ocaml-cohttp-0.9.8/ocaml-cohttp-0.9.8.tar.gz"
                    .to_string()
            ),
            (
                "./SOURCES/ocaml-cohttp/ocaml-cohttp-init".to_string(),
                "ocaml-cohttp-init".to_string()
            ),
            (
                "./SOURCES/ocaml-cohttp/ocaml-cohttp-service".to_string(),
                "ocaml-cohttp-service".to_string()
            ),
            (
                "./SOURCES/ocaml-cohttp/cohttp0.patch".to_string(),
                "cohttp0.patch".to_string()
            ),
            (
                "./SOURCES/ocaml-cohttp/cohttp1.patch".to_string(),
                "cohttp1.patch".to_string()
            ),
        ]
    );
    assert_eq!(spec.highest_patch(), Some(1));
}

#[test]
fn test_source_lookup() {
    let (_dir, spec) = cohttp();
    let mut env = MacroEnvironment::with_rpm_defaults();

    let tarball = spec
        .source("path/to/ocaml-cohttp-0.9.8.tar.gz", &mut env)
        .unwrap();
    assert_eq!(tarball.kind(), SourceKind::Source);
    assert!(tarball.is_remote());
    assert_eq!(
        tarball.path(&spec, &mut env),
        PathBuf::from("./SOURCES/ocaml-cohttp/ocaml-cohttp-0.9.8.tar.gz")
    );

    let patch = spec.source("somewhere/cohttp0.patch", &mut env).unwrap();
    assert_eq!(patch.kind(), SourceKind::Patch);
    assert_eq!(patch.url(), "cohttp0.patch");

    assert_eq!(
        spec.source("nonexistent", &mut env).unwrap_err(),
        Error::NotFound("nonexistent".to_string())
    );
}

#[test]
fn test_requires() {
    let (_dir, spec) = cohttp();
    let requires: Vec<String> = spec.requires().into_iter().collect();
    assert_eq!(requires, vec!["ocaml", "ocaml-cohttp", "ocaml-findlib"]);
}

#[test]
fn test_buildrequires() {
    let (_dir, spec) = cohttp();
    let buildrequires: Vec<String> = spec.buildrequires().into_iter().collect();
    assert_eq!(
        buildrequires,
        vec![
            "ocaml",
            "ocaml-camlp4-devel",
            "ocaml-cstruct-devel",
            "ocaml-findlib",
            "ocaml-lwt-devel",
            "ocaml-ocamldoc",
            "ocaml-ounit-devel",
            "ocaml-re-devel",
            "ocaml-uri-devel",
            "openssl",
            "openssl-devel",
        ]
    );
}

#[test]
fn test_package_paths() {
    let (_dir, spec) = cohttp();
    let mut env = MacroEnvironment::with_rpm_defaults();
    let arch = host_arch();

    assert_eq!(
        spec.source_package_path(&mut env),
        PathBuf::from("./SRPMS/ocaml-cohttp-0.9.8-1.el6.src.rpm")
    );
    assert_eq!(
        spec.binary_package_paths(&mut env),
        vec![
            PathBuf::from(format!("./RPMS/{arch}/ocaml-cohttp-0.9.8-1.el6.{arch}.rpm")),
            PathBuf::from(format!(
                "./RPMS/{arch}/ocaml-cohttp-devel-0.9.8-1.el6.{arch}.rpm"
            )),
        ]
    );
}

#[test]
fn test_bad_filename() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "bad-name.spec", OCAML_COHTTP);
    let mut env = MacroEnvironment::with_rpm_defaults();

    let err = Spec::parse(&path, &mut env, &Defines::new(), &SpecOptions::default()).unwrap_err();
    assert_eq!(
        err,
        Error::SpecNameMismatch {
            file: path.clone(),
            package: "ocaml-cohttp".to_string()
        }
    );

    let options = SpecOptions {
        check_package_name: false,
    };
    let spec = Spec::parse(&path, &mut env, &Defines::new(), &options).unwrap();
    assert_eq!(spec.name(), "ocaml-cohttp");
}

#[test]
fn test_missing_spec_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.spec");
    let err = Spec::parse(
        &path,
        &mut MacroEnvironment::with_rpm_defaults(),
        &Defines::new(),
        &SpecOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err, Error::NotFound(path.display().to_string()));
}

#[test]
fn test_foo_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "foo.spec", FOO);
    let mut env = MacroEnvironment::with_rpm_defaults();
    let defines: Defines = [("_topdir", "/build")].into_iter().collect();
    let spec = Spec::parse(&path, &mut env, &defines, &SpecOptions::default()).unwrap();

    let patch = spec.source("fix.patch", &mut env).unwrap();
    assert_eq!(patch.kind(), SourceKind::Patch);
    assert_eq!(patch.order(), 0);
    assert!(patch.is_local());
    let sourcedir = spec.expand_macro("%{_sourcedir}", &mut env);
    assert_eq!(patch.path(&spec, &mut env), Path::new(&sourcedir).join("fix.patch"));

    let tarball = spec.source("foo-1.2.3.tar.gz", &mut env).unwrap();
    assert_eq!(
        tarball.path(&spec, &mut env),
        Path::new(&sourcedir).join("foo-1.2.3.tar.gz")
    );

    let srpm = spec.source_package_path(&mut env).display().to_string();
    assert!(srpm.contains("foo-1.2.3-1"));
    assert!(srpm.ends_with(".src.rpm"));
}

#[test]
fn test_later_declaration_shadows_earlier() {
    let text = "\
Name: foo
Version: 1
Release: 1
Source0: http://a.example.com/foo.tar.gz
Source1: http://b.example.com/dist/foo.tar.gz
Patch0: foo.tar.gz
Source5: other.tar.gz
";
    let mut env = MacroEnvironment::with_rpm_defaults();
    let spec = Spec::from_text("foo.spec", text, &mut env, &Defines::new(), &SpecOptions::default())
        .unwrap();
    let found = spec.source("foo.tar.gz", &mut env).unwrap();
    assert_eq!(found.kind(), SourceKind::Patch);
    assert_eq!(found.order(), 0);

    // Repeated queries in the same scope agree.
    let again = spec.source("x/y/foo.tar.gz", &mut env).unwrap();
    assert_eq!(found, again);
}

#[test]
fn test_overrides_change_derived_paths() {
    let mut env = MacroEnvironment::with_rpm_defaults();
    let el6: Defines = [
        ("_topdir", "/build"),
        ("dist", ".el6"),
        ("_sourcedir", "%{_topdir}/SOURCES%{dist}"),
    ]
    .into_iter()
    .collect();
    let spec = Spec::from_text("foo.spec", FOO, &mut env, &el6, &SpecOptions::default()).unwrap();
    let before = spec.source("fix.patch", &mut env).unwrap().path(&spec, &mut env);
    assert_eq!(before, PathBuf::from("/build/SOURCES.el6/fix.patch"));

    let mut el7 = el6.clone();
    el7.define("dist", ".el7");
    let rebuilt = spec.with_defines(el7);
    let after = rebuilt
        .source("fix.patch", &mut env)
        .unwrap()
        .path(&rebuilt, &mut env);
    assert_eq!(after, PathBuf::from("/build/SOURCES.el7/fix.patch"));

    // `spec` itself still uses the .el6 overrides.
    assert_eq!(
        spec.source("fix.patch", &mut env).unwrap().path(&spec, &mut env),
        before
    );
}

#[test]
fn test_include_relative_to_spec() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "SPECS/common.inc",
        "%global upstream_version 2.0\nBuildRequires: common-devel\n",
    );
    let path = write(
        dir.path(),
        "SPECS/bar.spec",
        "Name: bar\n%include common.inc\nVersion: %{upstream_version}\nRelease: 1\n",
    );
    let spec = Spec::parse(
        &path,
        &mut MacroEnvironment::with_rpm_defaults(),
        &Defines::new(),
        &SpecOptions::default(),
    )
    .unwrap();
    assert_eq!(spec.version(), "2.0");
    assert!(spec.buildrequires().contains("common-devel"));
}

#[test]
fn test_missing_include_is_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "bar.spec",
        "Name: bar\nVersion: 1\nRelease: 1\n%include generated.inc\n",
    );
    let spec = Spec::parse(
        &path,
        &mut MacroEnvironment::with_rpm_defaults(),
        &Defines::new(),
        &SpecOptions::default(),
    );
    assert!(spec.is_ok());
}

#[test]
fn test_parses_do_not_leak_into_each_other() {
    let mut env = MacroEnvironment::with_rpm_defaults();
    let depth = env.depth();
    let first = "%global secret 42\nName: a\nVersion: 1\nRelease: 1\n";
    let second = "Name: b\nVersion: 1\nRelease: %{?secret}%{!?secret:7}\n";

    Spec::from_text("a.spec", first, &mut env, &Defines::new(), &SpecOptions::default()).unwrap();
    let b = Spec::from_text("b.spec", second, &mut env, &Defines::new(), &SpecOptions::default())
        .unwrap();
    assert_eq!(b.release(), "7");
    assert_eq!(env.depth(), depth);
}
