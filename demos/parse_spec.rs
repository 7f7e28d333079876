use planex::{Defines, MacroEnvironment, Spec, SpecOptions};

const EXAMPLE: &str = "\
%global srcname cohttp

Name:           ocaml-cohttp
Version:        0.9.8
Release:        1%{?dist}
Summary:        HTTP library for OCaml
License:        ISC
URL:            https://github.com/mirage/ocaml-%{srcname}
Source0:        %{url}/archive/ocaml-%{srcname}-%{version}/ocaml-%{srcname}-%{version}.tar.gz
Patch0:         ocaml-cohttp-fix-lwt.patch
BuildRequires:  ocaml >= 4.00.1, ocaml-findlib-devel
BuildRequires:  ocaml-lwt-devel
Requires:       ocaml-lwt

%if 0%{?rhel} && 0%{?rhel} < 7
BuildRequires:  ocaml-camlp4-devel
%endif

%package        devel
Summary:        Development files for %{name}
Requires:       %{name} = %{version}-%{release}

%description
An HTTP client and server library.
";

fn main() {
    let mut env = MacroEnvironment::with_rpm_defaults();
    let defines: Defines = [("_topdir", "."), ("dist", ".el6"), ("rhel", "6")]
        .into_iter()
        .collect();
    let spec = Spec::from_text(
        "SPECS/ocaml-cohttp.spec",
        EXAMPLE,
        &mut env,
        &defines,
        &SpecOptions::default(),
    )
    .expect("failed to parse spec");

    println!("=== Parsed Spec ===");
    println!("Name:          {}", spec.name());
    println!("Version:       {}", spec.version());
    println!("Release:       {}", spec.release());
    println!("NEVRA:         {}", spec.nevra());

    println!("\n=== Sources ===");
    for source in spec.sources() {
        let kind = if source.is_local() { "local" } else { "remote" };
        println!("{source} ({kind})");
        println!("    -> {}", source.path(&spec, &mut env).display());
    }

    println!("\n=== Packages ===");
    println!("{}", spec.source_package_path(&mut env).display());
    for path in spec.binary_package_paths(&mut env) {
        println!("{}", path.display());
    }

    println!("\n=== Dependencies ===");
    println!(
        "BuildRequires: {}",
        spec.buildrequires().into_iter().collect::<Vec<_>>().join(" ")
    );
    println!(
        "Requires:      {}",
        spec.requires().into_iter().collect::<Vec<_>>().join(" ")
    );
    println!(
        "Provides:      {}",
        spec.provides().into_iter().collect::<Vec<_>>().join(" ")
    );

    let rebuilt = spec.with_defines([("_topdir", "/srv/build"), ("dist", ".el7")].into_iter().collect());
    println!("\n=== Under other overrides ===");
    for path in rebuilt.binary_package_paths(&mut env) {
        println!("{}", path.display());
    }
}
