// src/bin/planex.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use planex::{
    deps, version, Config, Defines, Link, MacroEnvironment, Remote, Spec, SpecOptions,
};

#[derive(Parser)]
#[command(name = "planex")]
#[command(author, version, about = "Query rpm spec files and generate build dependencies", long_about = None)]
struct Cli {
    /// Define MACRO with value EXPR, as 'MACRO EXPR' (repeatable)
    #[arg(short = 'D', long = "define", value_name = "'MACRO EXPR'", global = true)]
    defines: Vec<Defines>,

    /// Don't check that package names match spec file names
    #[arg(long, global = true)]
    no_package_name_check: bool,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Configuration file (default: $PLANEX_CONFIG, then ./planex.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the names of the packages built from spec files
    Resultname {
        #[arg(value_name = "SPEC", required = true)]
        specs: Vec<PathBuf>,
        /// Print full paths instead of file names
        #[arg(short, long)]
        path: bool,
        /// Print the source package instead of the binary packages
        #[arg(short, long)]
        source: bool,
    },
    /// Show where one source or patch of a spec comes from
    Source {
        spec: PathBuf,
        /// File name (or path) of the source or patch
        source: String,
    },
    /// List the sources and patches of a spec
    Sources { spec: PathBuf },
    /// Generate Makefile dependencies for specs, links and pins
    Pindep {
        #[arg(value_name = "SPEC_OR_LINK", required = true)]
        inputs: Vec<PathBuf>,
        /// Directory containing pin overlays
        #[arg(short = 'P', long, value_name = "DIR")]
        pins_dir: Option<PathBuf>,
    },
    /// Show what a link or pin file points at
    Link {
        link: PathBuf,
        /// Print the link as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print everything a spec's packages provide
    Provides { spec: PathBuf },
    /// Print the build requirements of a spec
    Buildrequires { spec: PathBuf },
    /// Print the runtime requirements of a spec's packages
    Requires { spec: PathBuf },
    /// Print the tag carrying the highest version
    LatestTag {
        #[arg(value_name = "TAG", required = true)]
        tags: Vec<String>,
        /// Exit with status 1 if the latest tag is newer than VERSION
        #[arg(long, value_name = "VERSION")]
        current: Option<String>,
    },
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// JSON view of a link for `planex link --json`.
#[derive(Serialize)]
struct LinkSummary<'a> {
    name: &'a str,
    spec: PathBuf,
    #[serde(rename = "URL", skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    commitish: Option<&'a str>,
    patches: &'a BTreeMap<String, Remote>,
    patchqueue: BTreeMap<String, Remote>,
}

impl<'a> From<&'a Link> for LinkSummary<'a> {
    fn from(link: &'a Link) -> Self {
        LinkSummary {
            name: link.name(),
            spec: link.spec_path(),
            url: link.url(),
            commitish: link.commitish(),
            patches: link.patch_sources(),
            patchqueue: link.patchqueue_sources(),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::discover(cli.config.as_deref()).context("loading configuration")?;
    let cli_defines: Defines = cli.defines.into_iter().collect();
    let defines = config.defines_with(&cli_defines);
    let options = SpecOptions {
        check_package_name: config.check_package_name && !cli.no_package_name_check,
    };
    debug!(?defines, ?options, "effective settings");

    let mut env = MacroEnvironment::with_rpm_defaults();
    let load = |path: &Path, env: &mut MacroEnvironment| Spec::parse(path, env, &defines, &options);

    match cli.command {
        Commands::Resultname {
            specs,
            path,
            source,
        } => {
            for spec_path in &specs {
                let spec = load(spec_path, &mut env)?;
                let results = if source {
                    vec![spec.source_package_path(&mut env)]
                } else {
                    spec.binary_package_paths(&mut env)
                };
                for result in results {
                    if path {
                        println!("{}", result.display());
                    } else {
                        println!("{}", file_name(&result));
                    }
                }
            }
        }
        Commands::Source { spec, source } => {
            let spec = load(&spec, &mut env)?;
            let found = spec.source(&source, &mut env)?;
            let locality = if found.is_local() { "local" } else { "remote" };
            println!(
                "{}\t{}\t{}\t{}",
                found.path(&spec, &mut env).display(),
                found.url(),
                found.kind(),
                locality
            );
        }
        Commands::Sources { spec } => {
            let spec = load(&spec, &mut env)?;
            for source in spec.sources() {
                println!("{}\t{}", source, source.path(&spec, &mut env).display());
            }
        }
        Commands::Pindep { inputs, pins_dir } => {
            let pins_dir = pins_dir.unwrap_or(config.pins_dir);
            let pins = deps::find_pins(&pins_dir)?;
            info!(count = pins.len(), dir = %pins_dir.display(), "found pins");
            for rule in deps::pin_rules(&pins, &inputs, &mut env, &defines) {
                println!("{rule}");
            }
        }
        Commands::Link { link, json } => {
            let link = Link::read(&link)?;
            if json {
                let summary = serde_json::to_string_pretty(&LinkSummary::from(&link))
                    .context("serializing link")?;
                println!("{summary}");
                return Ok(ExitCode::SUCCESS);
            }
            println!("name\t{}", link.name());
            println!("spec\t{}", link.spec_path().display());
            if let Some(url) = link.url() {
                println!("url\t{url}");
            }
            if let Some(commitish) = link.commitish() {
                println!("commitish\t{commitish}");
            }
            for (name, remote) in link.patch_sources() {
                println!("patches\t{name}\t{}", remote.url);
            }
            for (name, remote) in link.patchqueue_sources() {
                println!("patchqueue\t{name}\t{}", remote.url);
            }
        }
        Commands::Provides { spec } => {
            for name in load(&spec, &mut env)?.provides() {
                println!("{name}");
            }
        }
        Commands::Buildrequires { spec } => {
            for name in load(&spec, &mut env)?.buildrequires() {
                println!("{name}");
            }
        }
        Commands::Requires { spec } => {
            for name in load(&spec, &mut env)?.requires() {
                println!("{name}");
            }
        }
        Commands::LatestTag { tags, current } => {
            let latest = version::latest_tag(tags.as_slice()).context("no tags given")?;
            println!("{latest}");
            if let Some(current) = current {
                if version::is_newer(latest, &current) {
                    info!(tag = latest, current = %current, "newer upstream release");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("planex: {err:#}");
            ExitCode::FAILURE
        }
    }
}
