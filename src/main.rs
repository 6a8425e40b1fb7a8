//! Thin CLI surface over the resolver core (§6's exit-code contract).
//!
//! Parsing flags and locating repositories is "out of scope" for the core
//! itself; this binary exists only to exercise it end to end and to honor
//! the documented exit codes: 0 success, 1 generic failure, 2 ambiguous
//! set/atom reference.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use portage_resolver::oracle::StubTransport;
use portage_resolver::repo::metadata::{MemoryCache, MetadataLoader};
use portage_resolver::{
    resolve, unmerge, Atom, ConfiguredTree, Eapi, Error, OnDiskProfile, Operation, ResolveContext, ResolveFlags,
    UnconfiguredTree, Vdb,
};

#[derive(Parser)]
#[command(name = "portage-resolver", version, about = "Profile-aware dependency resolver core")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Fail the whole invocation (exit 1) on any unresolved target instead
    /// of reporting it and continuing with the rest.
    #[arg(long, global = true)]
    ignore_failures: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve one or more atoms against a repository and profile.
    Resolve {
        #[arg(long)]
        repo: PathBuf,
        #[arg(long)]
        profile: PathBuf,
        #[arg(long)]
        upgrade: bool,
        #[arg(long)]
        deep: bool,
        #[arg(long)]
        drop_cycles: bool,
        targets: Vec<String>,
    },
    /// Remove an installed package by key or package name.
    Unmerge { token: String },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::try_init().ok();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(code) => code,
        Err(AppError::Ambiguous(msg)) => {
            eprintln!("error: {msg}");
            ExitCode::from(2)
        }
        Err(AppError::Generic(msg)) => {
            eprintln!("error: {msg}");
            ExitCode::from(1)
        }
    }
}

enum AppError {
    Generic(String),
    Ambiguous(String),
}

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        AppError::Generic(e.to_string())
    }
}

fn run(cli: &Cli) -> Result<ExitCode, AppError> {
    match &cli.command {
        Command::Resolve {
            repo,
            profile,
            upgrade,
            deep,
            drop_cycles,
            targets,
        } => {
            let on_disk_profile = OnDiskProfile::load(profile)?;

            let loader = MetadataLoader::new(MemoryCache::new(), StubTransport::new());
            let mut unconfigured = UnconfiguredTree::new("main", repo.clone(), loader);
            for category in unconfigured.categories()? {
                for package in unconfigured.packages(&category)? {
                    let cpn = portage_resolver::Cpn::new(category.clone(), package);
                    unconfigured.scan_package(&cpn)?;
                }
            }
            let configured = ConfiguredTree::new(&unconfigured, &on_disk_profile);

            let parsed_targets = parse_targets(targets)?;

            let vdb = Vdb::new();
            let ctx = ResolveContext {
                trees: vec![&configured],
                vdb: &vdb,
                flags: ResolveFlags {
                    deep: *deep,
                    upgrade: *upgrade,
                    nodeps: false,
                    drop_cycles: *drop_cycles,
                    force_replacement: false,
                    empty_tree: false,
                },
            };

            match resolve(&ctx, &parsed_targets) {
                Ok(ops) => {
                    print_plan(&ops);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) if cli.ignore_failures => {
                    eprintln!("warning: {e}");
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => Err(AppError::Generic(e.to_string())),
            }
        }
        Command::Unmerge { token } => {
            let vdb = Vdb::new();
            match unmerge(&vdb, token) {
                Ok(ops) => {
                    print_plan(&ops);
                    Ok(ExitCode::SUCCESS)
                }
                Err(Error::AmbiguousUnmerge(msg)) => Err(AppError::Ambiguous(msg)),
                Err(e) => Err(AppError::Generic(e.to_string())),
            }
        }
    }
}

fn parse_targets(targets: &[String]) -> Result<Vec<Atom>, AppError> {
    targets
        .iter()
        .map(|s| Atom::parse(s, Eapi::LATEST).map_err(|e| AppError::Generic(e.to_string())))
        .collect()
}

fn print_plan(ops: &[Operation]) {
    for op in ops {
        match op {
            Operation::Add(cpv) => println!("add {cpv}"),
            Operation::Replace { new, old } => println!("replace {old} -> {new}"),
            Operation::Remove(cpv) => println!("remove {cpv}"),
        }
    }
}
