use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use uar::diagnostics::{Diagnostic, Severity};
use uar::reader::Archive;
use uar::spool::Spool;

/// Create, extract, and list UAR (Universal Archive) files.
#[derive(Debug, Parser)]
#[command(name = "uar", version, about)]
struct Args {
    /// Create a new archive.
    #[arg(short = 'c', long = "create", conflicts_with_all = ["extract", "list"])]
    create: bool,

    /// Extract an existing archive.
    #[arg(short = 'x', long = "extract", conflicts_with_all = ["create", "list"])]
    extract: bool,

    /// List an archive's contents.
    #[arg(short = 't', long = "list", conflicts_with_all = ["create", "extract"])]
    list: bool,

    /// Archive file to operate on.
    #[arg(short = 'f', long = "file", required = true)]
    file: PathBuf,

    /// Destination directory for extraction.
    #[arg(short = 'C', long = "directory", conflicts_with = "list")]
    directory: Option<PathBuf>,

    /// Enable verbose diagnostics.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Use human-readable IEC sizes in list output.
    #[arg(short = 'm', long = "human-readable")]
    human_readable: bool,

    /// Paths to add when creating an archive.
    #[arg(value_name = "PATH")]
    targets: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.verbose {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    let mode_count = [args.create, args.extract, args.list].iter().filter(|b| **b).count();
    if mode_count != 1 {
        eprintln!("error: exactly one of -c, -x, -t must be given");
        return ExitCode::FAILURE;
    }

    let result = if args.create {
        run_create(&args)
    } else if args.extract {
        run_extract(&args)
    } else {
        run_list(&args)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("uar: {err}");
            ExitCode::FAILURE
        }
    }
}

fn diagnostics_sink(verbose: bool) -> impl FnMut(&Diagnostic) {
    move |diagnostic: &Diagnostic| {
        if verbose || diagnostic.severity == Severity::Warning {
            eprintln!("uar: {diagnostic}");
        }
    }
}

fn run_create(args: &Args) -> Result<(), uar::Error> {
    let mut spool = Spool::new()?;
    let mut sink = diagnostics_sink(args.verbose);

    for target in &args.targets {
        let name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| uar::Error::InvalidArgument(target.display().to_string()))?;
        let archive_name = format!("/{name}");
        uar::tree::add_tree(&mut spool, target, &archive_name, &mut sink)?;
    }

    uar::finalize::finalize(spool, &args.file)
}

fn run_extract(args: &Args) -> Result<(), uar::Error> {
    let file = args
        .file
        .canonicalize()
        .map_err(|err| uar::Error::InvalidArgument(format!("{}: {err}", args.file.display())))?;
    let dest = args
        .directory
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    if !dest.is_dir() {
        return Err(uar::Error::InvalidArgument(format!(
            "{}: not a directory",
            dest.display()
        )));
    }

    let mut archive = Archive::open(&file)?;
    let mut sink = diagnostics_sink(args.verbose);
    uar::extract::extract(&mut archive, &dest, &mut sink)
}

fn run_list(args: &Args) -> Result<(), uar::Error> {
    let file = args
        .file
        .canonicalize()
        .map_err(|err| uar::Error::InvalidArgument(format!("{}: {err}", args.file.display())))?;
    let archive = Archive::open(&file)?;

    for entry in archive.entries() {
        let kind = match &entry.kind {
            uar::entry::EntryKind::File { .. } => "-",
            uar::entry::EntryKind::Directory { .. } => "d",
            uar::entry::EntryKind::Symlink { .. } => "l",
        };
        let size = if args.human_readable {
            human_readable_size(entry.size())
        } else {
            entry.size().to_string()
        };
        println!("{kind} {size:>10}  {}", entry.name);
    }
    Ok(())
}

/// Format `bytes` using 1024-based IEC units (space, K, M, G, T, P, E, Z, Y).
fn human_readable_size(bytes: u64) -> String {
    const UNITS: [&str; 9] = [" ", "K", "M", "G", "T", "P", "E", "Z", "Y"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}{}", UNITS[0])
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}
