use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use dragons_formats::BigfileArchive;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(about = "List or extract bigfile.dat archives", version)]
struct Args {
    /// Archive to read (may be passed multiple times)
    #[arg(long = "archive", value_name = "PATH", conflicts_with = "root")]
    archives: Vec<PathBuf>,

    /// Directory scanned recursively for *.dat archives when --archive is not used
    #[arg(long = "root", value_name = "DIR", conflicts_with = "archives")]
    root: Option<PathBuf>,

    /// Destination directory to materialise blobs
    #[arg(long, value_name = "DIR", default_value = "extracted")]
    dest: PathBuf,

    /// Individual blob names to extract (case-insensitive, may repeat);
    /// with no names given, entries are listed instead of extracted
    #[arg(long = "entry", value_name = "NAME")]
    entries: Vec<String>,

    /// Overwrite existing files instead of skipping them
    #[arg(long)]
    overwrite: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let archives = resolve_archive_paths(&args)?;
    if archives.is_empty() {
        bail!("no archives to read");
    }

    for path in archives {
        let archive = BigfileArchive::open(&path)
            .with_context(|| format!("opening archive {}", path.display()))?;
        if args.entries.is_empty() {
            list_archive(&archive);
        } else {
            extract_entries(&archive, &args)?;
        }
    }

    Ok(())
}

fn resolve_archive_paths(args: &Args) -> Result<Vec<PathBuf>> {
    if !args.archives.is_empty() {
        return Ok(args.archives.clone());
    }

    let Some(root) = args.root.as_ref() else {
        bail!("pass --archive or --root");
    };

    let mut found = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.with_context(|| format!("scanning {}", root.display()))?;
        if entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("dat"))
        {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

fn list_archive(archive: &BigfileArchive) {
    println!("{}:", archive.path().display());
    for entry in archive.entries() {
        println!("  {:<24} {:>10} bytes @ {:#x}", entry.name, entry.size, entry.offset);
    }
}

fn extract_entries(archive: &BigfileArchive, args: &Args) -> Result<()> {
    fs::create_dir_all(&args.dest)
        .with_context(|| format!("creating destination {}", args.dest.display()))?;

    for wanted in &args.entries {
        let Some(entry) = archive.find_entry(wanted) else {
            bail!("{} has no entry named {wanted}", archive.path().display());
        };
        let dest = args.dest.join(sanitize_name(&entry.name));
        if dest.exists() && !args.overwrite {
            eprintln!("[bigfile_extract] skipping existing {}", dest.display());
            continue;
        }
        archive.extract_entry(entry, &dest)?;
        println!("extracted {} -> {}", entry.name, dest.display());
    }
    Ok(())
}

fn sanitize_name(name: &str) -> PathBuf {
    // entry names are flat; strip any path separators a hostile archive
    // could smuggle in
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    Path::new(&cleaned).to_path_buf()
}
