use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::time::Duration;

use torseg_core::progress::Progress;
use torseg_core::trackers::TrackerConfig;
use torseg_core::{build, codec, scan, verify, CancelToken, Tiers, DEFAULT_PIECE_LENGTH};

#[derive(Parser)]
#[command(name = "torseg", version, about = "Piece-hash descriptors for segment files")]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create descriptors for every segment file under ROOT that lacks one
    Create {
        root: PathBuf,
        #[arg(long, default_value_t = DEFAULT_PIECE_LENGTH)]
        piece_length: u32,
        /// JSON tracker config ({"udp": [...], "https": [...], "ws": [...]})
        #[arg(long)]
        trackers: Option<PathBuf>,
        #[arg(long)]
        include: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
        #[arg(long, default_value_t = false)]
        progress: bool,
        #[arg(long, default_value_t = 20)]
        progress_secs: u64,
    },
    /// (Re)build the descriptor for one file or directory under ROOT, overwriting
    Build {
        root: PathBuf,
        name: String,
        #[arg(long, default_value_t = DEFAULT_PIECE_LENGTH)]
        piece_length: u32,
        #[arg(long)]
        trackers: Option<PathBuf>,
    },
    /// Verify content under ROOT against descriptors (all under ROOT by default)
    Verify {
        root: PathBuf,
        descriptors: Vec<PathBuf>,
        /// Stop at the first bad piece
        #[arg(long, default_value_t = false)]
        fail_fast: bool,
        #[arg(long, default_value_t = false)]
        progress: bool,
        #[arg(long, default_value_t = 20)]
        progress_secs: u64,
    },
    /// List descriptors under ROOT with their piece geometry
    List {
        root: PathBuf,
        #[arg(long)]
        include: Vec<String>,
        #[arg(long)]
        exclude: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose { "debug" } else { "info" })
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Cmd::Create { root, piece_length, trackers, include, exclude, progress, progress_secs } => {
            create(&root, piece_length, trackers.as_deref(), &include, &exclude, progress, progress_secs)
        }
        Cmd::Build { root, name, piece_length, trackers } => {
            build_one(&root, &name, piece_length, trackers.as_deref())
        }
        Cmd::Verify { root, descriptors, fail_fast, progress, progress_secs } => {
            verify_all(&root, &descriptors, fail_fast, progress, progress_secs)
        }
        Cmd::List { root, include, exclude } => list(&root, &include, &exclude),
    }
}

fn build_globset(includes: &[String], excludes: &[String]) -> Result<(GlobSet, GlobSet)> {
    let mut incb = GlobSetBuilder::new();
    let mut excb = GlobSetBuilder::new();
    if includes.is_empty() {
        incb.add(Glob::new("*")?);
    }
    for g in includes {
        incb.add(Glob::new(g)?);
    }
    for g in excludes {
        excb.add(Glob::new(g)?);
    }
    Ok((incb.build()?, excb.build()?))
}

fn load_tiers(path: Option<&Path>) -> Result<Tiers> {
    match path {
        Some(p) => Ok(TrackerConfig::load(p)?.tiers()),
        None => Ok(Vec::new()),
    }
}

fn create(
    root: &Path,
    piece_length: u32,
    trackers: Option<&Path>,
    includes: &[String],
    excludes: &[String],
    show_progress: bool,
    progress_secs: u64,
) -> Result<()> {
    let tiers = load_tiers(trackers)?;
    let (inc, exc) = build_globset(includes, excludes)?;
    let accept = |name: &str| inc.is_match(name) && !exc.is_match(name);
    let prog = Progress::with_interval(show_progress, Duration::from_secs(progress_secs.max(1)));
    let written =
        scan::build_if_needed(root, piece_length, &tiers, &accept, &CancelToken::new(), &prog)
            .with_context(|| format!("create descriptors under {}", root.display()))?;
    for p in &written {
        println!("created {}", p.display());
    }
    tracing::info!(created = written.len(), root = %root.display(), "create finished");
    Ok(())
}

fn build_one(root: &Path, name: &str, piece_length: u32, trackers: Option<&Path>) -> Result<()> {
    let tiers = load_tiers(trackers)?;
    let target = root.join(name);
    let md = std::fs::metadata(&target).with_context(|| format!("stat {}", target.display()))?;
    let d = if md.is_dir() {
        build::build_from_dir(root, name, piece_length)?
    } else {
        build::build_from_file(root, name, piece_length)?
    };
    let path = codec::write(root, &d, &tiers)?;
    println!("{} {} pieces={} info_hash={}", path.display(), d.name, d.num_pieces(), d.info_hash()?);
    Ok(())
}

fn verify_all(
    root: &Path,
    descriptors: &[PathBuf],
    fail_fast: bool,
    show_progress: bool,
    progress_secs: u64,
) -> Result<()> {
    let paths = if descriptors.is_empty() {
        scan::descriptor_paths(root, &|_: &str| true)?
    } else {
        descriptors.to_vec()
    };
    if paths.is_empty() {
        return Err(anyhow!("no descriptors found under {}", root.display()));
    }
    let cancel = CancelToken::new();
    let prog = Progress::with_interval(show_progress, Duration::from_secs(progress_secs.max(1)));
    let mut failed = 0usize;
    for p in &paths {
        let (d, _) = codec::read(p).with_context(|| format!("read {}", p.display()))?;
        prog.set_stage(&d.name);
        prog.set_total(d.num_pieces());
        prog.start();
        let mut bad = Vec::new();
        let res = verify::verify_parallel(
            &d,
            root,
            64,
            |i, good| -> Result<()> {
                prog.inc();
                if !good {
                    prog.inc_bad();
                    bad.push(i);
                    if fail_fast {
                        return Err(anyhow!("{}: piece {} is bad", d.name, i));
                    }
                }
                Ok(())
            },
            &cancel,
        );
        prog.stop();
        res?;
        if bad.is_empty() {
            println!("{}: OK ({} pieces)", d.name, d.num_pieces());
        } else {
            failed += 1;
            println!("{}: BAD {}/{} pieces: {:?}", d.name, bad.len(), d.num_pieces(), bad);
        }
    }
    tracing::info!(descriptors = paths.len(), failed, "verify finished");
    if failed > 0 {
        return Err(anyhow!("{} of {} descriptor(s) failed verification", failed, paths.len()));
    }
    Ok(())
}

fn list(root: &Path, includes: &[String], excludes: &[String]) -> Result<()> {
    let (inc, exc) = build_globset(includes, excludes)?;
    let accept = |name: &str| inc.is_match(name) && !exc.is_match(name);
    for p in scan::descriptor_paths(root, &accept)? {
        let mi = codec::read_meta(&p).with_context(|| format!("read {}", p.display()))?;
        let d = &mi.descriptor;
        println!(
            "{}  files={} bytes={} piece_length={} pieces={} tiers={}",
            d.name,
            d.files.len(),
            d.total_length(),
            d.piece_length,
            d.num_pieces(),
            mi.announce_list.len()
        );
    }
    Ok(())
}
