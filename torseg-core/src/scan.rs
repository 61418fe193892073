use std::fs;
use std::path::{Path, PathBuf};

use crate::build;
use crate::cancel::CancelToken;
use crate::codec::{self, DESCRIPTOR_EXT};
use crate::error::{Error, Result};
use crate::progress::Progress;

pub const SEGMENT_EXT: &str = "seg";

/// Names of regular, non-empty files directly under `dir` with extension
/// `ext` that `accept` approves, sorted.
pub fn files_with_ext(dir: &Path, ext: &str, accept: &dyn Fn(&str) -> bool) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for ent in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let ent = ent.map_err(|e| Error::io(dir, e))?;
        let path = ent.path();
        let Some(name) = ent.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if path.extension().and_then(|s| s.to_str()) != Some(ext) {
            continue;
        }
        let md = ent.metadata().map_err(|e| Error::io(&path, e))?;
        if !md.is_file() || md.len() == 0 {
            continue;
        }
        if !accept(&name) {
            continue;
        }
        out.push(name);
    }
    out.sort();
    Ok(out)
}

pub fn segment_files(dir: &Path, accept: &dyn Fn(&str) -> bool) -> Result<Vec<String>> {
    files_with_ext(dir, SEGMENT_EXT, accept)
}

pub fn descriptor_files(dir: &Path, accept: &dyn Fn(&str) -> bool) -> Result<Vec<String>> {
    files_with_ext(dir, DESCRIPTOR_EXT, accept)
}

pub fn descriptor_paths(dir: &Path, accept: &dyn Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
    Ok(descriptor_files(dir, accept)?.into_iter().map(|f| dir.join(f)).collect())
}

/// Build and write a descriptor for every segment file under `root` that has
/// none yet. Returns the descriptor paths written, in segment name order.
///
/// Cancellation is checked between files and between pieces.
pub fn build_if_needed(
    root: &Path,
    piece_length: u32,
    tiers: &[Vec<String>],
    accept: &dyn Fn(&str) -> bool,
    cancel: &CancelToken,
    progress: &Progress,
) -> Result<Vec<PathBuf>> {
    let files = segment_files(root, accept)?;
    progress.set_stage("Creating descriptors");
    progress.set_total(files.len());
    progress.start();
    let res = build_missing(root, &files, piece_length, tiers, cancel, progress);
    progress.stop();
    res
}

fn build_missing(
    root: &Path,
    files: &[String],
    piece_length: u32,
    tiers: &[Vec<String>],
    cancel: &CancelToken,
    progress: &Progress,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for f in files {
        cancel.check()?;
        let target = codec::descriptor_path(root, f);
        if !target.try_exists().map_err(|e| Error::io(&target, e))? {
            tracing::debug!(file = %f, "building descriptor");
            let d = build::build_from_file_with_cancel(root, f, piece_length, cancel)?;
            progress.add_bytes(d.total_length());
            written.push(codec::write(root, &d, tiers)?);
        }
        progress.inc();
    }
    Ok(written)
}
