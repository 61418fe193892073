use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::cancel::CancelToken;
use crate::descriptor::{piece_count, piece_range, Descriptor, FileEntry, PieceHash};
use crate::error::{Error, Result};
use crate::path_safety;
use crate::span::Span;

/// Hash every piece of `span`. Pieces are hashed on the rayon pool but the
/// result is always in ascending piece order.
pub fn hash_pieces(span: &Span, piece_length: u32, cancel: &CancelToken) -> Result<Vec<PieceHash>> {
    if piece_length == 0 {
        return Err(Error::InvalidPieceLength);
    }
    let total = span.len();
    (0..piece_count(total, piece_length))
        .into_par_iter()
        .map(|i| {
            cancel.check()?;
            let (off, len) = piece_range(i, piece_length, total);
            span.hash_range(off, len)
        })
        .collect()
}

/// Build a descriptor for `files`, resolved under `<root>/<name>`.
///
/// A single entry with an empty path describes the file `<root>/<name>` itself.
pub fn build(root: &Path, name: &str, files: Vec<FileEntry>, piece_length: u32) -> Result<Descriptor> {
    build_with_cancel(root, name, files, piece_length, &CancelToken::new())
}

pub fn build_with_cancel(
    root: &Path,
    name: &str,
    files: Vec<FileEntry>,
    piece_length: u32,
    cancel: &CancelToken,
) -> Result<Descriptor> {
    if piece_length == 0 {
        return Err(Error::InvalidPieceLength);
    }
    path_safety::validate_name(name)?;
    let base = root.join(name);
    let span = Span::open(&base, &files)?;
    if span.is_empty() {
        return Err(Error::EmptyContent(base));
    }
    let t0 = std::time::Instant::now();
    let pieces = hash_pieces(&span, piece_length, cancel)?;
    drop(span);
    tracing::debug!(
        name,
        files = files.len(),
        pieces = pieces.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "built descriptor"
    );
    Ok(Descriptor { name: name.to_string(), piece_length, pieces, files })
}

/// Single-file descriptor for `<root>/<file_name>`; the name is the file name.
pub fn build_from_file(root: &Path, file_name: &str, piece_length: u32) -> Result<Descriptor> {
    build_from_file_with_cancel(root, file_name, piece_length, &CancelToken::new())
}

pub fn build_from_file_with_cancel(
    root: &Path,
    file_name: &str,
    piece_length: u32,
    cancel: &CancelToken,
) -> Result<Descriptor> {
    path_safety::validate_name(file_name)?;
    let path = root.join(file_name);
    let length = std::fs::metadata(&path).map_err(|e| Error::io(&path, e))?.len();
    build_with_cancel(root, file_name, vec![FileEntry::new(Vec::new(), length)], piece_length, cancel)
}

/// Multi-file descriptor over every regular file below `<root>/<name>`, in
/// sorted relative-path order.
pub fn build_from_dir(root: &Path, name: &str, piece_length: u32) -> Result<Descriptor> {
    path_safety::validate_name(name)?;
    let files = collect_dir_entries(&root.join(name))?;
    build(root, name, files, piece_length)
}

fn collect_dir_entries(dir: &Path) -> Result<Vec<FileEntry>> {
    let mut files = Vec::new();
    for ent in walkdir::WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let ent = ent.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            Error::io(path, e.into())
        })?;
        if !ent.file_type().is_file() {
            continue;
        }
        let rel = ent.path().strip_prefix(dir).unwrap_or(ent.path());
        let path = rel
            .components()
            .map(|c| {
                c.as_os_str().to_str().map(str::to_string).ok_or_else(|| Error::UnsafePath {
                    path: PathBuf::from(ent.path()),
                    reason: "non-UTF-8 file name",
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let length = ent.metadata().map_err(|e| Error::io(ent.path(), e.into()))?.len();
        files.push(FileEntry::new(path, length));
    }
    Ok(files)
}
