//! Bencoded `.torrent` envelope around a [`Descriptor`].
//!
//! Layout (keys sorted, as bencode requires):
//! `{ announce?, announce-list?, created by?, creation date?, info }` with
//! `info = { files | length, name, piece length, pieces }`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::descriptor::{piece_count, Descriptor, FileEntry, PieceHash, Tiers, PIECE_HASH_LEN};
use crate::error::{Error, Result};
use crate::path_safety;

pub const DESCRIPTOR_EXT: &str = "torrent";

pub const CREATED_BY: &str = concat!("torseg/", env!("CARGO_PKG_VERSION"));

/// Unix mode of written descriptor files.
#[cfg(unix)]
pub const DESCRIPTOR_MODE: u32 = 0o644;

#[derive(Serialize, Deserialize)]
struct InfoDict {
    name: String,
    #[serde(rename = "piece length")]
    piece_length: u64,
    #[serde(with = "serde_bytes")]
    pieces: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    files: Option<Vec<FileEntry>>,
}

#[derive(Serialize, Deserialize)]
struct MetaInfoDict {
    info: InfoDict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    announce: Option<String>,
    #[serde(rename = "announce-list", default, skip_serializing_if = "Option::is_none")]
    announce_list: Option<Tiers>,
    #[serde(rename = "creation date", default, skip_serializing_if = "Option::is_none")]
    creation_date: Option<i64>,
    #[serde(rename = "created by", default, skip_serializing_if = "Option::is_none")]
    created_by: Option<String>,
}

/// A descriptor together with its distribution envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaInfo {
    pub descriptor: Descriptor,
    pub announce_list: Tiers,
    pub creation_date: Option<i64>,
    pub created_by: Option<String>,
}

impl MetaInfo {
    /// Fresh envelope stamped with the current time.
    pub fn new(descriptor: Descriptor, tiers: Tiers) -> Self {
        Self {
            descriptor,
            announce_list: tiers,
            creation_date: Some(chrono::Utc::now().timestamp()),
            created_by: Some(CREATED_BY.to_string()),
        }
    }
}

fn to_info(d: &Descriptor) -> InfoDict {
    let mut pieces = Vec::with_capacity(d.pieces.len() * PIECE_HASH_LEN);
    for p in &d.pieces {
        pieces.extend_from_slice(p.as_bytes());
    }
    let (length, files) = if d.is_single_file() {
        (Some(d.files[0].length), None)
    } else {
        (None, Some(d.files.clone()))
    };
    InfoDict { name: d.name.clone(), piece_length: d.piece_length as u64, pieces, length, files }
}

fn from_info(info: InfoDict, path: Option<&Path>) -> Result<Descriptor> {
    let bad = |reason: String| Error::decode(path.map(Path::to_path_buf), reason);
    if info.piece_length == 0 || info.piece_length > u32::MAX as u64 {
        return Err(bad(format!("invalid piece length {}", info.piece_length)));
    }
    if info.pieces.len() % PIECE_HASH_LEN != 0 {
        return Err(bad(format!("pieces field of {} bytes is not a multiple of 20", info.pieces.len())));
    }
    path_safety::validate_name(&info.name).map_err(|e| bad(e.to_string()))?;
    let files = match (info.length, info.files) {
        (Some(length), None) => vec![FileEntry::new(Vec::new(), length)],
        (None, Some(files)) if !files.is_empty() => {
            for fe in &files {
                if fe.path.is_empty() {
                    return Err(bad("file entry with empty path".into()));
                }
                for comp in &fe.path {
                    path_safety::validate_component(comp)
                        .map_err(|r| bad(format!("{r}: {:?}", fe.path)))?;
                }
            }
            files
        }
        (Some(_), Some(_)) => return Err(bad("both length and files present".into())),
        _ => return Err(bad("neither length nor files present".into())),
    };
    let pieces: Vec<PieceHash> = info
        .pieces
        .chunks_exact(PIECE_HASH_LEN)
        .map(|c| {
            let mut h = [0u8; PIECE_HASH_LEN];
            h.copy_from_slice(c);
            PieceHash(h)
        })
        .collect();
    let piece_length = info.piece_length as u32;
    let total = files.iter().try_fold(0u64, |acc, f| acc.checked_add(f.length));
    let Some(total) = total else {
        return Err(bad("file lengths overflow".into()));
    };
    let want = piece_count(total, piece_length);
    if pieces.len() != want {
        return Err(bad(format!("{} pieces for {} bytes, expected {}", pieces.len(), total, want)));
    }
    Ok(Descriptor { name: info.name, piece_length, pieces, files })
}

/// Bencoded info dictionary; input to the info-hash.
pub fn encode_info(d: &Descriptor) -> Result<Vec<u8>> {
    serde_bencode::to_bytes(&to_info(d)).map_err(|e| Error::Encode(e.to_string()))
}

pub fn encode(meta: &MetaInfo) -> Result<Vec<u8>> {
    let announce_list = (!meta.announce_list.is_empty()).then(|| meta.announce_list.clone());
    let announce = meta.announce_list.iter().flatten().next().cloned();
    let dict = MetaInfoDict {
        info: to_info(&meta.descriptor),
        announce,
        announce_list,
        creation_date: meta.creation_date,
        created_by: meta.created_by.clone(),
    };
    serde_bencode::to_bytes(&dict).map_err(|e| Error::Encode(e.to_string()))
}

pub fn decode(bytes: &[u8]) -> Result<MetaInfo> {
    decode_at(bytes, None)
}

fn decode_at(bytes: &[u8], path: Option<&Path>) -> Result<MetaInfo> {
    let dict: MetaInfoDict = serde_bencode::from_bytes(bytes)
        .map_err(|e| Error::decode(path.map(Path::to_path_buf), e.to_string()))?;
    let announce_list = match (dict.announce_list, dict.announce) {
        (Some(list), _) => list,
        (None, Some(a)) => vec![vec![a]],
        (None, None) => Vec::new(),
    };
    Ok(MetaInfo {
        descriptor: from_info(dict.info, path)?,
        announce_list,
        creation_date: dict.creation_date,
        created_by: dict.created_by,
    })
}

/// `<root>/<name>.torrent`
pub fn descriptor_path(root: &Path, name: &str) -> PathBuf {
    root.join(format!("{name}.{DESCRIPTOR_EXT}"))
}

/// Content name a descriptor file refers to: its file name minus the extension.
pub fn content_name(descriptor_file: &Path) -> Option<&str> {
    let file_name = descriptor_file.file_name()?.to_str()?;
    file_name.strip_suffix(format!(".{DESCRIPTOR_EXT}").as_str())
}

/// Write a fresh envelope for `descriptor` with `tiers`, replacing any
/// existing file. Returns the path written.
pub fn write(root: &Path, descriptor: &Descriptor, tiers: &[Vec<String>]) -> Result<PathBuf> {
    write_with(root, descriptor, None, tiers)
}

/// Like [`write`], but reuses `existing` when given. Its tiers are always
/// replaced with `tiers`; only its dates and creator survive.
pub fn write_with(
    root: &Path,
    descriptor: &Descriptor,
    existing: Option<MetaInfo>,
    tiers: &[Vec<String>],
) -> Result<PathBuf> {
    let meta = match existing {
        Some(mut mi) => {
            mi.descriptor = descriptor.clone();
            mi.announce_list = tiers.to_vec();
            mi
        }
        None => MetaInfo::new(descriptor.clone(), tiers.to_vec()),
    };
    write_meta(root, &meta)
}

/// Encode `meta` to `<root>/<name>.torrent` through a synced temp file and a
/// rename, so readers never observe a half-written descriptor.
pub fn write_meta(root: &Path, meta: &MetaInfo) -> Result<PathBuf> {
    let bytes = encode(meta)?;
    let path = descriptor_path(root, &meta.descriptor.name);
    let mut tmp = tempfile::NamedTempFile::new_in(root).map_err(|e| Error::io(root, e))?;
    tmp.write_all(&bytes).map_err(|e| Error::io(tmp.path(), e))?;
    // NamedTempFile starts out 0600.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(DESCRIPTOR_MODE))
            .map_err(|e| Error::io(tmp.path(), e))?;
    }
    tmp.as_file().sync_all().map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(&path).map_err(|e| Error::io(&path, e.error))?;
    #[cfg(unix)]
    {
        if let Err(e) = fs::File::open(root).and_then(|d| d.sync_all()) {
            tracing::debug!(root = %root.display(), error = %e, "directory sync failed");
        }
    }
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote descriptor");
    Ok(path)
}

/// Write only when `<root>/<name>.torrent` does not exist yet. Existence is
/// all that is checked, never content. Returns whether a file was written.
pub fn create_if_absent(root: &Path, descriptor: &Descriptor, tiers: &[Vec<String>]) -> Result<bool> {
    let path = descriptor_path(root, &descriptor.name);
    if path.try_exists().map_err(|e| Error::io(&path, e))? {
        return Ok(false);
    }
    write(root, descriptor, tiers)?;
    Ok(true)
}

pub fn read_meta(path: &Path) -> Result<MetaInfo> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    decode_at(&bytes, Some(path))
}

pub fn read(path: &Path) -> Result<(Descriptor, Tiers)> {
    let mi = read_meta(path)?;
    Ok((mi.descriptor, mi.announce_list))
}
