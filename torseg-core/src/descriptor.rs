use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::path_safety;

/// Piece length used when the embedding system does not choose one.
pub const DEFAULT_PIECE_LENGTH: u32 = 2 * 1024 * 1024;

pub const PIECE_HASH_LEN: usize = 20;

/// SHA-1 digest of one piece.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PieceHash(pub [u8; PIECE_HASH_LEN]);

impl PieceHash {
    pub fn of(data: &[u8]) -> Self {
        let mut h = Sha1::new();
        h.update(data);
        Self::from_hasher(h)
    }

    pub(crate) fn from_hasher(h: Sha1) -> Self {
        let mut out = [0u8; PIECE_HASH_LEN];
        out.copy_from_slice(&h.finalize());
        PieceHash(out)
    }

    pub fn as_bytes(&self) -> &[u8; PIECE_HASH_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for PieceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PieceHash({})", self.to_hex())
    }
}

impl fmt::Display for PieceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// One physical file inside a descriptor. Order inside [`Descriptor::files`]
/// defines the file's offset in the concatenated byte space.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub path: Vec<String>,
    pub length: u64,
}

impl FileEntry {
    pub fn new(path: Vec<String>, length: u64) -> Self {
        Self { path, length }
    }

    /// Location of this file under `base` (the content root for single-file
    /// descriptors, the content directory otherwise).
    pub fn resolve(&self, base: &Path) -> Result<PathBuf> {
        path_safety::resolve(base, &self.path)
    }
}

/// Ordered tiers of announce endpoints; lower index = higher priority.
pub type Tiers = Vec<Vec<String>>;

/// Name, piece length, ordered piece hashes and file list of one content unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    pub name: String,
    pub piece_length: u32,
    pub pieces: Vec<PieceHash>,
    pub files: Vec<FileEntry>,
}

/// Byte range and expected hash of a piece, derived from its index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Piece {
    pub index: usize,
    pub offset: u64,
    pub length: u64,
    pub hash: PieceHash,
}

impl Descriptor {
    /// A single-file descriptor has exactly one entry with an empty path;
    /// its data lives at `<root>/<name>` rather than inside a directory.
    pub fn is_single_file(&self) -> bool {
        self.files.len() == 1 && self.files[0].path.is_empty()
    }

    pub fn total_length(&self) -> u64 {
        self.files.iter().map(|f| f.length).sum()
    }

    pub fn num_pieces(&self) -> usize {
        self.pieces.len()
    }

    pub fn piece(&self, index: usize) -> Option<Piece> {
        let hash = *self.pieces.get(index)?;
        let (offset, length) = piece_range(index, self.piece_length, self.total_length());
        Some(Piece { index, offset, length, hash })
    }

    /// Directory the file entries are resolved against when the content sits
    /// under `root`.
    pub fn content_base(&self, root: &Path) -> PathBuf {
        root.join(&self.name)
    }

    /// SHA-1 over the bencoded info dictionary; the identifier peers use for
    /// this content.
    pub fn info_hash(&self) -> Result<PieceHash> {
        let bytes = crate::codec::encode_info(self)?;
        Ok(PieceHash::of(&bytes))
    }
}

/// Number of pieces needed to tile `total` bytes.
pub fn piece_count(total: u64, piece_length: u32) -> usize {
    if piece_length == 0 {
        return 0;
    }
    total.div_ceil(piece_length as u64) as usize
}

/// `(offset, length)` of piece `index`; the final piece may be short.
pub fn piece_range(index: usize, piece_length: u32, total: u64) -> (u64, u64) {
    let offset = index as u64 * piece_length as u64;
    let end = (offset + piece_length as u64).min(total);
    (offset, end.saturating_sub(offset))
}
