//! Several files presented as one contiguous, read-only byte space.
//!
//! Every file is memory-mapped for the lifetime of the [`Span`]; dropping the
//! span (or failing half-way through [`Span::open`]) releases all maps.

use memmap2::Mmap;
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::descriptor::{piece_count, piece_range, FileEntry, PieceHash};
use crate::error::{Error, Result};

struct Region {
    path: PathBuf,
    // None for zero-length files; those are never mapped.
    map: Option<Mmap>,
}

impl Region {
    fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }
}

pub struct Span {
    regions: Vec<Region>,
    starts: Vec<u64>,
    total: u64,
}

fn map_file(path: &Path, expected: u64) -> Result<Option<Mmap>> {
    let f = File::open(path).map_err(|e| Error::io(path, e))?;
    let actual = f.metadata().map_err(|e| Error::io(path, e))?.len();
    if actual != expected {
        return Err(Error::LengthMismatch { path: path.to_path_buf(), expected, actual });
    }
    if actual == 0 {
        return Ok(None);
    }
    // Files are mapped read-only and nobody writes them during a pass.
    let map = unsafe { Mmap::map(&f) }.map_err(|e| Error::io(path, e))?;
    if map.len() as u64 != expected {
        return Err(Error::LengthMismatch {
            path: path.to_path_buf(),
            expected,
            actual: map.len() as u64,
        });
    }
    Ok(Some(map))
}

impl Span {
    /// Map every entry (resolved against `base`) in order.
    pub fn open(base: &Path, files: &[FileEntry]) -> Result<Span> {
        let mut regions = Vec::with_capacity(files.len());
        let mut starts = Vec::with_capacity(files.len());
        let mut total = 0u64;
        for fe in files {
            let path = fe.resolve(base)?;
            let map = map_file(&path, fe.length)?;
            tracing::trace!(path = %path.display(), length = fe.length, "mapped");
            starts.push(total);
            total += fe.length;
            regions.push(Region { path, map });
        }
        Ok(Span { regions, starts, total })
    }

    pub fn len(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn file_count(&self) -> usize {
        self.regions.len()
    }

    pub fn file_path(&self, index: usize) -> Option<&Path> {
        self.regions.get(index).map(|r| r.path.as_path())
    }

    /// Map a global offset to `(file index, offset within that file)`.
    pub fn locate(&self, offset: u64) -> Option<(usize, u64)> {
        if offset >= self.total {
            return None;
        }
        // Zero-length regions share their start with the next region, so the
        // last start <= offset is always the non-empty region holding it.
        let idx = self.starts.partition_point(|&s| s <= offset) - 1;
        Some((idx, offset - self.starts[idx]))
    }

    fn check_range(&self, offset: u64, len: u64) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.total => Ok(()),
            _ => Err(Error::OutOfRange { offset, len, total: self.total }),
        }
    }

    /// Zero-copy iteration over the mapped slices covering `[offset, offset+len)`.
    pub fn slices(&self, offset: u64, len: u64) -> Result<Slices<'_>> {
        self.check_range(offset, len)?;
        let idx = self.locate(offset).map(|(i, _)| i).unwrap_or(self.regions.len());
        Ok(Slices { span: self, idx, offset, remaining: len })
    }

    /// Copy `len` bytes starting at `offset`, stitching across file boundaries.
    pub fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len as usize);
        for s in self.slices(offset, len)? {
            out.extend_from_slice(s);
        }
        Ok(out)
    }

    /// `std::io::Read` over a bounded section of the span.
    pub fn section(&self, offset: u64, len: u64) -> Result<SectionReader<'_>> {
        Ok(SectionReader { inner: self.slices(offset, len)?, pending: &[] })
    }

    pub fn hash_range(&self, offset: u64, len: u64) -> Result<PieceHash> {
        let mut h = Sha1::new();
        for s in self.slices(offset, len)? {
            h.update(s);
        }
        Ok(PieceHash::from_hasher(h))
    }

    /// Lazily hash consecutive pieces of `piece_length` bytes, final piece short.
    pub fn piece_hashes(&self, piece_length: u32) -> PieceHashes<'_> {
        PieceHashes {
            span: self,
            piece_length,
            next: 0,
            count: piece_count(self.total, piece_length),
        }
    }
}

pub struct Slices<'a> {
    span: &'a Span,
    idx: usize,
    offset: u64,
    remaining: u64,
}

impl<'a> Iterator for Slices<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        while self.remaining > 0 {
            let region = self.span.regions.get(self.idx)?;
            let bytes = region.bytes();
            let local = (self.offset - self.span.starts[self.idx]) as usize;
            let avail = bytes.len() - local;
            if avail == 0 {
                self.idx += 1;
                continue;
            }
            let take = avail.min(self.remaining as usize);
            let out = &bytes[local..local + take];
            self.offset += take as u64;
            self.remaining -= take as u64;
            if take == avail {
                self.idx += 1;
            }
            return Some(out);
        }
        None
    }
}

pub struct SectionReader<'a> {
    inner: Slices<'a>,
    pending: &'a [u8],
}

impl Read for SectionReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.inner.next() {
                Some(s) => self.pending = s,
                None => return Ok(0),
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending = &self.pending[n..];
        Ok(n)
    }
}

/// Yields exactly one item per piece, errors included. Restartable: call
/// [`Span::piece_hashes`] again to start over.
pub struct PieceHashes<'a> {
    span: &'a Span,
    piece_length: u32,
    next: usize,
    count: usize,
}

impl Iterator for PieceHashes<'_> {
    type Item = Result<PieceHash>;

    fn next(&mut self) -> Option<Result<PieceHash>> {
        if self.next >= self.count {
            return None;
        }
        let (off, len) = piece_range(self.next, self.piece_length, self.span.total);
        self.next += 1;
        Some(self.span.hash_range(off, len))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.count - self.next;
        (n, Some(n))
    }
}

impl ExactSizeIterator for PieceHashes<'_> {}
