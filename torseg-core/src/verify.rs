use rayon::prelude::*;
use std::path::Path;

use crate::cancel::CancelToken;
use crate::codec;
use crate::descriptor::{piece_range, Descriptor};
use crate::error::{Error, Result};
use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub pieces_ok: u64,
    pub bad_pieces: Vec<usize>,
}

impl VerifyReport {
    pub fn is_complete(&self) -> bool {
        self.bad_pieces.is_empty()
    }
}

fn open_span(descriptor: &Descriptor, root: &Path) -> Result<Span> {
    let base = descriptor.content_base(root);
    let span = Span::open(&base, &descriptor.files)?;
    tracing::debug!(
        name = %descriptor.name,
        files = span.file_count(),
        bytes = span.len(),
        pieces = descriptor.num_pieces(),
        "verifying"
    );
    Ok(span)
}

fn check_piece(span: &Span, descriptor: &Descriptor, index: usize) -> Result<bool> {
    let Some(expected) = descriptor.pieces.get(index) else {
        return Err(Error::OutOfRange {
            offset: index as u64 * descriptor.piece_length as u64,
            len: descriptor.piece_length as u64,
            total: span.len(),
        });
    };
    // span.len() == descriptor.total_length() once opened.
    let (offset, len) = piece_range(index, descriptor.piece_length, span.len());
    Ok(span.hash_range(offset, len)? == *expected)
}

/// Re-hash every piece of `descriptor` from the files under
/// `<root>/<name>` and report `(index, good)` to `on_piece` in ascending order.
///
/// Any length disagreement fails before the first piece. `cancel` is polled
/// before each piece; an error from `on_piece` is returned as-is.
pub fn verify<F, E>(descriptor: &Descriptor, root: &Path, mut on_piece: F, cancel: &CancelToken) -> Result<(), E>
where
    F: FnMut(usize, bool) -> Result<(), E>,
    E: From<Error>,
{
    let span = open_span(descriptor, root)?;
    for i in 0..descriptor.num_pieces() {
        cancel.check()?;
        let good = check_piece(&span, descriptor, i)?;
        on_piece(i, good)?;
    }
    Ok(())
}

/// Same contract as [`verify`], but hashes up to `batch` pieces at a time on
/// the rayon pool. Reports still arrive one at a time, in order, from the
/// calling thread.
pub fn verify_parallel<F, E>(
    descriptor: &Descriptor,
    root: &Path,
    batch: usize,
    mut on_piece: F,
    cancel: &CancelToken,
) -> Result<(), E>
where
    F: FnMut(usize, bool) -> Result<(), E>,
    E: From<Error>,
{
    let span = open_span(descriptor, root)?;
    let batch = batch.max(1);
    let n = descriptor.num_pieces();
    let mut start = 0;
    while start < n {
        cancel.check()?;
        let end = (start + batch).min(n);
        let verdicts: Vec<bool> = (start..end)
            .into_par_iter()
            .map(|i| {
                cancel.check()?;
                check_piece(&span, descriptor, i)
            })
            .collect::<Result<_>>()?;
        for (i, good) in (start..end).zip(verdicts) {
            cancel.check()?;
            on_piece(i, good)?;
        }
        start = end;
    }
    Ok(())
}

pub fn verify_report(descriptor: &Descriptor, root: &Path, cancel: &CancelToken) -> Result<VerifyReport> {
    let mut report = VerifyReport { pieces_ok: 0, bad_pieces: Vec::new() };
    verify_parallel(
        descriptor,
        root,
        rayon::current_num_threads() * 4,
        |i, good| -> Result<()> {
            if good {
                report.pieces_ok += 1;
            } else {
                report.bad_pieces.push(i);
            }
            Ok(())
        },
        cancel,
    )?;
    if !report.bad_pieces.is_empty() {
        tracing::warn!(name = %descriptor.name, bad = report.bad_pieces.len(), "bad pieces");
    }
    Ok(report)
}

/// Read the descriptor at `descriptor_path` and verify its content under `root`.
pub fn verify_file(descriptor_path: &Path, root: &Path, cancel: &CancelToken) -> Result<VerifyReport> {
    let (descriptor, _) = codec::read(descriptor_path)?;
    verify_report(&descriptor, root, cancel)
}
