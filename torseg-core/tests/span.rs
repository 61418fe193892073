use std::fs;
use std::io::Read;
use torseg_core::span::Span;
use torseg_core::{Error, FileEntry, PieceHash};

fn entry(name: &str, len: u64) -> FileEntry {
    FileEntry::new(vec![name.to_string()], len)
}

#[test]
fn reads_stitch_across_file_boundaries() {
    let td = tempfile::tempdir().unwrap();
    fs::write(td.path().join("a"), b"01234").unwrap();
    fs::write(td.path().join("b"), b"").unwrap();
    fs::write(td.path().join("c"), b"5678901").unwrap();
    let files = vec![entry("a", 5), entry("b", 0), entry("c", 7)];
    let span = Span::open(td.path(), &files).unwrap();

    assert_eq!(span.len(), 12);
    assert_eq!(span.file_count(), 3);
    assert_eq!(span.read(0, 12).unwrap(), b"012345678901");
    assert_eq!(span.read(3, 4).unwrap(), b"3456");
    assert_eq!(span.read(5, 2).unwrap(), b"56");
    assert_eq!(span.read(12, 0).unwrap(), b"");

    // Offset 5 belongs to "c", never to the empty "b" in between.
    assert_eq!(span.locate(4), Some((0, 4)));
    assert_eq!(span.locate(5), Some((2, 0)));
    assert_eq!(span.locate(11), Some((2, 6)));
    assert_eq!(span.locate(12), None);

    let mut s = String::new();
    span.section(2, 6).unwrap().read_to_string(&mut s).unwrap();
    assert_eq!(s, "234567");
}

#[test]
fn out_of_range_reads_are_rejected() {
    let td = tempfile::tempdir().unwrap();
    fs::write(td.path().join("a"), b"hello").unwrap();
    let span = Span::open(td.path(), &[entry("a", 5)]).unwrap();
    assert!(matches!(span.read(3, 3), Err(Error::OutOfRange { offset: 3, len: 3, total: 5 })));
    assert!(matches!(span.read(6, 0), Err(Error::OutOfRange { .. })));
    assert!(matches!(span.read(u64::MAX, 2), Err(Error::OutOfRange { .. })));
}

#[test]
fn open_checks_recorded_lengths() {
    let td = tempfile::tempdir().unwrap();
    fs::write(td.path().join("a"), b"hello").unwrap();
    let err = Span::open(td.path(), &[entry("a", 6)]).err().expect("length mismatch");
    match err {
        Error::LengthMismatch { path, expected, actual } => {
            assert!(path.ends_with("a"));
            assert_eq!((expected, actual), (6, 5));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn open_reports_missing_files_as_io() {
    let td = tempfile::tempdir().unwrap();
    fs::write(td.path().join("a"), b"hello").unwrap();
    let err = Span::open(td.path(), &[entry("a", 5), entry("missing", 3)]).err().expect("missing");
    assert!(matches!(err, Error::Io { .. }), "unexpected error: {err}");
}

#[test]
fn open_rejects_escaping_paths() {
    let td = tempfile::tempdir().unwrap();
    let files = vec![FileEntry::new(vec!["..".into(), "etc".into()], 1)];
    let err = Span::open(td.path(), &files).err().expect("unsafe path");
    assert!(matches!(err, Error::UnsafePath { .. }));
}

#[test]
fn piece_hashes_iterator_restarts() {
    let td = tempfile::tempdir().unwrap();
    fs::write(td.path().join("a"), vec![7u8; 20]).unwrap();
    let span = Span::open(td.path(), &[entry("a", 20)]).unwrap();
    let first = span.piece_hashes(8).collect::<Result<Vec<_>, _>>().unwrap();
    let again = span.piece_hashes(8).collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(span.piece_hashes(8).len(), 3);
    assert_eq!(first, again);
    assert_eq!(first[0], first[1]);
    assert_ne!(first[1], first[2]);
    assert_eq!(first[2], PieceHash::of(&[7u8; 4]));

    // one item per piece, even for a single-byte piece length
    let per_byte = span.piece_hashes(1);
    assert_eq!(per_byte.len(), 20);
    assert_eq!(per_byte.filter(|h| h.is_ok()).count(), 20);
}
