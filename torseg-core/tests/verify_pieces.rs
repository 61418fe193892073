use rand::{rngs::StdRng, Rng, SeedableRng};
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use torseg_core::verify::{self, VerifyReport};
use torseg_core::{build, codec, CancelToken, Descriptor, Error, FileEntry};

const PIECE: u32 = 4096;

fn random_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

/// Three files under `<root>/set` whose sizes don't align with PIECE.
fn multi_file_set(root: &Path) -> Descriptor {
    let dir = root.join("set");
    fs::create_dir_all(&dir).unwrap();
    let sizes = [10_000usize, 1, 7_777];
    let mut files = Vec::new();
    for (i, size) in sizes.iter().enumerate() {
        let name = format!("part-{i}.seg");
        fs::write(dir.join(&name), random_bytes(i as u64, *size)).unwrap();
        files.push(FileEntry::new(vec![name], *size as u64));
    }
    build::build(root, "set", files, PIECE).unwrap()
}

fn collect(d: &Descriptor, root: &Path) -> Vec<(usize, bool)> {
    let mut seen = Vec::new();
    verify::verify(
        d,
        root,
        |i, good| -> Result<(), Error> {
            seen.push((i, good));
            Ok(())
        },
        &CancelToken::new(),
    )
    .unwrap();
    seen
}

fn flip_byte(path: &Path, offset: u64) {
    let mut f = OpenOptions::new().read(true).write(true).open(path).unwrap();
    let mut b = [0u8; 1];
    f.seek(SeekFrom::Start(offset)).unwrap();
    std::io::Read::read_exact(&mut f, &mut b).unwrap();
    f.seek(SeekFrom::Start(offset)).unwrap();
    f.write_all(&[b[0] ^ 0xFF]).unwrap();
}

#[test]
fn freshly_built_content_verifies_clean() {
    let td = tempfile::tempdir().unwrap();
    let d = multi_file_set(td.path());
    let seen = collect(&d, td.path());
    assert_eq!(seen.len(), d.num_pieces());
    assert!(seen.iter().enumerate().all(|(n, &(i, good))| n == i && good));

    let report = verify::verify_report(&d, td.path(), &CancelToken::new()).unwrap();
    assert_eq!(report, VerifyReport { pieces_ok: d.num_pieces() as u64, bad_pieces: vec![] });
    assert!(report.is_complete());
}

#[test]
fn flipped_byte_fails_exactly_its_piece() {
    // global offsets: part-0 covers [0, 10000), part-1 [10000, 10001), part-2 [10001, 17778)
    let cases: [(&str, u64, usize); 4] = [
        ("part-0.seg", 0, 0),
        ("part-0.seg", 8191, 1),
        ("part-1.seg", 0, 2),
        ("part-2.seg", 7_776, 4),
    ];
    for (file, local, want_bad) in cases {
        let td = tempfile::tempdir().unwrap();
        let d = multi_file_set(td.path());
        flip_byte(&td.path().join("set").join(file), local);
        let seen = collect(&d, td.path());
        assert_eq!(seen.len(), d.num_pieces());
        for (i, good) in seen {
            assert_eq!(good, i != want_bad, "{file}@{local}: piece {i}");
        }
    }
}

#[test]
fn truncated_file_fails_before_any_piece() {
    let td = tempfile::tempdir().unwrap();
    let d = multi_file_set(td.path());
    let victim = td.path().join("set").join("part-2.seg");
    OpenOptions::new().write(true).open(&victim).unwrap().set_len(100).unwrap();

    let mut calls = 0;
    let res = verify::verify(
        &d,
        td.path(),
        |_, _| -> Result<(), Error> {
            calls += 1;
            Ok(())
        },
        &CancelToken::new(),
    );
    match res {
        Err(Error::LengthMismatch { path, expected, actual }) => {
            assert_eq!(path, victim);
            assert_eq!((expected, actual), (7_777, 100));
        }
        other => panic!("expected length mismatch, got {other:?}"),
    }
    assert_eq!(calls, 0);
}

#[test]
fn cancel_stops_reporting_and_returns_cancelled() {
    let td = tempfile::tempdir().unwrap();
    let d = multi_file_set(td.path());
    let cancel = CancelToken::new();
    let mut seen = Vec::new();
    let res = verify::verify(
        &d,
        td.path(),
        |i, _| -> Result<(), Error> {
            seen.push(i);
            if i == 1 {
                cancel.cancel();
            }
            Ok(())
        },
        &cancel,
    );
    assert!(matches!(res, Err(Error::Cancelled)));
    assert_eq!(seen, vec![0, 1]);

    let cancel = CancelToken::new();
    let mut seen = Vec::new();
    let res = verify::verify_parallel(
        &d,
        td.path(),
        2,
        |i, _| -> Result<(), Error> {
            seen.push(i);
            cancel.cancel();
            Ok(())
        },
        &cancel,
    );
    assert!(res.unwrap_err().is_cancelled());
    assert_eq!(seen, vec![0]);
}

#[derive(Debug)]
enum Stop {
    BadPiece(usize),
    Verify(Error),
}

impl From<Error> for Stop {
    fn from(e: Error) -> Self {
        Stop::Verify(e)
    }
}

#[test]
fn sink_error_is_propagated_verbatim() {
    let td = tempfile::tempdir().unwrap();
    let d = multi_file_set(td.path());
    flip_byte(&td.path().join("set").join("part-0.seg"), 5000);
    let mut seen = 0;
    let res = verify::verify(
        &d,
        td.path(),
        |i, good| {
            seen += 1;
            if good {
                Ok(())
            } else {
                Err(Stop::BadPiece(i))
            }
        },
        &CancelToken::new(),
    );
    assert!(matches!(res, Err(Stop::BadPiece(1))));
    assert_eq!(seen, 2);
}

#[test]
fn parallel_matches_sequential() {
    let td = tempfile::tempdir().unwrap();
    let d = multi_file_set(td.path());
    flip_byte(&td.path().join("set").join("part-2.seg"), 3);
    let seq = collect(&d, td.path());
    for batch in [1, 2, 3, 64] {
        let mut par = Vec::new();
        verify::verify_parallel(
            &d,
            td.path(),
            batch,
            |i, good| -> Result<(), Error> {
                par.push((i, good));
                Ok(())
            },
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(par, seq);
    }
}

#[test]
fn verify_file_reads_descriptor_from_disk() {
    let td = tempfile::tempdir().unwrap();
    let d = multi_file_set(td.path());
    let path = codec::write(td.path(), &d, &[]).unwrap();
    let r = verify::verify_file(&path, td.path(), &CancelToken::new()).unwrap();
    assert!(r.is_complete());

    // rescans every call, nothing is cached
    flip_byte(&td.path().join("set").join("part-1.seg"), 0);
    let r = verify::verify_file(&path, td.path(), &CancelToken::new()).unwrap();
    assert_eq!(r.bad_pieces, vec![2]);
}

#[test]
fn single_file_descriptor_resolves_to_root_name() {
    let td = tempfile::tempdir().unwrap();
    fs::write(td.path().join("v1-000000-000500-headers.seg"), random_bytes(9, 50_000)).unwrap();
    let d = build::build_from_file(td.path(), "v1-000000-000500-headers.seg", PIECE).unwrap();
    let seen = collect(&d, td.path());
    assert_eq!(seen.len(), 13);
    assert!(seen.iter().all(|&(_, good)| good));
}

#[test]
fn many_small_files_verify_piece_by_piece() {
    let td = tempfile::tempdir().unwrap();
    let dir = td.path().join("many");
    fs::create_dir_all(&dir).unwrap();
    let mut files = Vec::new();
    for i in 0..300u64 {
        let name = format!("s{i:03}.seg");
        let len = if i % 7 == 0 { 0 } else { 3 };
        fs::write(dir.join(&name), random_bytes(100 + i, len)).unwrap();
        files.push(FileEntry::new(vec![name], len as u64));
    }
    let d = build::build(td.path(), "many", files, 5).unwrap();
    assert_eq!(d.total_length(), 771);
    assert_eq!(d.num_pieces(), 155);
    assert!(collect(&d, td.path()).iter().all(|&(_, good)| good));

    // s150.seg starts at 3 * (150 - 22) = 384; its byte 1 sits in piece 77
    flip_byte(&dir.join("s150.seg"), 1);
    let report = verify::verify_report(&d, td.path(), &CancelToken::new()).unwrap();
    assert_eq!(report.bad_pieces, vec![77]);
    assert_eq!(report.pieces_ok, 154);
}
