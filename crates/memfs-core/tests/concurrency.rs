// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::sync::Arc;
use std::thread;

use memfs_core::{Config, FileSystem, NodeId};

const THREADS: usize = 8;
const FILES_PER_THREAD: usize = 25;

#[test]
fn parallel_creates_keep_counters_and_ids_consistent() {
    let fs = Arc::new(FileSystem::new("/mnt/parallel", Config::default()).unwrap());

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let fs = Arc::clone(&fs);
            thread::spawn(move || {
                let (uid, gid) = fs.owner();
                let dir = fs.mkdir(fs.root(), &format!("t{t}"), 0o755, uid, gid).unwrap();
                let dir = NodeId(dir.ino);
                let mut ids = Vec::new();
                for i in 0..FILES_PER_THREAD {
                    let attr = fs.create(dir, &format!("f{i}"), 0o644, uid, gid).unwrap();
                    let id = NodeId(attr.ino);
                    fs.write(id, 0, format!("thread {t} file {i}").as_bytes()).unwrap();
                    ids.push(id.0);
                }
                ids
            })
        })
        .collect();

    let mut all_ids: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    let total = all_ids.len();
    all_ids.sort_unstable();
    all_ids.dedup();
    assert_eq!(all_ids.len(), total, "identities must be unique");

    let stats = fs.stats();
    assert_eq!(stats.nfiles as usize, THREADS * FILES_PER_THREAD);
    assert_eq!(stats.ndirs as usize, THREADS + 1);

    let expected_bytes: u64 = (0..THREADS)
        .flat_map(|t| {
            (0..FILES_PER_THREAD).map(move |i| format!("thread {t} file {i}").len() as u64)
        })
        .sum();
    assert_eq!(stats.nbytes, expected_bytes);
}

#[test]
fn concurrent_writers_to_one_file_never_lose_length() {
    let fs = Arc::new(FileSystem::new("/mnt/shared", Config::default()).unwrap());
    let id = NodeId(fs.create(fs.root(), "shared.log", 0o644, 0, 0).unwrap().ino);
    const CHUNK: usize = 64;

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let fs = Arc::clone(&fs);
            thread::spawn(move || {
                let payload = vec![b'a' + t as u8; CHUNK];
                for round in 0..10 {
                    let offset = ((round * THREADS + t) * CHUNK) as u64;
                    fs.write(id, offset, &payload).unwrap();
                    let back = fs.read(id, offset, CHUNK as u64).unwrap();
                    assert_eq!(back, payload);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let size = fs.attr(id).unwrap().size;
    assert_eq!(size as usize, THREADS * 10 * CHUNK);
    assert_eq!(fs.read_all(id).unwrap().len() as u64, size);
    assert_eq!(fs.stats().nbytes, size);
}

#[test]
fn readers_and_renamers_interleave() {
    let fs = Arc::new(FileSystem::new("/mnt/mixed", Config::default()).unwrap());
    let (uid, gid) = fs.owner();
    let left = NodeId(fs.mkdir(fs.root(), "left", 0o755, uid, gid).unwrap().ino);
    let right = NodeId(fs.mkdir(fs.root(), "right", 0o755, uid, gid).unwrap().ino);
    let id = NodeId(fs.create(left, "ball", 0o644, uid, gid).unwrap().ino);

    let mover = {
        let fs = Arc::clone(&fs);
        thread::spawn(move || {
            for _ in 0..100 {
                fs.rename(left, "ball", right, "ball").unwrap();
                fs.rename(right, "ball", left, "ball").unwrap();
            }
        })
    };
    let reader = {
        let fs = Arc::clone(&fs);
        thread::spawn(move || {
            for _ in 0..200 {
                let path = fs.path(id).unwrap();
                assert!(path.ends_with("left/ball") || path.ends_with("right/ball"));
                assert_eq!(fs.read_all(id).unwrap().len(), 0);
            }
        })
    };

    mover.join().unwrap();
    reader.join().unwrap();
    assert_eq!(fs.lookup(left, "ball").unwrap().ino, id.0);
    assert_eq!(fs.stats().nfiles, 1);
}
