// SPDX-License-Identifier: Apache-2.0

mod common;

use chrono::{Duration, Utc};
use common::{write_file, FakeTransport};
use datacache_core::sha256_hex;
use datacache_model::{Checksum, FileDescriptor, UpdateRequest};
use datacache_store::{
    partial_path, CacheErrorCode, CommitOutcome, Fetcher, SpaceBudget, StalenessPolicy,
    UpdatePlanner, VersionedFileIndex,
};
use tempfile::tempdir;

const URL: &str = "https://static.example.org/report";

fn plan(index: &VersionedFileIndex, descriptors: &[FileDescriptor]) -> Vec<UpdateRequest> {
    UpdatePlanner.plan(descriptors, index)
}

#[test]
fn verified_download_is_published_and_indexed() {
    let dir = tempdir().expect("tempdir");
    let body = b"date,cases\n2021-04-08,42\n";
    let transport = FakeTransport::default().with_file(URL, body);
    let mut index = VersionedFileIndex::scan(dir.path()).expect("scan");
    let descriptor = FileDescriptor::new("report-2021-04-08-21h20.csv", URL, "csv")
        .with_checksum(Checksum::new("SHA-256", sha256_hex(body)))
        .with_declared_size(body.len() as u64);
    let requests = plan(&index, &[descriptor]);
    let mut budget = SpaceBudget::new(1000, 0);

    let fetcher = Fetcher::new(&transport, StalenessPolicy::default(), 0);
    let outcome = fetcher
        .commit(&requests[0], &mut index, &mut budget, Utc::now())
        .expect("commit");
    assert_eq!(
        outcome,
        CommitOutcome::Written {
            file_name: "report-2021-04-08-21h20.csv".to_string(),
            bytes: body.len() as u64,
        }
    );
    assert_eq!(
        index.most_recent("report-!.csv").map(|e| e.file_name.as_str()),
        Some("report-2021-04-08-21h20.csv")
    );
    assert_eq!(budget.available_bytes(), 1000 - body.len() as u64);
    assert!(!partial_path(dir.path(), "report-2021-04-08-21h20.csv").exists());
}

#[test]
fn checksum_mismatch_discards_file_and_leaves_index_untouched() {
    let dir = tempdir().expect("tempdir");
    let transport = FakeTransport::default().with_file(URL, b"tampered");
    let mut index = VersionedFileIndex::scan(dir.path()).expect("scan");
    let descriptor = FileDescriptor::new("report-2021-04-08-21h20.csv", URL, "csv")
        .with_checksum(Checksum::new("md5", "0".repeat(32)));
    let requests = plan(&index, &[descriptor]);
    let mut budget = SpaceBudget::new(1000, 0);

    let err = Fetcher::new(&transport, StalenessPolicy::default(), 0)
        .commit(&requests[0], &mut index, &mut budget, Utc::now())
        .expect_err("mismatch");
    assert_eq!(err.code, CacheErrorCode::ChecksumMismatch);
    assert!(err.code.is_request_scoped());
    assert_eq!(index.file_count(), 0);
    assert_eq!(budget.available_bytes(), 1000);
    assert_eq!(std::fs::read_dir(dir.path()).expect("ls").count(), 0);
}

#[test]
fn remote_newer_respects_grace_margin_on_real_files() {
    let dir = tempdir().expect("tempdir");
    write_file(dir.path(), "report-2021-04-08-21h20.csv", 4);
    let index = VersionedFileIndex::scan(dir.path()).expect("scan");
    let local_mtime = index
        .most_recent("report-!.csv")
        .map(|e| e.modified_at)
        .expect("local entry");

    let newer = FileDescriptor::new("report-2021-04-09-21h20.csv", URL, "csv")
        .with_remote_modified_at(local_mtime + Duration::minutes(10))
        .with_declared_size(7);
    let barely = FileDescriptor::new("report-2021-04-09-21h20.csv", URL, "csv")
        .with_remote_modified_at(local_mtime + Duration::minutes(2))
        .with_declared_size(7);
    let transport = FakeTransport::default();
    let fetcher = Fetcher::new(&transport, StalenessPolicy::default(), 0);

    let fired = fetcher.account(&plan(&index, &[newer]), &index, Utc::now());
    assert_eq!(fired.firing_requests, 1);
    assert_eq!(fired.required_bytes, 7);
    let quiet = fetcher.account(&plan(&index, &[barely.clone()]), &index, Utc::now());
    assert_eq!(quiet.firing_requests, 0);
    assert_eq!(quiet.required_bytes, 0);

    let mut index = index;
    let mut budget = SpaceBudget::new(100, 4);
    let outcome = fetcher
        .commit(&plan(&index, &[barely])[0], &mut index, &mut budget, Utc::now())
        .expect("commit");
    assert_eq!(outcome, CommitOutcome::Skipped);
    assert!(transport.downloaded().is_empty());
}

#[test]
fn space_accounting_closes_over_a_commit_batch() {
    let dir = tempdir().expect("tempdir");
    write_file(dir.path(), "codes.csv", 3);
    let transport = FakeTransport::default()
        .with_file("https://x/a", b"aaaaa")
        .with_file("https://x/b", b"bbbbbbbbbb")
        .with_file("https://x/codes", b"ccc");
    let mut index = VersionedFileIndex::scan(dir.path()).expect("scan");
    let descriptors = vec![
        FileDescriptor::new("a-2021-04-08-10h00.csv", "https://x/a", "csv"),
        FileDescriptor::new("b-20210408-100000.json", "https://x/b", "json"),
        // Already on disk: planned, but the staleness test does not fire.
        FileDescriptor::new("codes.csv", "https://x/codes", "csv"),
    ];
    let requests = plan(&index, &descriptors);
    assert_eq!(requests.len(), 3);

    let fetcher = Fetcher::new(&transport, StalenessPolicy::default(), 0);
    let now = Utc::now();
    let accounting = fetcher.account(&requests, &index, now);
    assert_eq!(accounting.firing_requests, 2);
    assert_eq!(accounting.estimated_requests, 2);

    let mut budget = SpaceBudget::new(100, index.total_bytes());
    let before = budget.available_bytes();
    let mut written = 0;
    for request in &requests {
        if let CommitOutcome::Written { bytes, .. } = fetcher
            .commit(request, &mut index, &mut budget, now)
            .expect("commit")
        {
            written += bytes;
        }
    }
    assert_eq!(written, 15);
    assert_eq!(budget.available_bytes(), before - written);
    assert_eq!(transport.downloaded(), vec!["https://x/a", "https://x/b"]);
}

#[test]
fn download_overrunning_quota_is_fatal_and_discarded() {
    let dir = tempdir().expect("tempdir");
    let transport = FakeTransport::default().with_file(URL, &[7_u8; 64]);
    let mut index = VersionedFileIndex::scan(dir.path()).expect("scan");
    // Declared size understates the real payload.
    let descriptor =
        FileDescriptor::new("report-2021-04-08-21h20.csv", URL, "csv").with_declared_size(8);
    let requests = plan(&index, &[descriptor]);
    let mut budget = SpaceBudget::new(32, 0);

    let err = Fetcher::new(&transport, StalenessPolicy::default(), 0)
        .commit(&requests[0], &mut index, &mut budget, Utc::now())
        .expect_err("overrun");
    assert_eq!(err.code, CacheErrorCode::SpaceExhausted);
    assert!(!err.code.is_request_scoped());
    assert_eq!(budget.available_bytes(), 32);
    assert_eq!(std::fs::read_dir(dir.path()).expect("ls").count(), 0);
    // The stream was cut one byte past the quota, not after the full body.
    assert_eq!(*transport.download_limits.borrow(), vec![(32, 33)]);
}

#[test]
fn overwriting_a_file_counts_its_bytes_toward_the_download_limit() {
    let dir = tempdir().expect("tempdir");
    write_file(dir.path(), "report-2021-04-08-21h20.csv", 15);
    let mut index = VersionedFileIndex::scan(dir.path()).expect("scan");
    let local_mtime = index
        .most_recent("report-!.csv")
        .map(|e| e.modified_at)
        .expect("local entry");
    let descriptor = FileDescriptor::new("report-2021-04-08-21h20.csv", URL, "csv")
        .with_remote_modified_at(local_mtime + Duration::hours(1));
    let requests = plan(&index, &[descriptor]);
    let transport = FakeTransport::default().with_file(URL, b"abc");
    // A directory already above its quota.
    let mut budget = SpaceBudget::new(10, index.total_bytes());

    let outcome = Fetcher::new(&transport, StalenessPolicy::default(), 0)
        .commit(&requests[0], &mut index, &mut budget, Utc::now())
        .expect("commit");
    assert!(matches!(outcome, CommitOutcome::Written { bytes: 3, .. }));
    assert_eq!(*transport.download_limits.borrow(), vec![(10, 3)]);
    assert_eq!(budget.used_bytes(), 3);
    assert_eq!(index.total_bytes(), 3);
}

#[test]
fn over_quota_overwrite_that_does_not_fit_keeps_usage_intact() {
    let dir = tempdir().expect("tempdir");
    write_file(dir.path(), "report-2021-04-08-21h20.csv", 5);
    write_file(dir.path(), "codes.csv", 10);
    let mut index = VersionedFileIndex::scan(dir.path()).expect("scan");
    let local_mtime = index
        .most_recent("report-!.csv")
        .map(|e| e.modified_at)
        .expect("local entry");
    let descriptor = FileDescriptor::new("report-2021-04-08-21h20.csv", URL, "csv")
        .with_remote_modified_at(local_mtime + Duration::hours(1));
    let requests = plan(&index, &[descriptor]);
    let transport = FakeTransport::default().with_file(URL, b"abc");
    let mut budget = SpaceBudget::new(10, index.total_bytes());

    let err = Fetcher::new(&transport, StalenessPolicy::default(), 0)
        .commit(&requests[0], &mut index, &mut budget, Utc::now())
        .expect_err("no room even after giving back the old copy");
    assert_eq!(err.code, CacheErrorCode::SpaceExhausted);
    assert_eq!(budget.used_bytes(), 15);
    assert_eq!(
        std::fs::metadata(dir.path().join("report-2021-04-08-21h20.csv"))
            .expect("old copy kept")
            .len(),
        5
    );
}

#[test]
fn unreachable_file_is_a_network_failure() {
    let dir = tempdir().expect("tempdir");
    let transport = FakeTransport::default();
    let mut index = VersionedFileIndex::scan(dir.path()).expect("scan");
    let requests = plan(
        &index,
        &[FileDescriptor::new("gone-2021-04-08-21h20.csv", URL, "csv")],
    );
    let mut budget = SpaceBudget::new(32, 0);
    let err = Fetcher::new(&transport, StalenessPolicy::default(), 0)
        .commit(&requests[0], &mut index, &mut budget, Utc::now())
        .expect_err("404");
    assert_eq!(err.code, CacheErrorCode::Network);
    assert!(!partial_path(dir.path(), "gone-2021-04-08-21h20.csv").exists());
}
