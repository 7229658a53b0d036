mod common;

use std::fs::OpenOptions;
use std::thread;
use std::time::{Duration, Instant};

use hashtool::constants::MIB;
use hashtool::{
    AddFileError, ClearError, DigestKind, DigestSet, EngineConfig, EngineEvent, HashEngine,
    TaskState,
};

use common::{drain, engine, slow_engine, wait_idle, write_bytes, write_file};

const ABC_MD5: &str = "900150983CD24FB0D6963F7D28E17F72";
const ABC_SHA256: &str = "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD";

#[test]
fn batch_of_three_files_completes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _events) = engine();
    let sizes = [0, 10 * MIB as usize, 20 * MIB as usize];
    for (i, size) in sizes.iter().enumerate() {
        let path = write_file(dir.path(), &format!("f{i}.bin"), *size);
        engine.add_file(&path, DigestSet::BOTH).expect("add");
    }
    wait_idle(&engine);

    let summary = engine.summary();
    assert_eq!(summary.total_bytes, 30 * MIB);
    assert_eq!(summary.done_bytes, summary.total_bytes);
    assert_eq!(summary.percent, 100);
    assert_eq!(summary.running_count, 0);

    for task in engine.tasks() {
        assert_eq!(task.state(), TaskState::Done);
        assert_eq!(task.md5.as_deref().map(str::len), Some(32));
        assert_eq!(task.sha256.as_deref().map(str::len), Some(64));
        assert_eq!(task.bytes_done, task.size);
    }
}

#[test]
fn known_content_hashes_to_known_digests() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _events) = engine();
    let first = write_bytes(dir.path(), "one.txt", b"abc");
    let second = write_bytes(dir.path(), "two.txt", b"abc");
    let a = engine.add_file(&first, DigestSet::BOTH).expect("add");
    let b = engine.add_file(&second, DigestSet::BOTH).expect("add");
    wait_idle(&engine);

    let a = engine.task(a).expect("task a");
    let b = engine.task(b).expect("task b");
    assert_eq!(a.md5.as_deref(), Some(ABC_MD5));
    assert_eq!(a.sha256.as_deref(), Some(ABC_SHA256));
    assert_eq!(a.md5, b.md5);
    assert_eq!(a.sha256, b.sha256);
}

#[test]
fn only_requested_digests_are_computed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _events) = engine();
    let path = write_bytes(dir.path(), "abc.txt", b"abc");
    let id = engine
        .add_file(&path, DigestSet::only(DigestKind::Sha256))
        .expect("add");
    wait_idle(&engine);

    let task = engine.task(id).expect("task");
    assert_eq!(task.state(), TaskState::Done);
    assert!(task.md5.is_none());
    assert_eq!(task.sha256.as_deref(), Some(ABC_SHA256));

    let report = engine.report_text();
    assert!(report.contains(&format!("SHA256: {ABC_SHA256}")));
    assert!(!report.contains("MD5:"));
}

#[test]
fn cancel_stops_large_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _events) = slow_engine(Duration::from_millis(20));
    let path = write_file(dir.path(), "large.bin", 16 * MIB as usize);
    let id = engine.add_file(&path, DigestSet::BOTH).expect("add");
    engine.cancel_all();
    wait_idle(&engine);

    let task = engine.task(id).expect("task");
    assert!(task.canceled);
    assert!(task.finished);
    assert!(task.md5.is_none());
    assert!(task.sha256.is_none());
    assert_eq!(task.state(), TaskState::Canceled);
    assert!(engine.report_text().contains("MD5: (canceled)"));
    assert!(engine.summary().done_bytes < 16 * MIB);
}

#[test]
fn add_after_cancel_resumes_processing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _events) = engine();
    engine.cancel_all();
    let path = write_bytes(dir.path(), "abc.txt", b"abc");
    let id = engine.add_file(&path, DigestSet::BOTH).expect("add");
    wait_idle(&engine);
    assert_eq!(engine.task(id).expect("task").state(), TaskState::Done);
}

#[test]
fn duplicate_path_in_other_case_is_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _events) = engine();
    let path = write_bytes(dir.path(), "Report.TXT", b"abc");
    engine.add_file(&path, DigestSet::BOTH).expect("add");

    let other_case = dir.path().join("report.txt");
    assert!(matches!(
        engine.add_file(&other_case, DigestSet::BOTH),
        Err(AddFileError::Duplicate(_))
    ));
    assert_eq!(engine.tasks().len(), 1);
}

#[test]
fn capacity_exhaustion_leaves_total_unchanged() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = EngineConfig {
        capacity: 3,
        ..common::test_config()
    };
    let (engine, _events) = HashEngine::init(&config).expect("engine");
    for i in 0..3 {
        let path = write_file(dir.path(), &format!("f{i}"), 100);
        engine.add_file(&path, DigestSet::BOTH).expect("add");
    }
    let before = engine.summary().total_bytes;
    let extra = write_file(dir.path(), "extra", 100);
    assert_eq!(
        engine.add_file(&extra, DigestSet::BOTH),
        Err(AddFileError::CapacityExhausted { capacity: 3 })
    );
    assert_eq!(engine.summary().total_bytes, before);
    assert_eq!(engine.tasks().len(), 3);
}

#[test]
fn invalid_requests_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _events) = engine();
    assert_eq!(
        engine.add_file("", DigestSet::BOTH),
        Err(AddFileError::EmptyPath)
    );
    let path = write_bytes(dir.path(), "a", b"abc");
    assert!(matches!(
        engine.add_file(&path, DigestSet::new(false, false)),
        Err(AddFileError::NoDigestRequested(_))
    ));
    assert!(engine.tasks().is_empty());
}

#[test]
fn worker_count_is_clamped() {
    let (engine, _events) = engine();
    assert_eq!(engine.set_worker_count(0), 1);
    assert_eq!(engine.set_worker_count(1000), 64);
    assert_eq!(engine.worker_count(), 64);
}

#[test]
fn second_file_extends_settled_batch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _events) = slow_engine(Duration::from_millis(20));
    let first = write_file(dir.path(), "first.bin", 3 * MIB as usize);
    engine.add_file(&first, DigestSet::BOTH).expect("add");
    wait_idle(&engine);
    assert_eq!(engine.summary().done_bytes, 3 * MIB);

    let second = write_file(dir.path(), "second.bin", 8 * MIB as usize);
    engine.add_file(&second, DigestSet::BOTH).expect("add");
    let summary = engine.summary();
    assert_eq!(summary.total_bytes, 11 * MIB);
    assert!(summary.done_bytes >= 3 * MIB);

    wait_idle(&engine);
    let summary = engine.summary();
    assert_eq!(summary.done_bytes, 11 * MIB);
    assert_eq!(summary.percent, 100);
}

#[test]
fn counters_stay_bounded_while_running() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _events) = slow_engine(Duration::from_millis(5));
    for i in 0..4 {
        let path = write_file(dir.path(), &format!("f{i}"), 4 * MIB as usize);
        engine.add_file(&path, DigestSet::BOTH).expect("add");
    }
    while !engine.wait_idle(Duration::from_millis(5)) {
        let summary = engine.summary();
        assert!(summary.done_bytes <= summary.total_bytes);
        assert!(summary.percent <= 100);
        for task in engine.tasks() {
            assert!(task.bytes_done <= task.size);
        }
    }
    assert_eq!(engine.summary().percent, 100);
}

#[test]
fn unreadable_file_fails_without_digests() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _events) = engine();
    let id = engine
        .add_file(dir.path().join("missing.bin"), DigestSet::BOTH)
        .expect("missing file is still accepted");
    wait_idle(&engine);

    let task = engine.task(id).expect("task");
    assert!(task.finished);
    assert!(!task.canceled);
    assert_eq!(task.state(), TaskState::Failed);
    let report = engine.report_text();
    assert!(report.contains("MD5: (failed)"));
    assert!(report.contains("SHA256: (failed)"));
    assert!(report.contains("Modified: (unknown)"));
}

#[test]
fn clear_is_refused_until_idle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, events) = slow_engine(Duration::from_millis(20));
    let path = write_file(dir.path(), "big.bin", 8 * MIB as usize);
    engine.add_file(&path, DigestSet::BOTH).expect("add");
    assert_eq!(engine.clear_all(), Err(ClearError::TasksRunning(1)));

    engine.cancel_all();
    wait_idle(&engine);
    engine.clear_all().expect("clear");

    assert!(engine.tasks().is_empty());
    assert_eq!(engine.report_len(), 0);
    let summary = engine.summary();
    assert_eq!(summary.total_bytes, 0);
    assert_eq!(summary.done_bytes, 0);
    assert!(drain(&events).contains(&EngineEvent::Cleared));
}

#[test]
fn events_announce_lifecycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, events) = engine();
    let path = write_file(dir.path(), "a.bin", 3 * MIB as usize);
    let id = engine.add_file(&path, DigestSet::BOTH).expect("add");
    wait_idle(&engine);

    let seen = drain(&events);
    assert!(seen.contains(&EngineEvent::TaskAdded(id)));
    assert!(seen.contains(&EngineEvent::TaskFinished(id)));
    assert!(seen.contains(&EngineEvent::Progress));
}

#[test]
fn report_lists_tasks_in_insertion_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _events) = engine();
    let names = ["zeta.bin", "alpha.bin"];
    for name in names {
        let path = write_bytes(dir.path(), name, b"abc");
        engine.add_file(&path, DigestSet::BOTH).expect("add");
    }
    wait_idle(&engine);

    let report = engine.force_report();
    let zeta = report.find("zeta.bin").expect("zeta listed");
    let alpha = report.find("alpha.bin").expect("alpha listed");
    assert!(zeta < alpha);
    assert!(report.contains("Size: 3 B"));
    assert!(report.contains("Progress: 100%"));
    assert_eq!(report.matches(&format!("MD5: {ABC_MD5}")).count(), 2);

    let mut dst = String::new();
    let copied = engine.report(&mut dst, 7);
    assert_eq!(copied, 6);
    assert_eq!(dst, "File: ");
    assert_eq!(engine.report_len(), report.chars().count());
}

#[test]
fn executable_version_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _events) = engine();
    let mut image = b"MZ".to_vec();
    image.resize(256, 0);
    image.extend_from_slice(&0xFEEF_04BDu32.to_le_bytes());
    image.extend_from_slice(&0x0001_0000u32.to_le_bytes());
    image.extend_from_slice(&((1u32 << 16) | 2).to_le_bytes());
    image.extend_from_slice(&((3u32 << 16) | 4).to_le_bytes());
    image.resize(image.len() + 64, 0);
    let path = write_bytes(dir.path(), "tool.exe", &image);

    let id = engine.add_file(&path, DigestSet::BOTH).expect("add");
    wait_idle(&engine);

    let task = engine.task(id).expect("task");
    assert_eq!(task.version.as_deref(), Some("1.2.3.4"));
    assert!(task.modified.is_some());
    assert!(engine.force_report().contains("Version: 1.2.3.4"));
}

#[test]
fn file_truncated_while_hashing_is_padded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _events) = slow_engine(Duration::from_millis(50));
    let path = write_file(dir.path(), "shrinking.bin", 8 * MIB as usize);
    let id = engine.add_file(&path, DigestSet::BOTH).expect("add");

    let deadline = Instant::now() + Duration::from_secs(10);
    while engine.task(id).expect("task").bytes_done == 0 {
        assert!(Instant::now() < deadline, "hashing never started");
        thread::sleep(Duration::from_millis(2));
    }
    OpenOptions::new()
        .write(true)
        .open(&path)
        .and_then(|file| file.set_len(2 * MIB))
        .expect("truncate");
    wait_idle(&engine);

    let task = engine.task(id).expect("task");
    assert_eq!(task.state(), TaskState::Done);
    assert_eq!(task.size, 8 * MIB);
    assert_eq!(task.bytes_done, task.size);
    let summary = engine.summary();
    assert_eq!(summary.total_bytes, 8 * MIB);
    assert_eq!(summary.done_bytes, summary.total_bytes);
}

#[test]
fn summary_and_tasks_serialize_to_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, _events) = engine();
    let path = write_bytes(dir.path(), "abc.txt", b"abc");
    let id = engine.add_file(&path, DigestSet::BOTH).expect("add");
    wait_idle(&engine);

    let summary = serde_json::to_value(engine.summary()).expect("summary json");
    for key in [
        "percent",
        "total_bytes",
        "done_bytes",
        "mbps",
        "running_count",
        "pool_threads",
        "elapsed",
    ] {
        assert!(summary.get(key).is_some(), "summary lacks {key}");
    }
    assert_eq!(summary["total_bytes"], 3);
    assert_eq!(summary["percent"], 100);

    let task = serde_json::to_value(engine.task(id).expect("task")).expect("task json");
    assert!(task["id"].is_u64());
    assert_eq!(task["md5"], ABC_MD5);
    assert_eq!(task["sha256"], ABC_SHA256);
    assert_eq!(task["digests"]["md5"], true);
    assert_eq!(task["finished"], true);
    assert_eq!(task["canceled"], false);
    assert_eq!(task["size"], 3);
}

#[test]
fn task_ids_survive_clear_without_aliasing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (engine, events) = engine();
    let old_path = write_bytes(dir.path(), "old.txt", b"abc");
    let old = engine.add_file(&old_path, DigestSet::BOTH).expect("add");
    wait_idle(&engine);
    engine.clear_all().expect("clear");

    let new_path = write_bytes(dir.path(), "new.txt", b"abcd");
    let new = engine.add_file(&new_path, DigestSet::BOTH).expect("add");
    wait_idle(&engine);

    assert_ne!(old, new);
    assert!(engine.task(old).is_none());
    assert_eq!(engine.task(new).expect("task").size, 4);
    let seen = drain(&events);
    assert!(seen.contains(&EngineEvent::TaskFinished(old)));
    assert!(seen.contains(&EngineEvent::TaskFinished(new)));
}
