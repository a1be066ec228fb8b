#![forbid(unsafe_code)]

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};

use logview_core::{Direction, LogLevel, TailFrom};
use logview_fs::{FsError, FsLogBackend, ScanRequest, TailScan};

fn write_log(root: &Path, service: &str, name: &str, lines: &[String], age_secs: u64) {
    let dir = root.join(service);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let mut f = File::create(&path).unwrap();
    for l in lines {
        writeln!(f, "{}", l).unwrap();
    }
    f.set_modified(SystemTime::now() - Duration::from_secs(age_secs)).unwrap();
}

fn numbered(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("05-14 10:00:{:02}.000 [INFO] {} {}", i % 60, prefix, i)).collect()
}

fn messages(entries: &[logview_core::LogEntry]) -> Vec<String> {
    entries.iter().map(|e| e.message.clone()).collect()
}

#[test]
fn lists_services_sorted_with_labels() {
    let tmp = tempfile::tempdir().unwrap();
    write_log(tmp.path(), "node_daemon", "a.log", &numbered("x", 1), 0);
    write_log(tmp.path(), "cyfs-gateway", "a.log", &numbered("x", 1), 0);
    fs::write(tmp.path().join("stray.txt"), "not a service").unwrap();

    let backend = FsLogBackend::new(tmp.path());
    let services = backend.list_services().unwrap();
    let ids: Vec<_> = services.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["cyfs-gateway", "node_daemon"]);
    assert_eq!(services[1].label, "Node Daemon");
}

#[test]
fn backward_pages_walk_from_newest_to_oldest() {
    let tmp = tempfile::tempdir().unwrap();
    write_log(tmp.path(), "svc", "svc.log", &numbered("m", 5), 0);
    let backend = FsLogBackend::new(tmp.path());

    let mut req = ScanRequest { services: vec!["svc".into()], limit: Some(2), ..Default::default() };
    let first = backend.query(&req).unwrap();
    assert_eq!(messages(&first.entries), vec!["m 3", "m 4"]);
    assert!(first.has_more);

    req.cursor = first.next_cursor.clone();
    let second = backend.query(&req).unwrap();
    assert_eq!(messages(&second.entries), vec!["m 1", "m 2"]);

    req.cursor = second.next_cursor.clone();
    let third = backend.query(&req).unwrap();
    assert_eq!(messages(&third.entries), vec!["m 0"]);
    assert!(!third.has_more);
    assert!(third.next_cursor.is_none());
}

#[test]
fn backward_scan_crosses_into_older_files() {
    let tmp = tempfile::tempdir().unwrap();
    write_log(tmp.path(), "svc", "old.log", &numbered("old", 3), 600);
    write_log(tmp.path(), "svc", "new.log", &numbered("new", 2), 0);
    let backend = FsLogBackend::new(tmp.path());

    let req = ScanRequest { services: vec!["svc".into()], limit: Some(3), ..Default::default() };
    let page = backend.query(&req).unwrap();
    assert_eq!(messages(&page.entries), vec!["old 2", "new 0", "new 1"]);
    assert_eq!(page.entries[0].file, "old.log");
    assert_eq!(page.entries[2].line, Some(1));
}

#[test]
fn forward_pages_resume_after_cursor() {
    let tmp = tempfile::tempdir().unwrap();
    write_log(tmp.path(), "svc", "svc.log", &numbered("m", 5), 0);
    let backend = FsLogBackend::new(tmp.path());

    let mut req = ScanRequest {
        services: vec!["svc".into()],
        direction: Direction::Forward,
        limit: Some(3),
        ..Default::default()
    };
    let first = backend.query(&req).unwrap();
    assert_eq!(messages(&first.entries), vec!["m 0", "m 1", "m 2"]);
    req.cursor = first.next_cursor;
    let second = backend.query(&req).unwrap();
    assert_eq!(messages(&second.entries), vec!["m 3", "m 4"]);
    assert!(!second.has_more);
}

#[test]
fn filters_by_level_keyword_and_continuations() {
    let tmp = tempfile::tempdir().unwrap();
    let lines = vec![
        "05-14 10:00:00.000 [INFO] boot ok".to_string(),
        "05-14 10:00:01.000 [ERROR] Disk failure".to_string(),
        "    caused by: io timeout".to_string(),
        "05-14 10:00:02.000 [WARN] disk slow".to_string(),
    ];
    write_log(tmp.path(), "svc", "svc.log", &lines, 0);
    let backend = FsLogBackend::new(tmp.path());

    let errors = backend
        .query(&ScanRequest { services: vec!["svc".into()], level: Some(LogLevel::Error), ..Default::default() })
        .unwrap();
    assert_eq!(messages(&errors.entries), vec!["Disk failure", "caused by: io timeout"]);

    let disk = backend
        .query(&ScanRequest { services: vec!["svc".into()], keyword: Some("  DISK ".into()), ..Default::default() })
        .unwrap();
    assert_eq!(messages(&disk.entries), vec!["Disk failure", "disk slow"]);
}

#[test]
fn rejects_unknown_and_missing_services() {
    let tmp = tempfile::tempdir().unwrap();
    write_log(tmp.path(), "svc", "svc.log", &numbered("m", 1), 0);
    let backend = FsLogBackend::new(tmp.path());

    let err = backend.query(&ScanRequest::default()).unwrap_err();
    assert!(matches!(err, FsError::MissingService));
    let err = backend
        .query(&ScanRequest { services: vec!["svc".into(), "ghost".into()], ..Default::default() })
        .unwrap_err();
    assert!(matches!(err, FsError::UnknownService(s) if s == "ghost"));
    let err = backend.tail(&TailScan::default()).unwrap_err();
    assert!(matches!(err, FsError::TailNeedsOneService));
}

#[test]
fn tail_from_end_then_follows_appends() {
    let tmp = tempfile::tempdir().unwrap();
    write_log(tmp.path(), "svc", "svc.log", &numbered("m", 10), 0);
    let backend = FsLogBackend::new(tmp.path());

    let mut scan = TailScan { service: "svc".into(), limit: Some(3), from: TailFrom::End, ..Default::default() };
    let first = backend.tail(&scan).unwrap();
    assert_eq!(messages(&first.entries), vec!["m 7", "m 8", "m 9"]);
    assert!(first.entries.iter().all(|e| e.line.is_none()));

    scan.cursor = first.next_cursor.clone();
    scan.from = TailFrom::for_cursor(scan.cursor.as_ref());
    let idle = backend.tail(&scan).unwrap();
    assert!(idle.entries.is_empty());

    let mut f = OpenOptions::new().append(true).open(tmp.path().join("svc/svc.log")).unwrap();
    writeln!(f, "05-14 10:01:00.000 [ERROR] fresh").unwrap();
    drop(f);

    scan.cursor = idle.next_cursor;
    let next = backend.tail(&scan).unwrap();
    assert_eq!(messages(&next.entries), vec!["fresh"]);
    assert_eq!(next.entries[0].level, LogLevel::Error);
}

#[test]
fn tail_from_start_reads_whole_file() {
    let tmp = tempfile::tempdir().unwrap();
    write_log(tmp.path(), "svc", "svc.log", &numbered("m", 4), 0);
    let backend = FsLogBackend::new(tmp.path());
    let scan = TailScan { service: "svc".into(), from: TailFrom::Start, ..Default::default() };
    assert_eq!(backend.tail(&scan).unwrap().entries.len(), 4);
}
