#![forbid(unsafe_code)]

use std::fs;
use std::time::Duration;

use logview_api::{InProcSource, LogSource, MockSource, PageRequest, PageResponse, SourceError, TailRequest};
use logview_core::{Cursor, LogLevel, QueryModel, TailFrom};
use logview_fs::FsLogBackend;
use serde_json::json;

#[test]
fn wire_page_normalizes_entries() {
    let page = PageResponse::from_wire(&json!({
        "entries": [
            {"timestamp": "05-14 10:00:00.000", "level": "WARN", "message": "hot", "service": "svc", "file": "a.log", "line": 3, "extra": true},
            {"message": "bare"},
            "not an entry"
        ],
        "nextCursor": "abc"
    }))
    .unwrap();
    assert_eq!(page.entries.len(), 2);
    assert_eq!(page.entries[0].level, LogLevel::Warning);
    assert_eq!(page.entries[0].line, Some(3));
    assert_eq!(page.entries[1].level, LogLevel::Unknown);
    assert_eq!(page.next_cursor, Some(Cursor::new("abc")));
    assert!(page.has_more);
}

#[test]
fn wire_page_rejects_non_object() {
    let err = PageResponse::from_wire(&json!([1, 2])).unwrap_err();
    assert!(matches!(err, SourceError::Validation(_)));
}

#[test]
fn tail_request_needs_single_service() {
    let two = QueryModel::for_services(["a", "b"]);
    assert!(TailRequest::for_query(&two, None, 100).is_none());
    let one = QueryModel::for_services(["a"]).with_level(Some(LogLevel::Error));
    let first = TailRequest::for_query(&one, None, 100).unwrap();
    assert_eq!(first.from, TailFrom::End);
    assert_eq!(first.level, Some(LogLevel::Error));
    let next = TailRequest::for_query(&one, Some(Cursor::new("c")), 100).unwrap();
    assert_eq!(next.from, TailFrom::Start);
}

#[tokio::test]
async fn mock_replays_script_and_records_calls() {
    let mock = MockSource::with_services(["svc"]);
    mock.push_page(Err(SourceError::Internal("boom".into())));
    let q = QueryModel::for_services(["svc"]);

    let err = mock.query_page(PageRequest::initial(&q, 100)).await.unwrap_err();
    assert_eq!(err, SourceError::Internal("boom".into()));
    let dry = mock.query_page(PageRequest::older(&q, Cursor::new("x"), 100)).await.unwrap();
    assert!(dry.entries.is_empty() && !dry.has_more);

    let calls = mock.page_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].cursor, Some(Cursor::new("x")));

    let tail = mock.query_tail(TailRequest::for_query(&q, Some(Cursor::new("t")), 10).unwrap()).await.unwrap();
    assert_eq!(tail.next_cursor, Some(Cursor::new("t")));
}

#[tokio::test(start_paused = true)]
async fn mock_delay_lets_later_call_finish_first() {
    let mock = MockSource::new();
    mock.push_page_after(Duration::from_millis(200), Ok(PageResponse::new(Vec::new(), Some(Cursor::new("slow")))));
    mock.push_page(Ok(PageResponse::new(Vec::new(), Some(Cursor::new("fast")))));
    let q = QueryModel::for_services(["svc"]);

    let (m1, m2) = (mock.clone(), mock.clone());
    let (q1, q2) = (q.clone(), q.clone());
    let slow = tokio::spawn(async move { m1.query_page(PageRequest::initial(&q1, 1)).await });
    tokio::task::yield_now().await;
    let fast = tokio::spawn(async move { m2.query_page(PageRequest::initial(&q2, 1)).await });

    let fast = fast.await.unwrap().unwrap();
    assert_eq!(fast.next_cursor, Some(Cursor::new("fast")));
    assert!(!slow.is_finished());
    assert_eq!(slow.await.unwrap().unwrap().next_cursor, Some(Cursor::new("slow")));
}

#[tokio::test]
async fn inproc_reads_files_and_maps_errors() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("node_daemon")).unwrap();
    fs::write(
        tmp.path().join("node_daemon/daemon.log"),
        "05-14 10:00:00.000 [INFO] one\n05-14 10:00:01.000 [ERROR] two\n",
    )
    .unwrap();
    let source = InProcSource::new(FsLogBackend::new(tmp.path()));

    let services = source.services().await.unwrap();
    assert_eq!(services[0].label, "Node Daemon");

    let q = QueryModel::for_services(["node_daemon"]);
    let page = source.query_page(PageRequest::initial(&q, 100)).await.unwrap();
    assert_eq!(page.entries.len(), 2);
    assert!(!page.has_more);

    let tail = source.query_tail(TailRequest::for_query(&q, None, 1).unwrap()).await.unwrap();
    assert_eq!(tail.entries.len(), 1);
    assert_eq!(tail.entries[0].message, "two");
    assert!(tail.next_cursor.is_some());

    let ghost = QueryModel::for_services(["ghost"]);
    let err = source.query_page(PageRequest::initial(&ghost, 10)).await.unwrap_err();
    assert!(matches!(err, SourceError::NotFound(_)));
}
