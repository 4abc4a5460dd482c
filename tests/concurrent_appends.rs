mod common;

use std::sync::Arc;

use common::TEST_TIMESTAMP;
use greenhouse_ingest::protocol::SensorPacket;
use greenhouse_ingest::storage::{ReadingLog, TimestampZone, CSV_HEADER};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_never_interleave() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data_log.csv");
    let log = Arc::new(ReadingLog::open(&path, TimestampZone::Utc).unwrap());

    let writers = 8;
    let per_writer = 50;
    let mut handles = Vec::new();
    for w in 0..writers {
        let log = Arc::clone(&log);
        handles.push(tokio::spawn(async move {
            for i in 0..per_writer {
                // Temperature tags the writer, humidity tags the row.
                let packet = SensorPacket::new(i, w, i as i32, 1.25, 400.5, TEST_TIMESTAMP);
                log.append(&packet).unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let content = std::fs::read_to_string(&path).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some(CSV_HEADER));

    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), (writers as usize) * (per_writer as usize));
    for row in &rows {
        let fields: Vec<&str> = row.split(',').collect();
        assert_eq!(fields.len(), 5, "mangled row: {row}");
        assert_eq!(fields[0], "2024-01-01 12:00:00");
        assert_eq!(fields[3], "1.25");
        assert_eq!(fields[4], "400.50");
    }
    assert_eq!(log.appended(), rows.len() as u64);
    assert!(content.ends_with('\n'));
}

#[test]
fn two_handles_on_one_file_share_the_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.csv");
    let a = ReadingLog::open(&path, TimestampZone::Utc).unwrap();
    let b = ReadingLog::open(&path, TimestampZone::Utc).unwrap();

    a.append(&SensorPacket::new(1, 20, 40, 1.0, 400.0, TEST_TIMESTAMP)).unwrap();
    b.append(&SensorPacket::new(2, 21, 41, 1.0, 400.0, TEST_TIMESTAMP)).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.matches(CSV_HEADER).count(), 1);
    assert_eq!(a.record_count().unwrap(), 2);
}
