mod common;

use std::time::Duration;

use common::{authenticator, context_in, data_rows, reading, signed_bytes};
use greenhouse_ingest::server::IngestServer;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;

async fn wait_for_rows(dir: &tempfile::TempDir, expected: usize) -> Vec<String> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let rows = data_rows(dir);
        if rows.len() >= expected || tokio::time::Instant::now() >= deadline {
            return rows;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn loopback_clients_are_ingested_and_shutdown_is_clean() {
    let dir = tempfile::tempdir().unwrap();
    let server = IngestServer::bind("127.0.0.1:0", context_in(&dir, Duration::from_secs(5)))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let ctx = server.context();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));

    // First client: two frames, the second split across writes.
    let mut a = TcpStream::connect(addr).await.unwrap();
    a.write_all(&signed_bytes(&reading(1))).await.unwrap();
    let second = signed_bytes(&reading(2));
    a.write_all(&second[..17]).await.unwrap();
    a.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    a.write_all(&second[17..]).await.unwrap();

    // Second client: a forged frame followed by a good one.
    let mut b = TcpStream::connect(addr).await.unwrap();
    let mut forged = authenticator().seal(&reading(10)).to_bytes();
    forged[40] ^= 0x01;
    b.write_all(&forged).await.unwrap();
    b.write_all(&signed_bytes(&reading(11))).await.unwrap();

    let rows = wait_for_rows(&dir, 3).await;
    assert_eq!(rows.len(), 3);

    // A client that stays connected must not hold up shutdown.
    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("server stopped in time")
        .unwrap()
        .unwrap();

    let snap = ctx.metrics().snapshot();
    assert_eq!(snap.connections_opened, 2);
    assert_eq!(snap.connections_closed, 2);
    assert_eq!(snap.frames_accepted, 3);
    assert_eq!(snap.auth_failures, 1);
    assert_eq!(ctx.tracked_clients(), 1);
    assert_eq!(ctx.reading_log().record_count().unwrap(), 3);
}

#[tokio::test]
async fn bind_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let first = IngestServer::bind("127.0.0.1:0", context_in(&dir, Duration::from_secs(1)))
        .await
        .unwrap();
    let taken = first.local_addr().unwrap().to_string();

    let other = tempfile::tempdir().unwrap();
    let second = IngestServer::bind(&taken, context_in(&other, Duration::from_secs(1))).await;
    assert!(second.is_err());
}
