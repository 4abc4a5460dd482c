mod common;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use common::context_in;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_frames_from_one_client_share_one_entry() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Arc::new(context_in(&dir, Duration::from_secs(5)));
    let client = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));

    let tasks = 8u32;
    let per_task = 200u32;
    let mut handles = Vec::new();
    for t in 0..tasks {
        let ctx = Arc::clone(&ctx);
        handles.push(tokio::spawn(async move {
            let mut gaps = 0u32;
            for i in 0..per_task {
                if ctx.observe_sequence(client, t * per_task + i).is_some() {
                    gaps += 1;
                }
                tokio::task::yield_now().await;
            }
            gaps
        }));
    }
    let mut gaps = 0u32;
    for h in handles {
        gaps += h.await.unwrap();
    }

    assert_eq!(ctx.tracked_clients(), 1);
    let last = ctx.last_sequence(&client).expect("client tracked");
    assert!(last < tasks * per_task, "last sequence {last} was never submitted");
    // The first observation establishes the entry without a gap check.
    assert!(gaps < tasks * per_task);
}
