//! Two coordinators replicating through loopback modules.

use concordia_coordinator::Coordinator;
use concordia_core::Digest;
use concordia_testkit::prelude::*;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn peers_converge_on_the_same_digest() {
    let dir_a = TestDataDir::new();
    let dir_b = TestDataDir::new();

    let (loop_a, to_a) = LoopbackStrategy::new("loopback-a");
    let (loop_b, to_b) = LoopbackStrategy::new("loopback-b");
    let loop_a = loop_a.deliver_to(to_b.clone());
    let loop_b = loop_b.deliver_to(to_a.clone());

    let peer_a = Coordinator::builder(dir_a.config(), RecordingPolicy::deduplicating())
        .strategy(loop_a)
        .build()
        .start()
        .await
        .unwrap();
    let peer_b = Coordinator::builder(dir_b.config(), RecordingPolicy::deduplicating())
        .strategy(loop_b)
        .build()
        .start()
        .await
        .unwrap();

    for msg in messages([1, 2, 3]) {
        peer_a.handle_new_message(msg).unwrap();
    }
    for msg in messages([4, 5]) {
        peer_b.handle_new_message(msg).unwrap();
    }

    let (a, b) = (peer_a.handle(), peer_b.handle());
    let converged = wait_until(TIMEOUT, || {
        a.digest().ok() == Some(Digest(15)) && b.digest().ok() == Some(Digest(15))
    })
    .await;
    assert!(converged, "a={:?} b={:?}", a.digest(), b.digest());

    let settled = wait_until(TIMEOUT, || {
        a.pending_len() == 0 && b.pending_len() == 0 && a.history_len() == 5 && b.history_len() == 5
    })
    .await;
    assert!(settled);

    peer_a.stop().await;
    peer_b.stop().await;
}
