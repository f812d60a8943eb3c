//! Peer departure: a graceful `_leave` removes a peer immediately, and a
//! peer that stops sending keepalives is pruned once its deadline elapses.

use std::time::Duration;

use silk::prelude::*;

fn endpoints() -> (String, String) {
    let router = format!("tcp://127.0.0.1:{}", portpicker::pick_unused_port().unwrap());
    let publish = format!("tcp://127.0.0.1:{}", portpicker::pick_unused_port().unwrap());
    (router, publish)
}

#[compio::test]
async fn graceful_stop_removes_the_peer_immediately() {
    let (a_router, a_pub) = endpoints();
    let (a, _ae) = NodeHandle::new(NodeOptions::new(a_router.as_str(), a_pub.as_str()));
    a.start().await.unwrap();

    let (b_router, b_pub) = endpoints();
    let (b, _be) = NodeHandle::new(NodeOptions::new(b_router.as_str(), b_pub.as_str()));
    b.start().await.unwrap();
    b.join(a_router.clone()).await.unwrap();
    compio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(a.cluster_view().await.len(), 1);

    b.stop().await;
    compio::time::sleep(Duration::from_millis(150)).await;

    assert!(a.cluster_view().await.is_empty());
}

#[compio::test]
async fn silent_peer_is_pruned_after_its_keepalive_deadline() {
    let keepalive = KeepaliveOptions::default()
        .with_period(Duration::from_millis(50))
        .with_missed_periods(2)
        .with_prune_interval(Duration::from_millis(20));

    let (a_router, a_pub) = endpoints();
    let (a, _ae) = NodeHandle::new(NodeOptions::new(a_router.as_str(), a_pub.as_str()).with_keepalive(keepalive));
    a.start().await.unwrap();

    let (b_router, b_pub) = endpoints();
    let (b, b_events) = NodeHandle::new(NodeOptions::new(b_router.as_str(), b_pub.as_str()).with_keepalive(keepalive));
    b.start().await.unwrap();
    let b_id = b.id().to_string();
    b.join(a_router.clone()).await.unwrap();
    compio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(a.cluster_view().await.len(), 1);

    // Drop the handle (and its event receiver) without calling `stop`, so
    // no `_leave` is ever published — the only signal `a` gets is the
    // absence of further `_ka` broadcasts.
    drop(b);
    drop(b_events);
    compio::time::sleep(Duration::from_millis(400)).await;

    assert!(a.cluster_view().await.is_empty());
    let err = a.send_to(b_id.as_str(), "check-temp", None).await.unwrap_err();
    assert!(matches!(err, SilkError::UnknownPeer(_)));
}
