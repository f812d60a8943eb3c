//! Two-node join handshake: the joiner learns the seed, and the seed
//! learns the joiner back, with no third party involved.

use std::time::Duration;

use silk::prelude::*;

fn endpoints() -> (String, String) {
    let router = format!("tcp://127.0.0.1:{}", portpicker::pick_unused_port().unwrap());
    let publish = format!("tcp://127.0.0.1:{}", portpicker::pick_unused_port().unwrap());
    (router, publish)
}

#[compio::test]
async fn join_populates_both_sides_of_the_cluster_view() {
    let (a_router, a_pub) = endpoints();
    let (a, _a_events) = NodeHandle::new(NodeOptions::new(a_router.as_str(), a_pub.as_str()));
    a.start().await.unwrap();

    let (b_router, b_pub) = endpoints();
    let (b, _b_events) = NodeHandle::new(NodeOptions::new(b_router.as_str(), b_pub.as_str()));
    b.start().await.unwrap();

    b.join(a_router.clone()).await.unwrap();
    compio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(b.state(), NodeState::Joined);

    let b_view = b.cluster_view().await;
    assert_eq!(b_view.len(), 1);
    assert_eq!(b_view[0].id, a.id());

    let a_view = a.cluster_view().await;
    assert_eq!(a_view.len(), 1);
    assert_eq!(a_view[0].id, b.id());
}

#[compio::test]
async fn third_node_discovers_existing_member_through_the_seed() {
    let (a_router, a_pub) = endpoints();
    let (a, _ae) = NodeHandle::new(NodeOptions::new(a_router.as_str(), a_pub.as_str()));
    a.start().await.unwrap();

    let (b_router, b_pub) = endpoints();
    let (b, _be) = NodeHandle::new(NodeOptions::new(b_router.as_str(), b_pub.as_str()));
    b.start().await.unwrap();
    b.join(a_router.clone()).await.unwrap();
    compio::time::sleep(Duration::from_millis(100)).await;

    let (c_router, c_pub) = endpoints();
    let (c, _ce) = NodeHandle::new(NodeOptions::new(c_router.as_str(), c_pub.as_str()));
    c.start().await.unwrap();
    c.join(a_router.clone()).await.unwrap();
    compio::time::sleep(Duration::from_millis(150)).await;

    let mut c_peers: Vec<String> = c.cluster_view().await.into_iter().map(|d| d.id).collect();
    c_peers.sort();
    let mut expected = vec![a.id().to_string(), b.id().to_string()];
    expected.sort();
    assert_eq!(c_peers, expected);

    let mut a_peers: Vec<String> = a.cluster_view().await.into_iter().map(|d| d.id).collect();
    a_peers.sort();
    let mut expected_a = vec![b.id().to_string(), c.id().to_string()];
    expected_a.sort();
    assert_eq!(a_peers, expected_a);
}
