//! Direct and load-balanced request/reply round trips.

use std::sync::Arc;
use std::time::Duration;

use silk::prelude::*;

fn endpoints() -> (String, String) {
    let router = format!("tcp://127.0.0.1:{}", portpicker::pick_unused_port().unwrap());
    let publish = format!("tcp://127.0.0.1:{}", portpicker::pick_unused_port().unwrap());
    (router, publish)
}

#[compio::test]
async fn direct_request_receives_the_handler_reply() {
    let (a_router, a_pub) = endpoints();
    let (a, _ae) = NodeHandle::new(NodeOptions::new(a_router.as_str(), a_pub.as_str()));
    a.start().await.unwrap();
    a.on(
        "check-temp",
        MessagePolicy::default(),
        Arc::new(|_env, ctx| ctx.reply(serde_json::json!({ "temp": 21.5 }))),
    )
    .await;

    let (b_router, b_pub) = endpoints();
    let (b, _be) = NodeHandle::new(NodeOptions::new(b_router.as_str(), b_pub.as_str()));
    b.start().await.unwrap();
    b.join(a_router.clone()).await.unwrap();
    compio::time::sleep(Duration::from_millis(150)).await;

    let replies = b.request_to(a.id(), "check-temp", None).await.unwrap();
    let outcome = replies.recv_async().await.unwrap();
    match outcome {
        ReplyOutcome::Reply(env) => assert_eq!(env.get("temp"), Some(&serde_json::json!(21.5))),
        ReplyOutcome::Error(_) => panic!("expected a reply, got an error outcome"),
    }
}

#[compio::test]
async fn send_to_unknown_peer_fails_without_touching_the_wire() {
    let (a_router, a_pub) = endpoints();
    let (a, _ae) = NodeHandle::new(NodeOptions::new(a_router.as_str(), a_pub.as_str()));
    a.start().await.unwrap();

    let err = a.send_to("nonexistent-node", "check-temp", None).await.unwrap_err();
    assert!(matches!(err, SilkError::UnknownPeer(_)));
}

#[compio::test]
async fn load_balanced_request_fails_fast_with_no_advertisers() {
    let (a_router, a_pub) = endpoints();
    let (a, _ae) = NodeHandle::new(NodeOptions::new(a_router.as_str(), a_pub.as_str()));
    a.start().await.unwrap();

    let err = a.request("check-temp", None).await.unwrap_err();
    assert!(matches!(err, SilkError::NoSubscribers(_)));
}

#[compio::test]
async fn load_balanced_send_distributes_across_advertising_peers() {
    let (c1_router, c1_pub) = endpoints();
    let (c1, _c1e) = NodeHandle::new(NodeOptions::new(c1_router.as_str(), c1_pub.as_str()));
    c1.start().await.unwrap();

    let (c2_router, c2_pub) = endpoints();
    let (c2, _c2e) = NodeHandle::new(NodeOptions::new(c2_router.as_str(), c2_pub.as_str()));
    c2.start().await.unwrap();

    let (c3_router, c3_pub) = endpoints();
    let (c3, _c3e) = NodeHandle::new(NodeOptions::new(c3_router.as_str(), c3_pub.as_str()));
    c3.start().await.unwrap();

    let counters: Vec<Arc<std::sync::atomic::AtomicU32>> =
        (0..3).map(|_| Arc::new(std::sync::atomic::AtomicU32::new(0))).collect();
    for (node, counter) in [&c1, &c2, &c3].into_iter().zip(counters.iter().cloned()) {
        node.on(
            "work",
            MessagePolicy::default(),
            Arc::new(move |_env, _ctx| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }),
        )
        .await;
    }

    c2.join(c1_router.clone()).await.unwrap();
    c3.join(c1_router.clone()).await.unwrap();
    compio::time::sleep(Duration::from_millis(200)).await;

    let (client_router, client_pub) = endpoints();
    let (client, _clie) = NodeHandle::new(NodeOptions::new(client_router.as_str(), client_pub.as_str()));
    client.start().await.unwrap();
    client.join(c1_router.clone()).await.unwrap();
    compio::time::sleep(Duration::from_millis(200)).await;

    for _ in 0..300 {
        client.send("work", None).await.unwrap();
    }
    compio::time::sleep(Duration::from_millis(500)).await;

    let counts: Vec<u32> = counters.iter().map(|c| c.load(std::sync::atomic::Ordering::SeqCst)).collect();
    let total: u32 = counts.iter().sum();
    assert_eq!(total, 300);
    for count in counts {
        assert!((75..=125).contains(&count), "expected a roughly even split, got {count}");
    }
}
