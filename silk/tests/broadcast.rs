//! Broadcast sends: every peer receives each one, and a streaming request
//! collects a reply from each responder.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use silk::prelude::*;

fn endpoints() -> (String, String) {
    let router = format!("tcp://127.0.0.1:{}", portpicker::pick_unused_port().unwrap());
    let publish = format!("tcp://127.0.0.1:{}", portpicker::pick_unused_port().unwrap());
    (router, publish)
}

#[compio::test]
async fn every_peer_receives_each_broadcast() {
    let (c1_router, c1_pub) = endpoints();
    let (c1, _c1e) = NodeHandle::new(NodeOptions::new(c1_router.as_str(), c1_pub.as_str()));
    c1.start().await.unwrap();

    let (c2_router, c2_pub) = endpoints();
    let (c2, _c2e) = NodeHandle::new(NodeOptions::new(c2_router.as_str(), c2_pub.as_str()));
    c2.start().await.unwrap();
    c2.join(c1_router.clone()).await.unwrap();

    let (c3_router, c3_pub) = endpoints();
    let (c3, _c3e) = NodeHandle::new(NodeOptions::new(c3_router.as_str(), c3_pub.as_str()));
    c3.start().await.unwrap();
    c3.join(c1_router.clone()).await.unwrap();
    compio::time::sleep(Duration::from_millis(200)).await;

    let counters: Vec<Arc<AtomicU32>> = (0..3).map(|_| Arc::new(AtomicU32::new(0))).collect();
    for (node, counter) in [&c1, &c2, &c3].into_iter().zip(counters.iter().cloned()) {
        node.on("ping", MessagePolicy::default(), Arc::new(move |_env, _ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .await;
    }

    let (client_router, client_pub) = endpoints();
    let (client, _clie) = NodeHandle::new(NodeOptions::new(client_router.as_str(), client_pub.as_str()));
    client.start().await.unwrap();
    client.join(c1_router.clone()).await.unwrap();
    compio::time::sleep(Duration::from_millis(200)).await;

    client.send_all("ping", None).await.unwrap();
    compio::time::sleep(Duration::from_millis(100)).await;
    client.send_all("ping", None).await.unwrap();
    compio::time::sleep(Duration::from_millis(200)).await;

    for counter in &counters {
        assert!(counter.load(Ordering::SeqCst) >= 2, "expected at least two deliveries");
    }
}

#[compio::test]
async fn broadcast_request_streams_a_reply_from_every_responder() {
    let (c1_router, c1_pub) = endpoints();
    let (c1, _c1e) = NodeHandle::new(NodeOptions::new(c1_router.as_str(), c1_pub.as_str()));
    c1.start().await.unwrap();

    let (c2_router, c2_pub) = endpoints();
    let (c2, _c2e) = NodeHandle::new(NodeOptions::new(c2_router.as_str(), c2_pub.as_str()));
    c2.start().await.unwrap();
    c2.join(c1_router.clone()).await.unwrap();

    let (c3_router, c3_pub) = endpoints();
    let (c3, _c3e) = NodeHandle::new(NodeOptions::new(c3_router.as_str(), c3_pub.as_str()));
    c3.start().await.unwrap();
    c3.join(c1_router.clone()).await.unwrap();
    compio::time::sleep(Duration::from_millis(200)).await;

    for node in [&c1, &c2, &c3] {
        let responder = node.id().to_string();
        node.on(
            "census",
            MessagePolicy::default(),
            Arc::new(move |_env, ctx| ctx.reply(serde_json::json!({ "from": responder.clone() }))),
        )
        .await;
    }

    let (client_router, client_pub) = endpoints();
    let (client, _clie) = NodeHandle::new(NodeOptions::new(client_router.as_str(), client_pub.as_str()));
    client.start().await.unwrap();
    client.join(c1_router.clone()).await.unwrap();
    compio::time::sleep(Duration::from_millis(200)).await;

    let replies = client.request_all("census", None, Duration::from_millis(300)).await.unwrap();
    compio::time::sleep(Duration::from_millis(350)).await;

    let mut responders = HashSet::new();
    while let Ok(outcome) = replies.try_recv() {
        if let ReplyOutcome::Reply(env) = outcome {
            responders.insert(env.src);
        }
    }
    assert_eq!(responders.len(), 3);
}
