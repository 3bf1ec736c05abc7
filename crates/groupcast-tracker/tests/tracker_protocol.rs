// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tracker protocol over real sockets.

use groupcast::{Member, Notification};
use groupcast_tracker::{TrackerConfig, TrackerServer, TrackerStats};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

struct Harness {
    addr: SocketAddr,
    shutdown: Arc<Notify>,
    handle: JoinHandle<TrackerStats>,
}

impl Harness {
    async fn start(evict_unreachable: bool) -> Self {
        let config = TrackerConfig {
            port: 0,
            notify_timeout_ms: 500,
            evict_unreachable,
            ..Default::default()
        };
        let mut server = TrackerServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let handle = tokio::spawn(async move {
            server.run().await.unwrap();
            server.stats()
        });
        Self {
            addr,
            shutdown,
            handle,
        }
    }

    async fn request(&self, raw: &str) -> String {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut reply = String::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut reply))
            .await
            .unwrap()
            .unwrap();
        reply
    }

    /// Same exchange, without shutting down the write half first.
    async fn request_open(&self, raw: &str) -> String {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut reply = String::new();
        tokio::time::timeout(Duration::from_secs(3), stream.read_to_string(&mut reply))
            .await
            .unwrap()
            .unwrap();
        reply
    }

    async fn stop(self) -> TrackerStats {
        self.shutdown.notify_one();
        self.handle.await.unwrap()
    }
}

/// A member's control listener.
struct Listener {
    inner: TcpListener,
    port: u16,
}

impl Listener {
    async fn bind() -> Self {
        let inner = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = inner.local_addr().unwrap().port();
        Self { inner, port }
    }

    async fn next(&self) -> Notification {
        let (mut stream, _) = tokio::time::timeout(Duration::from_secs(5), self.inner.accept())
            .await
            .unwrap()
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        Notification::decode(&raw).unwrap()
    }
}

async fn register(h: &Harness, username: &str, listener: &Listener) -> String {
    h.request(&format!(
        "register\t127.0.0.1\t4000\t{}\t{}",
        listener.port, username
    ))
    .await
}

#[tokio::test]
async fn test_register_and_duplicate_username() {
    let h = Harness::start(true).await;
    let l = Listener::bind().await;

    let id = register(&h, "alice", &l).await;
    assert!(id.parse::<u64>().is_ok());
    assert_eq!(register(&h, "alice", &l).await, "username taken");

    let stats = h.stop().await;
    assert_eq!(stats.requests_served, 2);
}

#[tokio::test]
async fn test_reply_without_half_close() {
    let h = Harness::start(true).await;
    let l = Listener::bind().await;

    let id = h
        .request_open(&format!("register\t127.0.0.1\t4000\t{}\talice", l.port))
        .await;
    assert!(id.parse::<u64>().is_ok());
    assert_eq!(h.request_open(&format!("{}\t!lg", id)).await, "");

    let stats = h.stop().await;
    assert_eq!(stats.requests_served, 2);
}

#[tokio::test]
async fn test_group_name_with_separators_is_invalid() {
    let h = Harness::start(true).await;
    let l = Listener::bind().await;
    let a = register(&h, "alice", &l).await;

    assert_eq!(
        h.request(&format!("{}\t!j\tmy group", a)).await,
        "invalid request"
    );
    assert_eq!(h.request(&format!("{}\t!lg", a)).await, "");

    let stats = h.stop().await;
    assert_eq!(stats.requests_rejected, 1);
}

#[tokio::test]
async fn test_invalid_and_unknown_member() {
    let h = Harness::start(true).await;
    assert_eq!(h.request("hello").await, "invalid request");
    assert_eq!(h.request("42\t!lg").await, "unknown member");

    let stats = h.stop().await;
    assert_eq!(stats.requests_rejected, 1);
}

#[tokio::test]
async fn test_join_notifies_and_lists() {
    let h = Harness::start(true).await;
    let la = Listener::bind().await;
    let lb = Listener::bind().await;

    let a = register(&h, "alice", &la).await;
    let b = register(&h, "bob", &lb).await;

    let reply = h.request(&format!("{}\t!j\tlobby", a)).await;
    assert_eq!(reply, format!("{},alice,127.0.0.1,4000,{}", a, la.port));

    let reply = h.request(&format!("{}\t!j\tlobby", b)).await;
    let members: Vec<Member> = groupcast::control::decode_member_list(&reply).unwrap();
    assert_eq!(members.len(), 2);

    match la.next().await {
        Notification::Add { group, member } => {
            assert_eq!(group, "lobby");
            assert_eq!(member.username, "bob");
            assert_eq!(member.id.to_string(), b);
        }
        other => panic!("unexpected notification: {:?}", other),
    }

    assert_eq!(h.request(&format!("{}\t!lg", a)).await, "[lobby]");
    assert_eq!(
        h.request(&format!("{}\t!lm\tlobby", a)).await,
        "(alice), (bob)"
    );
    assert_eq!(
        h.request(&format!("{}\t!lm\tnowhere", a)).await,
        "unknown group"
    );

    h.stop().await;
}

#[tokio::test]
async fn test_quit_notifies_every_group() {
    let h = Harness::start(true).await;
    let la = Listener::bind().await;
    let lb = Listener::bind().await;

    let a = register(&h, "alice", &la).await;
    let b = register(&h, "bob", &lb).await;
    for group in ["dev", "lobby"] {
        h.request(&format!("{}\t!j\t{}", a, group)).await;
        h.request(&format!("{}\t!j\t{}", b, group)).await;
        la.next().await;
    }

    assert_eq!(h.request(&format!("{}\t!q", b)).await, "QUIT OK");
    let mut groups = Vec::new();
    for _ in 0..2 {
        match la.next().await {
            Notification::Remove { group, username } => {
                assert_eq!(username, "bob");
                groups.push(group);
            }
            other => panic!("unexpected notification: {:?}", other),
        }
    }
    assert_eq!(groups, vec!["dev", "lobby"]);

    // The username is free again after quit.
    assert!(register(&h, "bob", &lb).await.parse::<u64>().is_ok());
    h.stop().await;
}

#[tokio::test]
async fn test_unreachable_member_is_evicted() {
    let h = Harness::start(true).await;
    let la = Listener::bind().await;
    let lb = Listener::bind().await;

    let a = register(&h, "alice", &la).await;
    let b = register(&h, "bob", &lb).await;
    h.request(&format!("{}\t!j\tlobby", a)).await;
    drop(la);

    // Alice's listener is gone, so bob's join evicts her.
    h.request(&format!("{}\t!j\tlobby", b)).await;
    assert_eq!(h.request(&format!("{}\t!lm\tlobby", b)).await, "(bob)");
    assert_eq!(h.request(&format!("{}\t!lg", a)).await, "unknown member");

    let stats = h.stop().await;
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.notifications_failed, 1);
}
