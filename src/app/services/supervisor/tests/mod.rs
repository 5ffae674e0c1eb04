//! Tests for source pipelines and their supervision

use std::sync::Arc;
use std::time::Duration;

use crate::app::models::OutboundMessage;
use crate::app::services::metrics::SiteMetrics;
use crate::app::services::publisher::{PublishOptions, Publisher, Transport};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;


/// Metrics registry plus a publisher delivering into a channel
pub fn channel_sinks() -> (
    Arc<SiteMetrics>,
    Arc<Publisher>,
    mpsc::UnboundedReceiver<OutboundMessage>,
) {
    let (transport, receiver) = Transport::channel();
    let metrics = Arc::new(SiteMetrics::new());
    let publisher = Publisher::spawn(transport, PublishOptions::default(), metrics.clone());
    (metrics, Arc::new(publisher), receiver)
}

/// Close the publisher, then collect every message it delivered
pub async fn drain(
    publisher: &Publisher,
    receiver: &mut mpsc::UnboundedReceiver<OutboundMessage>,
) -> Vec<OutboundMessage> {
    publisher.close().await;
    let mut messages = Vec::new();
    while let Ok(message) = receiver.try_recv() {
        messages.push(message);
    }
    messages
}

/// TCP endpoint that accepts one connection and never reads from it
pub async fn silent_peer() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let peer = tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
    });
    (addr, peer)
}
