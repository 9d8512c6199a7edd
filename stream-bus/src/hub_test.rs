use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, error::TryRecvError};

use super::{BroadcastReport, Hub, HubState, MAILBOX_CAPACITY, SEND_TIMEOUT, Subscriber};
use crate::frame::{Frame, FrameSink};

fn frame(data: &'static [u8]) -> Frame {
    Frame::from(data)
}

#[tokio::test]
async fn test_subscriber_count_edges() -> anyhow::Result<()> {
    let (counts_tx, mut counts) = mpsc::unbounded_channel();
    let hub = Hub::new(Some(counts_tx));
    assert_eq!(hub.state(), HubState::Idle);

    let (a, _mailbox_a) = Subscriber::new(MAILBOX_CAPACITY);
    let (b, _mailbox_b) = Subscriber::new(MAILBOX_CAPACITY);
    let (a_id, b_id) = (a.id(), b.id());

    assert_eq!(hub.register(a).await?, 1);
    assert_eq!(counts.recv().await, Some(1));
    assert_eq!(hub.state(), HubState::Active);

    assert_eq!(hub.register(b).await?, 2);
    assert_eq!(counts.recv().await, Some(2));

    assert_eq!(hub.unregister(a_id).await?, 1);
    assert_eq!(counts.recv().await, Some(1));

    assert_eq!(hub.unregister(b_id).await?, 0);
    assert_eq!(counts.recv().await, Some(0));
    assert_eq!(hub.state(), HubState::Idle);

    assert_eq!(counts.try_recv(), Err(TryRecvError::Empty));
    hub.stop();
    Ok(())
}

#[tokio::test]
async fn test_unregister_unknown_is_noop() -> anyhow::Result<()> {
    let (counts_tx, mut counts) = mpsc::unbounded_channel();
    let hub = Hub::new(Some(counts_tx));

    let (never_registered, _mailbox) = Subscriber::new(1);
    assert_eq!(hub.unregister(never_registered.id()).await?, 0);
    assert_eq!(counts.try_recv(), Err(TryRecvError::Empty));

    let (a, _mailbox_a) = Subscriber::new(1);
    let a_id = a.id();
    hub.register(a).await?;
    assert_eq!(counts.recv().await, Some(1));

    hub.unregister(a_id).await?;
    hub.unregister(a_id).await?;
    assert_eq!(counts.recv().await, Some(0));
    assert_eq!(counts.try_recv(), Err(TryRecvError::Empty));
    Ok(())
}

#[tokio::test]
async fn test_unregister_closes_mailbox() -> anyhow::Result<()> {
    let hub = Hub::new(None);
    let (a, mut mailbox) = Subscriber::new(MAILBOX_CAPACITY);
    let a_id = a.id();
    hub.register(a).await?;

    let report = hub.broadcast(frame(b"nal")).await;
    assert_eq!(report.delivered, 1);

    hub.unregister(a_id).await?;
    // queued frames are still drained, then the mailbox reports closed
    assert_eq!(mailbox.recv().await, Some(frame(b"nal")));
    assert_eq!(mailbox.recv().await, None);
    Ok(())
}

#[tokio::test]
async fn test_broadcast_to_empty_hub_is_noop() {
    let (counts_tx, mut counts) = mpsc::unbounded_channel();
    let hub = Hub::new(Some(counts_tx));

    let started = Instant::now();
    let report = hub.broadcast(frame(b"nobody")).await;
    assert_eq!(report, BroadcastReport::default());
    assert!(started.elapsed() < SEND_TIMEOUT);
    assert_eq!(counts.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn test_broadcast_preserves_order() -> anyhow::Result<()> {
    let hub = Hub::new(None);
    let (a, mut mailbox) = Subscriber::new(MAILBOX_CAPACITY);
    hub.register(a).await?;

    for data in [&b"1"[..], b"2", b"3"] {
        hub.write(frame(data)).await;
    }
    assert_eq!(mailbox.recv().await, Some(frame(b"1")));
    assert_eq!(mailbox.recv().await, Some(frame(b"2")));
    assert_eq!(mailbox.recv().await, Some(frame(b"3")));
    Ok(())
}

#[tokio::test]
async fn test_slow_subscriber_does_not_block_others() -> anyhow::Result<()> {
    let hub = Hub::new(None);

    // a one-slot mailbox that nobody drains
    let (slow, _slow_mailbox) = Subscriber::new(1);
    let (fast, mut fast_mailbox) = Subscriber::new(MAILBOX_CAPACITY);
    hub.register(slow).await?;
    hub.register(fast).await?;

    let first = hub.broadcast(frame(b"first")).await;
    assert_eq!(first, BroadcastReport { delivered: 2, dropped: 0 });
    assert_eq!(fast_mailbox.recv().await, Some(frame(b"first")));

    let started = Instant::now();
    let second = hub.broadcast(frame(b"second")).await;
    let elapsed = started.elapsed();

    assert_eq!(second, BroadcastReport { delivered: 1, dropped: 1 });
    assert_eq!(fast_mailbox.recv().await, Some(frame(b"second")));
    assert!(elapsed >= SEND_TIMEOUT, "returned after {:?}", elapsed);
    assert!(elapsed < SEND_TIMEOUT * 5, "returned after {:?}", elapsed);
    Ok(())
}

#[tokio::test]
async fn test_wait_is_bounded_per_blocked_subscriber() -> anyhow::Result<()> {
    let hub = Hub::new(None);

    let mut idle_mailboxes = Vec::new();
    for _ in 0..3 {
        let (slow, mailbox) = Subscriber::new(1);
        idle_mailboxes.push(mailbox);
        hub.register(slow).await?;
    }
    hub.broadcast(frame(b"fill")).await;

    let started = Instant::now();
    let report = hub.broadcast(frame(b"dropped")).await;
    let elapsed = started.elapsed();

    assert_eq!(report, BroadcastReport { delivered: 0, dropped: 3 });
    assert!(elapsed >= SEND_TIMEOUT * 3, "returned after {:?}", elapsed);
    assert!(elapsed < SEND_TIMEOUT * 3 + Duration::from_millis(400));
    Ok(())
}

#[tokio::test]
async fn test_closed_mailbox_is_dropped_not_waited_on() -> anyhow::Result<()> {
    let hub = Hub::new(None);
    let (gone, mailbox) = Subscriber::new(MAILBOX_CAPACITY);
    hub.register(gone).await?;
    drop(mailbox);

    let started = Instant::now();
    let report = hub.broadcast(frame(b"x")).await;
    assert_eq!(report, BroadcastReport { delivered: 0, dropped: 1 });
    assert!(started.elapsed() < SEND_TIMEOUT);
    Ok(())
}

#[tokio::test]
async fn test_stopped_hub_rejects_commands() -> anyhow::Result<()> {
    let hub = Hub::new(None);
    let (a, _mailbox) = Subscriber::new(1);
    hub.register(a).await?;

    hub.stop();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (b, _mailbox_b) = Subscriber::new(1);
    assert!(hub.register(b).await.is_err());
    assert_eq!(hub.broadcast(frame(b"late")).await, BroadcastReport::default());
    Ok(())
}

#[tokio::test]
async fn test_stop_resets_membership() -> anyhow::Result<()> {
    let hub = Hub::new(None);
    let (a, mut mailbox) = Subscriber::new(MAILBOX_CAPACITY);
    hub.register(a).await?;
    assert_eq!(hub.state(), HubState::Active);

    hub.stop();
    assert_eq!(tokio::time::timeout(Duration::from_secs(1), mailbox.recv()).await?, None);
    assert_eq!(hub.subscriber_count(), 0);
    assert_eq!(hub.state(), HubState::Idle);
    Ok(())
}
