use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::frame::{Frame, FrameSink};

/// How long a broadcast waits on one full mailbox before dropping the frame for it.
pub const SEND_TIMEOUT: Duration = Duration::from_millis(100);

/// Frames a viewer may have outstanding before broadcasts start waiting on it.
pub const MAILBOX_CAPACITY: usize = 10;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type Mailbox = mpsc::Receiver<Frame>;

/// The hub's half of a viewer connection. Dropping it closes the viewer's mailbox.
pub struct Subscriber {
    id: SubscriberId,
    mailbox: mpsc::Sender<Frame>,
}

impl Subscriber {
    pub fn new(capacity: usize) -> (Self, Mailbox) {
        let id = SubscriberId(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed));
        let (mailbox, rx) = mpsc::channel(capacity);
        (Self { id, mailbox }, rx)
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HubState {
    Idle,
    Active,
}

impl HubState {
    fn of(members: usize) -> Self {
        if members == 0 {
            HubState::Idle
        } else {
            HubState::Active
        }
    }
}

/// Fan-out point between the camera session and the connected viewers.
///
/// Membership lives inside a single event loop task; every handle talks to it
/// through a command channel, so register, unregister and broadcast are totally
/// ordered. After each membership change the new size is published on the
/// optional count channel.
#[derive(Clone)]
pub struct Hub {
    cancel: CancellationToken,
    tx: mpsc::Sender<HubCommand>,
    members: Arc<AtomicUsize>,
}

impl Hub {
    pub fn new(counts: Option<mpsc::UnboundedSender<usize>>) -> Self {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(1024);
        let members = Arc::new(AtomicUsize::new(0));

        let state = HubMembers {
            subscribers: HashMap::new(),
            members: members.clone(),
            counts,
        };
        let cancel_clone = cancel.clone();
        tokio::spawn(async move { Self::inner_loop(cancel_clone, rx, state).await });
        Self {
            cancel,
            tx,
            members,
        }
    }

    async fn inner_loop(
        cancel: CancellationToken,
        mut rx: mpsc::Receiver<HubCommand>,
        mut state: HubMembers,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break;
                },
                cmd = rx.recv() => match cmd {
                    Some(cmd) => Self::inner_command_handler(&mut state, cmd).await,
                    None => break,
                },
            }
        }
        log::debug!("hub: event loop finished with {} subscribers", state.subscribers.len());
        state.members.store(0, Ordering::Release);
        // every mailbox closes with the member set
        state.subscribers.clear();
    }

    async fn inner_command_handler(state: &mut HubMembers, cmd: HubCommand) {
        match cmd {
            HubCommand::Register { subscriber, result } => {
                let id = subscriber.id;
                state.subscribers.insert(id, subscriber);
                log::info!("hub: registered {}, {} connected", id, state.subscribers.len());
                state.publish();
                let _ = result.send(state.subscribers.len());
            }
            HubCommand::Unregister { id, result } => {
                // dropping the sender closes the mailbox
                if state.subscribers.remove(&id).is_some() {
                    log::info!("hub: unregistered {}, {} connected", id, state.subscribers.len());
                    state.publish();
                }
                let _ = result.send(state.subscribers.len());
            }
            HubCommand::Broadcast { frame, result } => {
                let report = state.fan_out(&frame).await;
                let _ = result.send(report);
            }
        }
    }

    pub async fn register(&self, subscriber: Subscriber) -> anyhow::Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(HubCommand::Register {
                subscriber,
                result: tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("hub is stopped"))?;
        Ok(rx.await?)
    }

    /// Removes `id` if it is a member. Unknown ids are ignored.
    pub async fn unregister(&self, id: SubscriberId) -> anyhow::Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(HubCommand::Unregister { id, result: tx })
            .await
            .map_err(|_| anyhow::anyhow!("hub is stopped"))?;
        Ok(rx.await?)
    }

    /// Offers `frame` to every member. Returns once every mailbox has taken the frame
    /// or timed out, so at most `SEND_TIMEOUT` per blocked member.
    pub async fn broadcast(&self, frame: Frame) -> BroadcastReport {
        if self.subscriber_count() == 0 {
            return BroadcastReport::default();
        }

        let (tx, rx) = oneshot::channel();
        if self
            .tx
            .send(HubCommand::Broadcast { frame, result: tx })
            .await
            .is_err()
        {
            return BroadcastReport::default();
        }
        rx.await.unwrap_or_default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.members.load(Ordering::Acquire)
    }

    pub fn state(&self) -> HubState {
        HubState::of(self.subscriber_count())
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl FrameSink for Hub {
    async fn write(&self, frame: Frame) {
        self.broadcast(frame).await;
    }
}

struct HubMembers {
    subscribers: HashMap<SubscriberId, Subscriber>,
    members: Arc<AtomicUsize>,
    counts: Option<mpsc::UnboundedSender<usize>>,
}

impl HubMembers {
    fn publish(&mut self) {
        let len = self.subscribers.len();
        let previous = self.members.swap(len, Ordering::AcqRel);
        if HubState::of(previous) != HubState::of(len) {
            log::info!("hub: {:?} -> {:?}", HubState::of(previous), HubState::of(len));
        }

        if let Some(counts) = &self.counts {
            if counts.send(len).is_err() {
                log::debug!("hub: subscriber count receiver dropped");
                self.counts = None;
            }
        }
    }

    async fn fan_out(&self, frame: &Frame) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for (id, subscriber) in &self.subscribers {
            match tokio::time::timeout(SEND_TIMEOUT, subscriber.mailbox.send(frame.clone())).await
            {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(_)) => {
                    log::debug!("hub: mailbox of {} is closed", id);
                    report.dropped += 1;
                }
                Err(_) => {
                    log::warn!("hub: skipping frame for slow subscriber {}", id);
                    report.dropped += 1;
                }
            }
        }
        report
    }
}

enum HubCommand {
    Register {
        subscriber: Subscriber,
        result: oneshot::Sender<usize>,
    },
    Unregister {
        id: SubscriberId,
        result: oneshot::Sender<usize>,
    },
    Broadcast {
        frame: Frame,
        result: oneshot::Sender<BroadcastReport>,
    },
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod hub_test;
