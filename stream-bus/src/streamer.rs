use std::sync::Arc;

use tokio::{
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    frame::FrameSink,
    producer::{Producer, ProducerState},
    reframe::{ReframeConfig, Reframer},
};

/// Bytes requested from the producer per read.
pub const READ_CHUNK_SIZE: usize = 4096;

/// Consecutive failed reads after which a session gives up on its producer.
pub const MAX_CONSECUTIVE_READ_ERRORS: u32 = 16;

/// Drives the producer from subscriber-count signals and pushes its output,
/// carved into frames, into a sink.
///
/// The producer sits behind a mutex that a session holds from launch until the
/// process has been reaped, so two sessions can never overlap.
pub struct StreamReframer<S> {
    producer: Arc<Mutex<Producer>>,
    state: watch::Receiver<ProducerState>,
    sink: Arc<S>,
    reframe: ReframeConfig,
}

impl<S: FrameSink> StreamReframer<S> {
    pub fn new(producer: Producer, sink: S) -> Self {
        let state = producer.subscribe_state();
        Self {
            producer: Arc::new(Mutex::new(producer)),
            state,
            sink: Arc::new(sink),
            reframe: ReframeConfig::default(),
        }
    }

    pub fn with_reframe_config(mut self, reframe: ReframeConfig) -> Self {
        self.reframe = reframe;
        self
    }

    pub fn producer_state(&self) -> watch::Receiver<ProducerState> {
        self.state.clone()
    }

    /// Runs until `counts` closes or `cancel` fires.
    ///
    /// Only two values matter: the first nonzero count after zero starts a session,
    /// and zero stops it. A stop waits for the session to finish tearing down before
    /// the next signal is looked at.
    pub async fn run(self, mut counts: mpsc::UnboundedReceiver<usize>, cancel: CancellationToken) {
        let mut session: Option<Session> = None;
        let mut streaming = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break;
                },
                count = counts.recv() => match count {
                    Some(0) => {
                        streaming = false;
                        if let Some(session) = session.take() {
                            log::info!("no subscribers left, stopping the producer");
                            session.stop().await;
                        }
                    }
                    Some(n) if !streaming => {
                        streaming = true;
                        log::info!("{} subscriber(s), starting the producer", n);
                        session = Some(self.spawn_session(&cancel));
                    }
                    Some(n) => {
                        log::debug!("{} subscriber(s)", n);
                    }
                    None => break,
                },
            }
        }

        if let Some(session) = session.take() {
            session.stop().await;
        }
        log::info!("stream reframer finished");
    }

    fn spawn_session(&self, cancel: &CancellationToken) -> Session {
        let cancel = cancel.child_token();
        let handle = tokio::spawn(read_session(
            self.producer.clone(),
            self.sink.clone(),
            self.reframe.clone(),
            cancel.clone(),
        ));
        Session { cancel, handle }
    }
}

struct Session {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Session {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            log::error!("producer session task failed: {}", e);
        }
    }
}

async fn read_session<S: FrameSink>(
    producer: Arc<Mutex<Producer>>,
    sink: Arc<S>,
    reframe: ReframeConfig,
    cancel: CancellationToken,
) {
    let mut producer = producer.lock_owned().await;
    if cancel.is_cancelled() {
        return;
    }

    let name = producer.name().to_string();
    let mut reframer = match Reframer::new(reframe) {
        Ok(reframer) => reframer,
        Err(e) => {
            log::error!("not starting {}: {:#}", name, e);
            return;
        }
    };
    if let Err(e) = producer.start() {
        log::error!("failed to start {}: {:#}", name, e);
        return;
    }

    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    let mut read_errors = 0u32;
    let mut frames = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("[{}] stop requested", name);
                break;
            },
            read = producer.read(&mut chunk) => match read {
                Ok(0) => {
                    log::info!("[{}] EOF", name);
                    break;
                }
                Ok(n) => {
                    read_errors = 0;
                    for frame in reframer.push(&chunk[..n]) {
                        sink.write(frame).await;
                        frames += 1;
                    }
                }
                Err(e) => {
                    read_errors += 1;
                    log::warn!("[{}] read error: {}", name, e);
                    if read_errors >= MAX_CONSECUTIVE_READ_ERRORS {
                        log::error!("[{}] {} reads failed in a row, giving up", name, read_errors);
                        break;
                    }
                }
            },
        }
    }

    producer.stop().await;
    log::info!(
        "stopped {} after {} frames ({} bytes left unframed)",
        name,
        frames,
        reframer.pending().len()
    );
}

#[cfg(test)]
#[path = "streamer_test.rs"]
mod streamer_test;
