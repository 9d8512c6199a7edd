use std::{fmt, io, pin::Pin};

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Child,
    sync::watch,
};

pub type ProducerOutput = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for ProducerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProducerState::NotStarted => "not started",
            ProducerState::Running => "running",
            ProducerState::Stopping => "stopping",
            ProducerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// A freshly launched producer: its byte stream and, for real processes, the child.
pub struct Spawned {
    pub child: Option<Child>,
    pub output: ProducerOutput,
}

impl Spawned {
    pub fn process(child: Child, output: impl AsyncRead + Send + 'static) -> Self {
        Self {
            child: Some(child),
            output: Box::pin(output),
        }
    }

    /// An in-process byte source with no child to reap.
    pub fn reader(output: impl AsyncRead + Send + 'static) -> Self {
        Self {
            child: None,
            output: Box::pin(output),
        }
    }
}

/// Chooses and starts whatever produces the raw stream.
pub trait Launcher: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn launch(&self) -> anyhow::Result<Spawned>;
}

/// Owned handle on the upstream producer.
///
/// `NotStarted -> Running -> Stopping -> Stopped`, and `Stopped -> Running` again on
/// restart. A restart is only possible once `stop` has reaped the previous instance.
pub struct Producer {
    launcher: Box<dyn Launcher>,
    child: Option<Child>,
    output: Option<ProducerOutput>,
    state: watch::Sender<ProducerState>,
}

impl Producer {
    pub fn new(launcher: impl Launcher) -> Self {
        let (state, _) = watch::channel(ProducerState::NotStarted);
        Self {
            launcher: Box::new(launcher),
            child: None,
            output: None,
            state,
        }
    }

    pub fn name(&self) -> &str {
        self.launcher.name()
    }

    pub fn state(&self) -> ProducerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ProducerState> {
        self.state.subscribe()
    }

    pub fn start(&mut self) -> anyhow::Result<()> {
        match self.state() {
            ProducerState::NotStarted | ProducerState::Stopped => {}
            state => anyhow::bail!("producer {} is {}", self.name(), state),
        }

        let spawned = self.launcher.launch()?;
        self.child = spawned.child;
        self.output = Some(spawned.output);
        self.state.send_replace(ProducerState::Running);
        Ok(())
    }

    /// Reads the next chunk of producer output. `Ok(0)` is end of stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.output.as_mut() {
            Some(output) => output.read(buf).await,
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "producer is not running",
            )),
        }
    }

    /// Releases the output handle, then kills and reaps the child.
    pub async fn stop(&mut self) {
        if self.state() != ProducerState::Running {
            return;
        }
        self.state.send_replace(ProducerState::Stopping);

        drop(self.output.take());
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                log::debug!("{}: kill: {}", self.name(), e);
            }
            match child.wait().await {
                Ok(status) => log::info!("{} exited: {}", self.name(), status),
                Err(e) => log::warn!("{}: wait failed: {}", self.name(), e),
            }
        }

        self.state.send_replace(ProducerState::Stopped);
    }
}

#[cfg(test)]
#[path = "producer_test.rs"]
mod producer_test;
