use std::{
    fmt::{Display, Formatter},
    future::Future,
};

use bytes::Bytes;

/// One delimited unit of the camera stream.
///
/// Cloning only bumps the reference count of the underlying buffer, so the hub can
/// hand the same frame to every subscriber without copying it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    pub fn new(data: Bytes) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl From<Bytes> for Frame {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl From<&'static [u8]> for Frame {
    fn from(data: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(data))
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "Frame {{ data: {} }}", self.data.len())
    }
}

/// Destination of the frames carved out of a producer session.
pub trait FrameSink: Send + Sync + 'static {
    fn write(&self, frame: Frame) -> impl Future<Output = ()> + Send;
}

impl<T: FrameSink> FrameSink for std::sync::Arc<T> {
    fn write(&self, frame: Frame) -> impl Future<Output = ()> + Send {
        (**self).write(frame)
    }
}

/// Forwards frames into an mpsc channel; useful for tapping a session without a hub.
impl FrameSink for tokio::sync::mpsc::Sender<Frame> {
    async fn write(&self, frame: Frame) {
        if self.send(frame).await.is_err() {
            log::debug!("frame receiver dropped");
        }
    }
}
