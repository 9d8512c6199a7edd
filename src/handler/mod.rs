use stream_bus::{CameraOptions, Hub, ProducerState};
use tokio::sync::watch;

pub mod stream;
pub mod system;

/// Shared by every route.
#[derive(Clone)]
pub struct RelayState {
    pub hub: Hub,
    pub camera: CameraOptions,
    pub producer: watch::Receiver<ProducerState>,
}
