//! Camera stream relay core.
//!
//! ```text
//!  camera process ──stdout──► StreamReframer ──Frame──► Hub ──► Mailbox (per viewer)
//!        ▲                         ▲                     │
//!        └──── start / stop ───────┴──── subscriber count ┘
//! ```
//!
//! The reframer cuts the raw H.264 byte stream on Annex B start codes; the hub fans
//! every frame out to the registered viewers and reports how many there are, which
//! is what decides whether the camera runs at all.

pub mod camera;
pub mod frame;
pub mod hub;
pub mod producer;
pub mod reframe;
pub mod scanner;
pub mod streamer;

pub use camera::{CameraFamily, CameraLauncher, CameraOptions};
pub use frame::{Frame, FrameSink};
pub use hub::{BroadcastReport, Hub, HubState, MAILBOX_CAPACITY, Mailbox, Subscriber, SubscriberId};
pub use producer::{Launcher, Producer, ProducerState, Spawned};
pub use reframe::{ReframeConfig, Reframer};
pub use streamer::StreamReframer;
