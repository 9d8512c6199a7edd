use axum::{Json, extract::State};
use serde::Serialize;
use stream_bus::{CameraOptions, HubState, ProducerState};

use crate::handler::RelayState;

#[derive(Serialize)]
pub(crate) struct StatusResponse {
    subscribers: usize,
    state: HubState,
    producer: ProducerState,
    camera: CameraOptions,
}

pub(crate) async fn status(State(state): State<RelayState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        subscribers: state.hub.subscriber_count(),
        state: state.hub.state(),
        producer: *state.producer.borrow(),
        camera: state.camera.clone(),
    })
}
