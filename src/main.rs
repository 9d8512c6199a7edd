use stream_bus::{CameraLauncher, Hub, Producer, StreamReframer};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod api;
mod config;
mod handler;

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() -> ! {
    init_logging();
    let config = config::config();
    let cancel = CancellationToken::new();

    let (counts_tx, counts_rx) = mpsc::unbounded_channel();
    let hub = Hub::new(Some(counts_tx));
    let launcher = CameraLauncher::new(config.camera().clone());
    let camera = launcher.options().clone();
    let producer = Producer::new(launcher);
    let reframer =
        StreamReframer::new(producer, hub.clone()).with_reframe_config(config.reframe());

    let state = handler::RelayState {
        hub: hub.clone(),
        camera,
        producer: reframer.producer_state(),
    };
    let reframer_task = tokio::spawn(reframer.run(counts_rx, cancel.clone()));

    if let Err(e) = api::start_api_server(config, state, cancel.clone()).await {
        log::error!("{:#}", e);
        std::process::exit(1);
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            },
        }
    }

    if let Err(e) = reframer_task.await {
        log::error!("stream reframer task failed: {}", e);
    }
    hub.stop();
    std::process::exit(0);
}
