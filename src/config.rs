use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    str::FromStr,
    sync::LazyLock,
};

use stream_bus::{
    CameraFamily, CameraOptions, ReframeConfig, reframe::DEFAULT_MAX_FRAME_SIZE,
    streamer::READ_CHUNK_SIZE,
};

pub struct RelayConfig {
    listen: SocketAddr,
    stream_path: String,
    static_dir: PathBuf,
    camera: CameraOptions,
    keep_start_codes: bool,
    max_frame_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            stream_path: "/stream".to_string(),
            static_dir: PathBuf::from("static"),
            camera: CameraOptions::default(),
            keep_start_codes: false,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` knows. Bad values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let camera = CameraOptions {
            width: parse_or(&lookup, "RELAY_WIDTH", defaults.camera.width),
            height: parse_or(&lookup, "RELAY_HEIGHT", defaults.camera.height),
            fps: parse_or(&lookup, "RELAY_FPS", defaults.camera.fps),
            horizontal_flip: flag_or(&lookup, "RELAY_HFLIP", defaults.camera.horizontal_flip),
            vertical_flip: flag_or(&lookup, "RELAY_VFLIP", defaults.camera.vertical_flip),
            rotation: parse_or(&lookup, "RELAY_ROTATION", defaults.camera.rotation),
            family: parse_or::<CameraFamily>(&lookup, "RELAY_CAMERA", defaults.camera.family),
        };

        let mut stream_path = lookup("RELAY_STREAM_PATH").unwrap_or(defaults.stream_path);
        if !stream_path.starts_with('/') {
            stream_path.insert(0, '/');
        }

        let mut max_frame_size = parse_or(&lookup, "RELAY_MAX_FRAME_SIZE", defaults.max_frame_size);
        if max_frame_size < READ_CHUNK_SIZE {
            log::warn!(
                "config: ignoring RELAY_MAX_FRAME_SIZE={}: must be at least {}",
                max_frame_size,
                READ_CHUNK_SIZE
            );
            max_frame_size = defaults.max_frame_size;
        }

        Self {
            listen: parse_or(&lookup, "RELAY_LISTEN", defaults.listen),
            stream_path,
            static_dir: lookup("RELAY_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            camera,
            keep_start_codes: flag_or(&lookup, "RELAY_KEEP_START_CODES", defaults.keep_start_codes),
            max_frame_size,
        }
    }

    pub fn listen(&self) -> SocketAddr {
        self.listen
    }

    pub fn stream_path(&self) -> &str {
        &self.stream_path
    }

    pub fn static_dir(&self) -> &Path {
        &self.static_dir
    }

    pub fn camera(&self) -> &CameraOptions {
        &self.camera
    }

    pub fn reframe(&self) -> ReframeConfig {
        ReframeConfig {
            max_frame_size: self.max_frame_size,
            strip_separator: !self.keep_start_codes,
            ..Default::default()
        }
    }
}

pub fn config() -> &'static RelayConfig {
    static CONFIG: LazyLock<RelayConfig> = LazyLock::new(RelayConfig::from_env);
    &CONFIG
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            log::warn!("config: ignoring {}={:?}: {}", key, raw, e);
            default
        }),
        None => default,
    }
}

fn flag_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            log::warn!("config: ignoring {}={:?}: expected a boolean", key, raw);
            default
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
