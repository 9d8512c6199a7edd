use std::{fmt, process::Stdio, str::FromStr};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::producer::{Launcher, Spawned};

/// Which camera tool produces the stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFamily {
    /// Legacy MMAL stack
    #[default]
    Raspivid,
    Libcamera,
    /// libcamera apps under their Bookworm name
    Rpicam,
}

impl CameraFamily {
    pub fn program(&self) -> &'static str {
        match self {
            CameraFamily::Raspivid => "raspivid",
            CameraFamily::Libcamera => "libcamera-vid",
            CameraFamily::Rpicam => "rpicam-vid",
        }
    }
}

impl fmt::Display for CameraFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

impl FromStr for CameraFamily {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raspivid" | "legacy" => Ok(CameraFamily::Raspivid),
            "libcamera" | "libcamera-vid" => Ok(CameraFamily::Libcamera),
            "rpicam" | "rpicam-vid" => Ok(CameraFamily::Rpicam),
            other => Err(anyhow::anyhow!("unknown camera family: {}", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraOptions {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub horizontal_flip: bool,
    pub vertical_flip: bool,
    // degrees; 0 leaves the flag off
    pub rotation: u32,
    pub family: CameraFamily,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            width: 960,
            height: 540,
            fps: 30,
            horizontal_flip: true,
            vertical_flip: true,
            rotation: 0,
            family: CameraFamily::default(),
        }
    }
}

impl CameraOptions {
    /// Continuous baseline H.264 with SPS/PPS repeated before every I frame, written
    /// to stdout with no preview window.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--inline".into(),
            "-t".into(),
            "0".into(),
            "-o".into(),
            "-".into(),
            "--width".into(),
            self.width.to_string(),
            "--height".into(),
            self.height.to_string(),
            "--framerate".into(),
            self.fps.to_string(),
            "-n".into(),
            "--profile".into(),
            "baseline".into(),
        ];

        if self.horizontal_flip {
            args.push("--hflip".into());
        }
        if self.vertical_flip {
            args.push("--vflip".into());
        }
        if self.rotation != 0 {
            args.push("--rotation".into());
            args.push(self.rotation.to_string());
        }
        args
    }
}

/// Launches the camera tool selected by [`CameraOptions::family`].
pub struct CameraLauncher {
    options: CameraOptions,
}

impl CameraLauncher {
    pub fn new(options: CameraOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CameraOptions {
        &self.options
    }
}

impl Launcher for CameraLauncher {
    fn name(&self) -> &str {
        self.options.family.program()
    }

    fn launch(&self) -> anyhow::Result<Spawned> {
        let program = self.options.family.program();
        let args = self.options.args();

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}, is it installed?", program))?;

        let stdout = child
            .stdout
            .take()
            .with_context(|| format!("failed to capture stdout from {}", program))?;

        log::info!("started {} {:?}", program, args);
        Ok(Spawned::process(child, stdout))
    }
}

#[cfg(test)]
#[path = "camera_test.rs"]
mod camera_test;
