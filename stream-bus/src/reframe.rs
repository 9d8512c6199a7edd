use anyhow::bail;
use bytes::BytesMut;

use crate::{
    frame::Frame,
    scanner::{NAL_SEPARATOR, find_separator, resume_offset},
};

/// Upper bound on bytes held between two start codes.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 256 * 1024;

#[derive(Clone, Debug)]
pub struct ReframeConfig {
    pub separator: Vec<u8>,
    pub max_frame_size: usize,
    /// Drop the start code from emitted frames. When false every frame after the
    /// first begins with the start code that opened it.
    pub strip_separator: bool,
}

impl Default for ReframeConfig {
    fn default() -> Self {
        Self {
            separator: NAL_SEPARATOR.to_vec(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            strip_separator: true,
        }
    }
}

/// Carves an unstructured byte stream into separator-aligned frames.
///
/// `buf.len()` is the write end; `search_from` is where the next scan starts. Once a
/// scan fails, `search_from` is moved to `separator.len() - 1` bytes before the write
/// end so a separator split across two pushes is still found.
///
/// Between pushes at most `max(max_frame_size, separator.len() - 1)` bytes are pending,
/// and no emitted frame is longer than `max_frame_size`. A unit that outgrows the
/// bound inside a single push is dropped whole.
pub struct Reframer {
    config: ReframeConfig,
    buf: BytesMut,
    search_from: usize,
    resync: bool,
    overflows: u64,
}

impl Reframer {
    pub fn new(config: ReframeConfig) -> anyhow::Result<Self> {
        if config.separator.is_empty() {
            bail!("separator must not be empty");
        }
        Ok(Self::with_config(config))
    }

    fn with_config(config: ReframeConfig) -> Self {
        let capacity = config.max_frame_size.min(64 * 1024);
        Self {
            config,
            buf: BytesMut::with_capacity(capacity),
            search_from: 0,
            resync: false,
            overflows: 0,
        }
    }

    /// Appends `data` and returns every frame completed by it, in stream order.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(data);

        let sep_len = self.config.separator.len();
        let mut frames = Vec::new();
        while let Some(found) = find_separator(&self.buf[self.search_from..], &self.config.separator)
        {
            let index = self.search_from + found;
            if index == 0 {
                // no empty frames: skip past the separator already at the front
                if self.config.strip_separator {
                    let _ = self.buf.split_to(sep_len);
                    self.search_from = 0;
                } else {
                    self.search_from = 1;
                }
                self.resync = false;
                continue;
            }

            let frame = self.buf.split_to(index).freeze();
            if self.config.strip_separator {
                let _ = self.buf.split_to(sep_len);
                self.search_from = 0;
            } else {
                self.search_from = 1;
            }

            if self.resync {
                log::debug!("reframe: discarded {} bytes while resynchronizing", frame.len());
                self.resync = false;
                continue;
            }
            if frame.len() > self.config.max_frame_size {
                self.overflows += 1;
                log::warn!(
                    "reframe: dropped a {} byte unit, larger than {} bytes",
                    frame.len(),
                    self.config.max_frame_size
                );
                continue;
            }
            frames.push(Frame::new(frame));
        }

        self.search_from = self.search_from.max(resume_offset(self.buf.len(), sep_len));
        if self.buf.len() > self.config.max_frame_size {
            self.overflow();
        }
        frames
    }

    fn overflow(&mut self) {
        let keep = self.config.separator.len() - 1;
        let dropped = self.buf.len().saturating_sub(keep);
        if dropped == 0 {
            // only a possible split separator is pending, nothing was lost
            return;
        }
        let _ = self.buf.split_to(dropped);
        self.search_from = 0;
        self.resync = true;
        self.overflows += 1;
        log::warn!(
            "reframe: no separator within {} bytes, dropped {} bytes and waiting for the next one",
            self.config.max_frame_size,
            dropped
        );
    }

    /// Bytes received since the last separator, not yet emitted.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub fn is_resyncing(&self) -> bool {
        self.resync
    }

    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.search_from = 0;
        self.resync = false;
    }
}

impl Default for Reframer {
    fn default() -> Self {
        Self::with_config(ReframeConfig::default())
    }
}

#[cfg(test)]
#[path = "reframe_test.rs"]
mod reframe_test;
