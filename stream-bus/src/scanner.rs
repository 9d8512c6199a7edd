/// Annex B start code. Every NAL unit in the camera's byte stream is preceded by it.
pub const NAL_SEPARATOR: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Returns the lowest index at which `separator` starts inside `window`.
///
/// Callers scanning a growing buffer should pass a window that begins
/// `separator.len() - 1` bytes before the newly written region, otherwise a
/// separator split across two reads is missed.
pub fn find_separator(window: &[u8], separator: &[u8]) -> Option<usize> {
    if separator.is_empty() || window.len() < separator.len() {
        return None;
    }
    window.windows(separator.len()).position(|w| w == separator)
}

/// Start of the window to rescan once `written` bytes are held and nothing matched.
pub fn resume_offset(written: usize, separator_len: usize) -> usize {
    written.saturating_sub(separator_len.saturating_sub(1))
}

#[cfg(test)]
#[path = "scanner_test.rs"]
mod scanner_test;
