//! Demultiplexing of the engine's log stream.
//!
//! Containers without a TTY get their stdout/stderr multiplexed into
//! one stream of frames: an 8-byte header (stream type, three zero
//! bytes, big-endian payload length) followed by the payload. TTY
//! containers stream raw bytes with no framing.

/// Header length of one multiplexed frame.
const FRAME_HEADER_LEN: usize = 8;

/// Decode a log stream into text, stdout and stderr interleaved in
/// arrival order.
///
/// Frame detection is structural: a valid header has a stream type of
/// 0, 1 or 2 followed by three zero bytes. Anything else is treated as
/// an unframed TTY stream and returned as-is. A truncated trailing
/// frame contributes whatever payload bytes actually arrived.
pub fn demux_log_stream(raw: &[u8]) -> String {
    if raw.is_empty() {
        return String::new();
    }
    if !looks_multiplexed(raw) {
        return String::from_utf8_lossy(raw).into_owned();
    }

    let mut out = String::with_capacity(raw.len());
    let mut offset = 0;
    while offset + FRAME_HEADER_LEN <= raw.len() {
        let header = &raw[offset..offset + FRAME_HEADER_LEN];
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let start = offset + FRAME_HEADER_LEN;
        let end = (start + len).min(raw.len());
        out.push_str(&String::from_utf8_lossy(&raw[start..end]));
        offset = start + len;
    }
    out
}

fn looks_multiplexed(raw: &[u8]) -> bool {
    raw.len() >= FRAME_HEADER_LEN
        && matches!(raw[0], 0 | 1 | 2)
        && raw[1] == 0
        && raw[2] == 0
        && raw[3] == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(stream: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![stream, 0, 0, 0];
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn test_demux_single_frame() {
        let raw = frame(1, b"hello from stdout\n");
        assert_eq!(demux_log_stream(&raw), "hello from stdout\n");
    }

    #[test]
    fn test_demux_interleaves_streams_in_order() {
        let mut raw = frame(1, b"out-1\n");
        raw.extend(frame(2, b"err-1\n"));
        raw.extend(frame(1, b"out-2\n"));
        assert_eq!(demux_log_stream(&raw), "out-1\nerr-1\nout-2\n");
    }

    #[test]
    fn test_demux_truncated_trailing_frame() {
        let mut raw = frame(1, b"complete\n");
        // Second frame claims 100 bytes, only 4 arrive.
        raw.extend([2, 0, 0, 0]);
        raw.extend(100u32.to_be_bytes());
        raw.extend(b"part");
        assert_eq!(demux_log_stream(&raw), "complete\npart");
    }

    #[test]
    fn test_tty_stream_passes_through() {
        let raw = b"plain tty output, no framing\n";
        assert_eq!(demux_log_stream(raw), "plain tty output, no framing\n");
    }

    #[test]
    fn test_empty_stream() {
        assert_eq!(demux_log_stream(&[]), "");
    }

    #[test]
    fn test_zero_length_frames_do_not_loop() {
        let mut raw = frame(1, b"");
        raw.extend(frame(1, b"tail"));
        assert_eq!(demux_log_stream(&raw), "tail");
    }
}
