use crate::broadcast::DebugStreamBroadcaster;
use crate::process::Pid;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_stream::StreamExt;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Which standard stream of a child a reader is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "STDOUT",
            OutputStream::Stderr => "STDERR",
        }
    }
}

/// Longest line handed out in one piece; longer runs are split at this size
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Newline-delimited decoder that never rejects a line for bad UTF-8.
///
/// Compatibility-layer output regularly contains bytes in legacy code pages;
/// those are replaced rather than ending the capture. Lines longer than the
/// maximum length are emitted in chunks of that length.
#[derive(Debug, Clone, Copy)]
pub struct LossyLineCodec {
    max_length: usize,
}

impl LossyLineCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for LossyLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LossyLineCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // A newline right after max_length bytes still ends a full-length line
        let window = src.len().min(self.max_length.saturating_add(1));
        if let Some(newline) = src[..window].iter().position(|byte| *byte == b'\n') {
            let line = src.split_to(newline + 1);
            return Ok(Some(decode_line(&line[..newline])));
        }

        if src.len() > self.max_length {
            let chunk = src.split_to(self.max_length);
            return Ok(Some(decode_line(&chunk)));
        }

        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split();
        Ok(Some(decode_line(&rest)))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Read `io` line by line until EOF, an I/O error, or cancellation.
///
/// Every line is echoed at debug level under the `compat_proc::output`
/// target and then handed to the broadcaster. Errors end the reader quietly.
/// On cancellation the stream moves to a detached task that discards the
/// rest of the output, so the writing process keeps an open pipe.
pub async fn pump_lines<R>(
    io: R,
    stream: OutputStream,
    pid: Pid,
    broadcaster: Arc<DebugStreamBroadcaster>,
    token: CancellationToken,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut frames = FramedRead::with_capacity(io, LossyLineCodec::new(), 1024);

    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => {
                debug!(pid, stream = stream.as_str(), "Output reader cancelled, discarding further output");
                tokio::spawn(discard_output(frames.into_inner(), stream, pid));
                break;
            }
            frame = frames.next() => frame,
        };

        match frame {
            Some(Ok(line)) => {
                debug!(target: "compat_proc::output", pid, stream = stream.as_str(), "{line}");
                broadcaster.broadcast_line(&line);
            }
            Some(Err(e)) => {
                debug!(pid, stream = stream.as_str(), "Error on output reader: {e}");
                break;
            }
            None => break,
        }
    }
}

async fn discard_output<R>(mut io: R, stream: OutputStream, pid: Pid)
where
    R: AsyncRead + Unpin,
{
    match tokio::io::copy(&mut io, &mut tokio::io::sink()).await {
        Ok(bytes) => debug!(pid, stream = stream.as_str(), "Discarded {bytes} bytes of output"),
        Err(e) => debug!(pid, stream = stream.as_str(), "Error while discarding output: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ListenerHandle;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    fn decode_all(input: &[u8]) -> Vec<String> {
        decode_all_with(LossyLineCodec::new(), input)
    }

    fn decode_all_with(mut codec: LossyLineCodec, input: &[u8]) -> Vec<String> {
        let mut buffer = BytesMut::from(input);
        let mut lines = Vec::new();
        while let Some(line) = codec.decode_eof(&mut buffer).unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_decode_lines() {
        assert_eq!(decode_all(b"one\ntwo\r\n\nthree"), vec!["one", "two", "", "three"]);
        assert!(decode_all(b"").is_empty());
    }

    #[test]
    fn test_partial_line_waits_for_newline() {
        let mut codec = LossyLineCodec::new();
        let mut buffer = BytesMut::from(&b"err:module:import_dll"[..]);
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);
        buffer.extend_from_slice(b" Library not found\n");
        assert_eq!(
            codec.decode(&mut buffer).unwrap().as_deref(),
            Some("err:module:import_dll Library not found")
        );
    }

    #[test]
    fn test_long_lines_are_split_at_max_length() {
        let codec = LossyLineCodec::with_max_length(4);
        assert_eq!(decode_all_with(codec, b"abcdefghij\n"), vec!["abcd", "efgh", "ij"]);
        assert_eq!(decode_all_with(codec, b"abcd\nef"), vec!["abcd", "ef"]);
    }

    #[test]
    fn test_unterminated_output_does_not_accumulate() {
        let mut codec = LossyLineCodec::with_max_length(8);
        let mut buffer = BytesMut::from(&[b'z'; 20][..]);
        assert_eq!(codec.decode(&mut buffer).unwrap().map(|l| l.len()), Some(8));
        assert_eq!(codec.decode(&mut buffer).unwrap().map(|l| l.len()), Some(8));
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);
        assert_eq!(buffer.len(), 4);
        assert_eq!(LossyLineCodec::default().max_length(), MAX_LINE_LENGTH);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        assert_eq!(decode_all(b"caf\xe9\n"), vec!["caf\u{fffd}"]);
    }

    #[tokio::test]
    async fn test_pump_lines_broadcasts_in_order() {
        let broadcaster = Arc::new(DebugStreamBroadcaster::new());
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        broadcaster.add_listener(ListenerHandle::new(move |line: &str| {
            sink.lock().unwrap().push(line.to_string());
        }));

        let input: &[u8] = b"first\nsecond\nthird";
        pump_lines(
            input,
            OutputStream::Stdout,
            42,
            broadcaster,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(*lines.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_cancelled_reader_keeps_pipe_open() {
        let broadcaster = Arc::new(DebugStreamBroadcaster::new());
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        broadcaster.add_listener(ListenerHandle::new(move |line: &str| {
            sink.lock().unwrap().push(line.to_string());
        }));

        let (mut writer, reader) = tokio::io::duplex(64);
        let token = CancellationToken::new();

        let task = tokio::spawn(pump_lines(
            reader,
            OutputStream::Stderr,
            42,
            broadcaster,
            token.clone(),
        ));
        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("reader did not stop after cancellation")
            .unwrap();

        // Far more than the pipe buffer: only succeeds while someone drains it
        let late_output = b"fixme:d3d:wined3d_guess_card\n".repeat(200);
        tokio::time::timeout(Duration::from_secs(5), writer.write_all(&late_output))
            .await
            .expect("writer blocked after cancellation")
            .expect("pipe was closed by cancellation");

        assert!(lines.lock().unwrap().is_empty());
    }
}
