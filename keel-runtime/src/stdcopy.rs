//! Multiplexed stdout/stderr streams
//!
//! Container log streams carry stdout and stderr over a single connection.
//! Each frame starts with an 8-byte header:
//!
//! ```text
//! [stream, 0, 0, 0, len_be[0], len_be[1], len_be[2], len_be[3]]
//! ```
//!
//! followed by `len` bytes of payload. Stream 0 is stdin, 1 stdout, 2 stderr
//! and 3 a runtime-side error message.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of a frame header
pub const HEADER_LEN: usize = 8;

/// Largest payload written in a single frame
pub const MAX_FRAME_PAYLOAD: usize = 32 * 1024;

/// Stream a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdin = 0,
    Stdout = 1,
    Stderr = 2,
    SystemErr = 3,
}

impl StreamKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Stdin),
            1 => Some(Self::Stdout),
            2 => Some(Self::Stderr),
            3 => Some(Self::SystemErr),
            _ => None,
        }
    }
}

/// A single decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub stream: StreamKind,
    pub payload: Vec<u8>,
}

/// Reads frames from a multiplexed stream
pub struct Demuxer<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> Demuxer<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads the next frame
    ///
    /// Returns `Ok(None)` on a clean end of stream. A stream ending inside a
    /// frame is an `UnexpectedEof` error.
    pub async fn next_frame(&mut self) -> io::Result<Option<Frame>> {
        let mut header = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = self.reader.read(&mut header[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended inside a frame header",
                ));
            }
            filled += n;
        }

        let stream = StreamKind::from_byte(header[0]).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unrecognized stream type {}", header[0]),
            )
        })?;
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;

        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).await?;

        Ok(Some(Frame { stream, payload }))
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Copies stdin, stdout and stderr payloads into a single sink
///
/// Payloads are written in arrival order. A system error frame stops the copy
/// with an error carrying the runtime's message.
///
/// # Returns
/// The number of payload bytes written
pub async fn copy_combined<R, W>(src: R, sink: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut demuxer = Demuxer::new(src);
    let mut written = 0u64;

    while let Some(frame) = demuxer.next_frame().await? {
        if frame.stream == StreamKind::SystemErr {
            return Err(system_error(&frame.payload));
        }
        sink.write_all(&frame.payload).await?;
        written += frame.payload.len() as u64;
    }

    sink.flush().await?;
    Ok(written)
}

/// Copies stdin and stdout payloads into `stdout` and stderr payloads into
/// `stderr`
pub async fn copy_split<R, O, E>(src: R, stdout: &mut O, stderr: &mut E) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    O: AsyncWrite + Unpin + ?Sized,
    E: AsyncWrite + Unpin + ?Sized,
{
    let mut demuxer = Demuxer::new(src);
    let mut written = 0u64;

    while let Some(frame) = demuxer.next_frame().await? {
        match frame.stream {
            StreamKind::Stdin | StreamKind::Stdout => stdout.write_all(&frame.payload).await?,
            StreamKind::Stderr => stderr.write_all(&frame.payload).await?,
            StreamKind::SystemErr => return Err(system_error(&frame.payload)),
        }
        written += frame.payload.len() as u64;
    }

    stdout.flush().await?;
    stderr.flush().await?;
    Ok(written)
}

/// Writes `payload` as one or more frames of the given stream
pub async fn write_frame<W>(dst: &mut W, stream: StreamKind, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    for chunk in payload.chunks(MAX_FRAME_PAYLOAD) {
        let len = (chunk.len() as u32).to_be_bytes();
        let header = [stream as u8, 0, 0, 0, len[0], len[1], len[2], len[3]];
        dst.write_all(&header).await?;
        dst.write_all(chunk).await?;
    }
    Ok(())
}

fn system_error(payload: &[u8]) -> io::Error {
    io::Error::other(format!(
        "runtime stream error: {}",
        String::from_utf8_lossy(payload).trim()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn encode(frames: &[(StreamKind, &[u8])]) -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::new();
        for (stream, payload) in frames {
            write_frame(&mut buf, *stream, payload).await.unwrap();
        }
        buf
    }

    #[tokio::test]
    async fn test_copy_combined_interleaves_in_order() {
        let input = encode(&[
            (StreamKind::Stdout, &b"compiling\n"[..]),
            (StreamKind::Stderr, &b"warning: unused\n"[..]),
            (StreamKind::Stdout, &b"done\n"[..]),
        ])
        .await;

        let mut sink: Vec<u8> = Vec::new();
        let written = copy_combined(input.as_slice(), &mut sink).await.unwrap();

        assert_eq!(sink, b"compiling\nwarning: unused\ndone\n");
        assert_eq!(written, sink.len() as u64);
    }

    #[tokio::test]
    async fn test_copy_split_separates_streams() {
        let input = encode(&[
            (StreamKind::Stdout, &b"out1 "[..]),
            (StreamKind::Stderr, &b"err1 "[..]),
            (StreamKind::Stdin, &b"in1 "[..]),
            (StreamKind::Stderr, &b"err2"[..]),
        ])
        .await;

        let mut stdout: Vec<u8> = Vec::new();
        let mut stderr: Vec<u8> = Vec::new();
        copy_split(input.as_slice(), &mut stdout, &mut stderr)
            .await
            .unwrap();

        assert_eq!(stdout, b"out1 in1 ");
        assert_eq!(stderr, b"err1 err2");
    }

    #[tokio::test]
    async fn test_system_error_frame_stops_copy() {
        let input = encode(&[
            (StreamKind::Stdout, &b"partial"[..]),
            (StreamKind::SystemErr, &b"container gone\n"[..]),
            (StreamKind::Stdout, &b"never written"[..]),
        ])
        .await;

        let mut sink: Vec<u8> = Vec::new();
        let err = copy_combined(input.as_slice(), &mut sink)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("container gone"));
        assert_eq!(sink, b"partial");
    }

    #[tokio::test]
    async fn test_unknown_stream_type() {
        let input = [7u8, 0, 0, 0, 0, 0, 0, 1, b'x'];
        let mut sink: Vec<u8> = Vec::new();
        let err = copy_combined(&input[..], &mut sink).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_truncated_frames() {
        let mut sink: Vec<u8> = Vec::new();
        let err = copy_combined(&[1u8, 0, 0][..], &mut sink)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err = copy_combined(&[1u8, 0, 0, 0, 0, 0, 0, 5, b'a'][..], &mut sink)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_large_payload_is_chunked() {
        let payload = vec![b'z'; MAX_FRAME_PAYLOAD * 2 + 10];
        let input = encode(&[(StreamKind::Stdout, payload.as_slice())]).await;
        assert_eq!(input.len(), payload.len() + 3 * HEADER_LEN);

        let mut demuxer = Demuxer::new(input.as_slice());
        let mut sizes = Vec::new();
        while let Some(frame) = demuxer.next_frame().await.unwrap() {
            sizes.push(frame.payload.len());
        }
        assert_eq!(sizes, vec![MAX_FRAME_PAYLOAD, MAX_FRAME_PAYLOAD, 10]);
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let mut sink: Vec<u8> = Vec::new();
        let written = copy_combined(&b""[..], &mut sink).await.unwrap();
        assert_eq!(written, 0);
        assert!(sink.is_empty());
    }
}
