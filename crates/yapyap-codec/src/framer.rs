//! Length-prefixed framing over any byte-oriented bidirectional stream
//! (§4.1).
//!
//! Outbound: encode, prepend a 4-byte big-endian length, emit. Inbound:
//! buffer incoming bytes; once a full frame is present, extract and decode
//! it, leaving any partial frame in the buffer for the next read.

use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::FramerError;

/// Length of the big-endian frame-length prefix.
const LENGTH_PREFIX_BYTES: usize = 4;

/// Default cap on a single frame's encoded payload: 1 MiB.
pub const DEFAULT_FRAME_CAP: usize = 1024 * 1024;

/// Default idle-timeout watchdog: closes a stream making no progress.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Back-pressure kicks in once the buffer holds this fraction of the cap.
const BACK_PRESSURE_THRESHOLD_NUM: usize = 75;
const BACK_PRESSURE_THRESHOLD_DEN: usize = 100;

/// Buffer overflow triggers at this multiple of the cap.
const BUFFER_OVERFLOW_MULTIPLIER: usize = 2;

/// Frames a byte stream: write full frames out, read full frames in,
/// buffering partial reads in between.
#[derive(Debug)]
pub struct Framer<S> {
    stream: S,
    cap: usize,
    idle_timeout: Duration,
    read_buf: BytesMut,
}

impl<S> Framer<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self::with_config(stream, DEFAULT_FRAME_CAP, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_config(stream: S, cap: usize, idle_timeout: Duration) -> Self {
        Self {
            stream,
            cap,
            idle_timeout,
            read_buf: BytesMut::new(),
        }
    }

    /// Unwrap the underlying stream, discarding any buffered partial frame.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Encode `payload` as one frame and write it to the stream.
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<(), FramerError> {
        if payload.len() > self.cap {
            return Err(FramerError::FrameTooLarge {
                size: payload.len(),
                cap: self.cap,
            });
        }
        let len = payload.len() as u32;
        self.stream.write_all(&len.to_be_bytes()).await?;
        self.stream.write_all(payload).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read the next complete frame, pulling more bytes off the stream as
    /// needed. Returns `Ok(None)` on a clean EOF with no partial frame
    /// pending.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, FramerError> {
        loop {
            if let Some(frame) = self.try_take_frame()? {
                return Ok(Some(frame));
            }

            let overflow_threshold = self.cap * BUFFER_OVERFLOW_MULTIPLIER;
            if self.read_buf.len() > overflow_threshold {
                return Err(FramerError::BufferOverflow {
                    size: self.read_buf.len(),
                    threshold: overflow_threshold,
                });
            }

            let back_pressure_threshold =
                (self.cap * BACK_PRESSURE_THRESHOLD_NUM) / BACK_PRESSURE_THRESHOLD_DEN;
            if self.read_buf.len() > back_pressure_threshold {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }

            let mut chunk = [0u8; 8192];
            let read = tokio::time::timeout(self.idle_timeout, self.stream.read(&mut chunk))
                .await
                .map_err(|_| FramerError::IdleTimeout(self.idle_timeout))??;

            if read == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(FramerError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stream closed mid-frame",
                )));
            }
            self.read_buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Attempt to pull one complete frame out of the already-buffered
    /// bytes, without touching the stream.
    fn try_take_frame(&mut self) -> Result<Option<Vec<u8>>, FramerError> {
        if self.read_buf.len() < LENGTH_PREFIX_BYTES {
            return Ok(None);
        }
        let declared_len =
            u32::from_be_bytes(self.read_buf[..LENGTH_PREFIX_BYTES].try_into().unwrap()) as usize;
        if declared_len > self.cap {
            return Err(FramerError::FrameTooLarge {
                size: declared_len,
                cap: self.cap,
            });
        }
        let total = LENGTH_PREFIX_BYTES + declared_len;
        if self.read_buf.len() < total {
            return Ok(None);
        }
        self.read_buf.advance(LENGTH_PREFIX_BYTES);
        let frame = self.read_buf.split_to(declared_len).to_vec();
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn writes_and_reads_one_frame() {
        let (client, server) = duplex(4096);
        let mut writer = Framer::new(client);
        let mut reader = Framer::new(server);

        writer.write_frame(b"hello").await.unwrap();
        let frame = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(frame, b"hello");
    }

    #[tokio::test]
    async fn reassembles_frames_split_across_reads() {
        let (client, server) = duplex(4096);
        let mut writer = Framer::new(client);
        let mut reader = Framer::new(server);

        writer.write_frame(b"one").await.unwrap();
        writer.write_frame(b"two").await.unwrap();

        assert_eq!(reader.read_frame().await.unwrap().unwrap(), b"one");
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), b"two");
    }

    #[tokio::test]
    async fn rejects_outbound_frame_larger_than_cap() {
        let (client, _server) = duplex(1 << 20);
        let mut writer = Framer::with_config(client, 16, DEFAULT_IDLE_TIMEOUT);

        let big = vec![0u8; 17];
        assert!(matches!(
            writer.write_frame(&big).await,
            Err(FramerError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_inbound_declared_length_over_cap() {
        let (mut client, server) = duplex(1 << 20);
        let mut reader = Framer::with_config(server, 16, DEFAULT_IDLE_TIMEOUT);

        client.write_all(&1_000u32.to_be_bytes()).await.unwrap();
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, FramerError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn returns_none_on_clean_eof() {
        let (client, server) = duplex(4096);
        drop(client);
        let mut reader = Framer::new(server);
        assert!(reader.read_frame().await.unwrap().is_none());
    }
}
