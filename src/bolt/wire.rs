//! Buffered byte channel under a Bolt session.
//!
//! A [`Wire`] wraps any async stream. Outbound messages are framed into a
//! write buffer and only hit the stream on [`Wire::send`]; inbound bytes
//! are buffered so that complete messages can be peeked at before they
//! are read. Broken/closed flags and byte counters live in a shared
//! [`WireState`] so a pool can observe them without owning the wire.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use super::codec::{peek_message, BoltCodec};
use super::error::{BoltError, BoltResult};

/// Any byte stream a session can run over (TCP, TLS, in-memory).
pub trait Channel: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Channel for T {}

/// Flags and counters shared between a wire and its observers.
#[derive(Debug, Default)]
pub struct WireState {
    broken: AtomicBool,
    closed: AtomicBool,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl WireState {
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn mark_broken(&self) {
        self.broken.store(true, Ordering::Release);
    }

    /// Flag the wire closed. The owner shuts the stream down on its next
    /// operation.
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }
}

pub struct Wire {
    stream: Box<dyn Channel>,
    codec: BoltCodec,
    read_buf: BytesMut,
    write_buf: BytesMut,
    state: Arc<WireState>,
    local_port: u16,
    shut_down: bool,
}

impl Wire {
    pub fn new(stream: Box<dyn Channel>, local_port: u16, max_message_size: usize) -> Self {
        Self {
            stream,
            codec: BoltCodec::with_max_size(max_message_size),
            read_buf: BytesMut::with_capacity(8192),
            write_buf: BytesMut::with_capacity(8192),
            state: Arc::new(WireState::default()),
            local_port,
            shut_down: false,
        }
    }

    pub fn state(&self) -> Arc<WireState> {
        Arc::clone(&self.state)
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn is_broken(&self) -> bool {
        self.state.is_broken()
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.state.bytes_sent()
    }

    pub fn bytes_received(&self) -> u64 {
        self.state.bytes_received()
    }

    /// Direct access to the stream, for the handshake.
    pub fn stream_mut(&mut self) -> &mut Box<dyn Channel> {
        &mut self.stream
    }

    /// Frame a message payload into the outbound buffer.
    pub fn write_message(&mut self, payload: &[u8]) -> BoltResult<()> {
        self.codec.encode(payload, &mut self.write_buf)
    }

    /// Bytes framed but not yet sent.
    pub fn pending(&self) -> usize {
        self.write_buf.len()
    }

    /// Flush the outbound buffer to the stream. Returns bytes written.
    pub async fn send(&mut self) -> BoltResult<usize> {
        self.check_open()?;
        if self.write_buf.is_empty() {
            return Ok(0);
        }
        let data = self.write_buf.split();
        let result: std::io::Result<()> = async {
            self.stream.write_all(&data).await?;
            self.stream.flush().await
        }
        .await;
        match result {
            Ok(()) => {
                self.state.bytes_sent.fetch_add(data.len() as u64, Ordering::Relaxed);
                Ok(data.len())
            }
            Err(e) => {
                self.state.mark_broken();
                Err(e.into())
            }
        }
    }

    /// Read the next complete, non-empty message payload.
    ///
    /// Empty messages (NOOP keep-alives) are skipped.
    pub async fn read_message(&mut self) -> BoltResult<BytesMut> {
        self.check_open()?;
        loop {
            match self.codec.decode(&mut self.read_buf) {
                Ok(Some(payload)) if payload.is_empty() => continue,
                Ok(Some(payload)) => return Ok(payload),
                Ok(None) => {}
                Err(e) => return Err(e),
            }

            let read = match self.stream.read_buf(&mut self.read_buf).await {
                Ok(n) => n,
                Err(e) => {
                    self.state.mark_broken();
                    return Err(e.into());
                }
            };
            if read == 0 {
                self.state.mark_broken();
                return Err(BoltError::ConnectionClosed);
            }
            self.state.bytes_received.fetch_add(read as u64, Ordering::Relaxed);
        }
    }

    /// Tag of the next message if it is already fully buffered.
    pub fn peek_message(&self) -> Option<u8> {
        if self.codec.in_message() {
            return None;
        }
        peek_message(&self.read_buf)
    }

    /// Shut the stream down. Safe to call more than once.
    pub async fn close(&mut self) {
        self.state.mark_closed();
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.write_buf.clear();
        if let Err(e) = self.stream.shutdown().await {
            debug!("[#{:04X}] shutdown failed: {}", self.local_port, e);
        }
    }

    fn check_open(&self) -> BoltResult<()> {
        if self.state.is_closed() {
            Err(BoltError::WireClosed)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wire")
            .field("local_port", &self.local_port)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
