//! The transport adapter contract (§4.5): dial a protocol-tagged stream to
//! a target identity, then close it, or ask to hang up on it entirely. The
//! router treats every stream as one-shot request-response and never
//! assumes duplex liveness across calls.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use yapyap_core::PeerId;

use crate::error::{TransportError, TransportResult};

/// Independent timeouts the router applies around dial/send/close (§4.5).
#[derive(Debug, Clone, Copy)]
pub struct TransportTimeouts {
    pub dial: Duration,
    pub send: Duration,
    pub close: Duration,
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        Self {
            dial: Duration::from_secs(5),
            send: Duration::from_secs(5),
            close: Duration::from_secs(2),
        }
    }
}

/// A bidirectional byte stream to a single peer, good for exactly one
/// framed envelope in each direction before it should be closed.
pub trait FramedStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> FramedStream for T {}

/// Dial/send/close a framed stream to a target identity (§4.5). The
/// underlying fabric (peer dialing, multiplexing, NAT traversal) sits
/// outside this contract; implementors adapt whatever transport is
/// actually in use.
#[async_trait]
pub trait Transport: Send + Sync {
    type Stream: FramedStream;

    async fn dial_protocol(
        &self,
        target: &PeerId,
        protocol_id: &str,
    ) -> TransportResult<Self::Stream>;

    async fn close(&self, stream: Self::Stream) -> TransportResult<()>;

    async fn hang_up(&self, target: &PeerId) -> TransportResult<()>;
}

/// Wrap a dial future in its timeout, classifying elapsed-timeout as
/// `DialTimeout` directly (no substring matching needed for the one case we
/// can detect structurally).
pub async fn dial_with_timeout<F, T>(
    target: &PeerId,
    timeouts: &TransportTimeouts,
    fut: F,
) -> TransportResult<T>
where
    F: std::future::Future<Output = TransportResult<T>>,
{
    match tokio::time::timeout(timeouts.dial, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::DialTimeout {
            target: target.to_string(),
            timeout: timeouts.dial,
        }),
    }
}

pub async fn send_with_timeout<F, T>(
    target: &PeerId,
    timeouts: &TransportTimeouts,
    fut: F,
) -> TransportResult<T>
where
    F: std::future::Future<Output = TransportResult<T>>,
{
    match tokio::time::timeout(timeouts.send, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::SendTimeout {
            target: target.to_string(),
            timeout: timeouts.send,
        }),
    }
}

pub async fn close_with_timeout<F, T>(
    target: &PeerId,
    timeouts: &TransportTimeouts,
    fut: F,
) -> TransportResult<T>
where
    F: std::future::Future<Output = TransportResult<T>>,
{
    match tokio::time::timeout(timeouts.close, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::CloseTimeout {
            target: target.to_string(),
            timeout: timeouts.close,
        }),
    }
}
