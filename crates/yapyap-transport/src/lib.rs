//! The transport adapter (§4.5): dial/send/close a framed stream to a
//! target identity with independent timeouts and classified errors. The
//! overlay fabric itself (peer dialing, multiplexing, NAT traversal) is an
//! external collaborator; this crate only defines the contract the router
//! depends on and an in-process double for tests.

pub mod error;
pub mod mock;
pub mod transport;

pub use error::{TransportError, TransportResult};
pub use mock::{MockNetwork, MockTransport};
pub use transport::{
    close_with_timeout, dial_with_timeout, send_with_timeout, FramedStream, Transport,
    TransportTimeouts,
};

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use yapyap_core::PeerId;

    use super::*;

    fn peer(byte: u8) -> PeerId {
        PeerId::from_bytes(&[byte; 32])
    }

    #[tokio::test]
    async fn dial_delivers_a_stream_to_the_listener() {
        let network = MockNetwork::new();
        let mut server_rx = network.listen(peer(1));
        let transport = network.transport();

        let mut client = transport.dial_protocol(&peer(1), "message").await.unwrap();
        let mut server = server_rx.recv().await.unwrap();

        client.write_all(b"hello").await.unwrap();
        client.shutdown().await.unwrap();

        let mut buf = Vec::new();
        server.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello");
    }

    #[tokio::test]
    async fn dial_to_unregistered_peer_fails() {
        let network = MockNetwork::new();
        let transport = network.transport();
        let err = transport.dial_protocol(&peer(9), "message").await.unwrap_err();
        assert_eq!(err.kind(), "transport-error");
    }

    #[tokio::test]
    async fn hang_up_makes_target_unreachable() {
        let network = MockNetwork::new();
        let _rx = network.listen(peer(2));
        let transport = network.transport();

        transport.hang_up(&peer(2)).await.unwrap();
        let err = transport.dial_protocol(&peer(2), "message").await.unwrap_err();
        assert_eq!(err.kind(), "transport-error");
    }

    #[tokio::test]
    async fn dial_with_timeout_classifies_elapsed_future() {
        let timeouts = TransportTimeouts {
            dial: std::time::Duration::from_millis(10),
            ..Default::default()
        };
        let target = peer(3);
        let result: TransportResult<()> = dial_with_timeout(&target, &timeouts, async {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(TransportError::DialTimeout { .. })));
    }
}
