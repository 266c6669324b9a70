//! # Buffered Transport
//!
//! Bounded in-memory byte buffers that implement [`Transport`] for the
//! protocol engine. The async side of the program moves bytes between these
//! buffers and the serial port; the engine only ever sees the buffers, so it
//! never blocks.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::error::{Result, VentError};
use crate::ports::Transport;

/// Inbound and outbound byte buffers with a fixed capacity each
#[derive(Debug)]
pub struct BufferedTransport {
    inbound: BytesMut,
    outbound: BytesMut,
    capacity: usize,
}

impl BufferedTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            inbound: BytesMut::with_capacity(capacity),
            outbound: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Append received bytes, returning how many fit
    ///
    /// Bytes beyond the capacity are dropped; the frame they belonged to will
    /// fail its CRC and be retransmitted by the peer.
    pub fn push_inbound(&mut self, data: &[u8]) -> usize {
        let room = self.capacity.saturating_sub(self.inbound.len());
        let accepted = data.len().min(room);
        if accepted < data.len() {
            debug!(
                "Inbound buffer full, dropping {} bytes",
                data.len() - accepted
            );
        }
        self.inbound.extend_from_slice(&data[..accepted]);
        accepted
    }

    /// Bytes written by the engine and not yet sent to the port
    pub fn pending_outbound(&self) -> &[u8] {
        &self.outbound
    }

    /// Read once from `reader` into the inbound buffer
    ///
    /// # Returns
    ///
    /// * `Result<usize>` - Bytes read from the port; `Ok(0)` means end of stream
    ///
    /// # Errors
    ///
    /// Returns error if the underlying read fails
    pub async fn fill_from<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<usize> {
        let mut chunk = [0u8; 256];
        let n = reader
            .read(&mut chunk)
            .await
            .map_err(|e| VentError::Serial(format!("Failed to read serial port: {}", e)))?;
        trace!("Read {} bytes from serial port", n);
        self.push_inbound(&chunk[..n]);
        Ok(n)
    }

    /// Drain all pending outbound bytes into `writer`
    ///
    /// # Returns
    ///
    /// * `Result<usize>` - Number of bytes written
    ///
    /// # Errors
    ///
    /// Returns error if a write or the flush fails. Bytes the port accepted
    /// before the failure are released; only the remainder stays buffered.
    pub async fn write_pending<W: AsyncWrite + Unpin>(&mut self, writer: &mut W) -> Result<usize> {
        let mut written = 0;

        while !self.outbound.is_empty() {
            let n = writer
                .write(&self.outbound)
                .await
                .map_err(|e| VentError::Serial(format!("Failed to write frame: {}", e)))?;
            if n == 0 {
                return Err(VentError::Serial(
                    "Failed to write frame: port accepted no bytes".to_string(),
                ));
            }
            self.outbound.advance(n);
            written += n;
        }

        if written == 0 {
            return Ok(0);
        }

        writer
            .flush()
            .await
            .map_err(|e| VentError::Serial(format!("Failed to flush serial port: {}", e)))?;

        trace!("Wrote {} bytes to serial port", written);
        Ok(written)
    }
}

impl Transport for BufferedTransport {
    fn bytes_available(&self) -> usize {
        self.inbound.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        if self.inbound.has_remaining() {
            Some(self.inbound.get_u8())
        } else {
            None
        }
    }

    fn write_available(&self) -> usize {
        self.capacity.saturating_sub(self.outbound.len())
    }

    fn write_bytes(&mut self, buf: &[u8]) -> usize {
        let accepted = buf.len().min(self.write_available());
        self.outbound.extend_from_slice(&buf[..accepted]);
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_inbound_bytes_read_in_order() {
        let mut transport = BufferedTransport::new(16);
        assert_eq!(transport.push_inbound(&[1, 2, 3]), 3);
        assert_eq!(transport.bytes_available(), 3);

        assert_eq!(transport.read_byte(), Some(1));
        assert_eq!(transport.read_byte(), Some(2));
        assert_eq!(transport.read_byte(), Some(3));
        assert_eq!(transport.read_byte(), None);
    }

    #[test]
    fn test_inbound_capacity() {
        let mut transport = BufferedTransport::new(4);
        assert_eq!(transport.push_inbound(&[0; 6]), 4);
        assert_eq!(transport.bytes_available(), 4);
    }

    #[test]
    fn test_write_respects_capacity() {
        let mut transport = BufferedTransport::new(8);
        assert_eq!(transport.write_available(), 8);
        assert_eq!(transport.write_bytes(&[0xAA; 5]), 5);
        assert_eq!(transport.write_available(), 3);
        assert_eq!(transport.write_bytes(&[0xBB; 5]), 3);
        assert_eq!(transport.pending_outbound().len(), 8);
    }

    #[tokio::test]
    async fn test_write_pending_drains_outbound() {
        let mut transport = BufferedTransport::new(64);
        transport.write_bytes(&[0x7E, 0x40, 0x00, 0x01, 0x12, 0x34, 0x7E]);

        let mut port = Builder::new()
            .write(&[0x7E, 0x40, 0x00, 0x01, 0x12, 0x34, 0x7E])
            .build();

        let written = transport.write_pending(&mut port).await.unwrap();
        assert_eq!(written, 7);
        assert!(transport.pending_outbound().is_empty());
        assert_eq!(transport.write_available(), 64);
    }

    #[tokio::test]
    async fn test_write_pending_with_nothing_queued() {
        let mut transport = BufferedTransport::new(64);
        let mut port = Builder::new().build();
        assert_eq!(transport.write_pending(&mut port).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_error_keeps_bytes() {
        let mut transport = BufferedTransport::new(64);
        transport.write_bytes(&[1, 2, 3]);

        let mut port = Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"))
            .build();

        match transport.write_pending(&mut port).await {
            Err(VentError::Serial(msg)) => assert!(msg.contains("unplugged")),
            other => panic!("Expected Serial error, got: {:?}", other),
        }
        assert_eq!(transport.pending_outbound(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_partial_write_then_error_keeps_only_unsent_bytes() {
        let mut transport = BufferedTransport::new(64);
        transport.write_bytes(&[1, 2, 3, 4]);

        let mut port = Builder::new()
            .write(&[1, 2])
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"))
            .build();

        assert!(transport.write_pending(&mut port).await.is_err());
        assert_eq!(transport.pending_outbound(), &[3, 4]);
        assert_eq!(transport.write_available(), 62);
    }

    #[tokio::test]
    async fn test_write_pending_across_port_chunks() {
        let mut transport = BufferedTransport::new(64);
        transport.write_bytes(&[1, 2, 3, 4, 5]);

        let mut port = Builder::new().write(&[1, 2]).write(&[3, 4, 5]).build();

        assert_eq!(transport.write_pending(&mut port).await.unwrap(), 5);
        assert!(transport.pending_outbound().is_empty());
    }

    #[tokio::test]
    async fn test_fill_from_reader() {
        let mut transport = BufferedTransport::new(64);
        let mut port = Builder::new().read(&[0x7E, 0x41, 0x7E]).build();

        assert_eq!(transport.fill_from(&mut port).await.unwrap(), 3);
        assert_eq!(transport.bytes_available(), 3);
        assert_eq!(transport.read_byte(), Some(0x7E));
    }
}
