//! # Request Socket
//!
//! Lets a UI on the monitor host send commands to the controller.
//!
//! A client connects, writes one JSON request and reads one JSON reply:
//!
//! ```text
//! -> {"type": "setmode", "mode": "purge"}
//! <- {"type":"ackmode","mode":"purge"}
//! ```
//!
//! Accepted requests are handed to the main loop over a channel and queued
//! in the command class of the protocol engine. An ack means the command was
//! queued for the link, not that the controller has applied it.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::breathing::VentilationMode;
use crate::error::Result;
use crate::ports::{Clock, Transport};
use crate::protocol::{PacketClass, ProtocolEngine};
use crate::telemetry::records::{Command, CommandCode};
use crate::telemetry::Payload;

/// Longest request accepted from a client
pub const MAX_REQUEST_BYTES: u64 = 300;

/// A command request from a UI client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    SetMode { mode: VentilationMode },
    Start,
    Stop,
    Reset,
    Calibrate,
}

impl Request {
    /// General command carrying this request
    pub fn to_command(self, timestamp: u32) -> Command {
        match self {
            Request::SetMode { mode } => {
                Command::general(timestamp, CommandCode::SetMode, u32::from(mode.wire_value()))
            }
            Request::Start => Command::general(timestamp, CommandCode::Start, 0),
            Request::Stop => Command::general(timestamp, CommandCode::Stop, 0),
            Request::Reset => Command::general(timestamp, CommandCode::Reset, 0),
            Request::Calibrate => Command::general(timestamp, CommandCode::Calibrate, 0),
        }
    }

    fn ack(self) -> Reply {
        match self {
            Request::SetMode { mode } => Reply::AckMode { mode },
            _ => Reply::Ack,
        }
    }
}

/// Reply written back to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Reply {
    AckMode { mode: VentilationMode },
    Ack,
    Nack { reason: String },
}

/// Queue `request` as a command frame, stamped with the engine's clock
///
/// # Errors
///
/// Returns error if the command cannot be framed
pub fn enqueue_request<C: Clock, T: Transport>(
    engine: &mut ProtocolEngine<C, T>,
    request: Request,
) -> Result<()> {
    let command = request.to_command(engine.clock().now_ms());
    engine.enqueue(PacketClass::Command, &Payload::Command(command))
}

/// TCP listener feeding requests to the main loop
#[derive(Debug)]
pub struct RequestServer {
    listener: TcpListener,
}

impl RequestServer {
    /// Bind the request socket
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound
    pub async fn bind(address: &str) -> Result<Self> {
        let listener = TcpListener::bind(address).await?;
        info!("Answering requests on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until the receiving side of `requests` is dropped
    pub async fn serve(self, requests: mpsc::Sender<Request>) {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept request connection: {}", e);
                    continue;
                }
            };

            if requests.is_closed() {
                break;
            }

            let requests = requests.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, &requests).await {
                    warn!("Request from {} failed: {}", peer, e);
                }
            });
        }
    }
}

/// Read one request from `stream`, forward it and write the reply
///
/// # Errors
///
/// Returns error if reading the request or writing the reply fails
pub async fn handle_connection<S>(stream: S, requests: &mpsc::Sender<Request>) -> Result<Reply>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);
    let mut line = String::new();
    (&mut stream)
        .take(MAX_REQUEST_BYTES)
        .read_line(&mut line)
        .await?;

    let reply = match serde_json::from_str::<Request>(line.trim()) {
        Ok(request) => {
            debug!("Request: {:?}", request);
            match requests.send(request).await {
                Ok(()) => request.ack(),
                Err(_) => Reply::Nack {
                    reason: "link is shutting down".to_string(),
                },
            }
        }
        Err(e) => Reply::Nack {
            reason: e.to_string(),
        },
    };

    let mut bytes = serde_json::to_vec(&reply)?;
    bytes.push(b'\n');
    stream.write_all(&bytes).await?;
    stream.shutdown().await?;
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;
    use crate::ports::mocks::MockTransport;
    use crate::ports::ManualClock;
    use crate::protocol::{stuffing, wire::PACKET_CMD, Frame};
    use tokio::io::duplex;

    #[test]
    fn test_parse_requests() {
        let request: Request = serde_json::from_str(r#"{"type": "setmode", "mode": "purge"}"#).unwrap();
        assert_eq!(
            request,
            Request::SetMode {
                mode: VentilationMode::Purge
            }
        );

        let request: Request = serde_json::from_str(r#"{"type": "start"}"#).unwrap();
        assert_eq!(request, Request::Start);

        assert!(serde_json::from_str::<Request>(r#"{"type": "setthresholds"}"#).is_err());
        assert!(serde_json::from_str::<Request>(r#"{"type": "setmode", "mode": "fast"}"#).is_err());
    }

    #[test]
    fn test_request_to_command() {
        let command = Request::SetMode {
            mode: VentilationMode::Flush,
        }
        .to_command(77);
        assert_eq!(command, Command::general(77, CommandCode::SetMode, 2));

        assert_eq!(
            Request::Stop.to_command(5),
            Command::general(5, CommandCode::Stop, 0)
        );
    }

    #[test]
    fn test_reply_json() {
        let json = serde_json::to_value(Reply::AckMode {
            mode: VentilationMode::Breathe,
        })
        .unwrap();
        assert_eq!(json["type"], "ackmode");
        assert_eq!(json["mode"], "breathe");

        let json = serde_json::to_value(Reply::Ack).unwrap();
        assert_eq!(json["type"], "ack");
    }

    #[test]
    fn test_enqueued_request_reaches_the_wire() {
        let clock = ManualClock::new(0);
        let transport = MockTransport::new();
        let mut engine =
            ProtocolEngine::new(clock.clone(), transport.clone(), &ProtocolConfig::default());

        clock.set(20);
        enqueue_request(
            &mut engine,
            Request::SetMode {
                mode: VentilationMode::Purge,
            },
        )
        .unwrap();
        assert_eq!(engine.queue_len(PacketClass::Command), 1);

        // Past the 50 ms command resend timeout
        clock.set(51);
        engine.send();

        let written = transport.take_written_data();
        assert_eq!(written.len(), 1);
        let frame = Frame::from_bytes(&stuffing::decode(&written[0])).unwrap();
        assert_eq!(frame.address(), PACKET_CMD);
        assert!(frame.compare_crc());
        assert_eq!(
            frame.payload().unwrap(),
            Payload::Command(Command::general(20, CommandCode::SetMode, 1))
        );
    }

    #[tokio::test]
    async fn test_connection_forwards_request_and_acks() {
        let (tx, mut rx) = mpsc::channel(4);
        let (mut client, server) = duplex(1024);

        client
            .write_all(b"{\"type\": \"setmode\", \"mode\": \"flush\"}\n")
            .await
            .unwrap();

        let reply = handle_connection(server, &tx).await.unwrap();
        assert_eq!(
            reply,
            Reply::AckMode {
                mode: VentilationMode::Flush
            }
        );
        assert_eq!(
            rx.recv().await,
            Some(Request::SetMode {
                mode: VentilationMode::Flush
            })
        );

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(response.trim()).unwrap();
        assert_eq!(json["type"], "ackmode");
        assert_eq!(json["mode"], "flush");
    }

    #[tokio::test]
    async fn test_malformed_request_nacked() {
        let (tx, mut rx) = mpsc::channel(4);
        let (mut client, server) = duplex(1024);

        client.write_all(b"not json\n").await.unwrap();

        let reply = handle_connection(server, &tx).await.unwrap();
        assert!(matches!(reply, Reply::Nack { .. }));
        assert!(rx.try_recv().is_err());

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        assert!(response.contains("\"type\":\"nack\""));
    }

    #[tokio::test]
    async fn test_closed_channel_nacks() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (mut client, server) = duplex(1024);

        client.write_all(b"{\"type\": \"stop\"}\n").await.unwrap();
        let reply = handle_connection(server, &tx).await.unwrap();
        assert!(matches!(reply, Reply::Nack { .. }));
    }

    #[tokio::test]
    async fn test_server_over_tcp() {
        let server = RequestServer::bind("127.0.0.1:0").await.unwrap();
        let address = server.local_addr().unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        tokio::spawn(server.serve(tx));

        let mut client = tokio::net::TcpStream::connect(address).await.unwrap();
        client.write_all(b"{\"type\": \"start\"}\n").await.unwrap();

        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        assert_eq!(response.trim(), r#"{"type":"ack"}"#);
        assert_eq!(rx.recv().await, Some(Request::Start));
    }
}
