//! WebSocket transport over `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use sc_core::error::{ScError, ScResult};
use sc_core::platform::Platform;

use super::{route_engine_packet, CloseReason, HandleDriver, Handshake, Routed, Session, Transport, TransportKind};
use crate::packet::{self, EnginePacket, OpenInfo, SocketPacket};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Persistent bidirectional transport; preferred in negotiation.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, handshake: &Handshake) -> ScResult<Box<dyn Session>> {
        let url = handshake.engine_url(TransportKind::WebSocket)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ScError::Config(format!("invalid socket url {url}: {e}")))?;

        let headers = request.headers_mut();
        headers.insert(
            "user-agent",
            HeaderValue::from_str(&Platform::user_agent())
                .map_err(|e| ScError::Internal(e.to_string()))?,
        );
        for (key, value) in &handshake.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| ScError::Config(format!("invalid header name {key}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ScError::Config(format!("invalid header value for {key}: {e}")))?;
            headers.insert(name, value);
        }

        debug!("websocket connecting to {url}");
        let (mut stream, _response) = connect_async(request)
            .await
            .map_err(|e| ScError::Socket(format!("websocket connect failed: {e}")))?;

        let info = match next_engine_packet(&mut stream).await? {
            EnginePacket::Open(info) => info,
            other => {
                return Err(ScError::Protocol(format!(
                    "expected open packet, got {other:?}"
                )))
            }
        };

        send_frame(&mut stream, packet::encode_connect(&handshake.token)).await?;

        loop {
            match next_engine_packet(&mut stream).await? {
                EnginePacket::Ping(data) => {
                    send_frame(&mut stream, EnginePacket::Pong(data).encode()).await?;
                }
                EnginePacket::Message(body) => match SocketPacket::decode(&body)? {
                    SocketPacket::Connect(_) => break,
                    SocketPacket::ConnectError { message } => {
                        let _ = stream.close(None).await;
                        return Err(ScError::HandshakeRejected(message));
                    }
                    other => debug!("ignoring {other:?} before connect ack"),
                },
                EnginePacket::Close => {
                    return Err(ScError::Socket("server closed during handshake".into()))
                }
                _ => {}
            }
        }

        info!("websocket session {} established", info.sid);
        Ok(Box::new(WebSocketSession { stream, info }))
    }
}

async fn next_engine_packet(stream: &mut WsStream) -> ScResult<EnginePacket> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return EnginePacket::decode(text.as_str()),
            Some(Ok(Message::Close(_))) | None => {
                return Err(ScError::Socket("websocket closed during handshake".into()))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(ScError::Socket(e.to_string())),
        }
    }
}

async fn send_frame(stream: &mut WsStream, frame: String) -> ScResult<()> {
    stream
        .send(Message::text(frame))
        .await
        .map_err(|e| ScError::Socket(e.to_string()))
}

struct WebSocketSession {
    stream: WsStream,
    info: OpenInfo,
}

impl Session for WebSocketSession {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn start(self: Box<Self>, driver: HandleDriver) {
        let WebSocketSession { stream, info } = *self;
        tokio::spawn(run(stream, info, driver));
    }
}

async fn run(stream: WsStream, info: OpenInfo, mut driver: HandleDriver) {
    let sink = driver.sink().clone();
    let (mut write, mut read) = stream.split();
    let deadline = info.heartbeat_deadline();
    let mut last_inbound = Instant::now();

    let reason = loop {
        tokio::select! {
            outbound = driver.next_outbound() => match outbound {
                Some(signal) => {
                    if let Err(e) = write.send(Message::text(packet::encode_signal(&signal))).await {
                        break CloseReason::TransportError(e.to_string());
                    }
                }
                None => {
                    let _ = write
                        .send(Message::text(SocketPacket::Disconnect.into_engine().encode()))
                        .await;
                    let _ = write.close().await;
                    break CloseReason::ClientClose;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    last_inbound = Instant::now();
                    let packet = match EnginePacket::decode(text.as_str()) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!("skipping malformed frame: {e}");
                            continue;
                        }
                    };
                    match route_engine_packet(packet, &sink) {
                        Routed::Continue => {}
                        Routed::Reply(reply) => {
                            if let Err(e) = write.send(Message::text(reply.encode())).await {
                                break CloseReason::TransportError(e.to_string());
                            }
                        }
                        Routed::Closed(reason) => break reason,
                    }
                }
                Some(Ok(Message::Close(_))) | None => break CloseReason::TransportClose,
                Some(Ok(_)) => last_inbound = Instant::now(),
                Some(Err(e)) => break CloseReason::TransportError(e.to_string()),
            },
            _ = sleep_until(last_inbound + deadline) => break CloseReason::PingTimeout,
        }
    };

    info!("websocket session {} closed: {reason}", info.sid);
    sink.close(reason);
}
