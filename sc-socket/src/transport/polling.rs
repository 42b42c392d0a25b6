//! HTTP long-polling transport over `reqwest`.
//!
//! Fallback when a WebSocket cannot be opened (proxies that strip upgrades).
//! Inbound packets arrive on a long-poll GET; outbound packets and pongs
//! go out as POSTs on the same session id.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use tracing::{debug, info, warn};

use sc_core::error::{ScError, ScResult};
use sc_core::platform::Platform;

use super::{route_engine_packet, CloseReason, HandleDriver, HandleSink, Handshake, Routed, Session, Transport, TransportKind};
use crate::packet::{self, EnginePacket, OpenInfo, SocketPacket};

/// Slack added to the heartbeat deadline for a single long-poll request.
const POLL_SLACK: Duration = Duration::from_secs(5);

/// Long-polling transport.
#[derive(Debug, Clone)]
pub struct PollingTransport {
    accept_invalid_certs: bool,
}

impl Default for PollingTransport {
    fn default() -> Self {
        Self::new(false)
    }
}

impl PollingTransport {
    pub fn new(accept_invalid_certs: bool) -> Self {
        Self {
            accept_invalid_certs,
        }
    }

    fn build_client(&self, handshake: &Handshake) -> ScResult<Client> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
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

        Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(15))
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()
            .map_err(|e| ScError::Http(format!("failed to build HTTP client: {e}")))
    }
}

#[async_trait]
impl Transport for PollingTransport {
    async fn open(&self, handshake: &Handshake) -> ScResult<Box<dyn Session>> {
        let client = self.build_client(handshake)?;
        let base = handshake.engine_url(TransportKind::Polling)?;

        debug!("polling connecting to {base}");
        let mut opening = get_packets(&client, &base, None).await?.into_iter();
        let info = match opening.next() {
            Some(EnginePacket::Open(info)) => info,
            other => {
                return Err(ScError::Protocol(format!(
                    "expected open packet, got {other:?}"
                )))
            }
        };
        let url = format!("{base}&sid={}", info.sid);
        let mut pending: Vec<EnginePacket> = opening.collect();

        post_frame(&client, &url, packet::encode_connect(&handshake.token)).await?;

        let poll_timeout = info.heartbeat_deadline() + POLL_SLACK;
        let mut acked = false;
        while !acked {
            for packet in get_packets(&client, &url, Some(poll_timeout)).await? {
                match packet {
                    EnginePacket::Message(body) => match SocketPacket::decode(&body)? {
                        SocketPacket::Connect(_) => acked = true,
                        SocketPacket::ConnectError { message } => {
                            return Err(ScError::HandshakeRejected(message))
                        }
                        _ => pending.push(EnginePacket::Message(body)),
                    },
                    EnginePacket::Close => {
                        return Err(ScError::Socket("server closed during handshake".into()))
                    }
                    other => pending.push(other),
                }
            }
        }

        info!("polling session {} established", info.sid);
        Ok(Box::new(PollingSession {
            client,
            url,
            info,
            pending,
        }))
    }
}

/// GET one polling payload.
async fn get_packets(
    client: &Client,
    url: &str,
    timeout: Option<Duration>,
) -> ScResult<Vec<EnginePacket>> {
    let cache_buster: u32 = rand::random();
    let mut request = client.get(format!("{url}&t={cache_buster:x}"));
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }
    let response = request.send().await.map_err(classify)?;
    let status = response.status();
    if !status.is_success() {
        return Err(ScError::ServerError {
            status: status.as_u16(),
            message: format!("polling GET failed with {status}"),
        });
    }
    let body = response.text().await.map_err(classify)?;
    Ok(packet::decode_payload(&body))
}

/// POST one encoded engine frame.
async fn post_frame(client: &Client, url: &str, frame: String) -> ScResult<()> {
    let response = client
        .post(url)
        .header(CONTENT_TYPE, "text/plain;charset=UTF-8")
        .body(frame)
        .send()
        .await
        .map_err(classify)?;
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ScError::ServerError {
            status: status.as_u16(),
            message: format!("polling POST failed with {status}"),
        })
    }
}

fn classify(e: reqwest::Error) -> ScError {
    if e.is_timeout() {
        ScError::Timeout(e.to_string())
    } else {
        ScError::Socket(e.to_string())
    }
}

struct PollingSession {
    client: Client,
    url: String,
    info: OpenInfo,
    /// Packets that arrived alongside the connect ack.
    pending: Vec<EnginePacket>,
}

impl Session for PollingSession {
    fn kind(&self) -> TransportKind {
        TransportKind::Polling
    }

    fn start(self: Box<Self>, driver: HandleDriver) {
        tokio::spawn(run(*self, driver));
    }
}

/// Route a batch of packets, POSTing any replies. Returns a close reason
/// if the batch ended the session.
async fn route_batch(
    packets: Vec<EnginePacket>,
    sink: &HandleSink,
    client: &Client,
    url: &str,
) -> Option<CloseReason> {
    for packet in packets {
        match route_engine_packet(packet, sink) {
            Routed::Continue => {}
            Routed::Reply(reply) => {
                if let Err(e) = post_frame(client, url, reply.encode()).await {
                    return Some(CloseReason::TransportError(e.to_string()));
                }
            }
            Routed::Closed(reason) => return Some(reason),
        }
    }
    None
}

async fn run(session: PollingSession, mut driver: HandleDriver) {
    let PollingSession {
        client,
        url,
        info,
        pending,
    } = session;
    let sink = driver.sink().clone();
    let poll_timeout = info.heartbeat_deadline() + POLL_SLACK;

    let reason = 'session: {
        if let Some(reason) = route_batch(pending, &sink, &client, &url).await {
            break 'session reason;
        }

        let mut poll = Box::pin(get_packets(&client, &url, Some(poll_timeout)));
        loop {
            tokio::select! {
                outbound = driver.next_outbound() => match outbound {
                    Some(signal) => {
                        if let Err(e) = post_frame(&client, &url, packet::encode_signal(&signal)).await {
                            warn!("polling POST failed: {e}");
                            break 'session CloseReason::TransportError(e.to_string());
                        }
                    }
                    None => {
                        let _ = post_frame(
                            &client,
                            &url,
                            SocketPacket::Disconnect.into_engine().encode(),
                        )
                        .await;
                        break 'session CloseReason::ClientClose;
                    }
                },
                result = &mut poll => {
                    match result {
                        Ok(packets) => {
                            if let Some(reason) = route_batch(packets, &sink, &client, &url).await {
                                break 'session reason;
                            }
                        }
                        Err(ScError::Timeout(_)) => break 'session CloseReason::PingTimeout,
                        Err(e) => break 'session CloseReason::TransportError(e.to_string()),
                    }
                    poll = Box::pin(get_packets(&client, &url, Some(poll_timeout)));
                }
            }
        }
    };

    info!("polling session {} closed: {reason}", info.sid);
    sink.close(reason);
}
