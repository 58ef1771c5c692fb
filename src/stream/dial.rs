//! Connection lifecycle: resolve, connect, TLS handshake, WebSocket upgrade.
//!
//! The lifecycle is an explicit state machine. [`Phase::advance`] is the
//! single transition function; every step of the dial chain validates the
//! prior phase before selecting the next asynchronous operation, so a
//! completion arriving out of order is a checked condition rather than a
//! silent one.

use crate::error::StreamError;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, lookup_host};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream as ClientTlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

/// Stream target: host, port, resource path, and whether the transport is
/// TLS-wrapped. Immutable for the life of a client instance.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Resource path for the upgrade handshake, e.g. `/iex`.
    pub path: String,
    pub tls: bool,
}

impl Endpoint {
    /// URL form used by the upgrade request.
    pub fn url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        format!("{}://{}:{}{}", scheme, self.host, self.port, self.path)
    }
}

/// Connection lifecycle state.
///
/// `Stopping` and `Closed` are terminal; `Closed` is reachable from any
/// non-terminal state (watchdog fire or forced close severs the transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Resolving,
    Connecting,
    TlsHandshaking,
    Upgrading,
    Connected,
    Stopping,
    Closed,
}

impl Phase {
    /// Validate and perform a transition. Plaintext endpoints skip the TLS
    /// handshake, so `Connecting -> Upgrading` is legal directly.
    pub fn advance(self, next: Phase) -> Result<Phase, StreamError> {
        use Phase::*;
        let legal = matches!(
            (self, next),
            (Idle, Resolving)
                | (Resolving, Connecting)
                | (Connecting, TlsHandshaking | Upgrading)
                | (TlsHandshaking, Upgrading)
                | (Upgrading, Connected)
                | (Connected, Stopping)
                | (
                    Idle | Resolving | Connecting | TlsHandshaking | Upgrading | Connected
                        | Stopping,
                    Closed,
                )
        );
        if legal {
            Ok(next)
        } else {
            Err(StreamError::IllegalTransition { from: self, to: next })
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Stopping | Phase::Closed)
    }
}

/// Transport under the WebSocket layer: plaintext TCP or rustls client TLS.
pub enum StreamTransport {
    Plain(TcpStream),
    Tls(ClientTlsStream<TcpStream>),
}

impl StreamTransport {
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for StreamTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            StreamTransport::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            StreamTransport::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for StreamTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            StreamTransport::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            StreamTransport::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            StreamTransport::Plain(stream) => Pin::new(stream).poll_flush(cx),
            StreamTransport::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            StreamTransport::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            StreamTransport::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl Unpin for StreamTransport {}

/// The upgraded, message-framed stream.
pub type WsStream = WebSocketStream<StreamTransport>;

/// Drives one connection attempt through the lifecycle phases.
///
/// A `Dialer` runs exactly once; dropping the in-flight [`Dialer::dial`]
/// future severs whatever partial transport exists, which is how the
/// watchdog aborts a stalled attempt.
pub struct Dialer {
    endpoint: Endpoint,
    phase: Phase,
}

impl Dialer {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn transition(&mut self, next: Phase) -> Result<(), StreamError> {
        self.phase = self.phase.advance(next)?;
        debug!(phase = ?self.phase, "lifecycle phase");
        Ok(())
    }

    /// Run the full resolve-through-upgrade chain. Any failure is terminal
    /// for this attempt; the caller decides whether to construct a new one.
    pub async fn dial(mut self) -> Result<(WsStream, Dialer), StreamError> {
        self.transition(Phase::Resolving)?;
        let addrs: Vec<_> = lookup_host((self.endpoint.host.as_str(), self.endpoint.port))
            .await
            .map_err(StreamError::Resolve)?
            .collect();
        if addrs.is_empty() {
            return Err(StreamError::NoAddresses(self.endpoint.host.clone()));
        }

        self.transition(Phase::Connecting)?;
        let mut last_err = None;
        let mut tcp = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    debug!(addr = %addr, "transport connected");
                    tcp = Some(stream);
                    break;
                }
                Err(e) => {
                    debug!(addr = %addr, error = %e, "endpoint unreachable");
                    last_err = Some(e);
                }
            }
        }
        let tcp = match (tcp, last_err) {
            (Some(stream), _) => stream,
            (None, Some(e)) => return Err(StreamError::Connect(e)),
            (None, None) => return Err(StreamError::NoAddresses(self.endpoint.host.clone())),
        };

        let transport = if self.endpoint.tls {
            self.transition(Phase::TlsHandshaking)?;
            StreamTransport::Tls(upgrade_to_tls(tcp, &self.endpoint.host).await?)
        } else {
            StreamTransport::Plain(tcp)
        };
        debug!(tls = transport.is_tls(), "transport ready");

        self.transition(Phase::Upgrading)?;
        let (ws, response) = tokio_tungstenite::client_async(self.endpoint.url(), transport)
            .await
            .map_err(StreamError::Upgrade)?;
        debug!(status = %response.status(), "upgrade handshake accepted");

        self.transition(Phase::Connected)?;
        info!(host = %self.endpoint.host, port = self.endpoint.port, tls = self.endpoint.tls, "connected");
        Ok((ws, self))
    }
}

/// Wrap an established TCP stream in client TLS using the platform trust
/// store.
async fn upgrade_to_tls(
    tcp: TcpStream,
    hostname: &str,
) -> Result<ClientTlsStream<TcpStream>, StreamError> {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for cert in native.certs {
        if let Err(e) = roots.add(cert) {
            warn!(error = %e, "failed to add root cert");
        }
    }
    for e in &native.errors {
        warn!(error = %e, "error loading native certs");
    }

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| StreamError::ServerName(hostname.to_string()))?;

    connector
        .connect(server_name, tcp)
        .await
        .map_err(StreamError::Tls)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(phases: &[Phase]) -> Result<Phase, StreamError> {
        let mut current = phases[0];
        for next in &phases[1..] {
            current = current.advance(*next)?;
        }
        Ok(current)
    }

    #[test]
    fn tls_lifecycle_is_legal() {
        use Phase::*;
        let end = walk(&[
            Idle,
            Resolving,
            Connecting,
            TlsHandshaking,
            Upgrading,
            Connected,
            Stopping,
            Closed,
        ])
        .expect("full TLS chain should be legal");
        assert_eq!(end, Closed);
    }

    #[test]
    fn plaintext_lifecycle_skips_tls() {
        use Phase::*;
        walk(&[Idle, Resolving, Connecting, Upgrading, Connected])
            .expect("plaintext chain should skip the TLS phase");
    }

    #[test]
    fn skipping_phases_is_rejected() {
        assert!(Phase::Idle.advance(Phase::Connected).is_err());
        assert!(Phase::Resolving.advance(Phase::Upgrading).is_err());
        assert!(Phase::Upgrading.advance(Phase::Resolving).is_err());
    }

    #[test]
    fn forced_close_is_legal_from_any_non_terminal_state() {
        use Phase::*;
        for phase in [Idle, Resolving, Connecting, TlsHandshaking, Upgrading, Connected, Stopping] {
            phase
                .advance(Closed)
                .unwrap_or_else(|e| panic!("forced close from {:?} rejected: {}", phase, e));
        }
    }

    #[test]
    fn closed_is_terminal() {
        assert!(Phase::Closed.is_terminal());
        assert!(Phase::Closed.advance(Phase::Resolving).is_err());
        assert!(Phase::Closed.advance(Phase::Closed).is_err());
    }

    #[test]
    fn endpoint_url_reflects_tls() {
        let mut ep = Endpoint {
            host: "stream.example.com".to_string(),
            port: 443,
            path: "/iex".to_string(),
            tls: true,
        };
        assert_eq!(ep.url(), "wss://stream.example.com:443/iex");
        ep.tls = false;
        ep.port = 9090;
        assert_eq!(ep.url(), "ws://stream.example.com:9090/iex");
    }
}
