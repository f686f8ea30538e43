//! Phase-timed HTTP transport.
//!
//! The off-the-shelf clients hide the boundaries this harness measures, so
//! the exchange is driven by hand over a raw socket: resolve, connect,
//! optionally handshake, write, then read, stamping a clock between each
//! step. One connection per request with `Connection: close` keeps every
//! round's timing self-contained, with no pooling or keep-alive reuse to
//! smear the phases together.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::trace;

use crate::job::{Request, ResponseSummary, Round, Timing};

/// Errors surfaced by one request exchange.
///
/// All of these classify as transport failures: the executing worker logs
/// them and leaves the job's status untouched rather than marking it failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid url {url:?}: {message}")]
    InvalidUrl { url: String, message: &'static str },

    #[error("resolving {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no address found for {host}")]
    NoAddress { host: String },

    #[error("connecting to {address}: {source}")]
    Connect {
        address: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("tls handshake with {host}: {source}")]
    Handshake {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o during exchange: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("exchange exceeded {0:?}")]
    TimedOut(Duration),
}

/// The seam between the pipeline and the network.
///
/// Workers hold this as a trait object so tests can substitute a scripted
/// implementation with no sockets involved.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes one request and returns the timed round.
    async fn execute(&self, request: &Arc<Request>) -> Result<Round, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Http,
    Https,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    scheme: Scheme,
    host: String,
    port: u16,
    path: String,
}

/// Splits a URL into the pieces the exchange needs.
///
/// Only `http` and `https` schemes are accepted; the path defaults to `/`
/// and the port to the scheme default.
fn parse_target(url: &str) -> Result<Target, TransportError> {
    let invalid = |message| TransportError::InvalidUrl {
        url: url.to_string(),
        message,
    };

    let (scheme, rest) = if let Some(rest) = url.strip_prefix("http://") {
        (Scheme::Http, rest)
    } else if let Some(rest) = url.strip_prefix("https://") {
        (Scheme::Https, rest)
    } else {
        return Err(invalid("scheme must be http or https"));
    };

    let (authority, path) = match rest.find('/') {
        Some(index) => (&rest[..index], &rest[index..]),
        None => (rest, "/"),
    };
    if authority.is_empty() {
        return Err(invalid("missing host"));
    }

    let default_port = match scheme {
        Scheme::Http => 80,
        Scheme::Https => 443,
    };

    // IPv6 literals arrive bracketed; the brackets come off so the host
    // resolves, and go back on when the Host header is rendered.
    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| invalid("unterminated ipv6 literal"))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = match after.strip_prefix(':') {
            Some(port) => port.parse::<u16>().map_err(|_| invalid("invalid port"))?,
            None if after.is_empty() => default_port,
            None => return Err(invalid("junk after ipv6 literal")),
        };
        (host, port)
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(invalid("missing host"));
                }
                if host.contains(':') {
                    return Err(invalid("ipv6 hosts must be bracketed"));
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|_| invalid("invalid port"))?;
                (host, port)
            }
            None => (authority, default_port),
        }
    };

    Ok(Target {
        scheme,
        host: host.to_string(),
        port,
        path: path.to_string(),
    })
}

/// Renders the request head, terminated by the blank line.
///
/// `Host` and `Connection: close` are supplied unless the request already
/// carries them; `Content-Length` is derived from the body.
fn build_head(request: &Request, target: &Target) -> String {
    let mut head = format!("{} {} HTTP/1.1\r\n", request.method, target.path);

    let has = |name: &str| {
        request
            .headers
            .keys()
            .any(|key| key.eq_ignore_ascii_case(name))
    };

    if !has("host") {
        let default_port = matches!(
            (target.scheme, target.port),
            (Scheme::Http, 80) | (Scheme::Https, 443)
        );
        let host = if target.host.contains(':') {
            format!("[{}]", target.host)
        } else {
            target.host.clone()
        };
        if default_port {
            head.push_str(&format!("Host: {host}\r\n"));
        } else {
            head.push_str(&format!("Host: {}:{}\r\n", host, target.port));
        }
    }
    if !has("connection") {
        head.push_str("Connection: close\r\n");
    }
    for (name, value) in &request.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    if let Some(body) = &request.body {
        if !has("content-length") {
            head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
    }

    head.push_str("\r\n");
    head
}

trait IoStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> IoStream for T {}

/// Production transport: one phase-timed HTTP/1.1 exchange per call.
pub struct TracedClient {
    timeout: Duration,
    tls: TlsConnector,
}

impl TracedClient {
    /// Creates a client whose exchanges are bounded by `timeout` end to end.
    pub fn new(timeout: Duration) -> Self {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Self {
            timeout,
            tls: TlsConnector::from(Arc::new(config)),
        }
    }

    async fn exchange(&self, request: &Arc<Request>) -> Result<Round, TransportError> {
        let target = parse_target(&request.url)?;
        let start = Instant::now();

        let mut addresses = lookup_host((target.host.as_str(), target.port))
            .await
            .map_err(|source| TransportError::Resolve {
                host: target.host.clone(),
                source,
            })?;
        let address = addresses.next().ok_or_else(|| TransportError::NoAddress {
            host: target.host.clone(),
        })?;
        let resolved = Instant::now();

        let tcp = TcpStream::connect(address)
            .await
            .map_err(|source| TransportError::Connect { address, source })?;
        tcp.set_nodelay(true)?;
        let connected = Instant::now();

        // For plaintext targets the tls phase is exactly zero.
        let (mut stream, secured): (Box<dyn IoStream>, Instant) = match target.scheme {
            Scheme::Http => (Box::new(tcp), connected),
            Scheme::Https => {
                let name = ServerName::try_from(target.host.clone()).map_err(|_| {
                    TransportError::InvalidUrl {
                        url: request.url.clone(),
                        message: "host is not a valid tls server name",
                    }
                })?;
                let tls = self.tls.connect(name, tcp).await.map_err(|source| {
                    TransportError::Handshake {
                        host: target.host.clone(),
                        source,
                    }
                })?;
                (Box::new(tls), Instant::now())
            }
        };

        let head = build_head(request, &target);
        stream.write_all(head.as_bytes()).await?;
        if let Some(body) = &request.body {
            stream.write_all(body.as_bytes()).await?;
        }
        stream.flush().await?;
        let request_done = Instant::now();

        let mut chunk = [0u8; 8192];
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Err(TransportError::MalformedResponse(
                "connection closed before any response byte".to_string(),
            ));
        }
        let first_byte = Instant::now();
        let mut buf = chunk[..read].to_vec();

        let summary = loop {
            let mut headers = [httparse::EMPTY_HEADER; 64];
            let mut response = httparse::Response::new(&mut headers);
            match response.parse(&buf) {
                Ok(httparse::Status::Complete(_)) => {
                    let Some(status) = response.code else {
                        return Err(TransportError::MalformedResponse(
                            "response head without a status code".to_string(),
                        ));
                    };
                    let content_length = response
                        .headers
                        .iter()
                        .find(|header| header.name.eq_ignore_ascii_case("content-length"))
                        .and_then(|header| std::str::from_utf8(header.value).ok())
                        .and_then(|value| value.trim().parse::<u64>().ok());
                    break ResponseSummary {
                        status,
                        content_length,
                    };
                }
                Ok(httparse::Status::Partial) => {
                    let read = stream.read(&mut chunk).await?;
                    if read == 0 {
                        return Err(TransportError::MalformedResponse(
                            "connection closed inside the response head".to_string(),
                        ));
                    }
                    buf.extend_from_slice(&chunk[..read]);
                }
                Err(err) => {
                    return Err(TransportError::MalformedResponse(err.to_string()));
                }
            }
        };

        // The peer closes the connection, so EOF delimits the body.
        loop {
            let read = stream.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
        }
        let stop = Instant::now();

        trace!(
            url = %request.url,
            status = summary.status,
            duration_secs = (stop - start).as_secs_f64(),
            "exchange complete"
        );

        Ok(Round {
            request: Arc::clone(request),
            timing: Timing {
                start,
                stop,
                dns: resolved - start,
                connection: connected - resolved,
                tls: secured - connected,
                request: request_done - secured,
                delay: first_byte - request_done,
                response: stop - first_byte,
                duration: stop - start,
            },
            response: summary,
        })
    }
}

#[async_trait]
impl Transport for TracedClient {
    async fn execute(&self, request: &Arc<Request>) -> Result<Round, TransportError> {
        match timeout(self.timeout, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::TimedOut(self.timeout)),
        }
    }
}
