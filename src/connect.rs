use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};

use crate::{io::ReadError, resolve_proxy_for_host, ProxyEndpoint, ProxyKind, Scheme};

#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error("No DNS records were present for this domain")]
    DnsNameNotResolved,

    #[error("Input/Output fail")]
    IO(#[from] std::io::Error),

    #[error("SOCKS tunnel failed to connect")]
    Socks(#[from] fast_socks5::SocksError),

    #[error("SOCKS4 request rejected with code {code:#04x}")]
    Socks4Rejected { code: u8 },

    #[error("SOCKS4 cannot reach IPv6 targets")]
    Socks4Ipv6Unsupported,

    #[error("Proxy closed the connection during handshake")]
    HandshakeInterrupted(#[from] ReadError),

    #[error("Authentication method is unacceptable")]
    AuthMethodUnacceptable,

    #[error("Wrong protocol used")]
    WrongProtocol,

    #[error("Passed connection domain is too long")]
    ExceededMaxDomainLen,

    #[error("`{0}` is not a valid TLS server name")]
    InvalidServerName(String),

    #[error("TLS handshake failed")]
    Tls(#[source] std::io::Error),

    #[error("Connection was not established in time")]
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Target of a connection, in form of DNS name or socket's IP Address
pub enum NetworkTarget {
    Domain { domain: String, port: u16 },
    IPAddr { socket: SocketAddr },
}

impl NetworkTarget {
    /// IP literals (bracketed or not) become [`NetworkTarget::IPAddr`], everything else a domain
    pub fn new(host: &str, port: u16) -> Self {
        let bare = host
            .strip_prefix('[')
            .and_then(|host| host.strip_suffix(']'))
            .unwrap_or(host);
        match bare.parse::<std::net::IpAddr>() {
            Ok(ip) => NetworkTarget::IPAddr {
                socket: SocketAddr::new(ip, port),
            },
            Err(_) => NetworkTarget::Domain {
                domain: host.to_owned(),
                port,
            },
        }
    }

    pub fn host(&self) -> String {
        match &self {
            NetworkTarget::Domain { domain, .. } => domain.clone(),
            NetworkTarget::IPAddr { socket } => socket.ip().to_string(),
        }
    }

    pub fn port(&self) -> u16 {
        match &self {
            NetworkTarget::Domain { port, .. } => *port,
            NetworkTarget::IPAddr { socket } => socket.port(),
        }
    }

    async fn resolve(self, prefer_v4: bool) -> Result<Self, ConnectError> {
        let (domain, port) = match self {
            NetworkTarget::Domain { domain, port } => (domain, port),
            ip => return Ok(ip),
        };
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((domain.as_str(), port))
            .await?
            .collect();
        let picked = if prefer_v4 {
            addrs.iter().find(|addr| addr.is_ipv4()).or(addrs.first())
        } else {
            addrs.first()
        };
        let socket = *picked.ok_or(ConnectError::DnsNameNotResolved)?;
        tracing::trace!(%domain, %socket, "resolved target locally");
        Ok(NetworkTarget::IPAddr { socket })
    }
}

impl std::fmt::Display for NetworkTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self {
            NetworkTarget::Domain { domain, port } => {
                f.write_fmt(format_args!("{}:{}", domain, port))
            }
            NetworkTarget::IPAddr { socket } => f.write_str(&socket.to_string()),
        }
    }
}

/// Per-connection settings
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Upper bound for TCP connect, proxy handshake and TLS handshake together
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    /// Look domain targets up locally and hand the proxy an address instead of a name
    #[serde(default)]
    pub resolve_locally: bool,
}

trait BiConnection: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> BiConnection for T {}
trait ProxyProto {
    async fn new(
        target: NetworkTarget,
        proxy_stream: TcpStream,
    ) -> Result<Box<dyn BiConnection>, ConnectError>;
}

mod socks5_proto {
    use fast_socks5::{client::Config, util::target_addr::TargetAddr};
    use tokio::net::TcpStream;

    use super::{BiConnection, ConnectError, NetworkTarget, ProxyProto};

    impl From<NetworkTarget> for TargetAddr {
        fn from(val: NetworkTarget) -> Self {
            match val {
                NetworkTarget::Domain { domain, port } => TargetAddr::Domain(domain, port),
                NetworkTarget::IPAddr { socket } => TargetAddr::Ip(socket),
            }
        }
    }

    pub struct Socks5Protocol;
    impl ProxyProto for Socks5Protocol {
        async fn new(
            target: NetworkTarget,
            proxy_stream: TcpStream,
        ) -> Result<Box<dyn BiConnection>, ConnectError> {
            let stream =
                fast_socks5::client::Socks5Stream::use_stream(proxy_stream, None, Config::default())
                    .await;

            let mut stream = match stream {
                Ok(stream) => stream,
                Err(error) => match error {
                    fast_socks5::SocksError::AuthMethodUnacceptable(_) => {
                        return Err(ConnectError::AuthMethodUnacceptable);
                    }
                    fast_socks5::SocksError::UnsupportedSocksVersion(_) => {
                        return Err(ConnectError::WrongProtocol);
                    }

                    err => return Err(err.into()),
                },
            };

            let command_result = stream
                .request(fast_socks5::Socks5Command::TCPConnect, target.into())
                .await;

            match command_result {
                Ok(_) => Ok(Box::new(stream)),
                Err(fast_socks5::SocksError::ExceededMaxDomainLen(_)) => {
                    Err(ConnectError::ExceededMaxDomainLen)
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}

mod socks4_proto {
    use std::net::IpAddr;

    use tokio::{
        io::{AsyncRead, AsyncWrite, AsyncWriteExt},
        net::TcpStream,
    };

    use crate::io::read_exact_bytes;

    use super::{BiConnection, ConnectError, NetworkTarget, ProxyProto};

    const VERSION: u8 = 4;
    const CMD_CONNECT: u8 = 1;
    const REPLY_GRANTED: u8 = 0x5A;
    const MAX_DOMAIN_LEN: usize = 255;

    /// CONNECT request; domains are sent SOCKS4a style behind the `0.0.0.1` marker address
    pub(super) fn request(target: &NetworkTarget) -> Result<Vec<u8>, ConnectError> {
        let mut request = vec![VERSION, CMD_CONNECT];
        request.extend_from_slice(&target.port().to_be_bytes());

        match target {
            NetworkTarget::IPAddr { socket } => match socket.ip() {
                IpAddr::V4(ip) => {
                    request.extend_from_slice(&ip.octets());
                    request.push(0);
                }
                IpAddr::V6(_) => return Err(ConnectError::Socks4Ipv6Unsupported),
            },
            NetworkTarget::Domain { domain, .. } => {
                if domain.len() > MAX_DOMAIN_LEN {
                    return Err(ConnectError::ExceededMaxDomainLen);
                }
                request.extend_from_slice(&[0, 0, 0, 1]);
                request.push(0);
                request.extend_from_slice(domain.as_bytes());
                request.push(0);
            }
        }
        Ok(request)
    }

    pub(super) async fn handshake<S>(stream: &mut S, target: &NetworkTarget) -> Result<(), ConnectError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream.write_all(&request(target)?).await?;

        // VN, CD, DSTPORT(2), DSTIP(4)
        let reply = read_exact_bytes(stream, 8).await?;
        if reply[0] != 0 && reply[0] != VERSION {
            return Err(ConnectError::WrongProtocol);
        }
        match reply[1] {
            REPLY_GRANTED => Ok(()),
            code => Err(ConnectError::Socks4Rejected { code }),
        }
    }

    pub struct Socks4Protocol;
    impl ProxyProto for Socks4Protocol {
        async fn new(
            target: NetworkTarget,
            mut proxy_stream: TcpStream,
        ) -> Result<Box<dyn BiConnection>, ConnectError> {
            handshake(&mut proxy_stream, &target).await?;
            Ok(Box::new(proxy_stream))
        }
    }
}

mod tls {
    use std::sync::{Arc, LazyLock};

    use rustls::{pki_types::ServerName, ClientConfig, RootCertStore};
    use tokio_rustls::TlsConnector;

    use super::{BiConnection, ConnectError, NetworkTarget};

    static CLIENT_CONFIG: LazyLock<Arc<ClientConfig>> = LazyLock::new(|| {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Arc::new(
            ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth(),
        )
    });

    pub(super) fn default_config() -> Arc<ClientConfig> {
        CLIENT_CONFIG.clone()
    }

    pub(super) fn server_name(target: &NetworkTarget) -> Result<ServerName<'static>, ConnectError> {
        match target {
            NetworkTarget::IPAddr { socket } => Ok(ServerName::from(socket.ip())),
            NetworkTarget::Domain { domain, .. } => ServerName::try_from(domain.clone())
                .map_err(|_| ConnectError::InvalidServerName(domain.clone())),
        }
    }

    pub(super) async fn wrap(
        config: Arc<ClientConfig>,
        name: ServerName<'static>,
        stream: Box<dyn BiConnection>,
    ) -> Result<Box<dyn BiConnection>, ConnectError> {
        let stream = TlsConnector::from(config)
            .connect(name, stream)
            .await
            .map_err(ConnectError::Tls)?;
        Ok(Box::new(stream))
    }
}

/// Open byte stream to the target, plain or TLS, direct or through a SOCKS proxy
///
/// Create using [`connect`] or [`connect_from_env`].
/// The socket is closed when the connection is dropped; [`Connection::close`]
/// additionally performs an orderly shutdown.
pub struct Connection {
    inner: Box<dyn BiConnection>,
    proxy: Option<ProxyEndpoint>,
}

impl Connection {
    /// Proxy this connection is tunneled through, if any
    pub fn proxy(&self) -> Option<&ProxyEndpoint> {
        self.proxy.as_ref()
    }

    pub fn is_proxied(&self) -> bool {
        self.proxy.is_some()
    }

    pub async fn close(mut self) -> std::io::Result<()> {
        self.inner.shutdown().await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<Result<usize, std::io::Error>> {
        std::pin::Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), std::io::Error>> {
        std::pin::Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), std::io::Error>> {
        std::pin::Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Connect to `target`, tunneling through `proxy` when given and adding TLS for
/// [`Scheme::Secure`]. Failures of every stage are returned, never retried.
pub async fn connect(
    target: NetworkTarget,
    scheme: Scheme,
    proxy: Option<&ProxyEndpoint>,
    options: &ConnectOptions,
) -> Result<Connection, ConnectError> {
    let tls_config = scheme.is_secure().then(tls::default_config);
    connect_with(target, tls_config, proxy, options).await
}

/// Resolve the proxy for `scheme` from the process environment, honour `NO_PROXY`
/// for the target host, then [`connect`].
pub async fn connect_from_env(
    target: NetworkTarget,
    scheme: Scheme,
    options: &ConnectOptions,
) -> Result<Connection, ConnectError> {
    let proxy = resolve_proxy_for_host(scheme, &target.host());
    connect(target, scheme, proxy.as_ref(), options).await
}

async fn connect_with(
    target: NetworkTarget,
    tls_config: Option<Arc<rustls::ClientConfig>>,
    proxy: Option<&ProxyEndpoint>,
    options: &ConnectOptions,
) -> Result<Connection, ConnectError> {
    let establish = establish(target, tls_config, proxy, options);
    match options.timeout {
        Some(limit) => tokio::time::timeout(limit, establish)
            .await
            .map_err(|_| ConnectError::TimedOut)?,
        None => establish.await,
    }
}

async fn establish(
    target: NetworkTarget,
    tls_config: Option<Arc<rustls::ClientConfig>>,
    proxy: Option<&ProxyEndpoint>,
    options: &ConnectOptions,
) -> Result<Connection, ConnectError> {
    let server_name = match tls_config {
        Some(config) => Some((config, tls::server_name(&target)?)),
        None => None,
    };

    let stream: Box<dyn BiConnection> = match proxy {
        None => {
            tracing::debug!(%target, "connecting directly");
            Box::new(match &target {
                NetworkTarget::Domain { domain, port } => {
                    TcpStream::connect((domain.as_str(), *port)).await?
                }
                NetworkTarget::IPAddr { socket } => TcpStream::connect(socket).await?,
            })
        }
        Some(proxy) => {
            tracing::debug!(%target, %proxy, "connecting through proxy");
            let proxy_host = proxy
                .host
                .strip_prefix('[')
                .and_then(|host| host.strip_suffix(']'))
                .unwrap_or(&proxy.host);
            let proxy_stream = TcpStream::connect((proxy_host, proxy.port)).await?;

            let target = if options.resolve_locally {
                target.resolve(proxy.kind == ProxyKind::Socks4).await?
            } else {
                target
            };
            match proxy.kind {
                ProxyKind::Socks5 => socks5_proto::Socks5Protocol::new(target, proxy_stream).await?,
                ProxyKind::Socks4 => socks4_proto::Socks4Protocol::new(target, proxy_stream).await?,
            }
        }
    };

    let inner = match server_name {
        Some((config, name)) => {
            tracing::trace!(?name, "starting TLS handshake");
            tls::wrap(config, name, stream).await?
        }
        None => stream,
    };

    Ok(Connection {
        inner,
        proxy: proxy.cloned(),
    })
}
