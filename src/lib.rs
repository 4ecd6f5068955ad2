/*!
# `socksenv`
SOCKS proxy resolution from environment variables, plus an asynchronous connector

Includes:
- No `unsafe` code
- `HTTP_PROXY` / `HTTPS_PROXY` / `ALL_PROXY` lookup with case-insensitive names
- `NO_PROXY` bypass list
- SOCKS4a and SOCKS5 tunnels, optional TLS on top (see [`Connection`])

## How-to
Resolution is a plain function of a [`Scheme`] and an [`Environment`] snapshot.
[`resolve_proxy`] reads the process environment, [`resolve_proxy_in`] takes an
explicit snapshot:

```rust
use socksenv::{Environment, Scheme};

let env = Environment::from_pairs([("http_proxy", "socks5://proxy.example:1080")]);
let proxy = socksenv::resolve_proxy_in(Scheme::Plain, &env).unwrap();
assert_eq!(proxy.host, "proxy.example");
assert_eq!(proxy.port, 1080);
```

Values that are not SOCKS URIs are ignored rather than reported: a
`HTTP_PROXY=http://...` meant for some other tool simply means "no proxy" here.

To open a connection, call [`connect`] with the resolved endpoint, or
[`connect_from_env`] to do resolution, `NO_PROXY` filtering and connecting in one step.
*/

/// Kind of target connection; selects which proxy variables are consulted first.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Plain,
    Secure,
}

impl Scheme {
    pub fn from_secure(secure: bool) -> Self {
        if secure {
            Self::Secure
        } else {
            Self::Plain
        }
    }

    pub fn is_secure(self) -> bool {
        matches!(self, Self::Secure)
    }

    /// Well-known port for `http`/`https`
    pub fn default_port(self) -> u16 {
        match self {
            Self::Plain => 80,
            Self::Secure => 443,
        }
    }
}

/** SOCKS protocol version

Every scheme token beginning with `socks` is a SOCKS proxy. Tokens beginning
with `socks4` (`socks4`, `socks4a`) are spoken to as SOCKS4a, all others
(`socks`, `socks5`, `socks5h`, ...) as SOCKS5.
*/
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    Socks5,
    Socks4,
}

/**
Resolved proxy server to tunnel through

Produced only by successful resolution; "no proxy" is `None`, never an error.

 ## [`FromStr`](std::str::FromStr) Format

 `<socks-scheme>://host:port`

 Port is mandatory. Anything in front of `@` is dropped, credentials are not used.

```rust
use std::str::FromStr;

let proxy = socksenv::ProxyEndpoint::from_str("socks4://127.0.0.1:1234").unwrap();
assert_eq!(&proxy.host, "127.0.0.1");
assert_eq!(proxy.kind, socksenv::ProxyKind::Socks4);
```
*/
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
    pub kind: ProxyKind,
}

impl ProxyEndpoint {
    pub fn is_dns_addr(&self) -> bool {
        let bare = self
            .host
            .strip_prefix('[')
            .and_then(|host| host.strip_suffix(']'))
            .unwrap_or(&self.host);
        bare.parse::<std::net::IpAddr>().is_err()
    }

    pub fn is_ip_addr(&self) -> bool {
        !self.is_dns_addr()
    }

    /// Create a tunnel through this proxy to the target
    pub async fn connect(
        &self,
        target: NetworkTarget,
        scheme: Scheme,
        options: &ConnectOptions,
    ) -> Result<Connection, ConnectError> {
        connect::connect(target, scheme, Some(self), options).await
    }
}

pub mod env;
pub mod io;
pub mod no_proxy;
pub mod parse;
pub mod text;

mod connect;
mod resolve;

pub use connect::{connect, connect_from_env, ConnectError, ConnectOptions, Connection, NetworkTarget};
pub use env::Environment;
pub use no_proxy::{NoProxy, ProxyPolicy};
pub use resolve::{
    candidates, resolve_proxy, resolve_proxy_for_host, resolve_proxy_for_host_in, resolve_proxy_in,
};
