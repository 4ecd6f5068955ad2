use std::str::FromStr;

use http::Uri;

use crate::{ProxyEndpoint, ProxyKind, Scheme};

impl FromStr for ProxyKind {
    type Err = ParseError;
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let scheme = input.to_ascii_lowercase();
        if scheme.starts_with("socks4") {
            Ok(Self::Socks4)
        } else if scheme.starts_with("socks") {
            Ok(Self::Socks5)
        } else {
            Err(ParseError::UnsupportedScheme(input.to_owned()))
        }
    }
}

impl FromStr for Scheme {
    type Err = ParseError;
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "http" | "ws" => Ok(Self::Plain),
            "https" | "wss" => Ok(Self::Secure),

            _ => Err(ParseError::UnsupportedScheme(input.to_owned())),
        }
    }
}

impl std::fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.write_str(match self {
            Self::Socks4 => "socks4",
            Self::Socks5 => "socks5",
        })
    }
}

impl std::fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        if self.host.contains(':') && !self.host.starts_with('[') {
            f.write_fmt(format_args!("{}://[{}]:{}", self.kind, self.host, self.port))
        } else {
            f.write_fmt(format_args!("{}://{}:{}", self.kind, self.host, self.port))
        }
    }
}

/// Reason a proxy variable value was not usable
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Value is not a valid URI")]
    InvalidUri,

    #[error("URI has no scheme")]
    MissingScheme,

    #[error("Scheme `{0}` is not supported")]
    UnsupportedScheme(String),

    #[error("URI has no host")]
    MissingHost,

    #[error("URI has no port")]
    MissingPort,

    #[error("Failed to parse port")]
    InvalidPort,
}

impl FromStr for ProxyEndpoint {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let uri: Uri = input.trim().parse().map_err(|_| ParseError::InvalidUri)?;

        let kind = ProxyKind::from_str(uri.scheme_str().ok_or(ParseError::MissingScheme)?)?;

        let authority = uri.authority().ok_or(ParseError::MissingHost)?;
        let host = authority.host();
        if host.is_empty() {
            return Err(ParseError::MissingHost);
        }

        let port = authority.port().ok_or(ParseError::MissingPort)?;
        let port: u16 = port.as_str().parse().map_err(|_| ParseError::InvalidPort)?;

        Ok(Self {
            host: host.to_owned(),
            port,
            kind,
        })
    }
}
