//! `rtmp://host[:port]/app[/stream]` parsing.

use std::fmt;
use std::io;
use std::net::{Ipv6Addr, SocketAddr, ToSocketAddrs};

use crate::error::PublishError;

/// Port used when the URL does not name one.
pub const DEFAULT_RTMP_PORT: u16 = 1935;

/// A parsed publish target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmpUrl {
    pub host: String,
    pub port: u16,
    /// Application name, the first path segment.
    pub app: String,
    /// Everything after the application segment; may be empty.
    pub stream_name: String,
}

impl RtmpUrl {
    pub fn parse(url: &str) -> Result<Self, PublishError> {
        let invalid = |reason| PublishError::InvalidUrl {
            url: url.to_string(),
            reason,
        };

        let rest = url
            .trim()
            .strip_prefix("rtmp://")
            .ok_or_else(|| invalid("scheme must be rtmp://"))?;
        let (authority, path) = rest
            .split_once('/')
            .ok_or_else(|| invalid("missing application path"))?;

        // `[v6]` or `[v6]:port`; the brackets are not part of the host.
        let (host, port) = match authority.strip_prefix('[') {
            Some(bracketed) => {
                let (host, rest) = bracketed
                    .split_once(']')
                    .ok_or_else(|| invalid("unterminated IPv6 literal"))?;
                if host.parse::<Ipv6Addr>().is_err() {
                    return Err(invalid("bad IPv6 literal"));
                }
                (host, rest)
            }
            None => match authority.find(':') {
                Some(at) => authority.split_at(at),
                None => (authority, ""),
            },
        };
        let port = match port {
            "" => DEFAULT_RTMP_PORT,
            port => port
                .strip_prefix(':')
                .and_then(|p| p.parse::<u16>().ok())
                .ok_or_else(|| invalid("bad port"))?,
        };
        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        if port == 0 {
            return Err(invalid("bad port"));
        }

        let (app, stream_name) = path.split_once('/').unwrap_or((path, ""));
        if app.is_empty() {
            return Err(invalid("empty application name"));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            app: app.to_string(),
            stream_name: stream_name.to_string(),
        })
    }

    /// `/app/stream` as sent in the RTMP `connect`/`publish` commands.
    pub fn stream_path(&self) -> String {
        if self.stream_name.is_empty() {
            format!("/{}", self.app)
        } else {
            format!("/{}/{}", self.app, self.stream_name)
        }
    }

    /// `host:port` (`[v6]:port` for IPv6 literals), for logs and error
    /// messages.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Resolve the host to socket addresses.
    pub fn socket_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        Ok((self.host.as_str(), self.port).to_socket_addrs()?.collect())
    }
}

impl fmt::Display for RtmpUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rtmp://{}{}", self.authority(), self.stream_path())
    }
}
