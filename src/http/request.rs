//! Request-line parsing.
//!
//! # Responsibilities
//! - Tokenize the opening request line into method, target and version
//! - Resolve host, port and origin-relative path for absolute-form targets
//! - Resolve host and port for `CONNECT host:port` targets
//! - Rebuild the origin-form request sent to plain-HTTP upstreams

use crate::error::ProxyError;

const CONNECT: &str = "CONNECT";
const HTTP_PORT: u16 = 80;
const HTTPS_PORT: u16 = 443;

/// Request-line tokenizer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Method,
    Target,
    Version,
}

/// Borrowed view of the opening request line.
#[derive(Debug)]
struct RequestLine<'a> {
    method: &'a str,
    target: &'a str,
    /// Offset in the buffer of everything after the target, starting with
    /// the separating space when there is one.
    rest_at: usize,
}

impl<'a> RequestLine<'a> {
    /// Split the first line of `buf` on single spaces.
    ///
    /// Returns `Ok(None)` when there is no request line at all.
    fn tokenize(buf: &'a [u8]) -> Result<Option<Self>, ProxyError> {
        let line_end = buf
            .iter()
            .position(|&b| b == b'\r' || b == b'\n')
            .unwrap_or(buf.len());
        let line = &buf[..line_end];
        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let mut state = Token::Method;
        let mut method_end = line_end;
        let mut target_end = line_end;
        for (i, &byte) in line.iter().enumerate() {
            if byte != b' ' {
                continue;
            }
            match state {
                Token::Method => {
                    method_end = i;
                    state = Token::Target;
                }
                Token::Target => {
                    target_end = i;
                    state = Token::Version;
                    break;
                }
                Token::Version => break,
            }
        }

        if state == Token::Method {
            return Err(malformed("missing request target"));
        }

        let method = token_str(&line[..method_end])?;
        let target = token_str(&line[method_end + 1..target_end])?;
        if method.is_empty() || target.is_empty() {
            return Err(malformed("empty method or request target"));
        }

        Ok(Some(Self {
            method,
            target,
            rest_at: target_end,
        }))
    }
}

fn token_str(bytes: &[u8]) -> Result<&str, ProxyError> {
    std::str::from_utf8(bytes).map_err(|_| malformed("request line is not valid UTF-8"))
}

fn malformed(reason: impl Into<String>) -> ProxyError {
    ProxyError::MalformedRequest(reason.into())
}

/// What the proxy needs to know about a connection's opening request.
///
/// Built once from the first chunk the client sends and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub method: String,
    pub raw_target: String,
    pub host: String,
    pub port: u16,
    /// Origin-relative path; empty for CONNECT and for targets without a `/`.
    pub path: String,
    pub is_tunnel: bool,
    rest_at: usize,
}

impl PendingRequest {
    /// Parse the opening bytes of a client connection.
    ///
    /// `Ok(None)` means the client sent nothing resembling a request line and
    /// the connection should be dropped without a response.
    pub fn parse(buf: &[u8]) -> Result<Option<Self>, ProxyError> {
        let Some(line) = RequestLine::tokenize(buf)? else {
            return Ok(None);
        };

        let is_tunnel = line.method == CONNECT;
        let (host, port, path) = if is_tunnel {
            parse_connect_target(line.target)?
        } else {
            parse_absolute_target(line.target)?
        };

        if host.is_empty() {
            return Err(malformed(format!("no host in target '{}'", line.target)));
        }

        Ok(Some(Self {
            method: line.method.to_string(),
            raw_target: line.target.to_string(),
            host: host.to_string(),
            port,
            path: path.to_string(),
            is_tunnel,
            rest_at: line.rest_at,
        }))
    }

    /// `host:port` suitable for a socket connect.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Rewrite `raw` (the buffer this request was parsed from) so the request
    /// target is origin-relative. Method, version, headers and any body bytes
    /// are carried over unchanged.
    pub fn origin_form(&self, raw: &[u8]) -> Vec<u8> {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        let rest = raw.get(self.rest_at..).unwrap_or_default();

        let mut out = Vec::with_capacity(self.method.len() + 1 + path.len() + rest.len());
        out.extend_from_slice(self.method.as_bytes());
        out.push(b' ');
        out.extend_from_slice(path.as_bytes());
        out.extend_from_slice(rest);
        out
    }
}

/// `CONNECT host:port`: split on the last colon.
fn parse_connect_target(target: &str) -> Result<(&str, u16, &str), ProxyError> {
    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| malformed(format!("CONNECT target '{}' has no port", target)))?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    Ok((host, parse_port(port)?, ""))
}

/// Absolute-form target such as `http://host:port/path`.
fn parse_absolute_target(target: &str) -> Result<(&str, u16, &str), ProxyError> {
    let mut default_port = HTTP_PORT;
    let mut rest = target;
    if let Some((scheme, after)) = target.split_once("://") {
        if scheme.to_ascii_lowercase().contains("https") {
            default_port = HTTPS_PORT;
        }
        rest = after;
    }

    // The path boundary is the first '/' after the scheme, so a port never
    // leaks into the path.
    let (authority, path) = match rest.find('/') {
        Some(slash) => rest.split_at(slash),
        None => (rest, ""),
    };

    let (host, port) = split_authority(authority);
    let port = match port {
        Some(port) => parse_port(port)?,
        None => default_port,
    };
    Ok((host, port, path))
}

fn split_authority(authority: &str) -> (&str, Option<&str>) {
    if let Some(bracketed) = authority.strip_prefix('[') {
        if let Some(close) = bracketed.find(']') {
            return (&bracketed[..close], bracketed[close + 1..].strip_prefix(':'));
        }
    }
    match authority.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    }
}

fn parse_port(port: &str) -> Result<u16, ProxyError> {
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(format!("invalid port '{}'", port)));
    }
    port.parse()
        .map_err(|_| malformed(format!("port '{}' out of range", port)))
}
