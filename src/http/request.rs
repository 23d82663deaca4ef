use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Headers are capped to this many bytes before parsing gives up; well
/// beyond anything a well-formed request line + header block needs.
const MAX_HEAD_BYTES: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// IO error mid-parse. Per the framing contract this terminates the
    /// connection silently -- callers should not write a response.
    #[error("connection IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Request line had fewer than three whitespace-separated tokens, or the
    /// head block was not valid UTF-8. Callers respond `400`.
    #[error("malformed request line")]
    MalformedRequestLine,
    /// The header block exceeded `MAX_HEAD_BYTES` without terminating.
    #[error("request headers too large")]
    HeadersTooLarge,
}

#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub method: String,
    pub path: String,
    pub version: String,
    headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ParsedRequest {
    /// `Lamport-Clock` header, decimal integer, default 0 if missing or
    /// unparsable (§4.3).
    pub fn lamport_clock(&self) -> u64 {
        self.headers
            .get("lamport-clock")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// `Content-Length` header, decimal integer, default 0 if missing.
    pub fn content_length(&self) -> usize {
        self.headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

/// Finds the byte offset where the header block ends (right before the
/// blank-line separator) and the length of that separator. Accepts both
/// `\r\n\r\n` and a bare `\n\n`.
fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some((pos, 4));
    }
    buf.windows(2).position(|w| w == b"\n\n").map(|pos| (pos, 2))
}

/// Reads a request line, header block, and (for a nonzero `Content-Length`)
/// a fixed-length body from `stream` (§4.3).
pub async fn read_request<S>(stream: &mut S) -> Result<ParsedRequest, RequestError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let (head_end, sep_len) = loop {
        if let Some(found) = find_header_end(&buf) {
            break found;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(RequestError::HeadersTooLarge);
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(RequestError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before headers were complete",
            )));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = buf[..head_end].to_vec();
    let mut body = buf[head_end + sep_len..].to_vec();

    let head_str = std::str::from_utf8(&head).map_err(|_| RequestError::MalformedRequestLine)?;
    let mut lines = head_str.split('\n').map(|l| l.trim_end_matches('\r'));

    let request_line = lines.next().ok_or(RequestError::MalformedRequestLine)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or(RequestError::MalformedRequestLine)?;
    let path = parts.next().ok_or(RequestError::MalformedRequestLine)?;
    let version = parts.next().ok_or(RequestError::MalformedRequestLine)?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_owned());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(RequestError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before body was complete",
            )));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(ParsedRequest {
        method: method.to_owned(),
        path: path.to_owned(),
        version: version.to_owned(),
        headers,
        body,
    })
}
