//! Minimal HTTP/1.1 request parsing for the local command server
//!
//! Only what controllers send is understood: a request line, headers and an
//! optional body announced by `Content-Length`. Both the head and the body are
//! bounded; anything larger is rejected before it is buffered.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{Error, Result};

/// Default bound on the request line plus headers
pub const MAX_HEAD_BYTES: usize = 8 * 1024;

/// Default bound on the request body
pub const MAX_BODY_BYTES: usize = 256 * 1024;

/// Size bounds applied while reading a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of the request line plus headers
    pub max_head: usize,
    /// Maximum accepted `Content-Length`
    pub max_body: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_head: MAX_HEAD_BYTES,
            max_body: MAX_BODY_BYTES,
        }
    }
}

/// Request method
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `DELETE`
    Delete,
    /// Anything else, as sent
    Other(String),
}

impl Method {
    fn parse(token: &str) -> Self {
        match token {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "DELETE" => Self::Delete,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Parsed request line and the headers the server cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Head {
    /// Request method
    pub method: Method,
    /// Request target as sent
    pub path: String,
    /// Announced body length, zero when absent
    pub content_length: usize,
    /// Bytes taken by the head including the blank line
    pub head_len: usize,
}

/// A complete request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request method
    pub method: Method,
    /// Request target as sent
    pub path: String,
    /// Exactly `Content-Length` bytes of body
    pub body: Bytes,
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4);
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| i + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Parse the head at the start of `buf`
///
/// Returns `Ok(None)` while the blank line ending the head has not arrived.
pub fn parse_head(buf: &[u8], limits: &Limits) -> Result<Option<Head>> {
    let Some(head_len) = find_head_end(buf) else {
        if buf.len() > limits.max_head {
            return Err(Error::HeadTooLarge {
                limit: limits.max_head,
            });
        }
        return Ok(None);
    };
    if head_len > limits.max_head {
        return Err(Error::HeadTooLarge {
            limit: limits.max_head,
        });
    }

    let text = std::str::from_utf8(&buf[..head_len])
        .map_err(|_| Error::MalformedRequest("head is not UTF-8"))?;
    let mut lines = text.lines().map(|line| line.trim_end_matches('\r'));

    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .map(Method::parse)
        .ok_or(Error::MalformedRequest("empty request line"))?;
    let path = parts
        .next()
        .ok_or(Error::MalformedRequest("missing request target"))?
        .to_string();

    let mut content_length = 0;
    for line in lines.filter(|line| !line.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or(Error::MalformedRequest("header without colon"))?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            content_length = value
                .trim()
                .parse()
                .map_err(|_| Error::MalformedRequest("invalid Content-Length"))?;
            if content_length > limits.max_body {
                return Err(Error::BodyTooLarge {
                    length: content_length,
                    limit: limits.max_body,
                });
            }
        }
    }

    Ok(Some(Head {
        method,
        path,
        content_length,
        head_len,
    }))
}

/// Read one request from `reader`
pub async fn read_request<R>(reader: &mut R, limits: &Limits) -> Result<Request>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    let head = loop {
        if let Some(head) = parse_head(&buf, limits)? {
            break head;
        }
        if reader.read_buf(&mut buf).await? == 0 {
            return Err(Error::UnexpectedEof);
        }
    };
    trace!(method = ?head.method, path = %head.path, length = head.content_length, "Request head");

    let mut body = buf.split_off(head.head_len);
    while body.len() < head.content_length {
        if reader.read_buf(&mut body).await? == 0 {
            return Err(Error::UnexpectedEof);
        }
    }
    body.truncate(head.content_length);

    Ok(Request {
        method: head.method,
        path: head.path,
        body: body.freeze(),
    })
}

/// Serialize a plain-text response that closes the connection
pub fn response_bytes(status: u16, reason: &str, body: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(body);
    out
}

/// Write a plain-text response
pub async fn write_response<W>(writer: &mut W, status: u16, reason: &str, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&response_bytes(status, reason, body)).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_head() {
        let raw = b"POST /cmd HTTP/1.1\r\nHost: x\r\ncontent-length: 5\r\n\r\nhello";
        let head = parse_head(raw, &Limits::default()).unwrap().unwrap();
        assert_eq!(head.method, Method::Post);
        assert_eq!(head.path, "/cmd");
        assert_eq!(head.content_length, 5);
        assert_eq!(&raw[head.head_len..], b"hello");

        assert!(parse_head(b"GET /STATUS HTTP/1.1\r\n", &Limits::default()).unwrap().is_none());
        let head = parse_head(b"GET /STATUS HTTP/1.1\n\n", &Limits::default()).unwrap().unwrap();
        assert_eq!(head.method, Method::Get);
    }

    #[test]
    fn test_parse_head_rejections() {
        let limits = Limits {
            max_head: 64,
            max_body: 16,
        };
        assert!(matches!(
            parse_head(b"POST / HTTP/1.1\r\nContent-Length: 17\r\n\r\n", &limits),
            Err(Error::BodyTooLarge { length: 17, .. })
        ));
        assert!(matches!(
            parse_head(b"POST / HTTP/1.1\r\nContent-Length: -1\r\n\r\n", &limits),
            Err(Error::MalformedRequest(_))
        ));
        assert!(matches!(
            parse_head(&[b'a'; 65], &limits),
            Err(Error::HeadTooLarge { limit: 64 })
        ));
        assert!(matches!(parse_head(b"\r\n\r\n", &limits), Err(Error::MalformedRequest(_))));
        assert!(matches!(
            parse_head(b"GET\r\n\r\n", &limits),
            Err(Error::MalformedRequest("missing request target"))
        ));
    }

    #[tokio::test]
    async fn test_read_request_across_chunks() {
        let (mut client, mut server) = tokio::io::duplex(16);
        let writer = tokio::spawn(async move {
            client
                .write_all(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123456789trailing")
                .await
                .unwrap();
        });
        let request = read_request(&mut server, &Limits::default()).await.unwrap();
        writer.await.unwrap();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.body.as_ref(), b"0123456789");
    }

    #[tokio::test]
    async fn test_read_request_truncated_body() {
        let mut raw: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123";
        assert!(matches!(
            read_request(&mut raw, &Limits::default()).await,
            Err(Error::UnexpectedEof)
        ));
    }

    #[test]
    fn test_response_bytes() {
        assert_eq!(
            response_bytes(200, "OK", b"OK"),
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK"
        );
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    proptest! {
        #[test]
        fn parse_head_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..2048)) {
            let _ = parse_head(&bytes, &Limits::default());
        }

        #[test]
        fn overlong_content_length_is_rejected(length in (MAX_BODY_BYTES + 1)..usize::MAX / 2) {
            let raw = format!("POST / HTTP/1.1\r\nContent-Length: {length}\r\n\r\n");
            let rejected = matches!(
                parse_head(raw.as_bytes(), &Limits::default()),
                Err(Error::BodyTooLarge { .. })
            );
            prop_assert!(rejected);
        }

        #[test]
        fn well_formed_posts_read_exact_body(
            path in "/[A-Za-z0-9/_-]{0,24}",
            body in prop::collection::vec(any::<u8>(), 0..512),
            extra in prop::collection::vec(any::<u8>(), 0..32),
        ) {
            let mut raw = format!("POST {path} HTTP/1.1\r\nContent-Length: {}\r\n\r\n", body.len()).into_bytes();
            raw.extend_from_slice(&body);
            raw.extend_from_slice(&extra);
            let mut reader: &[u8] = &raw;
            let request = block_on(read_request(&mut reader, &Limits::default())).unwrap();
            prop_assert_eq!(request.method, Method::Post);
            prop_assert_eq!(request.path, path);
            prop_assert_eq!(request.body.as_ref(), body.as_slice());
        }
    }
}
