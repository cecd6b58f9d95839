//! [`GatewayServer`] – TCP listener answering unlock requests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use doorlock_runtime::DeviceContext;
use doorlock_types::{DoorError, StatusLine};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Default TCP port for the unlock gateway.
pub const DEFAULT_PORT: u16 = 8080;

/// Upper bound on the request head (request line plus headers).
const MAX_HEAD_BYTES: usize = 8 * 1024;

/// A client that has not finished its request head by then is dropped.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// GatewayServer
// ---------------------------------------------------------------------------

pub struct GatewayServer {
    ctx: Arc<DeviceContext>,
    port: u16,
}

impl GatewayServer {
    /// Create a server answering from `ctx` on the [`DEFAULT_PORT`].
    pub fn new(ctx: Arc<DeviceContext>) -> Self {
        Self {
            ctx,
            port: DEFAULT_PORT,
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind `0.0.0.0:<port>` and serve until the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`DoorError::Bind`] if the TCP listener cannot bind.
    pub async fn run(self) -> Result<(), DoorError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| DoorError::Bind {
            addr: addr.to_string(),
            details: e.to_string(),
        })?;
        info!(%addr, "unlock gateway listening");
        serve(listener, self.ctx).await
    }
}

/// Accept connections on an already bound `listener`.
pub async fn serve(listener: TcpListener, ctx: Arc<DeviceContext>) -> Result<(), DoorError> {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let ctx = Arc::clone(&ctx);
                let span = info_span!("request", request_id = %Uuid::new_v4(), %peer);
                tokio::spawn(
                    async move {
                        if let Err(e) = handle_connection(stream, &ctx).await {
                            debug!(error = %e, "connection dropped");
                        }
                    }
                    .instrument(span),
                );
            }
            Err(e) => warn!(error = %e, "accept error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

async fn handle_connection(stream: TcpStream, ctx: &DeviceContext) -> Result<(), DoorError> {
    let mut reader = BufReader::new(stream);
    let head = tokio::time::timeout(READ_TIMEOUT, read_head(&mut reader))
        .await
        .map_err(|_| DoorError::Transport("request head timed out".to_string()))??;

    let status = match head {
        Some(head) => answer(&head, ctx),
        None => StatusLine::REQUEST_DENIED,
    };
    info!(status = status.code, reason = status.reason, "request answered");

    let mut stream = reader.into_inner();
    stream
        .write_all(render(status).as_bytes())
        .await
        .map_err(|e| DoorError::Transport(format!("response write error: {e}")))?;
    stream
        .shutdown()
        .await
        .map_err(|e| DoorError::Transport(format!("shutdown error: {e}")))
}

fn answer(head: &RequestHead, ctx: &DeviceContext) -> StatusLine {
    if head.method != "POST" {
        return StatusLine::METHOD_NOT_ALLOWED;
    }
    ctx.respond(head.query(), head.content_type.as_deref())
}

fn render(status: StatusLine) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status.code,
        status.reason,
        status.reason.len(),
        status.reason
    )
}

// ---------------------------------------------------------------------------
// Request head
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
struct RequestHead {
    method: String,
    target: String,
    content_type: Option<String>,
}

impl RequestHead {
    /// Everything after the first `?` in the request target.
    fn query(&self) -> &str {
        self.target.split_once('?').map_or("", |(_, q)| q)
    }
}

/// Read the request line and headers.  Returns `Ok(None)` for a head that is
/// too large, is not UTF-8 or does not look like HTTP.
///
/// At most `MAX_HEAD_BYTES + 1` bytes are consumed from `reader`.
async fn read_head<R>(reader: &mut BufReader<R>) -> Result<Option<RequestHead>, DoorError>
where
    R: AsyncRead + Unpin,
{
    let mut total = 0;
    let mut lines = Vec::new();
    loop {
        let budget = (MAX_HEAD_BYTES + 1 - total) as u64;
        let mut raw = Vec::new();
        let n = (&mut *reader)
            .take(budget)
            .read_until(b'\n', &mut raw)
            .await
            .map_err(|e| DoorError::Transport(format!("request read error: {e}")))?;
        if n == 0 {
            break;
        }
        total += n;
        if total > MAX_HEAD_BYTES {
            return Ok(None);
        }
        let Ok(line) = String::from_utf8(raw) else {
            return Ok(None);
        };
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        if line.is_empty() {
            break;
        }
        lines.push(line);
    }
    Ok(parse_head(&lines))
}

fn parse_head(lines: &[String]) -> Option<RequestHead> {
    let (request_line, headers) = lines.split_first()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }

    let content_type = headers.iter().find_map(|h| {
        let (name, value) = h.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("content-type")
            .then(|| value.trim().to_string())
    });

    Some(RequestHead {
        method,
        target,
        content_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use doorlock_hal::sim::SimRelay;
    use doorlock_kernel::{IdentityTable, ManualClock, TotpSecret, TotpVerifier};
    use doorlock_runtime::DeviceConfig;

    const SECRET: &str = "JBSWY3DPEHPK3PXP";

    fn lines(raw: &str) -> Vec<String> {
        raw.split("\r\n").map(str::to_string).collect()
    }

    // ── Parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn parses_method_target_and_content_type() {
        let head = parse_head(&lines(
            "POST /?alice:123456 HTTP/1.1\r\nHost: door\r\ncontent-TYPE: text/plain",
        ))
        .unwrap();
        assert_eq!(head.method, "POST");
        assert_eq!(head.query(), "alice:123456");
        assert_eq!(head.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn target_without_query_has_empty_query() {
        let head = parse_head(&lines("POST / HTTP/1.1")).unwrap();
        assert_eq!(head.query(), "");
        assert_eq!(head.content_type, None);
    }

    #[test]
    fn garbage_request_line_is_rejected() {
        assert!(parse_head(&lines("hello")).is_none());
        assert!(parse_head(&lines("POST /?a:1 SMTP")).is_none());
        assert!(parse_head(&[]).is_none());
    }

    #[test]
    fn rendered_response_carries_reason_as_body() {
        let raw = render(StatusLine::new(429, "Rate-Limited"));
        assert!(raw.starts_with("HTTP/1.1 429 Rate-Limited\r\n"));
        assert!(raw.contains("Content-Length: 12\r\n"));
        assert!(raw.ends_with("\r\n\r\nRate-Limited"));
    }

    #[tokio::test]
    async fn oversized_head_is_denied() {
        let raw = format!("POST /?{} HTTP/1.1\r\n\r\n", "a".repeat(MAX_HEAD_BYTES));
        let mut reader = BufReader::new(raw.as_bytes());
        assert_eq!(read_head(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn endless_request_line_stops_at_the_cap() {
        let raw = format!("POST /?{}", "a".repeat(4 * 1024 * 1024));
        let mut reader = BufReader::new(raw.as_bytes());
        assert_eq!(read_head(&mut reader).await.unwrap(), None);

        let unread = reader.get_ref().len() + reader.buffer().len();
        let consumed = raw.len() - unread;
        assert!(consumed <= MAX_HEAD_BYTES + 1, "consumed {consumed} bytes");
    }

    #[tokio::test]
    async fn non_utf8_head_is_denied() {
        let mut reader = BufReader::new(&b"POST /?alice:\xff\xfe HTTP/1.1\r\n\r\n"[..]);
        assert_eq!(read_head(&mut reader).await.unwrap(), None);
    }

    // ── Over the wire ─────────────────────────────────────────────────────────

    async fn start() -> (SocketAddr, Arc<DeviceContext>) {
        let mut identities = IdentityTable::new();
        identities.insert("alice", TotpSecret::from_base32(SECRET).unwrap());
        let config = DeviceConfig {
            identities,
            hold: Duration::from_millis(20),
            ..DeviceConfig::default()
        };
        let ctx = Arc::new(
            DeviceContext::new(config, SimRelay::new("door_strike"), Arc::new(ManualClock::new(0)))
                .unwrap(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, Arc::clone(&ctx)));
        (addr, ctx)
    }

    async fn send(addr: SocketAddr, request: &str) -> String {
        send_bytes(addr, request.as_bytes()).await
    }

    async fn send_bytes(addr: SocketAddr, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn unsynchronized_device_answers_503() {
        let (addr, _ctx) = start().await;
        let response = send(addr, "POST /?alice:123456 HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 503 Time-Not-Synchronized\r\n"));
    }

    #[tokio::test]
    async fn valid_code_over_the_wire_is_ok() {
        let (addr, ctx) = start().await;
        ctx.time().sync(1_700_000_000);
        let code = TotpVerifier::new(6, 30, 5)
            .code_at(1_700_000_000, &TotpSecret::from_base32(SECRET).unwrap());

        let response = send(addr, &format!("POST /?alice:{code} HTTP/1.1\r\n\r\n")).await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("OK"));
    }

    #[tokio::test]
    async fn content_type_gets_415_and_get_gets_405() {
        let (addr, _ctx) = start().await;
        let response = send(
            addr,
            "POST /?alice:123456 HTTP/1.1\r\nContent-Type: application/json\r\n\r\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 415 Request-Denied\r\n"));

        let response = send(addr, "GET /?alice:123456 HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 405 Method-Not-Allowed\r\n"));
    }

    #[tokio::test]
    async fn undecodable_request_gets_415() {
        let (addr, _ctx) = start().await;
        let response = send_bytes(addr, b"POST /?alice:\xff\xfe HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 415 Request-Denied\r\n"));
    }

    #[tokio::test]
    async fn unknown_identity_over_the_wire() {
        let (addr, _ctx) = start().await;
        let response = send(addr, "POST /?bob:123456 HTTP/1.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 404 Unknown-Id\r\n"));
    }
}
