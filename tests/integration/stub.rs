//! A minimal stand-in for the ClickHouse HTTP interface.
//!
//! Each accepted socket serves exactly one request and then closes, so
//! every request the client makes is captured in order.

use std::io::Read;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Body of the version probe sent on open.
pub const PROBE_SQL: &str = "SELECT version() FORMAT TSV";

/// A request as received by the stub.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The SQL body, decompressed if the client gzipped it.
    pub fn sql(&self) -> String {
        if self.header("content-encoding") == Some("gzip") {
            let mut sql = String::new();
            flate2::read::GzDecoder::new(self.body.as_slice())
                .read_to_string(&mut sql)
                .expect("request body should be valid gzip");
            sql
        } else {
            String::from_utf8_lossy(&self.body).into_owned()
        }
    }

    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let url = url::Url::parse(&format!("http://stub{}", self.target))
            .expect("request target should be a valid path");
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn is_probe(&self) -> bool {
        self.sql() == PROBE_SQL
    }
}

/// What the stub sends back.
#[derive(Debug, Clone)]
pub struct StubResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    delay: Option<Duration>,
}

impl StubResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            delay: None,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Waits before writing the response.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A running stub server bound to a random local port.
pub struct StubServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl StubServer {
    /// Starts a server that answers every request with `handler`.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&CapturedRequest) -> StubResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("stub should bind to a local port");
        let addr = listener.local_addr().expect("bound listener has an address");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let handler = Arc::new(handler);
        let captured = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let captured = Arc::clone(&captured);
                tokio::spawn(async move {
                    let _ = serve(socket, handler.as_ref(), &captured).await;
                });
            }
        });

        Self { addr, requests }
    }

    /// Starts a server that answers the version probe with `version` and
    /// every other request with `handler`.
    pub async fn clickhouse<F>(version: &'static str, handler: F) -> Self
    where
        F: Fn(&CapturedRequest) -> StubResponse + Send + Sync + 'static,
    {
        Self::start(move |req| {
            if req.is_probe() {
                StubResponse::ok(format!("{version}\n"))
            } else {
                handler(req)
            }
        })
        .await
    }

    /// Connection string for this server, uncompressed, plus `extra` pairs.
    pub fn connection_string(&self, extra: &str) -> String {
        format!(
            "Host=127.0.0.1;Port={};Compression=false;{extra}",
            self.addr.port()
        )
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().expect("request log lock").clone()
    }

    /// Requests other than the version probe.
    pub fn queries(&self) -> Vec<CapturedRequest> {
        self.requests().into_iter().filter(|r| !r.is_probe()).collect()
    }

    pub fn probe_count(&self) -> usize {
        self.requests().iter().filter(|r| r.is_probe()).count()
    }
}

async fn serve<F>(
    mut socket: TcpStream,
    handler: &F,
    captured: &Mutex<Vec<CapturedRequest>>,
) -> std::io::Result<()>
where
    F: Fn(&CapturedRequest) -> StubResponse,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    let request = CapturedRequest {
        method,
        target,
        headers,
        body,
    };
    let response = handler(&request);
    captured.lock().expect("request log lock").push(request);

    if let Some(delay) = response.delay {
        tokio::time::sleep(delay).await;
    }

    let reason = if response.status < 400 { "OK" } else { "Error" };
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        reason,
        response.body.len()
    );
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");

    socket.write_all(head.as_bytes()).await?;
    socket.write_all(&response.body).await?;
    socket.shutdown().await
}
