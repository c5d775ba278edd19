//! Minimal HTTP/1.1 plumbing for the API server
//!
//! Requests are read off any async byte stream, routed synchronously against a
//! `DataService` and answered with a JSON body that has been through the
//! numeric safety encoder.

use crate::config::ServerConfig;
use crate::error::{EngineError, Result};
use crate::safe_json::to_safe_vec;
use crate::service::{AggregateRequest, DataService, FilterRequest, PlotRequest};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, warn};

const MAX_HEAD_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    /// Lowercased header names
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match to_safe_vec(value) {
            Ok(body) => Self {
                status,
                headers: Vec::new(),
                body,
            },
            Err(e) => {
                error!("Failed to encode response: {}", e);
                Self::detail(500, &format!("Failed to encode response: {}", e))
            }
        }
    }

    pub fn detail(status: u16, message: &str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: json!({ "detail": message }).to_string().into_bytes(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn from_error(context: &str, err: &EngineError) -> Self {
        let status = err.status_code();
        if status >= 500 {
            error!("{} failed: {}", context, err);
        } else {
            debug!("{} rejected: {}", context, err);
        }
        // Ingestion errors already read as a complete sentence
        match err {
            EngineError::NoDatasetFound
            | EngineError::UnsupportedFormat(_)
            | EngineError::ParseError(_)
            | EngineError::InvalidArchive(_)
            | EngineError::EmptyArchive => Self::detail(status, &err.to_string()),
            _ => Self::detail(status, &format!("{}: {}", context, err)),
        }
    }

    fn from_result<T: Serialize>(context: &str, result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::json(200, &value),
            Err(e) => Self::from_error(context, &e),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            reason_phrase(self.status),
            self.body.len()
        );
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str("\r\n");
        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Decode `%XX` escapes and `+` in a query component
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                        continue;
                    }
                    None => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (percent_decode(k), percent_decode(v)),
            None => (percent_decode(pair), String::new()),
        })
        .collect()
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Why a request could not be read
#[derive(Debug, PartialEq)]
pub enum ReadError {
    Malformed(String),
    TooLarge,
    TimedOut,
    Closed,
}

impl ReadError {
    pub fn response(&self) -> Option<Response> {
        match self {
            ReadError::Malformed(msg) => Some(Response::detail(400, msg)),
            ReadError::TooLarge => Some(Response::detail(413, "Request body too large")),
            ReadError::TimedOut => Some(Response::detail(408, "Timed out reading request")),
            ReadError::Closed => None,
        }
    }
}

/// Read one request (head plus `Content-Length` body) within the configured
/// deadline and size limit
pub async fn read_request<R>(stream: &mut R, config: &ServerConfig) -> std::result::Result<Request, ReadError>
where
    R: AsyncRead + Unpin,
{
    let deadline = Duration::from_secs(config.read_timeout_secs);
    match tokio::time::timeout(deadline, read_request_inner(stream, config.max_upload_bytes)).await {
        Ok(result) => result,
        Err(_) => Err(ReadError::TimedOut),
    }
}

async fn read_request_inner<R>(stream: &mut R, max_body: usize) -> std::result::Result<Request, ReadError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let head_end = loop {
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(ReadError::Malformed("Request head too large".to_string()));
        }
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| ReadError::Malformed(e.to_string()))?;
        if n == 0 {
            return if buf.is_empty() {
                Err(ReadError::Closed)
            } else {
                Err(ReadError::Malformed("Incomplete request head".to_string()))
            };
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(m), Some(t)) => (m.to_uppercase(), t.to_string()),
        _ => return Err(ReadError::Malformed("Malformed request line".to_string())),
    };

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(v) => v
            .parse::<usize>()
            .map_err(|_| ReadError::Malformed("Invalid Content-Length".to_string()))?,
        None => 0,
    };
    if content_length > max_body {
        return Err(ReadError::TooLarge);
    }

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| ReadError::Malformed(e.to_string()))?;
        if n == 0 {
            return Err(ReadError::Malformed("Incomplete request body".to_string()));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    let (raw_path, raw_query) = target.split_once('?').unwrap_or((target.as_str(), ""));
    // Normalize trailing slash except for root
    let mut path = raw_path.trim_end_matches('/').to_string();
    if path.is_empty() {
        path = "/".to_string();
    }

    Ok(Request {
        method,
        path,
        query: parse_query(raw_query),
        headers,
        body,
    })
}

fn parse_body<T: DeserializeOwned>(req: &Request) -> std::result::Result<T, Response> {
    serde_json::from_slice(&req.body)
        .map_err(|e| Response::detail(400, &format!("Invalid request body: {}", e)))
}

/// Dispatch a request to the service. Engine work runs on the calling thread.
pub fn route(service: &DataService, req: &Request) -> Response {
    debug!("Request: {} {}", req.method, req.path);
    match (req.method.as_str(), req.path.as_str()) {
        ("OPTIONS", _) => Response::empty(204),
        ("GET", "/") => Response::json(200, &json!({"message": "Lab Co-Pilot API is running."})),
        ("GET", "/health") => Response::json(200, &json!({"status": "ok"})),
        ("POST", "/api/data/upload") => {
            let filename = req
                .query_param("filename")
                .or_else(|| req.header("x-filename"))
                .unwrap_or_default();
            Response::from_result("Upload error", service.upload(&req.body, filename))
        }
        ("GET", "/api/data/list") => Response::json(200, &service.list()),
        ("POST", "/api/data/filter") => match parse_body::<FilterRequest>(req) {
            Ok(body) => Response::from_result("Filter error", service.filter(&body)),
            Err(resp) => resp,
        },
        ("POST", "/api/data/aggregate") => match parse_body::<AggregateRequest>(req) {
            Ok(body) => Response::from_result("Aggregation error", service.aggregate(&body)),
            Err(resp) => resp,
        },
        ("POST", "/api/data/describe") => Response::from_result(
            "Describe error",
            service.describe(req.query_param("file_id")),
        ),
        ("POST", "/api/data/plot") => match parse_body::<PlotRequest>(req) {
            Ok(body) => Response::from_result("Plot error", service.plot(&body)),
            Err(resp) => resp,
        },
        (_, "/" | "/health" | "/api/data/upload" | "/api/data/list" | "/api/data/filter"
            | "/api/data/aggregate" | "/api/data/describe" | "/api/data/plot") => {
            Response::detail(405, "Method Not Allowed")
        }
        _ => {
            warn!("No route for {} {}", req.method, req.path);
            Response::detail(404, "Not Found")
        }
    }
}

/// Attach CORS headers when the request origin is allowed
pub fn apply_cors(mut response: Response, req: &Request, config: &ServerConfig) -> Response {
    if let Some(origin) = req.header("origin") {
        if config.origin_allowed(origin) {
            response.headers.extend([
                ("Access-Control-Allow-Origin".to_string(), origin.to_string()),
                ("Access-Control-Allow-Credentials".to_string(), "true".to_string()),
                (
                    "Access-Control-Allow-Methods".to_string(),
                    "GET, POST, OPTIONS".to_string(),
                ),
                (
                    "Access-Control-Allow-Headers".to_string(),
                    "Content-Type, X-Filename".to_string(),
                ),
                ("Vary".to_string(), "Origin".to_string()),
            ]);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DatasetStore;
    use serde_json::Value;

    fn service() -> DataService {
        DataService::new(DatasetStore::new(), &ServerConfig::default())
    }

    fn request(method: &str, target: &str, body: &[u8]) -> Request {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        Request {
            method: method.to_string(),
            path: path.to_string(),
            query: parse_query(query),
            headers: HashMap::new(),
            body: body.to_vec(),
        }
    }

    fn body(resp: &Response) -> Value {
        serde_json::from_slice(&resp.body).unwrap()
    }

    #[tokio::test]
    async fn test_read_request_with_body() {
        let raw = b"POST /api/data/upload/?filename=my%20data.csv HTTP/1.1\r\nHost: x\r\nContent-Length: 8\r\nX-Filename: other.csv\r\n\r\na,b\n1,2\nEXTRA";
        let mut stream: &[u8] = raw;
        let req = read_request(&mut stream, &ServerConfig::default()).await.unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/api/data/upload");
        assert_eq!(req.query_param("filename"), Some("my data.csv"));
        assert_eq!(req.header("X-Filename"), Some("other.csv"));
        assert_eq!(req.body, b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_read_request_limits() {
        let config = ServerConfig {
            max_upload_bytes: 4,
            ..ServerConfig::default()
        };
        let mut stream: &[u8] = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\n0123456789";
        assert_eq!(
            read_request(&mut stream, &config).await,
            Err(ReadError::TooLarge)
        );

        let mut stream: &[u8] = b"";
        assert_eq!(
            read_request(&mut stream, &config).await,
            Err(ReadError::Closed)
        );

        let mut stream: &[u8] = b"garbage\r\n\r\n";
        assert!(matches!(
            read_request(&mut stream, &config).await,
            Err(ReadError::Malformed(_))
        ));
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("a%2Cb+c"), "a,b c");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
    }

    #[test]
    fn test_root_and_health() {
        let svc = service();
        let resp = route(&svc, &request("GET", "/health", b""));
        assert_eq!(resp.status, 200);
        assert_eq!(body(&resp), json!({"status": "ok"}));
        assert_eq!(route(&svc, &request("GET", "/nope", b"")).status, 404);
        assert_eq!(route(&svc, &request("DELETE", "/health", b"")).status, 405);
    }

    #[test]
    fn test_upload_then_filter_over_http() {
        let svc = service();
        let resp = route(
            &svc,
            &request("POST", "/api/data/upload?filename=lab.csv", b"age,dept\n25,a\n40,b\n"),
        );
        assert_eq!(resp.status, 200);
        assert_eq!(body(&resp)["total_files"], json!(1));

        let resp = route(
            &svc,
            &request("POST", "/api/data/filter", br#"{"conditions": "age > 30"}"#),
        );
        assert_eq!(resp.status, 200);
        let payload = body(&resp);
        assert_eq!(payload["row_count"], json!(1));
        assert_eq!(payload["data"][0]["dept"], json!("b"));
    }

    #[test]
    fn test_error_mapping() {
        let svc = service();
        let resp = route(&svc, &request("POST", "/api/data/describe", b""));
        assert_eq!(resp.status, 404);

        let resp = route(&svc, &request("POST", "/api/data/upload?filename=notes.txt", b"x"));
        assert_eq!(resp.status, 400);
        assert_eq!(body(&resp)["detail"], json!("Unsupported file format: .txt"));

        route(&svc, &request("POST", "/api/data/upload?filename=a.csv", b"x\n1\n"));
        let resp = route(&svc, &request("POST", "/api/data/filter", br#"{"conditions": "x >"}"#));
        assert_eq!(resp.status, 400);
        assert!(body(&resp)["detail"].as_str().unwrap().starts_with("Filter error"));

        let resp = route(&svc, &request("POST", "/api/data/plot", b"not json"));
        assert_eq!(resp.status, 400);
    }

    #[test]
    fn test_cors_echoes_allowed_origin_only() {
        let config = ServerConfig::default();
        let mut req = request("OPTIONS", "/api/data/filter", b"");
        req.headers
            .insert("origin".to_string(), "http://localhost:3000".to_string());
        let resp = apply_cors(route(&service(), &req), &req, &config);
        assert_eq!(resp.status, 204);
        assert!(resp.headers.contains(&(
            "Access-Control-Allow-Origin".to_string(),
            "http://localhost:3000".to_string()
        )));

        req.headers
            .insert("origin".to_string(), "http://evil.example".to_string());
        let resp = apply_cors(Response::empty(204), &req, &config);
        assert!(resp.headers.is_empty());
    }

    #[test]
    fn test_response_bytes() {
        let resp = Response::detail(404, "gone");
        let text = String::from_utf8(resp.to_bytes()).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.ends_with("\r\n\r\n{\"detail\":\"gone\"}"));
    }
}
