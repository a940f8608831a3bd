//! Shared fixtures for integration tests: an on-disk origin and a minimal
//! in-process HTTP server serving it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use bpm_assets::app::{Category, ClientConfig, ContentDigest, HashAlgorithm};

pub fn sha1_hex(data: &[u8]) -> String {
    ContentDigest::compute(HashAlgorithm::Sha1, data).to_hex()
}

/// Directory laid out like the asset origin
pub struct Origin {
    dir: TempDir,
}

impl Origin {
    /// Empty manifests for every category and an empty course list
    pub fn new() -> Self {
        let origin = Self {
            dir: TempDir::new().unwrap(),
        };
        origin.publish(Category::Songs, &[]);
        origin.publish(Category::Jackets, &[]);
        origin.publish_courses("[]");
        origin
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write items plus their names/hashes manifests
    pub fn publish(&self, category: Category, items: &[(&str, &str)]) {
        let dir = self.path().join(category.remote_dir().unwrap());
        std::fs::create_dir_all(&dir).unwrap();

        let mut names = String::new();
        let mut hashes = String::new();
        for (name, content) in items {
            std::fs::write(dir.join(category.file_name(name)), content).unwrap();
            names.push_str(&format!("{}\n", name));
            hashes.push_str(&format!("{}\n", sha1_hex(content.as_bytes())));
        }

        std::fs::write(self.path().join(category.names_manifest()), names).unwrap();
        std::fs::write(self.path().join(category.hashes_manifest()), hashes).unwrap();
    }

    pub fn publish_courses(&self, content: &str) {
        std::fs::write(self.path().join("courses.json"), content).unwrap();
        std::fs::write(
            self.path().join("hashed_courses.txt"),
            format!("{}\n", sha1_hex(content.as_bytes())),
        )
        .unwrap();
    }

    pub fn publish_archive(&self, category: Category, entries: &[(&str, &str)]) {
        let path = self.path().join(category.archive_name().unwrap());
        let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
        for (name, content) in entries {
            zip.start_file(*name, zip::write::FileOptions::default())
                .unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
}

/// Parsed request as seen by the test server
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub range: Option<String>,
    pub if_range: Option<String>,
}

/// Canned behavior for one path
#[derive(Debug, Clone)]
pub enum Fault {
    /// Always answer with this status
    Status(u16),
    /// Answer with this status for the first `n` requests, then serve normally
    StatusTimes(u16, usize),
    /// Serve the full body and ignore `Range`
    IgnoreRange,
}

#[derive(Default)]
struct ServerState {
    faults: HashMap<String, Fault>,
    hits: HashMap<String, usize>,
    seen: Vec<SeenRequest>,
}

/// HTTP/1.1 server answering GET and HEAD from a directory
///
/// Supports `Range: bytes=N-` (honoured only while `If-Range` matches), emits a
/// content-derived `ETag`, and closes every connection after one response.
pub struct TestServer {
    addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn serve_dir(root: &Path) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(ServerState::default()));
        let root = root.to_path_buf();

        let task_state = state.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let state = task_state.clone();
                let root = root.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, &root, &state).await;
                });
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Client configuration for this server with fast backoff
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::default()
            .with_base_url(self.base_url())
            .with_retry_base_delay(Duration::from_millis(1));
        config.rate_limit_rps = 1000;
        config.request_timeout = Duration::from_secs(10);
        config
    }

    pub fn inject(&self, path: &str, fault: Fault) {
        self.state
            .lock()
            .unwrap()
            .faults
            .insert(path.to_string(), fault);
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.state.lock().unwrap().seen.clone()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state.lock().unwrap().hits.get(path).copied().unwrap_or(0)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    root: &Path,
    state: &Mutex<ServerState>,
) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buffer.windows(4).any(|w| w == b"\r\n\r\n") {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    let head = String::from_utf8_lossy(&buffer).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or("/").to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    let header = |wanted: &str| {
        headers
            .iter()
            .find(|(name, _)| name == wanted)
            .map(|(_, value)| value.clone())
    };
    let range = header("range");
    let if_range = header("if-range");

    let fault = {
        let mut guard = state.lock().unwrap();
        guard.seen.push(SeenRequest {
            method: method.clone(),
            path: path.clone(),
            range: range.clone(),
            if_range: if_range.clone(),
        });
        let hits = {
            let counter = guard.hits.entry(path.clone()).or_insert(0);
            *counter += 1;
            *counter
        };
        match guard.faults.get(&path) {
            Some(Fault::Status(status)) => Some(Err(*status)),
            Some(Fault::StatusTimes(status, times)) if hits <= *times => Some(Err(*status)),
            Some(Fault::IgnoreRange) => Some(Ok(())),
            _ => None,
        }
    };

    let response = match fault {
        Some(Err(status)) => build_response(status, &[], b"", &method),
        Some(Ok(())) => serve_file(root, &path, None, None, &method),
        None => serve_file(root, &path, range.as_deref(), if_range.as_deref(), &method),
    };

    stream.write_all(&response).await?;
    stream.shutdown().await
}

fn serve_file(
    root: &Path,
    path: &str,
    range: Option<&str>,
    if_range: Option<&str>,
    method: &str,
) -> Vec<u8> {
    let relative = PathBuf::from(path.trim_start_matches('/'));
    let Ok(body) = std::fs::read(root.join(relative)) else {
        return build_response(404, &[], b"not found", method);
    };
    let etag = format!("\"{}\"", sha1_hex(&body));

    // A stale validator turns the range request into a full response
    let range = match if_range {
        Some(tag) if tag != etag => None,
        _ => range,
    };
    let start = range
        .and_then(|r| r.strip_prefix("bytes="))
        .and_then(|r| r.strip_suffix('-'))
        .and_then(|r| r.parse::<usize>().ok());

    match start {
        Some(start) if start >= body.len() => build_response(416, &[], b"", method),
        Some(start) => {
            let content_range = format!("bytes {}-{}/{}", start, body.len() - 1, body.len());
            build_response(
                206,
                &[("ETag", etag.as_str()), ("Content-Range", content_range.as_str())],
                &body[start..],
                method,
            )
        }
        None => build_response(200, &[("ETag", etag.as_str())], &body, method),
    }
}

fn build_response(status: u16, headers: &[(&str, &str)], body: &[u8], method: &str) -> Vec<u8> {
    let reason = match status {
        200 => "OK",
        206 => "Partial Content",
        404 => "Not Found",
        416 => "Range Not Satisfiable",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    };

    let mut response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        status,
        reason,
        body.len()
    );
    for (name, value) in headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str("\r\n");

    let mut bytes = response.into_bytes();
    if method != "HEAD" {
        bytes.extend_from_slice(body);
    }
    bytes
}
