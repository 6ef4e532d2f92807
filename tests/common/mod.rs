//! A scripted HTTP/1.1 server on a loopback port.
//!
//! Each route answers with a status and a list of body chunks written one at
//! a time. Bodies are close-delimited, so a route can keep the connection
//! open after its last chunk to simulate a model that is still thinking.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    chunks: Vec<String>,
    delay: Duration,
    hold_open: bool,
    stall: bool,
}

impl Reply {
    pub fn ok(chunks: &[&str]) -> Self {
        Self {
            status: 200,
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            delay: Duration::from_millis(10),
            hold_open: false,
            stall: false,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            ..Self::ok(&[body])
        }
    }

    /// Keep the connection open after the last chunk.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Never send a response at all.
    pub fn stall() -> Self {
        Self {
            stall: true,
            ..Self::ok(&[])
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub body: String,
}

pub struct FakeServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
    handle: JoinHandle<()>,
}

impl FakeServer {
    pub async fn start(routes: Vec<(&str, Reply)>) -> Self {
        let routes: Arc<HashMap<String, Reply>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, reply)| (path.to_string(), reply))
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let recorded = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                let routes = Arc::clone(&routes);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let _ = serve_one(socket, &routes, &recorded).await;
                });
            }
        });

        Self {
            base_url,
            requests,
            handle,
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// JSON body of the last request made to `path`.
    pub fn last_body(&self, path: &str) -> serde_json::Value {
        let req = self
            .requests()
            .into_iter()
            .rev()
            .find(|r| r.path == path)
            .unwrap_or_else(|| panic!("no request to {path}"));
        serde_json::from_str(&req.body).unwrap()
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A URL nothing listens on.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

async fn serve_one(
    mut socket: TcpStream,
    routes: &HashMap<String, Reply>,
    recorded: &Mutex<Vec<Recorded>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut tmp).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut tmp).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    recorded.lock().unwrap().push(Recorded {
        method,
        path: path.clone(),
        body,
    });

    let reply = routes
        .get(&path)
        .cloned()
        .unwrap_or_else(|| Reply::status(404, "not found"));

    if reply.stall {
        tokio::time::sleep(Duration::from_secs(60)).await;
        return Ok(());
    }

    let head = format!(
        "HTTP/1.1 {} Scripted\r\nContent-Type: application/x-ndjson\r\nConnection: close\r\n\r\n",
        reply.status
    );
    socket.write_all(head.as_bytes()).await?;
    socket.flush().await?;

    for chunk in &reply.chunks {
        socket.write_all(chunk.as_bytes()).await?;
        socket.flush().await?;
        tokio::time::sleep(reply.delay).await;
    }

    if reply.hold_open {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
    socket.shutdown().await
}
