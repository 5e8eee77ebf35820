//! Raw HTTP/1.1 mock server for integration tests.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub enum MockBody {
    Full(String),
    /// Chunked transfer encoding, one chunk per write with a pause between.
    Chunked(Vec<String>),
    /// Sends the chunks and then holds the connection open without finishing.
    Stall(Vec<String>),
}

pub struct MockResponse {
    pub path: &'static str,
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: MockBody,
    pub must_contain: Vec<&'static str>,
}

impl MockResponse {
    pub fn json(path: &'static str, status: u16, body: serde_json::Value) -> Self {
        Self {
            path,
            status,
            headers: vec![("Content-Type", "application/json".to_string())],
            body: MockBody::Full(body.to_string()),
            must_contain: Vec::new(),
        }
    }

    pub fn text(path: &'static str, status: u16, body: &str) -> Self {
        Self {
            path,
            status,
            headers: vec![("Content-Type", "text/plain".to_string())],
            body: MockBody::Full(body.to_string()),
            must_contain: Vec::new(),
        }
    }

    pub fn chunked(path: &'static str, chunks: &[&str]) -> Self {
        Self {
            path,
            status: 200,
            headers: vec![("Content-Type", "text/plain".to_string())],
            body: MockBody::Chunked(chunks.iter().map(|chunk| chunk.to_string()).collect()),
            must_contain: Vec::new(),
        }
    }

    pub fn stalled(path: &'static str, chunks: &[&str]) -> Self {
        Self {
            body: MockBody::Stall(chunks.iter().map(|chunk| chunk.to_string()).collect()),
            ..Self::chunked(path, &[])
        }
    }

    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }

    pub fn expect(mut self, needle: &'static str) -> Self {
        self.must_contain.push(needle);
        self
    }
}

pub struct MockServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    /// Requests received so far, raw head plus body.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| first_line(request).contains(path))
            .count()
    }
}

/// Serve `plans` in order, one connection each.
pub fn spawn_sequence_server(plans: Vec<MockResponse>) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
    let address = listener.local_addr().expect("listener addr");
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();

    thread::spawn(move || {
        for plan in plans {
            let (mut socket, _) = listener.accept().expect("accept");
            let request = read_request(&mut socket);
            recorded.lock().unwrap().push(request.clone());

            let line = first_line(&request);
            assert!(
                line.contains(plan.path),
                "expected path '{}', first line: {}",
                plan.path,
                line
            );
            for expected in &plan.must_contain {
                assert!(
                    request.contains(expected),
                    "expected request to contain '{}', request: {}",
                    expected,
                    request
                );
            }
            respond(&mut socket, plan);
        }
    });

    MockServer {
        base_url: format!("http://{}", address),
        requests,
    }
}

/// A base URL nothing listens on.
pub fn unreachable_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
    let address = listener.local_addr().expect("listener addr");
    drop(listener);
    format!("http://{}", address)
}

fn first_line(request: &str) -> String {
    request.lines().next().unwrap_or_default().to_string()
}

fn read_request(socket: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buffer = [0_u8; 4096];
    loop {
        let read = socket.read(&mut buffer).expect("read request");
        if read == 0 {
            break;
        }
        data.extend_from_slice(&buffer[..read]);
        let Some(head_end) = data.windows(4).position(|window| window == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&data[..head_end]).to_string();
        let content_length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if data.len() >= head_end + 4 + content_length {
            break;
        }
    }
    String::from_utf8_lossy(&data).to_string()
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "OK",
    }
}

fn respond(socket: &mut TcpStream, plan: MockResponse) {
    let mut head = format!("HTTP/1.1 {} {}\r\n", plan.status, status_text(plan.status));
    for (name, value) in &plan.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }

    match plan.body {
        MockBody::Full(body) => {
            let response = format!(
                "{head}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket
                .write_all(response.as_bytes())
                .expect("write response");
            socket.flush().expect("flush");
        }
        MockBody::Chunked(chunks) => {
            write_chunked_head(socket, &head);
            for chunk in chunks {
                write_chunk(socket, &chunk);
                thread::sleep(Duration::from_millis(20));
            }
            let _ = socket.write_all(b"0\r\n\r\n");
            let _ = socket.flush();
        }
        MockBody::Stall(chunks) => {
            write_chunked_head(socket, &head);
            for chunk in chunks {
                write_chunk(socket, &chunk);
            }
            // The client is expected to hang up first.
            thread::sleep(Duration::from_secs(2));
            let _ = socket.write_all(b"0\r\n\r\n");
        }
    }
}

fn write_chunked_head(socket: &mut TcpStream, head: &str) {
    let head = format!("{head}Transfer-Encoding: chunked\r\nConnection: close\r\n\r\n");
    let _ = socket.write_all(head.as_bytes());
    let _ = socket.flush();
}

fn write_chunk(socket: &mut TcpStream, chunk: &str) {
    let framed = format!("{:x}\r\n{}\r\n", chunk.len(), chunk);
    let _ = socket.write_all(framed.as_bytes());
    let _ = socket.flush();
}
