use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Request, Response};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use super::transport::{HttpTransport, TransportError};

enum Canned {
    Response {
        status: u16,
        headers: HeaderMap,
        body: Vec<u8>,
    },
    Error(String),
}

/// In-memory transport that replays canned responses in order and records
/// every request it sees
#[derive(Default)]
pub struct MockTransport {
    canned: Mutex<VecDeque<Canned>>,
    requests: Mutex<Vec<Request>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_response(&self, status: u16, headers: &[(&str, &str)], body: Vec<u8>) {
        let headers = headers
            .iter()
            .map(|(k, v)| {
                (
                    HeaderName::from_bytes(k.as_bytes()).unwrap(),
                    HeaderValue::from_str(v).unwrap(),
                )
            })
            .collect();
        self.push_response_with_headers(status, headers, body);
    }

    /// Queue a response with arbitrary header bytes
    pub fn push_response_with_headers(&self, status: u16, headers: HeaderMap, body: Vec<u8>) {
        self.canned.lock().unwrap().push_back(Canned::Response { status, headers, body });
    }

    pub fn push_error(&self, message: &str) {
        self.canned.lock().unwrap().push_back(Canned::Error(message.to_string()));
    }

    pub fn requests(&self) -> MutexGuard<'_, Vec<Request>> {
        self.requests.lock().unwrap()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        self.requests.lock().unwrap().push(request);

        let canned = self
            .canned
            .lock()
            .unwrap()
            .pop_front()
            .expect("no canned response left");

        match canned {
            Canned::Response { status, headers, body } => {
                let mut response = http::Response::builder().status(status).body(body).unwrap();
                *response.headers_mut() = headers;
                Ok(Response::from(response))
            }
            Canned::Error(message) => Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                message,
            )
            .into()),
        }
    }
}

/// Gzip `data` the way the config server does
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}
