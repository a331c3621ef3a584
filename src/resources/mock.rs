use std::{
    cell::RefCell,
    collections::VecDeque,
    io::{self, Cursor, Read},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use reqwest::{header::HeaderMap, Method};

use super::connection::{Connection, ConnectionError, Response};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endpoint {
    Storage,
    Cdn,
}

#[derive(Debug)]
pub(crate) struct RecordedRequest {
    pub endpoint: Endpoint,
    pub method: Method,
    pub path: Vec<String>,
    pub params: Vec<(String, String)>,
    pub headers: HeaderMap,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub(crate) struct MockResponse {
    status: u16,
    reason: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl MockResponse {
    pub fn new(status: u16, reason: &str) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        self
    }
}

/// Body that records whether it was read through to the end.
struct TrackedBody {
    inner: Cursor<Vec<u8>>,
    drained: Arc<AtomicBool>,
}

impl Read for TrackedBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            self.drained.store(true, Ordering::SeqCst);
        }
        Ok(n)
    }
}

/// Scripted [`Connection`] that serves queued responses in order and records
/// every request it receives.
pub(crate) struct MockConnection {
    cdn_enabled: bool,
    responses: RefCell<VecDeque<MockResponse>>,
    requests: RefCell<Vec<RecordedRequest>>,
    bodies: RefCell<Vec<Arc<AtomicBool>>>,
}

impl MockConnection {
    pub fn new(cdn_enabled: bool) -> Arc<Self> {
        Arc::new(Self {
            cdn_enabled,
            responses: RefCell::new(VecDeque::new()),
            requests: RefCell::new(Vec::new()),
            bodies: RefCell::new(Vec::new()),
        })
    }

    pub fn push(&self, response: MockResponse) {
        self.responses.borrow_mut().push_back(response);
    }

    pub fn requests(&self) -> std::cell::Ref<'_, Vec<RecordedRequest>> {
        self.requests.borrow()
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn all_bodies_drained(&self) -> bool {
        self.bodies
            .borrow()
            .iter()
            .all(|drained| drained.load(Ordering::SeqCst))
    }

    fn respond(
        &self,
        endpoint: Endpoint,
        method: Method,
        path: &[&str],
        params: &[(&str, &str)],
        headers: HeaderMap,
    ) -> Result<Response, ConnectionError> {
        self.requests.borrow_mut().push(RecordedRequest {
            endpoint,
            method,
            path: path.iter().map(|s| s.to_string()).collect(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            headers,
        });
        let scripted = self
            .responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no scripted response left"))?;
        let drained = Arc::new(AtomicBool::new(false));
        self.bodies.borrow_mut().push(drained.clone());
        Ok(Response::new(
            scripted.status,
            scripted.reason,
            scripted.headers,
            TrackedBody {
                inner: Cursor::new(scripted.body),
                drained,
            },
        ))
    }
}

impl Connection for MockConnection {
    fn cdn_enabled(&self) -> bool {
        self.cdn_enabled
    }

    fn make_request(
        &self,
        method: Method,
        path: &[&str],
        params: &[(&str, &str)],
        headers: HeaderMap,
    ) -> Result<Response, ConnectionError> {
        self.respond(Endpoint::Storage, method, path, params, headers)
    }

    fn cdn_request(
        &self,
        method: Method,
        path: &[&str],
        headers: HeaderMap,
    ) -> Result<Response, ConnectionError> {
        self.respond(Endpoint::Cdn, method, path, &[], headers)
    }
}
