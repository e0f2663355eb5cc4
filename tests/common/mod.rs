#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use flowbutton::config_store::ConfigStore;
use flowbutton::host::HostUi;
use flowbutton::FlowError;

/// One request seen by the stub server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub target: String,
    pub body: String,
}

impl Recorded {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

type Handler = dyn Fn(&Recorded) -> (u16, String) + Send + Sync;

/// Minimal HTTP/1.1 server on localhost answering every request through
/// `handler`.
pub struct StubServer {
    pub url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
    peak: Arc<AtomicUsize>,
}

impl StubServer {
    /// Serve one connection at a time.
    pub fn start(handler: impl Fn(&Recorded) -> (u16, String) + Send + Sync + 'static) -> Self {
        Self::spawn(handler, None)
    }

    /// Serve every connection on its own thread, holding each response for
    /// `delay`, and keep track of how many requests were open at once.
    pub fn start_slow(
        delay: Duration,
        handler: impl Fn(&Recorded) -> (u16, String) + Send + Sync + 'static,
    ) -> Self {
        Self::spawn(handler, Some(delay))
    }

    fn spawn(
        handler: impl Fn(&Recorded) -> (u16, String) + Send + Sync + 'static,
        delay: Option<Duration>,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handler: Arc<Handler> = Arc::new(handler);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let peak = Arc::new(AtomicUsize::new(0));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let (seen, max) = (requests.clone(), peak.clone());
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let (handler, seen, max) = (handler.clone(), seen.clone(), max.clone());
                match delay {
                    None => serve(stream, &*handler, &seen, None),
                    Some(delay) => {
                        let in_flight = in_flight.clone();
                        thread::spawn(move || {
                            let open = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                            max.fetch_max(open, Ordering::SeqCst);
                            serve(stream, &*handler, &seen, Some(delay));
                            in_flight.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                }
            }
        });
        StubServer {
            url: format!("http://{addr}"),
            requests,
            peak,
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// Largest number of requests served at the same time (slow stub only).
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn serve(
    mut stream: TcpStream,
    handler: &Handler,
    seen: &Mutex<Vec<Recorded>>,
    delay: Option<Duration>,
) {
    let Some(request) = read_request(&mut stream) else {
        return;
    };
    let (status, body) = handler(&request);
    seen.lock().unwrap().push(request);
    if let Some(delay) = delay {
        thread::sleep(delay);
    }
    let response = format!(
        "HTTP/1.1 {status} STUB\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

fn read_request(stream: &mut TcpStream) -> Option<Recorded> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).ok()?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).ok()?;
    Some(Recorded {
        method,
        target: percent_decode(&target),
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                match u8::from_str_radix(hex, 16) {
                    Ok(b) => {
                        out.push(b);
                        i += 3;
                        continue;
                    }
                    Err(_) => out.push(b'%'),
                }
            }
            b'+' => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Everything a button asked of the host, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Confirm(String),
    Alert { text: String, title: Option<String> },
    ShowProgress(String),
    CloseProgress,
    RefreshList,
    RefreshForm,
    RefreshSubcontrol(String),
}

pub struct RecordingUi {
    pub answer: bool,
    pub subcontrol_fails: bool,
    events: Mutex<Vec<UiEvent>>,
}

impl RecordingUi {
    pub fn accepting() -> Self {
        Self {
            answer: true,
            subcontrol_fails: false,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn with_failing_subcontrol() -> Self {
        Self {
            subcontrol_fails: true,
            ..Self::accepting()
        }
    }

    pub fn declining() -> Self {
        Self {
            answer: false,
            ..Self::accepting()
        }
    }

    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Alert { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: UiEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl HostUi for RecordingUi {
    async fn confirm(&self, text: &str, _title: &str, _yes: &str, _cancel: &str) -> bool {
        self.push(UiEvent::Confirm(text.to_string()));
        self.answer
    }

    async fn alert(&self, text: &str, title: Option<&str>) {
        self.push(UiEvent::Alert {
            text: text.to_string(),
            title: title.map(String::from),
        });
    }

    fn show_progress(&self, text: &str) {
        self.push(UiEvent::ShowProgress(text.to_string()));
    }

    fn close_progress(&self) {
        self.push(UiEvent::CloseProgress);
    }

    async fn refresh_list(&self) {
        self.push(UiEvent::RefreshList);
    }

    async fn refresh_form(&self) {
        self.push(UiEvent::RefreshForm);
    }

    async fn refresh_subcontrol(&self, name: &str) -> flowbutton::Result<()> {
        self.push(UiEvent::RefreshSubcontrol(name.to_string()));
        if self.subcontrol_fails {
            return Err(FlowError::Ui(format!("{name} is not on the form")));
        }
        Ok(())
    }
}

/// Configuration store backed by a fixed list of name/value pairs.
pub struct StaticStore(pub Vec<(String, String)>);

impl StaticStore {
    pub fn with(name: &str, value: &str) -> Self {
        StaticStore(vec![(name.to_string(), value.to_string())])
    }
}

#[async_trait]
impl ConfigStore for StaticStore {
    async fn get_value(&self, name: &str) -> flowbutton::Result<String> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| FlowError::ConfigNotFound(name.to_string()))
    }
}

/// Wraps a store and records every name looked up through it.
pub struct RecordingStore {
    inner: StaticStore,
    names: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new(inner: StaticStore) -> Self {
        Self {
            inner,
            names: Mutex::new(Vec::new()),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfigStore for RecordingStore {
    async fn get_value(&self, name: &str) -> flowbutton::Result<String> {
        self.names.lock().unwrap().push(name.to_string());
        self.inner.get_value(name).await
    }
}
