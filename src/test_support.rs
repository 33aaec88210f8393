use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::credentials::{Prompter, SettingsStore};
use crate::launcher::Launcher;
use crate::notice::{Notice, Notifier};
use crate::playback_info::{PlaybackInfoClient, PlaybackInfoRequest, ResolveError};

#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryStore {
    values: Rc<RefCell<BTreeMap<String, String>>>,
    reject_writes: Rc<Cell<bool>>,
}

impl MemoryStore {
    pub(crate) fn insert(&self, key: &str, value: &str) {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    pub(crate) fn value(&self, key: &str) -> Option<String> {
        self.values.borrow().get(key).cloned()
    }

    pub(crate) fn fail_writes(&self) {
        self.reject_writes.set(true);
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.value(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.reject_writes.get() {
            return Err(anyhow!("settings store is read-only"));
        }
        self.insert(key, value);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct ScriptedPrompter {
    answers: VecDeque<Option<String>>,
    pub(crate) asked: Vec<(String, String)>,
}

impl ScriptedPrompter {
    pub(crate) fn new(answers: Vec<Option<String>>) -> Self {
        Self {
            answers: answers.into(),
            asked: Vec::new(),
        }
    }

    pub(crate) fn defaults(&self) -> Vec<&str> {
        self.asked
            .iter()
            .map(|(_, default)| default.as_str())
            .collect()
    }
}

impl Prompter for ScriptedPrompter {
    fn prompt(&mut self, message: &str, default: &str) -> Option<String> {
        self.asked.push((message.to_string(), default.to_string()));
        self.answers.pop_front().flatten()
    }
}

impl Prompter for Rc<RefCell<ScriptedPrompter>> {
    fn prompt(&mut self, message: &str, default: &str) -> Option<String> {
        self.borrow_mut().prompt(message, default)
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    pub(crate) notices: Vec<Notice>,
}

impl Notifier for RecordingNotifier {
    fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
}

impl Notifier for Rc<RefCell<RecordingNotifier>> {
    fn notify(&mut self, notice: Notice) {
        self.borrow_mut().notify(notice);
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingLauncher {
    pub(crate) opened: Vec<String>,
    pub(crate) fail: bool,
}

impl Launcher for Rc<RefCell<RecordingLauncher>> {
    fn open(&mut self, uri: &str) -> Result<()> {
        let mut launcher = self.borrow_mut();
        if launcher.fail {
            return Err(anyhow!("no handler registered for {uri}"));
        }
        launcher.opened.push(uri.to_string());
        Ok(())
    }
}

/// Canned playback-info answers keyed by item id; counts calls.
#[derive(Debug, Default)]
pub(crate) struct StubClient {
    answers: Mutex<BTreeMap<String, Result<Option<String>, ResolveError>>>,
    calls: AtomicUsize,
}

impl StubClient {
    pub(crate) fn answer(self, item_id: &str, result: Result<Option<String>, ResolveError>) -> Self {
        self.answers
            .lock()
            .expect("lock answers")
            .insert(item_id.to_string(), result);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PlaybackInfoClient for StubClient {
    fn media_path(&self, request: &PlaybackInfoRequest) -> Result<Option<String>, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .expect("lock answers")
            .get(&request.item_id)
            .cloned()
            .unwrap_or(Ok(None))
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    Respond(u16, String),
    DelayRespond(Duration, u16, String),
}

/// Minimal HTTP/1.1 server answering queued behaviors and recording each
/// request's head and body.
#[derive(Debug)]
pub(crate) struct TestServer {
    pub(crate) base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    accepted: Arc<AtomicUsize>,
    shutdown_tx: mpsc::Sender<()>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl TestServer {
    pub(crate) fn spawn(behaviors: Vec<Behavior>) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind test server");
        listener.set_nonblocking(true).expect("set nonblocking");
        let addr = listener.local_addr().expect("local addr");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let requests_clone = Arc::clone(&requests);
        let accepted = Arc::new(AtomicUsize::new(0));
        let accepted_clone = Arc::clone(&accepted);
        let behaviors = Arc::new(Mutex::new(VecDeque::from(behaviors)));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                match listener.accept() {
                    Ok((mut stream, _)) => {
                        accepted_clone.fetch_add(1, Ordering::SeqCst);
                        let behavior = behaviors.lock().expect("lock behaviors").pop_front();
                        let behavior = behavior
                            .unwrap_or_else(|| Behavior::Respond(200, "{}".to_string()));
                        let requests = Arc::clone(&requests_clone);
                        std::thread::spawn(move || {
                            if let Ok(raw) = read_request(&mut stream) {
                                requests.lock().expect("lock requests").push(raw);
                            }
                            serve_behavior(&mut stream, behavior);
                        });
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
            accepted,
            shutdown_tx,
            join_handle: Some(join_handle),
        }
    }

    pub(crate) fn request_count(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("lock requests").clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

fn read_request(stream: &mut TcpStream) -> std::io::Result<String> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_millis(500)))?;
    let mut buf = [0_u8; 1024];
    let mut data = Vec::new();
    let mut expected_len = None;
    loop {
        if let Some(total) = expected_len
            && data.len() >= total
        {
            break;
        }
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => {
                data.extend_from_slice(&buf[..read]);
                if expected_len.is_none()
                    && let Some(head_end) = data.windows(4).position(|window| window == b"\r\n\r\n")
                {
                    let head = String::from_utf8_lossy(&data[..head_end]).to_ascii_lowercase();
                    let body_len = head
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|value| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    expected_len = Some(head_end + 4 + body_len);
                }
            }
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                break;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(String::from_utf8_lossy(&data).into_owned())
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

fn serve_behavior(stream: &mut TcpStream, behavior: Behavior) {
    match behavior {
        Behavior::Respond(status, body) => {
            let _ = write_response(stream, status, &body);
        }
        Behavior::DelayRespond(delay, status, body) => {
            std::thread::sleep(delay);
            let _ = write_response(stream, status, &body);
        }
    }
}

fn write_response(stream: &mut TcpStream, status: u16, body: &str) -> std::io::Result<()> {
    let reason = reason_phrase(status);
    let payload = body.as_bytes();
    write!(
        stream,
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        payload.len()
    )?;
    stream.write_all(payload)?;
    stream.flush()
}
