//! Scripted transports for unit tests.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::io;
use std::net::Ipv4Addr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use crate::error::{Error, HttpError, Result};
use crate::transport::{
    HttpBackend, HttpReply, HttpRequest, InterfaceSource, PortProvider, SerialLink,
};
use crate::types::SerialPortDescriptor;

/// Installs a test subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// How the fake device answers one command.
#[derive(Debug, Clone)]
pub enum Reply {
    Bytes(Vec<u8>),
    Fail,
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Self::Bytes(text.as_bytes().to_vec())
    }
}

/// Behavior and observations shared by all links opened from [`FakePorts`].
#[derive(Debug, Default)]
pub struct Script {
    replies: Mutex<HashMap<String, Reply>>,
    writes: Mutex<Vec<String>>,
    clears: AtomicUsize,
    closed: AtomicUsize,
}

impl Script {
    pub fn reply(&self, command: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .insert(command.to_string(), reply);
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Fake host with a fixed port list and a set of ports that open.
#[derive(Debug, Default)]
pub struct FakePorts {
    listed: Mutex<Vec<SerialPortDescriptor>>,
    openable: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<String>>,
    pub script: Arc<Script>,
}

impl FakePorts {
    pub fn new(listed: &[&str], openable: &[&str]) -> Arc<Self> {
        let ports = Self::default();
        *ports.listed.lock().unwrap() = listed
            .iter()
            .map(|name| SerialPortDescriptor::named(*name))
            .collect();
        ports.set_openable(openable);
        Arc::new(ports)
    }

    pub fn set_openable(&self, openable: &[&str]) {
        *self.openable.lock().unwrap() = openable.iter().map(ToString::to_string).collect();
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

impl PortProvider for FakePorts {
    fn available_ports(&self) -> Result<Vec<SerialPortDescriptor>> {
        Ok(self.listed.lock().unwrap().clone())
    }

    fn open(&self, port: &str, _baud_rate: u32, _timeout: Duration) -> Result<Box<dyn SerialLink>> {
        self.attempts.lock().unwrap().push(port.to_string());
        if self.openable.lock().unwrap().contains(port) {
            Ok(Box::new(FakeLink {
                script: Arc::clone(&self.script),
                pending: Vec::new(),
            }))
        } else {
            Err(Error::Io(io::Error::new(io::ErrorKind::NotFound, "no such port")))
        }
    }
}

struct FakeLink {
    script: Arc<Script>,
    pending: Vec<u8>,
}

impl Drop for FakeLink {
    fn drop(&mut self) {
        self.script.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl SerialLink for FakeLink {
    fn clear_input(&mut self) -> Result<()> {
        self.script.clears.fetch_add(1, Ordering::SeqCst);
        self.pending.clear();
        Ok(())
    }

    fn write_all<'a>(
        &'a mut self,
        data: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let command = String::from_utf8_lossy(data)
                .trim_end_matches("\r\n")
                .to_string();
            self.script.writes.lock().unwrap().push(command.clone());
            let reply = self.script.replies.lock().unwrap().get(&command).cloned();
            match reply {
                Some(Reply::Fail) => Err(Error::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "device unplugged",
                ))),
                Some(Reply::Bytes(bytes)) => {
                    self.pending = bytes;
                    Ok(())
                }
                None => Ok(()),
            }
        })
    }

    fn read_available(&mut self) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send + '_>> {
        Box::pin(async move { Ok(Bytes::from(std::mem::take(&mut self.pending))) })
    }
}

type Responder =
    Box<dyn Fn(&HttpRequest) -> std::result::Result<HttpReply, HttpError> + Send + Sync>;

/// Fake HTTP stack answering through a closure and recording every request.
pub struct FakeHttp {
    responder: Responder,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeHttp {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest) -> std::result::Result<HttpReply, HttpError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }

    pub fn count_ending_with(&self, suffix: &str) -> usize {
        self.urls().iter().filter(|u| u.ends_with(suffix)).count()
    }
}

impl HttpBackend for FakeHttp {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<HttpReply, HttpError>> + Send + '_>> {
        let reply = (self.responder)(&request);
        self.requests.lock().unwrap().push(request);
        Box::pin(async move { reply })
    }
}

pub fn reply(status: u16, body: &str) -> std::result::Result<HttpReply, HttpError> {
    Ok(HttpReply {
        status,
        body: body.to_string(),
    })
}

pub fn refused() -> std::result::Result<HttpReply, HttpError> {
    Err(HttpError::Connect("connection refused".into()))
}

/// Fixed host addresses.
pub struct FakeInterfaces(pub Vec<Ipv4Addr>);

impl InterfaceSource for FakeInterfaces {
    fn ipv4_addresses(&self) -> Pin<Box<dyn Future<Output = Vec<Ipv4Addr>> + Send + '_>> {
        let addrs = self.0.clone();
        Box::pin(async move { addrs })
    }
}
