//! External HTTP plugin harness
//!
//! Plugins without native code can serve HTTP through a helper process. The
//! harness launches the helper, moves bytes between its stdio and a pair of
//! bounded rings, and proxies HTTP requests to it as framed messages.
//!
//! ```text
//! host HTTP worker ──HttpRequest──▶ outbound ring ──writer task──▶ helper stdin
//! host HTTP worker ◀─HttpResponse── inbound ring  ◀──reader task── helper stdout
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{HostError, Result};
use crate::host::HostContext;
use crate::http::{HttpHandler, HttpRequest, HttpResponse};
use crate::security::{validate_bare_filename, validate_binary_name};

use super::buffer::{BufferPair, IPC_BUFFER_CAPACITY};
use super::ipc::{
    decode_body, encode_body, pop_frame, Frame, HttpRequestMessage, HttpResponseMessage,
    LogMessage, MessageType, RegisterUriMessage,
};
use super::paths::resolve_helper_binary;

/// How long a proxied request waits for the helper's response.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long shutdown waits for the helper to exit on its own.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

const READ_CHUNK: usize = 64 * 1024;

/// State shared between the harness, its channel tasks and any clients.
struct Channel {
    plugin: String,
    prefix: String,
    buffers: BufferPair,
    outbound_ready: Notify,
    pending: Mutex<HashMap<u64, oneshot::Sender<HttpResponseMessage>>>,
    routes: RwLock<Vec<RegisterUriMessage>>,
    running: AtomicBool,
    closing: AtomicBool,
    next_id: AtomicU64,
}

impl Channel {
    fn new(plugin: &str, prefix: &str) -> Self {
        Self {
            plugin: plugin.to_string(),
            prefix: prefix.to_string(),
            buffers: BufferPair::new(IPC_BUFFER_CAPACITY),
            outbound_ready: Notify::new(),
            pending: Mutex::new(HashMap::new()),
            routes: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Queue a frame for the writer task.
    fn enqueue(&self, frame: &Frame) -> Result<()> {
        self.buffers.outbound().lock().write(&frame.encode())?;
        self.outbound_ready.notify_one();
        Ok(())
    }

    /// Stop accepting requests and fail everything in flight.
    fn stop(&self, reason: &str) {
        if self.running.swap(false, Ordering::SeqCst) {
            warn!(plugin = %self.plugin, reason = %reason, "Helper channel stopped");
        }
        self.pending.lock().clear();
    }

    fn serves(&self, path: &str, method: &str) -> bool {
        if path.starts_with(&self.prefix) {
            return true;
        }
        self.routes
            .read()
            .iter()
            .any(|r| r.uri == path && (r.method == "*" || r.method.eq_ignore_ascii_case(method)))
    }

    /// Append helper output to the inbound ring and handle every complete
    /// frame.
    fn ingest(&self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let frames = {
                let mut ring = self.buffers.inbound().lock();
                let take = bytes.len().min(ring.available());
                ring.write(&bytes[..take])?;
                bytes = &bytes[take..];

                let mut frames = Vec::new();
                while let Some(frame) = pop_frame(&mut ring)? {
                    frames.push(frame);
                }
                if take == 0 && frames.is_empty() {
                    return Err(HostError::Ipc("inbound buffer full".to_string()));
                }
                frames
            };

            for frame in frames {
                self.accept(frame)?;
            }
        }
        Ok(())
    }

    fn accept(&self, frame: Frame) -> Result<()> {
        match frame.msg_type {
            MessageType::RegisterUri => {
                let route: RegisterUriMessage = frame.parse_json()?;
                info!(
                    plugin = %self.plugin,
                    method = %route.method,
                    uri = %route.uri,
                    "Helper registered URI"
                );
                let mut routes = self.routes.write();
                if !routes.contains(&route) {
                    routes.push(route);
                }
            }
            MessageType::HttpResponse => {
                let response: HttpResponseMessage = frame.parse_json()?;
                match self.pending.lock().remove(&response.id) {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => {
                        debug!(
                            plugin = %self.plugin,
                            id = response.id,
                            "Response for unknown request"
                        );
                    }
                }
            }
            MessageType::Message => {
                let log: LogMessage = frame.parse_json()?;
                let plugin = &self.plugin;
                match log.level.as_str() {
                    "trace" => tracing::trace!(target: "plugin", plugin = %plugin, "{}", log.text),
                    "debug" => tracing::debug!(target: "plugin", plugin = %plugin, "{}", log.text),
                    "warn" => tracing::warn!(target: "plugin", plugin = %plugin, "{}", log.text),
                    "error" => tracing::error!(target: "plugin", plugin = %plugin, "{}", log.text),
                    _ => tracing::info!(target: "plugin", plugin = %plugin, "{}", log.text),
                }
            }
            MessageType::HttpRequest | MessageType::Shutdown => {
                warn!(
                    plugin = %self.plugin,
                    msg_type = ?frame.msg_type,
                    "Helper sent a host-to-helper message, ignoring"
                );
            }
        }
        Ok(())
    }

    async fn forward(&self, request: &HttpRequest) -> Result<HttpResponse> {
        if !self.is_running() {
            return Err(HostError::HelperUnavailable(self.plugin.clone()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = Frame::json(
            MessageType::HttpRequest,
            &HttpRequestMessage {
                id,
                method: request.method.clone(),
                uri: request.path.clone(),
                headers: request.headers.clone(),
                body: encode_body(&request.body),
            },
        )?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        // A stop between the check above and the insert would leave this
        // request waiting for the full timeout.
        if !self.is_running() {
            self.pending.lock().remove(&id);
            return Err(HostError::HelperUnavailable(self.plugin.clone()));
        }

        if let Err(e) = self.enqueue(&frame) {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        let reply = match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(HostError::HelperUnavailable(self.plugin.clone())),
            Err(_) => {
                self.pending.lock().remove(&id);
                return Err(HostError::Ipc(format!(
                    "Helper for '{}' did not answer request {} within {:?}",
                    self.plugin, id, REQUEST_TIMEOUT
                )));
            }
        };

        Ok(HttpResponse {
            status: reply.status,
            headers: reply.headers,
            body: decode_body(&reply.body)?,
        })
    }
}

async fn read_loop<R>(channel: Arc<Channel>, mut reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => {
                channel.stop("helper closed its output");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                channel.stop(&format!("read failed: {}", e));
                return;
            }
        };

        if let Err(e) = channel.ingest(&chunk[..n]) {
            error!(plugin = %channel.plugin, error = %e, "Protocol error from helper");
            channel.stop("protocol error");
            return;
        }
    }
}

async fn write_loop<W>(channel: Arc<Channel>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    loop {
        let bytes = channel.buffers.outbound().lock().take_all();
        if bytes.is_empty() {
            if channel.closing.load(Ordering::SeqCst) {
                let _ = writer.shutdown().await;
                return;
            }
            channel.outbound_ready.notified().await;
            continue;
        }

        let written = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            channel.stop(&format!("write failed: {}", e));
            return;
        }
    }
}

/// Bridge between the host HTTP server and one helper process.
///
/// A harness whose helper could not be started, or has exited, stays
/// attached to its plugin but is inert: requests under its prefix get
/// `503 Service Unavailable`.
pub struct ExternalHttpHarness {
    channel: Arc<Channel>,
    child: Mutex<Option<Child>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl ExternalHttpHarness {
    /// Launch the helper `binary` for `plugin_name`.
    ///
    /// A `binary` containing a path separator raises the host's fatal
    /// condition and returns `SecurityViolation` without searching or
    /// spawning anything. Any other failure (malformed name, binary not
    /// found, no Tokio runtime, spawn error) is logged and yields an inert
    /// harness.
    pub fn launch(
        host: &HostContext,
        plugin_name: &str,
        http_prefix: &str,
        binary: &str,
        search_paths: &[String],
    ) -> Result<Self> {
        if let Err(e) = validate_binary_name(binary) {
            host.raise_fatal(&format!(
                "plugin '{}' names helper binary '{}' with a path component",
                plugin_name, binary
            ));
            return Err(e);
        }

        let mut harness = Self::inert(plugin_name, http_prefix);

        if let Err(e) = validate_bare_filename(binary, "helper binary") {
            error!(
                plugin = %plugin_name,
                binary = %binary,
                error = %e,
                "Rejected helper binary name"
            );
            return Ok(harness);
        }

        let Some(path) = resolve_helper_binary(binary, search_paths) else {
            error!(
                plugin = %plugin_name,
                binary = %binary,
                "Helper binary not found in any search path"
            );
            return Ok(harness);
        };

        if Handle::try_current().is_err() {
            error!(plugin = %plugin_name, "No async runtime, cannot launch helper");
            return Ok(harness);
        }

        let workdir = path.parent().unwrap_or_else(|| Path::new("."));
        let spawned = Command::new(&path)
            .current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                error!(
                    plugin = %plugin_name,
                    path = %path.display(),
                    error = %e,
                    "Failed to spawn helper"
                );
                return Ok(harness);
            }
        };

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            error!(plugin = %plugin_name, "Helper spawned without piped stdio");
            return Ok(harness);
        };

        info!(
            plugin = %plugin_name,
            path = %path.display(),
            pid = child.id().unwrap_or_default(),
            "Launched helper"
        );

        harness.start(stdout, stdin);
        *harness.child.get_mut() = Some(child);
        Ok(harness)
    }

    /// A harness with no helper behind it.
    pub fn inert(plugin_name: &str, http_prefix: &str) -> Self {
        Self {
            channel: Arc::new(Channel::new(plugin_name, http_prefix)),
            child: Mutex::new(None),
            reader: None,
            writer: None,
        }
    }

    /// Run the channel over an already connected byte stream.
    ///
    /// Must be called within a Tokio runtime.
    pub fn connect<R, W>(plugin_name: &str, http_prefix: &str, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut harness = Self::inert(plugin_name, http_prefix);
        harness.start(reader, writer);
        harness
    }

    fn start<R, W>(&mut self, reader: R, writer: W)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.channel.running.store(true, Ordering::SeqCst);
        self.reader = Some(tokio::spawn(read_loop(self.channel.clone(), reader)));
        self.writer = Some(tokio::spawn(write_loop(self.channel.clone(), writer)));
    }

    pub fn plugin_name(&self) -> &str {
        &self.channel.plugin
    }

    /// URL prefix always routed to this harness.
    pub fn http_prefix(&self) -> &str {
        &self.channel.prefix
    }

    /// Whether the helper is up and the channel healthy.
    pub fn is_running(&self) -> bool {
        self.channel.is_running()
    }

    /// URIs the helper has registered so far.
    pub fn routes(&self) -> Vec<RegisterUriMessage> {
        self.channel.routes.read().clone()
    }

    /// A cloneable handle that proxies requests to this harness.
    pub fn client(&self) -> HelperClient {
        HelperClient {
            channel: self.channel.clone(),
        }
    }

    /// Queue a raw frame for the helper.
    pub fn send(&self, frame: &Frame) -> Result<()> {
        self.channel.enqueue(frame)
    }

    /// Tear the harness down: stop reading, ask the helper to exit, kill it
    /// if it does not, then release the channel.
    pub async fn shutdown(mut self) {
        let plugin = self.channel.plugin.clone();

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        let was_running = self.channel.running.swap(false, Ordering::SeqCst);
        self.channel.pending.lock().clear();

        if let Some(mut writer) = self.writer.take() {
            if was_running {
                if let Err(e) = self.channel.enqueue(&Frame::empty(MessageType::Shutdown)) {
                    debug!(plugin = %plugin, error = %e, "Could not queue shutdown message");
                }
            }
            self.channel.closing.store(true, Ordering::SeqCst);
            self.channel.outbound_ready.notify_one();
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut writer).await.is_err() {
                writer.abort();
            }
        }

        if let Some(mut child) = self.child.get_mut().take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(plugin = %plugin, status = %status, "Helper exited");
                }
                _ => {
                    if let Err(e) = child.kill().await {
                        warn!(plugin = %plugin, error = %e, "Failed to kill helper");
                    }
                }
            }
        }

        self.channel.buffers.clear();
        info!(plugin = %plugin, "Helper harness shut down");
    }
}

impl Drop for ExternalHttpHarness {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

impl std::fmt::Debug for ExternalHttpHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pid = match &*self.child.lock() {
            Some(child) => child.id(),
            None => None,
        };
        f.debug_struct("ExternalHttpHarness")
            .field("plugin", &self.channel.plugin)
            .field("running", &self.is_running())
            .field("pid", &pid)
            .finish()
    }
}

#[async_trait]
impl HttpHandler for ExternalHttpHarness {
    fn verify_path(&self, path: &str, method: &str) -> bool {
        self.channel.serves(path, method)
    }

    async fn handle(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.channel.forward(request).await
    }
}

/// Cloneable request proxy for one harness.
///
/// Once the harness has shut down, every request through a client gets
/// `HelperUnavailable`.
#[derive(Clone)]
pub struct HelperClient {
    channel: Arc<Channel>,
}

impl HelperClient {
    pub fn plugin_name(&self) -> &str {
        &self.channel.plugin
    }
}

#[async_trait]
impl HttpHandler for HelperClient {
    fn verify_path(&self, path: &str, method: &str) -> bool {
        self.channel.serves(path, method)
    }

    async fn handle(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.channel.forward(request).await
    }
}

impl std::fmt::Debug for HelperClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelperClient")
            .field("plugin", &self.channel.plugin)
            .finish()
    }
}
