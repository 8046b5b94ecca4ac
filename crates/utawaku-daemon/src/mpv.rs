/// mpv IPC driver and the `PlaybackEngine` built on it.
///
/// ```text
///   MpvDriver::spawn_and_connect()
///         │
///         ├── writer_task   ← MpvRequest via mpsc, serialised → socket
///         └── reader_task   ← JSON lines from socket
///                                ├── reply (has request_id) → matched oneshot
///                                └── event / property-change → MpvEvent channel
///
///   MpvEngine::construct()
///         └── forwarder     ← MpvEvent → EngineEvent → SessionEvent::Engine
/// ```
///
/// Platform notes:
/// - Unix:    Unix domain socket
/// - Windows: named pipe  \\.\pipe\<name>
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};
use utawaku_proto::config::PlayerConfig;
use utawaku_proto::platform;

use crate::core::SessionEvent;
use crate::engine::{EngineEvent, PlaybackEngine};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

const IPC_TIMEOUT: tokio::time::Duration = tokio::time::Duration::from_secs(5);

/// observe_property id for `pause`.
pub const OBS_PAUSE: u64 = 1;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct MpvRequest {
    req_id: u64,
    payload: String, // serialised JSON line, '\n' included
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event / property-change that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.event_name()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }

    /// e.g. "end-file", "file-loaded", "seek".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }
}

/// Map a raw mpv event onto what the session cares about.
pub fn engine_event(evt: &MpvEvent) -> Option<EngineEvent> {
    if let Some((id, _)) = evt.as_property_change() {
        return (id == OBS_PAUSE).then_some(EngineEvent::StateChanged);
    }
    match evt.event_name()? {
        "file-loaded" | "seek" | "playback-restart" => Some(EngineEvent::StateChanged),
        "end-file" => {
            if evt.raw.get("reason").and_then(Value::as_str) == Some("error") {
                let detail = evt
                    .raw
                    .get("file_error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                Some(EngineEvent::Error(detail.to_string()))
            } else {
                Some(EngineEvent::StateChanged)
            }
        }
        _ => None,
    }
}

/// `loadfile` replacing the current file, starting at `start_secs`.  The start
/// is a per-file option, so later loads are unaffected.
pub fn loadfile_command(url: &str, start_secs: f64) -> Value {
    json!({
        "name": "loadfile",
        "url": url,
        "flags": "replace",
        "options": format!("start={}", start_secs),
    })
}

// ── handle ────────────────────────────────────────────────────────────────────

/// Cloneable handle to the writer task.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<MpvRequest>,
    pending: PendingMap,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(MpvRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        match tokio::time::timeout(IPC_TIMEOUT, reply_rx).await {
            Ok(reply) => {
                reply.map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
            }
            Err(_) => {
                // A late reply is dropped by the reader as unknown.
                self.pending.lock().await.remove(&req_id);
                Err(anyhow::anyhow!("mpv IPC timeout for req={}", req_id))
            }
        }
    }

    pub async fn get_property(&self, name: &str) -> anyhow::Result<Value> {
        let resp = self.send(json!(["get_property", name])).await?;
        Ok(resp.get("data").cloned().unwrap_or(Value::Null))
    }

    pub async fn set_property(&self, name: &str, value: Value) -> anyhow::Result<()> {
        self.send(json!(["set_property", name, value])).await?;
        Ok(())
    }

    pub async fn observe(&self, id: u64, name: &str) {
        match self.send(json!(["observe_property", id, name])).await {
            Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
            Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
        }
    }
}

/// Wire a connected stream to fresh reader/writer tasks.
fn start_io_tasks<R, W>(read_half: R, write_half: W, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<MpvRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(BufReader::new(read_half), pending.clone(), event_tx));

    MpvHandle {
        tx: cmd_tx,
        pending,
    }
}

async fn fail_all(pending: &PendingMap, why: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("mpv IPC {}", why)));
    }
}

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<MpvEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_all(&pending, "connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(Value::as_u64) {
                    let Some(tx) = pending.lock().await.remove(&req_id) else {
                        debug!("mpv reader: reply for unknown req={}", req_id);
                        continue;
                    };
                    let result = match val.get("error").and_then(Value::as_str) {
                        Some("success") => Ok(val),
                        other => {
                            let err = other.unwrap_or("unknown error");
                            debug!("mpv reader: req={} err={}", req_id, err);
                            Err(anyhow::anyhow!("mpv error: {}", err))
                        }
                    };
                    let _ = tx.send(result);
                } else {
                    debug!("mpv reader: event {}", trimmed);
                    if event_tx.send(MpvEvent { raw: val }).await.is_err() {
                        debug!("mpv reader: event channel closed");
                    }
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_all(&pending, "read error").await;
                break;
            }
        }
    }
}

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<MpvRequest>, pending: PendingMap)
where
    W: AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register before writing so the reader can always match the reply.
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: req={} {}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process.  The process is killed when the driver drops.
pub struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
}

impl MpvDriver {
    pub fn new() -> Self {
        Self {
            socket_name: platform::mpv_socket_name(),
            process: None,
        }
    }

    fn spawn_process(&mut self, player: &PlayerConfig) -> anyhow::Result<()> {
        let mpv_binary =
            platform::find_mpv_binary().ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;
        info!("mpv: spawning {}", mpv_binary.display());

        let child = tokio::process::Command::new(mpv_binary)
            .arg("--idle=yes")
            .arg("--force-window=yes")
            .arg("--keep-open=yes")
            .arg("--pause")
            .arg(format!("--geometry={}x{}", player.width, player.height))
            .arg("--title=utawaku")
            .arg(platform::mpv_socket_arg())
            .arg("--quiet")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        self.process = Some(child);
        Ok(())
    }

    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        player: &PlayerConfig,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        self.spawn_process(player)?;

        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(read_half, write_half, event_tx))
    }

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        player: &PlayerConfig,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.spawn_process(player)?;

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                let (read_half, write_half) = tokio::io::split(client);
                return Ok(start_io_tasks(read_half, write_half, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

// ── engine ────────────────────────────────────────────────────────────────────

/// The embedded player: an mpv window driven over IPC.
pub struct MpvEngine {
    handle: MpvHandle,
    player: PlayerConfig,
    // Keeps the child process alive.
    _driver: MpvDriver,
}

impl MpvEngine {
    /// Spawn the player window, cue the initial video paused, and announce
    /// `EngineEvent::Ready` on `session_tx`.
    pub async fn construct(
        player: PlayerConfig,
        session_tx: mpsc::Sender<SessionEvent>,
    ) -> anyhow::Result<Self> {
        let (mpv_tx, mut mpv_rx) = mpsc::channel::<MpvEvent>(256);
        let mut driver = MpvDriver::new();
        let handle = driver.spawn_and_connect(&player, mpv_tx).await?;

        let forward_tx = session_tx.clone();
        tokio::spawn(async move {
            while let Some(evt) = mpv_rx.recv().await {
                if let Some(engine_evt) = engine_event(&evt) {
                    if forward_tx.send(SessionEvent::Engine(engine_evt)).await.is_err() {
                        break;
                    }
                }
            }
            debug!("mpv: event forwarder exiting");
        });

        handle.observe(OBS_PAUSE, "pause").await;

        if !player.initial_video_id.is_empty() {
            let url = player.video_url(&player.initial_video_id);
            info!("mpv: cueing {}", url);
            if let Err(e) = handle.send(json!(["loadfile", url])).await {
                warn!("mpv: failed to cue initial video: {}", e);
            }
        }

        let _ = session_tx.send(SessionEvent::Engine(EngineEvent::Ready)).await;

        Ok(Self {
            handle,
            player,
            _driver: driver,
        })
    }
}

#[async_trait]
impl PlaybackEngine for MpvEngine {
    async fn load_video_by_id(&self, video_id: &str, start_secs: f64) -> anyhow::Result<()> {
        let url = self.player.video_url(video_id);
        self.handle.send(loadfile_command(&url, start_secs)).await?;
        self.handle.set_property("pause", json!(false)).await
    }

    async fn play_video(&self) -> anyhow::Result<()> {
        self.handle.set_property("pause", json!(false)).await
    }

    async fn pause_video(&self) -> anyhow::Result<()> {
        self.handle.set_property("pause", json!(true)).await
    }

    async fn stop_video(&self) -> anyhow::Result<()> {
        self.handle.send(json!(["stop"])).await?;
        Ok(())
    }

    async fn seek_to(&self, secs: f64) -> anyhow::Result<()> {
        self.handle.send(json!(["seek", secs, "absolute"])).await?;
        Ok(())
    }

    async fn current_time(&self) -> anyhow::Result<f64> {
        self.handle
            .get_property("time-pos")
            .await?
            .as_f64()
            .ok_or_else(|| anyhow::anyhow!("time-pos unavailable"))
    }

    async fn video_id(&self) -> anyhow::Result<Option<String>> {
        let path = self.handle.get_property("path").await?;
        Ok(path
            .as_str()
            .and_then(|p| self.player.video_id_from_url(p)))
    }

    async fn set_volume(&self, volume: u8) -> anyhow::Result<()> {
        self.handle
            .set_property("volume", json!(volume.min(100)))
            .await
    }

    async fn volume(&self) -> anyhow::Result<u8> {
        let v = self.handle.get_property("volume").await?.as_f64().unwrap_or(100.0);
        Ok(v.round().clamp(0.0, 100.0) as u8)
    }

    async fn is_muted(&self) -> anyhow::Result<bool> {
        Ok(self.handle.get_property("mute").await?.as_bool().unwrap_or(false))
    }

    async fn mute(&self) -> anyhow::Result<()> {
        self.handle.set_property("mute", json!(true)).await
    }

    async fn unmute(&self) -> anyhow::Result<()> {
        self.handle.set_property("mute", json!(false)).await
    }
}
