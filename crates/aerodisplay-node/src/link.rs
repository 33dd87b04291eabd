//! Request/response link to the controller.
//!
//! The link worker owns the byte stream. On every tick it:
//! - sends `get_sensors` every 2 s and `get_status` every 5 s
//! - forwards queued operator commands
//! - drains and decodes every complete line that has arrived
//! - republishes connectivity, demoting the upstream after 5 s of silence
//!
//! Malformed lines are dropped. Writes that stall for [`WRITE_WAIT`] drop the
//! command. The worker returns once the peer closes the stream.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use aerodisplay_core::{
    DeviceProfile, DeviceState, Millis, SensorFrame, SensorReading, SystemStatus,
    UART_TIMEOUT_MS,
};
use aerodisplay_protocol::{decode_frame, encode_command, Command, InboundFrame, LineFramer};

use crate::network::NetworkStatusHandle;
use crate::runtime::NodeClock;

/// Interval between `get_sensors` requests.
pub const SENSOR_INTERVAL_MS: Millis = 2000;

/// Interval between `get_status` requests.
pub const STATUS_INTERVAL_MS: Millis = 5000;

/// Link worker period.
pub const LINK_TICK: Duration = Duration::from_millis(100);

/// How long a tick waits for the first bytes to arrive.
pub const READ_WAIT: Duration = Duration::from_millis(100);

/// How long a single command may block on a stalled peer.
pub const WRITE_WAIT: Duration = Duration::from_millis(100);

/// Outbound commands queued ahead of the link worker.
pub const COMMAND_QUEUE_DEPTH: usize = 16;

/// Errors returned when queueing an outbound command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The command is not valid for this device profile.
    #[error("Command '{action}' rejected for this device")]
    Rejected { action: String },

    /// Too many commands are waiting to be sent.
    #[error("Command queue is full")]
    QueueFull,

    /// The link worker has stopped.
    #[error("Link worker is not running")]
    LinkClosed,
}

/// Cloneable handle for sending commands through the link worker.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    profile: &'static DeviceProfile,
    tx: mpsc::Sender<Command>,
}

impl LinkHandle {
    pub(crate) fn new(profile: &'static DeviceProfile, tx: mpsc::Sender<Command>) -> Self {
        Self { profile, tx }
    }

    /// Queue a manual control command.
    ///
    /// The action is validated against the device profile first; invalid
    /// commands are never queued.
    pub fn send_manual(&self, action: &str, arg: Option<i32>) -> Result<(), CommandError> {
        let Some(manual) = self.profile.command_for(action, arg) else {
            debug!("Rejected manual command: {} {:?}", action, arg);
            return Err(CommandError::Rejected {
                action: action.to_string(),
            });
        };
        self.send_command(manual.into())
    }

    /// Queue a raw command.
    pub fn send_command(&self, cmd: Command) -> Result<(), CommandError> {
        self.tx.try_send(cmd).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => CommandError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => CommandError::LinkClosed,
        })
    }
}

/// The link protocol state machine.
pub struct LinkProtocol<S> {
    stream: S,
    profile: &'static DeviceProfile,
    state: Arc<DeviceState>,
    network: NetworkStatusHandle,
    commands: mpsc::Receiver<Command>,
    framer: LineFramer,
    last_sensor_request: Millis,
    last_status_request: Millis,
    /// `None` until the first decodable frame.
    last_response: Option<Millis>,
    /// Error from the most recent status frame.
    last_error: Option<String>,
    read_wait: Duration,
    eof: bool,
}

impl<S> LinkProtocol<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create the protocol and the handle used to send it commands.
    pub fn new(
        stream: S,
        profile: &'static DeviceProfile,
        state: Arc<DeviceState>,
        network: NetworkStatusHandle,
    ) -> (Self, LinkHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let link = Self {
            stream,
            profile,
            state,
            network,
            commands: rx,
            framer: LineFramer::default(),
            last_sensor_request: 0,
            last_status_request: 0,
            last_response: None,
            last_error: None,
            read_wait: READ_WAIT,
            eof: false,
        };
        (link, LinkHandle::new(profile, tx))
    }

    /// Override how long each tick waits for input.
    pub fn with_read_wait(mut self, wait: Duration) -> Self {
        self.read_wait = wait;
        self
    }

    /// Run one protocol cycle at time `now`.
    pub async fn tick(&mut self, now: Millis) {
        if now.saturating_sub(self.last_sensor_request) >= SENSOR_INTERVAL_MS {
            self.send(&Command::get_sensors()).await;
            self.last_sensor_request = now;
        }

        if now.saturating_sub(self.last_status_request) >= STATUS_INTERVAL_MS {
            self.send(&Command::get_status()).await;
            self.last_status_request = now;
        }

        while let Ok(cmd) = self.commands.try_recv() {
            self.send(&cmd).await;
        }

        self.drain_input(now).await;
        self.publish_status(now);
    }

    /// True if a frame arrived less than the timeout ago.
    pub fn upstream_connected(&self, now: Millis) -> bool {
        self.last_response
            .is_some_and(|t| now.saturating_sub(t) < UART_TIMEOUT_MS)
    }

    /// Loop at [`LINK_TICK`] until the peer closes the stream.
    pub async fn run(mut self, clock: NodeClock) {
        info!("Link worker started ({} profile)", self.profile.kind);
        let mut interval = tokio::time::interval(LINK_TICK);
        while !self.eof {
            interval.tick().await;
            self.tick(clock.now()).await;
        }
        info!("Link worker stopped");
    }

    /// True once the peer has closed the stream.
    pub fn is_closed(&self) -> bool {
        self.eof
    }

    async fn send(&mut self, cmd: &Command) {
        let line = match encode_command(cmd) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode command {:?}: {}", cmd, e);
                return;
            }
        };

        match tokio::time::timeout(WRITE_WAIT, self.write_line(&line)).await {
            Ok(Ok(())) => debug!("Sent command: {}", line.trim_end()),
            Ok(Err(e)) => warn!("Failed to send command {}: {}", cmd.cmd, e),
            Err(_) => warn!("Dropped command {}: write stalled", cmd.cmd),
        }
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.flush().await
    }

    async fn drain_input(&mut self, now: Millis) {
        if self.eof {
            return;
        }

        let mut buf = [0u8; 256];
        let mut first = true;
        loop {
            let read = if first {
                first = false;
                match tokio::time::timeout(self.read_wait, self.stream.read(&mut buf)).await {
                    Ok(result) => result,
                    Err(_) => return,
                }
            } else {
                match self.stream.read(&mut buf).now_or_never() {
                    Some(result) => result,
                    None => return,
                }
            };

            match read {
                Ok(0) => {
                    warn!("Link stream closed by peer");
                    self.close();
                    return;
                }
                Ok(n) => {
                    for line in self.framer.push(&buf[..n]) {
                        match line {
                            Ok(line) => self.process_line(&line, now),
                            Err(e) => warn!("Dropping link input: {}", e),
                        }
                    }
                }
                Err(e) if is_disconnect(&e) => {
                    warn!("Link stream reset by peer: {}", e);
                    self.close();
                    return;
                }
                Err(e) => {
                    warn!("Link read error: {}", e);
                    return;
                }
            }
        }
    }

    fn close(&mut self) {
        if self.framer.pending() > 0 {
            debug!("Discarding {} bytes of partial line", self.framer.pending());
        }
        self.eof = true;
    }

    fn process_line(&mut self, line: &str, now: Millis) {
        let frame = match decode_frame(line) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("JSON parse error: {} ({})", e, line);
                return;
            }
        };

        self.last_response = Some(now);

        if frame.has_sensor_data(self.profile) {
            self.ingest_sensors(&frame, now);
        }

        if frame.is_status() {
            self.ingest_status(&frame, now);
        }
    }

    fn ingest_sensors(&mut self, frame: &InboundFrame, now: Millis) {
        let readings = self
            .profile
            .sensors
            .iter()
            .map(|sensor| match frame.sensor_value(sensor.key) {
                Some(value) => SensorReading { value, valid: true },
                None => SensorReading::EMPTY,
            })
            .collect();

        self.state.write_sensors(SensorFrame {
            readings,
            last_update: now,
        });
        debug!("Sensor data updated");
    }

    fn ingest_status(&mut self, frame: &InboundFrame, now: Millis) {
        self.last_error = frame.error();
        if let Some(error) = &self.last_error {
            warn!("Controller reported error: {}", error);
        }
        if let Some(wifi) = frame.wifi_connected() {
            debug!("Controller reports WiFi connected: {}", wifi);
        }

        // Any decoded frame proves the controller is alive.
        self.state.write_status(SystemStatus {
            upstream_connected: true,
            network_connected: self.network.is_connected(),
            last_error: self.last_error.clone(),
            last_update: now,
        });
    }

    fn publish_status(&self, now: Millis) {
        self.state.write_status(SystemStatus {
            upstream_connected: self.upstream_connected(now),
            network_connected: self.network.is_connected(),
            last_error: self.last_error.clone(),
            last_update: now,
        });
    }
}

fn is_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
    )
}
