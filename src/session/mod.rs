//! Session module - owns the device and wires everything together
//!
//! One session exists per attached device: it holds the device handle,
//! builds a fresh display state machine on attach, runs the report read
//! loop and the dim/idle timer task, and forwards suspend/resume. Nothing
//! survives a detach; reattachment starts from scratch.
//!
//! Writes to the device go through a dedicated I/O lock distinct from the
//! display state lock, so the transport can never block the input path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::{ConfigError, FnMode, SharedTunables};
use crate::display::{fn_row_frame, Command, DisplayState, Emission};
use crate::input::{remap, ActivityMonitor, ActivitySource, InputEvent, LogicalAction};
use crate::protocol::{self, CodecError, Incoming};
use crate::transport::{DeviceHandle, DeviceIdentity, Transport, TransportError};

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No device attached")]
    NoDevice,

    #[error("Device already attached")]
    AlreadyAttached,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Events emitted by the session controller
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A device was attached and the row brought up
    Attached { identity: DeviceIdentity },
    /// The device went away (transport closed or errored)
    Detached { reason: String },
    /// A command write failed after its retry; the controller's owner
    /// decides whether to force a detach/reattach cycle
    DeviceError { reason: String },
    /// A remapped key event from the row
    Action {
        action: LogicalAction,
        pressed: bool,
    },
}

/// Serializes command writes to the device
///
/// Batches are written whole under one I/O lock, in emission-sequence
/// order: the timer and input contexts both commit transitions under the
/// state lock first, so whichever batch reaches the device later but was
/// committed earlier is superseded and dropped instead of rolling the
/// hardware back.
///
/// A failed write is retried exactly once; a second failure raises a single
/// device-error event instead of looping, and the rest of the batch is
/// abandoned. The display mode was already committed optimistically by the
/// state machine.
pub struct CommandSink {
    transport: Arc<dyn Transport>,
    /// I/O lock; the guarded value is the sequence of the last batch written
    io_lock: Mutex<u64>,
    event_tx: mpsc::Sender<SessionEvent>,
}

impl CommandSink {
    pub fn new(transport: Arc<dyn Transport>, event_tx: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            transport,
            io_lock: Mutex::new(0),
            event_tx,
        }
    }

    /// Send one transition's commands, preserving commit order
    pub async fn dispatch(&self, emission: Emission) {
        if emission.is_empty() {
            return;
        }

        let mut last_written = self.io_lock.lock().await;
        if emission.seq < *last_written {
            tracing::debug!(
                "dropping superseded transition write (seq {} < {})",
                emission.seq,
                *last_written
            );
            return;
        }
        *last_written = emission.seq;

        for command in emission.commands {
            let report = match &command {
                Command::SetMode(mode) => protocol::encode_mode_set(*mode),
                Command::WriteFrame(report) => report.clone(),
            };

            if let Err(first) = self.transport.write_report(&report).await {
                tracing::warn!("report write failed, retrying once: {}", first);

                if let Err(second) = self.transport.write_report(&report).await {
                    tracing::error!("report write failed after retry: {}", second);
                    let _ = self
                        .event_tx
                        .send(SessionEvent::DeviceError {
                            reason: second.to_string(),
                        })
                        .await;
                    return;
                }
            }
        }
    }
}

struct ActiveSession {
    display: Arc<DisplayState>,
    sink: Arc<CommandSink>,
    read_task: JoinHandle<()>,
    monitor_task: JoinHandle<()>,
    /// Absent while suspended; respawned on resume
    timer_task: Option<JoinHandle<()>>,
}

impl ActiveSession {
    fn abort(&mut self) {
        self.read_task.abort();
        self.monitor_task.abort();
        if let Some(timer) = self.timer_task.take() {
            timer.abort();
        }
    }
}

/// Top-level orchestrator for one display row device
pub struct SessionController {
    tunables: SharedTunables,
    event_tx: mpsc::Sender<SessionEvent>,
    event_rx: Option<mpsc::Receiver<SessionEvent>>,
    input_tx: mpsc::Sender<InputEvent>,
    input_rx: Arc<Mutex<mpsc::Receiver<InputEvent>>>,
    active: Option<ActiveSession>,
}

impl SessionController {
    pub fn new(tunables: SharedTunables) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (input_tx, input_rx) = mpsc::channel(256);

        Self {
            tunables,
            event_tx,
            event_rx: Some(event_rx),
            input_tx,
            input_rx: Arc::new(Mutex::new(input_rx)),
            active: None,
        }
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.event_rx.take()
    }

    /// Sender for paired input sources to feed events into
    pub fn input_sender(&self) -> mpsc::Sender<InputEvent> {
        self.input_tx.clone()
    }

    pub fn is_attached(&self) -> bool {
        self.active.is_some()
    }

    /// Bring up a freshly discovered device
    pub async fn attach(&mut self, handle: DeviceHandle) -> SessionResult<()> {
        if self.active.is_some() {
            return Err(SessionError::AlreadyAttached);
        }

        let identity = handle.identity().clone();
        let transport = handle.transport();
        let fn_mode = self.tunables.lock().unwrap().fn_mode;

        let display = Arc::new(DisplayState::new(
            self.tunables.clone(),
            &fn_row_frame(fn_mode),
            Instant::now(),
        )?);
        let sink = Arc::new(CommandSink::new(transport.clone(), self.event_tx.clone()));

        sink.dispatch(display.initial_commands()).await;

        let fn_held = Arc::new(AtomicBool::new(false));

        let read_task = tokio::spawn(read_loop(
            transport,
            display.clone(),
            sink.clone(),
            self.tunables.clone(),
            fn_held.clone(),
            self.event_tx.clone(),
        ));

        let monitor = ActivityMonitor::new(display.clone(), fn_held);
        let monitor_task = tokio::spawn(monitor_loop(
            monitor,
            self.input_rx.clone(),
            sink.clone(),
        ));

        let timer_task = tokio::spawn(timer_loop(display.clone(), sink.clone()));

        self.active = Some(ActiveSession {
            display,
            sink,
            read_task,
            monitor_task,
            timer_task: Some(timer_task),
        });

        tracing::info!("display row attached: {}", identity);
        let _ = self
            .event_tx
            .send(SessionEvent::Attached { identity })
            .await;

        Ok(())
    }

    /// Tear the session down; the device handle and all state are dropped
    pub async fn detach(&mut self, reason: &str) {
        let Some(mut session) = self.active.take() else {
            return;
        };

        session.abort();
        session.display.detach();

        tracing::info!("display row detached: {}", reason);
        let _ = self
            .event_tx
            .send(SessionEvent::Detached {
                reason: reason.to_string(),
            })
            .await;
    }

    /// Forward a host suspend: row off, pending timer canceled before return
    pub async fn suspend(&mut self) -> SessionResult<()> {
        let Some(session) = self.active.as_mut() else {
            return Ok(());
        };

        if let Some(timer) = session.timer_task.take() {
            timer.abort();
        }

        let commands = session.display.suspend();
        session.sink.dispatch(commands).await;
        Ok(())
    }

    /// Forward a host resume
    pub async fn resume(&mut self) -> SessionResult<()> {
        let Some(session) = self.active.as_mut() else {
            // No device: stays pending until a fresh attach brings the row up
            return Ok(());
        };

        let commands = session.display.resume(Instant::now());
        session.sink.dispatch(commands).await;

        if session.timer_task.is_none() {
            session.timer_task = Some(tokio::spawn(timer_loop(
                session.display.clone(),
                session.sink.clone(),
            )));
        }
        Ok(())
    }

    /// Shut down, releasing any attached device
    pub async fn shutdown(&mut self) {
        self.detach("shutting down").await;
    }

    // Runtime tunable surface. Changes take effect on the next transition
    // evaluation, not retroactively.

    pub fn idle_timeout_secs(&self) -> u64 {
        self.tunables.lock().unwrap().idle_timeout.as_secs()
    }

    pub fn set_idle_timeout_secs(&self, secs: u64) {
        self.tunables.lock().unwrap().idle_timeout = std::time::Duration::from_secs(secs);
        self.reschedule();
    }

    pub fn dim_timeout_secs(&self) -> u64 {
        self.tunables.lock().unwrap().dim_timeout.as_secs()
    }

    pub fn set_dim_timeout_secs(&self, secs: u64) {
        self.tunables.lock().unwrap().dim_timeout = std::time::Duration::from_secs(secs);
        self.reschedule();
    }

    pub fn fn_mode(&self) -> FnMode {
        self.tunables.lock().unwrap().fn_mode
    }

    /// Set the default function key mode from its raw tunable value
    ///
    /// Out-of-range values are rejected and the previous value retained.
    pub fn set_fn_mode_raw(&self, raw: u8) -> SessionResult<()> {
        let mode =
            FnMode::try_from(raw).map_err(|_| ConfigError::OutOfRange("fn_mode", raw as u64))?;
        self.tunables.lock().unwrap().fn_mode = mode;
        Ok(())
    }

    fn reschedule(&self) {
        if let Some(session) = &self.active {
            session.display.reschedule();
        }
    }
}

/// Read loop over the transport endpoint
///
/// Malformed reports are logged and dropped; unrecognized identifiers are
/// ignored; a transport error ends the loop with a detach event.
async fn read_loop(
    transport: Arc<dyn Transport>,
    display: Arc<DisplayState>,
    sink: Arc<CommandSink>,
    tunables: SharedTunables,
    fn_held: Arc<AtomicBool>,
    event_tx: mpsc::Sender<SessionEvent>,
) {
    let mut buf = [0u8; 256];

    let reason = loop {
        match transport.read_report(&mut buf).await {
            Ok(0) => continue,
            Ok(n) => match protocol::decode_incoming(&buf[..n]) {
                Ok(Incoming::Key { code, pressed }) => {
                    let fn_mode = tunables.lock().unwrap().fn_mode;
                    let action = remap(code, fn_mode, fn_held.load(Ordering::SeqCst));

                    let commands = display.record_activity(ActivitySource::Key, Instant::now());
                    sink.dispatch(commands).await;

                    let _ = event_tx
                        .send(SessionEvent::Action { action, pressed })
                        .await;
                }
                Ok(Incoming::Unrecognized) => {
                    tracing::trace!("ignoring unrecognized report ({} bytes)", n);
                }
                Err(e) => {
                    tracing::warn!("dropping malformed report: {}", e);
                }
            },
            Err(e) => break e.to_string(),
        }
    };

    let _ = event_tx
        .send(SessionEvent::Detached { reason })
        .await;
}

/// Activity monitor loop over the paired input sources
async fn monitor_loop(
    monitor: ActivityMonitor,
    input_rx: Arc<Mutex<mpsc::Receiver<InputEvent>>>,
    sink: Arc<CommandSink>,
) {
    let mut rx = input_rx.lock().await;
    while let Some(event) = rx.recv().await {
        let commands = monitor.handle_event(&event);
        if !commands.is_empty() {
            sink.dispatch(commands).await;
        }
    }
}

/// Deferred dim/idle timer
///
/// Sleeps until the next scheduled deadline, re-arming whenever the state
/// machine changes its schedule. The generation snapshot makes a firing
/// against an outdated schedule a no-op.
async fn timer_loop(display: Arc<DisplayState>, sink: Arc<CommandSink>) {
    loop {
        let schedule = display.schedule();

        let sleeper = async {
            match schedule.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = display.rearmed() => continue,
            _ = sleeper => {
                let commands = display.evaluate(schedule.generation, Instant::now());
                sink.dispatch(commands).await;
            }
        }
    }
}
