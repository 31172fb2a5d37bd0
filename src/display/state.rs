//! Display row state machine
//!
//! Transitions:
//! - qualifying activity while Dimmed or Off (attached, not suspended) ->
//!   Active, re-emitting mode-set and the last known frame
//! - Active with no activity for `dim_timeout` -> Dimmed
//! - Dimmed with no activity for `idle_timeout`, measured from entry into
//!   Dimmed -> Off
//! - suspend -> Off from any state, canceling the pending timer; resume ->
//!   Active while attached
//!
//! The check-then-transition sequence is a single atomic unit against the
//! activity record: evaluation re-reads the clocks under the same lock that
//! activity updates take, and a generation counter turns timer firings armed
//! against an older schedule into no-ops.

use bytes::Bytes;
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::Notify;

use crate::config::SharedTunables;
use crate::input::ActivitySource;
use crate::protocol::{self, CodecResult, Mode};

/// A device command produced by a state transition
///
/// Commands are emitted after the state lock is released; the payload is the
/// fully encoded report.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetMode(Mode),
    WriteFrame(Bytes),
}

/// A batch of commands produced by one state transition
///
/// `seq` is assigned under the state lock, in commit order. The command
/// sink refuses to write a batch after a higher-sequenced one has been
/// written, so batches reaching the device out of order cannot roll the
/// hardware back to a superseded mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub seq: u64,
    pub commands: Vec<Command>,
}

impl Emission {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Timer schedule snapshot: the generation it was armed against and the
/// deadline to sleep until (`None` while Off)
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub generation: u64,
    pub deadline: Option<Instant>,
}

struct Inner {
    mode: Mode,
    attached: bool,
    suspended: bool,
    last_activity: Instant,
    last_source: ActivitySource,
    /// Entry time into Dimmed; the idle clock runs from here, not from the
    /// original activity
    dimmed_at: Option<Instant>,
    generation: u64,
    /// Outbound command sequence; advances once per non-empty emission
    seq: u64,
    /// Last known frame, already encoded as a frame report
    frame: Bytes,
}

/// The display row state machine
pub struct DisplayState {
    tunables: SharedTunables,
    inner: Mutex<Inner>,
    rearm: Notify,
}

impl DisplayState {
    /// Create a state machine for a freshly attached device
    ///
    /// Starts in `Active` with the given frame payload as the last known
    /// frame. The caller dispatches [`DisplayState::initial_commands`] to
    /// bring the hardware in line with the in-memory state.
    pub fn new(tunables: SharedTunables, frame_payload: &[u8], now: Instant) -> CodecResult<Self> {
        let frame = protocol::encode_frame(frame_payload)?;

        Ok(Self {
            tunables,
            inner: Mutex::new(Inner {
                mode: Mode::Active,
                attached: true,
                suspended: false,
                last_activity: now,
                last_source: ActivitySource::Wake,
                dimmed_at: None,
                generation: 0,
                seq: 0,
                frame,
            }),
            rearm: Notify::new(),
        })
    }

    /// Current mode
    pub fn mode(&self) -> Mode {
        self.inner.lock().unwrap().mode
    }

    /// Whether the backing device is still attached
    pub fn is_attached(&self) -> bool {
        self.inner.lock().unwrap().attached
    }

    /// Commands bringing a freshly attached device into the Active state
    pub fn initial_commands(&self) -> Emission {
        let mut inner = self.inner.lock().unwrap();
        let commands = vec![
            Command::SetMode(Mode::Active),
            Command::WriteFrame(inner.frame.clone()),
        ];
        Self::emit(&mut inner, commands)
    }

    fn emit(inner: &mut Inner, commands: Vec<Command>) -> Emission {
        if !commands.is_empty() {
            inner.seq += 1;
        }
        Emission {
            seq: inner.seq,
            commands,
        }
    }

    /// Wait until the timer schedule must be recomputed
    pub async fn rearmed(&self) {
        self.rearm.notified().await;
    }

    /// Force the timer schedule to be recomputed (after a tunable change)
    pub fn reschedule(&self) {
        self.rearm.notify_one();
    }

    /// Snapshot the timer schedule for the current state
    pub fn schedule(&self) -> Schedule {
        let (dim, idle) = {
            let t = self.tunables.lock().unwrap();
            (t.dim_timeout, t.idle_timeout)
        };
        let inner = self.inner.lock().unwrap();

        let deadline = match inner.mode {
            Mode::Active => Some(inner.last_activity + dim),
            Mode::Dimmed => inner.dimmed_at.map(|entered| entered + idle),
            Mode::Off => None,
        };

        Schedule {
            generation: inner.generation,
            deadline,
        }
    }

    /// Record a qualifying activity event
    ///
    /// Resets the activity clock and wakes the row out of Dimmed/Off. A
    /// no-op while detached or suspended.
    pub fn record_activity(&self, source: ActivitySource, now: Instant) -> Emission {
        let mut inner = self.inner.lock().unwrap();

        if !inner.attached || inner.suspended {
            return Self::emit(&mut inner, Vec::new());
        }

        // Only the most recent timestamp matters
        if now > inner.last_activity {
            inner.last_activity = now;
            inner.last_source = source;
        }
        inner.generation += 1;
        self.rearm.notify_one();

        let commands = match inner.mode {
            Mode::Active => Vec::new(),
            Mode::Dimmed | Mode::Off => {
                tracing::debug!("activity ({:?}) wakes the row", source);
                inner.mode = Mode::Active;
                inner.dimmed_at = None;
                vec![
                    Command::SetMode(Mode::Active),
                    Command::WriteFrame(inner.frame.clone()),
                ]
            }
        };
        Self::emit(&mut inner, commands)
    }

    /// Evaluate timeouts for a timer fired against `generation`
    ///
    /// A stale generation means the schedule changed after the timer was
    /// armed; the firing is discarded. Re-evaluation after a transition is
    /// idempotent and emits nothing.
    pub fn evaluate(&self, generation: u64, now: Instant) -> Emission {
        let (dim, idle) = {
            let t = self.tunables.lock().unwrap();
            (t.dim_timeout, t.idle_timeout)
        };
        let mut inner = self.inner.lock().unwrap();

        if generation != inner.generation || !inner.attached || inner.suspended {
            return Self::emit(&mut inner, Vec::new());
        }

        let commands = match inner.mode {
            Mode::Active if now >= inner.last_activity + dim => {
                tracing::debug!("no activity for {:?}, dimming", dim);
                inner.mode = Mode::Dimmed;
                inner.dimmed_at = Some(now);
                vec![Command::SetMode(Mode::Dimmed)]
            }
            Mode::Dimmed
                if inner
                    .dimmed_at
                    .is_some_and(|entered| now >= entered + idle) =>
            {
                tracing::debug!("dimmed for {:?}, turning off", idle);
                inner.mode = Mode::Off;
                inner.dimmed_at = None;
                vec![Command::SetMode(Mode::Off)]
            }
            _ => Vec::new(),
        };
        Self::emit(&mut inner, commands)
    }

    /// Force the row off for host suspend
    ///
    /// Bumps the generation so any in-flight timer firing is discarded; no
    /// late dim/off command can be emitted afterwards.
    pub fn suspend(&self) -> Emission {
        let mut inner = self.inner.lock().unwrap();

        inner.suspended = true;
        inner.generation += 1;
        inner.dimmed_at = None;
        self.rearm.notify_one();

        if inner.mode == Mode::Off {
            return Self::emit(&mut inner, Vec::new());
        }
        inner.mode = Mode::Off;
        Self::emit(&mut inner, vec![Command::SetMode(Mode::Off)])
    }

    /// Resume after host suspend
    ///
    /// Goes Active while the device is attached; a detached machine stays
    /// off until a fresh one is built on reattach.
    pub fn resume(&self, now: Instant) -> Emission {
        let mut inner = self.inner.lock().unwrap();

        inner.suspended = false;
        inner.generation += 1;
        self.rearm.notify_one();

        if !inner.attached {
            return Self::emit(&mut inner, Vec::new());
        }

        inner.mode = Mode::Active;
        inner.last_activity = now;
        inner.last_source = ActivitySource::Wake;
        inner.dimmed_at = None;
        let commands = vec![
            Command::SetMode(Mode::Active),
            Command::WriteFrame(inner.frame.clone()),
        ];
        Self::emit(&mut inner, commands)
    }

    /// Mark the backing device gone; all further operations become no-ops
    ///
    /// The in-memory mode goes Off without commands: there is no transport
    /// left to write to.
    pub fn detach(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.attached = false;
        inner.mode = Mode::Off;
        inner.dimmed_at = None;
        inner.generation += 1;
        self.rearm.notify_one();
    }

    /// Replace the last known frame
    ///
    /// Validated through the codec; while Active the new frame is pushed
    /// immediately, otherwise it is shown on the next wake.
    pub fn set_frame(&self, payload: &[u8]) -> CodecResult<Emission> {
        let frame = protocol::encode_frame(payload)?;
        let mut inner = self.inner.lock().unwrap();
        inner.frame = frame.clone();

        let commands = if inner.attached && inner.mode == Mode::Active {
            vec![Command::WriteFrame(frame)]
        } else {
            Vec::new()
        };
        Ok(Self::emit(&mut inner, commands))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tunables;
    use crate::protocol::FRAME_PAYLOAD_LEN;
    use std::time::Duration;

    const SECS: fn(u64) -> Duration = Duration::from_secs;

    fn machine(idle_secs: u64, dim_secs: u64, now: Instant) -> DisplayState {
        let tunables = Tunables {
            idle_timeout: SECS(idle_secs),
            dim_timeout: SECS(dim_secs),
            ..Default::default()
        }
        .shared();
        DisplayState::new(tunables, &[0u8; FRAME_PAYLOAD_LEN], now).unwrap()
    }

    fn assert_mode_set(emission: &Emission, mode: Mode) {
        assert!(
            emission.commands.contains(&Command::SetMode(mode)),
            "expected mode-set {:?} in {:?}",
            mode,
            emission.commands
        );
    }

    #[test]
    fn test_starts_active_with_frame() {
        let t0 = Instant::now();
        let state = machine(60, 5, t0);

        assert_eq!(state.mode(), Mode::Active);
        let emission = state.initial_commands();
        assert_eq!(emission.commands.len(), 2);
        assert_mode_set(&emission, Mode::Active);
        assert!(matches!(emission.commands[1], Command::WriteFrame(_)));
    }

    #[test]
    fn test_dim_then_off_on_default_schedule() {
        // idle_timeout=60, dim_timeout=5: Dimmed at t=5s, Off at t=65s
        let t0 = Instant::now();
        let state = machine(60, 5, t0);
        let gen = state.schedule().generation;

        assert!(state.evaluate(gen, t0 + SECS(4)).is_empty());

        let commands = state.evaluate(gen, t0 + SECS(5));
        assert_mode_set(&commands, Mode::Dimmed);
        assert_eq!(state.mode(), Mode::Dimmed);

        // idle clock runs from entry into Dimmed, not from t0
        assert!(state.evaluate(gen, t0 + SECS(64)).is_empty());

        let commands = state.evaluate(gen, t0 + SECS(65));
        assert_mode_set(&commands, Mode::Off);
        assert_eq!(state.mode(), Mode::Off);
    }

    #[test]
    fn test_dim_evaluation_is_idempotent() {
        let t0 = Instant::now();
        let state = machine(60, 5, t0);
        let gen = state.schedule().generation;

        let first = state.evaluate(gen, t0 + SECS(6));
        assert_mode_set(&first, Mode::Dimmed);

        // Re-evaluation at the same point must not re-emit the command
        assert!(state.evaluate(gen, t0 + SECS(6)).is_empty());
    }

    #[test]
    fn test_activity_in_dimmed_wakes_and_resets_clock() {
        let t0 = Instant::now();
        let state = machine(60, 5, t0);
        let gen = state.schedule().generation;

        state.evaluate(gen, t0 + SECS(5));
        assert_eq!(state.mode(), Mode::Dimmed);

        // activity at t=6s -> immediately Active, frame re-emitted
        let emission = state.record_activity(ActivitySource::Key, t0 + SECS(6));
        assert_mode_set(&emission, Mode::Active);
        assert!(emission
            .commands
            .iter()
            .any(|c| matches!(c, Command::WriteFrame(_))));
        assert_eq!(state.mode(), Mode::Active);

        // clock reset to t=6s: not dimmed again before t=11s
        let gen = state.schedule().generation;
        assert!(state.evaluate(gen, t0 + SECS(10)).is_empty());
        assert_mode_set(&state.evaluate(gen, t0 + SECS(11)), Mode::Dimmed);
    }

    #[test]
    fn test_activity_while_active_emits_nothing() {
        let t0 = Instant::now();
        let state = machine(60, 5, t0);

        assert!(state
            .record_activity(ActivitySource::Touch, t0 + SECS(1))
            .is_empty());
        assert_eq!(state.mode(), Mode::Active);

        // but the dim clock moved
        let gen = state.schedule().generation;
        assert!(state.evaluate(gen, t0 + SECS(5)).is_empty());
        assert_mode_set(&state.evaluate(gen, t0 + SECS(6)), Mode::Dimmed);
    }

    #[test]
    fn test_suspend_cancels_pending_timer() {
        let t0 = Instant::now();
        let state = machine(60, 5, t0);
        let armed = state.schedule();

        let commands = state.suspend();
        assert_mode_set(&commands, Mode::Off);
        assert_eq!(state.mode(), Mode::Off);

        // a timer armed before the suspend fires into a stale generation:
        // no late mode-set(Dimmed)
        assert!(state.evaluate(armed.generation, t0 + SECS(5)).is_empty());
        assert_eq!(state.schedule().deadline, None);
    }

    #[test]
    fn test_activity_while_suspended_is_ignored() {
        let t0 = Instant::now();
        let state = machine(60, 5, t0);
        state.suspend();

        assert!(state
            .record_activity(ActivitySource::Key, t0 + SECS(1))
            .is_empty());
        assert_eq!(state.mode(), Mode::Off);
    }

    #[test]
    fn test_resume_goes_active_while_attached() {
        let t0 = Instant::now();
        let state = machine(60, 5, t0);
        state.suspend();

        let commands = state.resume(t0 + SECS(10));
        assert_mode_set(&commands, Mode::Active);
        assert_eq!(state.mode(), Mode::Active);

        // dim clock restarts from the resume
        let gen = state.schedule().generation;
        assert!(state.evaluate(gen, t0 + SECS(14)).is_empty());
        assert_mode_set(&state.evaluate(gen, t0 + SECS(15)), Mode::Dimmed);
    }

    #[test]
    fn test_detached_machine_is_inert() {
        let t0 = Instant::now();
        let state = machine(60, 5, t0);
        state.detach();

        assert_eq!(state.mode(), Mode::Off);
        assert!(!state.is_attached());
        assert!(state
            .record_activity(ActivitySource::Key, t0 + SECS(1))
            .is_empty());
        assert!(state.resume(t0 + SECS(2)).is_empty());
        let gen = state.schedule().generation;
        assert!(state.evaluate(gen, t0 + SECS(100)).is_empty());
    }

    #[test]
    fn test_stale_generation_is_discarded() {
        let t0 = Instant::now();
        let state = machine(60, 5, t0);
        let armed = state.schedule();

        // activity re-arms the schedule; the old firing must not dim using
        // the stale clock
        state.record_activity(ActivitySource::Key, t0 + SECS(4));
        assert!(state.evaluate(armed.generation, t0 + SECS(5)).is_empty());
        assert_eq!(state.mode(), Mode::Active);
    }

    #[test]
    fn test_idle_shorter_than_dim_still_passes_through_dimmed() {
        // idle_timeout < dim_timeout is accepted unvalidated: the row dims
        // at dim_timeout and goes off idle_timeout after that
        let t0 = Instant::now();
        let state = machine(2, 5, t0);
        let gen = state.schedule().generation;

        assert_mode_set(&state.evaluate(gen, t0 + SECS(5)), Mode::Dimmed);
        assert!(state.evaluate(gen, t0 + SECS(6)).is_empty());
        assert_mode_set(&state.evaluate(gen, t0 + SECS(7)), Mode::Off);
    }

    #[test]
    fn test_schedule_tracks_mode() {
        let t0 = Instant::now();
        let state = machine(60, 5, t0);

        assert_eq!(state.schedule().deadline, Some(t0 + SECS(5)));

        let gen = state.schedule().generation;
        state.evaluate(gen, t0 + SECS(5));
        assert_eq!(state.schedule().deadline, Some(t0 + SECS(65)));

        state.evaluate(gen, t0 + SECS(65));
        assert_eq!(state.schedule().deadline, None);
    }

    #[test]
    fn test_set_frame_pushes_only_while_active() {
        let t0 = Instant::now();
        let state = machine(60, 5, t0);

        let emission = state.set_frame(&[1u8; FRAME_PAYLOAD_LEN]).unwrap();
        assert_eq!(emission.commands.len(), 1);

        state.suspend();
        let emission = state.set_frame(&[2u8; FRAME_PAYLOAD_LEN]).unwrap();
        assert!(emission.is_empty());

        // the stored frame is the new one after the next wake
        state.resume(t0 + SECS(1));
        let emission = state.initial_commands();
        match &emission.commands[1] {
            Command::WriteFrame(report) => assert_eq!(report[1], 2),
            other => panic!("expected frame write, got {:?}", other),
        }
    }

    #[test]
    fn test_emissions_carry_commit_order() {
        let t0 = Instant::now();
        let state = machine(60, 5, t0);

        let first = state.initial_commands();
        let gen = state.schedule().generation;
        let dimmed = state.evaluate(gen, t0 + SECS(5));
        let woken = state.record_activity(ActivitySource::Key, t0 + SECS(6));

        assert!(first.seq < dimmed.seq);
        assert!(dimmed.seq < woken.seq);

        // emitting nothing does not advance the sequence
        let quiet = state.record_activity(ActivitySource::Key, t0 + SECS(7));
        assert!(quiet.is_empty());
        assert_eq!(quiet.seq, woken.seq);
    }

    #[test]
    fn test_rejects_short_frame_payload() {
        let t0 = Instant::now();
        let state = machine(60, 5, t0);
        assert!(state.set_frame(&[0u8; FRAME_PAYLOAD_LEN - 1]).is_err());
    }
}
