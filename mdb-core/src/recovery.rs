//! Error handling and recovery
//!
//! Every reported error goes through the same steps:
//!
//! 1. an [`ErrorLogEntry`] snapshot is recorded and logged
//! 2. the recovery plan for the kind is executed
//! 3. the burst limiter may disable the reader
//! 4. repeated serious errors trigger a log dump
//!
//! Recovery steps talk to the bus through internal operations that only
//! record their own failures. They never report back into
//! [`CashlessDevice::handle_error`], so a failing recovery cannot recurse.

use embedded_hal::delay::DelayNs;
use heapless::Vec;
use mdb_hal::{Clock, Field, LogSink, MdbUart};
use mdb_protocol::constants::RET;
use mdb_protocol::{Command, ReaderCommand};

use crate::audit::{ErrorLog, ErrorLogEntry};
use crate::device::CashlessDevice;
use crate::error::ErrorKind;
use crate::state::{Phase, State};
use crate::timing::{
    ERROR_BURST_WINDOW_MS, MAX_BURST_ERRORS, MAX_NAK_RETRIES, RESET_HOLD_MS,
    SERIOUS_ERRORS_BEFORE_DUMP,
};

/// One step of a recovery plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecoveryAction {
    /// Retransmit the last command
    Resend,
    /// RESET the reader and replay SETUP
    Reset,
    /// Ask the reader to retransmit (RET)
    RequestRetransmit,
    /// End the session locally and tell the reader
    CompleteSession,
    /// Report the vend in progress as failed
    FailVend,
    DisableReader,
    /// Hold for [`RESET_HOLD_MS`]
    Pause,
    EnableReader,
}

/// Ordered recovery steps for one error
pub type RecoveryPlan = Vec<RecoveryAction, 5>;

/// Recovery policy and bookkeeping
#[derive(Debug, Default)]
pub struct ErrorManager {
    /// NAKs answered with a resend since the last reset of the count
    nak_retries: u8,
    /// Errors in the current burst
    burst: u8,
    /// Time of the previous error, `None` before the first one
    last_error_at: Option<u32>,
    /// Serious errors since the last dump
    serious: u8,
    log: ErrorLog,
}

impl ErrorManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide the recovery steps for `kind` reported in `state`
    ///
    /// Advances the NAK retry count: the first [`MAX_NAK_RETRIES`] NAKs
    /// resend, the next one resets and clears the count.
    pub fn plan(&mut self, kind: ErrorKind, state: State) -> RecoveryPlan {
        use RecoveryAction::*;

        let steps: &[RecoveryAction] = match kind {
            ErrorKind::Nak => {
                if self.nak_retries < MAX_NAK_RETRIES {
                    self.nak_retries += 1;
                    &[Resend]
                } else {
                    self.nak_retries = 0;
                    &[Reset]
                }
            }
            ErrorKind::Timeout if state != State::Inactive => &[Reset],
            ErrorKind::Timeout => &[],
            ErrorKind::Checksum => &[RequestRetransmit],
            ErrorKind::State if state.phase() > Phase::Enabled => &[CompleteSession],
            ErrorKind::State => &[],
            ErrorKind::Sequence if state.phase() > Phase::Enabled => &[CompleteSession],
            ErrorKind::Sequence => &[Reset],
            ErrorKind::Funds if state == State::Vend => &[FailVend],
            ErrorKind::Funds => &[],
            ErrorKind::Hardware => &[DisableReader, Pause, Reset],
            ErrorKind::Communication => &[DisableReader, Pause, Reset, Pause, EnableReader],
            ErrorKind::Parameter => &[],
        };

        // Longest plan has five steps
        Vec::from_slice(steps).unwrap_or_default()
    }

    /// Count an error at `now` towards the current burst
    ///
    /// An error within [`ERROR_BURST_WINDOW_MS`] of the previous one extends
    /// the burst, anything later starts a new one. Returns `true` once the
    /// burst exceeds [`MAX_BURST_ERRORS`]; the burst then starts over.
    pub fn note_burst(&mut self, now: u32) -> bool {
        let continues = matches!(
            self.last_error_at,
            Some(at) if now.wrapping_sub(at) < ERROR_BURST_WINDOW_MS
        );
        self.last_error_at = Some(now);
        self.burst = if continues {
            self.burst.saturating_add(1)
        } else {
            1
        };

        if self.burst > MAX_BURST_ERRORS {
            self.burst = 0;
            true
        } else {
            false
        }
    }

    /// Count a serious error; `true` when a log dump is due
    pub fn note_serious(&mut self, kind: ErrorKind) -> bool {
        if !kind.is_serious() {
            return false;
        }
        self.serious += 1;
        if self.serious >= SERIOUS_ERRORS_BEFORE_DUMP {
            self.serious = 0;
            true
        } else {
            false
        }
    }

    pub fn record(&mut self, entry: ErrorLogEntry) {
        self.log.push(entry);
    }

    pub fn log(&self) -> &ErrorLog {
        &self.log
    }

    pub fn nak_retries(&self) -> u8 {
        self.nak_retries
    }

    /// Clear retry, burst and serious counters; the log is kept
    pub fn reset_counters(&mut self) {
        self.nak_retries = 0;
        self.burst = 0;
        self.last_error_at = None;
        self.serious = 0;
    }
}

impl<U, C, D, S> CashlessDevice<U, C, D, S>
where
    U: MdbUart,
    C: Clock,
    D: DelayNs,
    S: LogSink,
{
    /// Report an error and run its recovery
    pub fn handle_error(&mut self, kind: ErrorKind) {
        let now = self.clock.now_ms();
        self.record_error(kind);

        for action in self.errors.plan(kind, self.session.state) {
            self.recover(action);
        }

        if self.errors.note_burst(now) {
            self.log.error("error.burst", &[Field::new("kind", kind.name())]);
            if let Err(failed) = self.recover_disable() {
                self.record_error(failed);
            }
        }

        if self.errors.note_serious(kind) {
            self.dump_logs();
        }
    }

    /// Append an error snapshot without running any recovery
    pub(crate) fn record_error(&mut self, kind: ErrorKind) {
        let entry = ErrorLogEntry {
            timestamp: self.clock.now_ms(),
            error: kind,
            state: self.session.state,
            last_command: self.transport.last_command(),
            last_response: self.transport.last_response(),
        };
        self.errors.record(entry);
        self.log.error(
            "error",
            &[
                Field::new("kind", kind.name()),
                Field::new("state", entry.state.name()),
                Field::new("cmd", entry.last_command),
                Field::new("rsp", entry.last_response),
            ],
        );
    }

    fn recover(&mut self, action: RecoveryAction) {
        self.log.debug("recovery", &[Field::new("step", action_name(action))]);

        let result = match action {
            RecoveryAction::Resend => self.resend_last(),
            RecoveryAction::Reset => self.full_reset(),
            RecoveryAction::RequestRetransmit => self.request_retransmit(),
            RecoveryAction::CompleteSession => {
                self.force_session_complete();
                Ok(())
            }
            RecoveryAction::FailVend => {
                self.force_vend_failure(Some(ErrorKind::Funds));
                Ok(())
            }
            RecoveryAction::DisableReader => self.recover_disable(),
            RecoveryAction::Pause => {
                self.delay.delay_ms(RESET_HOLD_MS);
                Ok(())
            }
            RecoveryAction::EnableReader => self.recover_enable(),
        };

        if let Err(kind) = result {
            self.log.warn(
                "recovery.failed",
                &[
                    Field::new("step", action_name(action)),
                    Field::new("kind", kind.name()),
                ],
            );
            self.record_error(kind);
        }
    }

    /// Send RET and settle whatever the reader repeats
    fn request_retransmit(&mut self) -> Result<(), ErrorKind> {
        self.transport.send_raw(&[RET])?;
        let reply = self.await_reply()?;
        self.settle_reply(reply)
    }

    /// RESET followed by SETUP with the stored settings
    fn full_reset(&mut self) -> Result<(), ErrorKind> {
        self.reset_inner()?;
        self.setup_inner()
    }

    /// Send READER DISABLE; only an enabled reader changes state
    fn recover_disable(&mut self) -> Result<(), ErrorKind> {
        self.expect_ack(Command::Reader(ReaderCommand::Disable))?;
        if self.session.state.in_session() {
            self.close_session(State::Disabled);
        } else if self.session.state.is_enabled() {
            self.set_state(State::Disabled);
        }
        Ok(())
    }

    /// Re-enable after a reset; a reader that did not come back is skipped
    fn recover_enable(&mut self) -> Result<(), ErrorKind> {
        if self.session.state != State::Disabled {
            return Ok(());
        }
        self.enable_inner()
    }
}

fn action_name(action: RecoveryAction) -> &'static str {
    match action {
        RecoveryAction::Resend => "resend",
        RecoveryAction::Reset => "reset",
        RecoveryAction::RequestRetransmit => "ret",
        RecoveryAction::CompleteSession => "session_complete",
        RecoveryAction::FailVend => "vend_failure",
        RecoveryAction::DisableReader => "disable",
        RecoveryAction::Pause => "pause",
        RecoveryAction::EnableReader => "enable",
    }
}
