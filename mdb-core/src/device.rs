//! Cashless device context
//!
//! [`CashlessDevice`] owns the transport, the session, the message queue,
//! the error manager and the audit logs. Host actions live here; response
//! dispatch is in [`crate::dispatch`], error recovery in [`crate::recovery`]
//! and the periodic tick in [`crate::poll`].
//!
//! Public operations check the state machine before touching the bus and
//! report any failure through [`CashlessDevice::handle_error`] before
//! returning it. The `*_inner` variants are the same exchanges without the
//! reporting; recovery uses them.

use embedded_hal::delay::DelayNs;
use mdb_hal::{Clock, Field, LogSink, MdbUart};
use mdb_protocol::constants::RSP_JUST_RESET;
use mdb_protocol::{
    Command, Frame, ReaderCommand, ReaderConfig, Reply, Response, RevalueCommand,
    SetupCommand, VendCommand,
};

use crate::audit::{ErrorLog, TransactionLog, TransactionLogEntry, TransactionType};
use crate::config::DeviceSettings;
use crate::error::ErrorKind;
use crate::logger::Logger;
use crate::queue::{Message, MessageQueue};
use crate::recovery::ErrorManager;
use crate::state::{Event, PendingVend, Session, State};
use crate::transport::Transport;

/// One MDB cashless reader and everything the engine knows about it
pub struct CashlessDevice<U, C, D, S> {
    pub(crate) transport: Transport<U>,
    pub(crate) clock: C,
    pub(crate) delay: D,
    pub(crate) log: Logger<S>,
    pub(crate) settings: DeviceSettings,
    /// Reader capabilities, `None` until SETUP completes
    pub(crate) config: Option<ReaderConfig>,
    pub(crate) session: Session,
    pub(crate) queue: MessageQueue,
    pub(crate) errors: ErrorManager,
    pub(crate) transactions: TransactionLog,
    /// Start of the last poll cycle, `None` before the first
    pub(crate) last_poll: Option<u32>,
    /// When the reader last sent anything
    pub(crate) last_heard: u32,
}

impl<U, C, D, S> CashlessDevice<U, C, D, S>
where
    U: MdbUart,
    C: Clock,
    D: DelayNs,
    S: LogSink,
{
    pub fn new(uart: U, clock: C, delay: D, sink: S, settings: DeviceSettings) -> Self {
        let last_heard = clock.now_ms();
        Self {
            transport: Transport::new(uart),
            clock,
            delay,
            log: Logger::new(sink, settings.log_level),
            settings,
            config: None,
            session: Session::new(),
            queue: MessageQueue::new(),
            errors: ErrorManager::new(),
            transactions: TransactionLog::new(),
            last_poll: None,
            last_heard,
        }
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn state(&self) -> State {
        self.session.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> Option<&ReaderConfig> {
        self.config.as_ref()
    }

    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    /// Replace the settings; they take effect at the next SETUP
    pub fn set_settings(&mut self, settings: DeviceSettings) {
        self.log.set_threshold(settings.log_level);
        self.settings = settings;
    }

    pub fn error_log(&self) -> &ErrorLog {
        self.errors.log()
    }

    pub fn transaction_log(&self) -> &TransactionLog {
        &self.transactions
    }

    /// Messages waiting for the next poll
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// NAKs answered with a resend since the count was last cleared
    pub fn nak_retries(&self) -> u8 {
        self.errors.nak_retries()
    }

    pub fn sink(&self) -> &S {
        self.log.sink()
    }

    pub fn uart(&self) -> &U {
        self.transport.uart()
    }

    /// Held error entries per kind, indexed by [`ErrorKind::index`]
    pub fn error_stats(&self) -> [u32; ErrorKind::COUNT] {
        self.errors.log().stats()
    }

    // ---------------------------------------------------------------------
    // Bring-up
    // ---------------------------------------------------------------------

    /// Reset the reader, run SETUP and enable it
    ///
    /// Session, queue, reader config and error counters are cleared first.
    /// Audit logs are kept.
    pub fn initialize(&mut self) -> Result<(), ErrorKind> {
        self.session.clear(State::Inactive);
        self.config = None;
        self.queue.clear();
        self.errors.reset_counters();
        self.last_poll = None;
        self.last_heard = self.clock.now_ms();
        self.log.info("init.start", &[]);

        self.reset()?;
        let result = self.setup_inner();
        self.escalate(result)?;
        self.enable_reader()?;

        self.log.info("init.complete", &[]);
        Ok(())
    }

    /// Send RESET and wait for the reader to confirm
    pub fn reset(&mut self) -> Result<(), ErrorKind> {
        let result = self.reset_inner();
        self.escalate(result)
    }

    pub(crate) fn reset_inner(&mut self) -> Result<(), ErrorKind> {
        self.log.info("reset.start", &[]);
        let reply = self.exchange(Command::Reset)?;
        if reply.first_byte() != RSP_JUST_RESET {
            return Err(ErrorKind::Sequence);
        }

        self.session.clear(State::Inactive);
        self.config = None;
        self.queue.clear();
        self.log.info("reset.complete", &[]);
        Ok(())
    }

    /// SETUP config data, then SETUP max/min prices
    pub(crate) fn setup_inner(&mut self) -> Result<(), ErrorKind> {
        let next = self.session.state.transition(Event::SetupComplete)?;
        let settings = self.settings;

        let reply = self.exchange(Command::Setup(SetupCommand::ConfigData {
            vmc_feature_level: settings.vmc_feature_level,
            display_columns: settings.display_columns,
            display_rows: settings.display_rows,
            display_info: settings.display_info,
        }))?;
        let frame = match reply {
            Reply::Data(frame) => frame,
            Reply::Nak | Reply::Ret => return Err(ErrorKind::Nak),
            Reply::Ack => return Err(ErrorKind::Sequence),
        };
        let config = match Response::decode(frame.as_bytes())? {
            Response::ReaderConfig(config) => config,
            _ => return Err(ErrorKind::Sequence),
        };

        self.expect_ack(Command::Setup(SetupCommand::MaxMinPrices {
            max_price: settings.max_price,
            min_price: settings.min_price,
        }))?;

        let config = config.with_price_bounds(settings.max_price, settings.min_price);
        self.config = Some(config);
        self.set_state(next);
        self.log.info(
            "setup.complete",
            &[
                Field::new("level", config.feature_level),
                Field::new("country", config.country_code),
                Field::new("scale", config.scale_factor),
            ],
        );
        Ok(())
    }

    pub fn enable_reader(&mut self) -> Result<(), ErrorKind> {
        let result = self.enable_inner();
        self.escalate(result)
    }

    pub(crate) fn enable_inner(&mut self) -> Result<(), ErrorKind> {
        let next = self.session.state.transition(Event::EnableReader)?;
        self.expect_ack(Command::Reader(ReaderCommand::Enable))?;
        self.set_state(next);
        Ok(())
    }

    pub fn disable_reader(&mut self) -> Result<(), ErrorKind> {
        let result = self.disable_inner();
        self.escalate(result)
    }

    fn disable_inner(&mut self) -> Result<(), ErrorKind> {
        let next = self.session.state.transition(Event::DisableReader)?;
        self.expect_ack(Command::Reader(ReaderCommand::Disable))?;
        if self.session.state.in_session() {
            self.close_session(next);
        } else {
            self.set_state(next);
        }
        Ok(())
    }

    /// Ask the reader to abort whatever it is doing (READER CANCEL)
    pub fn reader_cancel(&mut self) -> Result<(), ErrorKind> {
        let result = if self.session.state.is_enabled() {
            self.expect_ack(Command::Reader(ReaderCommand::Cancel))
        } else {
            Err(ErrorKind::State)
        };
        self.escalate(result)
    }

    // ---------------------------------------------------------------------
    // Session
    // ---------------------------------------------------------------------

    /// Open a session locally with `funds` available
    pub fn begin_session(&mut self, funds: u32) -> Result<(), ErrorKind> {
        let next = self.check(Event::BeginSession)?;
        self.open_session(funds, next);
        Ok(())
    }

    pub(crate) fn open_session(&mut self, funds: u32, next: State) {
        let options = self.config.map(|c| c.misc_options).unwrap_or_default();
        let now = self.clock.now_ms();
        self.session
            .open(funds, now, options.multivend(), options.refundable());
        self.set_state(next);
        self.log.info("session.begin", &[Field::new("funds", funds)]);
    }

    /// Ask the reader to approve a vend of `item` for `amount`
    ///
    /// The answer arrives as VEND APPROVED or VEND DENIED on a later poll.
    pub fn vend_request(&mut self, item: u16, amount: u32) -> Result<(), ErrorKind> {
        let result = self.vend_request_inner(item, amount);
        self.escalate(result)
    }

    fn vend_request_inner(&mut self, item: u16, amount: u32) -> Result<(), ErrorKind> {
        let next = self.session.state.transition(Event::VendRequest)?;
        if self.session.pending.is_some() {
            return Err(ErrorKind::Sequence);
        }
        let price = u16::try_from(amount).map_err(|_| ErrorKind::Parameter)?;
        if !self.session.can_afford(amount) {
            return Err(ErrorKind::Funds);
        }
        if let Some(config) = self.config {
            if price > config.max_price {
                return Err(ErrorKind::Parameter);
            }
        }

        self.expect_ack(Command::Vend(VendCommand::Request { price, item }))?;

        let kind = if amount == 0 {
            TransactionType::FreeVend
        } else {
            TransactionType::PaidVend
        };
        self.session.pending = Some(PendingVend { item, amount, kind });
        self.session.item_number = item;
        self.session.trans_type = kind;
        self.set_state(next);
        self.log.info(
            "vend.request",
            &[Field::new("item", item), Field::new("amount", amount)],
        );
        Ok(())
    }

    /// Report that `item` was dispensed
    ///
    /// `item` must be the item the reader approved.
    pub fn vend_success(&mut self, item: u16) -> Result<(), ErrorKind> {
        let result = self.vend_success_inner(item);
        self.escalate(result)
    }

    fn vend_success_inner(&mut self, item: u16) -> Result<(), ErrorKind> {
        let next = self.session.state.transition(Event::VendSuccess)?;
        if item != self.session.item_number {
            return Err(ErrorKind::Sequence);
        }
        self.expect_ack(Command::Vend(VendCommand::Success { item }))?;

        let amount = self.session.vend_amount;
        let kind = self.session.trans_type;
        self.session.available_funds = self.session.available_funds.saturating_sub(amount);
        self.session.pending = None;
        self.log_transaction(kind, amount, item, true, None);
        self.set_state(next);
        self.log.info(
            "vend.success",
            &[
                Field::new("item", item),
                Field::new("amount", amount),
                Field::new("funds", self.session.available_funds),
            ],
        );
        Ok(())
    }

    /// Report that the approved vend could not be dispensed
    pub fn vend_failure(&mut self) -> Result<(), ErrorKind> {
        let result = self.vend_failure_inner();
        self.escalate(result)
    }

    fn vend_failure_inner(&mut self) -> Result<(), ErrorKind> {
        self.session.state.transition(Event::VendFailure)?;
        self.expect_ack(Command::Vend(VendCommand::Failure))?;
        self.settle_vend_failure(None);
        Ok(())
    }

    /// Fail the vend in progress even if the reader cannot be told
    pub(crate) fn force_vend_failure(&mut self, error: Option<ErrorKind>) {
        if self.session.state != State::Vend {
            return;
        }
        if let Err(kind) = self.expect_ack(Command::Vend(VendCommand::Failure)) {
            self.record_error(kind);
        }
        self.settle_vend_failure(error);
    }

    fn settle_vend_failure(&mut self, error: Option<ErrorKind>) {
        let amount = self.session.vend_amount;
        let item = self.session.item_number;
        let kind = self.session.trans_type;
        self.session.pending = None;
        self.log_transaction(kind, amount, item, false, error);
        self.set_state(State::SessionIdle);
        self.log.warn(
            "vend.failure",
            &[Field::new("item", item), Field::new("amount", amount)],
        );
    }

    /// Withdraw a vend request the reader has not answered yet
    pub fn vend_cancel(&mut self) -> Result<(), ErrorKind> {
        let result = self.vend_cancel_inner();
        self.escalate(result)
    }

    fn vend_cancel_inner(&mut self) -> Result<(), ErrorKind> {
        let next = self.session.state.transition(Event::VendCancel)?;
        self.expect_ack(Command::Vend(VendCommand::Cancel))?;
        if let Some(pending) = self.session.pending.take() {
            self.log_transaction(pending.kind, pending.amount, pending.item, false, None);
        }
        self.set_state(next);
        self.log.info("vend.cancel", &[]);
        Ok(())
    }

    /// Close the session
    pub fn session_complete(&mut self) -> Result<(), ErrorKind> {
        let result = self.session_complete_inner();
        self.escalate(result)
    }

    pub(crate) fn session_complete_inner(&mut self) -> Result<(), ErrorKind> {
        let next = self.session.state.transition(Event::SessionComplete)?;
        self.expect_ack(Command::Vend(VendCommand::SessionComplete))?;
        self.close_session(next);
        Ok(())
    }

    /// Close the session even if the reader cannot be told
    pub(crate) fn force_session_complete(&mut self) {
        if !self.session.state.in_session() {
            return;
        }
        if let Err(kind) = self.expect_ack(Command::Vend(VendCommand::SessionComplete)) {
            self.record_error(kind);
        }
        self.close_session(State::Inactive);
    }

    pub(crate) fn close_session(&mut self, next: State) {
        if let Some(pending) = self.session.pending {
            self.log_transaction(pending.kind, pending.amount, pending.item, false, None);
        }
        let funds = self.session.available_funds;
        self.session.clear(next);
        self.log.info("session.complete", &[Field::new("funds", funds)]);
    }

    /// Ask the reader to add `amount` to the card
    pub fn revalue(&mut self, amount: u32) -> Result<(), ErrorKind> {
        let result = self.revalue_inner(amount);
        self.escalate(result)
    }

    fn revalue_inner(&mut self, amount: u32) -> Result<(), ErrorKind> {
        let next = self.session.state.transition(Event::Revalue)?;
        let scaled = u16::try_from(amount).map_err(|_| ErrorKind::Parameter)?;
        self.expect_ack(Command::Revalue(RevalueCommand::Request { amount: scaled }))?;

        self.session.revalue_amount = amount;
        self.session.revalue_resume = self.session.state;
        self.set_state(next);
        self.log.info("revalue.request", &[Field::new("amount", amount)]);
        Ok(())
    }

    /// Ask the reader to refund `amount` for a returned `item`
    pub fn negative_vend(&mut self, item: u16, amount: u32) -> Result<(), ErrorKind> {
        let result = self.negative_vend_inner(item, amount);
        self.escalate(result)
    }

    fn negative_vend_inner(&mut self, item: u16, amount: u32) -> Result<(), ErrorKind> {
        let next = self.session.state.transition(Event::NegativeVend)?;
        let price = u16::try_from(amount).map_err(|_| ErrorKind::Parameter)?;
        self.expect_ack(Command::Vend(VendCommand::NegativeRequest { price, item }))?;

        self.session.pending = Some(PendingVend {
            item,
            amount,
            kind: TransactionType::NegativeVend,
        });
        self.session.item_number = item;
        self.session.vend_amount = amount;
        self.session.trans_type = TransactionType::NegativeVend;
        self.set_state(next);
        self.log.info(
            "vend.negative",
            &[Field::new("item", item), Field::new("amount", amount)],
        );
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Queue
    // ---------------------------------------------------------------------

    /// Queue reader bytes for dispatch at the next poll
    ///
    /// Returns `false` if the bytes are malformed or the queue is full.
    pub fn queue_message(&mut self, bytes: &[u8]) -> bool {
        let message = match Message::new(bytes, self.clock.now_ms()) {
            Ok(message) => message,
            Err(kind) => {
                self.handle_error(kind);
                return false;
            }
        };
        if !self.queue.enqueue(message) {
            self.log.warn("queue.full", &[Field::new("len", bytes.len() as u32)]);
            return false;
        }
        true
    }

    // ---------------------------------------------------------------------
    // Diagnostics
    // ---------------------------------------------------------------------

    /// Write both audit logs and the per-kind error counts at Info
    pub fn dump_logs(&mut self) {
        self.log.info(
            "dump.begin",
            &[
                Field::new("errors", self.errors.log().len() as u32),
                Field::new("errors_total", self.errors.log().total()),
                Field::new("transactions", self.transactions.len() as u32),
                Field::new("transactions_total", self.transactions.total()),
            ],
        );

        for entry in self.errors.log().iter() {
            self.log.info(
                "dump.error",
                &[
                    Field::new("at", entry.timestamp),
                    Field::new("kind", entry.error.name()),
                    Field::new("state", entry.state.name()),
                    Field::new("cmd", entry.last_command),
                    Field::new("rsp", entry.last_response),
                ],
            );
        }

        for entry in self.transactions.iter() {
            self.log.info(
                "dump.transaction",
                &[
                    Field::new("at", entry.timestamp),
                    Field::new("kind", entry.kind.name()),
                    Field::new("amount", entry.amount),
                    Field::new("item", entry.item_number),
                    Field::new("ok", entry.success),
                ],
            );
        }

        let stats = self.errors.log().stats();
        for kind in ErrorKind::ALL {
            let count = stats[kind.index()];
            if count > 0 {
                self.log.info(
                    "dump.stats",
                    &[Field::new("kind", kind.name()), Field::new("count", count)],
                );
            }
        }

        self.log.info("dump.end", &[]);
    }

    // ---------------------------------------------------------------------
    // Plumbing
    // ---------------------------------------------------------------------

    /// Report a failed result through the error manager and pass it on
    pub(crate) fn escalate<T>(&mut self, result: Result<T, ErrorKind>) -> Result<T, ErrorKind> {
        if let Err(kind) = result {
            self.handle_error(kind);
        }
        result
    }

    /// Validate a host event against the state machine, reporting rejections
    fn check(&mut self, event: Event) -> Result<State, ErrorKind> {
        let result = self.session.state.transition(event);
        self.escalate(result)
    }

    /// Move to `next`; landing in `SessionIdle` restarts the idle clock
    pub(crate) fn set_state(&mut self, next: State) {
        if next == State::SessionIdle {
            self.session.touch(self.clock.now_ms());
        }
        let prev = self.session.state;
        if prev == next {
            return;
        }
        self.session.state = next;
        self.log.debug(
            "state",
            &[Field::new("from", prev.name()), Field::new("to", next.name())],
        );
    }

    /// Send `command` and wait for the reply
    pub(crate) fn exchange(&mut self, command: Command) -> Result<Reply, ErrorKind> {
        let bytes = command.encode()?;
        self.log.debug("bus.send", &[Field::new("cmd", command.name())]);
        self.transport.send(&bytes)?;
        self.await_reply()
    }

    pub(crate) fn await_reply(&mut self) -> Result<Reply, ErrorKind> {
        let reply = self.transport.wait_for_response();
        if !matches!(reply, Err(ErrorKind::Timeout)) {
            self.last_heard = self.clock.now_ms();
        }
        reply
    }

    /// Send `command` and require an acknowledgement
    ///
    /// A data reply counts as acknowledged and is queued for dispatch.
    pub(crate) fn expect_ack(&mut self, command: Command) -> Result<(), ErrorKind> {
        let reply = self.exchange(command)?;
        self.settle_reply(reply)
    }

    pub(crate) fn settle_reply(&mut self, reply: Reply) -> Result<(), ErrorKind> {
        match reply {
            Reply::Ack => Ok(()),
            Reply::Data(frame) => {
                self.park(&frame);
                Ok(())
            }
            Reply::Nak | Reply::Ret => Err(ErrorKind::Nak),
        }
    }

    /// Retransmit the last command and settle its reply
    pub(crate) fn resend_last(&mut self) -> Result<(), ErrorKind> {
        self.transport.resend()?;
        let reply = self.await_reply()?;
        self.settle_reply(reply)
    }

    /// Keep a reader message for the next poll
    fn park(&mut self, frame: &Frame) {
        let queued = match Message::new(frame.as_bytes(), self.clock.now_ms()) {
            Ok(message) => self.queue.enqueue(message),
            Err(_) => false,
        };
        if !queued {
            self.log.warn("reply.dropped", &[Field::new("code", frame.code())]);
        }
    }

    pub(crate) fn log_transaction(
        &mut self,
        kind: TransactionType,
        amount: u32,
        item_number: u16,
        success: bool,
        error: Option<ErrorKind>,
    ) {
        self.transactions.push(TransactionLogEntry {
            timestamp: self.clock.now_ms(),
            kind,
            amount,
            item_number,
            success,
            error,
        });
    }
}
