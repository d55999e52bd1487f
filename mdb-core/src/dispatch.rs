//! Response dispatch
//!
//! Decodes a reader message and applies it to the session. Every response
//! that changes state goes through [`State::transition`] first, so a
//! response that arrives in the wrong state is rejected without side
//! effects.

use embedded_hal::delay::DelayNs;
use mdb_hal::{Clock, Field, LogSink, MdbUart};
use mdb_protocol::Response;

use crate::audit::TransactionType;
use crate::device::CashlessDevice;
use crate::error::ErrorKind;
use crate::state::{Event, State};

/// Whether a decoded response was acted on
enum Handled {
    Yes,
    /// Code the engine does not know
    Ignored,
}

impl<U, C, D, S> CashlessDevice<U, C, D, S>
where
    U: MdbUart,
    C: Clock,
    D: DelayNs,
    S: LogSink,
{
    /// Decode and apply one reader message
    ///
    /// Malformed messages and rejected responses are reported through
    /// [`CashlessDevice::handle_error`]. An unknown code is logged and
    /// returned as `Parameter` without recovery.
    pub fn process_message(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        let response = match Response::decode(bytes) {
            Ok(response) => response,
            Err(err) => {
                let kind = ErrorKind::from(err);
                self.handle_error(kind);
                return Err(kind);
            }
        };
        self.log.debug("dispatch", &[Field::new("code", response.code())]);

        match self.dispatch(response) {
            Ok(Handled::Yes) => {
                if self.session.state.in_session() {
                    self.session.touch(self.clock.now_ms());
                }
                Ok(())
            }
            Ok(Handled::Ignored) => Err(ErrorKind::Parameter),
            Err(kind) => {
                self.handle_error(kind);
                Err(kind)
            }
        }
    }

    /// Dispatch every queued message, oldest first
    ///
    /// Messages queued while dispatching wait for the next call. Returns how
    /// many were dispatched.
    pub fn process_queue(&mut self) -> usize {
        let pending = self.queue.len();
        let mut dispatched = 0;
        for _ in 0..pending {
            let Some(message) = self.queue.dequeue() else {
                break;
            };
            let age = self.clock.elapsed_since(message.timestamp());
            self.log.debug("queue.dispatch", &[Field::new("age_ms", age)]);
            // Failures are already reported
            let _ = self.process_message(message.as_bytes());
            dispatched += 1;
        }
        dispatched
    }

    fn dispatch(&mut self, response: Response) -> Result<Handled, ErrorKind> {
        match response {
            Response::JustReset => {
                self.session.state.transition(Event::JustReset)?;
                self.session.clear(State::Inactive);
                self.config = None;
                self.log.warn("reader.just_reset", &[]);
            }
            Response::ReaderConfig(config) => {
                if self.session.state == State::Inactive {
                    let next = self.session.state.transition(Event::SetupComplete)?;
                    let config = config
                        .with_price_bounds(self.settings.max_price, self.settings.min_price);
                    self.config = Some(config);
                    self.set_state(next);
                    self.log.info(
                        "setup.complete",
                        &[Field::new("level", config.feature_level)],
                    );
                } else {
                    self.log.debug("reader.config", &[Field::new("level", config.feature_level)]);
                }
            }
            Response::DisplayRequest { duration_ds } => {
                self.log
                    .info("reader.display", &[Field::new("duration_ds", duration_ds)]);
            }
            Response::BeginSession { funds } => {
                let next = self.session.state.transition(Event::BeginSession)?;
                self.open_session(u32::from(funds), next);
            }
            Response::SessionCancelRequest => {
                self.log.info("session.cancel_request", &[]);
                self.session_complete_inner()?;
            }
            Response::VendApproved { amount } => self.on_vend_approved(u32::from(amount))?,
            Response::VendDenied => self.on_vend_denied()?,
            Response::EndSession => {
                let next = self.session.state.transition(Event::EndSession)?;
                self.close_session(next);
            }
            Response::Cancelled => self.log.info("reader.cancelled", &[]),
            Response::PeripheralId => self.log.info("reader.peripheral_id", &[]),
            Response::Malfunction { code } => {
                self.log.error("reader.malfunction", &[Field::new("code", code)]);
                return Err(ErrorKind::Hardware);
            }
            Response::OutOfSequence => {
                self.log.warn("reader.out_of_sequence", &[]);
                return Err(ErrorKind::Sequence);
            }
            Response::RevalueApproved => self.on_revalue(true)?,
            Response::RevalueDenied => self.on_revalue(false)?,
            Response::RevalueLimit { amount } => {
                self.log.info("revalue.limit", &[Field::new("amount", amount)]);
            }
            Response::Unknown(code) => {
                self.log.warn("dispatch.unknown", &[Field::new("code", code)]);
                return Ok(Handled::Ignored);
            }
        }
        Ok(Handled::Yes)
    }

    fn on_vend_approved(&mut self, amount: u32) -> Result<(), ErrorKind> {
        let from = self.session.state;
        let next = from.transition(Event::VendApproved)?;

        if from == State::NegativeVend {
            let pending = self.session.pending.take();
            let (item, refund) = pending
                .map(|p| (p.item, p.amount))
                .unwrap_or((self.session.item_number, amount));
            self.session.available_funds = self.session.available_funds.saturating_add(refund);
            self.log_transaction(TransactionType::NegativeVend, refund, item, true, None);
            self.set_state(next);
            self.log.info("vend.refunded", &[Field::new("amount", refund)]);
            return Ok(());
        }

        let pending = self.session.pending.ok_or(ErrorKind::Sequence)?;
        self.session.vend_amount = amount;
        self.session.item_number = pending.item;
        self.session.trans_type = pending.kind;
        self.set_state(next);
        self.log.info(
            "vend.approved",
            &[Field::new("item", pending.item), Field::new("amount", amount)],
        );

        if !self.session.can_afford(amount) {
            return Err(ErrorKind::Funds);
        }
        Ok(())
    }

    fn on_vend_denied(&mut self) -> Result<(), ErrorKind> {
        let from = self.session.state;
        let next = from.transition(Event::VendDenied)?;
        if from == State::SessionIdle && self.session.pending.is_none() {
            return Err(ErrorKind::Sequence);
        }

        let (item, amount, kind) = match self.session.pending.take() {
            Some(p) => (p.item, p.amount, p.kind),
            None => (
                self.session.item_number,
                self.session.vend_amount,
                self.session.trans_type,
            ),
        };
        // Unaffordable requests never reach the reader, so a denial is a
        // plain failed vend
        self.log_transaction(kind, amount, item, false, None);
        self.set_state(next);
        self.log.warn(
            "vend.denied",
            &[Field::new("item", item), Field::new("amount", amount)],
        );
        Ok(())
    }

    fn on_revalue(&mut self, approved: bool) -> Result<(), ErrorKind> {
        let resume = self.session.revalue_resume;
        let event = if approved {
            Event::RevalueApproved { resume }
        } else {
            Event::RevalueDenied { resume }
        };
        let next = self.session.state.transition(event)?;

        let amount = self.session.revalue_amount;
        if approved {
            self.session.available_funds = self.session.available_funds.saturating_add(amount);
        }
        self.log_transaction(TransactionType::Revalue, amount, 0, approved, None);
        self.session.revalue_amount = 0;
        self.set_state(next);
        self.log.info(
            "revalue.result",
            &[Field::new("ok", approved), Field::new("amount", amount)],
        );
        Ok(())
    }
}
