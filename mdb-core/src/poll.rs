//! Periodic poll cycle
//!
//! The host calls [`CashlessDevice::poll`] as often as it likes; a cycle
//! runs at most every [`POLL_INTERVAL_MS`]. Each cycle:
//!
//! 1. dispatches queued reader messages
//! 2. sends POLL and handles the reply
//! 3. checks the reader is still talking
//! 4. closes a session left idle too long

use embedded_hal::delay::DelayNs;
use mdb_hal::{Clock, Field, LogSink, MdbUart};
use mdb_protocol::{Command, Reply};

use crate::device::CashlessDevice;
use crate::error::ErrorKind;
use crate::state::State;
use crate::timing::{NON_RESPONSE_TIMEOUT_MS, POLL_INTERVAL_MS, SESSION_IDLE_TIMEOUT_MS};

impl<U, C, D, S> CashlessDevice<U, C, D, S>
where
    U: MdbUart,
    C: Clock,
    D: DelayNs,
    S: LogSink,
{
    /// Run one poll cycle if the interval has elapsed
    ///
    /// Returns `true` if a cycle ran.
    pub fn poll(&mut self) -> bool {
        if let Some(last) = self.last_poll {
            if self.clock.elapsed_since(last) < POLL_INTERVAL_MS {
                return false;
            }
        }
        self.last_poll = Some(self.clock.now_ms());

        self.process_queue();

        match self.exchange(Command::Poll) {
            // An empty poll is answered with ACK or not at all
            Ok(Reply::Ack) | Err(ErrorKind::Timeout) => {}
            Ok(Reply::Data(frame)) => {
                // Failures are already reported
                let _ = self.process_message(frame.as_bytes());
            }
            Ok(Reply::Nak | Reply::Ret) => self.handle_error(ErrorKind::Nak),
            Err(kind) => {
                self.handle_error(kind);
                if kind == ErrorKind::Communication {
                    // Watchdog is moot on a dead line
                    self.check_idle();
                    return true;
                }
            }
        }

        self.check_link();
        self.check_idle();
        true
    }

    /// Report a reader that has been silent for too long
    fn check_link(&mut self) {
        if self.session.state == State::Inactive {
            return;
        }
        let silent = self.clock.elapsed_since(self.last_heard);
        if silent > NON_RESPONSE_TIMEOUT_MS {
            self.log.warn("link.silent", &[Field::new("ms", silent)]);
            self.last_heard = self.clock.now_ms();
            self.handle_error(ErrorKind::Timeout);
        }
    }

    /// Close a session that has sat in `SessionIdle` too long
    ///
    /// A session waiting on a vend answer is not idle.
    fn check_idle(&mut self) {
        let Some(idle) = self.session.idle_for(self.clock.now_ms()) else {
            return;
        };
        if idle > SESSION_IDLE_TIMEOUT_MS {
            self.log.warn("session.idle_timeout", &[Field::new("ms", idle)]);
            self.force_session_complete();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, BusReply};
    use mdb_hal::RxByte;

    #[test]
    fn test_poll_interval() {
        let (mut device, rig) = mock::enabled_device();

        assert!(device.poll());
        assert!(!device.poll());
        rig.clock.advance(POLL_INTERVAL_MS - 1);
        assert!(!device.poll());
        rig.clock.advance(1);
        assert!(device.poll());
        assert_eq!(rig.bus.sent(), vec![vec![0x12, 0x12], vec![0x12, 0x12]]);
    }

    #[test]
    fn test_poll_dispatches_reply() {
        let (mut device, rig) = mock::enabled_device();
        rig.bus.script(BusReply::Frame(vec![0x03, 0x01, 0xF4]));

        device.poll();
        assert_eq!(device.state(), State::SessionIdle);
        assert_eq!(device.session().available_funds, 500);
    }

    #[test]
    fn test_silent_poll_counts_as_ack() {
        let (mut device, rig) = mock::enabled_device();
        rig.bus.script(BusReply::Silence);

        device.poll();
        assert_eq!(device.state(), State::Enabled);
        assert!(device.error_log().is_empty());
    }

    #[test]
    fn test_queue_drains_before_poll() {
        let (mut device, rig) = mock::enabled_device();
        assert!(device.queue_message(&[0x03, 0x00, 0x64]));

        device.poll();
        assert_eq!(device.queue_len(), 0);
        assert_eq!(device.state(), State::SessionIdle);
        assert_eq!(device.session().available_funds, 100);
        assert_eq!(rig.bus.count_sent(&[0x12]), 1);
    }

    #[test]
    fn test_data_reply_to_command_waits_for_poll() {
        let (mut device, rig) = mock::session_device(500);
        rig.bus.script(BusReply::Frame(vec![0x05, 0x00, 0x32]));

        device.vend_request(1, 50).unwrap();
        assert_eq!(device.queue_len(), 1);
        assert_eq!(device.state(), State::SessionIdle);

        device.poll();
        assert_eq!(device.state(), State::Vend);
    }

    #[test]
    fn test_nak_resends_then_resets() {
        let (mut device, rig) = mock::enabled_device();

        for retry in 1..=3u8 {
            rig.bus.script(BusReply::Nak);
            device.poll();
            assert_eq!(device.nak_retries(), retry);
            assert_eq!(rig.bus.sent().last().unwrap(), &vec![0x12, 0x12]);

            // An ACKed cycle does not clear the count
            rig.clock.advance(POLL_INTERVAL_MS);
            device.poll();
            assert_eq!(device.nak_retries(), retry);
            rig.clock.advance(POLL_INTERVAL_MS);
        }
        assert_eq!(rig.bus.count_sent(&[0x10]), 0);

        rig.bus.script(BusReply::Nak);
        device.poll();
        assert_eq!(device.nak_retries(), 0);
        assert_eq!(rig.bus.count_sent(&[0x10]), 1);
        assert_eq!(device.error_stats()[ErrorKind::Nak.index()], 4);
    }

    #[test]
    fn test_bad_checksum_requests_retransmit() {
        let (mut device, rig) = mock::enabled_device();
        rig.bus.script(BusReply::Raw(vec![
            RxByte::data(0x05),
            RxByte::data(0x00),
            RxByte::data(0x64),
            RxByte::last(0x00),
        ]));

        device.poll();
        assert_eq!(rig.bus.sent().last().unwrap(), &vec![0xAA]);

        let entry = device.error_log().latest().unwrap();
        assert_eq!(entry.error, ErrorKind::Checksum);
        assert_eq!(entry.last_command, 0x12);
        assert_eq!(entry.last_response, 0x05);
    }

    #[test]
    fn test_six_rapid_errors_disable_once() {
        let (mut device, rig) = mock::enabled_device();

        for _ in 0..6 {
            assert_eq!(device.process_message(&[]), Err(ErrorKind::Parameter));
            rig.clock.advance(10);
        }
        assert_eq!(rig.bus.count_sent(&[0x14, 0x00, 0x14]), 1);
        assert_eq!(device.state(), State::Disabled);
        assert_eq!(rig.sink.count("error.burst"), 1);
    }

    #[test]
    fn test_spaced_errors_never_disable() {
        let (mut device, rig) = mock::enabled_device();

        for _ in 0..6 {
            rig.clock.advance(5000);
            assert_eq!(device.process_message(&[]), Err(ErrorKind::Parameter));
        }
        assert_eq!(rig.bus.count_sent(&[0x14, 0x00]), 0);
        assert_eq!(device.state(), State::Enabled);
    }

    #[test]
    fn test_idle_session_times_out() {
        let (mut device, rig) = mock::session_device(500);
        rig.clock.advance(SESSION_IDLE_TIMEOUT_MS + 1);

        device.poll();
        assert_eq!(device.state(), State::Inactive);
        assert!(rig.bus.sent().contains(&vec![0x13, 0x04, 0x17]));
        assert_eq!(rig.sink.count("session.idle_timeout"), 1);
    }

    #[test]
    fn test_idle_session_just_inside_limit() {
        let (mut device, rig) = mock::session_device(500);
        rig.clock.advance(SESSION_IDLE_TIMEOUT_MS - 1);

        device.poll();
        assert_eq!(device.state(), State::SessionIdle);
    }

    #[test]
    fn test_pending_vend_keeps_session_open() {
        let (mut device, rig) = mock::session_device(500);
        rig.clock.advance(25_000);
        device.vend_request(1, 100).unwrap();

        rig.clock.advance(5001);
        device.poll();
        assert_eq!(device.state(), State::SessionIdle);
        assert!(device.session().pending.is_some());

        rig.clock.advance(SESSION_IDLE_TIMEOUT_MS);
        device.poll();
        assert_eq!(device.state(), State::SessionIdle);
        assert_eq!(rig.sink.count("session.idle_timeout"), 0);
    }

    #[test]
    fn test_denial_restarts_idle_clock() {
        let (mut device, rig) = mock::session_device(500);
        device.vend_request(1, 100).unwrap();
        rig.clock.advance(20_000);
        device.process_message(&[0x06]).unwrap();

        rig.clock.advance(SESSION_IDLE_TIMEOUT_MS - 1);
        device.poll();
        assert_eq!(device.state(), State::SessionIdle);

        rig.clock.advance(POLL_INTERVAL_MS);
        device.poll();
        assert_eq!(device.state(), State::Inactive);
    }

    #[test]
    fn test_retransmitted_approval_is_dispatched() {
        let (mut device, rig) = mock::session_device(500);
        device.vend_request(1, 100).unwrap();
        rig.bus.script(BusReply::Raw(vec![
            RxByte::data(0x05),
            RxByte::data(0x00),
            RxByte::data(0x64),
            RxByte::last(0x00),
        ]));
        rig.bus.script(BusReply::Frame(vec![0x05, 0x00, 0x64]));

        device.poll();
        assert_eq!(rig.bus.sent().last().unwrap(), &vec![0xAA]);
        assert_eq!(device.queue_len(), 1);
        assert_eq!(device.state(), State::SessionIdle);

        rig.clock.advance(POLL_INTERVAL_MS);
        device.poll();
        assert_eq!(device.state(), State::Vend);
        assert_eq!(device.session().vend_amount, 100);
        assert_eq!(device.error_log().len(), 1);
    }

    #[test]
    fn test_idle_timeout_on_dead_line() {
        let (mut device, rig) = mock::session_device(500);
        rig.clock.advance(SESSION_IDLE_TIMEOUT_MS + 1);
        // POLL, READER DISABLE and RESET all fail
        rig.bus.script(BusReply::TransmitFails);
        rig.bus.script(BusReply::TransmitFails);
        rig.bus.script(BusReply::TransmitFails);

        device.poll();
        assert_eq!(device.state(), State::Inactive);
        assert_eq!(rig.sink.count("session.idle_timeout"), 1);
        assert!(rig.bus.sent().contains(&vec![0x13, 0x04, 0x17]));
    }

    #[test]
    fn test_silent_reader_is_reset() {
        let (mut device, rig) = mock::enabled_device();
        rig.bus.script(BusReply::Silence);
        rig.clock.advance(NON_RESPONSE_TIMEOUT_MS + 1);

        device.poll();
        assert_eq!(device.error_log().latest().map(|e| e.error), Some(ErrorKind::Sequence));
        assert_eq!(device.error_stats()[ErrorKind::Timeout.index()], 1);
        assert_eq!(rig.bus.count_sent(&[0x10]), 1);
        assert_eq!(rig.sink.count("link.silent"), 1);
    }

    #[test]
    fn test_transmit_failure_cycles_reader() {
        let (mut device, rig) = mock::enabled_device();
        // POLL fails, then DISABLE, RESET, SETUP config data
        rig.bus.script(BusReply::TransmitFails);
        rig.bus.script(BusReply::Ack);
        rig.bus.script(BusReply::Ack);
        rig.bus.script(BusReply::Frame(mock::READER_CONFIG.to_vec()));

        device.poll();
        assert_eq!(device.state(), State::Enabled);
        assert_eq!(device.error_log().len(), 1);
        assert_eq!(
            device.error_log().latest().unwrap().error,
            ErrorKind::Communication
        );
        assert_eq!(rig.bus.count_sent(&[0x10]), 1);
        assert_eq!(rig.bus.count_sent(&[0x14, 0x01]), 1);
    }

    #[test]
    fn test_repeated_malfunctions_dump_logs() {
        let (mut device, rig) = mock::enabled_device();

        for _ in 0..3 {
            assert_eq!(
                device.process_message(&[0x0A, 0x00]),
                Err(ErrorKind::Hardware)
            );
        }
        assert_eq!(rig.sink.count("dump.begin"), 1);
        assert_eq!(device.error_stats()[ErrorKind::Hardware.index()], 3);
    }

    #[test]
    fn test_vend_cycle_over_polls() {
        let (mut device, rig) = mock::enabled_device();

        rig.bus.script(BusReply::Frame(vec![0x03, 0x01, 0xF4]));
        device.poll();
        assert_eq!(device.state(), State::SessionIdle);

        device.vend_request(5, 120).unwrap();
        rig.clock.advance(POLL_INTERVAL_MS);
        rig.bus.script(BusReply::Frame(vec![0x05, 0x00, 0x78]));
        device.poll();
        assert_eq!(device.state(), State::Vend);

        device.vend_success(5).unwrap();
        device.session_complete().unwrap();
        assert_eq!(device.state(), State::Inactive);

        let log = device.transaction_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log.latest().unwrap().amount, 120);
        assert!(device.error_log().is_empty());
    }
}
