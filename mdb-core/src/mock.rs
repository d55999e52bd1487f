//! Test doubles for the bus, clock, delay and log sink
//!
//! Every double is a cheap handle over shared state, so a test keeps one
//! clone for inspection and hands the other to the device.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use mdb_hal::{Clock, LogLevel, LogSink, MdbUart, Record, RxByte};
use mdb_protocol::build_frame;

use crate::config::DeviceSettings;
use crate::device::CashlessDevice;

/// How the simulated reader answers the next transmitted message
#[derive(Debug, Clone)]
pub enum BusReply {
    Ack,
    Nak,
    /// No answer at all
    Silence,
    /// A checksummed frame carrying these data bytes
    Frame(Vec<u8>),
    /// Exact bytes, mode bits included
    Raw(Vec<RxByte>),
    /// The transmit itself fails
    TransmitFails,
}

#[derive(Debug, Default)]
struct BusState {
    sent: Vec<Vec<u8>>,
    script: VecDeque<BusReply>,
    rx: VecDeque<RxByte>,
}

/// Scripted reader; unscripted messages are ACKed
#[derive(Debug, Clone, Default)]
pub struct MockBus(Rc<RefCell<BusState>>);

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer to the next unanswered transmit
    pub fn script(&self, reply: BusReply) {
        self.0.borrow_mut().script.push_back(reply);
    }

    /// Messages transmitted so far, as they went on the wire
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.0.borrow().sent.clone()
    }

    /// How many transmitted messages start with `command`
    pub fn count_sent(&self, command: &[u8]) -> usize {
        self.0
            .borrow()
            .sent
            .iter()
            .filter(|msg| msg.starts_with(command))
            .count()
    }

    pub fn clear_sent(&self) {
        self.0.borrow_mut().sent.clear();
    }
}

impl MdbUart for MockBus {
    type Error = ();

    fn transmit(&mut self, bytes: &[u8], _timeout_ms: u32) -> Result<(), ()> {
        let mut state = self.0.borrow_mut();
        let reply = state.script.pop_front().unwrap_or(BusReply::Ack);
        state.rx.clear();

        if let BusReply::TransmitFails = reply {
            return Err(());
        }
        state.sent.push(bytes.to_vec());

        match reply {
            BusReply::Ack => state.rx.push_back(RxByte::last(0x00)),
            BusReply::Nak => state.rx.push_back(RxByte::last(0xFF)),
            BusReply::Silence | BusReply::TransmitFails => {}
            BusReply::Frame(data) => {
                let wire = build_frame(&data).expect("scripted frame too long");
                let last = wire.len() - 1;
                for (i, &b) in wire.iter().enumerate() {
                    state.rx.push_back(RxByte { data: b, mode: i == last });
                }
            }
            BusReply::Raw(bytes) => state.rx.extend(bytes),
        }
        Ok(())
    }

    fn receive_byte(&mut self, _timeout_ms: u32) -> Result<Option<RxByte>, ()> {
        Ok(self.0.borrow_mut().rx.pop_front())
    }
}

/// Hand-driven millisecond clock
#[derive(Debug, Clone, Default)]
pub struct MockClock(Rc<Cell<u32>>);

impl MockClock {
    pub fn set(&self, ms: u32) {
        self.0.set(ms);
    }

    pub fn advance(&self, ms: u32) {
        self.0.set(self.0.get().wrapping_add(ms));
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u32 {
        self.0.get()
    }
}

/// Delay that moves the mock clock forward instead of sleeping
#[derive(Debug, Clone, Default)]
pub struct MockDelay {
    clock: MockClock,
    nanos: u32,
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        let total = self.nanos as u64 + ns as u64;
        self.clock.advance((total / 1_000_000) as u32);
        self.nanos = (total % 1_000_000) as u32;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.clock.advance(ms);
    }
}

/// Sink that keeps every record's level and event name
#[derive(Debug, Clone, Default)]
pub struct RecordingSink(Rc<RefCell<Vec<(LogLevel, &'static str)>>>);

impl RecordingSink {
    /// How many records carry `event`
    pub fn count(&self, event: &str) -> usize {
        self.0.borrow().iter().filter(|(_, e)| *e == event).count()
    }
}

impl LogSink for RecordingSink {
    fn write(&mut self, record: &Record<'_>) {
        self.0.borrow_mut().push((record.level, record.event));
    }
}

pub type TestDevice = CashlessDevice<MockBus, MockClock, MockDelay, RecordingSink>;

/// Handles kept by a test while the device owns their twins
pub struct Rig {
    pub bus: MockBus,
    pub clock: MockClock,
    pub sink: RecordingSink,
}

/// Reader config response: level 1, USD, scale 1, 2 decimals, refundable multivend
pub const READER_CONFIG: [u8; 8] = [0x01, 0x01, 0x18, 0x40, 0x01, 0x02, 0x05, 0x03];

/// A fresh device with debug logging, clock at 1000 ms
pub fn device() -> (TestDevice, Rig) {
    let bus = MockBus::new();
    let clock = MockClock::default();
    clock.set(1000);
    let sink = RecordingSink::default();
    let delay = MockDelay {
        clock: clock.clone(),
        nanos: 0,
    };
    let settings = DeviceSettings {
        log_level: LogLevel::Debug,
        ..DeviceSettings::default()
    };
    let device = CashlessDevice::new(bus.clone(), clock.clone(), delay, sink.clone(), settings);
    (device, Rig { bus, clock, sink })
}

/// A device brought up to `Enabled` through the normal SETUP exchange
pub fn enabled_device() -> (TestDevice, Rig) {
    let (mut device, rig) = device();
    rig.bus.script(BusReply::Ack);
    rig.bus.script(BusReply::Frame(READER_CONFIG.to_vec()));
    device.initialize().expect("bring-up failed");
    rig.bus.clear_sent();
    (device, rig)
}

/// An enabled device with an open session holding `funds`
pub fn session_device(funds: u32) -> (TestDevice, Rig) {
    let (mut device, rig) = enabled_device();
    device.begin_session(funds).expect("begin session failed");
    (device, rig)
}
