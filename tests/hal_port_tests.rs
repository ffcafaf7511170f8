#![cfg(not(feature = "async"))]

mod common;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use common::{Journal, MockPin};
use disco_spi_bus::{
    BitOrder, BusHandle, BusState, Config, DeviceLink, Error, Fault, FrameSize, HalPort,
    SharedBus, SpiPort, Status, Transfer,
};
use embedded_hal::spi::{ErrorKind, ErrorType, SpiBus};

// ---------------------------------------------------------------------------
// Fake HAL bus
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Lines {
    /// Every byte clocked out, in order.
    mosi: Vec<u8>,
    /// Bytes clocked in; 0xFF once exhausted.
    miso: VecDeque<u8>,
    /// Error returned by the next data call.
    fail_next: Option<ErrorKind>,
    flushes: usize,
}

#[derive(Clone, Default)]
struct FakeSpi(Rc<RefCell<Lines>>);

impl FakeSpi {
    fn lines(&self) -> std::cell::RefMut<'_, Lines> {
        self.0.borrow_mut()
    }

    fn check(&self) -> Result<(), ErrorKind> {
        match self.lines().fail_next.take() {
            Some(kind) => Err(kind),
            None => Ok(()),
        }
    }

    fn clock_in(&self, words: &mut [u8]) {
        let mut lines = self.lines();
        for word in words {
            *word = lines.miso.pop_front().unwrap_or(0xFF);
        }
    }
}

impl ErrorType for FakeSpi {
    type Error = ErrorKind;
}

impl SpiBus<u8> for FakeSpi {
    fn read(&mut self, words: &mut [u8]) -> Result<(), ErrorKind> {
        self.check()?;
        self.lines().mosi.extend(std::iter::repeat_n(0x00, words.len()));
        self.clock_in(words);
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), ErrorKind> {
        self.check()?;
        self.lines().mosi.extend_from_slice(words);
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), ErrorKind> {
        self.check()?;
        self.lines().mosi.extend_from_slice(write);
        self.clock_in(read);
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), ErrorKind> {
        self.check()?;
        self.lines().mosi.extend_from_slice(words);
        self.clock_in(words);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ErrorKind> {
        self.lines().flushes += 1;
        Ok(())
    }
}

fn ready_bus(spi: &FakeSpi) -> BusHandle<HalPort<FakeSpi>> {
    let mut bus = BusHandle::new(HalPort::new(spi.clone()), Config::default());
    bus.initialize().unwrap();
    bus
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn init_enables_and_deinit_disables() {
    let mut port = HalPort::new(FakeSpi::default());
    assert!(!port.is_enabled());

    port.init(&Config::default()).unwrap();
    assert!(port.is_enabled());

    port.deinit().unwrap();
    assert!(!port.is_enabled());
}

#[test]
fn lsb_first_cannot_be_applied() {
    let config = Config {
        bit_order: BitOrder::LsbFirst,
        ..Config::default()
    };
    let mut bus = BusHandle::new(HalPort::new(FakeSpi::default()), config);

    assert_eq!(bus.initialize(), Err(Error::Init(Fault::Unsupported)));
    assert_eq!(bus.state(), BusState::Faulted);
    assert!(!bus.port().is_enabled());
}

#[test]
fn sixteen_bit_frames_cannot_be_applied() {
    let mut port = HalPort::new(FakeSpi::default());
    let config = Config {
        frame_size: FrameSize::Sixteen,
        ..Config::default()
    };

    assert_eq!(port.init(&config), Err(Fault::Unsupported));
    assert!(!port.is_enabled());
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

#[test]
fn transfer_byte_sends_tx_and_returns_rx() {
    let spi = FakeSpi::default();
    spi.lines().miso.push_back(0xD4);
    let mut bus = ready_bus(&spi);

    assert_eq!(bus.transfer_byte(0x8F), Ok(Transfer::completed(0xD4)));
    assert_eq!(spi.lines().mosi, vec![0x8F]);
    assert_eq!(spi.lines().flushes, 1);
}

#[test]
fn write_word_sends_low_byte_and_flushes() {
    let spi = FakeSpi::default();
    let mut bus = ready_bus(&spi);

    assert_eq!(bus.write_word(0x1234), Ok(Transfer::completed(())));
    assert_eq!(spi.lines().mosi, vec![0x34]);
    assert_eq!(spi.lines().flushes, 1);
}

#[test]
fn read_word_packs_hal_bytes() {
    let spi = FakeSpi::default();
    spi.lines().miso.extend([0x11, 0x22, 0x33]);
    let mut bus = ready_bus(&spi);

    assert_eq!(bus.read_word(3), Ok(Transfer::completed(0x0033_2211)));
}

#[test]
fn hal_error_maps_to_hardware_fault_and_recovers() {
    let spi = FakeSpi::default();
    let mut bus = ready_bus(&spi);
    spi.lines().fail_next = Some(ErrorKind::Overrun);

    let transfer = bus.write_word(0x2A).unwrap();

    assert_eq!(
        transfer.status,
        Status::Recovered(Fault::Hardware(ErrorKind::Overrun))
    );
    assert_eq!(bus.state(), BusState::Ready);
    assert!(bus.port().is_enabled());
    assert!(spi.lines().mosi.is_empty());
}

#[test]
fn gyroscope_read_over_hal_port() {
    let spi = FakeSpi::default();
    spi.lines().miso.extend([0x00, 0x10, 0x20]);
    let journal = Journal::new();
    let bus = SharedBus::new(BusHandle::new(HalPort::new(spi.clone()), Config::default()));
    let mut gyro: DeviceLink<'_, _, MockPin> = DeviceLink::gyroscope(&bus, journal.pin("gyro"));
    gyro.init().unwrap();

    let mut out = [0u8; 2];
    let transfer = gyro.read(&mut out, 0x28).unwrap();

    assert_eq!(transfer.status, Status::Completed);
    assert_eq!(out, [0x10, 0x20]);
    // Address with read and auto-increment flags, then one filler per byte.
    assert_eq!(spi.lines().mosi, vec![0xE8, 0x00, 0x00]);
}
