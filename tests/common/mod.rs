#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use disco_spi_bus::{Config, Fault, SpiPort, Timeout};
use embedded_hal::digital::{ErrorType, InputPin, OutputPin, StatefulOutputPin};

// ---------------------------------------------------------------------------
// Shared journal
// ---------------------------------------------------------------------------

/// Everything the port and the pins observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Init,
    Deinit,
    Tx(Vec<u8>),
    Rx(usize),
    Xfer(u8),
    Low(&'static str),
    High(&'static str),
}

#[derive(Default)]
pub struct Wire {
    pub events: Vec<Event>,
    /// Bytes returned by full-duplex exchanges and receives.
    pub responses: VecDeque<u8>,
    /// When set, transmitted bytes are queued and received back.
    pub loopback: bool,
    looped: VecDeque<u8>,
    /// Transfer primitives completed or failed so far.
    transfers: usize,
    /// Transfer index (0-based) that fails, and how.
    failures: Vec<(usize, Fault)>,
    /// Number of upcoming `init` calls that fail.
    pub init_failures: usize,
    pub configs: Vec<Config>,
    pub timeouts: Vec<Timeout>,
}

#[derive(Clone, Default)]
pub struct Journal(Rc<RefCell<Wire>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(&self) -> MockPort {
        MockPort {
            wire: self.clone(),
        }
    }

    pub fn pin(&self, name: &'static str) -> MockPin {
        MockPin {
            name,
            high: false,
            wire: self.clone(),
        }
    }

    pub fn wire(&self) -> std::cell::RefMut<'_, Wire> {
        self.0.borrow_mut()
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().events.clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().events.clear();
    }

    pub fn respond(&self, bytes: &[u8]) {
        self.0.borrow_mut().responses.extend(bytes.iter().copied());
    }

    pub fn fail_transfer(&self, index: usize, fault: Fault) {
        let mut wire = self.0.borrow_mut();
        let at = wire.transfers + index;
        wire.failures.push((at, fault));
    }

    pub fn count(&self, event: &Event) -> usize {
        self.0.borrow().events.iter().filter(|e| *e == event).count()
    }

    /// Bytes exchanged on the wire, ignoring pins.
    pub fn exchanged(&self) -> Vec<u8> {
        self.0
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Xfer(b) => Some(*b),
                _ => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Mock SPI port
// ---------------------------------------------------------------------------

pub struct MockPort {
    wire: Journal,
}

impl MockPort {
    fn next_fault(wire: &mut Wire) -> Option<Fault> {
        let index = wire.transfers;
        wire.transfers += 1;
        wire.failures
            .iter()
            .find(|(at, _)| *at == index)
            .map(|(_, fault)| *fault)
    }

    fn next_byte(wire: &mut Wire) -> u8 {
        if wire.loopback {
            if let Some(byte) = wire.looped.pop_front() {
                return byte;
            }
        }
        wire.responses.pop_front().unwrap_or(0)
    }
}

impl SpiPort for MockPort {
    fn init(&mut self, config: &Config) -> Result<(), Fault> {
        let mut wire = self.wire.wire();
        wire.events.push(Event::Init);
        wire.configs.push(*config);
        if wire.init_failures > 0 {
            wire.init_failures -= 1;
            return Err(Fault::Hardware(embedded_hal::spi::ErrorKind::ModeFault));
        }
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), Fault> {
        self.wire.wire().events.push(Event::Deinit);
        Ok(())
    }

    fn transmit(&mut self, data: &[u8], timeout: Timeout) -> Result<(), Fault> {
        let mut wire = self.wire.wire();
        wire.events.push(Event::Tx(data.to_vec()));
        wire.timeouts.push(timeout);
        if let Some(fault) = Self::next_fault(&mut wire) {
            return Err(fault);
        }
        if wire.loopback {
            wire.looped.extend(data.iter().copied());
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Timeout) -> Result<(), Fault> {
        let mut wire = self.wire.wire();
        wire.events.push(Event::Rx(buf.len()));
        wire.timeouts.push(timeout);
        if let Some(fault) = Self::next_fault(&mut wire) {
            return Err(fault);
        }
        for slot in buf.iter_mut() {
            *slot = Self::next_byte(&mut wire);
        }
        Ok(())
    }

    fn transmit_receive(
        &mut self,
        tx: &[u8],
        rx: &mut [u8],
        timeout: Timeout,
    ) -> Result<(), Fault> {
        let mut wire = self.wire.wire();
        for &byte in tx {
            wire.events.push(Event::Xfer(byte));
        }
        wire.timeouts.push(timeout);
        if let Some(fault) = Self::next_fault(&mut wire) {
            return Err(fault);
        }
        for slot in rx.iter_mut() {
            *slot = Self::next_byte(&mut wire);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mock pins
// ---------------------------------------------------------------------------

pub struct MockPin {
    name: &'static str,
    high: bool,
    wire: Journal,
}

impl MockPin {
    pub fn is_high_level(&self) -> bool {
        self.high
    }
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        self.wire.wire().events.push(Event::Low(self.name));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        self.wire.wire().events.push(Event::High(self.name));
        Ok(())
    }
}

impl StatefulOutputPin for MockPin {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.high)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.high)
    }
}

impl InputPin for MockPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.high)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.high)
    }
}

/// Position of each select edge for `name` in the journal.
pub fn select_edges(events: &[Event], name: &'static str) -> Vec<(usize, bool)> {
    events
        .iter()
        .enumerate()
        .filter_map(|(i, e)| match e {
            Event::Low(n) if *n == name => Some((i, false)),
            Event::High(n) if *n == name => Some((i, true)),
            _ => None,
        })
        .collect()
}
