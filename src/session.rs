//! Chip-select framing shared by every device on the bus.

use core::cell::RefMut;
use core::convert::Infallible;

use embedded_hal::digital::OutputPin;

use crate::bus::{BusHandle, SharedBus};
use crate::port::SpiPort;
use crate::{BusState, Error, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Read,
    Write,
}

/// Where a device expects its flags in the address byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressLayout {
    /// Set for reads.
    pub read_flag: u8,
    /// Set when more than one byte is transferred, so the device advances its
    /// register pointer.
    pub auto_increment_flag: u8,
    /// Clocked out for every byte read.
    pub filler: u8,
}

impl AddressLayout {
    /// L3GD20 / I3G4250D: RW in bit 7, MS in bit 6.
    pub const L3GD20: Self = Self {
        read_flag: 0x80,
        auto_increment_flag: 0x40,
        filler: 0x00,
    };
}

/// One register access, encoded into the address byte sent after select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferRequest {
    pub address: u8,
    pub direction: Direction,
    pub len: usize,
}

impl TransferRequest {
    pub const fn read(address: u8, len: usize) -> Self {
        Self {
            address,
            direction: Direction::Read,
            len,
        }
    }

    pub const fn write(address: u8, len: usize) -> Self {
        Self {
            address,
            direction: Direction::Write,
            len,
        }
    }

    pub const fn encode(&self, layout: &AddressLayout) -> u8 {
        let mut byte = self.address;
        if self.len > 1 {
            byte |= layout.auto_increment_flag;
        }
        if let Direction::Read = self.direction {
            byte |= layout.read_flag;
        }
        byte
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Idle,
    Selected,
    Transferring,
}

/// An open transaction: the bus is held and the device is selected.
///
/// The select line goes high again in [`finish`](Session::finish) or, if the
/// session is abandoned early (for example on an error), when it is dropped.
pub struct Session<'a, P, CS: OutputPin<Error = Infallible>> {
    bus: RefMut<'a, BusHandle<P>>,
    cs: &'a mut CS,
    phase: Phase,
    status: Status,
}

impl<'a, P, CS: OutputPin<Error = Infallible>> Session<'a, P, CS> {
    /// Take the bus and assert `cs`.
    ///
    /// Fails with `Error::Busy` when another session holds the bus and with
    /// `Error::NotReady` when the bus is not initialised; `cs` is untouched in
    /// both cases.
    pub fn open(bus: &'a SharedBus<P>, cs: &'a mut CS) -> Result<Self, Error> {
        let bus = bus.acquire()?;
        if bus.state() != BusState::Ready {
            return Err(Error::NotReady(bus.state()));
        }

        cs.set_low().map_err(Error::Pin)?;
        Ok(Self {
            bus,
            cs,
            phase: Phase::Selected,
            status: Status::Completed,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// First recovered fault seen so far, if any.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Deassert select and report how the transaction went.
    pub fn finish(mut self) -> Result<Status, Error> {
        self.deselect()?;
        Ok(self.status)
    }

    fn deselect(&mut self) -> Result<(), Error> {
        if self.phase != Phase::Idle {
            self.phase = Phase::Idle;
            self.cs.set_high().map_err(Error::Pin)?;
        }
        Ok(())
    }
}

#[maybe_async_cfg::maybe(
    sync(cfg(not(feature = "async")), self = "Session",),
    async(feature = "async", keep_self)
)]
impl<'a, P: SpiPort, CS: OutputPin<Error = Infallible>> Session<'a, P, CS> {
    /// Exchange one byte, recording any recovered fault.
    pub async fn exchange(&mut self, byte: u8) -> Result<u8, Error> {
        self.phase = Phase::Transferring;
        let transfer = self.bus.transfer_byte(byte).await?;
        self.status = self.status.merge(transfer.status);
        Ok(transfer.value)
    }

    /// Send the encoded address byte of `request`.
    pub async fn address(
        &mut self,
        request: TransferRequest,
        layout: &AddressLayout,
    ) -> Result<(), Error> {
        self.exchange(request.encode(layout)).await?;
        Ok(())
    }

    /// Send `data`, discarding what comes back.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        for &byte in data {
            self.exchange(byte).await?;
        }
        Ok(())
    }

    /// Clock `filler` once per byte of `buf`, storing received bytes in order.
    pub async fn read(&mut self, buf: &mut [u8], filler: u8) -> Result<(), Error> {
        for slot in buf.iter_mut() {
            *slot = self.exchange(filler).await?;
        }
        Ok(())
    }

    /// Transmit one frame unit.
    pub async fn write_word(&mut self, value: u16) -> Result<(), Error> {
        self.phase = Phase::Transferring;
        let transfer = self.bus.write_word(value).await?;
        self.status = self.status.merge(transfer.status);
        Ok(())
    }

    /// Receive up to four bytes into a word.
    pub async fn read_word(&mut self, size: usize) -> Result<u32, Error> {
        self.phase = Phase::Transferring;
        let transfer = self.bus.read_word(size).await?;
        self.status = self.status.merge(transfer.status);
        Ok(transfer.value)
    }
}

impl<P, CS: OutputPin<Error = Infallible>> Drop for Session<'_, P, CS> {
    fn drop(&mut self) {
        let _ = self.deselect();
    }
}
