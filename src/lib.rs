#![no_std]
//! Shared SPI bus for the STM32F429I discovery board.
//!
//! One SPI peripheral is multiplexed between the ILI9341 LCD controller and the
//! L3GD20 gyroscope. [`BusHandle`] owns the peripheral and its configuration,
//! [`Session`] frames every transaction with the device's chip-select line, and
//! the device links ([`DeviceLink`], [`LcdLink`]) encode the per-device address
//! byte.
//!
//! A failed transfer resets the peripheral (de-init then re-init) and the
//! in-flight data is dropped. The outcome is reported through [`Status`] so
//! callers may retry or ignore it.

#[macro_use]
mod fmt;

pub mod board;
pub mod bus;
pub mod l3gd20;
pub mod link;
pub mod port;
pub mod session;

use core::convert::Infallible;

use embedded_hal::spi::{ErrorKind, MODE_0, Mode};

pub use bus::{BusHandle, SharedBus};
pub use l3gd20::{GyroConfig, L3gd20};
pub use link::{DeviceLink, LcdLink};
pub use port::{HalPort, SpiPort};
pub use session::{AddressLayout, Direction, Phase, Session, TransferRequest};

/// Transfer timeout used by the board support package (`SPIx_TIMEOUT_MAX`).
pub const DEFAULT_TIMEOUT_MS: u32 = 0x1000;

/// Maximum wait for a single transfer primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timeout(u32);

impl Timeout {
    pub const fn from_millis(ms: u32) -> Self {
        Self(ms)
    }

    pub const fn as_millis(self) -> u32 {
        self.0
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self(DEFAULT_TIMEOUT_MS)
    }
}

#[cfg(feature = "embassy-time")]
impl From<embassy_time::Duration> for Timeout {
    fn from(duration: embassy_time::Duration) -> Self {
        Self(duration.as_millis().min(u32::MAX as u64) as u32)
    }
}

#[cfg(feature = "embassy-time")]
impl From<Timeout> for embassy_time::Duration {
    fn from(timeout: Timeout) -> Self {
        embassy_time::Duration::from_millis(timeout.0 as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameSize {
    Eight,
    Sixteen,
}

impl FrameSize {
    /// Bytes moved per frame unit.
    pub const fn bytes(self) -> usize {
        match self {
            FrameSize::Eight => 1,
            FrameSize::Sixteen => 2,
        }
    }
}

/// Who drives the NSS line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipSelectMode {
    /// Select lines are plain GPIOs toggled by the device links.
    Software,
    Hardware,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Master,
    Slave,
}

/// Baud-rate divisor applied to the peripheral clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Prescaler {
    Div2,
    Div4,
    Div8,
    Div16,
    Div32,
    Div64,
    Div128,
    Div256,
}

impl Prescaler {
    const ALL: [Prescaler; 8] = [
        Prescaler::Div2,
        Prescaler::Div4,
        Prescaler::Div8,
        Prescaler::Div16,
        Prescaler::Div32,
        Prescaler::Div64,
        Prescaler::Div128,
        Prescaler::Div256,
    ];

    pub const fn divisor(self) -> u32 {
        match self {
            Prescaler::Div2 => 2,
            Prescaler::Div4 => 4,
            Prescaler::Div8 => 8,
            Prescaler::Div16 => 16,
            Prescaler::Div32 => 32,
            Prescaler::Div64 => 64,
            Prescaler::Div128 => 128,
            Prescaler::Div256 => 256,
        }
    }

    /// SCK frequency produced from `pclk_hz`.
    pub const fn clock_hz(self, pclk_hz: u32) -> u32 {
        pclk_hz / self.divisor()
    }

    /// Fastest divisor whose clock stays within every device's rated maximum.
    ///
    /// Returns `None` when even `/256` is too fast. With no limits the
    /// fastest divisor is returned.
    pub fn for_limits(pclk_hz: u32, device_max_hz: &[u32]) -> Option<Self> {
        let limit = device_max_hz.iter().copied().min().unwrap_or(u32::MAX);
        Self::ALL
            .into_iter()
            .find(|prescaler| prescaler.clock_hz(pclk_hz) <= limit)
    }
}

/// Bus configuration shared by every device on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub mode: Mode,
    pub bit_order: BitOrder,
    pub frame_size: FrameSize,
    pub chip_select: ChipSelectMode,
    pub role: Role,
    pub prescaler: Prescaler,
    pub timeout: Timeout,
}

impl Default for Config {
    // 90 MHz PCLK2 / 16 = 5.625 MHz keeps both the ILI9341 read limit
    // (6.66 MHz) and the L3GD20 limit (10 MHz).
    fn default() -> Self {
        Self {
            mode: MODE_0,
            bit_order: BitOrder::MsbFirst,
            frame_size: FrameSize::Eight,
            chip_select: ChipSelectMode::Software,
            role: Role::Master,
            prescaler: Prescaler::Div16,
            timeout: Timeout::default(),
        }
    }
}

/// Lifecycle of the bus peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusState {
    Uninitialized,
    Ready,
    /// Initialisation failed; the next `initialize` call tries again.
    Faulted,
}

/// Why a transfer primitive did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// The primitive did not finish within the configured [`Timeout`].
    Timeout,
    /// The peripheral was still busy with a previous operation.
    Busy,
    /// The peripheral reported an error.
    Hardware(ErrorKind),
    /// The peripheral cannot apply the requested [`Config`].
    Unsupported,
}

impl Fault {
    pub fn from_hal<E: embedded_hal::spi::Error>(err: E) -> Self {
        Fault::Hardware(err.kind())
    }
}

/// How a transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Completed,
    /// The transfer failed and the bus was reset; the data is not trustworthy.
    Recovered(Fault),
}

impl Status {
    pub const fn is_recovered(self) -> bool {
        matches!(self, Status::Recovered(_))
    }

    /// Keeps the first recovered fault.
    pub const fn merge(self, other: Status) -> Status {
        match self {
            Status::Completed => other,
            Status::Recovered(_) => self,
        }
    }
}

/// Value produced by a transfer together with its [`Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transfer<T> {
    pub value: T,
    pub status: Status,
}

impl<T> Transfer<T> {
    pub const fn completed(value: T) -> Self {
        Self {
            value,
            status: Status::Completed,
        }
    }

    pub const fn recovered(value: T, fault: Fault) -> Self {
        Self {
            value,
            status: Status::Recovered(fault),
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Transfer<U> {
        Transfer {
            value: f(self.value),
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The peripheral could not be (re)initialised; the bus is now faulted.
    Init(Fault),
    /// A transfer was attempted while the bus was not ready.
    NotReady(BusState),
    /// Another device already holds the bus.
    Busy,
    /// Length outside what the primitive supports.
    InvalidLength(usize),
    /// Identification register returned an unexpected value.
    UnknownDevice(u8),
    /// A select, data/command or board pin could not be driven.
    Pin(Infallible),
}
