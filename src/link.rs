//! Per-device links over the shared bus.

use core::convert::Infallible;

use embedded_hal::digital::OutputPin;

use crate::bus::{MAX_WORD_BYTES, SharedBus};
use crate::port::SpiPort;
use crate::session::{AddressLayout, Session, TransferRequest};
use crate::{Error, Status, Transfer};

/// Register-addressed device (the gyroscope) on the shared bus.
pub struct DeviceLink<'a, P, CS> {
    bus: &'a SharedBus<P>,
    cs: CS,
    layout: AddressLayout,
}

impl<'a, P, CS> DeviceLink<'a, P, CS>
where
    CS: OutputPin<Error = Infallible>,
{
    pub fn new(bus: &'a SharedBus<P>, cs: CS, layout: AddressLayout) -> Self {
        Self { bus, cs, layout }
    }

    /// Link for the on-board L3GD20 gyroscope.
    pub fn gyroscope(bus: &'a SharedBus<P>, cs: CS) -> Self {
        Self::new(bus, cs, AddressLayout::L3GD20)
    }

    pub fn layout(&self) -> &AddressLayout {
        &self.layout
    }

    /// Open a raw transaction with this device selected.
    pub fn session(&mut self) -> Result<Session<'_, P, CS>, Error> {
        Session::open(self.bus, &mut self.cs)
    }

    pub fn release(self) -> CS {
        self.cs
    }
}

#[maybe_async_cfg::maybe(
    sync(cfg(not(feature = "async")), self = "DeviceLink",),
    async(feature = "async", keep_self)
)]
impl<'a, P, CS> DeviceLink<'a, P, CS>
where
    P: SpiPort,
    CS: OutputPin<Error = Infallible>,
{
    /// Deselect the device and bring the bus up.
    ///
    /// Select is driven high on every call; the bus itself is only
    /// initialised once.
    pub fn init(&mut self) -> Result<(), Error> {
        self.cs.set_high().map_err(Error::Pin)?;
        self.bus.initialize()
    }

    /// Write `buffer` starting at register `address`.
    pub async fn write(&mut self, buffer: &[u8], address: u8) -> Result<Transfer<()>, Error> {
        let request = TransferRequest::write(address, buffer.len());
        let layout = self.layout;

        let mut session = self.session()?;
        session.address(request, &layout).await?;
        session.write(buffer).await?;
        let status = session.finish()?;

        Ok(Transfer { value: (), status })
    }

    /// Fill `buffer` starting at register `address`.
    pub async fn read(&mut self, buffer: &mut [u8], address: u8) -> Result<Transfer<()>, Error> {
        let request = TransferRequest::read(address, buffer.len());
        let layout = self.layout;

        let mut session = self.session()?;
        session.address(request, &layout).await?;
        session.read(buffer, layout.filler).await?;
        let status = session.finish()?;

        Ok(Transfer { value: (), status })
    }
}

/// ILI9341 link: commands and parameters share the bus, the WRX line tells
/// them apart (low for a register, high for data).
pub struct LcdLink<'a, P, CS, WRX> {
    bus: &'a SharedBus<P>,
    cs: CS,
    wrx: WRX,
    initialized: bool,
}

impl<'a, P, CS, WRX> LcdLink<'a, P, CS, WRX>
where
    CS: OutputPin<Error = Infallible>,
    WRX: OutputPin<Error = Infallible>,
{
    pub fn new(bus: &'a SharedBus<P>, cs: CS, wrx: WRX) -> Self {
        Self {
            bus,
            cs,
            wrx,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn release(self) -> (CS, WRX) {
        (self.cs, self.wrx)
    }
}

#[maybe_async_cfg::maybe(
    sync(cfg(not(feature = "async")), self = "LcdLink",),
    async(feature = "async", keep_self)
)]
impl<'a, P, CS, WRX> LcdLink<'a, P, CS, WRX>
where
    P: SpiPort,
    CS: OutputPin<Error = Infallible>,
    WRX: OutputPin<Error = Infallible>,
{
    /// Reset the control lines and bring the bus up. Only the first call has
    /// any effect.
    pub fn init(&mut self) -> Result<(), Error> {
        if self.initialized {
            return Ok(());
        }

        // Pulse select once so the controller latches a known state.
        self.cs.set_low().map_err(Error::Pin)?;
        self.cs.set_high().map_err(Error::Pin)?;

        self.bus.initialize()?;
        self.initialized = true;
        Ok(())
    }

    /// Send a command byte.
    pub async fn write_reg(&mut self, reg: u8) -> Result<Status, Error> {
        self.wrx.set_low().map_err(Error::Pin)?;

        let mut session = Session::open(self.bus, &mut self.cs)?;
        session.write_word(reg as u16).await?;
        session.finish()
    }

    /// Send a parameter or pixel word.
    pub async fn write_data(&mut self, value: u16) -> Result<Status, Error> {
        self.wrx.set_high().map_err(Error::Pin)?;

        let mut session = Session::open(self.bus, &mut self.cs)?;
        session.write_word(value).await?;
        session.finish()
    }

    /// Send `reg` then read `size` bytes back within the same select window.
    pub async fn read_data(&mut self, reg: u16, size: usize) -> Result<Transfer<u32>, Error> {
        if size == 0 || size > MAX_WORD_BYTES {
            return Err(Error::InvalidLength(size));
        }
        self.wrx.set_low().map_err(Error::Pin)?;

        let mut session = Session::open(self.bus, &mut self.cs)?;
        session.write_word(reg).await?;
        let value = session.read_word(size).await?;
        let status = session.finish()?;

        Ok(Transfer { value, status })
    }
}
