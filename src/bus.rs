//! Bus transport and fault recovery.

use core::cell::{RefCell, RefMut};

use crate::port::SpiPort;
use crate::{BusState, Config, Error, Fault, Transfer};

/// Largest read the word accumulator holds.
pub const MAX_WORD_BYTES: usize = 4;

/// Owner of the SPI peripheral shared by every device on the board.
///
/// Transfers block until the port completes or its timeout expires. A failed
/// transfer resets the peripheral once (de-init + re-init) and hands back
/// whatever the failed primitive produced, tagged [`Status::Recovered`].
///
/// [`Status::Recovered`]: crate::Status::Recovered
pub struct BusHandle<P> {
    port: P,
    config: Config,
    state: BusState,
}

impl<P> BusHandle<P> {
    pub const fn new(port: P, config: Config) -> Self {
        Self {
            port,
            config,
            state: BusState::Uninitialized,
        }
    }

    pub fn state(&self) -> BusState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn release(self) -> P {
        self.port
    }

    fn ensure_ready(&self) -> Result<(), Error> {
        match self.state {
            BusState::Ready => Ok(()),
            state => Err(Error::NotReady(state)),
        }
    }
}

#[maybe_async_cfg::maybe(
    sync(cfg(not(feature = "async")), self = "BusHandle",),
    async(feature = "async", keep_self)
)]
impl<P: SpiPort> BusHandle<P> {
    /// Configure the peripheral unless it is already ready.
    pub fn initialize(&mut self) -> Result<(), Error> {
        if self.state == BusState::Ready {
            return Ok(());
        }

        match self.port.init(&self.config) {
            Ok(()) => {
                debug!("spi bus ready");
                self.state = BusState::Ready;
                Ok(())
            }
            Err(fault) => {
                error!("spi bus init failed: {}", fault);
                self.state = BusState::Faulted;
                Err(Error::Init(fault))
            }
        }
    }

    /// Tear the peripheral down and bring it back up.
    ///
    /// The failed operation is not retried. Returns `Error::Init` when the
    /// peripheral does not come back, leaving the bus faulted.
    pub fn recover(&mut self, fault: Fault) -> Result<(), Error> {
        warn!("spi transfer failed ({}), resetting bus", fault);

        if let Err(deinit_fault) = self.port.deinit() {
            debug!("spi deinit reported {}", deinit_fault);
        }
        self.state = BusState::Uninitialized;

        self.initialize()
    }

    /// Send one frame unit: the low byte of `value` for 8-bit frames, both
    /// bytes (low first) for 16-bit frames.
    pub async fn write_word(&mut self, value: u16) -> Result<Transfer<()>, Error> {
        self.ensure_ready()?;

        let bytes = value.to_le_bytes();
        let len = self.config.frame_size.bytes();
        let timeout = self.config.timeout;
        let result = self.port.transmit(&bytes[..len], timeout).await;
        self.settle(result, ())
    }

    /// Receive `size` bytes (1 to 4) packed in transfer order, first byte in
    /// the least significant position.
    pub async fn read_word(&mut self, size: usize) -> Result<Transfer<u32>, Error> {
        if size == 0 || size > MAX_WORD_BYTES {
            return Err(Error::InvalidLength(size));
        }
        self.ensure_ready()?;

        let mut acc = [0u8; MAX_WORD_BYTES];
        let timeout = self.config.timeout;
        let result = self.port.receive(&mut acc[..size], timeout).await;
        self.settle(result, u32::from_le_bytes(acc))
    }

    /// Full-duplex exchange of exactly one byte.
    pub async fn transfer_byte(&mut self, out: u8) -> Result<Transfer<u8>, Error> {
        self.ensure_ready()?;

        let mut received = [0u8];
        let timeout = self.config.timeout;
        let result = self
            .port
            .transmit_receive(&[out], &mut received, timeout)
            .await;
        trace!("spi {=u8:#x} -> {=u8:#x}", out, received[0]);
        self.settle(result, received[0])
    }

    fn settle<T>(&mut self, result: Result<(), Fault>, value: T) -> Result<Transfer<T>, Error> {
        match result {
            Ok(()) => Ok(Transfer::completed(value)),
            Err(fault) => {
                self.recover(fault)?;
                Ok(Transfer::recovered(value, fault))
            }
        }
    }
}

/// A [`BusHandle`] shared by several device links.
///
/// Each transaction borrows the bus exclusively. A device that tries to open a
/// transaction while another one is still open gets [`Error::Busy`] instead of
/// corrupting the in-flight transfer.
pub struct SharedBus<P> {
    bus: RefCell<BusHandle<P>>,
}

impl<P> SharedBus<P> {
    pub const fn new(bus: BusHandle<P>) -> Self {
        Self {
            bus: RefCell::new(bus),
        }
    }

    /// Exclusive access to the bus, failing fast when it is already held.
    pub fn acquire(&self) -> Result<RefMut<'_, BusHandle<P>>, Error> {
        self.bus.try_borrow_mut().map_err(|_| Error::Busy)
    }

    pub fn is_busy(&self) -> bool {
        self.bus.try_borrow_mut().is_err()
    }

    pub fn state(&self) -> Result<BusState, Error> {
        self.bus
            .try_borrow()
            .map(|bus| bus.state())
            .map_err(|_| Error::Busy)
    }

    pub fn into_inner(self) -> BusHandle<P> {
        self.bus.into_inner()
    }
}

impl<P: SpiPort> SharedBus<P> {
    pub fn initialize(&self) -> Result<(), Error> {
        self.acquire()?.initialize()
    }
}
