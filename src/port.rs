//! Hardware side of the bus: the SPI peripheral primitives.

#[cfg(not(feature = "async"))]
use embedded_hal::spi::SpiBus;
#[cfg(feature = "async")]
use embedded_hal_async::spi::SpiBus;

use crate::{BitOrder, Config, Fault, FrameSize, Timeout};

#[maybe_async_cfg::maybe(
    sync(cfg(not(feature = "async")), self = "SpiPort",),
    async(feature = "async", keep_self)
)]
/// A full-duplex SPI peripheral with bounded-time transfers.
///
/// Implementations own the register block. `init` and `deinit` must be safe to
/// call in any order; the bus calls `deinit` followed by `init` to recover
/// from a failed transfer.
pub trait SpiPort {
    /// Apply `config` and enable the peripheral.
    fn init(&mut self, config: &Config) -> Result<(), Fault>;

    /// Disable the peripheral and release any partial transfer state.
    fn deinit(&mut self) -> Result<(), Fault>;

    /// Send every byte of `data`.
    async fn transmit(&mut self, data: &[u8], timeout: Timeout) -> Result<(), Fault>;

    /// Fill `buf` with received bytes.
    async fn receive(&mut self, buf: &mut [u8], timeout: Timeout) -> Result<(), Fault>;

    /// Send `tx` while receiving into `rx`. Both slices have the same length.
    async fn transmit_receive(
        &mut self,
        tx: &[u8],
        rx: &mut [u8],
        timeout: Timeout,
    ) -> Result<(), Fault>;
}

/// [`SpiPort`] over an already configured `embedded-hal` SPI bus.
///
/// The wrapped bus is configured by its HAL at construction, so `init` only
/// checks that the requested framing is one an 8-bit `SpiBus` can produce.
/// `mode` and `prescaler` are never compared against the wrapped bus.
///
/// In the blocking build the transfer bound is left to the HAL. With the
/// `async` and `embassy-time` features every primitive runs under
/// `embassy_time::with_timeout` and reports [`Fault::Timeout`] when the
/// bound expires.
pub struct HalPort<SPI> {
    spi: SPI,
    enabled: bool,
}

impl<SPI> HalPort<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self { spi, enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn release(self) -> SPI {
        self.spi
    }

    fn enable(&mut self, config: &Config) -> Result<(), Fault> {
        if config.bit_order != BitOrder::MsbFirst || config.frame_size != FrameSize::Eight {
            return Err(Fault::Unsupported);
        }
        self.enabled = true;
        Ok(())
    }
}

#[cfg(not(feature = "async"))]
impl<SPI: SpiBus<u8>> SpiPort for HalPort<SPI> {
    fn init(&mut self, config: &Config) -> Result<(), Fault> {
        self.enable(config)
    }

    fn deinit(&mut self) -> Result<(), Fault> {
        self.enabled = false;
        Ok(())
    }

    fn transmit(&mut self, data: &[u8], _timeout: Timeout) -> Result<(), Fault> {
        self.spi.write(data).map_err(Fault::from_hal)?;
        self.spi.flush().map_err(Fault::from_hal)
    }

    fn receive(&mut self, buf: &mut [u8], _timeout: Timeout) -> Result<(), Fault> {
        self.spi.read(buf).map_err(Fault::from_hal)?;
        self.spi.flush().map_err(Fault::from_hal)
    }

    fn transmit_receive(
        &mut self,
        tx: &[u8],
        rx: &mut [u8],
        _timeout: Timeout,
    ) -> Result<(), Fault> {
        self.spi.transfer(rx, tx).map_err(Fault::from_hal)?;
        self.spi.flush().map_err(Fault::from_hal)
    }
}

#[cfg(feature = "async")]
impl<SPI: SpiBus<u8>> SpiPort for HalPort<SPI> {
    fn init(&mut self, config: &Config) -> Result<(), Fault> {
        self.enable(config)
    }

    fn deinit(&mut self) -> Result<(), Fault> {
        self.enabled = false;
        Ok(())
    }

    async fn transmit(&mut self, data: &[u8], timeout: Timeout) -> Result<(), Fault> {
        let spi = &mut self.spi;
        bounded(timeout, async {
            spi.write(data).await?;
            spi.flush().await
        })
        .await
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Timeout) -> Result<(), Fault> {
        let spi = &mut self.spi;
        bounded(timeout, async {
            spi.read(buf).await?;
            spi.flush().await
        })
        .await
    }

    async fn transmit_receive(
        &mut self,
        tx: &[u8],
        rx: &mut [u8],
        timeout: Timeout,
    ) -> Result<(), Fault> {
        let spi = &mut self.spi;
        bounded(timeout, async {
            spi.transfer(rx, tx).await?;
            spi.flush().await
        })
        .await
    }
}

/// Run one HAL transfer, giving up once `timeout` has elapsed.
#[cfg(all(feature = "async", feature = "embassy-time"))]
async fn bounded<E: embedded_hal::spi::Error>(
    timeout: Timeout,
    transfer: impl Future<Output = Result<(), E>>,
) -> Result<(), Fault> {
    match embassy_time::with_timeout(timeout.into(), transfer).await {
        Ok(result) => result.map_err(Fault::from_hal),
        Err(_) => Err(Fault::Timeout),
    }
}

#[cfg(all(feature = "async", not(feature = "embassy-time")))]
async fn bounded<E: embedded_hal::spi::Error>(
    _timeout: Timeout,
    transfer: impl Future<Output = Result<(), E>>,
) -> Result<(), Fault> {
    transfer.await.map_err(Fault::from_hal)
}
