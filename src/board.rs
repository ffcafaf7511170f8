//! LEDs and the user button of the discovery board.

use core::convert::Infallible;

use embedded_hal::digital::{InputPin, StatefulOutputPin};

use crate::Error;

/// Board support package version, `0xXYZR` with one byte per field.
pub const BSP_VERSION: u32 = (0x02 << 24) | (0x01 << 16) | (0x08 << 8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Led {
    /// Green, PG13.
    Led3,
    /// Red, PG14.
    Led4,
}

pub struct Leds<L3, L4> {
    led3: L3,
    led4: L4,
}

impl<L3, L4> Leds<L3, L4>
where
    L3: StatefulOutputPin<Error = Infallible>,
    L4: StatefulOutputPin<Error = Infallible>,
{
    /// Take both LED pins and switch them off.
    pub fn new(mut led3: L3, mut led4: L4) -> Result<Self, Error> {
        led3.set_low().map_err(Error::Pin)?;
        led4.set_low().map_err(Error::Pin)?;
        Ok(Self { led3, led4 })
    }

    pub fn on(&mut self, led: Led) -> Result<(), Error> {
        let result = match led {
            Led::Led3 => self.led3.set_high(),
            Led::Led4 => self.led4.set_high(),
        };
        result.map_err(Error::Pin)
    }

    pub fn off(&mut self, led: Led) -> Result<(), Error> {
        let result = match led {
            Led::Led3 => self.led3.set_low(),
            Led::Led4 => self.led4.set_low(),
        };
        result.map_err(Error::Pin)
    }

    pub fn toggle(&mut self, led: Led) -> Result<(), Error> {
        let result = match led {
            Led::Led3 => self.led3.toggle(),
            Led::Led4 => self.led4.toggle(),
        };
        result.map_err(Error::Pin)
    }

    pub fn is_on(&mut self, led: Led) -> Result<bool, Error> {
        let result = match led {
            Led::Led3 => self.led3.is_set_high(),
            Led::Led4 => self.led4.is_set_high(),
        };
        result.map_err(Error::Pin)
    }

    pub fn release(self) -> (L3, L4) {
        (self.led3, self.led4)
    }
}

/// Blue user button on PA0, active high.
pub struct UserButton<B> {
    pin: B,
}

impl<B: InputPin<Error = Infallible>> UserButton<B> {
    pub fn new(pin: B) -> Self {
        Self { pin }
    }

    pub fn is_pressed(&mut self) -> Result<bool, Error> {
        self.pin.is_high().map_err(Error::Pin)
    }

    pub fn release(self) -> B {
        self.pin
    }
}
