//! L3GD20 / I3G4250D three-axis gyroscope over a [`DeviceLink`].

use core::convert::Infallible;

use embedded_hal::digital::OutputPin;

use crate::link::DeviceLink;
use crate::port::SpiPort;
use crate::{Error, Status, Transfer};

pub const WHO_AM_I: u8 = 0x0F;
pub const CTRL_REG1: u8 = 0x20;
pub const CTRL_REG2: u8 = 0x21;
pub const CTRL_REG3: u8 = 0x22;
pub const CTRL_REG4: u8 = 0x23;
pub const CTRL_REG5: u8 = 0x24;
pub const OUT_X_L: u8 = 0x28;

/// WHO_AM_I of the L3GD20.
pub const I_AM_L3GD20: u8 = 0xD4;
/// WHO_AM_I of the I3G4250D fitted on later board revisions.
pub const I_AM_I3G4250D: u8 = 0xD3;

const BLE_MSB: u8 = 0x40;
const FULL_SCALE_MASK: u8 = 0x30;
const HIGH_PASS_ENABLE: u8 = 0x10;
const BOOT: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerMode {
    PowerDown = 0x00,
    Active = 0x08,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataRate {
    Hz95 = 0x00,
    Hz190 = 0x40,
    Hz380 = 0x80,
    Hz760 = 0xC0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bandwidth {
    Bw1 = 0x00,
    Bw2 = 0x10,
    Bw3 = 0x20,
    Bw4 = 0x30,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FullScale {
    Dps250 = 0x00,
    Dps500 = 0x10,
    Dps2000 = 0x20,
}

impl FullScale {
    /// Decode the FS bits of CTRL_REG4. Both `0b10` and `0b11` mean 2000 dps.
    pub fn from_ctrl4(ctrl4: u8) -> Self {
        match ctrl4 & FULL_SCALE_MASK {
            0x00 => FullScale::Dps250,
            0x10 => FullScale::Dps500,
            _ => FullScale::Dps2000,
        }
    }

    /// Millidegrees per second per digit.
    pub fn sensitivity(self) -> f32 {
        match self {
            FullScale::Dps250 => 8.75,
            FullScale::Dps500 => 17.50,
            FullScale::Dps2000 => 70.00,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HighPassMode {
    NormalReset = 0x00,
    Reference = 0x10,
    Normal = 0x20,
    AutoReset = 0x30,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HighPassFilter {
    pub mode: HighPassMode,
    /// HPCF bits, 0 to 9.
    pub cutoff: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GyroConfig {
    pub power_mode: PowerMode,
    pub data_rate: DataRate,
    /// X, Y, Z enable bits of CTRL_REG1 (`0x02`, `0x01`, `0x04`).
    pub axes: u8,
    pub bandwidth: Bandwidth,
    /// Output registers not updated until both bytes have been read.
    pub block_data_update: bool,
    pub big_endian: bool,
    pub full_scale: FullScale,
    pub high_pass: Option<HighPassFilter>,
}

impl Default for GyroConfig {
    fn default() -> Self {
        Self {
            power_mode: PowerMode::Active,
            data_rate: DataRate::Hz95,
            axes: 0x07,
            bandwidth: Bandwidth::Bw4,
            block_data_update: false,
            big_endian: false,
            full_scale: FullScale::Dps500,
            high_pass: Some(HighPassFilter {
                mode: HighPassMode::NormalReset,
                cutoff: 0,
            }),
        }
    }
}

impl GyroConfig {
    pub fn ctrl_reg1(&self) -> u8 {
        self.power_mode as u8 | self.data_rate as u8 | (self.axes & 0x07) | self.bandwidth as u8
    }

    pub fn ctrl_reg4(&self) -> u8 {
        let mut value = self.full_scale as u8;
        if self.block_data_update {
            value |= 0x80;
        }
        if self.big_endian {
            value |= BLE_MSB;
        }
        value
    }
}

/// Angular rate in millidegrees per second, X/Y/Z.
pub type AngularRate = [f32; 3];

/// Convert the six output bytes using the CTRL_REG4 value in force.
pub fn convert_raw(ctrl4: u8, raw: &[u8; 6]) -> AngularRate {
    let sensitivity = FullScale::from_ctrl4(ctrl4).sensitivity();
    let big_endian = ctrl4 & BLE_MSB != 0;

    let mut rate = [0.0f32; 3];
    for (axis, out) in rate.iter_mut().enumerate() {
        let pair = [raw[2 * axis], raw[2 * axis + 1]];
        let value = if big_endian {
            i16::from_be_bytes(pair)
        } else {
            i16::from_le_bytes(pair)
        };
        *out = value as f32 * sensitivity;
    }
    rate
}

pub struct L3gd20<'a, P, CS> {
    link: DeviceLink<'a, P, CS>,
}

impl<'a, P, CS> L3gd20<'a, P, CS>
where
    CS: OutputPin<Error = Infallible>,
{
    pub fn new(link: DeviceLink<'a, P, CS>) -> Self {
        Self { link }
    }

    pub fn link(&mut self) -> &mut DeviceLink<'a, P, CS> {
        &mut self.link
    }

    pub fn release(self) -> DeviceLink<'a, P, CS> {
        self.link
    }
}

#[maybe_async_cfg::maybe(
    sync(cfg(not(feature = "async")), self = "L3gd20",),
    async(feature = "async", keep_self)
)]
impl<'a, P, CS> L3gd20<'a, P, CS>
where
    P: SpiPort,
    CS: OutputPin<Error = Infallible>,
{
    /// Bring up the link, check the part and apply `config`.
    pub async fn init(&mut self, config: GyroConfig) -> Result<Status, Error> {
        self.link.init()?;

        let id = self.read_id().await?;
        let mut status = id.status;
        if id.value != I_AM_L3GD20 && id.value != I_AM_I3G4250D {
            return Err(Error::UnknownDevice(id.value));
        }

        status = status.merge(self.write_reg(CTRL_REG1, config.ctrl_reg1()).await?);
        status = status.merge(self.write_reg(CTRL_REG4, config.ctrl_reg4()).await?);

        if let Some(filter) = config.high_pass {
            let ctrl2 = filter.mode as u8 | (filter.cutoff & 0x0F);
            status = status.merge(self.write_reg(CTRL_REG2, ctrl2).await?);

            let ctrl5 = self.read_reg(CTRL_REG5).await?;
            status = status.merge(ctrl5.status);
            status = status.merge(
                self.write_reg(CTRL_REG5, ctrl5.value | HIGH_PASS_ENABLE)
                    .await?,
            );
        }

        debug!("gyroscope {=u8:#x} configured", id.value);
        Ok(status)
    }

    pub async fn read_id(&mut self) -> Result<Transfer<u8>, Error> {
        self.read_reg(WHO_AM_I).await
    }

    /// Reload the trimming values from the internal memory.
    pub async fn reboot(&mut self) -> Result<Status, Error> {
        let ctrl5 = self.read_reg(CTRL_REG5).await?;
        let status = self.write_reg(CTRL_REG5, ctrl5.value | BOOT).await?;
        Ok(ctrl5.status.merge(status))
    }

    /// Angular rate of the three axes in millidegrees per second.
    pub async fn read_xyz(&mut self) -> Result<Transfer<AngularRate>, Error> {
        let ctrl4 = self.read_reg(CTRL_REG4).await?;

        let mut raw = [0u8; 6];
        let out = self.link.read(&mut raw, OUT_X_L).await?;

        Ok(Transfer {
            value: convert_raw(ctrl4.value, &raw),
            status: ctrl4.status.merge(out.status),
        })
    }

    pub async fn read_reg(&mut self, reg: u8) -> Result<Transfer<u8>, Error> {
        let mut value = [0u8];
        let transfer = self.link.read(&mut value, reg).await?;
        Ok(transfer.map(|()| value[0]))
    }

    pub async fn write_reg(&mut self, reg: u8, value: u8) -> Result<Status, Error> {
        let transfer = self.link.write(&[value], reg).await?;
        Ok(transfer.status)
    }
}
