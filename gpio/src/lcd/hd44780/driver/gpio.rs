use crate::lcd::hd44780::driver::{BusyPolicy, HD44780Driver};
use crate::{GpioDirection, GpioError, GpioLine, GpioLineGroup, GpioResult};
use embedded_hal::delay::DelayNs;
use log::{trace, warn};
use std::fmt::{Debug, Formatter};

#[derive(Debug)]
pub enum GpioHD44780Bus<'a> {
    Bus8Bit(Box<dyn GpioLineGroup<8> + 'a>),
    Bus4Bit(Box<dyn GpioLineGroup<4> + 'a>),
}

impl GpioHD44780Bus<'_> {
    pub fn is_8bit(&self) -> bool {
        matches!(self, GpioHD44780Bus::Bus8Bit(_))
    }

    pub fn is_4bit(&self) -> bool {
        matches!(self, GpioHD44780Bus::Bus4Bit(_))
    }

    /// Gets the amount of data lines.
    pub fn width(&self) -> u8 {
        match self {
            GpioHD44780Bus::Bus8Bit(_) => 8,
            GpioHD44780Bus::Bus4Bit(_) => 4,
        }
    }

    fn set_direction(&mut self, direction: GpioDirection) -> GpioResult<()> {
        match self {
            GpioHD44780Bus::Bus8Bit(bus) => bus.set_direction(direction),
            GpioHD44780Bus::Bus4Bit(bus) => bus.set_direction(direction),
        }
    }

    fn write_bits(&mut self, value: u8) -> GpioResult<()> {
        match self {
            GpioHD44780Bus::Bus8Bit(bus) => bus.write_bits(value),
            GpioHD44780Bus::Bus4Bit(bus) => bus.write_bits(value),
        }
    }

    fn read_bits(&self) -> GpioResult<u8> {
        match self {
            GpioHD44780Bus::Bus8Bit(bus) => bus.read_bits(),
            GpioHD44780Bus::Bus4Bit(bus) => bus.read_bits(),
        }
    }

    /// What a read returns when nothing can be read: all data lines high.
    fn all_ones(&self) -> u8 {
        ((1u16 << self.width()) - 1) as u8
    }
}

/// HD44780 driver talking to the controller over GPIO lines.
///
/// The R/W line is optional. Without it the controller is write-only: there is no busy flag
/// to poll, so every transfer is followed by a fixed settle delay instead.
pub struct GpioHD44780Driver<'a, D> {
    pin_e: Box<dyn GpioLine + 'a>,
    pin_rw: Option<Box<dyn GpioLine + 'a>>,
    pin_rs: Box<dyn GpioLine + 'a>,
    data_bus: GpioHD44780Bus<'a>,
    delay: D,
    busy: BusyPolicy,
}

impl<'a, D: DelayNs> GpioHD44780Driver<'a, D> {
    /// Settle time after a transfer when the busy flag can't be read, in microseconds.
    pub const SETTLE_US: u32 = 100;

    pub fn new_4bit(
        pin_e: Box<dyn GpioLine + 'a>,
        pin_rw: Option<Box<dyn GpioLine + 'a>>,
        pin_rs: Box<dyn GpioLine + 'a>,
        data_bus: Box<dyn GpioLineGroup<4> + 'a>,
        delay: D,
    ) -> Self {
        GpioHD44780Driver {
            pin_e,
            pin_rw,
            pin_rs,
            data_bus: GpioHD44780Bus::Bus4Bit(data_bus),
            delay,
            busy: BusyPolicy::default(),
        }
    }

    pub fn new_8bit(
        pin_e: Box<dyn GpioLine + 'a>,
        pin_rw: Option<Box<dyn GpioLine + 'a>>,
        pin_rs: Box<dyn GpioLine + 'a>,
        data_bus: Box<dyn GpioLineGroup<8> + 'a>,
        delay: D,
    ) -> Self {
        GpioHD44780Driver {
            pin_e,
            pin_rw,
            pin_rs,
            data_bus: GpioHD44780Bus::Bus8Bit(data_bus),
            delay,
            busy: BusyPolicy::default(),
        }
    }

    /// Sets the busy policy. [Hd44780::init](crate::lcd::hd44780::Hd44780::init) replaces it with
    /// the one from its config.
    pub fn with_busy_policy(mut self, busy: BusyPolicy) -> Self {
        self.busy = busy;
        self
    }

    pub fn busy_policy(&self) -> BusyPolicy {
        self.busy
    }

    pub fn data_bus(&self) -> &GpioHD44780Bus<'a> {
        &self.data_bus
    }

    pub fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    pub fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }

    /// Makes every line an output and drives it low.
    pub fn init_pins(&mut self) -> GpioResult<()> {
        self.data_bus.set_direction(GpioDirection::Output)?;
        self.data_bus.write_bits(0)?;
        for pin in [&mut self.pin_rs, &mut self.pin_e] {
            pin.set_direction(GpioDirection::Output)?;
            pin.write(false)?;
        }
        if let Some(rw) = &mut self.pin_rw {
            rw.set_direction(GpioDirection::Output)?;
            rw.write(false)?;
        }
        Ok(())
    }

    /// Latches the low bits of the value into the controller with one pulse of E.
    ///
    /// Only as many bits as there are data lines are sent. RS is left as it is.
    pub fn write_bits(&mut self, value: u8) -> GpioResult<()> {
        if let Some(rw) = &mut self.pin_rw {
            rw.write(false)?;
            self.delay.delay_us(1);
            self.data_bus.set_direction(GpioDirection::Output)?;
        }

        self.pin_e.write(true)?;
        self.delay.delay_us(1);
        self.data_bus.write_bits(value)?;
        self.delay.delay_us(1);
        // Falling edge latches the data
        self.pin_e.write(false)?;

        if self.pin_rw.is_some() {
            self.delay.delay_us(1);
        } else {
            self.delay.delay_us(Self::SETTLE_US);
        }
        Ok(())
    }

    /// Samples the data lines with one pulse of E.
    ///
    /// Returns all ones if the R/W line isn't wired.
    pub fn read_bits(&mut self) -> GpioResult<u8> {
        let Some(rw) = &mut self.pin_rw else {
            return Ok(self.data_bus.all_ones());
        };

        self.data_bus.set_direction(GpioDirection::Input)?;
        rw.write(true)?;
        self.delay.delay_us(1);

        self.pin_e.write(true)?;
        self.delay.delay_us(1);
        let value = self.data_bus.read_bits()?;
        self.pin_e.write(false)?;
        self.delay.delay_us(1);

        Ok(value)
    }

    /// Polls the busy flag until it clears. Returns immediately if the R/W line isn't wired.
    pub fn wait_until_ready(&mut self) -> GpioResult<()> {
        if self.pin_rw.is_none() {
            return Ok(());
        }

        let backoff = self.busy.backoff.as_nanos().min(u32::MAX as u128) as u32;
        let mut polls = 0u32;
        while self.get_busy_flag_and_address()?.0 {
            polls = polls.saturating_add(1);
            if self.busy.max_polls.is_some_and(|max| polls >= max) {
                warn!("Controller still busy after {} polls", polls);
                return Err(GpioError::Timeout);
            }
            self.delay.delay_ns(backoff);
        }
        Ok(())
    }

    fn send(&mut self, data: u8, rs: bool) -> GpioResult<()> {
        self.wait_until_ready()?;

        trace!("Sending data: {:08b}, RS: {}", data, rs);
        self.pin_rs.write(rs)?;

        if self.data_bus.is_8bit() {
            self.write_bits(data)?;
        } else {
            let high_nibble = data >> 4;
            let low_nibble = data & 0x0F;
            trace!("Writing HN: {:04b}", high_nibble);
            self.write_bits(high_nibble)?;
            trace!("Writing LN: {:04b}", low_nibble);
            self.write_bits(low_nibble)?;
        }

        Ok(())
    }

    fn read(&mut self, rs: bool) -> GpioResult<u8> {
        self.pin_rs.write(rs)?;

        let data = if self.data_bus.is_8bit() {
            self.read_bits()?
        } else {
            let high_nibble = self.read_bits()?;
            let low_nibble = self.read_bits()?;
            (high_nibble << 4) | (low_nibble & 0x0F)
        };

        trace!("Read data: {:08b}, RS: {}", data, rs);
        Ok(data)
    }
}

impl<D> Debug for GpioHD44780Driver<'_, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpioHD44780Driver")
            .field("pin_e", &self.pin_e)
            .field("pin_rw", &self.pin_rw)
            .field("pin_rs", &self.pin_rs)
            .field("data_bus", &self.data_bus)
            .field("busy", &self.busy)
            .finish()
    }
}

impl<D: DelayNs> HD44780Driver for GpioHD44780Driver<'_, D> {
    fn send_command(&mut self, command: u8) -> GpioResult<()> {
        self.send(command, false)
    }

    fn send_data(&mut self, data: u8) -> GpioResult<()> {
        self.send(data, true)
    }

    fn read_command(&mut self) -> GpioResult<u8> {
        self.read(false)
    }

    fn read_data(&mut self) -> GpioResult<u8> {
        // Unlike the status, data is only valid once the last instruction is done
        self.wait_until_ready()?;
        self.read(true)
    }

    fn supports_read(&self) -> bool {
        self.pin_rw.is_some()
    }
}
