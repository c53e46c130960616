mod gpio;

use crate::lcd::hd44780::command::*;
use crate::{GpioError, GpioResult};
pub use gpio::*;
use std::fmt::Debug;
use std::time::Duration;

/// Byte-level access to an HD44780 controller.
///
/// Implementors only move bytes in and out of the controller; the display state is kept by
/// [Hd44780](super::Hd44780).
pub trait HD44780Driver: Debug {
    /// Clears the display and sets the cursor to the home position.
    fn clear_display(&mut self) -> GpioResult<()> {
        self.send_command(CLEAR_DISPLAY)
    }

    /// Sets the cursor to the home position, and undoes display shifts.
    fn return_home(&mut self) -> GpioResult<()> {
        self.send_command(RETURN_HOME)
    }

    fn set_entry_mode(&mut self, mode: EntryMode) -> GpioResult<()> {
        self.send_command(mode.command())
    }

    fn set_display_control(&mut self, control: DisplayControl) -> GpioResult<()> {
        self.send_command(control.command())
    }

    fn function_set(&mut self, function: FunctionSet) -> GpioResult<()> {
        self.send_command(function.command())
    }

    /// Moves the cursor or shifts the display, without changing DDRAM.
    fn cursor_shift(&mut self, display_shift: bool, direction: CursorDirection) -> GpioResult<()> {
        let mut command = CURSOR_SHIFT;
        if display_shift {
            command |= SHIFT_DISPLAY;
        }
        if direction == CursorDirection::Right {
            command |= SHIFT_RIGHT;
        }
        self.send_command(command)
    }

    /// Sets the CGRAM address.
    fn set_cgram_address(&mut self, address: u8) -> GpioResult<()> {
        if address > 0b00111111 {
            return Err(GpioError::InvalidArgument);
        }
        self.send_command(SET_CGRAM_ADDRESS | address)
    }

    /// Sets the DDRAM address.
    fn set_ddram_address(&mut self, address: u8) -> GpioResult<()> {
        if address > ADDRESS_MASK {
            return Err(GpioError::InvalidArgument);
        }
        self.send_command(SET_DDRAM_ADDRESS | address)
    }

    /// Reads the busy flag and address counter.
    fn get_busy_flag_and_address(&mut self) -> GpioResult<(bool, u8)> {
        let status = self.read_command()?;
        Ok((status & BUSY_FLAG != 0, status & ADDRESS_MASK))
    }

    // Low-level commands
    // Everything above is built on these.

    /// Sends a command to the HD44780 controller.
    /// Sets the RS pin to 0 (command).
    fn send_command(&mut self, command: u8) -> GpioResult<()>;

    /// Sends data to the HD44780 controller.
    /// Sets the RS pin to 1 (data).
    fn send_data(&mut self, data: u8) -> GpioResult<()>;

    /// Reads the busy flag and address counter.
    /// Sets the RS pin to 0 (command).
    ///
    /// Returns both in a single u8, for easier usage use [Self::get_busy_flag_and_address], which
    /// uses this function internally.
    fn read_command(&mut self) -> GpioResult<u8>;

    /// Reads data from DDRAM or CGRAM at the address counter.
    /// Sets the RS pin to 1 (data).
    fn read_data(&mut self) -> GpioResult<u8>;

    /// Whether the controller can be read from. Without it, reads return all ones and the busy
    /// flag is never polled.
    fn supports_read(&self) -> bool;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CursorDirection {
    Left,
    Right,
}

/// How long to wait for the busy flag to clear.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BusyPolicy {
    /// Pause between two reads of the busy flag.
    pub backoff: Duration,
    /// Amount of busy reads after which [GpioError::Timeout] is returned. `None` waits forever.
    pub max_polls: Option<u32>,
}

impl Default for BusyPolicy {
    fn default() -> Self {
        BusyPolicy {
            backoff: Duration::from_micros(3),
            max_polls: None,
        }
    }
}

impl BusyPolicy {
    /// Gives up after `max_polls` busy reads.
    pub fn bounded(max_polls: u32) -> Self {
        BusyPolicy {
            max_polls: Some(max_polls),
            ..Default::default()
        }
    }
}
