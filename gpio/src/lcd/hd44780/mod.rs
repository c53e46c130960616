//! HD44780 character LCD.
//!
//! [Hd44780] is the display handle: it owns the lines of one display, remembers the display
//! state the controller can't be asked about, and builds text output on top of the byte-level
//! [HD44780Driver].
//!
//! # Wiring
//! RS, E, and either 4 or 8 data lines are required. With a 4-bit bus, the lines go to D4-D7.
//! R/W is optional. Without it the display can't be read from, so the busy flag can't be polled
//! and every transfer waits a fixed time instead, and [Hd44780::create_char] can't restore the
//! cursor position.
//!
//! # Example
//! ```no_run
//! use hd44780_gpio::delay::StdDelay;
//! use hd44780_gpio::gpiod::GpiodDriver;
//! use hd44780_gpio::lcd::hd44780::{Hd44780, LcdConfig, PinAssignment};
//!
//! let gpio = GpiodDriver::open("/dev/gpiochip0").unwrap();
//! let pins = PinAssignment { rs: 25, rw: None, enable: 24, data: [23, 17, 21, 22] };
//! let mut lcd = Hd44780::open_4bit(&gpio, &pins, LcdConfig::new(16, 2), StdDelay::new()).unwrap();
//! lcd.write_string_at("Hello", 0, 0).unwrap();
//! lcd.write_string_at("world!", 0, 1).unwrap();
//! lcd.deinit().unwrap();
//! ```

pub mod command;
pub mod driver;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

use crate::lcd::hd44780::command::*;
use crate::lcd::hd44780::driver::{BusyPolicy, CursorDirection, GpioHD44780Driver, HD44780Driver};
use crate::{GpioDriver, GpioError, GpioLine, GpioLineGroup, GpioResult};
use embedded_hal::delay::DelayNs;
use log::{debug, warn};
use std::fmt;

/// Time for the controller to finish its own reset after power-on, in milliseconds.
const POWER_ON_DELAY_MS: u32 = 50;
/// Wait after the sync transfers, and after clear and home, in milliseconds.
const SLOW_COMMAND_DELAY_MS: u32 = 5;

/// Character font of the display.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Font {
    #[default]
    Dots5x8,
    /// Only available on single-line displays, ignored otherwise.
    Dots5x10,
}

/// Geometry and timing of a display.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LcdConfig {
    pub cols: u8,
    pub rows: u8,
    pub font: Font,
    pub busy: BusyPolicy,
}

impl Default for LcdConfig {
    fn default() -> Self {
        LcdConfig::new(16, 2)
    }
}

impl LcdConfig {
    pub fn new(cols: u8, rows: u8) -> Self {
        LcdConfig {
            cols,
            rows,
            font: Font::default(),
            busy: BusyPolicy::default(),
        }
    }

    pub fn with_font(mut self, font: Font) -> Self {
        self.font = font;
        self
    }

    pub fn with_busy_policy(mut self, busy: BusyPolicy) -> Self {
        self.busy = busy;
        self
    }

    fn validate(&self) -> GpioResult<()> {
        if self.rows == 0 {
            return Err(GpioError::InvalidArgument);
        }
        Ok(())
    }
}

/// Line indices of a display on a [GpioDriver]. `N` is the data bus width, 4 or 8.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PinAssignment<const N: usize> {
    pub rs: usize,
    pub rw: Option<usize>,
    pub enable: usize,
    /// Data lines, lowest first. For a 4-bit bus these are D4-D7.
    pub data: [usize; N],
}

/// An initialized HD44780 display.
///
/// Dropping the handle releases its lines without touching the display. Use [Self::deinit] to
/// blank it first.
#[derive(Debug)]
pub struct Hd44780<'a, D> {
    driver: GpioHD44780Driver<'a, D>,
    function: FunctionSet,
    control: DisplayControl,
    mode: EntryMode,
    lines: u8,
    row_offsets: RowOffsets,
}

impl<'a, D: DelayNs> Hd44780<'a, D> {
    /// Initializes a display on a 4-bit bus, from already claimed lines.
    pub fn init_4bit(
        config: LcdConfig,
        pin_e: Box<dyn GpioLine + 'a>,
        pin_rw: Option<Box<dyn GpioLine + 'a>>,
        pin_rs: Box<dyn GpioLine + 'a>,
        data_bus: Box<dyn GpioLineGroup<4> + 'a>,
        delay: D,
    ) -> GpioResult<Self> {
        let driver = GpioHD44780Driver::new_4bit(pin_e, pin_rw, pin_rs, data_bus, delay);
        Self::init(driver, config)
    }

    /// Initializes a display on an 8-bit bus, from already claimed lines.
    pub fn init_8bit(
        config: LcdConfig,
        pin_e: Box<dyn GpioLine + 'a>,
        pin_rw: Option<Box<dyn GpioLine + 'a>>,
        pin_rs: Box<dyn GpioLine + 'a>,
        data_bus: Box<dyn GpioLineGroup<8> + 'a>,
        delay: D,
    ) -> GpioResult<Self> {
        let driver = GpioHD44780Driver::new_8bit(pin_e, pin_rw, pin_rs, data_bus, delay);
        Self::init(driver, config)
    }

    /// Claims the lines from the GPIO driver and initializes a display on a 4-bit bus.
    ///
    /// # Errors
    /// - `GpioError::AlreadyInUse` if any of the lines is claimed. Lines claimed before the
    ///   failing one are released again.
    /// - `GpioError::InvalidArgument` if a line doesn't exist, or the display has no rows.
    pub fn open_4bit<G: GpioDriver>(
        gpio: &'a G,
        pins: &PinAssignment<4>,
        config: LcdConfig,
        delay: D,
    ) -> GpioResult<Self> {
        config.validate()?;
        let pin_e = gpio.get_line(pins.enable)?;
        let pin_rw = pins.rw.map(|rw| gpio.get_line(rw)).transpose()?;
        let pin_rs = gpio.get_line(pins.rs)?;
        let data_bus = gpio.get_line_group(pins.data)?;
        Self::init_4bit(config, pin_e, pin_rw, pin_rs, data_bus, delay)
    }

    /// Claims the lines from the GPIO driver and initializes a display on an 8-bit bus.
    ///
    /// See [Self::open_4bit] for errors.
    pub fn open_8bit<G: GpioDriver>(
        gpio: &'a G,
        pins: &PinAssignment<8>,
        config: LcdConfig,
        delay: D,
    ) -> GpioResult<Self> {
        config.validate()?;
        let pin_e = gpio.get_line(pins.enable)?;
        let pin_rw = pins.rw.map(|rw| gpio.get_line(rw)).transpose()?;
        let pin_rs = gpio.get_line(pins.rs)?;
        let data_bus = gpio.get_line_group(pins.data)?;
        Self::init_8bit(config, pin_e, pin_rw, pin_rs, data_bus, delay)
    }

    /// Runs the power-on initialization.
    ///
    /// The controller may be in 8-bit mode, 4-bit mode, or halfway through a 4-bit transfer.
    /// Three 8-bit function sets bring it to a known 8-bit state from any of these. On a 4-bit
    /// bus only the upper nibble of each is sent, followed by the nibble switching to 4-bit.
    /// After that the real function set is sent, the display is turned on with the cursor
    /// hidden, text is set to flow left to right, and the display is cleared.
    ///
    /// The busy policy always comes from `config`, replacing the one set on the driver.
    pub fn init(driver: GpioHD44780Driver<'a, D>, config: LcdConfig) -> GpioResult<Self> {
        config.validate()?;
        let eight_bit = driver.data_bus().is_8bit();
        debug!(
            "Initializing {}x{} HD44780 on a {}-bit bus",
            config.cols,
            config.rows,
            driver.data_bus().width()
        );

        let mut function = FunctionSet::default();
        function.set_eight_bit(eight_bit);
        function.set_two_lines(config.rows > 1);
        function.set_large_font(config.font == Font::Dots5x10 && config.rows == 1);

        let mut driver = driver.with_busy_policy(config.busy);
        driver.delay_ms(POWER_ON_DELAY_MS);
        driver.init_pins()?;

        if eight_bit {
            for _ in 0..3 {
                driver.write_bits(function.command())?;
                driver.delay_ms(SLOW_COMMAND_DELAY_MS);
            }
        } else {
            for nibble in [SYNC_8BIT_NIBBLE, SYNC_8BIT_NIBBLE, SYNC_8BIT_NIBBLE, SYNC_4BIT_NIBBLE] {
                driver.write_bits(nibble)?;
                driver.delay_ms(SLOW_COMMAND_DELAY_MS);
            }
        }

        let mut lcd = Hd44780 {
            driver,
            function,
            control: DisplayControl::default(),
            mode: EntryMode::default(),
            lines: config.rows,
            row_offsets: RowOffsets::for_columns(config.cols),
        };
        lcd.driver.function_set(lcd.function)?;

        lcd.control.set_display_on(true);
        lcd.driver.set_display_control(lcd.control)?;

        lcd.mode.set_left_to_right(true);
        lcd.driver.set_entry_mode(lcd.mode)?;

        lcd.clear()?;
        lcd.home()?;
        Ok(lcd)
    }

    /// Blanks the display and releases its lines.
    pub fn deinit(mut self) -> GpioResult<()> {
        debug!("Deinitializing HD44780");
        self.clear()?;
        self.home()?;
        self.display_off()?;
        drop(self);
        Ok(())
    }

    /// Clears the display and moves the cursor home.
    pub fn clear(&mut self) -> GpioResult<()> {
        self.driver.clear_display()?;
        self.driver.delay_ms(SLOW_COMMAND_DELAY_MS);
        Ok(())
    }

    /// Moves the cursor home, and undoes display shifts.
    pub fn home(&mut self) -> GpioResult<()> {
        self.driver.return_home()?;
        self.driver.delay_ms(SLOW_COMMAND_DELAY_MS);
        Ok(())
    }

    // The cached flags only change once the controller has them
    fn update_control(&mut self, f: impl FnOnce(&mut DisplayControl)) -> GpioResult<()> {
        let mut control = self.control;
        f(&mut control);
        self.driver.set_display_control(control)?;
        self.control = control;
        Ok(())
    }

    fn update_mode(&mut self, f: impl FnOnce(&mut EntryMode)) -> GpioResult<()> {
        let mut mode = self.mode;
        f(&mut mode);
        self.driver.set_entry_mode(mode)?;
        self.mode = mode;
        Ok(())
    }

    pub fn display_on(&mut self) -> GpioResult<()> {
        self.update_control(|c| c.set_display_on(true))
    }

    /// Turns the display off. DDRAM keeps its contents.
    pub fn display_off(&mut self) -> GpioResult<()> {
        self.update_control(|c| c.set_display_on(false))
    }

    pub fn cursor_on(&mut self) -> GpioResult<()> {
        self.update_control(|c| c.set_cursor_on(true))
    }

    pub fn cursor_off(&mut self) -> GpioResult<()> {
        self.update_control(|c| c.set_cursor_on(false))
    }

    pub fn blink_on(&mut self) -> GpioResult<()> {
        self.update_control(|c| c.set_blink_on(true))
    }

    pub fn blink_off(&mut self) -> GpioResult<()> {
        self.update_control(|c| c.set_blink_on(false))
    }

    /// Shifts the whole display one position left, without changing DDRAM.
    pub fn scroll_display_left(&mut self) -> GpioResult<()> {
        self.driver.cursor_shift(true, CursorDirection::Left)
    }

    pub fn scroll_display_right(&mut self) -> GpioResult<()> {
        self.driver.cursor_shift(true, CursorDirection::Right)
    }

    pub fn left_to_right(&mut self) -> GpioResult<()> {
        self.update_mode(|m| m.set_left_to_right(true))
    }

    pub fn right_to_left(&mut self) -> GpioResult<()> {
        self.update_mode(|m| m.set_left_to_right(false))
    }

    /// Shifts the display on every write, so the cursor stays in place and the text moves.
    pub fn autoscroll_on(&mut self) -> GpioResult<()> {
        self.update_mode(|m| m.set_autoscroll(true))
    }

    pub fn autoscroll_off(&mut self) -> GpioResult<()> {
        self.update_mode(|m| m.set_autoscroll(false))
    }

    /// Moves the cursor to the column and row.
    ///
    /// Rows past the last one are clamped to it. Columns aren't checked, past the end of a row
    /// they continue into memory that may or may not be visible.
    pub fn set_cursor(&mut self, col: u8, row: u8) -> GpioResult<()> {
        let address = self.row_offsets.address(col, row, self.lines);
        self.driver.set_ddram_address(address)
    }

    /// Writes a raw character code at the cursor.
    pub fn write_char(&mut self, c: u8) -> GpioResult<()> {
        self.driver.send_data(c)
    }

    /// Writes the text at the cursor.
    ///
    /// Characters outside of ASCII are written as `?`. Codes 0-7 show the custom characters.
    pub fn write_string(&mut self, s: &str) -> GpioResult<()> {
        for c in s.chars() {
            let code = if c.is_ascii() {
                c as u8
            } else {
                warn!("Character {:?} is not supported, writing '?' instead", c);
                b'?'
            };
            self.driver.send_data(code)?;
        }
        Ok(())
    }

    pub fn write_char_at(&mut self, c: u8, col: u8, row: u8) -> GpioResult<()> {
        self.set_cursor(col, row)?;
        self.write_char(c)
    }

    pub fn write_string_at(&mut self, s: &str, col: u8, row: u8) -> GpioResult<()> {
        self.set_cursor(col, row)?;
        self.write_string(s)
    }

    /// Gets the DDRAM address of the cursor, or `None` if the display can't be read from.
    pub fn cursor_address(&mut self) -> GpioResult<Option<u8>> {
        if !self.driver.supports_read() {
            return Ok(None);
        }
        self.driver.wait_until_ready()?;
        Ok(Some(self.driver.get_busy_flag_and_address()?.1))
    }

    /// Defines one of the 8 custom characters, shown for character codes 0-7.
    ///
    /// Each row of the pattern is one line of pixels, top first, in its low 5 bits. Only the
    /// low 3 bits of the index are used.
    ///
    /// Writing CGRAM moves the address counter out of DDRAM. If the display can be read from,
    /// the cursor is put back where it was. Otherwise the cursor has to be set again before
    /// writing text.
    pub fn create_char(&mut self, index: u8, pattern: &[u8; 8]) -> GpioResult<()> {
        let address = self.cursor_address()?;
        let base = (index & 0x7) << 3;

        for (i, &row) in pattern.iter().enumerate() {
            self.driver.set_cgram_address(base + i as u8)?;
            self.driver.send_data(row)?;
        }

        match address {
            Some(address) => self.driver.set_ddram_address(address),
            None => {
                debug!("Custom character {} written, cursor not restored", index & 0x7);
                Ok(())
            }
        }
    }

    pub fn display_control(&self) -> DisplayControl {
        self.control
    }

    pub fn entry_mode(&self) -> EntryMode {
        self.mode
    }

    pub fn function(&self) -> FunctionSet {
        self.function
    }

    pub fn lines(&self) -> u8 {
        self.lines
    }

    pub fn row_offsets(&self) -> RowOffsets {
        self.row_offsets
    }

    /// Gets the underlying driver, for raw access to the controller.
    pub fn driver(&mut self) -> &mut GpioHD44780Driver<'a, D> {
        &mut self.driver
    }
}

impl<D: DelayNs> fmt::Write for Hd44780<'_, D> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_string(s).map_err(|_| fmt::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lcd::hd44780::sim::{SimHd44780, SimOp};
    use crate::sim::{SimEvent, SimGpioDriver};
    use std::fmt::Write;
    use std::time::Duration;

    const PINS_4BIT: PinAssignment<4> = PinAssignment {
        rs: 10,
        rw: Some(9),
        enable: 8,
        data: [4, 5, 6, 7],
    };

    const PINS_8BIT: PinAssignment<8> = PinAssignment {
        rs: 10,
        rw: Some(9),
        enable: 8,
        data: [0, 1, 2, 3, 4, 5, 6, 7],
    };

    const SMILEY: [u8; 8] = [
        0b00000, 0b10001, 0b00000, 0b00000, 0b10001, 0b01110, 0b00000, 0b00000,
    ];

    fn sim<const N: usize>(pins: &PinAssignment<N>) -> (SimGpioDriver, SimHd44780) {
        let gpio = SimGpioDriver::new(16);
        let lcd = SimHd44780::wired_to(&gpio, pins);
        (gpio, lcd)
    }

    #[test]
    fn init_4bit_syncs_then_configures() {
        let (gpio, model) = sim(&PINS_4BIT);
        let _lcd = Hd44780::open_4bit(&gpio, &PINS_4BIT, LcdConfig::new(16, 2), gpio.delay()).unwrap();

        let writes = model.bus_writes();
        let sync = writes[..4].iter().map(|w| w.bits).collect::<Vec<_>>();
        assert_eq!(sync, vec![0x3, 0x3, 0x3, 0x2]);
        assert!(writes[..4].iter().all(|w| !w.rs));
        for pair in writes[..5].windows(2) {
            assert!(pair[1].at - pair[0].at >= Duration::from_millis(5));
        }

        assert_eq!(
            model.commands(),
            vec![0x30, 0x30, 0x30, 0x20, 0x28, 0x0C, 0x06, 0x01, 0x02]
        );
        assert!(!model.is_eight_bit());
    }

    #[test]
    fn init_8bit_syncs_with_full_function_set() {
        let (gpio, model) = sim(&PINS_8BIT);
        let _lcd = Hd44780::open_8bit(&gpio, &PINS_8BIT, LcdConfig::new(20, 4), gpio.delay()).unwrap();

        assert_eq!(
            model.commands(),
            vec![0x38, 0x38, 0x38, 0x38, 0x0C, 0x06, 0x01, 0x02]
        );
        assert!(model.is_eight_bit());

        let writes = model.bus_writes();
        assert!(writes[..3].iter().all(|w| !w.rs && w.bits == 0x38));
        for pair in writes[..4].windows(2) {
            assert!(pair[1].at - pair[0].at >= Duration::from_millis(5));
        }
    }

    #[test]
    fn init_waits_for_power_on() {
        let (gpio, model) = sim(&PINS_4BIT);
        let _lcd = Hd44780::open_4bit(&gpio, &PINS_4BIT, LcdConfig::default(), gpio.delay()).unwrap();

        let first_drive = gpio
            .timed_events()
            .into_iter()
            .find(|(_, e)| matches!(e, SimEvent::Direction(..) | SimEvent::Write(..)))
            .map(|(at, _)| at);
        assert!(first_drive >= Some(Duration::from_millis(50)));
        assert!(model.bus_writes()[0].at >= Duration::from_millis(50));
    }

    #[test]
    fn large_font_only_on_single_line() {
        let (gpio, model) = sim(&PINS_8BIT);
        let config = LcdConfig::new(16, 1).with_font(Font::Dots5x10);
        let lcd = Hd44780::open_8bit(&gpio, &PINS_8BIT, config, gpio.delay()).unwrap();
        assert_eq!(lcd.function().command(), 0x34);
        assert_eq!(model.function(), 0x14);
        drop(lcd);

        let (gpio, _model) = sim(&PINS_8BIT);
        let config = LcdConfig::new(16, 2).with_font(Font::Dots5x10);
        let lcd = Hd44780::open_8bit(&gpio, &PINS_8BIT, config, gpio.delay()).unwrap();
        assert_eq!(lcd.function().command(), 0x38);
    }

    #[test]
    fn zero_rows_is_rejected_before_driving_lines() {
        let (gpio, model) = sim(&PINS_4BIT);
        let result = Hd44780::open_4bit(&gpio, &PINS_4BIT, LcdConfig::new(16, 0), gpio.delay());

        assert_eq!(result.err(), Some(GpioError::InvalidArgument));
        assert!(model.bus_writes().is_empty());
        assert!(gpio.events().is_empty());
    }

    #[test]
    fn used_line_fails_open_and_releases_the_rest() {
        let (gpio, _model) = sim(&PINS_4BIT);
        let _taken = gpio.get_line(6).unwrap();

        let result = Hd44780::open_4bit(&gpio, &PINS_4BIT, LcdConfig::default(), gpio.delay());

        assert_eq!(result.err(), Some(GpioError::AlreadyInUse));
        for pin in [4, 5, 7, 8, 9, 10] {
            assert!(!gpio.is_claimed(pin));
        }
    }

    #[test]
    fn init_times_out_on_stuck_controller() {
        let gpio = SimGpioDriver::new(16);
        let model = SimHd44780::wired_to(&gpio, &PINS_4BIT).with_busy_reads(u32::MAX);
        let config = LcdConfig::default().with_busy_policy(BusyPolicy::bounded(5));

        let result = Hd44780::open_4bit(&gpio, &PINS_4BIT, config, gpio.delay());

        assert_eq!(result.err(), Some(GpioError::Timeout));
        assert_eq!(model.status_reads(), 5);
        assert!(!gpio.is_claimed(8));
    }

    #[test]
    fn failed_toggle_keeps_cached_flags() {
        let (gpio, model) = sim(&PINS_8BIT);
        let config = LcdConfig::default().with_busy_policy(BusyPolicy::bounded(3));
        let mut lcd = Hd44780::open_8bit(&gpio, &PINS_8BIT, config, gpio.delay()).unwrap();
        model.set_busy_reads(u32::MAX);
        lcd.write_char(b'x').unwrap();

        assert_eq!(lcd.cursor_on(), Err(GpioError::Timeout));
        assert_eq!(lcd.autoscroll_on(), Err(GpioError::Timeout));

        assert_eq!(lcd.display_control().bits(), 0b100);
        assert_eq!(model.display_control(), lcd.display_control().bits());
        assert_eq!(lcd.entry_mode().bits(), 0b10);
        assert_eq!(model.entry_mode(), lcd.entry_mode().bits());
    }

    #[test]
    fn init_takes_busy_policy_from_config() {
        let (gpio, _model) = sim(&PINS_8BIT);
        let driver = GpioHD44780Driver::new_8bit(
            gpio.get_line(PINS_8BIT.enable).unwrap(),
            PINS_8BIT.rw.map(|rw| gpio.get_line(rw).unwrap()),
            gpio.get_line(PINS_8BIT.rs).unwrap(),
            gpio.get_line_group(PINS_8BIT.data).unwrap(),
            gpio.delay(),
        )
        .with_busy_policy(BusyPolicy::bounded(1));

        let mut lcd = Hd44780::init(driver, LcdConfig::default()).unwrap();

        assert_eq!(lcd.driver().busy_policy(), BusyPolicy::default());
    }

    #[test]
    fn row_offsets_of_16x2() {
        let (gpio, model) = sim(&PINS_4BIT);
        let mut lcd = Hd44780::open_4bit(&gpio, &PINS_4BIT, LcdConfig::new(16, 2), gpio.delay()).unwrap();
        assert_eq!(lcd.row_offsets().as_array(), [0x00, 0x40, 0x10, 0x50]);
        model.clear_log();

        lcd.set_cursor(0, 1).unwrap();

        assert_eq!(model.commands(), vec![0xC0]);
    }

    #[test]
    fn set_cursor_clamps_rows() {
        let (gpio, model) = sim(&PINS_4BIT);
        let mut lcd = Hd44780::open_4bit(&gpio, &PINS_4BIT, LcdConfig::new(16, 2), gpio.delay()).unwrap();
        model.clear_log();

        lcd.set_cursor(3, 5).unwrap();
        assert_eq!(model.commands(), vec![0xC3]);
        drop(lcd);

        let (gpio, model) = sim(&PINS_4BIT);
        let mut lcd = Hd44780::open_4bit(&gpio, &PINS_4BIT, LcdConfig::new(20, 6), gpio.delay()).unwrap();
        model.clear_log();

        lcd.set_cursor(0, 5).unwrap();
        assert_eq!(model.commands(), vec![0xD4]);
    }

    #[test]
    fn write_string_at_lands_in_ddram() {
        let (gpio, model) = sim(&PINS_4BIT);
        let mut lcd = Hd44780::open_4bit(&gpio, &PINS_4BIT, LcdConfig::new(16, 2), gpio.delay()).unwrap();
        model.clear_log();

        lcd.write_string_at("Hi!", 2, 1).unwrap();

        assert_eq!(
            model.ops(),
            vec![
                SimOp::Command(0xC2),
                SimOp::Data(b'H'),
                SimOp::Data(b'i'),
                SimOp::Data(b'!'),
            ]
        );
        assert_eq!(model.ddram_text(0x42, 3), "Hi!");
        assert_eq!(model.address_counter(), 0x45);
    }

    #[test]
    fn every_byte_is_two_nibbles_on_4bit_bus() {
        let (gpio, model) = sim(&PINS_4BIT);
        let mut lcd = Hd44780::open_4bit(&gpio, &PINS_4BIT, LcdConfig::default(), gpio.delay()).unwrap();
        model.clear_log();

        lcd.write_char(b'A').unwrap();
        lcd.cursor_on().unwrap();

        let writes = model
            .bus_writes()
            .iter()
            .map(|w| (w.rs, w.bits))
            .collect::<Vec<_>>();
        assert_eq!(writes, vec![(true, 0x4), (true, 0x1), (false, 0x0), (false, 0xE)]);
    }

    #[test]
    fn non_ascii_becomes_question_mark() {
        let (gpio, model) = sim(&PINS_8BIT);
        let mut lcd = Hd44780::open_8bit(&gpio, &PINS_8BIT, LcdConfig::default(), gpio.delay()).unwrap();

        lcd.write_string("a°b").unwrap();

        assert_eq!(model.ddram_text(0, 3), "a?b");
    }

    #[test]
    fn toggles_change_a_single_flag() {
        let (gpio, model) = sim(&PINS_4BIT);
        let mut lcd = Hd44780::open_4bit(&gpio, &PINS_4BIT, LcdConfig::default(), gpio.delay()).unwrap();
        model.clear_log();

        lcd.cursor_on().unwrap();
        lcd.blink_on().unwrap();
        lcd.display_off().unwrap();
        lcd.cursor_off().unwrap();
        lcd.display_on().unwrap();
        lcd.blink_off().unwrap();
        lcd.autoscroll_on().unwrap();
        lcd.right_to_left().unwrap();
        lcd.left_to_right().unwrap();
        lcd.autoscroll_off().unwrap();

        assert_eq!(
            model.commands(),
            vec![0x0E, 0x0F, 0x0B, 0x09, 0x0D, 0x0C, 0x07, 0x05, 0x07, 0x06]
        );
        assert_eq!(model.display_control(), lcd.display_control().bits());
        assert_eq!(model.entry_mode(), lcd.entry_mode().bits());
    }

    #[test]
    fn scrolling_shifts_the_display() {
        let (gpio, model) = sim(&PINS_8BIT);
        let mut lcd = Hd44780::open_8bit(&gpio, &PINS_8BIT, LcdConfig::default(), gpio.delay()).unwrap();
        model.clear_log();

        lcd.scroll_display_left().unwrap();
        lcd.scroll_display_left().unwrap();
        lcd.scroll_display_right().unwrap();

        assert_eq!(model.commands(), vec![0x18, 0x18, 0x1C]);
        assert_eq!(model.display_shift(), -1);
        assert_eq!(model.address_counter(), 0);
    }

    #[test]
    fn create_char_restores_cursor() {
        let (gpio, model) = sim(&PINS_4BIT);
        let mut lcd = Hd44780::open_4bit(&gpio, &PINS_4BIT, LcdConfig::default(), gpio.delay()).unwrap();
        lcd.write_string("AB").unwrap();
        model.clear_log();

        lcd.create_char(1, &SMILEY).unwrap();

        let mut expected = Vec::new();
        for (i, &row) in SMILEY.iter().enumerate() {
            expected.push(SimOp::Command(0x48 + i as u8));
            expected.push(SimOp::Data(row));
        }
        expected.push(SimOp::Command(0x82));
        assert_eq!(model.ops(), expected);
        assert_eq!(model.cgram_glyph(1), SMILEY);

        lcd.write_char(b'C').unwrap();
        assert_eq!(model.ddram_text(0, 3), "ABC");
    }

    #[test]
    fn create_char_without_rw_leaves_cursor() {
        let pins = PinAssignment { rw: None, ..PINS_4BIT };
        let (gpio, model) = sim(&pins);
        let mut lcd = Hd44780::open_4bit(&gpio, &pins, LcdConfig::default(), gpio.delay()).unwrap();
        model.clear_log();

        lcd.create_char(9, &SMILEY).unwrap();

        let ops = model.ops();
        assert_eq!(ops.len(), 16);
        assert_eq!(ops[0], SimOp::Command(0x48));
        assert_eq!(ops[15], SimOp::Data(SMILEY[7]));
        assert_eq!(model.cgram_glyph(1), SMILEY);
        assert_eq!(lcd.cursor_address(), Ok(None));
    }

    #[test]
    fn cursor_address_reads_address_counter() {
        let (gpio, _model) = sim(&PINS_8BIT);
        let mut lcd = Hd44780::open_8bit(&gpio, &PINS_8BIT, LcdConfig::new(16, 2), gpio.delay()).unwrap();

        lcd.write_string_at("abc", 4, 1).unwrap();

        assert_eq!(lcd.cursor_address(), Ok(Some(0x47)));
    }

    #[test]
    fn data_reads_back() {
        let (gpio, _model) = sim(&PINS_4BIT);
        let mut lcd = Hd44780::open_4bit(&gpio, &PINS_4BIT, LcdConfig::default(), gpio.delay()).unwrap();
        lcd.write_string("XYZ").unwrap();
        lcd.set_cursor(1, 0).unwrap();

        assert_eq!(lcd.driver().read_data(), Ok(b'Y'));
        assert_eq!(lcd.driver().read_data(), Ok(b'Z'));
    }

    #[test]
    fn formatted_output() {
        let (gpio, model) = sim(&PINS_8BIT);
        let mut lcd = Hd44780::open_8bit(&gpio, &PINS_8BIT, LcdConfig::default(), gpio.delay()).unwrap();

        write!(lcd, "{:>4}|{:02}", 42, 7).unwrap();

        assert_eq!(model.ddram_text(0, 7), "  42|07");
    }

    #[test]
    fn deinit_blanks_display_then_releases_lines() {
        let (gpio, model) = sim(&PINS_4BIT);
        let mut lcd = Hd44780::open_4bit(&gpio, &PINS_4BIT, LcdConfig::default(), gpio.delay()).unwrap();
        lcd.cursor_on().unwrap();
        lcd.blink_on().unwrap();
        lcd.write_string("bye").unwrap();
        model.clear_log();
        gpio.clear_events();

        lcd.deinit().unwrap();

        assert_eq!(model.commands(), vec![0x01, 0x02, 0x0B]);
        assert_eq!(model.ddram_text(0, 3), "   ");

        let events = gpio.events();
        let last_enable = events
            .iter()
            .rposition(|e| matches!(e, SimEvent::Write(8, _)));
        let first_release = events
            .iter()
            .position(|e| matches!(e, SimEvent::Release(_)));
        assert!(last_enable < first_release);
        for pin in [4, 5, 6, 7, 8, 9, 10] {
            assert!(!gpio.is_claimed(pin));
        }
    }
}
