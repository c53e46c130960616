//! Behavioural model of an HD44780 controller, attached to a [SimGpioDriver].
//!
//! The model watches the enable line. A falling edge with R/W low (or not wired) latches the
//! data lines, a rising edge with R/W high puts the status or data on them. It starts in 8-bit
//! mode like a freshly powered controller, and switches between 8-bit and 4-bit transfers on
//! function set instructions. Executed instructions update the address counter, DDRAM, CGRAM,
//! and the flag registers, and every transfer is logged with its simulated time.
use crate::lcd::hd44780::PinAssignment;
use crate::lcd::hd44780::command::*;
use crate::sim::{SimDevice, SimGpioDriver, SimPins};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

const DDRAM_SIZE: usize = 0x80;
const CGRAM_SIZE: usize = 0x40;

/// An instruction or data write, as executed by the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SimOp {
    Command(u8),
    Data(u8),
}

/// A single latch of the data lines.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BusWrite {
    pub at: Duration,
    pub rs: bool,
    /// Levels of the wired data lines, first line as the LSb.
    pub bits: u8,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Executed {
    pub at: Duration,
    /// Index of the GPIO event that completed the transfer.
    pub event_index: usize,
    pub op: SimOp,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Memory {
    Ddram,
    Cgram,
}

#[derive(Debug)]
struct Controller {
    pin_rs: usize,
    pin_rw: Option<usize>,
    pin_e: usize,
    // D7 last. A 4-bit bus is wired to D4-D7.
    pin_data: Vec<usize>,

    eight_bit: bool,
    pending_nibble: Option<u8>,
    // RS and value of a 4-bit read in progress
    read_latch: Option<(bool, u8)>,
    busy_reads: u32,
    busy_remaining: u32,

    address_counter: u8,
    memory: Memory,
    ddram: [u8; DDRAM_SIZE],
    cgram: [u8; CGRAM_SIZE],
    function: u8,
    display_control: u8,
    entry_mode: u8,
    display_shift: i32,

    enable_rise: Option<Duration>,
    min_enable_pulse: Option<Duration>,
    bus_writes: Vec<BusWrite>,
    executed: Vec<Executed>,
    status_reads: usize,
}

impl Controller {
    fn new<const N: usize>(pins: &PinAssignment<N>) -> Self {
        Controller {
            pin_rs: pins.rs,
            pin_rw: pins.rw,
            pin_e: pins.enable,
            pin_data: pins.data.to_vec(),
            eight_bit: true,
            pending_nibble: None,
            read_latch: None,
            busy_reads: 0,
            busy_remaining: 0,
            address_counter: 0,
            memory: Memory::Ddram,
            ddram: [b' '; DDRAM_SIZE],
            cgram: [0; CGRAM_SIZE],
            function: 0,
            display_control: 0,
            entry_mode: 0,
            display_shift: 0,
            enable_rise: None,
            min_enable_pulse: None,
            bus_writes: Vec::new(),
            executed: Vec::new(),
            status_reads: 0,
        }
    }

    fn offset(&self) -> usize {
        8 - self.pin_data.len()
    }

    fn sample(&self, pins: &SimPins<'_>) -> u8 {
        let offset = self.offset();
        self.pin_data
            .iter()
            .enumerate()
            .filter(|&(_, &pin)| pins.level(pin))
            .fold(0, |byte, (i, _)| byte | (1 << (i + offset)))
    }

    fn present(&self, pins: &mut SimPins<'_>, byte: u8) {
        let offset = self.offset();
        for (i, &pin) in self.pin_data.iter().enumerate() {
            pins.drive(pin, byte & (1 << (i + offset)) != 0);
        }
    }

    fn reading(&self, pins: &SimPins<'_>) -> bool {
        self.pin_rw.is_some_and(|rw| pins.level(rw))
    }

    fn enable_rising(&mut self, pins: &mut SimPins<'_>) {
        self.enable_rise = Some(pins.now());
        if !self.reading(pins) {
            return;
        }

        let rs = pins.level(self.pin_rs);
        if self.eight_bit {
            let value = self.read_value(rs);
            self.present(pins, value);
            self.finish_read(rs);
        } else if let Some((rs, value)) = self.read_latch.take() {
            self.present(pins, value << 4);
            self.finish_read(rs);
        } else {
            let value = self.read_value(rs);
            self.read_latch = Some((rs, value));
            self.present(pins, value & 0xF0);
        }
    }

    fn enable_falling(&mut self, pins: &mut SimPins<'_>) {
        if let Some(rise) = self.enable_rise.take() {
            let width = pins.now() - rise;
            self.min_enable_pulse = Some(self.min_enable_pulse.map_or(width, |min| min.min(width)));
        }
        if self.reading(pins) {
            return;
        }

        let rs = pins.level(self.pin_rs);
        let byte = self.sample(pins);
        self.bus_writes.push(BusWrite {
            at: pins.now(),
            rs,
            bits: byte >> self.offset(),
        });

        if self.eight_bit {
            self.execute(pins, rs, byte);
        } else if let Some(high) = self.pending_nibble.take() {
            self.execute(pins, rs, (high << 4) | (byte >> 4));
        } else {
            self.pending_nibble = Some(byte >> 4);
        }
    }

    fn read_value(&self, rs: bool) -> u8 {
        if rs {
            self.memory_at(self.address_counter)
        } else {
            let busy = if self.busy_remaining > 0 { BUSY_FLAG } else { 0 };
            busy | (self.address_counter & ADDRESS_MASK)
        }
    }

    fn finish_read(&mut self, rs: bool) {
        if rs {
            self.advance();
        } else {
            self.status_reads += 1;
            self.busy_remaining = self.busy_remaining.saturating_sub(1);
        }
    }

    fn memory_at(&self, address: u8) -> u8 {
        match self.memory {
            Memory::Ddram => self.ddram[(address & ADDRESS_MASK) as usize],
            Memory::Cgram => self.cgram[(address & 0x3F) as usize],
        }
    }

    fn mask(&self) -> u8 {
        match self.memory {
            Memory::Ddram => ADDRESS_MASK,
            Memory::Cgram => 0x3F,
        }
    }

    fn advance(&mut self) {
        let ac = if self.entry_mode & 0b10 != 0 {
            self.address_counter.wrapping_add(1)
        } else {
            self.address_counter.wrapping_sub(1)
        };
        self.address_counter = ac & self.mask();
    }

    fn execute(&mut self, pins: &SimPins<'_>, rs: bool, byte: u8) {
        let op = if rs {
            self.write_data(byte);
            SimOp::Data(byte)
        } else {
            self.run_command(byte);
            SimOp::Command(byte)
        };
        self.executed.push(Executed {
            at: pins.now(),
            event_index: pins.event_index(),
            op,
        });
        self.busy_remaining = self.busy_reads;
    }

    fn write_data(&mut self, byte: u8) {
        let address = self.address_counter;
        match self.memory {
            Memory::Ddram => self.ddram[(address & ADDRESS_MASK) as usize] = byte,
            Memory::Cgram => self.cgram[(address & 0x3F) as usize] = byte,
        }
        self.advance();
        if self.memory == Memory::Ddram && self.entry_mode & 0b01 != 0 {
            // Autoscroll moves the display against the text
            self.display_shift += if self.entry_mode & 0b10 != 0 { -1 } else { 1 };
        }
    }

    fn run_command(&mut self, byte: u8) {
        if byte & SET_DDRAM_ADDRESS != 0 {
            self.memory = Memory::Ddram;
            self.address_counter = byte & ADDRESS_MASK;
        } else if byte & SET_CGRAM_ADDRESS != 0 {
            self.memory = Memory::Cgram;
            self.address_counter = byte & 0x3F;
        } else if byte & FUNCTION_SET != 0 {
            self.function = byte & 0x1F;
            self.eight_bit = byte & 0b1_0000 != 0;
            self.pending_nibble = None;
        } else if byte & CURSOR_SHIFT != 0 {
            let step = if byte & SHIFT_RIGHT != 0 { 1 } else { -1 };
            if byte & SHIFT_DISPLAY != 0 {
                self.display_shift += step;
            } else {
                self.address_counter = self.address_counter.wrapping_add_signed(step as i8) & ADDRESS_MASK;
            }
        } else if byte & DISPLAY_CONTROL != 0 {
            self.display_control = byte & 0b111;
        } else if byte & ENTRY_MODE_SET != 0 {
            self.entry_mode = byte & 0b11;
        } else if byte & RETURN_HOME != 0 {
            self.memory = Memory::Ddram;
            self.address_counter = 0;
            self.display_shift = 0;
        } else if byte & CLEAR_DISPLAY != 0 {
            self.ddram = [b' '; DDRAM_SIZE];
            self.memory = Memory::Ddram;
            self.address_counter = 0;
            self.display_shift = 0;
            self.entry_mode |= 0b10;
        }
    }
}

/// An HD44780 controller wired to simulated lines. Clones share the same controller.
#[derive(Clone, Debug)]
pub struct SimHd44780 {
    controller: Rc<RefCell<Controller>>,
}

impl SimHd44780 {
    /// Creates a controller wired to the given lines of the driver, and attaches it.
    pub fn wired_to<const N: usize>(gpio: &SimGpioDriver, pins: &PinAssignment<N>) -> Self {
        let lcd = SimHd44780 {
            controller: Rc::new(RefCell::new(Controller::new(pins))),
        };
        gpio.attach(lcd.clone());
        lcd
    }

    /// Makes the controller report busy for that many status reads after every instruction.
    pub fn with_busy_reads(self, reads: u32) -> Self {
        self.controller.borrow_mut().busy_reads = reads;
        self
    }

    /// Changes how many status reads report busy, starting with the next instruction.
    pub fn set_busy_reads(&self, reads: u32) {
        self.controller.borrow_mut().busy_reads = reads;
    }

    pub fn bus_writes(&self) -> Vec<BusWrite> {
        self.controller.borrow().bus_writes.clone()
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.controller.borrow().executed.clone()
    }

    pub fn ops(&self) -> Vec<SimOp> {
        self.controller.borrow().executed.iter().map(|e| e.op).collect()
    }

    /// Gets the executed instructions, in order.
    pub fn commands(&self) -> Vec<u8> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                SimOp::Command(command) => Some(command),
                SimOp::Data(_) => None,
            })
            .collect()
    }

    /// Gets the written data bytes, in order.
    pub fn data(&self) -> Vec<u8> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                SimOp::Data(data) => Some(data),
                SimOp::Command(_) => None,
            })
            .collect()
    }

    /// Gets the amount of completed status reads.
    pub fn status_reads(&self) -> usize {
        self.controller.borrow().status_reads
    }

    /// Gets the shortest enable pulse seen, if any.
    pub fn min_enable_pulse(&self) -> Option<Duration> {
        self.controller.borrow().min_enable_pulse
    }

    /// Forgets the logged transfers, counters, and pulse widths. Memory and registers stay.
    pub fn clear_log(&self) {
        let mut controller = self.controller.borrow_mut();
        controller.bus_writes.clear();
        controller.executed.clear();
        controller.status_reads = 0;
        controller.min_enable_pulse = None;
    }

    pub fn address_counter(&self) -> u8 {
        self.controller.borrow().address_counter
    }

    pub fn is_eight_bit(&self) -> bool {
        self.controller.borrow().eight_bit
    }

    /// Gets the last function set flags, without the opcode.
    pub fn function(&self) -> u8 {
        self.controller.borrow().function
    }

    pub fn display_control(&self) -> u8 {
        self.controller.borrow().display_control
    }

    pub fn entry_mode(&self) -> u8 {
        self.controller.borrow().entry_mode
    }

    /// Gets how far the display is shifted, positive to the right.
    pub fn display_shift(&self) -> i32 {
        self.controller.borrow().display_shift
    }

    /// Reads DDRAM as text, starting at the address. Addresses wrap at the end of DDRAM.
    pub fn ddram_text(&self, address: u8, len: usize) -> String {
        let controller = self.controller.borrow();
        (0..len)
            .map(|i| controller.ddram[(address as usize + i) % DDRAM_SIZE] as char)
            .collect()
    }

    /// Gets the eight rows of a custom character.
    pub fn cgram_glyph(&self, index: u8) -> [u8; 8] {
        let controller = self.controller.borrow();
        let base = ((index & 0x7) as usize) << 3;
        let mut glyph = [0; 8];
        glyph.copy_from_slice(&controller.cgram[base..base + 8]);
        glyph
    }
}

impl SimDevice for SimHd44780 {
    fn on_change(&mut self, pins: &mut SimPins<'_>, index: usize, level: bool) {
        let mut controller = self.controller.borrow_mut();
        if index != controller.pin_e {
            return;
        }
        if level {
            controller.enable_rising(pins);
        } else {
            controller.enable_falling(pins);
        }
    }
}
