use dotenv::var;
use eyre::eyre;
use hd44780_gpio::lcd::hd44780::driver::BusyPolicy;
use hd44780_gpio::lcd::hd44780::{Font, LcdConfig, PinAssignment};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::env::var_os;
use std::path::Path;
use std::str::FromStr;

/// Where the display is connected.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Backend {
    /// Raspberry Pi registers through `/dev/mem`.
    Raw,
    /// Raspberry Pi registers through `/dev/gpiomem`.
    GpioMem,
    /// Linux GPIO character device.
    Gpiod,
    /// Simulated display, printed to the log.
    Sim,
}

impl FromStr for Backend {
    type Err = eyre::Report;

    fn from_str(s: &str) -> eyre::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" | "mem" => Ok(Backend::Raw),
            "gpiomem" => Ok(Backend::GpioMem),
            "gpiod" => Ok(Backend::Gpiod),
            "sim" => Ok(Backend::Sim),
            other => Err(eyre!("Unknown backend {:?}", other)),
        }
    }
}

impl Backend {
    pub fn from_env() -> eyre::Result<Self> {
        var("LCD_BACKEND").map_or(Ok(Backend::Sim), |s| s.parse())
    }
}

/// Line numbers of the display.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Pins {
    pub rs: usize,
    pub rw: Option<usize>,
    pub enable: usize,
    /// 4 lines for D4-D7, or 8 for D0-D7.
    pub data: Vec<usize>,
}

impl Default for Pins {
    fn default() -> Self {
        Pins {
            rs: 10,
            rw: Some(9),
            enable: 8,
            data: (0..8).collect(),
        }
    }
}

pub fn parse_pin_bus(pin_str: &str) -> eyre::Result<Vec<usize>> {
    let pins = pin_str
        .split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .collect::<Result<Vec<_>, _>>()?;
    match pins.len() {
        4 | 8 => Ok(pins),
        n => Err(eyre!("Invalid number of data pins: {}, expected 4 or 8", n)),
    }
}

fn parse_optional_pin(pin_str: &str) -> eyre::Result<Option<usize>> {
    match pin_str.trim() {
        "" | "none" | "-" => Ok(None),
        s => Ok(Some(s.parse()?)),
    }
}

impl Pins {
    /// Reads the pins from `LCD_PIN_*` variables. Missing ones keep their defaults.
    pub fn from_env() -> eyre::Result<Self> {
        let mut pins = Pins::default();
        if let Ok(rs) = var("LCD_PIN_RS") {
            pins.rs = rs.trim().parse()?;
        }
        if let Ok(rw) = var("LCD_PIN_RW") {
            pins.rw = parse_optional_pin(&rw)?;
        }
        if let Ok(enable) = var("LCD_PIN_E") {
            pins.enable = enable.trim().parse()?;
        }
        if let Ok(data) = var("LCD_PINS_DATA") {
            pins.data = parse_pin_bus(&data)?;
        }
        Ok(pins)
    }

    /// Gets the 4-bit wiring, on the upper half of the data lines.
    pub fn four_bit(&self) -> PinAssignment<4> {
        let upper = &self.data[self.data.len() - 4..];
        PinAssignment {
            rs: self.rs,
            rw: self.rw,
            enable: self.enable,
            data: [upper[0], upper[1], upper[2], upper[3]],
        }
    }

    /// Gets the 8-bit wiring, if all eight data lines are connected.
    pub fn eight_bit(&self) -> Option<PinAssignment<8>> {
        let data: [usize; 8] = self.data.as_slice().try_into().ok()?;
        Some(PinAssignment {
            rs: self.rs,
            rw: self.rw,
            enable: self.enable,
            data,
        })
    }
}

/// Display geometry and demo pacing, stored as JSON.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    pub cols: u8,
    pub rows: u8,
    pub large_font: bool,
    /// Give up on a busy display after this many polls.
    pub max_busy_polls: Option<u32>,
    /// Base pause between scenes, in milliseconds.
    pub pause_ms: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            cols: 16,
            rows: 2,
            large_font: false,
            max_busy_polls: Some(10_000),
            pause_ms: 2000,
        }
    }
}

impl DisplayConfig {
    fn path() -> std::path::PathBuf {
        let config_str = var_os("CONFIG_FILE");
        let config_str: &OsStr = config_str.as_deref().unwrap_or(OsStr::new("lcd.json"));
        Path::new(config_str).to_path_buf()
    }

    pub fn try_load() -> Option<Self> {
        let config_path = Self::path();
        if config_path.exists() {
            let file = std::fs::File::open(config_path).ok()?;
            let reader = std::io::BufReader::new(file);
            serde_json::from_reader(reader).ok()
        } else {
            None
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        let file = std::fs::File::create(Self::path())?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn lcd_config(&self) -> LcdConfig {
        let font = if self.large_font {
            Font::Dots5x10
        } else {
            Font::Dots5x8
        };
        let busy = BusyPolicy {
            max_polls: self.max_busy_polls,
            ..Default::default()
        };
        LcdConfig::new(self.cols, self.rows)
            .with_font(font)
            .with_busy_policy(busy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pin_lists() {
        assert_eq!(parse_pin_bus("23, 17,21;22").unwrap(), vec![23, 17, 21, 22]);
        assert!(parse_pin_bus("1,2,3").is_err());
        assert!(parse_pin_bus("1,2,x,4").is_err());
    }

    #[test]
    fn rw_can_be_left_out() {
        assert_eq!(parse_optional_pin("none").unwrap(), None);
        assert_eq!(parse_optional_pin(" 9 ").unwrap(), Some(9));
    }

    #[test]
    fn four_bit_wiring_uses_upper_lines() {
        let pins = Pins::default();
        assert_eq!(pins.four_bit().data, [4, 5, 6, 7]);
        assert_eq!(pins.eight_bit().map(|p| p.data), Some([0, 1, 2, 3, 4, 5, 6, 7]));

        let pins = Pins {
            data: vec![23, 17, 21, 22],
            ..Pins::default()
        };
        assert_eq!(pins.four_bit().data, [23, 17, 21, 22]);
        assert_eq!(pins.eight_bit(), None);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: DisplayConfig = serde_json::from_str(r#"{"cols": 20, "rows": 4}"#).unwrap();
        assert_eq!(config.cols, 20);
        assert_eq!(config.pause_ms, 2000);
        assert_eq!(config.lcd_config().busy.max_polls, Some(10_000));
    }
}
