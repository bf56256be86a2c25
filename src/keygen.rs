//! Turn one captured PUF response into key bits.
//!
//! The response starts with a textual header terminated by the first `,`.
//! Everything after it is read as one bit stream, most significant bit first
//! within each byte. A position file names which bits of that stream form the
//! key, in ascending order.

use crate::{
    app::{driver::MeasurementDriver, session::Runner},
    config::SessionConfig,
    power::{GpioPowerLine, PowerLine, PowerSwitch},
    serial::{DeviceLink, SerialPort},
    Error, Result,
};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyExtractionError {
    #[error("captured response has no ',' before its payload")]
    MissingDelimiter,

    #[error("position list has more than {key_len} entries")]
    TooManyPositions { key_len: usize },

    #[error("position {offset} after {previous}: offsets must be strictly ascending")]
    NotAscending { previous: u64, offset: u64 },

    #[error("position {offset} is past the {available} captured bits")]
    OutOfRange { offset: u64, available: u64 },

    #[error("position list yields {got} of {key_len} key bits")]
    Incomplete { got: usize, key_len: usize },
}

/// Bit offsets selecting the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionList(Vec<u64>);

impl PositionList {
    /// Whitespace or newline separated decimal integers.
    pub fn parse(raw: &str) -> Result<Self> {
        raw.split_whitespace()
            .enumerate()
            .map(|(idx, token)| {
                token.parse::<u64>().map_err(|_| {
                    Error::Parse(format!("invalid bit position '{token}' (entry {})", idx + 1))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidArgs(format!("position file {}: {e}", path.display()))
        })?;
        Self::parse(&raw)
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reject lists that could never produce exactly `key_len` bits, before any
    /// device time is spent.
    pub fn check(&self, key_len: usize) -> std::result::Result<(), KeyExtractionError> {
        if self.0.len() > key_len {
            return Err(KeyExtractionError::TooManyPositions { key_len });
        }
        if let Some(pair) = self.0.windows(2).find(|pair| pair[1] <= pair[0]) {
            return Err(KeyExtractionError::NotAscending {
                previous: pair[0],
                offset: pair[1],
            });
        }
        if self.0.len() < key_len {
            return Err(KeyExtractionError::Incomplete {
                got: self.0.len(),
                key_len,
            });
        }
        Ok(())
    }
}

/// Read the bits at `positions` from the payload after the first comma.
///
/// Stops when the positions run out, so the result may be shorter than
/// `key_len`; it never grows past it.
pub fn extract_key(
    raw: &[u8],
    positions: &[u64],
    key_len: usize,
) -> std::result::Result<String, KeyExtractionError> {
    let comma = raw
        .iter()
        .position(|&b| b == b',')
        .ok_or(KeyExtractionError::MissingDelimiter)?;
    let payload = &raw[comma + 1..];
    let available = payload.len() as u64 * 8;

    let mut key = String::with_capacity(key_len);
    let mut previous: Option<u64> = None;
    for &offset in positions {
        if key.len() == key_len {
            return Err(KeyExtractionError::TooManyPositions { key_len });
        }
        if let Some(previous) = previous.filter(|&p| offset <= p) {
            return Err(KeyExtractionError::NotAscending { previous, offset });
        }
        if offset >= available {
            return Err(KeyExtractionError::OutOfRange { offset, available });
        }
        let byte = payload[(offset / 8) as usize];
        let shift = 7 - (offset % 8);
        key.push(if (byte >> shift) & 1 == 1 { '1' } else { '0' });
        previous = Some(offset);
    }
    Ok(key)
}

/// [`extract_key`], requiring exactly `key_len` bits.
pub fn key_from_capture(
    raw: &[u8],
    positions: &PositionList,
    key_len: usize,
) -> std::result::Result<String, KeyExtractionError> {
    let key = extract_key(raw, positions.as_slice(), key_len)?;
    if key.len() != key_len {
        return Err(KeyExtractionError::Incomplete {
            got: key.len(),
            key_len,
        });
    }
    Ok(key)
}

/// Capture one response through `driver` and extract the key from it.
pub fn generate_key_with<L: DeviceLink, P: PowerLine>(
    driver: &mut MeasurementDriver<L, P>,
    positions: &PositionList,
    key_len: usize,
) -> Result<String> {
    positions.check(key_len)?;
    let raw = driver.capture_once()?;
    let key = key_from_capture(&raw, positions, key_len)?;
    info!(bits = key_len, "key extracted");
    Ok(key)
}

/// Single-measurement entry point against real hardware. The position file is
/// read and validated before the port or GPIO line is touched.
pub fn generate_key(config: &SessionConfig, positions_path: &Path, key_len: usize) -> Result<String> {
    if key_len == 0 {
        return Err(Error::InvalidArgs("key length must be positive".to_string()));
    }
    let positions = PositionList::load(positions_path)?;
    positions.check(key_len)?;

    let link = SerialPort::connect(&config.device, config.baud)?;
    let line = GpioPowerLine::open(config.power_gpio)?;
    let runner = Runner::new(link, config.params.clone(), 0, config.settle);
    let mut driver = MeasurementDriver::new(
        runner,
        PowerSwitch::new(line, config.power_off_level),
        config.power_off,
        config.out_prefix.clone(),
    );
    generate_key_with(&mut driver, &positions, key_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msb_first_bits_after_comma() {
        let key = extract_key(b"HDR,\x80\x40", &[0, 1, 8, 9], 4).unwrap();
        assert_eq!(key, "1001");
    }

    #[test]
    fn only_first_comma_delimits() {
        // Second ',' (0x2c = 0010_1100) is payload.
        let key = extract_key(b"A,,", &[0, 1, 2, 3, 4, 5, 6, 7], 8).unwrap();
        assert_eq!(key, "00101100");
    }

    #[test]
    fn sparse_positions_skip_bits() {
        let key = extract_key(b"x,\x0f\xf0\x01", &[4, 7, 8, 23], 4).unwrap();
        assert_eq!(key, "1111");
    }

    #[test]
    fn too_many_positions_is_a_bounds_error() {
        let err = extract_key(b"h,\xff", &[0, 1, 2], 2).unwrap_err();
        assert_eq!(err, KeyExtractionError::TooManyPositions { key_len: 2 });
    }

    #[test]
    fn non_ascending_positions_fail() {
        let err = extract_key(b"h,\xff\xff", &[3, 3], 4).unwrap_err();
        assert_eq!(err, KeyExtractionError::NotAscending { previous: 3, offset: 3 });
        let err = extract_key(b"h,\xff\xff", &[9, 2], 4).unwrap_err();
        assert_eq!(err, KeyExtractionError::NotAscending { previous: 9, offset: 2 });
    }

    #[test]
    fn positions_past_payload_fail() {
        let err = extract_key(b"h,\xff", &[8], 1).unwrap_err();
        assert_eq!(err, KeyExtractionError::OutOfRange { offset: 8, available: 8 });
    }

    #[test]
    fn missing_comma_fails() {
        let err = extract_key(b"\x80\x40", &[0], 1).unwrap_err();
        assert_eq!(err, KeyExtractionError::MissingDelimiter);
    }

    #[test]
    fn exhausted_positions_stop_early() {
        assert_eq!(extract_key(b"h,\x80", &[0], 4).unwrap(), "1");
        let positions = PositionList::parse("0").unwrap();
        let err = key_from_capture(b"h,\x80", &positions, 4).unwrap_err();
        assert_eq!(err, KeyExtractionError::Incomplete { got: 1, key_len: 4 });
    }

    #[test]
    fn parses_position_file_text() {
        let positions = PositionList::parse("0 1\n8\r\n\t9\n").unwrap();
        assert_eq!(positions.as_slice(), &[0, 1, 8, 9]);
        let err = PositionList::parse("0 one 2").unwrap_err();
        assert!(format!("{err}").contains("entry 2"));
    }

    #[test]
    fn check_catches_unusable_lists_up_front() {
        let positions = PositionList::parse("0 1 8 9").unwrap();
        assert!(positions.check(4).is_ok());
        assert_eq!(
            positions.check(3),
            Err(KeyExtractionError::TooManyPositions { key_len: 3 })
        );
        assert!(matches!(
            positions.check(5),
            Err(KeyExtractionError::Incomplete { got: 4, key_len: 5 })
        ));
        let unordered = PositionList::parse("4 2").unwrap();
        assert!(matches!(
            unordered.check(2),
            Err(KeyExtractionError::NotAscending { previous: 4, offset: 2 })
        ));
    }

    #[test]
    fn missing_position_file_is_a_usage_error() {
        let err = PositionList::load(Path::new("/nonexistent/positions.txt")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgs(_)));
    }
}
