use core::fmt::Write;
use heapless::String;

/// Length of a 1-Wire ROM code in bytes (family, 48-bit serial, CRC)
pub const ROM_LEN: usize = 8;

/// Number of ROM bytes shown in the textual address (the CRC is implied)
const TEXT_BYTES: usize = 7;

/// Capacity for any sensor address rendered as text
pub const ADDRESS_TEXT_LEN: usize = 20;

/// Textual sensor address as used in route paths
pub type AddressText = String<ADDRESS_TEXT_LEN>;

/// ROM code of a device on an enumerable bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusAddress(pub [u8; ROM_LEN]);

/// Why an address string could not be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressError {
    /// Wrong number of hex digits
    Length,
    /// Character outside `0-9a-fA-F` (other than the family separator)
    InvalidDigit,
}

impl BusAddress {
    /// The all-zero address marks an unused slot
    pub const EMPTY: BusAddress = BusAddress([0; ROM_LEN]);

    pub const fn new(rom: [u8; ROM_LEN]) -> Self {
        Self(rom)
    }

    /// Build a full ROM code from the seven identifying bytes, appending the CRC
    pub fn from_identity(identity: [u8; TEXT_BYTES]) -> Self {
        let mut rom = [0u8; ROM_LEN];
        rom[..TEXT_BYTES].copy_from_slice(&identity);
        rom[TEXT_BYTES] = crc8(&identity);
        Self(rom)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0; ROM_LEN]
    }

    pub fn as_bytes(&self) -> &[u8; ROM_LEN] {
        &self.0
    }

    /// Two addresses refer to the same device when their identifying bytes match.
    /// The CRC byte is ignored so decoded text compares equal to a scanned ROM.
    pub fn same_device(&self, other: &BusAddress) -> bool {
        self.0[..TEXT_BYTES] == other.0[..TEXT_BYTES]
    }

    /// Render as `XX-XXXXXXXXXXXX`: uppercase hex, hyphen after the family byte
    pub fn to_text(&self) -> AddressText {
        let mut text = AddressText::new();
        for (i, byte) in self.0[..TEXT_BYTES].iter().enumerate() {
            // 15 characters always fit into the buffer
            let _ = write!(text, "{:02X}", byte);
            if i == 0 {
                let _ = text.push('-');
            }
        }
        text
    }

    /// Parse the textual form. Hex digits are case-insensitive and the
    /// separator after the family byte is optional.
    pub fn parse(text: &str) -> Result<Self, AddressError> {
        let mut nibbles = [0u8; TEXT_BYTES * 2];
        let mut count = 0;
        for (i, &c) in text.as_bytes().iter().enumerate() {
            if i == 2 && c == b'-' {
                continue;
            }
            if count == nibbles.len() {
                return Err(AddressError::Length);
            }
            nibbles[count] = hex_digit(c)?;
            count += 1;
        }
        if count != nibbles.len() {
            return Err(AddressError::Length);
        }

        let mut identity = [0u8; TEXT_BYTES];
        for (byte, pair) in identity.iter_mut().zip(nibbles.chunks(2)) {
            *byte = pair[0] << 4 | pair[1];
        }
        Ok(Self::from_identity(identity))
    }
}

fn hex_digit(c: u8) -> Result<u8, AddressError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(AddressError::InvalidDigit),
    }
}

/// Dallas/Maxim CRC-8 (polynomial x^8 + x^5 + x^4 + 1, reflected)
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        let mut b = byte;
        for _ in 0..8 {
            let mix = (crc ^ b) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            b >>= 1;
        }
    }
    crc
}

impl core::fmt::Display for BusAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl core::fmt::Display for AddressError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AddressError::Length => write!(f, "Address has wrong length"),
            AddressError::InvalidDigit => write!(f, "Address contains a non-hex digit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_format() {
        let addr = BusAddress::new([0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x00]);
        assert_eq!(addr.to_text().as_str(), "01-020304050607");
    }

    #[test]
    fn test_parse_with_and_without_separator() {
        let with = BusAddress::parse("28-FF4A1B2C3D4E").unwrap();
        let without = BusAddress::parse("28ff4a1b2c3d4e").unwrap();
        assert_eq!(with, without);
        assert_eq!(with.as_bytes()[0], 0x28);
        assert_eq!(with.as_bytes()[6], 0x4E);
    }

    #[test]
    fn test_round_trip() {
        let samples = [
            [0x28, 0xFF, 0x4A, 0x1B, 0x2C, 0x3D, 0x4E, 0x11],
            [0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x22],
            [0xAB, 0xCD, 0xEF, 0x01, 0x23, 0x45, 0x67, 0x33],
        ];
        for rom in samples {
            let text = BusAddress::new(rom).to_text();
            let decoded = BusAddress::parse(&text).unwrap();
            assert_eq!(decoded.to_text(), text);
            assert!(decoded.same_device(&BusAddress::new(rom)));
        }
    }

    #[test]
    fn test_decode_regenerates_crc() {
        // ROM code of a real DS18B20 probe
        let rom = [0x28, 0xFF, 0x64, 0x1E, 0x0F, 0x1C, 0x03, 0x00];
        let crc = crc8(&rom[..7]);
        let decoded = BusAddress::parse(&BusAddress::new(rom).to_text()).unwrap();
        assert_eq!(decoded.as_bytes()[7], crc);
    }

    #[test]
    fn test_crc8_check_value() {
        // Maxim application note 27 example ROM: 02 1C B8 01 00 00 00 with CRC A2
        assert_eq!(crc8(&[0x02, 0x1C, 0xB8, 0x01, 0x00, 0x00, 0x00]), 0xA2);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(BusAddress::parse("28-FF"), Err(AddressError::Length));
        assert_eq!(BusAddress::parse("28-FF4A1B2C3D4G"), Err(AddressError::InvalidDigit));
        assert_eq!(BusAddress::parse(""), Err(AddressError::Length));
    }
}
