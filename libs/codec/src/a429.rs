//! ARINC 429 label helpers
//!
//! A label word travels as 4 bytes. Byte 3 holds the label number with its
//! bits reversed relative to the usual octal notation, the two low bits of
//! byte 2 hold the SDI, and the top bit of byte 0 is the odd-parity bit.

use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol_constants::A429_LABEL_SIZE;

/// One label word as it appears on the wire
pub type Label = [u8; A429_LABEL_SIZE];

/// Source/destination identifier selector used to demultiplex labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sdi {
    S00,
    S01,
    S10,
    S11,
    /// SDI bits are part of the payload; matches every SDI value
    Extended,
    /// No SDI configured for this label number
    DontCare,
}

impl Sdi {
    /// Parse a configuration value: `"00"`..`"11"`, `"0"`/`"1"`, `"XX"`.
    /// Anything else (including empty) means "don't care".
    pub fn parse(text: &str) -> Sdi {
        match text.trim().to_ascii_uppercase().as_str() {
            "00" | "0" => Sdi::S00,
            "01" | "1" => Sdi::S01,
            "10" => Sdi::S10,
            "11" => Sdi::S11,
            "XX" => Sdi::Extended,
            _ => Sdi::DontCare,
        }
    }

    pub fn from_bits(bits: u8) -> Sdi {
        match bits & 0x03 {
            0 => Sdi::S00,
            1 => Sdi::S01,
            2 => Sdi::S10,
            _ => Sdi::S11,
        }
    }

    /// Wire bits, `None` for the selectors that do not pin the SDI
    pub fn bits(self) -> Option<u8> {
        match self {
            Sdi::S00 => Some(0),
            Sdi::S01 => Some(1),
            Sdi::S10 => Some(2),
            Sdi::S11 => Some(3),
            Sdi::Extended | Sdi::DontCare => None,
        }
    }

    pub fn is_specific(self) -> bool {
        self.bits().is_some()
    }
}

/// Encode an octal label string ("203", "0203") into its wire number
pub fn label_number_encode(octal: &str) -> ProtocolResult<u8> {
    let digits = match octal.len() {
        4 if octal.starts_with('0') => &octal[1..],
        1..=3 => octal,
        0 => return Err(ProtocolError::invalid_label(octal, "empty label number")),
        _ => return Err(ProtocolError::invalid_label(octal, "too many digits")),
    };

    let value = u16::from_str_radix(digits, 8)
        .map_err(|_| ProtocolError::invalid_label(octal, "not an octal number"))?;
    let value = u8::try_from(value)
        .map_err(|_| ProtocolError::invalid_label(octal, "greater than 377"))?;

    Ok(value.reverse_bits())
}

/// Decode a wire label number into its three-digit octal string
pub fn label_number_decode(number: u8) -> String {
    format!("{:03o}", number.reverse_bits())
}

pub fn label_number(label: &Label) -> u8 {
    label[3]
}

pub fn sdi(label: &Label) -> Sdi {
    Sdi::from_bits(label[2])
}

/// Set label number and (when specific) SDI, then fix the parity bit
pub fn update_label(label: &mut Label, number: u8, sdi: Sdi) {
    label[3] = number;
    if let Some(bits) = sdi.bits() {
        label[2] = (label[2] & 0xFC) | bits;
    }
    update_parity(label);
}

/// Set bit 31 so that the word has odd parity
pub fn update_parity(label: &mut Label) {
    label[0] &= 0x7F;
    let folded = label[0] ^ label[1] ^ label[2] ^ label[3];
    if folded.count_ones() % 2 == 0 {
        label[0] |= 0x80;
    }
}

pub fn has_odd_parity(label: &Label) -> bool {
    label.iter().map(|b| b.count_ones()).sum::<u32>() % 2 == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_number_bit_reversal() {
        assert_eq!(label_number_encode("000").unwrap(), 0);
        assert_eq!(label_number_encode("200").unwrap(), 1);
        assert_eq!(label_number_encode("001").unwrap(), 0x80);
        assert_eq!(label_number_encode("0203").unwrap(), 0xC1);
        assert_eq!(label_number_decode(1), "200");
        assert_eq!(label_number_decode(0xC1), "203");
    }

    #[test]
    fn test_label_number_rejects_garbage() {
        assert!(label_number_encode("").is_err());
        assert!(label_number_encode("8").is_err());
        assert!(label_number_encode("400").is_err());
        assert!(label_number_encode("12345").is_err());
    }

    #[test]
    fn test_every_label_roundtrips_through_octal() {
        for number in 0..=u8::MAX {
            let text = label_number_decode(number);
            assert_eq!(label_number_encode(&text).unwrap(), number);
        }
    }

    #[test]
    fn test_sdi_parse() {
        assert_eq!(Sdi::parse("10"), Sdi::S10);
        assert_eq!(Sdi::parse("1"), Sdi::S01);
        assert_eq!(Sdi::parse("xx"), Sdi::Extended);
        assert_eq!(Sdi::parse(""), Sdi::DontCare);
        assert_eq!(Sdi::parse("2"), Sdi::DontCare);
    }

    #[test]
    fn test_update_label_sets_fields_and_parity() {
        let mut label: Label = [0x00, 0x12, 0x37, 0x00];
        update_label(&mut label, 0xC1, Sdi::S10);

        assert_eq!(label_number(&label), 0xC1);
        assert_eq!(sdi(&label), Sdi::S10);
        assert_eq!(label[2] & 0xFC, 0x34);
        assert!(has_odd_parity(&label));

        let before = label;
        update_label(&mut label, 0xC1, Sdi::DontCare);
        assert_eq!(label, before);
    }
}
