//! ROM image parsing.
//!
//! Both ROM formats are exact-size little-endian word dumps; a short file
//! or trailing bytes are errors, never silently padded.

use std::fmt;

/// Constant ROM: 256 words, addressed by RSEL.BS.
pub const CONSTANT_SIZE: usize = 256;
pub const CONSTANT_ROM_BYTES: usize = CONSTANT_SIZE * 2;

/// Microcode: 1024 instructions per bank, 4 banks of address space.
pub const MICROCODE_BANK_SIZE: usize = 1024;
pub const MICROCODE_BANKS: usize = 4;
pub const MICROCODE_ROM_BYTES: usize = MICROCODE_BANK_SIZE * 4;

#[derive(Debug)]
pub enum RomError {
    WrongSize {
        what: &'static str,
        expected: usize,
        got: usize,
    },
}

impl fmt::Display for RomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongSize {
                what,
                expected,
                got,
            } => write!(f, "{what}: expected {expected} bytes, got {got}"),
        }
    }
}

impl std::error::Error for RomError {}

/// Parse a constant ROM file.
pub fn parse_constant_rom(data: &[u8]) -> Result<Vec<u16>, RomError> {
    if data.len() != CONSTANT_ROM_BYTES {
        return Err(RomError::WrongSize {
            what: "constant ROM",
            expected: CONSTANT_ROM_BYTES,
            got: data.len(),
        });
    }
    Ok(data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect())
}

/// Parse one microcode ROM bank.
pub fn parse_microcode_rom(data: &[u8]) -> Result<Vec<u32>, RomError> {
    if data.len() != MICROCODE_ROM_BYTES {
        return Err(RomError::WrongSize {
            what: "microcode ROM",
            expected: MICROCODE_ROM_BYTES,
            got: data.len(),
        });
    }
    Ok(data
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_rom_is_exact_size() {
        assert!(parse_constant_rom(&vec![0; CONSTANT_ROM_BYTES]).is_ok());
        assert!(parse_constant_rom(&vec![0; CONSTANT_ROM_BYTES - 1]).is_err());
        assert!(parse_constant_rom(&vec![0; CONSTANT_ROM_BYTES + 1]).is_err());
    }

    #[test]
    fn words_are_little_endian() {
        let mut data = vec![0u8; CONSTANT_ROM_BYTES];
        data[0] = 0x34;
        data[1] = 0x12;
        let rom = parse_constant_rom(&data).expect("parse");
        assert_eq!(rom[0], 0x1234);

        let mut data = vec![0u8; MICROCODE_ROM_BYTES];
        data[4..8].copy_from_slice(&[0x78, 0x56, 0x34, 0x12]);
        let rom = parse_microcode_rom(&data).expect("parse");
        assert_eq!(rom[1], 0x1234_5678);
    }
}
