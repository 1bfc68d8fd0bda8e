//! Alto configuration.

use crate::rom::{CONSTANT_ROM_BYTES, MICROCODE_ROM_BYTES};

/// Hardware variant — decides memory pair parity, extended-memory
/// references and which tasks may use the RAM-related functions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SystemType {
    /// Alto I: memory pairs at `addr | 1`, no extended memory.
    AltoI,
    /// Alto II with 1K microcode ROM and 1K RAM.
    AltoII1KRom,
    /// Alto II with 2K microcode ROM.
    AltoII2KRom,
    /// Alto II with the 3K-RAM option. The default target.
    #[default]
    AltoII3KRam,
}

impl SystemType {
    #[must_use]
    pub const fn is_alto_ii(self) -> bool {
        !matches!(self, Self::AltoI)
    }

    /// Whether a task may execute the RAM-related functions
    /// (WRTRAM, RDRAM, SRB loads).
    #[must_use]
    pub const fn is_ram_task(self, task: u8) -> bool {
        match self {
            Self::AltoII3KRam => task < 8,
            _ => task == 0,
        }
    }
}

/// Everything needed to build a machine: ROM contents and pack images.
pub struct AltoConfig {
    pub sys_type: SystemType,
    /// Constant ROM file contents: 256 little-endian 16-bit words.
    pub constant_rom: Vec<u8>,
    /// Microcode ROM bank 0: 1024 little-endian 32-bit words.
    pub microcode_rom0: Vec<u8>,
    /// Optional microcode ROM bank 1.
    pub microcode_rom1: Option<Vec<u8>>,
    /// Pack images for drives 0 and 1.
    pub disk1: Option<Vec<u8>>,
    pub disk2: Option<Vec<u8>>,
}

impl AltoConfig {
    /// A configuration with all-zero ROMs, for tests and bring-up.
    #[must_use]
    pub fn blank(sys_type: SystemType) -> Self {
        Self {
            sys_type,
            constant_rom: vec![0; CONSTANT_ROM_BYTES],
            microcode_rom0: vec![0; MICROCODE_ROM_BYTES],
            microcode_rom1: None,
            disk1: None,
            disk2: None,
        }
    }
}
