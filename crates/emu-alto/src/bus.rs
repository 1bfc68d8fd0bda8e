//! The machine bus: memory plus every peripheral controller, with the
//! I/O-page routing and the memory pipeline orchestration.

use crate::config::SystemType;
use crate::disk::DiskController;
use crate::display::DisplayController;
use crate::ethernet::EthernetController;
use crate::keyboard::Keyboard;
use crate::memory::{IO_PAGE_START, KEYBOARD_BASE, Memory, XM_BANK_REG_BASE};
use crate::mouse::Mouse;
use crate::transport::Transport;

pub struct AltoBus {
    pub mem: Memory,
    pub disk: DiskController,
    pub display: DisplayController,
    pub ethernet: EthernetController,
    pub keyboard: Keyboard,
    pub mouse: Mouse,
}

impl AltoBus {
    pub fn new(transport: Box<dyn Transport>, host_address: u8) -> Self {
        Self {
            mem: Memory::new(),
            disk: DiskController::new(),
            display: DisplayController::new(),
            ethernet: EthernetController::new(transport, host_address),
            keyboard: Keyboard::new(),
            mouse: Mouse::new(),
        }
    }

    pub fn reset(&mut self) {
        self.mem.reset();
        self.disk.reset();
        self.display.reset();
        self.ethernet.reset();
        self.keyboard.reset();
        self.mouse.reset();
    }

    /// Advance the device timers one cycle; returns task wakeup bits.
    pub fn tick(&mut self) -> u16 {
        self.disk.tick() | self.display.tick() | self.ethernet.tick()
    }

    /// A word read, with the I/O page decoded in bank 0.
    #[must_use]
    pub fn read_word(&self, bank: u32, addr: u16) -> u16 {
        if bank == 0 && addr >= IO_PAGE_START {
            return match addr {
                XM_BANK_REG_BASE..=0xFFEF => {
                    self.mem.xm_bank_read(usize::from(addr - XM_BANK_REG_BASE))
                }
                KEYBOARD_BASE..=0xFE1F => self.keyboard.read(usize::from(addr - KEYBOARD_BASE)),
                _ => 0xFFFF,
            };
        }
        self.mem.ram_read(bank, addr)
    }

    pub fn write_word(&mut self, bank: u32, addr: u16, value: u16) {
        if bank == 0 && addr >= IO_PAGE_START {
            if let XM_BANK_REG_BASE..=0xFFEF = addr {
                self.mem.xm_banks[usize::from(addr - XM_BANK_REG_BASE)] = value & 0xF;
            }
            // Other I/O-page addresses ignore stores.
            return;
        }
        self.mem.ram_write(bank, addr, value);
    }

    /// MAR←: start a memory reference. Both words of the pair are latched
    /// now; `READ_MD` drains them.
    pub fn load_mar(&mut self, sys_type: SystemType, task: u8, addr: u16, extended: bool) {
        self.mem.mar = addr;
        self.mem.mem_task = task;
        self.mem.mem_extended = extended;
        self.mem.mem_which = false;
        self.mem.mem_cycle = 0;
        let bank = self.mem.bank(task, extended);
        self.mem.mem_low = self.read_word(bank, addr);
        self.mem.mem_high = self.read_word(bank, Memory::pair_addr(sys_type, addr));
    }

    /// ←MD: the low word first, then the high, toggling each read.
    pub fn read_md(&mut self) -> u16 {
        let value = if self.mem.mem_which {
            self.mem.mem_high
        } else {
            self.mem.mem_low
        };
        self.mem.mem_which = !self.mem.mem_which;
        value
    }

    /// MD←: store to MAR or its pair, by the same toggle.
    pub fn store_md(&mut self, sys_type: SystemType, value: u16) {
        let addr = if self.mem.mem_which {
            Memory::pair_addr(sys_type, self.mem.mar)
        } else {
            self.mem.mar
        };
        let bank = self.mem.bank(self.mem.mem_task, self.mem.mem_extended);
        self.write_word(bank, addr, value);
        self.mem.mem_which = !self.mem.mem_which;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemTransport;

    fn bus() -> AltoBus {
        let (a, _b) = MemTransport::pair();
        AltoBus::new(Box::new(a), 0o42)
    }

    #[test]
    fn bank_registers_are_memory_mapped() {
        let mut bus = bus();
        bus.write_word(0, XM_BANK_REG_BASE + 3, 0x000B);
        assert_eq!(bus.mem.xm_banks[3], 0x000B);
        // Reads come back with the upper 12 bits forced on.
        assert_eq!(bus.read_word(0, XM_BANK_REG_BASE + 3), 0xFFFB);
    }

    #[test]
    fn keyboard_words_are_memory_mapped() {
        let mut bus = bus();
        bus.keyboard.key_down(1, 2);
        assert_eq!(bus.read_word(0, KEYBOARD_BASE + 1), 0xDFFF);
        // Stores to the keyboard are ignored.
        bus.write_word(0, KEYBOARD_BASE + 1, 0);
        assert_eq!(bus.read_word(0, KEYBOARD_BASE + 1), 0xDFFF);
    }

    #[test]
    fn io_page_only_decodes_in_bank_zero() {
        let mut bus = bus();
        bus.write_word(1, XM_BANK_REG_BASE + 3, 0x1234);
        assert_eq!(bus.read_word(1, XM_BANK_REG_BASE + 3), 0x1234);
        assert_eq!(bus.mem.xm_banks[3], 0);
    }

    #[test]
    fn memory_pipeline_reads_the_pair() {
        let mut bus = bus();
        bus.mem.ram_write(0, 0o100, 0xAAAA);
        bus.mem.ram_write(0, 0o101, 0x5555);
        bus.load_mar(SystemType::AltoII3KRam, 0, 0o100, false);
        assert_eq!(bus.read_md(), 0xAAAA);
        assert_eq!(bus.read_md(), 0x5555);
    }

    #[test]
    fn store_md_follows_the_toggle() {
        let mut bus = bus();
        bus.load_mar(SystemType::AltoII3KRam, 0, 0o200, false);
        bus.store_md(SystemType::AltoII3KRam, 0x1111);
        bus.store_md(SystemType::AltoII3KRam, 0x2222);
        assert_eq!(bus.mem.ram_read(0, 0o200), 0x1111);
        assert_eq!(bus.mem.ram_read(0, 0o201), 0x2222);
    }
}
