//! The micro-engine: register files, per-task program counters and the
//! sticky fault state. The cycle itself lives in `execute`.

mod execute;

use crate::config::SystemType;
use crate::error::CpuError;
use crate::microcode::{TASK_COUNT, TASK_EMULATOR};
use crate::rom::{CONSTANT_SIZE, MICROCODE_BANK_SIZE, MICROCODE_BANKS};

/// Bank bits of the first microcode RAM bank within MPC.
pub const MPC_BANK_RAM0: u16 = 2 << 10;

pub struct Cpu {
    pub sys_type: SystemType,
    /// R file: 32 registers shared by all tasks.
    pub r: [u16; 32],
    /// S file: 8 banks of 32.
    pub s: [[u16; 32]; 8],
    /// Per-task S bank selection (3K-RAM systems only).
    pub s_bank: [u8; TASK_COUNT],
    /// Per-task resume address: bank bits | 10-bit address.
    pub task_mpc: [u16; TASK_COUNT],
    pub ctask: u8,
    pub ntask: u8,
    /// Wakeup bits, one per task. Bit 0 (emulator) never clears.
    pub pending: u16,
    /// Address of the instruction in MIR.
    pub mpc: u16,
    pub mir: u32,
    pub t: u16,
    pub l: u16,
    pub m: u16,
    pub ir: u16,
    pub alu_c0: bool,
    pub skip: bool,
    /// NOVA carry, maintained by DNS.
    pub carry: bool,
    /// A DNS instruction is in flight this cycle.
    pub dns: bool,
    /// The last cycle ended in a task switch.
    pub task_switch: bool,
    /// Reset mode register: a set bit boots that task from ROM.
    pub rmr: u16,
    pub cycle: u64,
    pub error: Option<CpuError>,
    /// Microcode store: 4 banks of 1024 words. Banks 0-1 are ROM,
    /// 2-3 are RAM (writable through WRTRAM).
    pub microcode: Vec<u32>,
    pub constants: Vec<u16>,
    pub(crate) swmode_pending: Option<u16>,
    pub(crate) rdram_pending: bool,
    pub(crate) rdram_addr: u16,
    pub(crate) wrtram_pending: bool,
    pub(crate) wrtram_addr: u16,
}

impl Cpu {
    #[must_use]
    pub fn new(sys_type: SystemType, constants: Vec<u16>) -> Self {
        debug_assert_eq!(constants.len(), CONSTANT_SIZE);
        let mut cpu = Self {
            sys_type,
            r: [0; 32],
            s: [[0; 32]; 8],
            s_bank: [0; TASK_COUNT],
            task_mpc: [0; TASK_COUNT],
            ctask: 0,
            ntask: 0,
            pending: 1 << TASK_EMULATOR,
            mpc: 0,
            mir: 0,
            t: 0,
            l: 0,
            m: 0,
            ir: 0,
            alu_c0: false,
            skip: false,
            carry: false,
            dns: false,
            task_switch: false,
            rmr: 0xFFFF,
            cycle: 0,
            error: None,
            microcode: vec![0; MICROCODE_BANKS * MICROCODE_BANK_SIZE],
            constants,
            swmode_pending: None,
            rdram_pending: false,
            rdram_addr: 0,
            wrtram_pending: false,
            wrtram_addr: 0,
        };
        cpu.reset();
        cpu
    }

    /// Load one microcode bank (0 or 1, the ROM banks).
    pub fn load_microcode_bank(&mut self, bank: usize, words: &[u32]) {
        debug_assert!(bank < 2);
        debug_assert_eq!(words.len(), MICROCODE_BANK_SIZE);
        let base = bank * MICROCODE_BANK_SIZE;
        self.microcode[base..base + MICROCODE_BANK_SIZE].copy_from_slice(words);
    }

    /// Return to the power-on state. This is the only way to clear the
    /// sticky error.
    pub fn reset(&mut self) {
        self.r = [0; 32];
        self.s = [[0; 32]; 8];
        self.s_bank = [0; TASK_COUNT];
        for (task, mpc) in self.task_mpc.iter_mut().enumerate() {
            *mpc = task as u16;
        }
        self.ctask = 0;
        self.ntask = 0;
        self.pending = 1 << TASK_EMULATOR;
        self.mpc = 0;
        self.mir = 0;
        self.t = 0;
        self.l = 0;
        self.m = 0;
        self.ir = 0;
        self.alu_c0 = false;
        self.skip = false;
        self.carry = false;
        self.dns = false;
        self.task_switch = false;
        self.rmr = 0xFFFF;
        self.cycle = 0;
        self.error = None;
        self.swmode_pending = None;
        self.rdram_pending = false;
        self.rdram_addr = 0;
        self.wrtram_pending = false;
        self.wrtram_addr = 0;
    }

    /// STARTF boot: restart every task at its number, in ROM or RAM as the
    /// reset mode register directs.
    pub(crate) fn soft_boot(&mut self) {
        for (task, mpc) in self.task_mpc.iter_mut().enumerate() {
            let bank = if self.rmr & (1 << task) != 0 {
                0
            } else {
                MPC_BANK_RAM0
            };
            *mpc = bank | task as u16;
        }
        self.pending = 1 << TASK_EMULATOR;
    }

    /// The microcode word addressed by an MPC value.
    #[must_use]
    pub fn fetch(&self, mpc: u16) -> u32 {
        self.microcode[usize::from(mpc) & (MICROCODE_BANKS * MICROCODE_BANK_SIZE - 1)]
    }
}
