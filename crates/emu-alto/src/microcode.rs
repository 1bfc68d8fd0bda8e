//! Microinstruction fields, function codes and the predecoder.
//!
//! A microinstruction packs, from the top bit down: RSEL(5), ALUF(4),
//! BS(3), F1(4), F2(4), load-T(1), load-L(1), NEXT(10). The predecoder
//! turns a raw word into the structured form the whole datapath consumes,
//! deriving the constant-ROM routing, the constant address and whether the
//! running task has RAM privileges.

use crate::config::SystemType;
use crate::error::CpuError;

pub const TASK_COUNT: usize = 16;

pub const TASK_EMULATOR: u8 = 0;
pub const TASK_DISK_SECTOR: u8 = 4;
pub const TASK_ETHERNET: u8 = 7;
pub const TASK_MEMORY_REFRESH: u8 = 8;
pub const TASK_DISPLAY_WORD: u8 = 9;
pub const TASK_CURSOR: u8 = 10;
pub const TASK_DISPLAY_HORIZ: u8 = 11;
pub const TASK_DISPLAY_VERT: u8 = 12;
pub const TASK_PARITY: u8 = 13;
pub const TASK_DISK_WORD: u8 = 14;

// Bus sources. 3 and 4 belong to the running task.
pub const BS_READ_R: u8 = 0;
pub const BS_LOAD_R: u8 = 1;
pub const BS_NONE: u8 = 2;
pub const BS_TASK_3: u8 = 3;
pub const BS_TASK_4: u8 = 4;
pub const BS_READ_MD: u8 = 5;
pub const BS_READ_MOUSE: u8 = 6;
pub const BS_READ_DISP: u8 = 7;

pub const BS_RAM_READ_S_LOCATION: u8 = BS_TASK_3;
pub const BS_RAM_LOAD_S_LOCATION: u8 = BS_TASK_4;
pub const BS_DSK_READ_KSTAT: u8 = BS_TASK_3;
pub const BS_DSK_READ_KDATA: u8 = BS_TASK_4;
pub const BS_ETH_EIDFCT: u8 = BS_TASK_4;

// F1 functions. 0-7 are common to every task.
pub const F1_NONE: u8 = 0;
pub const F1_LOAD_MAR: u8 = 1;
pub const F1_TASK: u8 = 2;
pub const F1_BLOCK: u8 = 3;
pub const F1_LLSH1: u8 = 4;
pub const F1_LRSH1: u8 = 5;
pub const F1_LLCY8: u8 = 6;
pub const F1_CONSTANT: u8 = 7;

pub const F1_EMU_SWMODE: u8 = 8;
pub const F1_EMU_WRTRAM: u8 = 9;
pub const F1_EMU_RDRAM: u8 = 10;
pub const F1_EMU_LOAD_RMR: u8 = 11;
pub const F1_EMU_LOAD_ESRB: u8 = 13;
pub const F1_EMU_RSNF: u8 = 14;
pub const F1_EMU_STARTF: u8 = 15;

/// Non-emulator RAM tasks load their S bank here; the emulator uses ESRB.
pub const F1_RAM_LOAD_SRB: u8 = 11;

pub const F1_DSK_STROBE: u8 = 9;
pub const F1_DSK_LOAD_KSTAT: u8 = 10;
pub const F1_DSK_INCRECNO: u8 = 11;
pub const F1_DSK_CLRSTAT: u8 = 12;
pub const F1_DSK_LOAD_KCOM: u8 = 13;
pub const F1_DSK_LOAD_KADR: u8 = 14;
pub const F1_DSK_LOAD_KDATA: u8 = 15;

pub const F1_ETH_EILFCT: u8 = 11;
pub const F1_ETH_EPFCT: u8 = 12;
pub const F1_ETH_EWFCT: u8 = 13;

// F2 functions. 0-7 are common to every task.
pub const F2_NONE: u8 = 0;
pub const F2_BUSEQ0: u8 = 1;
pub const F2_SHLT0: u8 = 2;
pub const F2_SHEQ0: u8 = 3;
pub const F2_BUS: u8 = 4;
pub const F2_ALUCY: u8 = 5;
pub const F2_STORE_MD: u8 = 6;
pub const F2_CONSTANT: u8 = 7;

pub const F2_EMU_BUSODD: u8 = 8;
pub const F2_EMU_MAGIC: u8 = 9;
pub const F2_EMU_LOAD_DNS: u8 = 10;
pub const F2_EMU_ACDEST: u8 = 11;
pub const F2_EMU_LOAD_IR: u8 = 12;
pub const F2_EMU_IDISP: u8 = 13;
pub const F2_EMU_ACSOURCE: u8 = 14;

pub const F2_DSK_INIT: u8 = 8;
pub const F2_DSK_RWC: u8 = 9;
pub const F2_DSK_RECNO: u8 = 10;
pub const F2_DSK_XFRDAT: u8 = 11;
pub const F2_DSK_SWRNRDY: u8 = 12;
pub const F2_DSK_NFER: u8 = 13;
pub const F2_DSK_STROBON: u8 = 14;

pub const F2_DWT_LOAD_DDR: u8 = 8;
pub const F2_CURT_LOAD_XPREG: u8 = 8;
pub const F2_CURT_LOAD_CSR: u8 = 9;
pub const F2_DHT_EVENFIELD: u8 = 8;
pub const F2_DHT_SETMODE: u8 = 9;
pub const F2_DVT_EVENFIELD: u8 = 8;

pub const F2_ETH_EODFCT: u8 = 8;
pub const F2_ETH_EOSFCT: u8 = 9;
pub const F2_ETH_ERBFCT: u8 = 10;
pub const F2_ETH_EEFCT: u8 = 11;
pub const F2_ETH_EBFCT: u8 = 12;
pub const F2_ETH_ECBFCT: u8 = 13;
pub const F2_ETH_EISFCT: u8 = 14;

// ALU functions.
pub const ALU_BUS: u8 = 0;
pub const ALU_T: u8 = 1;
pub const ALU_BUS_OR_T: u8 = 2;
pub const ALU_BUS_AND_T: u8 = 3;
pub const ALU_BUS_XOR_T: u8 = 4;
pub const ALU_BUS_PLUS_1: u8 = 5;
pub const ALU_BUS_MINUS_1: u8 = 6;
pub const ALU_BUS_PLUS_T: u8 = 7;
pub const ALU_BUS_MINUS_T: u8 = 8;
pub const ALU_BUS_MINUS_T_MINUS_1: u8 = 9;
pub const ALU_BUS_PLUS_T_PLUS_1: u8 = 10;
pub const ALU_BUS_PLUS_SKIP: u8 = 11;
pub const ALU_BUS_AND_T_WB: u8 = 12;
pub const ALU_BUS_AND_NOT_T: u8 = 13;

/// Predecoded microinstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicroInstruction {
    pub rsel: u8,
    pub aluf: u8,
    pub bs: u8,
    pub f1: u8,
    pub f2: u8,
    pub load_t: bool,
    pub load_l: bool,
    pub next: u16,
    /// F1 or F2 routes the bus to the constant ROM outright.
    pub use_constant: bool,
    /// BS >= 4 also drives the constant ROM; it wire-ANDs with the source.
    pub bs_use_crom: bool,
    /// Constant ROM address: RSEL(5) . BS(3).
    pub const_addr: u8,
    /// The running task may use the RAM-related functions.
    pub ram_task: bool,
    /// T loads from the ALU output instead of the bus for this ALUF.
    pub load_t_from_alu: bool,
}

impl MicroInstruction {
    /// Predecode one instruction. Pure; the only failure is a task index
    /// the machine cannot have, which halts the CPU.
    pub fn predecode(
        sys_type: SystemType,
        mpc: u16,
        mir: u32,
        ctask: u8,
    ) -> Result<Self, CpuError> {
        if usize::from(ctask) >= TASK_COUNT {
            return Err(CpuError::BadTask { task: ctask, mpc });
        }

        let rsel = ((mir >> 27) & 0x1F) as u8;
        let aluf = ((mir >> 23) & 0x0F) as u8;
        let bs = ((mir >> 20) & 0x07) as u8;
        let f1 = ((mir >> 16) & 0x0F) as u8;
        let f2 = ((mir >> 12) & 0x0F) as u8;

        Ok(Self {
            rsel,
            aluf,
            bs,
            f1,
            f2,
            load_t: mir & (1 << 11) != 0,
            load_l: mir & (1 << 10) != 0,
            next: (mir & 0x3FF) as u16,
            use_constant: f1 == F1_CONSTANT || f2 == F2_CONSTANT,
            bs_use_crom: bs >= BS_TASK_4,
            const_addr: (rsel << 3) | bs,
            ram_task: sys_type.is_ram_task(ctask),
            load_t_from_alu: matches!(
                aluf,
                ALU_BUS
                    | ALU_BUS_OR_T
                    | ALU_BUS_PLUS_1
                    | ALU_BUS_MINUS_1
                    | ALU_BUS_PLUS_T_PLUS_1
                    | ALU_BUS_PLUS_SKIP
                    | ALU_BUS_AND_T_WB
            ),
        })
    }
}

/// Pack fields into a microinstruction word. The assembler and the tests
/// build code with this.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub const fn assemble(
    rsel: u8,
    aluf: u8,
    bs: u8,
    f1: u8,
    f2: u8,
    load_t: bool,
    load_l: bool,
    next: u16,
) -> u32 {
    ((rsel as u32 & 0x1F) << 27)
        | ((aluf as u32 & 0x0F) << 23)
        | ((bs as u32 & 0x07) << 20)
        | ((f1 as u32 & 0x0F) << 16)
        | ((f2 as u32 & 0x0F) << 12)
        | ((load_t as u32) << 11)
        | ((load_l as u32) << 10)
        | (next as u32 & 0x3FF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_extraction_round_trips() {
        let mir = assemble(0x15, 7, 5, 1, 6, true, false, 0x2A5);
        let mc = MicroInstruction::predecode(SystemType::AltoII3KRam, 0, mir, 0).expect("decode");
        assert_eq!(mc.rsel, 0x15);
        assert_eq!(mc.aluf, ALU_BUS_PLUS_T);
        assert_eq!(mc.bs, BS_READ_MD);
        assert_eq!(mc.f1, F1_LOAD_MAR);
        assert_eq!(mc.f2, F2_STORE_MD);
        assert!(mc.load_t);
        assert!(!mc.load_l);
        assert_eq!(mc.next, 0x2A5);
    }

    #[test]
    fn predecode_is_total_over_tasks_and_fields() {
        // Sweep the field boundaries with every task; no combination may
        // fail or leave a field out of range.
        for task in 0..16u8 {
            for mir in [0u32, 0xFFFF_FFFF, 0x8000_0400, 0x0010_0000, 0x5555_5555] {
                let mc = MicroInstruction::predecode(SystemType::AltoII3KRam, 0, mir, task)
                    .expect("total");
                assert!(mc.rsel < 32 && mc.bs < 8 && mc.f1 < 16 && mc.f2 < 16);
                assert!(mc.next < 1024);
            }
        }
        assert!(MicroInstruction::predecode(SystemType::AltoII3KRam, 0, 0, 16).is_err());
    }

    #[test]
    fn constant_routing() {
        // F1=CONSTANT reroutes the bus to the constant ROM.
        let mir = assemble(3, 0, BS_NONE, F1_CONSTANT, 0, false, false, 0);
        let mc = MicroInstruction::predecode(SystemType::AltoII3KRam, 0, mir, 0).expect("decode");
        assert!(mc.use_constant);
        assert_eq!(mc.const_addr, (3 << 3) | BS_NONE);

        // BS=4..7 drive the constant ROM alongside the source.
        let mir = assemble(0, 0, BS_READ_MOUSE, F1_NONE, 0, false, false, 0);
        let mc = MicroInstruction::predecode(SystemType::AltoII3KRam, 0, mir, 0).expect("decode");
        assert!(!mc.use_constant);
        assert!(mc.bs_use_crom);
    }

    #[test]
    fn ram_task_depends_on_system() {
        let mc = |sys, task| MicroInstruction::predecode(sys, 0, 0, task).expect("decode");
        assert!(mc(SystemType::AltoII3KRam, 5).ram_task);
        assert!(!mc(SystemType::AltoII2KRom, 5).ram_task);
        assert!(mc(SystemType::AltoII2KRom, TASK_EMULATOR).ram_task);
        assert!(!mc(SystemType::AltoI, 9).ram_task);
    }
}
