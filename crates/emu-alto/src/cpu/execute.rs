//! One machine cycle: bus → ALU → shifter → F1 → F2 → write-back →
//! program-counter update → task switch.

use crate::alu::{self, ShiftStyle};
use crate::bus::AltoBus;
use crate::error::CpuError;
use crate::microcode::{
    BS_LOAD_R, BS_NONE, BS_READ_DISP, BS_READ_MD, BS_READ_MOUSE, BS_READ_R, BS_TASK_3, BS_TASK_4,
    F1_BLOCK, F1_CONSTANT, F1_DSK_CLRSTAT, F1_DSK_INCRECNO, F1_DSK_LOAD_KADR, F1_DSK_LOAD_KCOM,
    F1_DSK_LOAD_KDATA, F1_DSK_LOAD_KSTAT, F1_DSK_STROBE, F1_EMU_LOAD_ESRB, F1_EMU_LOAD_RMR,
    F1_EMU_RDRAM, F1_EMU_RSNF, F1_EMU_STARTF, F1_EMU_SWMODE, F1_EMU_WRTRAM, F1_ETH_EILFCT,
    F1_ETH_EPFCT, F1_ETH_EWFCT, F1_LLCY8, F1_LLSH1, F1_LOAD_MAR, F1_LRSH1, F1_NONE,
    F1_RAM_LOAD_SRB, F1_TASK, F2_ALUCY, F2_BUS, F2_BUSEQ0, F2_CONSTANT, F2_CURT_LOAD_CSR,
    F2_CURT_LOAD_XPREG, F2_DHT_EVENFIELD, F2_DHT_SETMODE, F2_DSK_INIT, F2_DSK_NFER, F2_DSK_RECNO,
    F2_DSK_RWC, F2_DSK_STROBON, F2_DSK_SWRNRDY, F2_DSK_XFRDAT, F2_DVT_EVENFIELD, F2_DWT_LOAD_DDR,
    F2_EMU_ACDEST, F2_EMU_ACSOURCE, F2_EMU_BUSODD, F2_EMU_IDISP, F2_EMU_LOAD_DNS, F2_EMU_LOAD_IR,
    F2_EMU_MAGIC, F2_ETH_EBFCT, F2_ETH_ECBFCT, F2_ETH_EEFCT, F2_ETH_EISFCT, F2_ETH_EODFCT,
    F2_ETH_EOSFCT, F2_ETH_ERBFCT, F2_NONE, F2_SHEQ0, F2_SHLT0, F2_STORE_MD, MicroInstruction,
    TASK_CURSOR, TASK_DISK_SECTOR, TASK_DISK_WORD, TASK_DISPLAY_HORIZ, TASK_DISPLAY_VERT,
    TASK_DISPLAY_WORD, TASK_EMULATOR, TASK_ETHERNET,
};
use crate::rom::MICROCODE_BANK_SIZE;

use super::{Cpu, MPC_BANK_RAM0};

/// The numerically highest pending task wins. Bit 0 is always set.
fn highest_pending_task(pending: u16) -> u8 {
    (15 - (pending | 1).leading_zeros()) as u8
}

const fn is_disk_task(task: u8) -> bool {
    matches!(task, TASK_DISK_SECTOR | TASK_DISK_WORD)
}

impl Cpu {
    /// Execute one microinstruction. A fault makes the CPU sticky: every
    /// further step returns the same error until `reset`.
    pub fn step(&mut self, bus: &mut AltoBus) -> Result<(), CpuError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let result = self.execute_cycle(bus);
        if let Err(error) = result {
            self.error = Some(error);
        }
        result
    }

    fn execute_cycle(&mut self, bus: &mut AltoBus) -> Result<(), CpuError> {
        let mc = MicroInstruction::predecode(self.sys_type, self.mpc, self.mir, self.ctask)?;
        let task = self.ctask;
        let emulator = task == TASK_EMULATOR;

        // The emulator must never block. Checked before any side effect so
        // the fault leaves the machine untouched.
        if mc.f1 == F1_BLOCK && emulator {
            return Err(CpuError::EmulatorBlocked { mpc: self.mpc });
        }

        let rsel = self.modified_rsel(&mc, emulator);

        // ---- bus ----------------------------------------------------------
        let bus_data = if mc.use_constant {
            self.constants[usize::from(mc.const_addr)]
        } else {
            let mut value = self.bus_source(bus, &mc, rsel, task)?;
            if mc.bs_use_crom {
                // Wired-AND with the constant ROM output.
                value &= self.constants[usize::from(mc.const_addr)];
            }
            value
        };

        // ---- ALU ----------------------------------------------------------
        let (alu_out, alu_carry) = alu::execute(mc.aluf, bus_data, self.t, self.skip, self.mpc)?;

        // ---- shifter ------------------------------------------------------
        self.dns = emulator && mc.f2 == F2_EMU_LOAD_DNS;
        let magic = emulator && mc.f2 == F2_EMU_MAGIC;
        let style = if self.dns {
            ShiftStyle::Nova
        } else if magic {
            ShiftStyle::Magic
        } else {
            ShiftStyle::Plain
        };
        let carry_in = if self.dns {
            dns_carry_in(self.ir, self.carry, alu_carry)
        } else {
            self.carry
        };
        let (shifter_out, shifter_carry) = alu::shift(mc.f1, self.l, self.t, carry_in, style);
        let nova_carry = match mc.f1 {
            F1_LLSH1 | F1_LRSH1 => shifter_carry,
            _ => carry_in,
        };

        // ---- F1 side effects ---------------------------------------------
        match mc.f1 {
            F1_NONE | F1_CONSTANT | F1_LLSH1 | F1_LRSH1 | F1_LLCY8 => {}
            F1_LOAD_MAR => {
                let extended = self.sys_type.is_alto_ii() && mc.f2 == F2_STORE_MD;
                bus.load_mar(self.sys_type, task, alu_out, extended);
            }
            F1_TASK => self.ntask = highest_pending_task(self.pending),
            F1_BLOCK => self.pending &= !(1 << task),
            f1 => self.task_f1(bus, &mc, f1, bus_data)?,
        }

        // ---- F2 side effects and NEXT modifiers ---------------------------
        let mut next_extra = match mc.f2 {
            F2_NONE | F2_CONSTANT => 0,
            F2_BUSEQ0 => u16::from(bus_data == 0),
            F2_SHLT0 => u16::from(shifter_out & 0x8000 != 0),
            F2_SHEQ0 => u16::from(shifter_out == 0),
            F2_BUS => bus_data & 0x3FF,
            F2_ALUCY => u16::from(self.alu_c0),
            F2_STORE_MD => {
                // On Alto II, MAR←+MD← in one instruction is the extended
                // reference, not a store.
                if !(self.sys_type.is_alto_ii() && mc.f1 == F1_LOAD_MAR) {
                    bus.store_md(self.sys_type, bus_data);
                }
                0
            }
            f2 => self.task_f2(bus, f2, bus_data)?,
        };
        if self.dns {
            self.skip = dns_skip(self.ir, shifter_out, nova_carry);
            if self.ir & 0x0008 == 0 {
                self.carry = nova_carry;
            }
        }
        if emulator && mc.f2 == F2_EMU_LOAD_IR {
            // IR← merges bus bit 0 and bits 5-7 into NEXT.
            next_extra |= ((bus_data & 0x8000) >> 12) | ((bus_data >> 8) & 7);
        }

        // ---- write-back ---------------------------------------------------
        let dns_no_load = self.dns && self.ir & 0x0008 != 0;
        if mc.bs == BS_LOAD_R && !mc.use_constant && !dns_no_load {
            self.r[rsel] = shifter_out;
        }
        if mc.bs == BS_TASK_4
            && !mc.use_constant
            && mc.ram_task
            && !is_disk_task(task)
            && task != TASK_ETHERNET
        {
            self.s[usize::from(self.s_bank[usize::from(task)])][rsel] = self.m;
        }
        if mc.load_l {
            self.l = alu_out;
            self.alu_c0 = alu_carry;
            if emulator {
                self.m = alu_out;
            }
        }
        if mc.load_t {
            self.t = if mc.load_t_from_alu { alu_out } else { bus_data };
        }
        if self.wrtram_pending {
            self.wrtram_pending = false;
            let index =
                usize::from(MPC_BANK_RAM0) + usize::from(self.wrtram_addr) % MICROCODE_BANK_SIZE;
            self.microcode[index] = (u32::from(self.l) << 16) | u32::from(self.m);
        }

        // ---- program counters and task switch -----------------------------
        self.update_program_counters(next_extra);
        let previous = self.ctask;
        self.ctask = self.ntask;
        self.task_switch = self.ctask != previous;
        self.cycle += 1;
        bus.mem.tick();
        Ok(())
    }

    /// ACSOURCE/ACDEST/DNS← replace the low two RSEL bits with the
    /// complemented accumulator field of IR.
    fn modified_rsel(&self, mc: &MicroInstruction, emulator: bool) -> usize {
        let rsel = usize::from(mc.rsel);
        if !emulator {
            return rsel;
        }
        match mc.f2 {
            F2_EMU_ACSOURCE => (rsel & 0x1C) | usize::from(!(self.ir >> 13) & 3),
            F2_EMU_ACDEST | F2_EMU_LOAD_DNS => (rsel & 0x1C) | usize::from(!(self.ir >> 11) & 3),
            _ => rsel,
        }
    }

    fn bus_source(
        &mut self,
        bus: &mut AltoBus,
        mc: &MicroInstruction,
        rsel: usize,
        task: u8,
    ) -> Result<u16, CpuError> {
        let mut value = match mc.bs {
            BS_READ_R => self.r[rsel],
            // The write happens at write-back, from the shifter.
            BS_LOAD_R => 0,
            BS_NONE => 0xFFFF,
            BS_TASK_3 => {
                if is_disk_task(task) {
                    bus.disk.read_kstat()
                } else if mc.ram_task {
                    self.s[usize::from(self.s_bank[usize::from(task)])][rsel]
                } else {
                    // No source gates the bus: it floats to all ones.
                    0xFFFF
                }
            }
            BS_TASK_4 => {
                if is_disk_task(task) {
                    bus.disk.read_kdata()
                } else if task == TASK_ETHERNET {
                    bus.ethernet.input_data()
                } else {
                    // S-location loads drive nothing onto the bus.
                    0xFFFF
                }
            }
            BS_READ_MD => bus.read_md(),
            BS_READ_MOUSE => bus.mouse.read(),
            BS_READ_DISP => {
                let mut disp = self.ir & 0x00FF;
                // Sign-extend for the relative addressing modes.
                if (self.ir >> 8) & 3 != 0 && disp & 0x80 != 0 {
                    disp |= 0xFF00;
                }
                disp
            }
            _ => unreachable!("BS is a 3-bit field"),
        };

        // Early F1s that gate extra sources onto the bus (wired-AND).
        if task == TASK_EMULATOR && mc.f1 == F1_EMU_RSNF {
            value &= 0xFF00 | u16::from(bus.ethernet.host_address);
        }
        if task == TASK_ETHERNET && mc.f1 == F1_ETH_EILFCT {
            value &= bus.ethernet.look();
        }
        if self.rdram_pending {
            self.rdram_pending = false;
            value &= self.rdram_half();
        }
        Ok(value)
    }

    fn rdram_half(&self) -> u16 {
        let index =
            usize::from(MPC_BANK_RAM0) + usize::from(self.rdram_addr) % MICROCODE_BANK_SIZE;
        let word = self.microcode[index];
        if self.rdram_addr & 0x0800 != 0 {
            word as u16
        } else {
            (word >> 16) as u16
        }
    }

    /// Task-specific F1 dispatch (codes 8-15 minus the common ones).
    fn task_f1(
        &mut self,
        bus: &mut AltoBus,
        mc: &MicroInstruction,
        f1: u8,
        bus_data: u16,
    ) -> Result<(), CpuError> {
        let task = self.ctask;
        match task {
            TASK_EMULATOR => match f1 {
                F1_EMU_SWMODE => {
                    // Toggle between ROM0 and the first RAM bank.
                    let target = if self.mpc & 0x0C00 == 0 { MPC_BANK_RAM0 } else { 0 };
                    self.swmode_pending = Some(target);
                }
                F1_EMU_WRTRAM => {
                    self.wrtram_pending = true;
                    self.wrtram_addr = bus_data;
                }
                F1_EMU_RDRAM => {
                    self.rdram_pending = true;
                    self.rdram_addr = bus_data;
                }
                F1_EMU_LOAD_RMR => self.rmr = bus_data,
                F1_EMU_LOAD_ESRB => {
                    self.s_bank[usize::from(task)] = self.srb_value(bus_data);
                }
                F1_EMU_RSNF => {} // handled on the bus
                F1_EMU_STARTF => {
                    if bus_data & 0x8000 != 0 {
                        self.soft_boot();
                    } else if bus_data & 3 != 0 {
                        self.pending |= bus.ethernet.startf(bus_data);
                    }
                }
                _ => return Err(CpuError::BadF1 { task, f1, mpc: self.mpc }),
            },
            TASK_DISK_SECTOR | TASK_DISK_WORD => match f1 {
                F1_DSK_STROBE => bus.disk.strobe(),
                F1_DSK_LOAD_KSTAT => bus.disk.load_kstat(bus_data),
                F1_DSK_INCRECNO => bus.disk.inc_recno(),
                F1_DSK_CLRSTAT => bus.disk.clrstat(),
                F1_DSK_LOAD_KCOM => bus.disk.load_kcom(bus_data),
                F1_DSK_LOAD_KADR => bus.disk.load_kadr(bus_data),
                F1_DSK_LOAD_KDATA => bus.disk.load_kdata(bus_data),
                _ => return Err(CpuError::BadF1 { task, f1, mpc: self.mpc }),
            },
            TASK_ETHERNET => match f1 {
                F1_ETH_EILFCT => {} // handled on the bus
                F1_ETH_EPFCT => {
                    let _ = bus.ethernet.post();
                }
                F1_ETH_EWFCT => bus.ethernet.arm_countdown_wakeup(),
                _ => return Err(CpuError::BadF1 { task, f1, mpc: self.mpc }),
            },
            _ if mc.ram_task => match f1 {
                F1_EMU_WRTRAM => {
                    self.wrtram_pending = true;
                    self.wrtram_addr = bus_data;
                }
                F1_EMU_RDRAM => {
                    self.rdram_pending = true;
                    self.rdram_addr = bus_data;
                }
                F1_RAM_LOAD_SRB => {
                    self.s_bank[usize::from(task)] = self.srb_value(bus_data);
                }
                _ => return Err(CpuError::BadF1 { task, f1, mpc: self.mpc }),
            },
            _ => return Err(CpuError::BadF1 { task, f1, mpc: self.mpc }),
        }
        Ok(())
    }

    /// S-register bank from the bus; pinned to 0 without the 3K-RAM option.
    fn srb_value(&self, bus_data: u16) -> u8 {
        if self.sys_type == crate::config::SystemType::AltoII3KRam {
            ((bus_data >> 1) & 7) as u8
        } else {
            0
        }
    }

    /// Task-specific F2 dispatch; returns the NEXT modifier.
    fn task_f2(&mut self, bus: &mut AltoBus, f2: u8, bus_data: u16) -> Result<u16, CpuError> {
        let task = self.ctask;
        let value = match task {
            TASK_EMULATOR => match f2 {
                F2_EMU_BUSODD => bus_data & 1,
                F2_EMU_MAGIC | F2_EMU_ACDEST | F2_EMU_LOAD_DNS => 0,
                F2_EMU_LOAD_IR => {
                    self.ir = bus_data;
                    self.skip = false;
                    0 // the NEXT merge happens after DNS handling
                }
                F2_EMU_IDISP => idisp_modifier(self.ir),
                F2_EMU_ACSOURCE => {
                    if self.ir & 0x8000 == 0 {
                        3 - ((self.ir >> 6) & 3)
                    } else {
                        0
                    }
                }
                _ => return Err(CpuError::BadF2 { task, f2, mpc: self.mpc }),
            },
            TASK_DISK_SECTOR | TASK_DISK_WORD => match f2 {
                F2_DSK_INIT => {
                    if bus.disk.take_wdinit() {
                        0x1F
                    } else {
                        0
                    }
                }
                F2_DSK_RWC => bus.disk.rwc_branch(),
                F2_DSK_RECNO => bus.disk.recno_branch(),
                F2_DSK_XFRDAT => u16::from(bus.disk.xfer_branch()),
                F2_DSK_SWRNRDY => u16::from(!bus.disk.ready()),
                F2_DSK_NFER => u16::from(!bus.disk.fatal_error()),
                F2_DSK_STROBON => u16::from(bus.disk.strobe_active()),
                _ => return Err(CpuError::BadF2 { task, f2, mpc: self.mpc }),
            },
            TASK_ETHERNET => match f2 {
                F2_ETH_EODFCT => {
                    bus.ethernet.output_data(bus_data);
                    0
                }
                F2_ETH_EOSFCT => {
                    bus.ethernet.output_start();
                    0
                }
                F2_ETH_ERBFCT => bus.ethernet.reset_branch(),
                F2_ETH_EEFCT => {
                    bus.ethernet.end_transmission();
                    0
                }
                F2_ETH_EBFCT => bus.ethernet.branch(),
                F2_ETH_ECBFCT => bus.ethernet.countdown_branch(),
                F2_ETH_EISFCT => {
                    bus.ethernet.input_start();
                    0
                }
                _ => return Err(CpuError::BadF2 { task, f2, mpc: self.mpc }),
            },
            TASK_DISPLAY_WORD => match f2 {
                F2_DWT_LOAD_DDR => {
                    bus.display.load_ddr(bus_data);
                    0
                }
                _ => return Err(CpuError::BadF2 { task, f2, mpc: self.mpc }),
            },
            TASK_CURSOR => match f2 {
                F2_CURT_LOAD_XPREG => {
                    bus.display.load_xpreg(bus_data);
                    0
                }
                F2_CURT_LOAD_CSR => {
                    bus.display.load_csr(bus_data);
                    0
                }
                _ => return Err(CpuError::BadF2 { task, f2, mpc: self.mpc }),
            },
            TASK_DISPLAY_HORIZ => match f2 {
                F2_DHT_EVENFIELD => u16::from(bus.display.even_field()),
                F2_DHT_SETMODE => bus.display.set_mode(bus_data),
                _ => return Err(CpuError::BadF2 { task, f2, mpc: self.mpc }),
            },
            TASK_DISPLAY_VERT => match f2 {
                F2_DVT_EVENFIELD => u16::from(bus.display.even_field()),
                _ => return Err(CpuError::BadF2 { task, f2, mpc: self.mpc }),
            },
            _ => return Err(CpuError::BadF2 { task, f2, mpc: self.mpc }),
        };
        Ok(value)
    }

    /// End-of-cycle bookkeeping. `mpc` takes the task's saved address, the
    /// instruction there goes into MIR, and the saved address becomes that
    /// instruction's NEXT merged with this cycle's modifiers. The fetch uses
    /// the freshly copied `mpc` on purpose; splitting this function would
    /// silently break the NEXT computation.
    fn update_program_counters(&mut self, next_extra: u16) {
        let mpc = self.task_mpc[usize::from(self.ctask)];
        self.mpc = mpc;
        let mcode = self.fetch(mpc);
        let mut bank = mpc & 0x0C00;
        if self.ctask == TASK_EMULATOR {
            if let Some(target) = self.swmode_pending.take() {
                bank = target;
            }
        }
        let next = (mcode & 0x3FF) as u16;
        self.task_mpc[usize::from(self.ctask)] = bank | next | next_extra;
        self.mir = mcode;
    }
}

/// DNS carry selection: IR bits 4-5 pick the base, and the arithmetic
/// functions complement it when the ALU carried out.
fn dns_carry_in(ir: u16, carry: bool, alu_carry: bool) -> bool {
    let mut c = match (ir >> 4) & 3 {
        0 => carry,
        1 => false,
        2 => true,
        _ => !carry,
    };
    // NEG, MOV+1.. : functions 1,3,4,5,6 are arithmetic.
    if matches!((ir >> 8) & 7, 1 | 3 | 4 | 5 | 6) && alu_carry {
        c = !c;
    }
    c
}

/// NOVA skip field, evaluated on the shifter output and the final carry.
fn dns_skip(ir: u16, result: u16, carry: bool) -> bool {
    match ir & 7 {
        0 => false,
        1 => true,
        2 => !carry,
        3 => carry,
        4 => result == 0,
        5 => result != 0,
        6 => !carry || result == 0,
        _ => carry && result != 0,
    }
}

/// IDISP: the 16-way dispatch PROM for NOVA instruction decode.
fn idisp_modifier(ir: u16) -> u16 {
    if ir & 0x8000 != 0 {
        3 - ((ir >> 6) & 3)
    } else {
        match (ir >> 13) & 3 {
            0 => (ir >> 11) & 3, // JMP, JSR, ISZ, DSZ
            1 => 4,              // LDA
            2 => 5,              // STA
            _ => match (ir >> 8) & 0xF {
                0x0 => 1,
                0x1 => 0,
                0x6 => 0xE, // CONVERT
                0xE => 6,
                other => other,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_pending_wins() {
        assert_eq!(highest_pending_task(0b0000_0000_0000_0001), 0);
        assert_eq!(highest_pending_task(0b0100_0000_0001_0001), 14);
        assert_eq!(highest_pending_task(0b0001_0010_0000_0001), 12);
    }

    #[test]
    fn idisp_rows() {
        // Arithmetic group: 3 - SH field.
        assert_eq!(idisp_modifier(0x8000), 3);
        assert_eq!(idisp_modifier(0x8000 | 0x00C0), 0);
        // JMP group dispatches on IR[3-4].
        assert_eq!(idisp_modifier(0x0800), 1);
        // LDA and STA rows.
        assert_eq!(idisp_modifier(0x2000), 4);
        assert_eq!(idisp_modifier(0x4000), 5);
        // CONVERT swap rows.
        assert_eq!(idisp_modifier(0x6600), 0xE);
        assert_eq!(idisp_modifier(0x6E00), 6);
    }

    #[test]
    fn dns_carry_control() {
        // IR bits 4-5: 01 forces zero, 10 forces one, 11 complements.
        assert!(!dns_carry_in(0x0010, true, false));
        assert!(dns_carry_in(0x0020, false, false));
        assert!(!dns_carry_in(0x0030, true, false));
        // Arithmetic function with carry-out complements the base.
        assert!(dns_carry_in(0x0610, false, true));
    }
}
