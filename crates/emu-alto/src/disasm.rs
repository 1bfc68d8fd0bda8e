//! Microinstruction disassembly: one text line per word, with the
//! task-specific function names resolved for the task that would run it.

use crate::config::SystemType;
use crate::microcode::{
    self, MicroInstruction, TASK_CURSOR, TASK_DISK_SECTOR, TASK_DISK_WORD, TASK_DISPLAY_HORIZ,
    TASK_DISPLAY_VERT, TASK_DISPLAY_WORD, TASK_EMULATOR, TASK_ETHERNET,
};

const ALU_NAMES: [&str; 16] = [
    "BUS",
    "T",
    "BUS OR T",
    "BUS AND T",
    "BUS XOR T",
    "BUS+1",
    "BUS-1",
    "BUS+T",
    "BUS-T",
    "BUS-T-1",
    "BUS+T+1",
    "BUS+SKIP",
    "BUS.T",
    "BUS AND NOT T",
    "?14",
    "?15",
];

fn bs_name(bs: u8, task: u8) -> &'static str {
    match (bs, task) {
        (microcode::BS_READ_R, _) => "<-R",
        (microcode::BS_LOAD_R, _) => "R<-",
        (microcode::BS_NONE, _) => "-1",
        (microcode::BS_TASK_3, TASK_DISK_SECTOR | TASK_DISK_WORD) => "<-KSTAT",
        (microcode::BS_TASK_3, _) => "<-SLOC",
        (microcode::BS_TASK_4, TASK_DISK_SECTOR | TASK_DISK_WORD) => "<-KDATA",
        (microcode::BS_TASK_4, TASK_ETHERNET) => "<-EIDFCT",
        (microcode::BS_TASK_4, _) => "SLOC<-",
        (microcode::BS_READ_MD, _) => "<-MD",
        (microcode::BS_READ_MOUSE, _) => "<-MOUSE",
        _ => "<-DISP",
    }
}

fn f1_name(f1: u8, task: u8) -> &'static str {
    match f1 {
        microcode::F1_NONE => "",
        microcode::F1_LOAD_MAR => "MAR<-",
        microcode::F1_TASK => "TASK",
        microcode::F1_BLOCK => "BLOCK",
        microcode::F1_LLSH1 => "L LSH 1",
        microcode::F1_LRSH1 => "L RSH 1",
        microcode::F1_LLCY8 => "L LCY 8",
        microcode::F1_CONSTANT => "CONST",
        _ => match task {
            TASK_EMULATOR => match f1 {
                microcode::F1_EMU_SWMODE => "SWMODE",
                microcode::F1_EMU_WRTRAM => "WRTRAM",
                microcode::F1_EMU_RDRAM => "RDRAM",
                microcode::F1_EMU_LOAD_RMR => "RMR<-",
                microcode::F1_EMU_LOAD_ESRB => "ESRB<-",
                microcode::F1_EMU_RSNF => "RSNF",
                _ => "STARTF",
            },
            TASK_DISK_SECTOR | TASK_DISK_WORD => match f1 {
                microcode::F1_DSK_STROBE => "STROBE",
                microcode::F1_DSK_LOAD_KSTAT => "KSTAT<-",
                microcode::F1_DSK_INCRECNO => "INCRECNO",
                microcode::F1_DSK_CLRSTAT => "CLRSTAT",
                microcode::F1_DSK_LOAD_KCOM => "KCOM<-",
                microcode::F1_DSK_LOAD_KADR => "KADR<-",
                _ => "KDATA<-",
            },
            TASK_ETHERNET => match f1 {
                microcode::F1_ETH_EILFCT => "EILFCT",
                microcode::F1_ETH_EPFCT => "EPFCT",
                _ => "EWFCT",
            },
            _ => "F1?",
        },
    }
}

fn f2_name(f2: u8, task: u8) -> &'static str {
    match f2 {
        microcode::F2_NONE => "",
        microcode::F2_BUSEQ0 => "BUS=0",
        microcode::F2_SHLT0 => "SH<0",
        microcode::F2_SHEQ0 => "SH=0",
        microcode::F2_BUS => "BUS",
        microcode::F2_ALUCY => "ALUCY",
        microcode::F2_STORE_MD => "MD<-",
        microcode::F2_CONSTANT => "CONST",
        _ => match task {
            TASK_EMULATOR => match f2 {
                microcode::F2_EMU_BUSODD => "BUSODD",
                microcode::F2_EMU_MAGIC => "MAGIC",
                microcode::F2_EMU_LOAD_DNS => "DNS<-",
                microcode::F2_EMU_ACDEST => "ACDEST",
                microcode::F2_EMU_LOAD_IR => "IR<-",
                microcode::F2_EMU_IDISP => "IDISP",
                _ => "ACSOURCE",
            },
            TASK_DISK_SECTOR | TASK_DISK_WORD => match f2 {
                microcode::F2_DSK_INIT => "INIT",
                microcode::F2_DSK_RWC => "RWC",
                microcode::F2_DSK_RECNO => "RECNO",
                microcode::F2_DSK_XFRDAT => "XFRDAT",
                microcode::F2_DSK_SWRNRDY => "SWRNRDY",
                microcode::F2_DSK_NFER => "NFER",
                _ => "STROBON",
            },
            TASK_ETHERNET => match f2 {
                microcode::F2_ETH_EODFCT => "EODFCT",
                microcode::F2_ETH_EOSFCT => "EOSFCT",
                microcode::F2_ETH_ERBFCT => "ERBFCT",
                microcode::F2_ETH_EEFCT => "EEFCT",
                microcode::F2_ETH_EBFCT => "EBFCT",
                microcode::F2_ETH_ECBFCT => "ECBFCT",
                _ => "EISFCT",
            },
            TASK_DISPLAY_WORD => "DDR<-",
            TASK_CURSOR => {
                if f2 == microcode::F2_CURT_LOAD_XPREG {
                    "XPREG<-"
                } else {
                    "CSR<-"
                }
            }
            TASK_DISPLAY_HORIZ => {
                if f2 == microcode::F2_DHT_SETMODE {
                    "SETMODE"
                } else {
                    "EVENFIELD"
                }
            }
            TASK_DISPLAY_VERT => "EVENFIELD",
            _ => "F2?",
        },
    }
}

/// Render one microinstruction.
#[must_use]
pub fn disassemble(sys_type: SystemType, mpc: u16, mir: u32, task: u8) -> String {
    let Ok(mc) = MicroInstruction::predecode(sys_type, mpc, mir, task) else {
        return format!("{mpc:06o}: ???");
    };
    let mut parts = Vec::new();
    if mc.load_l {
        parts.push("L<-".to_string());
    }
    if mc.load_t {
        parts.push("T<-".to_string());
    }
    parts.push(format!("R{}", mc.rsel));
    parts.push(ALU_NAMES[usize::from(mc.aluf)].to_string());
    parts.push(bs_name(mc.bs, task).to_string());
    let f1 = f1_name(mc.f1, task);
    if !f1.is_empty() {
        parts.push(f1.to_string());
    }
    let f2 = f2_name(mc.f2, task);
    if !f2.is_empty() {
        parts.push(f2.to_string());
    }
    format!(
        "{mpc:06o}: {:011o}  {} :{:04o}",
        mir,
        parts.join(" "),
        mc.next
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::microcode::assemble;

    #[test]
    fn renders_common_fields() {
        let mir = assemble(3, 7, 5, 1, 6, true, true, 0o17);
        let line = disassemble(SystemType::AltoII3KRam, 0o100, mir, 0);
        assert!(line.contains("L<-"));
        assert!(line.contains("T<-"));
        assert!(line.contains("BUS+T"));
        assert!(line.contains("<-MD"));
        assert!(line.contains("MAR<-"));
        assert!(line.ends_with(":0017"));
    }

    #[test]
    fn task_specific_names_follow_the_task() {
        let mir = assemble(0, 0, 3, 0, 0, false, false, 0);
        assert!(disassemble(SystemType::AltoII3KRam, 0, mir, TASK_DISK_SECTOR)
            .contains("<-KSTAT"));
        assert!(disassemble(SystemType::AltoII3KRam, 0, mir, TASK_EMULATOR).contains("<-SLOC"));
    }
}
