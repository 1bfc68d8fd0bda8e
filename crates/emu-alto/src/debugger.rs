//! Breakpoint engine.
//!
//! A breakpoint matches when every non-wildcard field matches the CPU
//! state after a step. Slot 0 is reserved for the transient predicate the
//! stepping commands plant (next-task); user breakpoints take the lowest
//! free slot from 1 up.

use crate::cpu::Cpu;

pub const MAX_BREAKPOINTS: usize = 1024;

/// Wildcard markers.
pub const ANY_TASK: u8 = 0xFF;
pub const ANY_MPC: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub enable: bool,
    pub task: u8,
    pub ntask: u8,
    pub mpc: u16,
    /// Require the last step to have switched tasks.
    pub on_task_switch: bool,
    pub mir_fmt: u32,
    /// Zero disables the MIR filter.
    pub mir_mask: u32,
}

impl Breakpoint {
    /// A fully wildcarded, enabled breakpoint (matches every step).
    #[must_use]
    pub fn any() -> Self {
        Self {
            enable: true,
            task: ANY_TASK,
            ntask: ANY_TASK,
            mpc: ANY_MPC,
            on_task_switch: false,
            mir_fmt: 0,
            mir_mask: 0,
        }
    }

    #[must_use]
    pub fn at_mpc(mpc: u16) -> Self {
        Self {
            mpc,
            ..Self::any()
        }
    }

    #[must_use]
    pub fn matches(&self, cpu: &Cpu) -> bool {
        self.enable
            && (self.task == ANY_TASK || self.task == cpu.ctask)
            && (self.ntask == ANY_TASK || self.ntask == cpu.ntask)
            && (self.mpc == ANY_MPC || self.mpc == cpu.mpc)
            && (!self.on_task_switch || cpu.task_switch)
            && (self.mir_mask == 0 || cpu.mir & self.mir_mask == self.mir_fmt)
    }
}

pub struct Debugger {
    slots: Vec<Option<Breakpoint>>,
}

impl Debugger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![None; MAX_BREAKPOINTS],
        }
    }

    /// Install a breakpoint in the lowest free user slot. `None` when the
    /// table is full.
    pub fn add(&mut self, bp: Breakpoint) -> Option<usize> {
        let slot = self.slots[1..].iter().position(Option::is_none)? + 1;
        self.slots[slot] = Some(bp);
        Some(slot)
    }

    /// Plant the transient stepping predicate in slot 0.
    pub fn set_transient(&mut self, bp: Breakpoint) {
        self.slots[0] = Some(bp);
    }

    pub fn clear_transient(&mut self) {
        self.slots[0] = None;
    }

    pub fn remove(&mut self, slot: usize) -> bool {
        if slot == 0 || slot >= MAX_BREAKPOINTS {
            return false;
        }
        self.slots[slot].take().is_some()
    }

    pub fn set_enabled(&mut self, slot: usize, enable: bool) -> bool {
        match self.slots.get_mut(slot) {
            Some(Some(bp)) => {
                bp.enable = enable;
                true
            }
            _ => false,
        }
    }

    /// All installed breakpoints with their slots.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Breakpoint)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, bp)| bp.as_ref().map(|bp| (i, bp)))
    }

    /// First matching breakpoint after a step.
    #[must_use]
    pub fn check(&self, cpu: &Cpu) -> Option<usize> {
        self.slots
            .iter()
            .position(|bp| bp.is_some_and(|bp| bp.matches(cpu)))
    }
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemType;
    use crate::rom::CONSTANT_SIZE;

    fn cpu() -> Cpu {
        Cpu::new(SystemType::AltoII3KRam, vec![0; CONSTANT_SIZE])
    }

    #[test]
    fn wildcards_match_everything() {
        let cpu = cpu();
        assert!(Breakpoint::any().matches(&cpu));
    }

    #[test]
    fn fields_must_all_match() {
        let mut cpu = cpu();
        cpu.mpc = 0o100;
        cpu.ctask = 4;
        let bp = Breakpoint {
            task: 4,
            mpc: 0o100,
            ..Breakpoint::any()
        };
        assert!(bp.matches(&cpu));
        let bp = Breakpoint {
            task: 5,
            mpc: 0o100,
            ..Breakpoint::any()
        };
        assert!(!bp.matches(&cpu));
    }

    #[test]
    fn mir_filter_uses_the_mask() {
        let mut cpu = cpu();
        cpu.mir = 0x0012_3400;
        let bp = Breakpoint {
            mir_fmt: 0x0012_0000,
            mir_mask: 0x00FF_0000,
            ..Breakpoint::any()
        };
        assert!(bp.matches(&cpu));
        let bp = Breakpoint {
            mir_fmt: 0x0013_0000,
            mir_mask: 0x00FF_0000,
            ..Breakpoint::any()
        };
        assert!(!bp.matches(&cpu));
    }

    #[test]
    fn user_slots_start_at_one() {
        let mut dbg = Debugger::new();
        assert_eq!(dbg.add(Breakpoint::any()), Some(1));
        assert_eq!(dbg.add(Breakpoint::any()), Some(2));
        assert!(dbg.remove(1));
        // Lowest free slot is reused.
        assert_eq!(dbg.add(Breakpoint::any()), Some(1));
    }

    #[test]
    fn disabled_breakpoints_do_not_fire() {
        let mut dbg = Debugger::new();
        let cpu = cpu();
        let slot = dbg.add(Breakpoint::any()).expect("slot");
        assert_eq!(dbg.check(&cpu), Some(slot));
        dbg.set_enabled(slot, false);
        assert_eq!(dbg.check(&cpu), None);
    }

    #[test]
    fn transient_slot_fires_first() {
        let mut dbg = Debugger::new();
        let cpu = cpu();
        dbg.add(Breakpoint::any());
        dbg.set_transient(Breakpoint::any());
        assert_eq!(dbg.check(&cpu), Some(0));
        dbg.clear_transient();
        assert_eq!(dbg.check(&cpu), Some(1));
    }
}
