//! Top-level Alto machine.
//!
//! One `step` is one microinstruction: the device timers advance first and
//! raise their wakeups, then the CPU runs a cycle. The construction path
//! owns resource cleanup — a failure while parsing ROMs or packs drops the
//! partially built machine, transport thread included.

use format_diablo::{DiabloImage, ImageFormat};

use crate::bus::AltoBus;
use crate::config::{AltoConfig, SystemType};
use crate::cpu::Cpu;
use crate::debugger::{Breakpoint, Debugger};
use crate::disasm;
use crate::error::{AltoError, CpuError};
use crate::observable::{Observable, Value};
use crate::rom;
use crate::transport::Transport;

/// Why a `run` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Ran the requested number of cycles.
    CycleLimit,
    /// A breakpoint matched; the slot is attached.
    Breakpoint(usize),
    /// The CPU faulted.
    Fault(CpuError),
}

pub struct Alto {
    pub cpu: Cpu,
    pub bus: AltoBus,
    pub debugger: Debugger,
}

impl Alto {
    /// Build a machine from ROM bytes and pack images.
    ///
    /// # Errors
    ///
    /// Returns an error when a ROM has the wrong size or a pack image does
    /// not parse.
    pub fn new(config: &AltoConfig, transport: Box<dyn Transport>) -> Result<Self, AltoError> {
        let constants = rom::parse_constant_rom(&config.constant_rom)?;
        let mut cpu = Cpu::new(config.sys_type, constants);

        let bank0 = rom::parse_microcode_rom(&config.microcode_rom0)?;
        cpu.load_microcode_bank(0, &bank0);
        if let Some(ref data) = config.microcode_rom1 {
            let bank1 = rom::parse_microcode_rom(data)?;
            cpu.load_microcode_bank(1, &bank1);
        }

        // Station address: fixed for now; multi-host setups would hand
        // these out per instance.
        let mut bus = AltoBus::new(transport, 0o42);

        for (unit, image) in [&config.disk1, &config.disk2].into_iter().enumerate() {
            if let Some(data) = image {
                let image = DiabloImage::from_bytes(data.clone(), ImageFormat::Raw)?;
                bus.disk.insert_disk(unit, image);
            }
        }

        Ok(Self {
            cpu,
            bus,
            debugger: Debugger::new(),
        })
    }

    /// Power-on reset. Clears the sticky CPU error.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
    }

    /// One machine cycle.
    pub fn step(&mut self) -> Result<(), CpuError> {
        self.cpu.pending |= self.bus.tick();
        self.cpu.step(&mut self.bus)
    }

    /// Run until a breakpoint fires, the CPU faults or `limit` cycles
    /// elapse. Breakpoints are checked after every step.
    pub fn run(&mut self, limit: u64) -> StopReason {
        for _ in 0..limit {
            if let Err(e) = self.step() {
                return StopReason::Fault(e);
            }
            if let Some(slot) = self.debugger.check(&self.cpu) {
                self.debugger.clear_transient();
                return StopReason::Breakpoint(slot);
            }
        }
        StopReason::CycleLimit
    }

    /// Run to the next task switch (the `next-task` stepping command).
    pub fn run_to_task_switch(&mut self, limit: u64) -> StopReason {
        self.debugger.set_transient(Breakpoint {
            on_task_switch: true,
            ..Breakpoint::any()
        });
        let reason = self.run(limit);
        self.debugger.clear_transient();
        reason
    }

    #[must_use]
    pub fn framebuffer(&self) -> &[u32] {
        self.bus.display.framebuffer()
    }

    /// Disassemble the instruction the CPU will execute next.
    #[must_use]
    pub fn disassemble_current(&self) -> String {
        disasm::disassemble(self.cpu.sys_type, self.cpu.mpc, self.cpu.mir, self.cpu.ctask)
    }

    /// Disassemble an arbitrary microcode address for a task's decode.
    #[must_use]
    pub fn disassemble(&self, mpc: u16, task: u8) -> String {
        disasm::disassemble(self.cpu.sys_type, mpc, self.cpu.fetch(mpc), task)
    }

    #[must_use]
    pub fn sys_type(&self) -> SystemType {
        self.cpu.sys_type
    }

    /// Multi-line register dump for the debugger front-end.
    #[must_use]
    pub fn register_dump(&self) -> String {
        let mut out = String::new();
        for path in self.query_paths() {
            if let Some(value) = self.query(path) {
                out.push_str(&format!("{path:<12} {value}\n"));
            }
        }
        for (i, chunk) in self.cpu.r.chunks(8).enumerate() {
            out.push_str(&format!("R{:02o}-R{:02o}     ", i * 8, i * 8 + 7));
            for r in chunk {
                out.push_str(&format!(" {r:06o}"));
            }
            out.push('\n');
        }
        out
    }
}

impl Observable for Alto {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("r.") {
            let index: usize = rest.parse().ok()?;
            return self.cpu.r.get(index).map(|&v| v.into());
        }
        if let Some(rest) = path.strip_prefix("task_mpc.") {
            let index: usize = rest.parse().ok()?;
            return self.cpu.task_mpc.get(index).map(|&v| v.into());
        }
        match path {
            "ctask" => Some(Value::Word(u16::from(self.cpu.ctask))),
            "ntask" => Some(Value::Word(u16::from(self.cpu.ntask))),
            "mpc" => Some(self.cpu.mpc.into()),
            "mir" => Some(self.cpu.mir.into()),
            "t" => Some(self.cpu.t.into()),
            "l" => Some(self.cpu.l.into()),
            "m" => Some(self.cpu.m.into()),
            "ir" => Some(self.cpu.ir.into()),
            "mar" => Some(self.bus.mem.mar.into()),
            "pending" => Some(self.cpu.pending.into()),
            "skip" => Some(self.cpu.skip.into()),
            "carry" => Some(self.cpu.carry.into()),
            "aluc0" => Some(self.cpu.alu_c0.into()),
            "cycle" => Some(self.cpu.cycle.into()),
            "disk.kstat" => Some(self.bus.disk.read_kstat().into()),
            "disk.kdata" => Some(self.bus.disk.read_kdata().into()),
            "display.fields" => Some(self.bus.display.fields().into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "ctask", "ntask", "mpc", "mir", "t", "l", "m", "ir", "mar", "pending", "skip",
            "carry", "aluc0", "cycle", "disk.kstat", "disk.kdata", "display.fields",
        ]
    }
}
