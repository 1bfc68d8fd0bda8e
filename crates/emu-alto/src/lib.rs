//! Cycle-accurate Xerox Alto II emulator.
//!
//! Sixteen cooperative micro-tasks share one datapath; each call to
//! `Alto::step` evaluates one microinstruction. The peripheral controllers
//! (disk, display, Ethernet, keyboard, mouse) inject their behaviour
//! through the task-specific bus-source and function codes.

pub mod alto;
pub mod alu;
pub mod bus;
#[cfg(feature = "native")]
pub mod capture;
pub mod config;
pub mod cpu;
pub mod debugger;
pub mod disasm;
pub mod disk;
pub mod display;
pub mod error;
pub mod ethernet;
pub mod gui;
pub mod keyboard;
pub mod memory;
pub mod microcode;
pub mod mouse;
pub mod observable;
pub mod rom;
pub mod transport;

pub use alto::{Alto, StopReason};
pub use config::{AltoConfig, SystemType};
pub use cpu::Cpu;
pub use debugger::{Breakpoint, Debugger};
pub use error::{AltoError, CpuError};
pub use gui::{DebuggerCallback, Gui, HeadlessGui};
pub use microcode::MicroInstruction;
pub use observable::{Observable, Value};
pub use transport::{MemTransport, Transport, UdpTransport};
