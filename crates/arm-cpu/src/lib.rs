//! ARMv4T decode/execute engine and host service dispatch.
//!
//! Depends only on `sim-core` for state; owns none of it beyond what
//! `Cpu` wraps for host-I/O bookkeeping.

pub mod alu;
pub mod cpu;
pub mod decode;
pub mod execute;
pub mod host_io;
pub mod shift;

pub use cpu::{Cpu, StepOutcome};
pub use decode::{decode, DpOp, DpOperand, HalfKind, MulOp, Tag};
