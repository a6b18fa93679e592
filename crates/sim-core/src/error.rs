//! Error kinds for the simulator.
//!
//! No `anyhow`/`thiserror` — plain enums with a `Display` impl, the way
//! `format-adf::AdfError` does it. `MemoryAccessError` (misaligned/
//! out-of-range access) is intentionally not a variant here: spec'd as
//! recovered locally (warned, sentinel/no-op), it never needs to propagate
//! as a `Result`.

use std::fmt;

/// Fatal or loop-terminating conditions the driver has to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// Bad CLI arguments, missing file, overlapping memory region.
    Config(String),
    /// Bad image magic, short image, wrong parameter-block version, image
    /// larger than the target region.
    Image(String),
    /// The decoder classified the fetched word as illegal.
    Decode { pc: u32, word: u32 },
    /// The decoder recognised the instruction but the executor doesn't
    /// implement it yet.
    Unimplemented { pc: u32, word: u32 },
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "{msg}"),
            Self::Image(msg) => write!(f, "{msg}"),
            Self::Decode { pc, word } => {
                write!(f, "illegal instruction {word:#010x} at {pc:#010x}")
            }
            Self::Unimplemented { pc, word } => {
                write!(f, "unimplemented instruction {word:#010x} at {pc:#010x}")
            }
        }
    }
}

impl std::error::Error for SimError {}
