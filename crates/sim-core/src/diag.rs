//! Non-fatal diagnostics.
//!
//! Mirrors `original_source/warn.c`'s `warn()`/`unpredictable()`: print to
//! stderr and keep going. There's no `log`/`tracing` dependency here — a
//! simulator this size doesn't need a subscriber, and the upstream project
//! it's modeled on just prints.

/// Recoverable condition: misaligned/out-of-range memory access, a
/// skipped SWI, condition code 15, and the like. Execution continues.
pub fn warn(message: &str) {
    eprintln!("Warning: {message}");
}

/// Architecturally defined but implementation-defined behavior was hit
/// (e.g. writeback register also appearing in an LDM list in a way the
/// ARM ARM leaves UNPREDICTABLE).
pub fn unpredictable(message: &str) {
    eprintln!("UNPREDICTABLE INSTRUCTION BEHAVIOR: {message}");
}
