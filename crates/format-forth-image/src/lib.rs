//! Two-header Forth kernel image format: parsing, relocation, and
//! parameter block wiring into guest memory and the host trap ABI.
//!
//! Grounded in spec.md §4.5, `original_source/image.c` (which only
//! slurps the file into a raw buffer) and `sim.c::main`'s
//! `memory_more`/`forth_init` call site, generalized from one hardcoded
//! base/size pair into explicit loader parameters.

pub mod image;
pub mod loader;
pub mod param_block;

pub use image::ParsedImage;
pub use loader::{load, LoadedImage, DEFAULT_LOAD_BASE, DEFAULT_REGION_SIZE};
