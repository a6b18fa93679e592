//! Copies a parsed image into guest memory, relocates it, and wires the
//! guest parameter block to the host trap ABI.
//!
//! Grounded in `original_source/sim.c::main`'s
//! `memory_more(GB(2), MB(20)); forth_init(filename, GB(2), MB(16))`
//! call site, generalized from that one hardcoded base/size pair into
//! explicit parameters.

use sim_core::{traps, Machine, SimError};

use crate::image::ParsedImage;
use crate::param_block;

/// Default guest region base: 2 GiB, matching `sim.c`'s `GB(2)`.
pub const DEFAULT_LOAD_BASE: u32 = 0x8000_0000;
/// Default guest region size: 20 MiB, matching `sim.c`'s `memory_more`
/// call (the original separately passes `MB(16)` to `forth_init` as the
/// image's own ceiling; this simulator uses one region for both).
pub const DEFAULT_REGION_SIZE: u32 = 20 * 1024 * 1024;

/// Bytes reserved at the top of the region for the return stack, and the
/// anchor point `rp0`/`sp0` are computed from.
const STACK_RESERVE: u32 = 32;

/// What the loader learned after a successful load: where to set PC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedImage {
    pub entry: u32,
}

/// Parse `bytes`, relocate its code into `machine` at `load_base`, and
/// wire the guest parameter block. `region_size` is the size of the
/// memory region the caller has already registered at `load_base` — the
/// loader checks the image fits rather than registering anything itself
/// (region lifecycle is the Driver's job, per spec.md §3).
///
/// Every write here runs with the journal disabled: this is bootstrap,
/// not an Executor mutation, so it must not show up in the undo history
/// (spec.md §3's invariant; see `Machine::set_journal_disabled`).
pub fn load(
    machine: &mut Machine,
    bytes: &[u8],
    load_base: u32,
    region_size: u32,
) -> Result<LoadedImage, SimError> {
    let image = ParsedImage::parse(bytes)?;
    let n = image.word_count();

    if n < param_block::WORD_COUNT {
        return Err(SimError::Image(format!(
            "image has only {n} code words, too few for the {}-word parameter block",
            param_block::WORD_COUNT
        )));
    }

    let needed = u64::from(n) * 4;
    if needed > u64::from(region_size) {
        return Err(SimError::Image(format!(
            "image needs {needed} bytes but the target region is only {region_size} bytes"
        )));
    }

    machine.set_journal_disabled(true);
    relocate_into(&image, machine, load_base);
    write_parameter_block(machine, load_base, region_size);
    machine.set_journal_disabled(false);

    let entry = machine
        .memory()
        .load_word(param_block::field_addr(load_base, param_block::ENTRY));
    Ok(LoadedImage { entry })
}

/// Step 3 of §4.5: store each code word into guest memory at
/// `load_base + 4*i`, adding `load_base` when that word's relocation bit
/// is set.
fn relocate_into(image: &ParsedImage, machine: &mut Machine, load_base: u32) {
    for i in 0..image.word_count() {
        let word = image.code_word(i);
        let value = if image.reloc_bit(i) {
            word.wrapping_add(load_base)
        } else {
            word
        };
        machine.write_word(load_base.wrapping_add(4 * i), value);
    }
}

/// Step 4 of §4.5: compute `sp0`/`rp0` from the requested return-stack
/// depth and write the stack pointers plus the callback slots, which are
/// set to the trap addresses `arm-cpu::host_io` dispatches (§4.6). Three
/// Forth-side callbacks (`qkey`, `key`, `readline`) share one host
/// service: this simulator exposes a single line-buffered `readline`
/// trap rather than raw unbuffered key I/O, a deliberate narrowing from
/// the original's richer console layer (recorded in DESIGN.md).
fn write_parameter_block(machine: &mut Machine, load_base: u32, region_size: u32) {
    let rp0_requested = machine
        .memory()
        .load_word(param_block::field_addr(load_base, param_block::RP0));
    let rp0 = load_base.wrapping_add(region_size).wrapping_sub(STACK_RESERVE);
    let sp0 = load_base
        .wrapping_add(region_size)
        .wrapping_sub(rp0_requested)
        .wrapping_sub(STACK_RESERVE);

    let write_field = |machine: &mut Machine, offset: u32, value: u32| {
        machine.write_word(param_block::field_addr(load_base, offset), value);
    };

    write_field(machine, param_block::RP0, rp0);
    write_field(machine, param_block::SP0, sp0);
    write_field(machine, param_block::EXIT_CONTEXT, 0);
    write_field(machine, param_block::EXIT_FUNC, traps::HALT);
    write_field(machine, param_block::TYPE_CB, traps::WRITE);
    write_field(machine, param_block::QKEY_CB, traps::READLINE);
    write_field(machine, param_block::KEY_CB, traps::READLINE);
    write_field(machine, param_block::READLINE_CB, traps::READLINE);
    write_field(machine, param_block::GETFILE_CB, traps::READFILE);
    write_field(machine, param_block::SYNC_CACHES_CB, traps::SYNC_CACHES);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_image(rp0_requested: u32, entry: u32) -> Vec<u8> {
        let mut code = vec![0u32; param_block::WORD_COUNT as usize];
        code[param_block::VERSION as usize] = 1;
        code[param_block::ENTRY as usize] = entry;
        code[param_block::RP0 as usize] = rp0_requested;
        let n = code.len() as u32;
        let r = 1u32;
        let reloc = vec![0u32];

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&n.to_le_bytes());
        bytes.extend_from_slice(&r.to_le_bytes());
        for w in &code {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        for w in &reloc {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn loads_entry_and_stack_pointers() {
        let mut machine = Machine::new();
        let base = DEFAULT_LOAD_BASE;
        machine
            .memory_mut()
            .register_region("guest", base, DEFAULT_REGION_SIZE)
            .unwrap();

        let bytes = build_image(0x400, 0x8000_1000);
        let loaded = load(&mut machine, &bytes, base, DEFAULT_REGION_SIZE).unwrap();

        assert_eq!(loaded.entry, 0x8000_1000);
        let expected_rp0 = base + DEFAULT_REGION_SIZE - STACK_RESERVE;
        let expected_sp0 = expected_rp0 - 0x400;
        assert_eq!(
            machine
                .memory()
                .load_word(param_block::field_addr(base, param_block::RP0)),
            expected_rp0
        );
        assert_eq!(
            machine
                .memory()
                .load_word(param_block::field_addr(base, param_block::SP0)),
            expected_sp0
        );
    }

    #[test]
    fn wires_callback_slots_to_trap_addresses() {
        let mut machine = Machine::new();
        let base = DEFAULT_LOAD_BASE;
        machine
            .memory_mut()
            .register_region("guest", base, DEFAULT_REGION_SIZE)
            .unwrap();
        let bytes = build_image(0, 0);
        load(&mut machine, &bytes, base, DEFAULT_REGION_SIZE).unwrap();

        let at = |offset: u32| machine.memory().load_word(param_block::field_addr(base, offset));
        assert_eq!(at(param_block::EXIT_FUNC), traps::HALT);
        assert_eq!(at(param_block::TYPE_CB), traps::WRITE);
        assert_eq!(at(param_block::READLINE_CB), traps::READLINE);
        assert_eq!(at(param_block::GETFILE_CB), traps::READFILE);
        assert_eq!(at(param_block::SYNC_CACHES_CB), traps::SYNC_CACHES);
    }

    #[test]
    fn bootstrap_writes_do_not_enter_the_journal() {
        let mut machine = Machine::new();
        let base = DEFAULT_LOAD_BASE;
        machine
            .memory_mut()
            .register_region("guest", base, DEFAULT_REGION_SIZE)
            .unwrap();
        let bytes = build_image(0, 0);
        load(&mut machine, &bytes, base, DEFAULT_REGION_SIZE).unwrap();
        assert_eq!(machine.undo_depth(), 0);
    }

    #[test]
    fn rejects_image_larger_than_region() {
        let mut machine = Machine::new();
        let base = DEFAULT_LOAD_BASE;
        machine.memory_mut().register_region("guest", base, 32).unwrap();
        let bytes = build_image(0, 0);
        assert!(load(&mut machine, &bytes, base, 32).is_err());
    }
}
