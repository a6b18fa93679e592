//! Owns a [`Machine`] and drives one `step()`: fetch, decode, evaluate the
//! condition, dispatch, or fall into a host service trap.
//!
//! Grounded in `original_source/sim.c`'s top-level loop and
//! `execute.c::execute_one`, generalized from "only branch is implemented"
//! to every tag `decode::decode` classifies.

use sim_core::{Machine, SimError, LR, PC};

use crate::decode::{self, Tag};
use crate::execute;
use crate::host_io::{self, FileAllocator, SearchPath};

/// What `step()` observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Halted,
}

/// The running simulator: machine state plus the host-service plumbing
/// (file search path, readfile bump allocator) that isn't architectural
/// state and so doesn't belong in `sim-core`.
pub struct Cpu {
    pub machine: Machine,
    search_path: SearchPath,
    allocator: FileAllocator,
}

impl Cpu {
    #[must_use]
    pub fn new(machine: Machine, search_path: SearchPath, file_region_base: u32) -> Self {
        Self {
            machine,
            search_path,
            allocator: FileAllocator::new(file_region_base),
        }
    }

    /// Fetch-decode-execute one instruction, or service one host trap.
    ///
    /// Mirrors spec.md §4.3's main loop: a fetch PC in 1..5 is a host
    /// service call, not a real fetch; any other PC reads an instruction
    /// word, journals PC and advances it by 4 unconditionally, checks the
    /// condition field, and dispatches.
    pub fn step(&mut self) -> Result<StepOutcome, SimError> {
        let pc = self.machine.registers().pc();
        if pc > 0 && pc < 6 {
            return Ok(self.service_trap(pc));
        }

        let pc_at_fetch = self.machine.begin_instruction();
        let word = self.machine.memory().load_word(pc_at_fetch);
        if word == sim_core::BAD_MEMVAL {
            self.machine.finish_instruction();
            return Ok(StepOutcome::Halted);
        }

        let tag = decode::decode(word);
        let cond = decode::cond(word);
        if !execute::check_condition(cond, self.machine.registers().flags) {
            self.machine.finish_instruction();
            return Ok(StepOutcome::Continue);
        }

        let result = self.dispatch(tag, pc_at_fetch, word);
        self.machine.finish_instruction();
        result.map(|()| StepOutcome::Continue)
    }

    fn dispatch(&mut self, tag: Tag, pc_at_fetch: u32, word: u32) -> Result<(), SimError> {
        match tag {
            Tag::Illegal => Err(SimError::Decode {
                pc: pc_at_fetch,
                word,
            }),
            Tag::Swi => {
                sim_core::diag::warn(&format!("SWI at {pc_at_fetch:#010x} skipped"));
                Ok(())
            }
            Tag::Branch { link } => {
                execute::exec_branch(&mut self.machine, pc_at_fetch, link, word);
                Ok(())
            }
            Tag::DataProcessing { op, operand } => {
                execute::exec_data_processing(&mut self.machine, op, operand, word);
                Ok(())
            }
            Tag::Multiply(_) => Err(SimError::Unimplemented {
                pc: pc_at_fetch,
                word,
            }),
            Tag::SingleTransfer {
                load,
                byte,
                register_offset,
            } => {
                execute::exec_single_transfer(&mut self.machine, load, byte, register_offset, word);
                Ok(())
            }
            Tag::HalfSignedTransfer { load, kind } => {
                execute::exec_half_signed_transfer(&mut self.machine, load, kind, word);
                Ok(())
            }
            Tag::BlockTransfer { load } => {
                execute::exec_block_transfer(&mut self.machine, load, word);
                Ok(())
            }
        }
    }

    /// A fetch PC of 1..5: run the matching host service, then simulate
    /// return-from-subroutine by writing `PC <- LR`. Closed as its own
    /// journal transaction so undo can step back over a trap the same
    /// way it steps back over any other instruction.
    fn service_trap(&mut self, pc: u32) -> StepOutcome {
        let mut halted = false;
        match pc {
            host_io::TRAP_HALT => halted = true,
            host_io::TRAP_WRITE => {
                let ptr = self.machine.registers().get(0);
                let len = self.machine.registers().get(1);
                host_io::write(&self.machine, ptr, len);
            }
            host_io::TRAP_READLINE => {
                let buffer = self.machine.registers().get(0);
                let len = self.machine.registers().get(1);
                let n = host_io::readline(&mut self.machine, buffer, len);
                self.machine.write_register(0, n);
            }
            host_io::TRAP_READFILE => {
                let name_ptr = self.machine.registers().get(0);
                let len = self.machine.registers().get(1);
                let ptr = host_io::readfile(
                    &mut self.machine,
                    &self.search_path,
                    &mut self.allocator,
                    name_ptr,
                    len,
                );
                self.machine.write_register(0, ptr);
            }
            host_io::TRAP_SYNC_CACHES => host_io::sync_caches(),
            _ => unreachable!("caller guarantees 0 < pc < 6"),
        }

        let lr = self.machine.registers().lr();
        self.machine.write_register(PC, lr);
        self.machine.finish_instruction();

        if halted {
            StepOutcome::Halted
        } else {
            StepOutcome::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BASE: u32 = 0x1000;

    fn cpu_with_ram() -> Cpu {
        let mut m = Machine::new();
        m.set_journal_disabled(true);
        m.memory_mut().register_region("ram", TEST_BASE, 0x1000).unwrap();
        m.write_register(PC, TEST_BASE);
        m.set_journal_disabled(false);
        Cpu::new(m, SearchPath::new("."), TEST_BASE + 0x8000)
    }

    fn store(cpu: &mut Cpu, addr: u32, word: u32) {
        cpu.machine.memory_mut().store_word(addr, word);
    }

    #[test]
    fn s1_immediate_mov_and_addition() {
        let mut cpu = cpu_with_ram();
        let base = TEST_BASE;
        store(&mut cpu, base, 0xE3A0_0005); // MOV r0,#5
        store(&mut cpu, base + 4, 0xE280_0003); // ADD r0,r0,#3
        store(&mut cpu, base + 8, 0xEF00_0001); // SWI 1 (decoded as Swi, skipped not trapped)

        cpu.step().unwrap();
        assert_eq!(cpu.machine.registers().get(0), 5);
        cpu.step().unwrap();
        assert_eq!(cpu.machine.registers().get(0), 8);
        cpu.step().unwrap();

        assert_eq!(cpu.machine.undo(1), 1);
        assert_eq!(cpu.machine.registers().get(0), 5);
        assert_eq!(cpu.machine.redo(1), 1);
        assert_eq!(cpu.machine.registers().get(0), 8);
    }

    #[test]
    fn s4_ldr_pc_relative() {
        let mut cpu = cpu_with_ram();
        let base = TEST_BASE;
        store(&mut cpu, base + 16, 0xDEAD_BEEF);
        store(&mut cpu, base, 0xE59F_0008); // LDR r0,[pc,#8]

        cpu.step().unwrap();
        assert_eq!(cpu.machine.registers().get(0), 0xDEAD_BEEF);
    }

    #[test]
    fn s5_stm_then_ldm_round_trip() {
        let mut cpu = cpu_with_ram();
        let base = TEST_BASE;
        cpu.machine.set_journal_disabled(true);
        cpu.machine.write_register(13, base + 0x200);
        cpu.machine.write_register(0, 1);
        cpu.machine.write_register(1, 2);
        cpu.machine.write_register(2, 3);
        cpu.machine.write_register(3, 4);
        cpu.machine.set_journal_disabled(false);

        store(&mut cpu, base, 0xE92D_000F); // STMDB r13!,{r0-r3}
        store(&mut cpu, base + 4, 0xE3A0_0000); // MOV r0,#0
        store(&mut cpu, base + 8, 0xE3A0_1000); // MOV r1,#0
        store(&mut cpu, base + 12, 0xE3A0_2000); // MOV r2,#0
        store(&mut cpu, base + 16, 0xE3A0_3000); // MOV r3,#0
        store(&mut cpu, base + 20, 0xE8BD_000F); // LDMIA r13!,{r0-r3}

        for _ in 0..6 {
            cpu.step().unwrap();
        }

        assert_eq!(cpu.machine.registers().get(0), 1);
        assert_eq!(cpu.machine.registers().get(1), 2);
        assert_eq!(cpu.machine.registers().get(2), 3);
        assert_eq!(cpu.machine.registers().get(3), 4);
        assert_eq!(cpu.machine.registers().get(13), base + 0x200);
    }

    #[test]
    fn halt_trap_sets_halted_outcome() {
        let mut cpu = cpu_with_ram();
        cpu.machine.set_journal_disabled(true);
        cpu.machine.write_register(LR, 0xDEAD_0000);
        cpu.machine.write_register(PC, 1);
        cpu.machine.set_journal_disabled(false);
        let outcome = cpu.step().unwrap();
        assert_eq!(outcome, StepOutcome::Halted);
        assert_eq!(cpu.machine.registers().pc(), 0xDEAD_0000);
    }
}
