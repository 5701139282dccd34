//! Engine state, session lifecycle, and the control-flow boundary.
//!
//! One [`CortexM0`] per sandbox; there is no shared state between
//! instances. A session is: `configure` the memory map once, then any
//! number of `start_call` / `step` / `return_value` rounds. The host is
//! passed into `step`, not owned, so the same host can serve several
//! sandboxes.

use crate::error::Error;
use crate::host::{Dispatch, Host};
use crate::memory::{Memory, Region};
use crate::registers::Registers;

/// Reserved link-register value marking the outermost return.
///
/// `start_call` seeds LR with this; a branch to it (BX LR, POP {PC},
/// or anything else routed through the PC-write path) means the called
/// function returned to its caller. It is never a valid code address.
pub const RETURN_SENTINEL: u32 = 0x1111_1111;

/// Outcome of a [`CortexM0::step`] invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// Instruction budget exhausted; call `step` again to continue.
    Running,
    /// The function started by `start_call` returned.
    Returned,
    /// Execution faulted; see the logged diagnostic. The sandbox can be
    /// reused by starting a fresh call.
    Error,
}

/// What a successfully executed instruction did to control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Continue,
    Returned,
}

/// A sandboxed Cortex-M0.
///
/// Registers and memory are public: the single-step harness seeds and
/// inspects them directly, and host callbacks mutate R0-R3 through them.
pub struct CortexM0 {
    pub regs: Registers,
    pub memory: Memory,
}

impl Default for CortexM0 {
    fn default() -> Self {
        Self::new()
    }
}

impl CortexM0 {
    /// An engine with no memory map; `configure` before use.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            memory: Memory::unmapped(),
        }
    }

    /// Set the memory map, zero data memory, and reset the registers.
    pub fn configure(&mut self, program: Region, data: Region, service_base: u32, service: &[u8]) {
        self.memory = Memory::with_regions(program, data, service_base, service);
        self.regs = Registers::new();
    }

    /// Reset the registers, keeping the memory map and data contents.
    pub fn reset(&mut self) {
        self.regs = Registers::new();
    }

    /// Prepare a function invocation: registers cleared, SP at the top
    /// of data memory, LR seeded with the return sentinel, PC at the
    /// entry point (Thumb bit stripped), up to four arguments in R0-R3.
    pub fn start_call(&mut self, entry: u32, args: &[u32]) {
        assert!(args.len() <= 4, "at most four arguments fit in R0-R3");
        self.regs = Registers::new();
        self.regs.set_sp(self.memory.data().end());
        self.regs.set_lr(RETURN_SENTINEL);
        self.regs.set_pc(entry);
        for (i, &arg) in args.iter().enumerate() {
            self.regs.r[i] = arg;
        }
    }

    /// Decode and execute up to `max_instructions` instructions.
    pub fn step<H: Host>(&mut self, host: &mut H, max_instructions: u32) -> StepResult {
        for _ in 0..max_instructions {
            let pc = self.regs.pc();
            match self.execute_one(host) {
                Ok(Control::Continue) => {}
                Ok(Control::Returned) => return StepResult::Returned,
                Err(err) => {
                    log::error!("execution halted at {pc:#010X}: {err}");
                    return StepResult::Error;
                }
            }
        }
        StepResult::Running
    }

    /// The called function's return value (R0).
    #[must_use]
    pub const fn return_value(&self) -> u32 {
        self.regs.r[0]
    }

    /// The single PC-write path for explicit control flow.
    ///
    /// Order matters: the sentinel is matched against the raw target
    /// (Thumb bit included) before anything else; then targets leaving
    /// the program region are offered to the host. A handled call has
    /// already "returned", so execution resumes at the current LR,
    /// which may itself be the sentinel when the host function was the
    /// outermost call.
    pub(crate) fn branch<H: Host>(&mut self, host: &mut H, target: u32) -> Control {
        if target == RETURN_SENTINEL {
            return Control::Returned;
        }
        if self.memory.program().contains(target & !1) {
            self.regs.set_pc(target);
            return Control::Continue;
        }
        match host.function_call(self, target) {
            Dispatch::Handled => {
                let lr = self.regs.lr();
                if lr == RETURN_SENTINEL {
                    return Control::Returned;
                }
                self.regs.set_pc(lr);
            }
            Dispatch::Unhandled => {
                // Let the branch land; the next fetch reports the fault.
                self.regs.set_pc(target);
            }
        }
        Control::Continue
    }

    /// Fetch one halfword at `addr` and bump PC past it.
    pub(crate) fn fetch16<H: Host>(&mut self, host: &mut H, addr: u32) -> Result<u16, Error> {
        let halfword = self.memory.read16(host, addr)?;
        self.regs.set_pc(addr.wrapping_add(2));
        Ok(halfword)
    }
}
