//! Host callback interface.
//!
//! The embedder supplies a [`Host`] and passes it into every call to
//! [`CortexM0::step`](crate::CortexM0::step). Program-region reads,
//! including every instruction fetch, go through the host, so code can
//! be paged in on demand rather than held resident. Branches whose
//! target leaves the program region are offered to the host as function
//! calls before the engine commits the new PC.

use crate::cpu::CortexM0;

/// Returned by a failed program-memory read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault;

/// Outcome of a host function-call interception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The host performed the call. R0-R3 hold whatever the host wrote;
    /// execution resumes at the current LR as if the callee returned.
    Handled,
    /// Not a host function; the engine branches to the target and the
    /// next fetch decides its fate.
    Unhandled,
}

/// Embedder-provided services.
pub trait Host {
    /// Copy `buf.len()` bytes of program memory starting at `addr`.
    ///
    /// Called for every program-region read. The engine has already
    /// bounds-checked the access against the program region descriptor.
    fn read_program_memory(&mut self, buf: &mut [u8], addr: u32) -> Result<(), Fault>;

    /// A branch is about to leave program memory for `target`.
    ///
    /// The full engine state is available and may be mutated; writing
    /// R0-R3 to model a callee's return values is the expected use.
    /// `target` is passed exactly as the guest produced it, Thumb bit
    /// included.
    fn function_call(&mut self, cpu: &mut CortexM0, target: u32) -> Dispatch;
}
