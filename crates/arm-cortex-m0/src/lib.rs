//! ARMv6-M Thumb interpreter.
//!
//! Executes the 16-bit Thumb subset of a Cortex-M0 one instruction at a
//! time, inside a three-region sandbox (program, data, service). Code is
//! fetched through a host callback so the host can page it in on demand;
//! branches that leave program memory are offered to the host as function
//! calls. A reserved link-register value marks the outermost return.

mod alu;
mod cpu;
mod error;
mod execute;
pub mod flags;
mod host;
mod memory;
mod registers;

pub use cpu::{CortexM0, StepResult, RETURN_SENTINEL};
pub use error::Error;
pub use host::{Dispatch, Fault, Host};
pub use memory::{Memory, Region};
pub use registers::{Registers, LR, NUM_REGISTERS, PC, SP};
