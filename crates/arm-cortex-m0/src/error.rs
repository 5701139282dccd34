//! Errors that terminate a step.

use std::fmt;

/// Reason a step terminated with an error.
///
/// All variants are fatal for the current invocation; the host may start
/// a fresh call afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Unrecognized opcode bytes.
    Decode { opcode: u32, addr: u32 },
    /// Recognized but deliberately unimplemented: SVC, UDF, 32-bit forms
    /// beyond BL/MSR/MRS and the barriers.
    Unsupported { opcode: u32, addr: u32 },
    /// Access to an unmapped address, or past the end of its region.
    Bus { addr: u32 },
    /// 16-bit access with bit 0 set, or 32-bit access with bits 1:0 set.
    Alignment { addr: u32, size: u32 },
    /// The host program-read callback rejected the read.
    HostFault { addr: u32 },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode { opcode, addr } => {
                write!(f, "undefined instruction {opcode:#06X} at {addr:#010X}")
            }
            Self::Unsupported { opcode, addr } => {
                write!(f, "unsupported instruction {opcode:#06X} at {addr:#010X}")
            }
            Self::Bus { addr } => write!(f, "bus error at {addr:#010X}"),
            Self::Alignment { addr, size } => {
                write!(f, "misaligned {size}-byte access at {addr:#010X}")
            }
            Self::HostFault { addr } => {
                write!(f, "program memory read rejected at {addr:#010X}")
            }
        }
    }
}

impl std::error::Error for Error {}
