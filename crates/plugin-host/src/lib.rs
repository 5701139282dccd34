//! LPC1114-style plugin host.
//!
//! Owns the plugin's program image, publishes the service table in the
//! sandbox's service region, serves the engine's program reads, and
//! intercepts calls to the table's function addresses. The addresses
//! the table advertises are deliberately fake; nothing lives there, so
//! any branch to one is routed back here by the engine and handled on
//! the host side.
//!
//! Memory map (the classic one; the engine itself never hardcodes it):
//!
//! ```text
//! 0x0000_0300  service table
//! 0x0000_6000  plugin code
//! 0x0000_7000  plugin header
//! 0x1000_0200  plugin data memory
//! ```

use std::fmt;

use arm_cortex_m0::{CortexM0, Dispatch, Fault, Host, Region};
use plugin_api::{
    HeaderError, PluginHeader, Service, ServiceTable, DATA_ADDRESS, HEADER_ADDRESS,
    PROGRAM_ADDRESS, SERVICE_TABLE_ADDRESS,
};

/// Data memory given to a plugin unless its header asks for less.
pub const DATA_SIZE: u32 = 1024;

/// Base of the fake addresses published in the service table.
const SERVICE_SLOT_BASE: u32 = 0x1000;

/// Longest string a plugin may pass to the debug write-line services.
const MAX_DEBUG_STRING: u32 = 256;

/// Errors from [`PluginHost::load_plugin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    Header(HeaderError),
    InsufficientMemory { required: u32, available: u32 },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header(err) => write!(f, "{err}"),
            Self::InsufficientMemory {
                required,
                available,
            } => write!(
                f,
                "plugin needs {required} bytes of data memory, host has {available}"
            ),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<HeaderError> for LoadError {
    fn from(err: HeaderError) -> Self {
        Self::Header(err)
    }
}

/// A host for one plugin image.
pub struct PluginHost {
    image: Vec<u8>,
    table: ServiceTable,
    /// Simulated milliseconds since host start, ~16 ms resolution.
    uptime_ms: u32,
}

impl PluginHost {
    /// Host a program image loaded at [`PROGRAM_ADDRESS`].
    #[must_use]
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            image,
            table: ServiceTable::with_slots_from(SERVICE_SLOT_BASE),
            uptime_ms: 1000,
        }
    }

    /// The service table this host publishes.
    #[must_use]
    pub const fn service_table(&self) -> ServiceTable {
        self.table
    }

    /// Set up the sandbox's memory map for this image.
    pub fn configure(&self, cpu: &mut CortexM0) {
        self.configure_with_data_size(cpu, DATA_SIZE);
    }

    fn configure_with_data_size(&self, cpu: &mut CortexM0, data_size: u32) {
        cpu.configure(
            Region::new(PROGRAM_ADDRESS, self.image.len() as u32),
            Region::new(DATA_ADDRESS, data_size),
            SERVICE_TABLE_ADDRESS,
            &self.table.to_bytes(),
        );
    }

    /// Parse the plugin header out of the image, validate it against
    /// this host, configure the sandbox, and point it at the plugin's
    /// init function. The caller runs the call with `step`.
    pub fn load_plugin(&self, cpu: &mut CortexM0) -> Result<PluginHeader, LoadError> {
        let offset = (HEADER_ADDRESS - PROGRAM_ADDRESS) as usize;
        let bytes = self.image.get(offset..).unwrap_or(&[]);
        let header = PluginHeader::parse(bytes)?;
        if header.required_memory > DATA_SIZE {
            return Err(LoadError::InsufficientMemory {
                required: header.required_memory,
                available: DATA_SIZE,
            });
        }
        log::info!(
            "loading plugin v{}.{}: {} functions, init at {:#010X}",
            header.version_major,
            header.version_minor,
            header.function_count,
            header.init
        );
        self.configure_with_data_size(cpu, header.required_memory);
        cpu.start_call(header.init, &[]);
        Ok(header)
    }

    /// Fetch a string the plugin passed by pointer and length. The
    /// string may live in data memory or in the image's rodata.
    fn read_plugin_string(&mut self, cpu: &mut CortexM0, addr: u32, len: u32) -> String {
        let mut bytes = vec![0; len.min(MAX_DEBUG_STRING) as usize];
        if cpu.memory.read(self, &mut bytes, addr).is_err() {
            return format!("<bad string pointer {addr:#010X}>");
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn dispatch_service(&mut self, cpu: &mut CortexM0, service: Service) {
        match service {
            Service::GetUptime => {
                self.uptime_ms += 16;
                cpu.regs.r[0] = self.uptime_ms;
            }
            Service::DebugWriteLine => {
                let (addr, len) = (cpu.regs.r[0], cpu.regs.r[1]);
                let text = self.read_plugin_string(cpu, addr, len);
                log::info!("PLUGIN: {text}");
            }
            Service::DebugWriteLineHex32 => {
                let (addr, len, value) = (cpu.regs.r[0], cpu.regs.r[1], cpu.regs.r[2]);
                let text = self.read_plugin_string(cpu, addr, len);
                log::info!("PLUGIN: {text} {value:#X}");
            }
            Service::WriteScreen => {
                let (yx, addr, len) = (cpu.regs.r[0], cpu.regs.r[1], cpu.regs.r[2]);
                let text = self.read_plugin_string(cpu, addr, len);
                log::info!(
                    "screen [{},{}]: {text}",
                    yx >> 16,
                    yx & 0xFFFF
                );
            }
            Service::WriteScreenDecimal => {
                let yx = cpu.regs.r[0];
                log::info!(
                    "screen [{},{}]: {}",
                    yx >> 16,
                    yx & 0xFFFF,
                    cpu.regs.r[1] as i32
                );
            }
            Service::WriteI2c => {
                log::debug!(
                    "i2c write {:#010X}, {} bytes",
                    cpu.regs.r[0],
                    cpu.regs.r[2]
                );
                cpu.regs.r[0] = 0;
            }
            Service::ReadI2c => {
                // No bus behind it; report success and hand back zeros.
                let buffer = cpu.regs.r[0];
                let count = cpu.regs.r[2];
                log::debug!("i2c read {:#010X}, {count} bytes", cpu.regs.r[1]);
                let mut status = 0;
                for i in 0..count {
                    if cpu.memory.write8(buffer.wrapping_add(i), 0).is_err() {
                        status = -1_i32 as u32;
                        break;
                    }
                }
                cpu.regs.r[0] = status;
            }
        }
    }
}

impl Host for PluginHost {
    fn read_program_memory(&mut self, buf: &mut [u8], addr: u32) -> Result<(), Fault> {
        let offset = addr.wrapping_sub(PROGRAM_ADDRESS) as usize;
        let end = offset.checked_add(buf.len()).ok_or(Fault)?;
        if end > self.image.len() {
            return Err(Fault);
        }
        buf.copy_from_slice(&self.image[offset..end]);
        Ok(())
    }

    fn function_call(&mut self, cpu: &mut CortexM0, target: u32) -> Dispatch {
        match self.table.service_at(target) {
            Some(service) => {
                log::debug!("service call: {service} (target {target:#010X})");
                self.dispatch_service(cpu, service);
                Dispatch::Handled
            }
            None => {
                log::warn!("call to unknown function {target:#010X}");
                Dispatch::Unhandled
            }
        }
    }
}
