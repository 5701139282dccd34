//! Plugin and service wire formats.
//!
//! Two packed little-endian structures sit at fixed addresses in the
//! sandbox: the plugin's header, which tells the host what the binary
//! needs, and the host's service table, which tells the plugin which
//! addresses to call for host services. Both are plain byte images;
//! the plugin side is compiled C or assembly, so layout is the contract.

use std::fmt;

/// Where the service table lives on the LPC1114 host.
pub const SERVICE_TABLE_ADDRESS: u32 = 0x300;
/// Base of the plugin's code image.
pub const PROGRAM_ADDRESS: u32 = 0x6000;
/// Where the plugin header sits inside the code image.
pub const HEADER_ADDRESS: u32 = 0x7000;
/// Base of the plugin's data memory.
pub const DATA_ADDRESS: u32 = 0x1000_0000 + 0x200;

/// Service table slots in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    GetUptime,
    DebugWriteLine,
    DebugWriteLineHex32,
    WriteScreen,
    WriteScreenDecimal,
    WriteI2c,
    ReadI2c,
}

impl Service {
    /// All slots, in the order they appear in the table.
    pub const ALL: [Self; 7] = [
        Self::GetUptime,
        Self::DebugWriteLine,
        Self::DebugWriteLineHex32,
        Self::WriteScreen,
        Self::WriteScreenDecimal,
        Self::WriteI2c,
        Self::ReadI2c,
    ];
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GetUptime => "GetUptime",
            Self::DebugWriteLine => "DebugWriteLine",
            Self::DebugWriteLineHex32 => "DebugWriteLineHex32",
            Self::WriteScreen => "WriteScreen",
            Self::WriteScreenDecimal => "WriteScreenDecimal",
            Self::WriteI2c => "WriteI2C",
            Self::ReadI2c => "ReadI2C",
        };
        f.write_str(name)
    }
}

/// The host's service function table.
///
/// Wire layout: version major/minor (one byte each), function count
/// (u16), then one u32 function address per slot. A plugin loads an
/// address out of the table and calls through it; the host intercepts
/// the call, so the addresses only have to be distinctive, not real.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceTable {
    pub version_major: u8,
    pub version_minor: u8,
    /// Addresses in [`Service::ALL`] order.
    pub slots: [u32; 7],
}

impl ServiceTable {
    /// Encoded size in bytes.
    pub const SIZE: usize = 4 + 4 * 7;

    /// A table whose slot addresses count up from `first_address`.
    /// Addresses carry the Thumb bit so they look like real function
    /// pointers to the plugin.
    #[must_use]
    pub fn with_slots_from(first_address: u32) -> Self {
        let mut slots = [0; 7];
        for (i, slot) in slots.iter_mut().enumerate() {
            *slot = first_address + 4 * i as u32 + 1;
        }
        Self {
            version_major: 1,
            version_minor: 1,
            slots,
        }
    }

    /// The byte image placed in the sandbox's service region.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0; Self::SIZE];
        bytes[0] = self.version_major;
        bytes[1] = self.version_minor;
        bytes[2..4].copy_from_slice(&(self.slots.len() as u16).to_le_bytes());
        for (i, slot) in self.slots.iter().enumerate() {
            bytes[4 + 4 * i..8 + 4 * i].copy_from_slice(&slot.to_le_bytes());
        }
        bytes
    }

    /// Which service a called address belongs to. The Thumb bit is
    /// ignored on both sides.
    #[must_use]
    pub fn service_at(&self, address: u32) -> Option<Service> {
        self.slots
            .iter()
            .position(|&slot| slot & !1 == address & !1)
            .map(|i| Service::ALL[i])
    }
}

/// Why a plugin header failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    Truncated(usize),
    UnsupportedVersion { major: u8, minor: u8 },
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated(len) => write!(
                f,
                "plugin header truncated: {len} bytes (need {})",
                PluginHeader::SIZE
            ),
            Self::UnsupportedVersion { major, minor } => {
                write!(f, "unsupported plugin API version {major}.{minor}")
            }
        }
    }
}

impl std::error::Error for HeaderError {}

/// The header a plugin exports at [`HEADER_ADDRESS`].
///
/// Wire layout: version major/minor (one byte each), function count
/// (u16), required data memory (u32), program address (u32), data
/// address (u32), init-function address (u32).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginHeader {
    pub version_major: u8,
    pub version_minor: u8,
    pub function_count: u16,
    /// Data memory the plugin needs, in bytes.
    pub required_memory: u32,
    /// Where the plugin was linked to run.
    pub program_address: u32,
    /// Where the plugin expects its data memory.
    pub data_address: u32,
    /// Entry point of the plugin's init function (Thumb bit set).
    pub init: u32,
}

impl PluginHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 4 + 4 * 4;

    /// The only header version this host understands.
    pub const VERSION: (u8, u8) = (1, 0);

    pub fn parse(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < Self::SIZE {
            return Err(HeaderError::Truncated(bytes.len()));
        }
        let word = |offset: usize| {
            u32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ])
        };
        let header = Self {
            version_major: bytes[0],
            version_minor: bytes[1],
            function_count: u16::from_le_bytes([bytes[2], bytes[3]]),
            required_memory: word(4),
            program_address: word(8),
            data_address: word(12),
            init: word(16),
        };
        if header.version_major != Self::VERSION.0 {
            return Err(HeaderError::UnsupportedVersion {
                major: header.version_major,
                minor: header.version_minor,
            });
        }
        Ok(header)
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0; Self::SIZE];
        bytes[0] = self.version_major;
        bytes[1] = self.version_minor;
        bytes[2..4].copy_from_slice(&self.function_count.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.required_memory.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.program_address.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.data_address.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.init.to_le_bytes());
        bytes
    }
}
