//! Demo runner: assemble small Thumb programs, run them in a sandbox,
//! and print what comes back.
//!
//! Run with `RUST_LOG=debug` to watch service dispatch.

use arm_cortex_m0::{CortexM0, StepResult};
use plugin_api::{PluginHeader, DATA_ADDRESS, HEADER_ADDRESS, PROGRAM_ADDRESS};
use plugin_host::PluginHost;

/// Build a program image from halfwords placed at [`PROGRAM_ADDRESS`].
fn image_with(halfwords: &[u16]) -> Vec<u8> {
    let mut image = vec![0; 0x2000];
    for (i, &halfword) in halfwords.iter().enumerate() {
        image[i * 2..i * 2 + 2].copy_from_slice(&halfword.to_le_bytes());
    }
    image
}

/// Compute 5 + 3 and return it.
fn demo_basic() {
    let program = [
        0x2005, // MOV R0, #5
        0x2103, // MOV R1, #3
        0x1840, // ADD R0, R0, R1
        0x4770, // BX LR
    ];
    let mut host = PluginHost::new(image_with(&program));
    let mut cpu = CortexM0::new();
    host.configure(&mut cpu);
    cpu.start_call(PROGRAM_ADDRESS | 1, &[]);

    match cpu.step(&mut host, 100) {
        StepResult::Returned => println!("basic: returned {} (expected 8)", cpu.return_value()),
        other => println!("basic: did not finish: {other:?}"),
    }
}

/// Call the host's GetUptime service through the service table.
fn demo_service_call() {
    let program = [
        0xB500, // PUSH {LR}
        0x4802, // LDR R0, [PC, #8] -> service table address
        0x6841, // LDR R1, [R0, #4] -> GetUptime slot
        0x4788, // BLX R1
        0xBD00, // POP {PC}
        0x0000, // padding
        0x0300, 0x0000, // literal: SERVICE_TABLE_ADDRESS
    ];
    let mut host = PluginHost::new(image_with(&program));
    let mut cpu = CortexM0::new();
    host.configure(&mut cpu);
    cpu.start_call(PROGRAM_ADDRESS | 1, &[]);

    match cpu.step(&mut host, 100) {
        StepResult::Returned => {
            println!("service: uptime is {} ms", cpu.return_value());
        }
        other => println!("service: did not finish: {other:?}"),
    }
}

/// Load a plugin through its header and run its init function.
fn demo_plugin_header() {
    let program = [
        0x202A, // MOV R0, #42
        0x4770, // BX LR
    ];
    let mut image = image_with(&program);
    let header = PluginHeader {
        version_major: 1,
        version_minor: 0,
        function_count: 1,
        required_memory: 512,
        program_address: PROGRAM_ADDRESS,
        data_address: DATA_ADDRESS,
        init: PROGRAM_ADDRESS | 1,
    };
    let offset = (HEADER_ADDRESS - PROGRAM_ADDRESS) as usize;
    image[offset..offset + PluginHeader::SIZE].copy_from_slice(&header.to_bytes());

    let mut host = PluginHost::new(image);
    let mut cpu = CortexM0::new();
    match host.load_plugin(&mut cpu) {
        Ok(header) => match cpu.step(&mut host, 100) {
            StepResult::Returned => println!(
                "plugin v{}.{}: init returned {}",
                header.version_major,
                header.version_minor,
                cpu.return_value()
            ),
            other => println!("plugin: init did not finish: {other:?}"),
        },
        Err(err) => println!("plugin: load failed: {err}"),
    }
}

fn main() {
    env_logger::init();
    demo_basic();
    demo_service_call();
    demo_plugin_header();
}
