//! Whole-call tests: session lifecycle, the return sentinel, host
//! function-call interception, and error termination.

use arm_cortex_m0::{
    CortexM0, Dispatch, Fault, Host, Region, StepResult, LR, PC, RETURN_SENTINEL,
};

const PROGRAM_BASE: u32 = 0x6000;
const PROGRAM_SIZE: u32 = 0x1000;
const DATA_BASE: u32 = 0x1000_0200;
const DATA_SIZE: u32 = 0x400;

/// Address the demo host publishes for its "print" function (Thumb bit
/// set, outside program memory) and for its "add" function.
const PRINT_FN: u32 = 0x101;
const ADD_FN: u32 = 0x105;

/// Host with a program image and two intercepted functions.
struct CallHost {
    image: Vec<u8>,
    calls: Vec<u32>,
    handle_calls: bool,
}

impl CallHost {
    fn with_program(halfwords: &[u16]) -> Self {
        let mut image = vec![0; PROGRAM_SIZE as usize];
        for (i, &halfword) in halfwords.iter().enumerate() {
            image[i * 2..i * 2 + 2].copy_from_slice(&halfword.to_le_bytes());
        }
        Self {
            image,
            calls: Vec::new(),
            handle_calls: true,
        }
    }
}

impl Host for CallHost {
    fn read_program_memory(&mut self, buf: &mut [u8], addr: u32) -> Result<(), Fault> {
        let offset = addr.wrapping_sub(PROGRAM_BASE) as usize;
        let end = offset + buf.len();
        if end > self.image.len() {
            return Err(Fault);
        }
        buf.copy_from_slice(&self.image[offset..end]);
        Ok(())
    }

    fn function_call(&mut self, cpu: &mut CortexM0, target: u32) -> Dispatch {
        self.calls.push(target);
        if !self.handle_calls {
            return Dispatch::Unhandled;
        }
        match target & !1 {
            a if a == PRINT_FN & !1 => {
                cpu.regs.r[0] = 0;
                Dispatch::Handled
            }
            a if a == ADD_FN & !1 => {
                cpu.regs.r[0] = cpu.regs.r[0].wrapping_add(cpu.regs.r[1]);
                Dispatch::Handled
            }
            _ => Dispatch::Unhandled,
        }
    }
}

fn sandbox() -> CortexM0 {
    let mut cpu = CortexM0::new();
    cpu.configure(
        Region::new(PROGRAM_BASE, PROGRAM_SIZE),
        Region::new(DATA_BASE, DATA_SIZE),
        0,
        &[],
    );
    cpu
}

#[test]
fn add_two_numbers_and_return() {
    // MOV R0, #5 / MOV R1, #3 / ADD R0, R0, R1 / BX LR
    let mut host = CallHost::with_program(&[0x2005, 0x2103, 0x1840, 0x4770]);
    let mut cpu = sandbox();
    cpu.start_call(PROGRAM_BASE | 1, &[]);

    // Three instructions leave it running, the BX LR returns
    assert_eq!(cpu.step(&mut host, 1), StepResult::Running);
    assert_eq!(cpu.step(&mut host, 1), StepResult::Running);
    assert_eq!(cpu.step(&mut host, 1), StepResult::Running);
    assert_eq!(cpu.step(&mut host, 1), StepResult::Returned);
    assert_eq!(cpu.return_value(), 8);
    assert_eq!(cpu.regs.lr(), RETURN_SENTINEL, "LR survives the round trip");
}

#[test]
fn budget_covers_the_whole_call() {
    let mut host = CallHost::with_program(&[0x2005, 0x2103, 0x1840, 0x4770]);
    let mut cpu = sandbox();
    cpu.start_call(PROGRAM_BASE | 1, &[]);
    assert_eq!(cpu.step(&mut host, 100), StepResult::Returned);
    assert_eq!(cpu.return_value(), 8);
}

#[test]
fn budget_exhaustion_reports_running() {
    // B .: a branch to itself
    let mut host = CallHost::with_program(&[0xE7FE]);
    let mut cpu = sandbox();
    cpu.start_call(PROGRAM_BASE | 1, &[]);
    assert_eq!(cpu.step(&mut host, 5), StepResult::Running);
    assert_eq!(cpu.regs.pc(), PROGRAM_BASE, "the loop never moves");
}

#[test]
fn arguments_arrive_in_r0_to_r3() {
    // ADD R0, R0, R1 / BX LR
    let mut host = CallHost::with_program(&[0x1840, 0x4770]);
    let mut cpu = sandbox();
    cpu.start_call(PROGRAM_BASE | 1, &[30, 12]);
    assert_eq!(cpu.regs.r[0], 30);
    assert_eq!(cpu.regs.r[1], 12);
    assert_eq!(cpu.regs.r[2], 0);
    assert_eq!(cpu.regs.sp(), DATA_BASE + DATA_SIZE);
    assert_eq!(cpu.regs.pc(), PROGRAM_BASE, "entry Thumb bit is stripped");
    assert_eq!(cpu.step(&mut host, 10), StepResult::Returned);
    assert_eq!(cpu.return_value(), 42);
}

#[test]
fn intercepted_service_calls() {
    // The callbacks demo program: calls "print" and "add" through
    // function pointers held in a literal pool, returning via POP {PC}.
    let program = [
        0xB500, // PUSH {LR}
        0x202A, // MOV R0, #42
        0x4903, // LDR R1, [PC, #12] -> literal at +0x14
        0x4788, // BLX R1 (print)
        0x200A, // MOV R0, #10
        0x2114, // MOV R1, #20
        0x4A02, // LDR R2, [PC, #8] -> literal at +0x18
        0x4790, // BLX R2 (add)
        0xBD00, // POP {PC}
        0x0000, // padding
        0x0101, 0x0000, // PRINT_FN
        0x0105, 0x0000, // ADD_FN
    ];
    let mut host = CallHost::with_program(&program);
    let mut cpu = sandbox();
    cpu.start_call(PROGRAM_BASE | 1, &[]);

    assert_eq!(cpu.step(&mut host, 100), StepResult::Returned);
    assert_eq!(cpu.return_value(), 30, "add(10, 20) via the host");
    assert_eq!(host.calls, vec![PRINT_FN, ADD_FN]);
}

#[test]
fn handled_call_resumes_at_lr() {
    // BLX R1 straight to the host, then MOV R2, #7 must still run
    let program = [
        0x4902, // LDR R1, [PC, #8] -> literal at +0x0C
        0x4788, // BLX R1
        0x2207, // MOV R2, #7
        0x4770, // BX LR
        0x0000, 0x0000, // padding
        0x0101, 0x0000, // PRINT_FN
    ];
    let mut host = CallHost::with_program(&program);
    let mut cpu = sandbox();
    cpu.start_call(PROGRAM_BASE | 1, &[]);

    assert_eq!(cpu.step(&mut host, 100), StepResult::Returned);
    assert_eq!(host.calls, vec![PRINT_FN]);
    assert_eq!(cpu.regs.r[2], 7, "execution resumed after the call");
}

#[test]
fn handled_call_with_sentinel_lr_returns() {
    // The entry point itself is a host function: start_call seeds LR
    // with the sentinel, so a handled call is the whole invocation.
    let mut host = CallHost::with_program(&[]);
    let mut cpu = sandbox();
    cpu.start_call(PROGRAM_BASE | 1, &[]);
    // BX R1 to a host function as the first instruction
    host.image[0..2].copy_from_slice(&0x4708_u16.to_le_bytes()); // BX R1
    cpu.regs.r[1] = PRINT_FN;
    assert_eq!(cpu.step(&mut host, 10), StepResult::Returned);
    assert_eq!(cpu.return_value(), 0);
}

#[test]
fn unhandled_call_faults_on_next_fetch() {
    let program = [
        0x4901, // LDR R1, [PC, #4] -> literal at +0x08
        0x4788, // BLX R1
        0x0000, // padding
        0x0000,
        0xBEEF, 0x000B, // literal 0x000B_BEEF: nowhere
    ];
    let mut host = CallHost::with_program(&program);
    host.handle_calls = false;
    let mut cpu = sandbox();
    cpu.start_call(PROGRAM_BASE | 1, &[]);

    assert_eq!(cpu.step(&mut host, 10), StepResult::Error);
    assert_eq!(host.calls, vec![0x000B_BEEF]);
    assert_eq!(cpu.regs.pc(), 0x000B_BEEE, "branch landed, fetch failed");
}

#[test]
fn pop_of_sentinel_is_a_return() {
    // PUSH {LR} / POP {PC}: the popped sentinel terminates the call
    let mut host = CallHost::with_program(&[0xB500, 0xBD00]);
    let mut cpu = sandbox();
    cpu.start_call(PROGRAM_BASE | 1, &[]);
    assert_eq!(cpu.step(&mut host, 10), StepResult::Returned);
    assert_eq!(cpu.regs.sp(), DATA_BASE + DATA_SIZE, "stack balanced");
}

#[test]
fn msr_and_mrs_transfer_the_flag_nibble() {
    let program = [
        0xF380, 0x8800, // MSR APSR, R0
        0xF3EF, 0x8100, // MRS R1, APSR
        0x4770, // BX LR
    ];
    let mut host = CallHost::with_program(&program);
    let mut cpu = sandbox();
    cpu.start_call(PROGRAM_BASE | 1, &[0xFFFF_FFFF]);

    assert_eq!(cpu.step(&mut host, 1), StepResult::Running);
    assert_eq!(cpu.regs.apsr, 0xF000_0000, "only the top nibble lands");
    assert_eq!(cpu.regs.r[PC], PROGRAM_BASE + 4, "32-bit op advances PC by 4");
    assert_eq!(cpu.step(&mut host, 10), StepResult::Returned);
    assert_eq!(cpu.regs.r[1], 0xF000_0000);
}

#[test]
fn barriers_and_hints_are_ignored() {
    let program = [
        0xF3BF, 0x8F4F, // DSB SY
        0xF3BF, 0x8F5F, // DMB SY
        0xF3BF, 0x8F6F, // ISB SY
        0xBF00, // NOP
        0xB662, // CPSIE i
        0xB672, // CPSID i
        0xBE00, // BKPT #0
        0x4770, // BX LR
    ];
    let mut host = CallHost::with_program(&program);
    let mut cpu = sandbox();
    cpu.start_call(PROGRAM_BASE | 1, &[]);
    assert_eq!(cpu.step(&mut host, 100), StepResult::Returned);
}

#[test]
fn svc_and_udf_are_errors() {
    for halfword in [0xDF00_u16, 0xDE00] {
        let mut host = CallHost::with_program(&[halfword]);
        let mut cpu = sandbox();
        cpu.start_call(PROGRAM_BASE | 1, &[]);
        assert_eq!(cpu.step(&mut host, 1), StepResult::Error, "{halfword:#06X}");
    }
}

#[test]
fn unsupported_32bit_forms_are_errors() {
    // MSR with a nonzero system-register field, and a would-be LDM.W
    for pair in [[0xF380_u16, 0x8808], [0xE8B0, 0x0003], [0xF3EF, 0x8105]] {
        let mut host = CallHost::with_program(&pair);
        let mut cpu = sandbox();
        cpu.start_call(PROGRAM_BASE | 1, &[]);
        assert_eq!(
            cpu.step(&mut host, 1),
            StepResult::Error,
            "{:#06X} {:#06X}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn bx_from_pc_is_rejected() {
    let mut host = CallHost::with_program(&[0x4778]); // BX PC
    let mut cpu = sandbox();
    cpu.start_call(PROGRAM_BASE | 1, &[]);
    assert_eq!(cpu.step(&mut host, 1), StepResult::Error);
}

#[test]
fn misaligned_and_unmapped_accesses_are_errors() {
    // LDR R0, [R1, #0] with R1 halfword-aligned
    let mut host = CallHost::with_program(&[0x6808]);
    let mut cpu = sandbox();
    cpu.start_call(PROGRAM_BASE | 1, &[]);
    cpu.regs.r[1] = DATA_BASE + 2;
    assert_eq!(cpu.step(&mut host, 1), StepResult::Error);

    // Same load from an address no region claims
    let mut host = CallHost::with_program(&[0x6808]);
    let mut cpu = sandbox();
    cpu.start_call(PROGRAM_BASE | 1, &[]);
    cpu.regs.r[1] = 0x4000_0000;
    assert_eq!(cpu.step(&mut host, 1), StepResult::Error);
}

#[test]
fn configure_zeroes_data_memory() {
    let mut cpu = sandbox();
    cpu.start_call(PROGRAM_BASE | 1, &[]);
    cpu.memory.write32(DATA_BASE, 0xDEAD_BEEF).expect("in data");
    cpu.configure(
        Region::new(PROGRAM_BASE, PROGRAM_SIZE),
        Region::new(DATA_BASE, DATA_SIZE),
        0,
        &[],
    );
    let mut host = CallHost::with_program(&[]);
    assert_eq!(cpu.memory.read32(&mut host, DATA_BASE), Ok(0));
    assert_eq!(cpu.regs.r[LR], 0, "registers reset with the map");
}
