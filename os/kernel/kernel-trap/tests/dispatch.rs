use kernel_info::boot::Arch;
use kernel_memory_addresses::VirtualAddress;
use kernel_trap::dump::{DUMP_FOOTER, DUMP_HEADER};
use kernel_trap::{
    CauseClass, DispatchState, Disposition, EscalationReason, ExceptionContext, FaultDispatcher,
    TrapError, TrapFrame, VectorInstaller,
};

#[derive(Default)]
struct FakeVectors {
    reject: bool,
    installs: usize,
}

impl VectorInstaller for FakeVectors {
    fn install(&mut self) -> Result<(), TrapError> {
        self.installs += 1;
        if self.reject {
            Err(TrapError::VectorInstallFailed)
        } else {
            Ok(())
        }
    }
}

fn installed_dispatcher() -> FaultDispatcher<String> {
    let mut dispatcher = FaultDispatcher::new(Arch::Aarch64, String::new());
    dispatcher
        .install(&mut FakeVectors::default())
        .expect("fake vectors install");
    dispatcher
}

/// A synchronous data abort at `far`, as the aarch64 vector stub saves it.
fn data_abort_frame(far: u64) -> TrapFrame {
    let mut frame = TrapFrame {
        pc: 0x4008_2000,
        sp: 0x400F_F000,
        status: 0x3C5,
        syndrome: 0x9600_0007, // EC=0x25, DFSC=translation fault L3
        fault_address: far,
        ..TrapFrame::default()
    };
    for (i, r) in frame.gpr.iter_mut().enumerate() {
        *r = i as u64;
    }
    frame
}

fn skip_instruction(ctx: &mut ExceptionContext) -> Disposition {
    ctx.advance_pc(4);
    ctx.registers_mut()[0] = 0xFFFF;
    Disposition::Resume
}

fn decline(_: &mut ExceptionContext) -> Disposition {
    Disposition::Decline
}

#[test]
fn failed_installation_yields_no_witness() {
    let mut dispatcher = FaultDispatcher::new(Arch::Aarch64, String::new());
    let mut vectors = FakeVectors {
        reject: true,
        ..FakeVectors::default()
    };
    assert_eq!(
        dispatcher.install(&mut vectors).unwrap_err(),
        TrapError::VectorInstallFailed
    );
    assert!(!dispatcher.is_installed());
}

#[test]
fn fault_before_installation_escalates() {
    let mut dispatcher = FaultDispatcher::new(Arch::Aarch64, String::new());
    dispatcher.register(CauseClass::DataAbort, skip_instruction);

    let mut frame = data_abort_frame(0x1000);
    let err = dispatcher.dispatch_trap(&mut frame, 0).unwrap_err();
    assert_eq!(err.reason, EscalationReason::NotInstalled);
    assert_eq!(dispatcher.state(), DispatchState::Halted);

    let record = dispatcher.last_dispatch().expect("trapped faults are recorded");
    assert_eq!(record.pc, 0x4008_2000);
    assert_eq!(record.fault_address, Some(VirtualAddress::new(0x1000)));
}

/// A sink that accepts `room` bytes and then fails.
struct ShortSink {
    room: usize,
}

impl core::fmt::Write for ShortSink {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.room = self.room.checked_sub(s.len()).ok_or(core::fmt::Error)?;
        Ok(())
    }
}

#[test]
fn failing_sink_still_escalates() {
    let mut dispatcher = FaultDispatcher::new(Arch::Aarch64, ShortSink { room: 16 });
    dispatcher
        .install(&mut FakeVectors::default())
        .expect("fake vectors install");

    let mut frame = data_abort_frame(0x2000);
    let err = dispatcher.dispatch_trap(&mut frame, 4).unwrap_err();
    assert!(!err.dump_written);
    assert_eq!(err.reason, EscalationReason::NoHandler);
    assert_eq!(dispatcher.state(), DispatchState::Halted);
}

#[test]
fn data_abort_outside_mappings_reports_exact_address() {
    let mut dispatcher = installed_dispatcher();
    let far = 0x0000_7FFF_DEAD_B000;
    let mut frame = data_abort_frame(far);

    let err = dispatcher.dispatch_trap(&mut frame, 4).unwrap_err();

    let record = dispatcher.last_dispatch().expect("fault reached dispatching");
    assert_eq!(record.cause, CauseClass::DataAbort);
    assert_eq!(record.fault_address, Some(VirtualAddress::new(far)));
    assert_eq!(err.cause, CauseClass::DataAbort);
    assert_eq!(err.fault_address, Some(VirtualAddress::new(far)));
    assert_eq!(err.reason, EscalationReason::NoHandler);
    assert!(err.dump_written);
    assert_eq!(dispatcher.state(), DispatchState::Halted);
}

#[test]
fn resume_writes_edited_context_back() {
    let mut dispatcher = installed_dispatcher();
    assert!(dispatcher.register(CauseClass::DataAbort, skip_instruction).is_none());

    let mut frame = data_abort_frame(0x1234_5000);
    dispatcher.dispatch_trap(&mut frame, 0).expect("handled");

    assert_eq!(frame.pc, 0x4008_2004);
    assert_eq!(frame.gpr[0], 0xFFFF);
    assert_eq!(frame.gpr[30], 30);
    assert_eq!(dispatcher.state(), DispatchState::Running);
    assert!(dispatcher.sink().is_empty());
}

#[test]
fn reregistration_replaces_handler() {
    let mut dispatcher = installed_dispatcher();
    dispatcher.register(CauseClass::DataAbort, decline);
    let previous = dispatcher.register(CauseClass::DataAbort, skip_instruction);
    assert!(previous.is_some_and(|h| h as usize == decline as usize));

    let mut frame = data_abort_frame(0x2000);
    assert!(dispatcher.dispatch_trap(&mut frame, 0).is_ok());

    assert!(dispatcher.unregister(CauseClass::DataAbort).is_some());
    assert!(dispatcher.handler(CauseClass::DataAbort).is_none());
}

#[test]
fn declined_fault_dumps_context_and_halts() {
    let mut dispatcher = installed_dispatcher();
    dispatcher.register(CauseClass::DataAbort, decline);

    let mut frame = data_abort_frame(0xdead_b000);
    let before = frame;
    let err = dispatcher.dispatch_trap(&mut frame, 0).unwrap_err();
    assert_eq!(err.reason, EscalationReason::Declined);
    assert_eq!(frame, before, "declined faults must not modify the frame");

    let dump = dispatcher.sink();
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines[0], DUMP_HEADER);
    assert_eq!(lines[1], "cause: data abort (handler declined)");
    assert_eq!(lines[2], "pc:    0x0000000040082000  far: 0x00000000deadb000");
    assert_eq!(lines[3], "esr:   0x0000000096000007  spsr: 0x00000000000003c5");
    assert_eq!(lines[4], "sp:    0x00000000400ff000");
    assert!(lines[5].starts_with("x00: 0x0000000000000000  x01: 0x0000000000000001"));
    assert_eq!(
        lines[12],
        "x28: 0x000000000000001c  x29: 0x000000000000001d  x30: 0x000000000000001e"
    );
    assert_eq!(lines[13], DUMP_FOOTER);
    assert_eq!(lines.len(), 14);
}

#[test]
fn halted_dispatcher_refuses_further_faults() {
    let mut dispatcher = installed_dispatcher();
    let mut frame = data_abort_frame(0x3000);
    assert!(dispatcher.dispatch_trap(&mut frame, 0).is_err());

    dispatcher.register(CauseClass::DataAbort, skip_instruction);
    let err = dispatcher.dispatch_trap(&mut frame, 0).unwrap_err();
    assert_eq!(err.reason, EscalationReason::Halted);
    assert_eq!(dispatcher.fault_count(), 2);
}

#[test]
fn interrupt_has_no_fault_address() {
    let mut dispatcher = installed_dispatcher();
    let mut frame = data_abort_frame(0x4000);
    let err = dispatcher.dispatch_trap(&mut frame, 1).unwrap_err();
    assert_eq!(err.cause, CauseClass::Interrupt);
    assert_eq!(err.fault_address, None);
    assert!(dispatcher.sink().contains("far: none"));
}

#[test]
fn x86_64_page_fault_is_decoded_from_error_code() {
    let mut dispatcher = FaultDispatcher::new(Arch::X86_64, String::new());
    dispatcher.install(&mut FakeVectors::default()).unwrap();
    dispatcher.register(CauseClass::InstructionAbort, skip_instruction);

    let mut frame = TrapFrame {
        syndrome: 1 << 4,
        fault_address: 0xFFFF_8000_0010_0000,
        ..TrapFrame::default()
    };
    dispatcher.dispatch_trap(&mut frame, 14).expect("instruction fetch fault handled");
    assert_eq!(
        dispatcher.last_dispatch().unwrap().fault_address,
        Some(VirtualAddress::new(0xFFFF_8000_0010_0000))
    );
}
