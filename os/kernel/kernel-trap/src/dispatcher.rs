use crate::dump::write_dump;
use crate::{
    CauseClass, EscalationReason, ExceptionContext, FaultEscalation, Installed, TrapError,
    TrapFrame, VectorInstaller, VectorKind,
};
use core::fmt;
use kernel_info::boot::Arch;
use kernel_memory_addresses::VirtualAddress;
use kernel_registers::aarch64::Esr;
use log::{debug, error, info, trace, warn};

/// What a handler decided about the fault it was given.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Disposition {
    /// Continue with the (possibly edited) context.
    Resume,
    /// Give up; the fault escalates and the system halts.
    Decline,
}

/// A per-cause fault handler.
pub type FaultHandler = fn(&mut ExceptionContext) -> Disposition;

/// Lifecycle of one fault through the dispatcher.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DispatchState {
    Running,
    Trapped,
    Dispatching,
    Resuming,
    Escalating,
    Halted,
}

/// Summary of the most recent fault, taken when it was
/// [`Trapped`](DispatchState::Trapped).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DispatchRecord {
    pub cause: CauseClass,
    pub pc: u64,
    pub fault_address: Option<VirtualAddress>,
}

/// Routes trapped exceptions to per-cause handlers.
///
/// The handler table is indexed by [`CauseClass::index`]; at most one
/// handler exists per class. Faults without a handler, or whose handler
/// declines, are written to the sink `S` and the dispatcher halts for good.
pub struct FaultDispatcher<S> {
    arch: Arch,
    handlers: [Option<FaultHandler>; CauseClass::COUNT],
    state: DispatchState,
    installed: bool,
    last: Option<DispatchRecord>,
    faults: u64,
    sink: S,
}

impl<S: fmt::Write> FaultDispatcher<S> {
    #[must_use]
    pub const fn new(arch: Arch, sink: S) -> Self {
        Self {
            arch,
            handlers: [None; CauseClass::COUNT],
            state: DispatchState::Running,
            installed: false,
            last: None,
            faults: 0,
            sink,
        }
    }

    /// Installs the trap vectors and returns the [`Installed`] witness
    /// required by the memory services.
    ///
    /// # Errors
    /// Propagates the installer's failure; the dispatcher stays uninstalled.
    pub fn install<V: VectorInstaller>(&mut self, vectors: &mut V) -> Result<Installed, TrapError> {
        vectors.install()?;
        self.installed = true;
        info!(
            "fault dispatcher installed ({:?}, {} handlers registered)",
            self.arch,
            self.handlers.iter().flatten().count()
        );
        Ok(Installed::new())
    }

    #[must_use]
    pub const fn is_installed(&self) -> bool {
        self.installed
    }

    /// Registers `handler` for `class`, returning the handler it replaces.
    pub fn register(&mut self, class: CauseClass, handler: FaultHandler) -> Option<FaultHandler> {
        let previous = self.handlers[class.index()].replace(handler);
        debug!(
            "{class} handler {}",
            if previous.is_some() { "replaced" } else { "registered" }
        );
        previous
    }

    /// Removes the handler for `class`; faults of that class escalate again.
    pub const fn unregister(&mut self, class: CauseClass) -> Option<FaultHandler> {
        self.handlers[class.index()].take()
    }

    #[must_use]
    pub const fn handler(&self, class: CauseClass) -> Option<FaultHandler> {
        self.handlers[class.index()]
    }

    #[must_use]
    pub const fn state(&self) -> DispatchState {
        self.state
    }

    #[must_use]
    pub const fn last_dispatch(&self) -> Option<&DispatchRecord> {
        self.last.as_ref()
    }

    /// Number of faults that reached the dispatcher.
    #[must_use]
    pub const fn fault_count(&self) -> u64 {
        self.faults
    }

    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Decodes a raw trap for this dispatcher's architecture and dispatches it.
    ///
    /// `vector` is the vector-table entry index on aarch64 and the exception
    /// vector number on `x86_64`; the syndrome is taken from the frame.
    ///
    /// # Errors
    /// See [`FaultDispatcher::dispatch`].
    pub fn dispatch_trap(&mut self, frame: &mut TrapFrame, vector: u64) -> Result<(), FaultEscalation> {
        let cause = match self.arch {
            Arch::Aarch64 => CauseClass::from_aarch64(
                VectorKind::from_entry(vector),
                Esr::from_bits(frame.syndrome),
            ),
            Arch::X86_64 => match u8::try_from(vector) {
                Ok(v) => CauseClass::from_x86_64(v, frame.syndrome),
                Err(_) => CauseClass::Other,
            },
        };
        self.dispatch(frame, cause)
    }

    /// Runs the handler registered for `cause`.
    ///
    /// On `Ok` the frame holds the context to resume with.
    ///
    /// # Errors
    /// Returns the escalation after the diagnostic dump was written; the
    /// dispatcher is [`Halted`](DispatchState::Halted) from then on and the
    /// caller must not return to the interrupted code.
    pub fn dispatch(&mut self, frame: &mut TrapFrame, cause: CauseClass) -> Result<(), FaultEscalation> {
        self.faults += 1;
        let mut ctx = ExceptionContext::new(*frame, cause);

        if self.state == DispatchState::Halted {
            return Err(self.escalate(&ctx, EscalationReason::Halted));
        }

        self.state = DispatchState::Trapped;
        self.last = Some(DispatchRecord {
            cause,
            pc: ctx.pc(),
            fault_address: ctx.fault_address(),
        });
        trace!("{cause} at pc {:#x}", ctx.pc());
        if !self.installed {
            return Err(self.escalate(&ctx, EscalationReason::NotInstalled));
        }

        self.state = DispatchState::Dispatching;
        let Some(handler) = self.handlers[cause.index()] else {
            return Err(self.escalate(&ctx, EscalationReason::NoHandler));
        };

        match handler(&mut ctx) {
            Disposition::Resume => {
                self.state = DispatchState::Resuming;
                *frame = ctx.into_frame();
                self.state = DispatchState::Running;
                Ok(())
            }
            Disposition::Decline => Err(self.escalate(&ctx, EscalationReason::Declined)),
        }
    }

    fn escalate(&mut self, ctx: &ExceptionContext, reason: EscalationReason) -> FaultEscalation {
        self.state = DispatchState::Escalating;
        error!("{} at pc {:#x}: {reason}", ctx.cause(), ctx.pc());
        let dump_written = write_dump(&mut self.sink, ctx, reason).is_ok();
        if !dump_written {
            warn!("fault dump for {} at pc {:#x} was cut short by the sink", ctx.cause(), ctx.pc());
        }
        self.state = DispatchState::Halted;
        FaultEscalation {
            cause: ctx.cause(),
            pc: ctx.pc(),
            fault_address: ctx.fault_address(),
            reason,
            dump_written,
        }
    }
}

impl<S> fmt::Debug for FaultDispatcher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultDispatcher")
            .field("arch", &self.arch)
            .field("state", &self.state)
            .field("installed", &self.installed)
            .field("faults", &self.faults)
            .finish_non_exhaustive()
    }
}
