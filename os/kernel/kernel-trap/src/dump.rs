//! The fixed-format report written before halting.

use crate::{EscalationReason, ExceptionContext};
use core::fmt::{self, Write};

pub const DUMP_HEADER: &str = "*** UNHANDLED EXCEPTION ***";
pub const DUMP_FOOTER: &str = "System will halt.";

/// Writes the full saved context of an escalated fault to `out`.
///
/// ```text
/// *** UNHANDLED EXCEPTION ***
/// cause: data abort (no handler)
/// pc:    0x0000000040081234  far: 0x0000000000dead00
/// esr:   0x0000000096000007  spsr: 0x00000000000003c5
/// sp:    0x00000000400ff000
/// x00: 0x0000000000000000  x01: ...  x02: ...  x03: ...
/// ...
/// x28: ...  x29: ...  x30: ...
/// System will halt.
/// ```
///
/// # Errors
/// Propagates errors from `out`.
pub fn write_dump(
    out: &mut impl Write,
    ctx: &ExceptionContext,
    reason: EscalationReason,
) -> fmt::Result {
    writeln!(out, "{DUMP_HEADER}")?;
    writeln!(out, "cause: {} ({reason})", ctx.cause())?;
    write!(out, "pc:    {:#018x}  far: ", ctx.pc())?;
    match ctx.fault_address() {
        Some(far) => writeln!(out, "{:#018x}", far.as_u64())?,
        None => writeln!(out, "none")?,
    }
    writeln!(out, "esr:   {:#018x}  spsr: {:#018x}", ctx.syndrome(), ctx.status())?;
    writeln!(out, "sp:    {:#018x}", ctx.sp())?;

    for (row, chunk) in ctx.registers().chunks(4).enumerate() {
        for (col, value) in chunk.iter().enumerate() {
            if col > 0 {
                out.write_str("  ")?;
            }
            write!(out, "x{:02}: {value:#018x}", row * 4 + col)?;
        }
        out.write_char('\n')?;
    }
    writeln!(out, "{DUMP_FOOTER}")
}
