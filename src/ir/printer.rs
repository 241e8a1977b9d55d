//! Textual dump of the IR, used by the verbose configuration levels.

use std::fmt;

use itertools::Itertools;

use super::*;

impl Function {
    fn write_inst(&self, f: &mut fmt::Formatter<'_>, id: InstId) -> fmt::Result {
        let inst = self.inst(id);
        write!(f, "  ")?;
        if inst.op.has_lhs() {
            write!(f, "%{} = ", inst.id)?;
        }
        write!(f, "{}", inst.op.name())?;
        match &inst.kind {
            InstKind::Plain { args, nof_args } => {
                for (i, arg) in args[..*nof_args as usize].iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{}%{}", sep, self.inst(*arg).id)?;
                }
            }
            InstKind::Br { dest } => {
                write!(f, " .{}", self.bb(*dest).id)?;
            }
            InstKind::CondBr {
                cond,
                true_bb,
                false_bb,
            } => {
                write!(
                    f,
                    " %{}, .{}, .{}",
                    self.inst(*cond).id,
                    self.bb(*true_bb).id,
                    self.bb(*false_bb).id
                )?;
            }
            InstKind::Phi { args } => {
                let joined = args
                    .iter()
                    .map(|a| format!("[ %{}, .{} ]", self.inst(a.inst).id, self.bb(a.bb).id))
                    .join(", ");
                write!(f, " {}", joined)?;
            }
            InstKind::Value { value } => {
                if *value < 0x10000 {
                    write!(f, " {}, {}", value, inst.bitsize)?;
                } else if *value <= u32::MAX as u128 {
                    write!(f, " {:#010x}, {}", value, inst.bitsize)?;
                } else if *value <= u64::MAX as u128 {
                    write!(f, " {:#018x}, {}", value, inst.bitsize)?;
                } else {
                    write!(
                        f,
                        " 0x{:016x}{:016x}, {}",
                        (value >> 64) as u64,
                        *value as u64,
                        inst.bitsize
                    )?;
                }
            }
        }
        writeln!(f)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "function {}", self.name)?;
        for (i, &bb) in self.bb_order.iter().enumerate() {
            if i != 0 {
                writeln!(f)?;
            }
            writeln!(f, ".{}:", self.bb(bb).id)?;
            for &phi in &self.bb(bb).phis {
                self.write_inst(f, phi)?;
            }
            for &inst in &self.bb(bb).insts {
                self.write_inst(f, inst)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "config {}, {}, {}",
            self.ptr.bits, self.ptr.id_bits, self.ptr.offset_bits
        )?;
        for func in &self.functions {
            writeln!(f)?;
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}
