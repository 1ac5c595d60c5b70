//! Textual display of IR for debugging.

use super::{Function, Module, Op, Value};
use std::fmt;

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        writeln!(f, ") -> {} {{", self.ret)?;

        for (block_id, block) in self.blocks.iter_enumerated() {
            writeln!(f, "bb{}:", block_id.index())?;
            for &inst_id in &block.instructions {
                let inst = &self.instructions[inst_id];
                write!(f, "    ")?;
                if let Some(result) = inst.result {
                    write!(f, "v{} = ", result.index())?;
                }
                write!(f, "{}", inst.op.mnemonic())?;
                match &inst.op {
                    Op::Phi(incoming) => {
                        for (i, (block, value)) in incoming.iter().enumerate() {
                            let sep = if i > 0 { "," } else { "" };
                            write!(f, "{sep} [bb{}: v{}]", block.index(), value.index())?;
                        }
                    }
                    Op::CompositeExtract { object, indices } => {
                        write!(f, " v{}", object.index())?;
                        for idx in indices {
                            write!(f, ", {idx}")?;
                        }
                    }
                    Op::CompositeInsert { value, object, indices } => {
                        write!(f, " v{}, v{}", value.index(), object.index())?;
                        for idx in indices {
                            write!(f, ", {idx}")?;
                        }
                    }
                    op => {
                        for (i, operand) in op.operands().iter().enumerate() {
                            let sep = if i > 0 { "," } else { "" };
                            write!(f, "{sep} v{}", operand.index())?;
                        }
                    }
                }
                writeln!(f)?;
            }
            if let Some(term) = &block.terminator {
                writeln!(f, "    {term}")?;
            }
        }

        writeln!(f, "}}")?;

        let mut wrote_header = false;
        for (value_id, value) in self.values.iter_enumerated() {
            let text = match value {
                Value::Const(c) => format!("const {c}"),
                Value::Param { index, ty } => format!("param {index}: {ty}"),
                Value::Undef(ty) => format!("undef {ty}"),
                Value::Inst(_) => continue,
            };
            if !wrote_header {
                writeln!(f, "where")?;
                wrote_header = true;
            }
            writeln!(f, "    v{} = {text}", value_id.index())?;
        }
        Ok(())
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {}", self.name)?;
        for func in self.functions() {
            writeln!(f, "\n{func}")?;
        }
        Ok(())
    }
}
