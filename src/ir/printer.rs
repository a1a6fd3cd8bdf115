//! Textual IR dump, read-only. Debug aid and test oracle; the format is
//! not a contract.

use std::fmt;

use crate::ir::ir::{
    Block, FcmpPred, Func, IcmpPred, Inst, IrConst, IrModule, Opcode, OperandKind, Value,
};
use crate::ir::types::{ArrayDim, BasicType, IrType, TypeKind};

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_const {
            write!(f, "const ")?;
        }
        match &self.kind {
            TypeKind::Basic(b) => {
                let s = match b {
                    BasicType::I1 => "i1",
                    BasicType::I8 => "i8",
                    BasicType::I32 => "i32",
                    BasicType::I64 => "i64",
                    BasicType::F32 => "f32",
                    BasicType::F64 => "f64",
                    BasicType::Void => "void",
                };
                write!(f, "{}", s)
            }
            TypeKind::Pointer(elem) => write!(f, "{}*", elem),
            TypeKind::Array { elem, dims } => {
                fn dims_fmt(
                    f: &mut fmt::Formatter<'_>,
                    elem: &IrType,
                    dims: &[ArrayDim],
                ) -> fmt::Result {
                    match dims.split_first() {
                        None => write!(f, "{}", elem),
                        Some((d, rest)) => {
                            write!(f, "[")?;
                            if d.dynamic {
                                write!(f, "? x ")?;
                            } else {
                                write!(f, "{} x ", d.size)?;
                            }
                            dims_fmt(f, elem, rest)?;
                            write!(f, "]")
                        }
                    }
                }
                dims_fmt(f, elem, dims)
            }
            TypeKind::Function { ret, params, variadic } => {
                write!(f, "{} (", ret)?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                if *variadic {
                    if !params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "...")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for IrConst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrConst::I1(v) => write!(f, "{}", *v as u8),
            IrConst::I8(v) => write!(f, "{}", v),
            IrConst::I32(v) => write!(f, "{}", v),
            IrConst::I64(v) => write!(f, "{}", v),
            IrConst::F32(v) => write!(f, "{:?}", v),
            IrConst::F64(v) => write!(f, "{:?}", v),
        }
    }
}

impl fmt::Display for IcmpPred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IcmpPred::Eq => "eq",
            IcmpPred::Ne => "ne",
            IcmpPred::Slt => "slt",
            IcmpPred::Sle => "sle",
            IcmpPred::Sgt => "sgt",
            IcmpPred::Sge => "sge",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for FcmpPred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FcmpPred::Oeq => "oeq",
            FcmpPred::One => "one",
            FcmpPred::Olt => "olt",
            FcmpPred::Ole => "ole",
            FcmpPred::Ogt => "ogt",
            FcmpPred::Oge => "oge",
        };
        write!(f, "{}", s)
    }
}

fn value_ref(module: &IrModule, v: Value) -> String {
    let data = module.value(v);
    if let Some(c) = data.as_constant() {
        return format!("{}", c);
    }
    match data.name {
        Some(n) => format!("%{}", module.str(n)),
        None => format!("%{}", v),
    }
}

fn operand_ref(module: &IrModule, inst: Inst, index: usize) -> String {
    match module.operands_of(inst).nth(index).map(|op| module.operand(op).kind) {
        Some(OperandKind::Value(v)) => value_ref(module, v),
        Some(OperandKind::Block(b)) => module.str(module.block(b).label).to_string(),
        None => "<missing>".to_string(),
    }
}

fn print_inst(module: &IrModule, out: &mut String, inst: Inst) {
    use std::fmt::Write;
    let data = module.inst(inst);
    out.push_str("  ");
    if data.opcode == Opcode::Tombstone {
        out.push_str("; tombstone\n");
        return;
    }
    if let Some(d) = data.dest {
        let _ = write!(out, "{} = ", value_ref(module, d));
    }
    match data.opcode {
        Opcode::Tombstone => unreachable!(),
        Opcode::Phi => {
            let ty = data.dest.map(|d| module.value(d).ty.clone()).unwrap_or(IrType::void());
            let _ = write!(out, "phi {} ", ty);
            let ops: Vec<_> = module.operands_of(inst).collect();
            for (i, pair) in ops.chunks(2).enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let v = match module.operand(pair[0]).kind {
                    OperandKind::Value(v) => value_ref(module, v),
                    OperandKind::Block(b) => module.str(module.block(b).label).to_string(),
                };
                let b = pair
                    .get(1)
                    .map(|&op| match module.operand(op).kind {
                        OperandKind::Block(b) => module.str(module.block(b).label).to_string(),
                        OperandKind::Value(v) => value_ref(module, v),
                    })
                    .unwrap_or_else(|| "<missing>".to_string());
                let _ = write!(out, "[ {}, {} ]", v, b);
            }
        }
        Opcode::Call => {
            let callee = data.callee.map(|n| module.str(n)).unwrap_or("<unknown>");
            let ty = data
                .dest
                .map(|d| module.value(d).ty.clone())
                .unwrap_or(IrType::void());
            let _ = write!(out, "call {} @{}(", ty, callee);
            for (i, op) in module.operands_of(inst).enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if let OperandKind::Value(v) = module.operand(op).kind {
                    out.push_str(&value_ref(module, v));
                }
            }
            out.push(')');
        }
        Opcode::Br => {
            let _ = write!(out, "br {}", operand_ref(module, inst, 0));
        }
        Opcode::CondBr => {
            let _ = write!(
                out,
                "condbr {}, {}, {}",
                operand_ref(module, inst, 0),
                operand_ref(module, inst, 1),
                operand_ref(module, inst, 2)
            );
        }
        Opcode::Icmp => {
            let pred = data.icmp.expect("icmp carries a predicate");
            let _ = write!(
                out,
                "icmp {} {}, {}",
                pred,
                operand_ref(module, inst, 0),
                operand_ref(module, inst, 1)
            );
        }
        Opcode::Fcmp => {
            let pred = data.fcmp.expect("fcmp carries a predicate");
            let _ = write!(
                out,
                "fcmp {} {}, {}",
                pred,
                operand_ref(module, inst, 0),
                operand_ref(module, inst, 1)
            );
        }
        Opcode::Alloca => {
            let ty = data
                .dest
                .and_then(|d| module.value(d).ty.pointee().cloned())
                .unwrap_or(IrType::void());
            let _ = write!(out, "alloca {}, align {}", ty, data.align);
        }
        op => {
            out.push_str(op.mnemonic());
            for (i, opnd) in module.operands_of(inst).enumerate() {
                out.push_str(if i == 0 { " " } else { ", " });
                match module.operand(opnd).kind {
                    OperandKind::Value(v) => out.push_str(&value_ref(module, v)),
                    OperandKind::Block(b) => {
                        out.push_str(module.str(module.block(b).label));
                    }
                }
            }
        }
    }
    out.push('\n');
}

fn print_block(module: &IrModule, out: &mut String, block: Block) {
    use std::fmt::Write;
    let data = module.block(block);
    let _ = write!(out, "{}:", module.str(data.label));
    if !data.preds.is_empty() {
        let preds: Vec<&str> =
            data.preds.iter().map(|&p| module.str(module.block(p).label)).collect();
        let _ = write!(out, "    ; preds: {}", preds.join(", "));
    }
    out.push('\n');
    for inst in module.insts_of(block) {
        print_inst(module, out, inst);
    }
}

pub fn print_function(module: &IrModule, func: Func) -> String {
    use std::fmt::Write;
    let data = module.func(func);
    let mut out = String::new();
    let _ = write!(out, "fn @{}(", module.str(data.name));
    for (i, &p) in data.params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{} {}", module.value(p).ty, value_ref(module, p));
    }
    if data.variadic {
        out.push_str(", ...");
    }
    let _ = write!(out, ") -> {} {{\n", data.ret_ty);
    for block in module.blocks_of(func) {
        print_block(module, &mut out, block);
    }
    out.push_str("}\n");
    out
}

pub fn print_module(module: &IrModule) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    for &g in &module.globals {
        let data = module.value(g);
        let name = data.name.map(|n| module.str(n)).unwrap_or("?");
        let ty = data.ty.pointee().cloned().unwrap_or(IrType::void());
        let _ = write!(out, "global @{}: {}\n", name, ty);
    }
    if !module.globals.is_empty() {
        out.push('\n');
    }
    for (i, &f) in module.functions.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&print_function(module, f));
    }
    out
}
