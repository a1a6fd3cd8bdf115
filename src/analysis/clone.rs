//! Instruction cloning with operand remapping, the primitive under
//! inlining, unrolling, and code duplication.

use crate::common::value_map::ValueMap;
use crate::ir::builder::Builder;
use crate::ir::ir::{Inst, InstData, InstFlags, IrModule, Operand, OperandKind};

impl IrModule {
    /// Bare structural copy: same opcode and auxiliary fields, operands
    /// re-added (which wires them into the referenced values' use lists),
    /// `dest` left `None`, detached from any block.
    ///
    /// The caller owns all rewiring. Prefer
    /// [`Builder::clone_inst_with_remap`], which handles the destination
    /// and operand remapping in one step.
    pub fn clone_instruction(&mut self, inst: Inst) -> Inst {
        let new = self.create_inst(clone_shell(self.inst(inst)));
        let kinds: Vec<OperandKind> =
            self.operands_of(inst).map(|op| self.operand(op).kind).collect();
        for k in kinds {
            self.add_operand(new, k);
        }
        new
    }

    /// Rewrite an existing instruction's value operands through `map` in
    /// place; use lists stay correct throughout.
    pub fn remap_instruction_operands(&mut self, inst: Inst, map: &ValueMap) {
        let ops: Vec<Operand> = self.operands_of(inst).collect();
        for op in ops {
            if let OperandKind::Value(v) = self.operand(op).kind {
                let to = map.remap(&self.arena, v);
                if to != v {
                    self.change_operand_value(op, to);
                }
            }
        }
    }
}

/// Copy of the instruction record without operands, links, or
/// destination. The worklist bit never travels with a clone.
fn clone_shell(orig: &InstData) -> InstData {
    let mut data = InstData::new(orig.opcode);
    data.flags = orig.flags & !InstFlags::IN_WORKLIST;
    data.icmp = orig.icmp;
    data.fcmp = orig.fcmp;
    data.align = orig.align;
    data.phi_alloca = orig.phi_alloca;
    data.callee = orig.callee;
    data
}

impl Builder<'_> {
    /// Clone `orig` at the insertion point. A fresh destination register
    /// is minted (named after the original) and `orig.dest -> new dest`
    /// is recorded in `remap`, so later clones see through it. Value
    /// operands are remapped on the way in; block operands are copied
    /// unchanged (block remapping, when needed, happens a layer up).
    pub fn clone_inst_with_remap(&mut self, orig: Inst, remap: &mut ValueMap) -> Inst {
        let shell = clone_shell(self.module.inst(orig));
        let inst = self.module.create_inst(shell);

        if let Some(old_dest) = self.module.inst(orig).dest {
            let ty = self.module.value(old_dest).ty.clone();
            let base = self
                .module
                .value(old_dest)
                .name
                .map(|n| self.module.str(n).to_string());
            let dest = self.fresh_derived_value(ty, base.as_deref());
            self.module.set_inst_dest(inst, dest);
            remap.insert(&self.module.arena, old_dest, dest);
        }

        let block = self.current_block().expect("builder has no insertion block");
        self.module.append_inst(block, inst);

        let kinds: Vec<OperandKind> = self
            .module
            .operands_of(orig)
            .map(|op| self.module.operand(op).kind)
            .collect();
        for k in kinds {
            match k {
                OperandKind::Value(v) => {
                    let v = remap.remap(&self.module.arena, v);
                    self.module.add_operand(inst, OperandKind::Value(v));
                }
                OperandKind::Block(b) => {
                    self.module.add_operand(inst, OperandKind::Block(b));
                }
            }
        }
        inst
    }
}
