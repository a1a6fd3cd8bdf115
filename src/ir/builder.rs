//! Convenience layer for constructing IR.
//!
//! The builder keeps an insertion block and appends instructions to it,
//! minting destination registers with deterministic names from the
//! function's counter. Terminator builders also wire the CFG edge arrays,
//! so code built through here satisfies the symmetry invariant without
//! extra steps.

use crate::ir::ir::{
    Block, Func, FcmpPred, IcmpPred, Inst, InstData, InstFlags, IrConst, IrModule, Opcode,
    OperandKind, Value,
};
use crate::ir::types::IrType;

pub struct Builder<'a> {
    pub module: &'a mut IrModule,
    func: Func,
    block: Option<Block>,
}

impl<'a> Builder<'a> {
    pub fn new(module: &'a mut IrModule, func: Func) -> Self {
        Self { module, func, block: None }
    }

    pub fn func(&self) -> Func {
        self.func
    }

    pub fn create_block(&mut self, label: &str) -> Block {
        self.module.create_block(self.func, label)
    }

    pub fn switch_to_block(&mut self, block: Block) {
        self.block = Some(block);
    }

    pub fn current_block(&self) -> Option<Block> {
        self.block
    }

    pub fn param(&self, index: usize) -> Value {
        self.module.func(self.func).params[index]
    }

    // ---- constants ----------------------------------------------------

    pub fn const_i1(&mut self, v: bool) -> Value {
        self.module.new_const(IrConst::I1(v))
    }

    pub fn const_i32(&mut self, v: i32) -> Value {
        self.module.new_const(IrConst::I32(v))
    }

    pub fn const_i64(&mut self, v: i64) -> Value {
        self.module.new_const(IrConst::I64(v))
    }

    pub fn const_f32(&mut self, v: f32) -> Value {
        self.module.new_const(IrConst::F32(v))
    }

    pub fn const_f64(&mut self, v: f64) -> Value {
        self.module.new_const(IrConst::F64(v))
    }

    // ---- plumbing -----------------------------------------------------

    fn cur(&self) -> Block {
        self.block.expect("builder has no insertion block")
    }

    /// Fresh destination register named from the function counter.
    pub(crate) fn fresh_value(&mut self, ty: IrType) -> Value {
        let n = self.module.func(self.func).next_temp;
        self.module.func_mut(self.func).next_temp = n + 1;
        let name = self.module.intern(&format!("t{}", n));
        self.module.new_register(ty, Some(name))
    }

    /// A fresh register whose name extends `base`, for cloned
    /// instructions.
    pub(crate) fn fresh_derived_value(&mut self, ty: IrType, base: Option<&str>) -> Value {
        let n = self.module.func(self.func).next_temp;
        self.module.func_mut(self.func).next_temp = n + 1;
        let name = match base {
            Some(b) => self.module.intern(&format!("{}.{}", b, n)),
            None => self.module.intern(&format!("t{}", n)),
        };
        self.module.new_register(ty, Some(name))
    }

    fn emit(&mut self, data: InstData, result_ty: Option<IrType>) -> (Inst, Option<Value>) {
        let block = self.cur();
        let inst = self.module.create_inst(data);
        let dest = result_ty.map(|ty| {
            let v = self.fresh_value(ty);
            self.module.set_inst_dest(inst, v);
            v
        });
        self.module.append_inst(block, inst);
        (inst, dest)
    }

    // ---- arithmetic and casts -----------------------------------------

    /// Two-operand arithmetic; the result takes the left operand's type.
    pub fn binary(&mut self, op: Opcode, lhs: Value, rhs: Value) -> Value {
        let ty = self.module.value(lhs).ty.clone();
        let (inst, dest) = self.emit(InstData::new(op), Some(ty));
        self.module.add_operand(inst, OperandKind::Value(lhs));
        self.module.add_operand(inst, OperandKind::Value(rhs));
        dest.expect("binary defines a value")
    }

    pub fn unary(&mut self, op: Opcode, v: Value) -> Value {
        let ty = self.module.value(v).ty.clone();
        let (inst, dest) = self.emit(InstData::new(op), Some(ty));
        self.module.add_operand(inst, OperandKind::Value(v));
        dest.expect("unary defines a value")
    }

    pub fn cast(&mut self, op: Opcode, v: Value, to: IrType) -> Value {
        let (inst, dest) = self.emit(InstData::new(op), Some(to));
        self.module.add_operand(inst, OperandKind::Value(v));
        dest.expect("cast defines a value")
    }

    pub fn copy(&mut self, v: Value) -> Value {
        self.unary(Opcode::Copy, v)
    }

    pub fn icmp(&mut self, pred: IcmpPred, lhs: Value, rhs: Value) -> Value {
        let mut data = InstData::new(Opcode::Icmp);
        data.icmp = Some(pred);
        let (inst, dest) = self.emit(data, Some(IrType::i1()));
        self.module.add_operand(inst, OperandKind::Value(lhs));
        self.module.add_operand(inst, OperandKind::Value(rhs));
        dest.expect("icmp defines a value")
    }

    pub fn fcmp(&mut self, pred: FcmpPred, lhs: Value, rhs: Value) -> Value {
        let mut data = InstData::new(Opcode::Fcmp);
        data.fcmp = Some(pred);
        let (inst, dest) = self.emit(data, Some(IrType::i1()));
        self.module.add_operand(inst, OperandKind::Value(lhs));
        self.module.add_operand(inst, OperandKind::Value(rhs));
        dest.expect("fcmp defines a value")
    }

    // ---- memory -------------------------------------------------------

    pub fn alloca(&mut self, elem_ty: IrType) -> Value {
        let mut data = InstData::new(Opcode::Alloca);
        data.align = elem_ty.size().min(8) as u32;
        let (_, dest) = self.emit(data, Some(IrType::pointer_to(elem_ty)));
        dest.expect("alloca defines a value")
    }

    pub fn load(&mut self, addr: Value) -> Value {
        let ty = self
            .module
            .value(addr)
            .ty
            .pointee()
            .expect("load address must be a pointer")
            .clone();
        let mut data = InstData::new(Opcode::Load);
        data.align = ty.size().min(8) as u32;
        let (inst, dest) = self.emit(data, Some(ty));
        self.module.add_operand(inst, OperandKind::Value(addr));
        dest.expect("load defines a value")
    }

    pub fn store(&mut self, value: Value, addr: Value) -> Inst {
        let mut data = InstData::new(Opcode::Store);
        data.align = self.module.value(value).ty.size().min(8) as u32;
        let (inst, _) = self.emit(data, None);
        self.module.add_operand(inst, OperandKind::Value(value));
        self.module.add_operand(inst, OperandKind::Value(addr));
        inst
    }

    /// Address arithmetic over `base`; the result keeps the base pointer
    /// type.
    pub fn gep(&mut self, base: Value, indices: &[Value], inbounds: bool) -> Value {
        let ty = self.module.value(base).ty.clone();
        let mut data = InstData::new(Opcode::Gep);
        if inbounds {
            data.flags.insert(InstFlags::INBOUNDS);
        }
        let (inst, dest) = self.emit(data, Some(ty));
        self.module.add_operand(inst, OperandKind::Value(base));
        for &ix in indices {
            self.module.add_operand(inst, OperandKind::Value(ix));
        }
        dest.expect("gep defines a value")
    }

    // ---- calls and phis -----------------------------------------------

    /// Direct call by callee name; `None` result for void callees.
    pub fn call(&mut self, callee: &str, ret_ty: IrType, args: &[Value]) -> Option<Value> {
        let mut data = InstData::new(Opcode::Call);
        data.callee = Some(self.module.intern(callee));
        let result_ty = if ret_ty.is_void() { None } else { Some(ret_ty) };
        let (inst, dest) = self.emit(data, result_ty);
        for &a in args {
            self.module.add_operand(inst, OperandKind::Value(a));
        }
        dest
    }

    /// Build a phi at the head of the insertion block, after any phis
    /// already there. `alloca` tags the phi for later cross-block
    /// matching during edge repair.
    pub fn phi(
        &mut self,
        ty: IrType,
        incoming: &[(Value, Block)],
        alloca: Option<Value>,
    ) -> Value {
        let block = self.cur();
        let mut data = InstData::new(Opcode::Phi);
        data.phi_alloca = alloca;
        let inst = self.module.create_inst(data);
        let dest = self.fresh_value(ty);
        self.module.set_inst_dest(inst, dest);

        let last_phi = self.module.phis(block).last().copied();
        match (last_phi, self.module.block(block).head) {
            (Some(p), _) => self.module.insert_inst_after(inst, p),
            (None, Some(head)) => self.module.insert_inst_before(inst, head),
            (None, None) => self.module.append_inst(block, inst),
        }
        for &(v, b) in incoming {
            self.module.add_operand(inst, OperandKind::Value(v));
            self.module.add_operand(inst, OperandKind::Block(b));
        }
        dest
    }

    // ---- terminators --------------------------------------------------

    pub fn br(&mut self, target: Block) -> Inst {
        let block = self.cur();
        let (inst, _) = self.emit(InstData::new(Opcode::Br), None);
        self.module.add_operand(inst, OperandKind::Block(target));
        self.module.add_successor(block, target);
        self.module.add_predecessor(target, block);
        inst
    }

    pub fn cond_br(&mut self, cond: Value, then_to: Block, else_to: Block) -> Inst {
        let block = self.cur();
        let (inst, _) = self.emit(InstData::new(Opcode::CondBr), None);
        self.module.add_operand(inst, OperandKind::Value(cond));
        self.module.add_operand(inst, OperandKind::Block(then_to));
        self.module.add_operand(inst, OperandKind::Block(else_to));
        self.module.add_successor(block, then_to);
        self.module.add_predecessor(then_to, block);
        self.module.add_successor(block, else_to);
        self.module.add_predecessor(else_to, block);
        inst
    }

    pub fn ret(&mut self, value: Option<Value>) -> Inst {
        let (inst, _) = self.emit(InstData::new(Opcode::Ret), None);
        if let Some(v) = value {
            self.module.add_operand(inst, OperandKind::Value(v));
        }
        inst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::verify::verify_function;

    #[test]
    fn test_builder_produces_consistent_graph() {
        let mut m = IrModule::new();
        let f = m.create_function("abs", IrType::i32(), vec![IrType::i32()], false);
        let mut b = Builder::new(&mut m, f);
        let entry = b.create_block("entry");
        let neg = b.create_block("neg");
        let done = b.create_block("done");

        b.switch_to_block(entry);
        let x = b.param(0);
        let zero = b.const_i32(0);
        let is_neg = b.icmp(IcmpPred::Slt, x, zero);
        b.cond_br(is_neg, neg, done);

        b.switch_to_block(neg);
        let negated = b.unary(Opcode::Neg, x);
        b.br(done);

        b.switch_to_block(done);
        let r = b.phi(IrType::i32(), &[(x, entry), (negated, neg)], None);
        b.ret(Some(r));

        verify_function(&m, f).unwrap();
        assert_eq!(m.func(f).block_count, 3);
        assert_eq!(m.func(f).instruction_count, 6);
        assert_eq!(m.block(done).preds.to_vec(), vec![entry, neg]);
    }

    #[test]
    fn test_fresh_names_are_deterministic() {
        let mut m = IrModule::new();
        let f = m.create_function("names", IrType::i32(), vec![IrType::i32()], false);
        let mut b = Builder::new(&mut m, f);
        let entry = b.create_block("entry");
        b.switch_to_block(entry);
        let x = b.param(0);
        let a = b.copy(x);
        let c = b.copy(a);
        b.ret(Some(c));

        assert_eq!(m.str(m.value(a).name.unwrap()), "t0");
        assert_eq!(m.str(m.value(c).name.unwrap()), "t1");
    }

    #[test]
    fn test_phi_stays_in_prefix() {
        let mut m = IrModule::new();
        let f = m.create_function("prefix", IrType::i32(), vec![IrType::i32()], false);
        let mut b = Builder::new(&mut m, f);
        let entry = b.create_block("entry");
        let body = b.create_block("body");
        b.switch_to_block(entry);
        b.br(body);
        b.switch_to_block(body);
        let x = b.param(0);
        let c = b.copy(x);
        // The phi is created after a body instruction already exists, but
        // still lands in the phi prefix.
        let p = b.phi(IrType::i32(), &[(x, entry)], None);
        b.ret(Some(c));

        let order: Vec<Opcode> = m.insts_of(body).map(|i| m.inst(i).opcode).collect();
        assert_eq!(order, vec![Opcode::Phi, Opcode::Copy, Opcode::Ret]);
        let _ = p;
        verify_function(&m, f).unwrap();
    }

    #[test]
    fn test_void_call_has_no_dest() {
        let mut m = IrModule::new();
        let f = m.create_function("caller", IrType::void(), vec![IrType::i32()], false);
        let mut b = Builder::new(&mut m, f);
        let entry = b.create_block("entry");
        b.switch_to_block(entry);
        let x = b.param(0);
        let none = b.call("print_int", IrType::void(), &[x]);
        let some = b.call("next_int", IrType::i32(), &[]);
        b.ret(None);

        assert!(none.is_none());
        assert!(some.is_some());
        verify_function(&m, f).unwrap();
    }

    #[test]
    fn test_memory_ops() {
        let mut m = IrModule::new();
        let f = m.create_function("mem", IrType::i32(), vec![IrType::i32()], false);
        let mut b = Builder::new(&mut m, f);
        let entry = b.create_block("entry");
        b.switch_to_block(entry);
        let x = b.param(0);
        let slot = b.alloca(IrType::i32());
        b.store(x, slot);
        let loaded = b.load(slot);
        b.ret(Some(loaded));

        assert!(m.value(slot).ty.is_pointer());
        assert_eq!(m.value(loaded).ty, IrType::i32());
        assert_eq!(m.num_uses(slot), 2);
        verify_function(&m, f).unwrap();
    }
}
