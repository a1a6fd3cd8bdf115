//! The SSA graph data model.
//!
//! All IR objects are typed handles into pools owned by the [`IrArena`];
//! ownership lives exclusively in the arena and every back-reference
//! (instruction to block, block to function, operand to user) is a raw
//! handle. Nothing is individually freed: `erase_instruction` is a logical
//! deletion that stamps the instruction [`Opcode::Tombstone`], and the
//! whole graph is reclaimed when the module is dropped.
//!
//! Layout of the graph:
//! - a module owns functions and globals,
//! - a function owns a doubly linked chain of basic blocks,
//! - a block owns a doubly linked chain of instructions plus its
//!   predecessor/successor arrays,
//! - an instruction owns a doubly linked list of operands,
//! - every non-constant value heads a singly linked list of the operands
//!   that reference it (the def-use chain).

use bitflags::bitflags;
use cranelift_entity::{entity_impl, PrimaryMap};
use smallvec::SmallVec;

use crate::common::interner::{Interner, Istr};
use crate::ir::types::IrType;

/// Handle to a [`ValueData`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// Handle to an [`OperandData`] (one use site).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Operand(u32);
entity_impl!(Operand, "op");

/// Handle to an [`InstData`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// Handle to a [`BlockData`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "bb");

/// Handle to a [`FunctionData`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Func(u32);
entity_impl!(Func, "fn");

/// Handle to a [`LoopData`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Loop(u32);
entity_impl!(Loop, "loop");

/// Constant payload. Constants are identity-agnostic: two distinct value
/// records with equal payloads denote the same constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IrConst {
    I1(bool),
    I8(i8),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl IrConst {
    pub fn ty(&self) -> IrType {
        match self {
            IrConst::I1(_) => IrType::i1(),
            IrConst::I8(_) => IrType::i8(),
            IrConst::I32(_) => IrType::i32(),
            IrConst::I64(_) => IrType::i64(),
            IrConst::F32(_) => IrType::f32(),
            IrConst::F64(_) => IrType::f64(),
        }
    }

    /// Payload reinterpreted as integer bits. Floats hash and compare by
    /// bit pattern, `i1` normalizes to 0/1.
    pub fn payload_bits(&self) -> u64 {
        match self {
            IrConst::I1(b) => *b as u64,
            IrConst::I8(v) => *v as u8 as u64,
            IrConst::I32(v) => *v as u32 as u64,
            IrConst::I64(v) => *v as u64,
            IrConst::F32(v) => v.to_bits() as u64,
            IrConst::F64(v) => v.to_bits(),
        }
    }

    /// Contents equality: same variant, same payload bits.
    pub fn contents_eq(&self, other: &IrConst) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
            && self.payload_bits() == other.payload_bits()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    /// Compile-time constant. Uses of constants are never tracked.
    Constant(IrConst),
    /// SSA register defined by exactly one instruction.
    Register,
    /// Formal parameter (index within the function signature).
    Param(u32),
    /// Module-level global; the value is the global's address.
    Global,
    /// Placeholder with no defined contents, synthesized where analysis
    /// cannot name a live incoming value.
    Undef,
}

/// An abstract definition referenced by operands.
#[derive(Debug, Clone)]
pub struct ValueData {
    pub ty: IrType,
    pub kind: ValueKind,
    /// The unique defining instruction; `None` for constants, globals,
    /// parameters, and undef.
    pub def_inst: Option<Inst>,
    pub name: Option<Istr>,
    /// Head of the use list: every operand referencing this value is
    /// reachable from here, except for constants.
    pub first_use: Option<Operand>,
}

impl ValueData {
    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ValueKind::Constant(_))
    }

    pub fn as_constant(&self) -> Option<&IrConst> {
        match &self.kind {
            ValueKind::Constant(c) => Some(c),
            _ => None,
        }
    }
}

/// What an operand refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    Value(Value),
    Block(Block),
}

/// One use of a value or block target by one instruction. Doubly linked
/// inside the owning instruction; value operands of non-constant values are
/// additionally singly linked through the referent's use list.
#[derive(Debug, Clone)]
pub struct OperandData {
    pub kind: OperandKind,
    pub user: Inst,
    pub prev: Option<Operand>,
    pub next: Option<Operand>,
    pub next_use: Option<Operand>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Alloca,
    Load,
    Store,
    Gep,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FNeg,
    Icmp,
    Fcmp,
    Zext,
    Sitofp,
    Fptosi,
    Copy,
    Call,
    Phi,
    Br,
    CondBr,
    Ret,
    /// Logically deleted instruction awaiting sweep. Ignored by counters.
    Tombstone,
}

impl Opcode {
    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Br | Opcode::CondBr | Opcode::Ret)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Alloca => "alloca",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::Gep => "gep",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Rem => "rem",
            Opcode::Neg => "neg",
            Opcode::FAdd => "fadd",
            Opcode::FSub => "fsub",
            Opcode::FMul => "fmul",
            Opcode::FDiv => "fdiv",
            Opcode::FNeg => "fneg",
            Opcode::Icmp => "icmp",
            Opcode::Fcmp => "fcmp",
            Opcode::Zext => "zext",
            Opcode::Sitofp => "sitofp",
            Opcode::Fptosi => "fptosi",
            Opcode::Copy => "copy",
            Opcode::Call => "call",
            Opcode::Phi => "phi",
            Opcode::Br => "br",
            Opcode::CondBr => "condbr",
            Opcode::Ret => "ret",
            Opcode::Tombstone => "tombstone",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpPred {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FcmpPred {
    Oeq,
    One,
    Olt,
    Ole,
    Ogt,
    Oge,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InstFlags: u8 {
        /// Set while the instruction sits in a caller's worklist.
        const IN_WORKLIST = 1 << 0;
        /// The address computed by this `Gep` stays within its object.
        const INBOUNDS = 1 << 1;
    }
}

#[derive(Debug, Clone)]
pub struct InstData {
    pub opcode: Opcode,
    /// The value this instruction defines, if any. One-to-one:
    /// `dest.def_inst` points back here.
    pub dest: Option<Value>,
    pub parent: Option<Block>,
    pub prev: Option<Inst>,
    pub next: Option<Inst>,
    pub operand_head: Option<Operand>,
    pub operand_tail: Option<Operand>,
    pub num_operands: u32,
    pub flags: InstFlags,
    pub icmp: Option<IcmpPred>,
    pub fcmp: Option<FcmpPred>,
    /// Alignment for memory operations; 0 means natural.
    pub align: u32,
    /// The alloca a phi was created for during memory promotion. Used to
    /// match phis across blocks when repairing redirected edges.
    pub phi_alloca: Option<Value>,
    /// Callee name for `Call`.
    pub callee: Option<Istr>,
}

impl InstData {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            dest: None,
            parent: None,
            prev: None,
            next: None,
            operand_head: None,
            operand_tail: None,
            num_operands: 0,
            flags: InstFlags::empty(),
            icmp: None,
            fcmp: None,
            align: 0,
            phi_alloca: None,
            callee: None,
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.opcode.is_terminator()
    }

    pub fn is_phi(&self) -> bool {
        self.opcode == Opcode::Phi
    }

    pub fn is_tombstone(&self) -> bool {
        self.opcode == Opcode::Tombstone
    }
}

#[derive(Debug, Clone)]
pub struct BlockData {
    pub label: Istr,
    pub parent: Option<Func>,
    pub prev: Option<Block>,
    pub next: Option<Block>,
    pub head: Option<Inst>,
    pub tail: Option<Inst>,
    pub preds: SmallVec<[Block; 4]>,
    pub succs: SmallVec<[Block; 4]>,
    /// Immediate dominator; `None` for the entry block and unreachable
    /// blocks.
    pub idom: Option<Block>,
    pub dom_children: Vec<Block>,
    /// Euler-tour entry/exit counters over the dominator tree. Undefined
    /// until `compute_dom_tree_timestamps` runs, and for unreachable
    /// blocks afterwards.
    pub dom_tin: u32,
    pub dom_tout: u32,
    /// Post-order number from the CFG DFS that built the dominator tree.
    pub po_id: u32,
}

impl BlockData {
    pub(crate) fn new(label: Istr) -> Self {
        Self {
            label,
            parent: None,
            prev: None,
            next: None,
            head: None,
            tail: None,
            preds: SmallVec::new(),
            succs: SmallVec::new(),
            idom: None,
            dom_children: Vec::new(),
            dom_tin: 0,
            dom_tout: 0,
            po_id: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionData {
    pub name: Istr,
    pub ret_ty: IrType,
    pub params: Vec<Value>,
    pub variadic: bool,
    pub entry: Option<Block>,
    pub block_head: Option<Block>,
    pub block_tail: Option<Block>,
    pub block_count: u32,
    /// Live (non-tombstone) instruction count. An approximation that can
    /// drift during rapid edits; see `recalculate_instruction_count`.
    pub instruction_count: u32,
    pub top_level_loops: Vec<Loop>,
    /// Counter for deterministic fresh register names.
    pub next_temp: u32,
}

/// A natural loop: a single-entry region whose header dominates every
/// block in `blocks`.
#[derive(Debug, Clone)]
pub struct LoopData {
    pub header: Block,
    pub blocks: Vec<Block>,
    pub parent: Option<Loop>,
    pub sub_loops: Vec<Loop>,
    /// Nesting depth; top-level loops have depth 1.
    pub depth: u32,
}

/// Bump pools for every IR object class plus the string interner. One
/// arena per translation unit; destruction is bulk.
pub struct IrArena {
    pub values: PrimaryMap<Value, ValueData>,
    pub operands: PrimaryMap<Operand, OperandData>,
    pub insts: PrimaryMap<Inst, InstData>,
    pub blocks: PrimaryMap<Block, BlockData>,
    pub funcs: PrimaryMap<Func, FunctionData>,
    pub loops: PrimaryMap<Loop, LoopData>,
    pub strings: Interner,
}

impl IrArena {
    pub fn new() -> Self {
        Self {
            values: PrimaryMap::new(),
            operands: PrimaryMap::new(),
            insts: PrimaryMap::new(),
            blocks: PrimaryMap::new(),
            funcs: PrimaryMap::new(),
            loops: PrimaryMap::new(),
            strings: Interner::new(),
        }
    }
}

impl Default for IrArena {
    fn default() -> Self {
        Self::new()
    }
}

pub struct IrModule {
    pub arena: IrArena,
    pub functions: Vec<Func>,
    pub globals: Vec<Value>,
}

impl IrModule {
    pub fn new() -> Self {
        Self { arena: IrArena::new(), functions: Vec::new(), globals: Vec::new() }
    }

    pub fn intern(&mut self, s: &str) -> Istr {
        self.arena.strings.intern(s)
    }

    pub fn str(&self, i: Istr) -> &str {
        self.arena.strings.get(i)
    }

    // ---- accessors ---------------------------------------------------

    pub fn value(&self, v: Value) -> &ValueData {
        &self.arena.values[v]
    }

    pub fn value_mut(&mut self, v: Value) -> &mut ValueData {
        &mut self.arena.values[v]
    }

    pub fn operand(&self, op: Operand) -> &OperandData {
        &self.arena.operands[op]
    }

    pub fn inst(&self, i: Inst) -> &InstData {
        &self.arena.insts[i]
    }

    pub fn inst_mut(&mut self, i: Inst) -> &mut InstData {
        &mut self.arena.insts[i]
    }

    pub fn block(&self, b: Block) -> &BlockData {
        &self.arena.blocks[b]
    }

    pub fn block_mut(&mut self, b: Block) -> &mut BlockData {
        &mut self.arena.blocks[b]
    }

    pub fn func(&self, f: Func) -> &FunctionData {
        &self.arena.funcs[f]
    }

    pub fn func_mut(&mut self, f: Func) -> &mut FunctionData {
        &mut self.arena.funcs[f]
    }

    // ---- creation ----------------------------------------------------

    pub fn create_function(
        &mut self,
        name: &str,
        ret_ty: IrType,
        param_tys: Vec<IrType>,
        variadic: bool,
    ) -> Func {
        let name = self.intern(name);
        let params: Vec<Value> = param_tys
            .into_iter()
            .enumerate()
            .map(|(i, ty)| {
                self.arena.values.push(ValueData {
                    ty,
                    kind: ValueKind::Param(i as u32),
                    def_inst: None,
                    name: None,
                    first_use: None,
                })
            })
            .collect();
        let f = self.arena.funcs.push(FunctionData {
            name,
            ret_ty,
            params,
            variadic,
            entry: None,
            block_head: None,
            block_tail: None,
            block_count: 0,
            instruction_count: 0,
            top_level_loops: Vec::new(),
            next_temp: 0,
        });
        self.functions.push(f);
        f
    }

    /// Create a global of the given element type; the value itself is the
    /// global's address.
    pub fn create_global(&mut self, name: &str, elem_ty: IrType) -> Value {
        let name = self.intern(name);
        let v = self.arena.values.push(ValueData {
            ty: IrType::pointer_to(elem_ty),
            kind: ValueKind::Global,
            def_inst: None,
            name: Some(name),
            first_use: None,
        });
        self.globals.push(v);
        v
    }

    /// Append a fresh block to `func`'s block chain. The first block
    /// created becomes the entry.
    pub fn create_block(&mut self, func: Func, label: &str) -> Block {
        let label = self.intern(label);
        let b = self.arena.blocks.push(BlockData::new(label));
        self.arena.blocks[b].parent = Some(func);
        let fd = &mut self.arena.funcs[func];
        match fd.block_tail {
            Some(tail) => {
                self.arena.blocks[tail].next = Some(b);
                self.arena.blocks[b].prev = Some(tail);
                fd.block_tail = Some(b);
            }
            None => {
                fd.block_head = Some(b);
                fd.block_tail = Some(b);
                fd.entry = Some(b);
            }
        }
        self.arena.funcs[func].block_count += 1;
        b
    }

    pub fn new_const(&mut self, c: IrConst) -> Value {
        self.arena.values.push(ValueData {
            ty: c.ty(),
            kind: ValueKind::Constant(c),
            def_inst: None,
            name: None,
            first_use: None,
        })
    }

    pub fn new_register(&mut self, ty: IrType, name: Option<Istr>) -> Value {
        self.arena.values.push(ValueData {
            ty,
            kind: ValueKind::Register,
            def_inst: None,
            name,
            first_use: None,
        })
    }

    /// A fresh undefined value of the given type. Allocates per call;
    /// undef values participate in use tracking like registers.
    pub fn get_undef_value(&mut self, ty: IrType) -> Value {
        self.arena.values.push(ValueData {
            ty,
            kind: ValueKind::Undef,
            def_inst: None,
            name: None,
            first_use: None,
        })
    }

    // ---- traversal ---------------------------------------------------

    /// Blocks of `func` in chain order.
    pub fn blocks_of(&self, func: Func) -> BlockIter<'_> {
        BlockIter { arena: &self.arena, cur: self.arena.funcs[func].block_head }
    }

    /// Instructions of `block` in order, tombstones included.
    pub fn insts_of(&self, block: Block) -> InstIter<'_> {
        InstIter { arena: &self.arena, cur: self.arena.blocks[block].head }
    }

    /// Operands of `inst` in list order.
    pub fn operands_of(&self, inst: Inst) -> OperandIter<'_> {
        OperandIter { arena: &self.arena, cur: self.arena.insts[inst].operand_head }
    }

    /// Operands currently using `value` (the def-use chain). Empty for
    /// constants.
    pub fn uses_of(&self, value: Value) -> UseIter<'_> {
        UseIter { arena: &self.arena, cur: self.arena.values[value].first_use }
    }

    /// The block's terminator, if its last instruction is one.
    pub fn terminator(&self, block: Block) -> Option<Inst> {
        let tail = self.arena.blocks[block].tail?;
        if self.arena.insts[tail].is_terminator() {
            Some(tail)
        } else {
            None
        }
    }

    /// The phi prefix of `block`. Stops at the first non-phi; phis that
    /// wrongly sit past a non-phi are not returned.
    pub fn phis(&self, block: Block) -> Vec<Inst> {
        let mut out = Vec::new();
        let mut cur = self.arena.blocks[block].head;
        while let Some(i) = cur {
            if !self.arena.insts[i].is_phi() {
                break;
            }
            out.push(i);
            cur = self.arena.insts[i].next;
        }
        out
    }

    /// Number of uses of `value`. O(uses); constants report 0.
    pub fn num_uses(&self, value: Value) -> usize {
        self.uses_of(value).count()
    }
}

impl Default for IrModule {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BlockIter<'a> {
    arena: &'a IrArena,
    cur: Option<Block>,
}

impl Iterator for BlockIter<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let b = self.cur?;
        self.cur = self.arena.blocks[b].next;
        Some(b)
    }
}

pub struct InstIter<'a> {
    arena: &'a IrArena,
    cur: Option<Inst>,
}

impl Iterator for InstIter<'_> {
    type Item = Inst;

    fn next(&mut self) -> Option<Inst> {
        let i = self.cur?;
        self.cur = self.arena.insts[i].next;
        Some(i)
    }
}

pub struct OperandIter<'a> {
    arena: &'a IrArena,
    cur: Option<Operand>,
}

impl Iterator for OperandIter<'_> {
    type Item = Operand;

    fn next(&mut self) -> Option<Operand> {
        let op = self.cur?;
        self.cur = self.arena.operands[op].next;
        Some(op)
    }
}

pub struct UseIter<'a> {
    arena: &'a IrArena,
    cur: Option<Operand>,
}

impl Iterator for UseIter<'_> {
    type Item = Operand;

    fn next(&mut self) -> Option<Operand> {
        let op = self.cur?;
        self.cur = self.arena.operands[op].next_use;
        Some(op)
    }
}
