//! Mutation primitives: operand maintenance and instruction/block editing.
//!
//! Every primitive here keeps the use lists, operand lists, and counters
//! consistent. The invariant pair they protect: an operand is reachable
//! from its instruction's operand list, and (for non-constant value
//! operands) from the referent value's use list, or from neither.
//!
//! Contract violations (erasing a still-used instruction, inserting
//! relative to a detached position, changing the value of a block
//! operand) abort via assertion; passes are expected to be correct by
//! construction.

use log::trace;

use crate::common::worklist::Worklist;
use crate::ir::ir::{
    Block, Func, Inst, InstData, InstFlags, IrModule, Opcode, Operand, OperandData, OperandKind,
    Value,
};

impl IrModule {
    /// Allocate a detached instruction. Attach it with `append_inst`,
    /// `add_inst_to_block_end`, or the positional inserters.
    pub fn create_inst(&mut self, data: InstData) -> Inst {
        debug_assert!(data.parent.is_none() && data.prev.is_none() && data.next.is_none());
        self.arena.insts.push(data)
    }

    /// Allocate a block not yet on any function's chain, for
    /// `insert_block_after`.
    pub fn new_block_detached(&mut self, label: &str) -> Block {
        let label = self.intern(label);
        self.arena.blocks.push(crate::ir::ir::BlockData::new(label))
    }

    /// Bind `v` as the value defined by `inst` (one-to-one).
    pub fn set_inst_dest(&mut self, inst: Inst, v: Value) {
        debug_assert!(
            self.arena.values[v].def_inst.is_none(),
            "value already has a defining instruction"
        );
        self.arena.insts[inst].dest = Some(v);
        self.arena.values[v].def_inst = Some(inst);
    }

    // ---- operand maintenance -----------------------------------------

    /// Append an operand at the tail of `inst`'s operand list and, for a
    /// non-constant value, prepend it onto the value's use list. O(1).
    pub fn add_operand(&mut self, inst: Inst, kind: OperandKind) -> Operand {
        debug_assert!(
            !self.arena.insts[inst].is_tombstone(),
            "adding an operand to a tombstone"
        );
        let tail = self.arena.insts[inst].operand_tail;
        let op = self.arena.operands.push(OperandData {
            kind,
            user: inst,
            prev: tail,
            next: None,
            next_use: None,
        });
        match tail {
            Some(t) => self.arena.operands[t].next = Some(op),
            None => self.arena.insts[inst].operand_head = Some(op),
        }
        self.arena.insts[inst].operand_tail = Some(op);
        self.arena.insts[inst].num_operands += 1;

        if let OperandKind::Value(v) = kind {
            if !self.arena.values[v].is_constant() {
                self.arena.operands[op].next_use = self.arena.values[v].first_use;
                self.arena.values[v].first_use = Some(op);
            }
        }
        op
    }

    /// Detach `op` from its instruction's operand list and from the
    /// referent value's use list.
    pub fn remove_operand(&mut self, op: Operand) {
        let OperandData { kind, user, prev, next, .. } = self.arena.operands[op].clone();
        match prev {
            Some(p) => self.arena.operands[p].next = next,
            None => self.arena.insts[user].operand_head = next,
        }
        match next {
            Some(n) => self.arena.operands[n].prev = prev,
            None => self.arena.insts[user].operand_tail = prev,
        }
        self.arena.insts[user].num_operands -= 1;

        if let OperandKind::Value(v) = kind {
            if !self.arena.values[v].is_constant() {
                self.unlink_use(v, op);
            }
        }
        let o = &mut self.arena.operands[op];
        o.prev = None;
        o.next = None;
        o.next_use = None;
    }

    /// Unlink `op` from `v`'s use list. Handle-based form of the
    /// pointer-to-pointer walk: head and interior cases converge on the
    /// link that points at `op`.
    fn unlink_use(&mut self, v: Value, op: Operand) {
        let after = self.arena.operands[op].next_use;
        if self.arena.values[v].first_use == Some(op) {
            self.arena.values[v].first_use = after;
            return;
        }
        let mut cur = self.arena.values[v].first_use;
        while let Some(c) = cur {
            if self.arena.operands[c].next_use == Some(op) {
                self.arena.operands[c].next_use = after;
                return;
            }
            cur = self.arena.operands[c].next_use;
        }
        debug_assert!(false, "operand missing from the use list of its value");
    }

    /// Retarget a value operand: unlink from the old referent's use list,
    /// link onto the new one's. Short-circuits when nothing changes.
    pub fn change_operand_value(&mut self, op: Operand, new: Value) {
        let old = match self.arena.operands[op].kind {
            OperandKind::Value(v) => v,
            OperandKind::Block(_) => panic!("change_operand_value on a block operand"),
        };
        if old == new {
            return;
        }
        if !self.arena.values[old].is_constant() {
            self.unlink_use(old, op);
        }
        self.arena.operands[op].kind = OperandKind::Value(new);
        if !self.arena.values[new].is_constant() {
            self.arena.operands[op].next_use = self.arena.values[new].first_use;
            self.arena.values[new].first_use = Some(op);
        } else {
            self.arena.operands[op].next_use = None;
        }
    }

    /// Rewrite every use of `old` to reference `new`. Former users are
    /// pushed onto `worklist` (deduplicated through `IN_WORKLIST`) so
    /// iterative passes can revisit them.
    ///
    /// The use list is consumed by repeatedly taking its head: any cursor
    /// into the list would be invalidated by the retargeting itself.
    pub fn replace_all_uses_with(
        &mut self,
        old: Value,
        new: Value,
        mut worklist: Option<&mut Worklist<Inst>>,
    ) {
        if old == new {
            return;
        }
        debug_assert!(
            !self.arena.values[old].is_constant(),
            "constants do not participate in use tracking"
        );
        trace!("rauw: {} -> {}", old, new);
        while let Some(op) = self.arena.values[old].first_use {
            let user = self.arena.operands[op].user;
            self.change_operand_value(op, new);
            if let Some(wl) = worklist.as_deref_mut() {
                self.worklist_push(wl, user);
            }
        }
    }

    // ---- worklist flag helpers ---------------------------------------

    /// Queue `inst` unless its `IN_WORKLIST` bit is already set.
    pub fn worklist_push(&mut self, wl: &mut Worklist<Inst>, inst: Inst) {
        let flags = &mut self.arena.insts[inst].flags;
        if !flags.contains(InstFlags::IN_WORKLIST) {
            flags.insert(InstFlags::IN_WORKLIST);
            wl.push(inst);
        }
    }

    /// Pop the next queued instruction and clear its `IN_WORKLIST` bit.
    pub fn worklist_pop(&mut self, wl: &mut Worklist<Inst>) -> Option<Inst> {
        let inst = wl.pop()?;
        self.arena.insts[inst].flags.remove(InstFlags::IN_WORKLIST);
        Some(inst)
    }

    // ---- instruction placement ---------------------------------------

    /// Splice a detached instruction in directly after `pos`.
    pub fn insert_inst_after(&mut self, new: Inst, pos: Inst) {
        assert!(self.arena.insts[new].parent.is_none(), "instruction is already attached");
        let block = self.arena.insts[pos].parent.expect("insert position is detached");
        let next = self.arena.insts[pos].next;
        {
            let n = &mut self.arena.insts[new];
            n.parent = Some(block);
            n.prev = Some(pos);
            n.next = next;
        }
        self.arena.insts[pos].next = Some(new);
        match next {
            Some(x) => self.arena.insts[x].prev = Some(new),
            None => self.arena.blocks[block].tail = Some(new),
        }
        self.bump_inst_count(block, 1);
    }

    /// Splice a detached instruction in directly before `pos`.
    pub fn insert_inst_before(&mut self, new: Inst, pos: Inst) {
        assert!(self.arena.insts[new].parent.is_none(), "instruction is already attached");
        let block = self.arena.insts[pos].parent.expect("insert position is detached");
        let prev = self.arena.insts[pos].prev;
        {
            let n = &mut self.arena.insts[new];
            n.parent = Some(block);
            n.prev = prev;
            n.next = Some(pos);
        }
        self.arena.insts[pos].prev = Some(new);
        match prev {
            Some(x) => self.arena.insts[x].next = Some(new),
            None => self.arena.blocks[block].head = Some(new),
        }
        self.bump_inst_count(block, 1);
    }

    /// Attach at the true tail of `block`, after any terminator. This is
    /// how terminators themselves are placed.
    pub fn append_inst(&mut self, block: Block, inst: Inst) {
        assert!(self.arena.insts[inst].parent.is_none(), "instruction is already attached");
        let tail = self.arena.blocks[block].tail;
        self.arena.insts[inst].parent = Some(block);
        self.arena.insts[inst].prev = tail;
        match tail {
            Some(t) => self.arena.insts[t].next = Some(inst),
            None => self.arena.blocks[block].head = Some(inst),
        }
        self.arena.blocks[block].tail = Some(inst);
        self.bump_inst_count(block, 1);
    }

    /// Append to `block`, staying in front of its terminator when one is
    /// present.
    pub fn add_inst_to_block_end(&mut self, block: Block, inst: Inst) {
        match self.terminator(block) {
            Some(term) => self.insert_inst_before(inst, term),
            None => self.append_inst(block, inst),
        }
    }

    fn bump_inst_count(&mut self, block: Block, delta: i32) {
        if let Some(func) = self.arena.blocks[block].parent {
            let c = &mut self.arena.funcs[func].instruction_count;
            *c = c.saturating_add_signed(delta);
        }
    }

    // ---- erasure ------------------------------------------------------

    /// Logically delete `inst`: drop its operands from every use list,
    /// unsplice it from its block, and stamp it [`Opcode::Tombstone`].
    /// The record itself stays in the arena, so a stale handle observes
    /// the tombstone opcode instead of freed memory.
    ///
    /// Fatal if the defined value still has uses; replace them first.
    pub fn erase_instruction(&mut self, inst: Inst) {
        if let Some(dest) = self.arena.insts[inst].dest {
            assert!(
                self.arena.values[dest].first_use.is_none(),
                "erasing an instruction whose result still has uses"
            );
        }
        trace!("erase: {}", inst);
        while let Some(op) = self.arena.insts[inst].operand_head {
            self.remove_operand(op);
        }

        let (parent, prev, next) = {
            let i = &self.arena.insts[inst];
            (i.parent, i.prev, i.next)
        };
        if let Some(block) = parent {
            match prev {
                Some(p) => self.arena.insts[p].next = next,
                None => self.arena.blocks[block].head = next,
            }
            match next {
                Some(n) => self.arena.insts[n].prev = prev,
                None => self.arena.blocks[block].tail = prev,
            }
            self.bump_inst_count(block, -1);
        }

        let dest = {
            let i = &mut self.arena.insts[inst];
            i.opcode = Opcode::Tombstone;
            i.parent = None;
            i.prev = None;
            i.next = None;
            i.flags.remove(InstFlags::IN_WORKLIST);
            i.dest.take()
        };
        if let Some(d) = dest {
            self.arena.values[d].def_inst = None;
        }
    }

    /// Stamp `inst` as a tombstone without unsplicing it, deferring the
    /// full erase to `cleanup_removed_instructions`. The live-instruction
    /// counter drifts until then.
    pub fn mark_instruction_for_removal(&mut self, inst: Inst) {
        trace!("mark for removal: {}", inst);
        self.arena.insts[inst].opcode = Opcode::Tombstone;
    }

    /// Sweep `block`, erasing every tombstone. The successor of each
    /// instruction is captured before the erase, so the walk survives the
    /// list surgery.
    pub fn cleanup_removed_instructions(&mut self, block: Block) {
        let mut cur = self.arena.blocks[block].head;
        while let Some(inst) = cur {
            let next = self.arena.insts[inst].next;
            if self.arena.insts[inst].is_tombstone() {
                self.erase_instruction(inst);
            }
            cur = next;
        }
    }

    // ---- block placement ----------------------------------------------

    /// Splice a detached block into the function chain after `pos`.
    pub fn insert_block_after(&mut self, new: Block, pos: Block) {
        assert!(self.arena.blocks[new].parent.is_none(), "block is already attached");
        let func = self.arena.blocks[pos].parent.expect("insert position is detached");
        let next = self.arena.blocks[pos].next;
        {
            let b = &mut self.arena.blocks[new];
            b.parent = Some(func);
            b.prev = Some(pos);
            b.next = next;
        }
        self.arena.blocks[pos].next = Some(new);
        match next {
            Some(n) => self.arena.blocks[n].prev = Some(new),
            None => self.arena.funcs[func].block_tail = Some(new),
        }
        self.arena.funcs[func].block_count += 1;
    }

    /// Unsplice `block` from its function. CFG edges are untouched; the
    /// caller severs or redirects them.
    pub fn remove_block_from_function(&mut self, block: Block) {
        let func = self.arena.blocks[block].parent.expect("block is not attached");
        let (prev, next) = {
            let b = &self.arena.blocks[block];
            (b.prev, b.next)
        };
        match prev {
            Some(p) => self.arena.blocks[p].next = next,
            None => self.arena.funcs[func].block_head = next,
        }
        match next {
            Some(n) => self.arena.blocks[n].prev = prev,
            None => self.arena.funcs[func].block_tail = prev,
        }
        let b = &mut self.arena.blocks[block];
        b.parent = None;
        b.prev = None;
        b.next = None;
        self.arena.funcs[func].block_count -= 1;
    }

    /// Resynchronize `instruction_count` after edits that let it drift:
    /// one linear scan over the non-tombstone instructions.
    pub fn recalculate_instruction_count(&mut self, func: Func) {
        let mut count = 0u32;
        let blocks: Vec<Block> = self.blocks_of(func).collect();
        for b in blocks {
            for inst in self.insts_of(b) {
                if !self.arena.insts[inst].is_tombstone() {
                    count += 1;
                }
            }
        }
        self.arena.funcs[func].instruction_count = count;
    }
}
