//! CFG mutation primitives: predecessor/successor arrays, terminator
//! target rewriting, edge redirection, and phi repair.
//!
//! The symmetry invariant: `b` appears in `a.succs` exactly as many times
//! as `a` appears in `b.preds`. Primitives that break it momentarily
//! (`redirect_edge`) restore it before returning; only the phi side is
//! deliberately left to `repair_phi_nodes_after_edge_redirect`, because
//! the right incoming values depend on what the caller is doing to the
//! graph.

use log::trace;

use crate::ir::ir::{Block, Func, Inst, IrModule, Operand, OperandKind, Value};

impl IrModule {
    pub fn add_predecessor(&mut self, block: Block, pred: Block) {
        self.arena.blocks[block].preds.push(pred);
    }

    pub fn add_successor(&mut self, block: Block, succ: Block) {
        self.arena.blocks[block].succs.push(succ);
    }

    /// Remove one occurrence of `succ` from `block`'s successor array,
    /// order-preserving. No phi duty on this side.
    pub fn remove_successor(&mut self, block: Block, succ: Block) {
        let succs = &mut self.arena.blocks[block].succs;
        if let Some(i) = succs.iter().position(|&b| b == succ) {
            succs.remove(i);
        }
    }

    /// Remove one occurrence of `pred` from `block`'s predecessor array
    /// and drop the matching `(value, block)` pair from every phi at the
    /// head of `block`.
    ///
    /// The walk stops at the first non-phi; a malformed block with a
    /// non-phi interleaved leaves later phis untouched.
    pub fn remove_predecessor(&mut self, block: Block, pred: Block) {
        trace!("remove pred {} of {}", pred, block);
        let preds = &mut self.arena.blocks[block].preds;
        if let Some(i) = preds.iter().position(|&b| b == pred) {
            preds.remove(i);
        }
        for phi in self.phis(block) {
            let ops: Vec<Operand> = self.operands_of(phi).collect();
            let mut k = 0;
            while k + 1 < ops.len() {
                if self.operand(ops[k + 1]).kind == OperandKind::Block(pred) {
                    self.remove_operand(ops[k]);
                    self.remove_operand(ops[k + 1]);
                    break;
                }
                k += 2;
            }
        }
    }

    /// Rewrite every block operand of `term` that equals `from`.
    pub fn change_terminator_target(&mut self, term: Inst, from: Block, to: Block) {
        debug_assert!(self.arena.insts[term].is_terminator());
        let ops: Vec<Operand> = self.operands_of(term).collect();
        for op in ops {
            if self.arena.operands[op].kind == OperandKind::Block(from) {
                self.arena.operands[op].kind = OperandKind::Block(to);
            }
        }
    }

    /// Retarget every occurrence of `from` as an incoming block across the
    /// phis of `block`. Adds and removes nothing.
    pub fn change_phi_predecessor(&mut self, block: Block, from: Block, to: Block) {
        for phi in self.phis(block) {
            let ops: Vec<Operand> = self.operands_of(phi).collect();
            for op in ops {
                if self.arena.operands[op].kind == OperandKind::Block(from) {
                    self.arena.operands[op].kind = OperandKind::Block(to);
                }
            }
        }
    }

    /// Retarget every block operand in the function from `from` to `to`.
    /// Used when folding a block away entirely; the pred/succ arrays are
    /// the caller's to fix.
    pub fn replace_all_uses_with_block(&mut self, func: Func, from: Block, to: Block) {
        trace!("replace block uses: {} -> {} in {}", from, to, func);
        let blocks: Vec<Block> = self.blocks_of(func).collect();
        for b in blocks {
            let insts: Vec<Inst> = self.insts_of(b).collect();
            for inst in insts {
                let ops: Vec<Operand> = self.operands_of(inst).collect();
                for op in ops {
                    if self.arena.operands[op].kind == OperandKind::Block(from) {
                        self.arena.operands[op].kind = OperandKind::Block(to);
                    }
                }
            }
        }
    }

    /// Redirect every `from -> old_to` edge to `from -> new_to`: the
    /// terminator targets, `from.succs`, and both predecessor arrays.
    ///
    /// Phis are deliberately not touched; follow with
    /// `repair_phi_nodes_after_edge_redirect` for full semantics.
    pub fn redirect_edge(&mut self, from: Block, old_to: Block, new_to: Block) {
        trace!("redirect edge {} -> {} onto {}", from, old_to, new_to);
        if let Some(term) = self.terminator(from) {
            self.change_terminator_target(term, old_to, new_to);
        }
        let mut moved = 0usize;
        for s in self.arena.blocks[from].succs.iter_mut() {
            if *s == old_to {
                *s = new_to;
                moved += 1;
            }
        }
        for _ in 0..moved {
            let preds = &mut self.arena.blocks[old_to].preds;
            if let Some(i) = preds.iter().position(|&b| b == from) {
                preds.remove(i);
            }
            self.arena.blocks[new_to].preds.push(from);
        }
    }

    /// Complete an edge redirect at the phi level.
    ///
    /// For each phi in `new_to` with no entry for `from` yet, add one.
    /// The incoming value comes from the phi in `old_to` created for the
    /// same alloca (the `phi_alloca` tag); when no such phi exists, a
    /// fresh undef of the phi's type stands in. Then every entry for
    /// `from` is dropped from the phis of `old_to`.
    pub fn repair_phi_nodes_after_edge_redirect(
        &mut self,
        new_to: Block,
        from: Block,
        old_to: Block,
    ) {
        trace!("repair phis of {} for edge {} (was -> {})", new_to, from, old_to);
        for phi in self.phis(new_to) {
            let present = self
                .operands_of(phi)
                .any(|op| self.operand(op).kind == OperandKind::Block(from));
            if present {
                continue;
            }
            let tag = self.inst(phi).phi_alloca;
            let mut incoming: Option<Value> = None;
            if tag.is_some() {
                for other in self.phis(old_to) {
                    if self.inst(other).phi_alloca == tag {
                        incoming = self.inst(other).dest;
                        break;
                    }
                }
            }
            let value = match incoming {
                Some(v) => v,
                None => {
                    let dest = self.inst(phi).dest.expect("phi defines a value");
                    let ty = self.value(dest).ty.clone();
                    self.get_undef_value(ty)
                }
            };
            self.add_operand(phi, OperandKind::Value(value));
            self.add_operand(phi, OperandKind::Block(from));
        }

        for phi in self.phis(old_to) {
            loop {
                let ops: Vec<Operand> = self.operands_of(phi).collect();
                let mut dropped = false;
                let mut k = 0;
                while k + 1 < ops.len() {
                    if self.operand(ops[k + 1]).kind == OperandKind::Block(from) {
                        self.remove_operand(ops[k]);
                        self.remove_operand(ops[k + 1]);
                        dropped = true;
                        break;
                    }
                    k += 2;
                }
                if !dropped {
                    break;
                }
            }
        }
    }

    /// Erase the terminator and detach `block` from every successor.
    /// Afterwards the block has no outgoing edges and no terminator; the
    /// function is not well-formed again until the caller supplies one.
    pub fn sever_all_successors(&mut self, block: Block) {
        trace!("sever successors of {}", block);
        if let Some(term) = self.terminator(block) {
            self.erase_instruction(term);
        }
        let succs: Vec<Block> = self.arena.blocks[block].succs.to_vec();
        self.arena.blocks[block].succs.clear();
        for s in succs {
            self.remove_predecessor(s, block);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::Builder;
    use crate::ir::ir::ValueKind;
    use crate::ir::types::IrType;
    use crate::ir::verify::verify_function;

    /// `join` has three predecessors feeding one phi.
    fn build_three_way_join() -> (IrModule, Func, [Block; 4], Value, [Value; 3]) {
        let mut m = IrModule::new();
        let f = m.create_function(
            "join3",
            IrType::i32(),
            vec![IrType::i1(), IrType::i1()],
            false,
        );
        let mut b = Builder::new(&mut m, f);
        let entry = b.create_block("entry");
        let p1 = b.create_block("p1");
        let p2 = b.create_block("p2");
        let p3 = b.create_block("p3");
        let join = b.create_block("join");

        b.switch_to_block(entry);
        let c = b.param(0);
        let d = b.param(1);
        b.cond_br(c, p1, p2);
        // p2 forwards to p3 or join so all three reach the merge point.
        b.switch_to_block(p1);
        let c1 = b.const_i32(1);
        let v1r = b.copy(c1);
        b.br(join);
        b.switch_to_block(p2);
        let c2 = b.const_i32(2);
        let v2r = b.copy(c2);
        b.cond_br(d, p3, join);
        b.switch_to_block(p3);
        let c3 = b.const_i32(3);
        let v3r = b.copy(c3);
        b.br(join);

        b.switch_to_block(join);
        let x = b.phi(IrType::i32(), &[(v1r, p1), (v2r, p2), (v3r, p3)], None);
        b.ret(Some(x));
        (m, f, [p1, p2, p3, join], x, [v1r, v2r, v3r])
    }

    #[test]
    fn test_remove_predecessor_drops_phi_pair() {
        let (mut m, f, [p1, p2, p3, join], x, [v1, v2, v3]) = build_three_way_join();
        verify_function(&m, f).unwrap();
        let uses_v2_before = m.num_uses(v2);

        // Detach the whole p2 -> join edge, then ask the phi side to follow.
        m.remove_successor(p2, join);
        m.remove_predecessor(join, p2);

        assert_eq!(m.block(join).preds.to_vec(), vec![p1, p3]);
        let phi = m.value(x).def_inst.unwrap();
        let ops: Vec<OperandKind> = m.operands_of(phi).map(|op| m.operand(op).kind).collect();
        assert_eq!(
            ops,
            vec![
                OperandKind::Value(v1),
                OperandKind::Block(p1),
                OperandKind::Value(v3),
                OperandKind::Block(p3),
            ]
        );
        assert_eq!(m.num_uses(v2), uses_v2_before - 1);
        verify_function(&m, f).unwrap();
    }

    #[test]
    fn test_redirect_edge_then_reverse_restores_graph() {
        let (mut m, _f, [p1, _p2, _p3, join], _x, _vs) = build_three_way_join();
        let detour = m.new_block_detached("detour");
        m.insert_block_after(detour, p1);

        let preds_before = m.block(join).preds.clone();
        let succs_before = m.block(p1).succs.clone();

        m.redirect_edge(p1, join, detour);
        assert_eq!(m.block(p1).succs.to_vec(), vec![detour]);
        assert_eq!(m.block(detour).preds.to_vec(), vec![p1]);
        assert!(!m.block(join).preds.contains(&p1));

        m.redirect_edge(p1, detour, join);
        assert_eq!(m.block(p1).succs, succs_before);
        assert!(m.block(detour).preds.is_empty());
        let mut now: Vec<Block> = m.block(join).preds.to_vec();
        let mut was: Vec<Block> = preds_before.to_vec();
        now.sort();
        was.sort();
        assert_eq!(now, was);
    }

    /// The S-shaped split: `entry -> a -> exit` with a phi in `exit`;
    /// `entry` is redirected through a fresh block `a2` that also reaches
    /// `exit`, and the phi learns an undef entry for `a2`.
    #[test]
    fn test_redirect_through_new_block_synthesizes_undef() {
        let mut m = IrModule::new();
        let f = m.create_function("split", IrType::i32(), vec![], false);
        let mut b = Builder::new(&mut m, f);
        let entry = b.create_block("entry");
        let a = b.create_block("a");
        let exit = b.create_block("exit");

        b.switch_to_block(entry);
        b.br(a);
        b.switch_to_block(a);
        let forty_two = b.const_i32(42);
        let av = b.copy(forty_two);
        b.br(exit);
        b.switch_to_block(exit);
        let x = b.phi(IrType::i32(), &[(av, a)], None);
        b.ret(Some(x));

        let a2 = b.create_block("a2");
        b.switch_to_block(a2);
        let ninety_nine = b.const_i32(99);
        b.copy(ninety_nine);
        b.br(exit);

        m.redirect_edge(entry, a, a2);
        m.repair_phi_nodes_after_edge_redirect(a2, entry, a);
        m.repair_phi_nodes_after_edge_redirect(exit, a2, a);

        assert_eq!(m.block(entry).succs.to_vec(), vec![a2]);
        assert_eq!(m.block(a2).preds.to_vec(), vec![entry]);

        let phi = m.value(x).def_inst.unwrap();
        let ops: Vec<Operand> = m.operands_of(phi).collect();
        assert_eq!(ops.len(), 4);
        // Original entry intact, plus (undef, a2).
        assert_eq!(m.operand(ops[0]).kind, OperandKind::Value(av));
        assert_eq!(m.operand(ops[1]).kind, OperandKind::Block(a));
        match m.operand(ops[2]).kind {
            OperandKind::Value(u) => {
                assert_eq!(m.value(u).kind, ValueKind::Undef);
                assert_eq!(m.value(u).ty, IrType::i32());
            }
            other => panic!("expected undef value operand, got {:?}", other),
        }
        assert_eq!(m.operand(ops[3]).kind, OperandKind::Block(a2));
        verify_function(&m, f).unwrap();
    }

    #[test]
    fn test_repair_matches_phi_by_alloca_tag() {
        let mut m = IrModule::new();
        let f = m.create_function("tagmatch", IrType::i32(), vec![IrType::i1()], false);
        let mut b = Builder::new(&mut m, f);
        let entry = b.create_block("entry");
        let mid = b.create_block("mid");
        let tail = b.create_block("tail");
        let exit = b.create_block("exit");

        b.switch_to_block(entry);
        let slot = b.alloca(IrType::i32());
        let cond = b.param(0);
        b.cond_br(cond, mid, exit);

        // mid carries a phi for `slot` (single-pred phi, as memory
        // promotion leaves them before simplification).
        b.switch_to_block(mid);
        let seven = b.const_i32(7);
        let mv = b.phi(IrType::i32(), &[(seven, entry)], Some(slot));
        b.br(tail);
        b.switch_to_block(tail);
        b.br(exit);

        b.switch_to_block(exit);
        let zero = b.const_i32(0);
        let x = b.phi(IrType::i32(), &[(zero, entry), (mv, tail)], Some(slot));
        b.ret(Some(x));

        // Splice a bypass: tail's edge into exit moves to a new block that
        // jumps to exit itself.
        let bypass = b.create_block("bypass");
        b.switch_to_block(bypass);
        b.br(exit);
        m.redirect_edge(tail, exit, bypass);
        m.repair_phi_nodes_after_edge_redirect(bypass, tail, exit);
        m.repair_phi_nodes_after_edge_redirect(exit, bypass, mid);

        // The first repair dropped the stale (mv, tail) entry; the second
        // added one for bypass whose value is mid's phi (same alloca tag),
        // not an undef.
        let phi = m.value(x).def_inst.unwrap();
        let ops: Vec<Operand> = m.operands_of(phi).collect();
        assert_eq!(ops.len(), 4);
        assert_eq!(m.operand(ops[0]).kind, OperandKind::Value(zero));
        assert_eq!(m.operand(ops[1]).kind, OperandKind::Block(entry));
        assert_eq!(m.operand(ops[2]).kind, OperandKind::Value(mv));
        assert_eq!(m.operand(ops[3]).kind, OperandKind::Block(bypass));
        verify_function(&m, f).unwrap();
    }

    #[test]
    fn test_repair_drops_stale_entries_in_old_target() {
        let (mut m, f, [p1, _p2, _p3, join], x, [v1, _v2, _v3]) = build_three_way_join();
        // Move p1's edge to a fresh block that does not reach join, then
        // repair: join's phi is the "old_to" side and loses p1.
        let elsewhere = m.new_block_detached("elsewhere");
        m.insert_block_after(elsewhere, p1);
        m.redirect_edge(p1, join, elsewhere);
        m.repair_phi_nodes_after_edge_redirect(elsewhere, p1, join);

        let phi = m.value(x).def_inst.unwrap();
        assert_eq!(m.inst(phi).num_operands, 4);
        let ops: Vec<OperandKind> = m.operands_of(phi).map(|op| m.operand(op).kind).collect();
        assert!(!ops.contains(&OperandKind::Block(p1)));
        assert_eq!(m.num_uses(v1), 0, "join's phi released its use of v1");
        let _ = f;
    }

    #[test]
    fn test_change_phi_predecessor_retargets_in_place() {
        let (mut m, _f, [p1, p2, _p3, join], x, [v1, _v2, _v3]) = build_three_way_join();
        m.change_phi_predecessor(join, p1, p2);
        let phi = m.value(x).def_inst.unwrap();
        let ops: Vec<OperandKind> = m.operands_of(phi).map(|op| m.operand(op).kind).collect();
        assert_eq!(ops[0], OperandKind::Value(v1), "values untouched");
        assert_eq!(ops[1], OperandKind::Block(p2));
        assert_eq!(m.inst(phi).num_operands, 6, "no entries added or removed");
    }

    #[test]
    fn test_replace_all_uses_with_block() {
        let (mut m, f, [p1, p2, p3, join], _x, _vs) = build_three_way_join();
        let fresh = m.new_block_detached("fresh");
        m.insert_block_after(fresh, join);
        m.replace_all_uses_with_block(f, join, fresh);

        // Every branch and phi that said `join` now says `fresh`.
        for blk in [p1, p2, p3] {
            let term = m.terminator(blk).unwrap();
            let targets: Vec<OperandKind> =
                m.operands_of(term).map(|op| m.operand(op).kind).collect();
            assert!(!targets.contains(&OperandKind::Block(join)));
            assert!(targets.contains(&OperandKind::Block(fresh)));
        }
    }

    #[test]
    fn test_sever_all_successors() {
        let (mut m, f, [p1, p2, _p3, join], x, _vs) = build_three_way_join();
        let uses_before = m.num_uses(x);
        m.sever_all_successors(p2);

        assert!(m.block(p2).succs.is_empty());
        assert_eq!(m.terminator(p2), None);
        assert!(!m.block(join).preds.contains(&p2));
        // join's phi shed its p2 pair.
        let phi = m.value(x).def_inst.unwrap();
        assert_eq!(m.inst(phi).num_operands, 4);
        assert_eq!(m.num_uses(x), uses_before);
        let _ = (f, p1);
    }

    #[test]
    fn test_redirect_both_targets_of_cond_br() {
        // A conditional branch with both arms on the same block keeps its
        // edge multiplicity through a redirect.
        let mut m = IrModule::new();
        let f = m.create_function("both", IrType::void(), vec![IrType::i1()], false);
        let mut b = Builder::new(&mut m, f);
        let entry = b.create_block("entry");
        let t1 = b.create_block("t1");
        let t2 = b.create_block("t2");
        b.switch_to_block(entry);
        let c = b.param(0);
        b.cond_br(c, t1, t1);
        b.switch_to_block(t1);
        b.ret(None);
        b.switch_to_block(t2);
        b.ret(None);

        m.redirect_edge(entry, t1, t2);
        assert_eq!(m.block(entry).succs.to_vec(), vec![t2, t2]);
        assert_eq!(m.block(t2).preds.to_vec(), vec![entry, entry]);
        assert!(m.block(t1).preds.is_empty());
        verify_function(&m, f).unwrap();
    }
}
