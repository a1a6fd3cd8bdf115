//! Natural-loop detection and depth-ordered traversal.
//!
//! A back edge `latch -> header` (header dominating latch) identifies a
//! loop; the body is everything that reaches the latch without passing
//! through the header. Loops sharing a header are one loop. The forest
//! nests by body containment, and `loops_sorted_by_depth` hands passes
//! the loops innermost first.
//!
//! Requires the dominator tree and timestamps to be current.

use log::debug;
use rustc_hash::FxHashSet;

use crate::ir::ir::{Block, Func, IrModule, Loop, LoopData};

/// Discover every natural loop of `func` and populate
/// `top_level_loops`, nesting and depths included.
pub fn find_natural_loops(module: &mut IrModule, func: Func) {
    module.func_mut(func).top_level_loops.clear();

    let blocks: Vec<Block> = module.blocks_of(func).collect();
    let reachable: FxHashSet<Block> = blocks
        .iter()
        .copied()
        .filter(|&b| module.block(b).idom.is_some() || module.func(func).entry == Some(b))
        .collect();

    // Latches grouped by header, in block-chain order for determinism.
    let mut headers: Vec<Block> = Vec::new();
    let mut latches_of: Vec<Vec<Block>> = Vec::new();
    for &b in &blocks {
        if !reachable.contains(&b) {
            continue;
        }
        for &s in module.block(b).succs.clone().iter() {
            if reachable.contains(&s) && module.dominates(s, b) {
                match headers.iter().position(|&h| h == s) {
                    Some(i) => latches_of[i].push(b),
                    None => {
                        headers.push(s);
                        latches_of.push(vec![b]);
                    }
                }
            }
        }
    }

    // Gather each loop body by walking the CFG backwards from the
    // latches, stopping at the header.
    let mut loop_ids: Vec<Loop> = Vec::new();
    let mut bodies: Vec<FxHashSet<Block>> = Vec::new();
    for (i, &header) in headers.iter().enumerate() {
        let mut body = FxHashSet::default();
        body.insert(header);
        let mut stack: Vec<Block> = Vec::new();
        for &latch in &latches_of[i] {
            if body.insert(latch) {
                stack.push(latch);
            }
        }
        while let Some(b) = stack.pop() {
            for &p in module.block(b).preds.iter() {
                if reachable.contains(&p) && body.insert(p) {
                    stack.push(p);
                }
            }
        }
        let ordered: Vec<Block> = blocks.iter().copied().filter(|b| body.contains(b)).collect();
        let id = module.arena.loops.push(LoopData {
            header,
            blocks: ordered,
            parent: None,
            sub_loops: Vec::new(),
            depth: 0,
        });
        loop_ids.push(id);
        bodies.push(body);
    }
    debug!("loops: found {} natural loops in {}", loop_ids.len(), func);

    // Nest: each loop's parent is the smallest strictly-enclosing loop.
    for i in 0..loop_ids.len() {
        let mut parent: Option<usize> = None;
        for j in 0..loop_ids.len() {
            if i == j || !bodies[j].contains(&module.arena.loops[loop_ids[i]].header) {
                continue;
            }
            if bodies[j].len() <= bodies[i].len() {
                continue; // same blocks or smaller: not an enclosing loop
            }
            if parent.map_or(true, |p| bodies[j].len() < bodies[p].len()) {
                parent = Some(j);
            }
        }
        if let Some(p) = parent {
            module.arena.loops[loop_ids[i]].parent = Some(loop_ids[p]);
            module.arena.loops[loop_ids[p]].sub_loops.push(loop_ids[i]);
        }
    }

    // Depths top-down, then hand the roots to the function.
    for i in 0..loop_ids.len() {
        if module.arena.loops[loop_ids[i]].parent.is_none() {
            assign_depth(module, loop_ids[i], 1);
            module.func_mut(func).top_level_loops.push(loop_ids[i]);
        }
    }
}

fn assign_depth(module: &mut IrModule, l: Loop, depth: u32) {
    module.arena.loops[l].depth = depth;
    let subs = module.arena.loops[l].sub_loops.clone();
    for s in subs {
        assign_depth(module, s, depth + 1);
    }
}

/// Every loop of the forest, innermost first (depth descending), ties
/// broken by the header's post-order id.
pub fn loops_sorted_by_depth(module: &IrModule, func: Func) -> Vec<Loop> {
    let mut all = Vec::new();
    let mut stack: Vec<Loop> = module.func(func).top_level_loops.clone();
    while let Some(l) = stack.pop() {
        all.push(l);
        stack.extend(module.arena.loops[l].sub_loops.iter().copied());
    }
    all.sort_by(|&a, &b| {
        let (la, lb) = (&module.arena.loops[a], &module.arena.loops[b]);
        lb.depth
            .cmp(&la.depth)
            .then_with(|| module.block(la.header).po_id.cmp(&module.block(lb.header).po_id))
    });
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::domtree::{compute_dom_tree_timestamps, compute_dominator_tree};
    use crate::ir::builder::Builder;
    use crate::ir::types::IrType;

    fn analyze(m: &mut IrModule, f: Func) {
        compute_dominator_tree(m, f);
        compute_dom_tree_timestamps(m, f);
        find_natural_loops(m, f);
    }

    /// `entry -> h1 { body1 -> h2 { body2 } -> latch1 } -> exit`
    fn build_nested(m: &mut IrModule) -> (Func, Block, Block) {
        let f = m.create_function("nested", IrType::void(), vec![IrType::i1(), IrType::i1()], false);
        let mut b = Builder::new(m, f);
        let entry = b.create_block("entry");
        let h1 = b.create_block("h1");
        let body1 = b.create_block("body1");
        let h2 = b.create_block("h2");
        let body2 = b.create_block("body2");
        let latch1 = b.create_block("latch1");
        let exit = b.create_block("exit");

        b.switch_to_block(entry);
        b.br(h1);
        b.switch_to_block(h1);
        let c1 = b.param(0);
        b.cond_br(c1, body1, exit);
        b.switch_to_block(body1);
        b.br(h2);
        b.switch_to_block(h2);
        let c2 = b.param(1);
        b.cond_br(c2, body2, latch1);
        b.switch_to_block(body2);
        b.br(h2);
        b.switch_to_block(latch1);
        b.br(h1);
        b.switch_to_block(exit);
        b.ret(None);
        (f, h1, h2)
    }

    #[test]
    fn test_nested_loops_detected() {
        let mut m = IrModule::new();
        let (f, h1, h2) = build_nested(&mut m);
        analyze(&mut m, f);

        assert_eq!(m.func(f).top_level_loops.len(), 1);
        let outer = m.func(f).top_level_loops[0];
        let outer_data = &m.arena.loops[outer];
        assert_eq!(outer_data.header, h1);
        assert_eq!(outer_data.depth, 1);
        assert_eq!(outer_data.sub_loops.len(), 1);

        let inner = outer_data.sub_loops[0];
        let inner_data = &m.arena.loops[inner];
        assert_eq!(inner_data.header, h2);
        assert_eq!(inner_data.depth, 2);
        assert_eq!(inner_data.parent, Some(outer));
        assert_eq!(inner_data.blocks.len(), 2);
        assert!(outer_data.blocks.len() >= 4);
    }

    #[test]
    fn test_innermost_first_ordering() {
        let mut m = IrModule::new();
        let (f, h1, h2) = build_nested(&mut m);
        analyze(&mut m, f);

        let order = loops_sorted_by_depth(&m, f);
        assert_eq!(order.len(), 2);
        assert_eq!(m.arena.loops[order[0]].header, h2, "inner loop first");
        assert_eq!(m.arena.loops[order[1]].header, h1);
    }

    #[test]
    fn test_self_loop() {
        let mut m = IrModule::new();
        let f = m.create_function("selfloop", IrType::void(), vec![IrType::i1()], false);
        let mut b = Builder::new(&mut m, f);
        let entry = b.create_block("entry");
        let spin = b.create_block("spin");
        let exit = b.create_block("exit");
        b.switch_to_block(entry);
        b.br(spin);
        b.switch_to_block(spin);
        let c = b.param(0);
        b.cond_br(c, spin, exit);
        b.switch_to_block(exit);
        b.ret(None);

        analyze(&mut m, f);
        let order = loops_sorted_by_depth(&m, f);
        assert_eq!(order.len(), 1);
        let l = &m.arena.loops[order[0]];
        assert_eq!(l.header, spin);
        assert_eq!(l.blocks, vec![spin]);
        assert_eq!(l.depth, 1);
    }

    #[test]
    fn test_two_siblings_tie_break_by_po_id() {
        let mut m = IrModule::new();
        let f = m.create_function("twins", IrType::void(), vec![IrType::i1(), IrType::i1()], false);
        let mut b = Builder::new(&mut m, f);
        let entry = b.create_block("entry");
        let h1 = b.create_block("h1");
        let h2 = b.create_block("h2");
        let exit = b.create_block("exit");
        b.switch_to_block(entry);
        b.br(h1);
        b.switch_to_block(h1);
        let c1 = b.param(0);
        b.cond_br(c1, h1, h2);
        b.switch_to_block(h2);
        let c2 = b.param(1);
        b.cond_br(c2, h2, exit);
        b.switch_to_block(exit);
        b.ret(None);

        analyze(&mut m, f);
        let order = loops_sorted_by_depth(&m, f);
        assert_eq!(order.len(), 2);
        // Same depth: the header with the smaller post-order id leads.
        let (a, b2) = (m.arena.loops[order[0]].header, m.arena.loops[order[1]].header);
        assert!(m.block(a).po_id < m.block(b2).po_id);
        assert_ne!(a, b2);
        assert!(a == h1 || a == h2);
    }
}
