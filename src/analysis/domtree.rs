//! Dominator tree construction and O(1) dominance queries.
//!
//! Construction is the iterative Cooper–Harvey–Kennedy scheme over a
//! reverse postorder. Queries go through Euler-tour timestamps: after
//! `compute_dom_tree_timestamps`, `a` dominates `b` iff `a`'s interval
//! encloses `b`'s. Both traversals use explicit stacks; a chain of
//! thousands of blocks must not recurse.
//!
//! Unreachable blocks get no immediate dominator and undefined
//! timestamps; callers must not query dominance into unreachable code.

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::ir::{Block, Func, IrModule};

impl IrModule {
    /// O(1) dominance check. Valid only after
    /// `compute_dom_tree_timestamps`, and only for reachable blocks.
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        let (ba, bb) = (self.block(a), self.block(b));
        ba.dom_tin <= bb.dom_tin && ba.dom_tout >= bb.dom_tout
    }
}

/// Postorder over the CFG from the entry block, explicit-stack DFS.
fn cfg_postorder(module: &IrModule, entry: Block) -> Vec<Block> {
    let mut postorder = Vec::new();
    let mut visited = FxHashSet::default();
    let mut stack: Vec<(Block, usize)> = vec![(entry, 0)];
    visited.insert(entry);
    loop {
        let Some(&mut (b, ref mut idx)) = stack.last_mut() else {
            break;
        };
        let next = {
            let succs = &module.block(b).succs;
            if *idx < succs.len() {
                let s = succs[*idx];
                *idx += 1;
                Some(s)
            } else {
                None
            }
        };
        match next {
            Some(s) => {
                if visited.insert(s) {
                    stack.push((s, 0));
                }
            }
            None => {
                postorder.push(b);
                stack.pop();
            }
        }
    }
    postorder
}

/// Build the dominator tree of `func`: per reachable block, `idom`,
/// `dom_children`, and the post-order id used as a tie-breaker elsewhere.
/// Timestamps still need a `compute_dom_tree_timestamps` pass.
pub fn compute_dominator_tree(module: &mut IrModule, func: Func) {
    let Some(entry) = module.func(func).entry else {
        return;
    };
    let postorder = cfg_postorder(module, entry);
    debug!("domtree: {} of {} blocks reachable in {}", postorder.len(),
        module.func(func).block_count, func);

    let po_num: FxHashMap<Block, usize> =
        postorder.iter().enumerate().map(|(i, &b)| (b, i)).collect();

    // Reset previous results; unreachable blocks keep idom = None.
    let all_blocks: Vec<Block> = module.blocks_of(func).collect();
    for b in all_blocks {
        let data = module.block_mut(b);
        data.idom = None;
        data.dom_children.clear();
    }
    for (i, &b) in postorder.iter().enumerate() {
        module.block_mut(b).po_id = i as u32;
    }

    let mut idom: FxHashMap<Block, Block> = FxHashMap::default();
    idom.insert(entry, entry);

    let rpo: Vec<Block> = postorder.iter().rev().copied().collect();
    let mut changed = true;
    while changed {
        changed = false;
        for &b in rpo.iter().skip(1) {
            let mut new_idom: Option<Block> = None;
            for &p in module.block(b).preds.iter() {
                if !idom.contains_key(&p) {
                    continue; // unreachable or not yet reached this round
                }
                new_idom = Some(match new_idom {
                    None => p,
                    Some(cur) => intersect(p, cur, &idom, &po_num),
                });
            }
            if let Some(ni) = new_idom {
                if idom.get(&b) != Some(&ni) {
                    idom.insert(b, ni);
                    changed = true;
                }
            }
        }
    }

    for &b in &rpo {
        if b == entry {
            continue;
        }
        if let Some(&parent) = idom.get(&b) {
            module.block_mut(b).idom = Some(parent);
            module.block_mut(parent).dom_children.push(b);
        }
    }
}

/// Walk two candidate dominators up to their common ancestor, comparing
/// by post-order number.
fn intersect(
    mut a: Block,
    mut b: Block,
    idom: &FxHashMap<Block, Block>,
    po_num: &FxHashMap<Block, usize>,
) -> Block {
    while a != b {
        while po_num[&a] < po_num[&b] {
            a = idom[&a];
        }
        while po_num[&b] < po_num[&a] {
            b = idom[&b];
        }
    }
    a
}

/// Assign Euler-tour entry/exit counters over the dominator tree, from
/// the entry block down through `dom_children`.
pub fn compute_dom_tree_timestamps(module: &mut IrModule, func: Func) {
    let Some(entry) = module.func(func).entry else {
        return;
    };
    let mut counter: u32 = 0;
    counter += 1;
    module.block_mut(entry).dom_tin = counter;
    let mut stack: Vec<(Block, usize)> = vec![(entry, 0)];
    loop {
        let Some(&mut (b, ref mut idx)) = stack.last_mut() else {
            break;
        };
        let child = {
            let children = &module.block(b).dom_children;
            if *idx < children.len() {
                let c = children[*idx];
                *idx += 1;
                Some(c)
            } else {
                None
            }
        };
        match child {
            Some(c) => {
                counter += 1;
                module.block_mut(c).dom_tin = counter;
                stack.push((c, 0));
            }
            None => {
                counter += 1;
                module.block_mut(b).dom_tout = counter;
                stack.pop();
            }
        }
    }
}
