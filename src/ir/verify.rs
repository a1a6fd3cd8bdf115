//! IR invariant checker.
//!
//! Walks a function and checks the structural guarantees every mutation
//! primitive is supposed to preserve: list linkage, use-list agreement,
//! CFG symmetry, phi shape, terminator presence, dest/def pairing. The
//! first violation comes back as `Err`; the test suite runs this after
//! every scenario.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::ir::{Block, Func, Inst, IrModule, Operand, OperandKind, Value};

pub fn verify_function(module: &IrModule, func: Func) -> Result<(), String> {
    let blocks: Vec<Block> = module.blocks_of(func).collect();

    if blocks.len() != module.func(func).block_count as usize {
        return Err(format!(
            "block_count says {} but the chain holds {}",
            module.func(func).block_count,
            blocks.len()
        ));
    }

    for &b in &blocks {
        if module.block(b).parent != Some(func) {
            return Err(format!("{} is on the chain of {} but claims another parent", b, func));
        }
        verify_block(module, b)?;
    }

    verify_cfg_symmetry(module, &blocks)?;
    verify_use_lists(module)?;
    Ok(())
}

fn verify_block(module: &IrModule, b: Block) -> Result<(), String> {
    let mut prev: Option<Inst> = None;
    let mut cur = module.block(b).head;
    let mut seen_non_phi = false;

    while let Some(i) = cur {
        let data = module.inst(i);
        if data.parent != Some(b) {
            return Err(format!("{} is in {}'s chain but claims another parent", i, b));
        }
        if data.prev != prev {
            return Err(format!("{}: prev link disagrees with the chain", i));
        }

        verify_operand_list(module, i)?;

        if let Some(d) = data.dest {
            if module.value(d).def_inst != Some(i) {
                return Err(format!("{} defines {} but the value names another def", i, d));
            }
        }

        if !data.is_tombstone() {
            if data.is_phi() {
                if seen_non_phi {
                    return Err(format!("{}: phi after the start of the body in {}", i, b));
                }
            } else {
                seen_non_phi = true;
            }
        }

        prev = cur;
        cur = data.next;
    }
    if module.block(b).tail != prev {
        return Err(format!("{}: tail does not match the end of the chain", b));
    }

    // A non-empty block ends in a terminator, or a tombstone awaiting
    // sweep.
    if let Some(t) = module.block(b).tail {
        let td = module.inst(t);
        if !td.is_terminator() && !td.is_tombstone() {
            return Err(format!("{} ends with {:?}, not a terminator", b, td.opcode));
        }
    }

    verify_phi_shape(module, b)?;
    Ok(())
}

fn verify_operand_list(module: &IrModule, i: Inst) -> Result<(), String> {
    let data = module.inst(i);
    let mut n = 0u32;
    let mut prev: Option<Operand> = None;
    let mut cur = data.operand_head;
    while let Some(op) = cur {
        let od = module.operand(op);
        if od.user != i {
            return Err(format!("{} sits on {}'s operand list but names another user", op, i));
        }
        if od.prev != prev {
            return Err(format!("{}: operand prev link disagrees with the list", op));
        }
        n += 1;
        if n > data.num_operands {
            return Err(format!("{}: operand list is longer than num_operands (cycle?)", i));
        }
        if let OperandKind::Value(v) = od.kind {
            if module.value(v).is_constant() && od.next_use.is_some() {
                return Err(format!("{}: constant operand is on a use list", op));
            }
        }
        prev = cur;
        cur = od.next;
    }
    if n != data.num_operands {
        return Err(format!("{}: num_operands says {} but the list holds {}", i, data.num_operands, n));
    }
    if data.operand_tail != prev {
        return Err(format!("{}: operand_tail does not match the end of the list", i));
    }
    Ok(())
}

fn verify_phi_shape(module: &IrModule, b: Block) -> Result<(), String> {
    let preds = &module.block(b).preds;
    for phi in module.phis(b) {
        let data = module.inst(phi);
        if data.num_operands != 2 * preds.len() as u32 {
            return Err(format!(
                "{} in {} has {} operands for {} predecessors",
                phi,
                b,
                data.num_operands,
                preds.len()
            ));
        }
        let mut incoming: Vec<Block> = Vec::new();
        for (k, op) in module.operands_of(phi).enumerate() {
            match (k % 2, module.operand(op).kind) {
                (0, OperandKind::Value(_)) => {}
                (1, OperandKind::Block(src)) => incoming.push(src),
                _ => {
                    return Err(format!("{} in {}: (value, block) interleaving broken", phi, b));
                }
            }
        }
        let mut want: Vec<Block> = preds.to_vec();
        incoming.sort();
        want.sort();
        if incoming != want {
            return Err(format!("{} in {}: incoming blocks differ from predecessors", phi, b));
        }
    }
    Ok(())
}

fn verify_cfg_symmetry(module: &IrModule, blocks: &[Block]) -> Result<(), String> {
    let mut succ_count: FxHashMap<(Block, Block), u32> = FxHashMap::default();
    let mut pred_count: FxHashMap<(Block, Block), u32> = FxHashMap::default();
    for &b in blocks {
        for &s in module.block(b).succs.iter() {
            *succ_count.entry((b, s)).or_insert(0) += 1;
        }
        for &p in module.block(b).preds.iter() {
            *pred_count.entry((p, b)).or_insert(0) += 1;
        }
    }
    if succ_count != pred_count {
        for (&(a, b), &n) in &succ_count {
            if pred_count.get(&(a, b)) != Some(&n) {
                return Err(format!("edge {} -> {}: successor side counts {}, predecessor side {}",
                    a, b, n, pred_count.get(&(a, b)).copied().unwrap_or(0)));
            }
        }
        for (&(a, b), &n) in &pred_count {
            if succ_count.get(&(a, b)) != Some(&n) {
                return Err(format!("edge {} -> {}: predecessor side counts {}, successor side {}",
                    a, b, n, succ_count.get(&(a, b)).copied().unwrap_or(0)));
            }
        }
    }
    Ok(())
}

/// Use lists agree with operands across the whole arena: for every
/// non-constant value, the operands on its use list are exactly the
/// value operands that reference it.
fn verify_use_lists(module: &IrModule) -> Result<(), String> {
    let mut refs: FxHashMap<Value, FxHashSet<Operand>> = FxHashMap::default();
    for (i, _) in module.arena.insts.iter() {
        for op in module.operands_of(i) {
            if let OperandKind::Value(v) = module.operand(op).kind {
                if !module.value(v).is_constant() {
                    refs.entry(v).or_default().insert(op);
                }
            }
        }
    }
    for (v, data) in module.arena.values.iter() {
        if data.is_constant() {
            if data.first_use.is_some() {
                return Err(format!("constant {} has a use list", v));
            }
            continue;
        }
        let mut listed: FxHashSet<Operand> = FxHashSet::default();
        for op in module.uses_of(v) {
            if !listed.insert(op) {
                return Err(format!("{}: use list of {} cycles", op, v));
            }
            if module.operand(op).kind != OperandKind::Value(v) {
                return Err(format!("{} is on {}'s use list but references something else", op, v));
            }
        }
        let expected = refs.remove(&v).unwrap_or_default();
        if listed != expected {
            return Err(format!(
                "{}: use list holds {} operands, instructions reference it {} times",
                v,
                listed.len(),
                expected.len()
            ));
        }
    }
    Ok(())
}
