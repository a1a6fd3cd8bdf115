//! Hash map from value identity to value, used by replacement and value
//! numbering.
//!
//! Constants are never keys: a constant's identity is its contents, not
//! its handle, and remapping one would break referential semantics.
//! Non-constants hash by handle index smeared with a Fibonacci-style
//! multiplier; constants hash by typed payload bits, so two distinct
//! constant records with equal contents land in the same bucket.

use cranelift_entity::EntityRef;
use log::warn;

use crate::ir::ir::{IrArena, IrConst, Value};

const HASH_MULT: u64 = 2654435761;

#[derive(Debug, Clone)]
struct Node {
    key: Value,
    val: Value,
    next: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ValueMap {
    /// Head node index per bucket. Bucket count is a power of two.
    buckets: Vec<Option<u32>>,
    /// Chain nodes, pooled; chains link through indices.
    nodes: Vec<Node>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::with_capacity(16)
    }

    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.next_power_of_two().max(4);
        Self { buckets: vec![None; cap], nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn hash(arena: &IrArena, v: Value) -> u64 {
        match arena.values[v].as_constant() {
            Some(c) => {
                // Variant tag keeps e.g. I32(0) and I64(0) apart.
                let tag = match c {
                    IrConst::I1(_) => 1u64,
                    IrConst::I8(_) => 2,
                    IrConst::I32(_) => 3,
                    IrConst::I64(_) => 4,
                    IrConst::F32(_) => 5,
                    IrConst::F64(_) => 6,
                };
                (c.payload_bits() ^ (tag << 56)).wrapping_mul(HASH_MULT)
            }
            None => (v.index() as u64).wrapping_mul(HASH_MULT),
        }
    }

    fn keys_eq(arena: &IrArena, a: Value, b: Value) -> bool {
        if a == b {
            return true;
        }
        match (arena.values[a].as_constant(), arena.values[b].as_constant()) {
            (Some(ca), Some(cb)) => ca.contents_eq(cb),
            _ => false,
        }
    }

    fn bucket_of(&self, arena: &IrArena, v: Value) -> usize {
        Self::hash(arena, v) as usize & (self.buckets.len() - 1)
    }

    /// Insert or overwrite the mapping `key -> val`. Constant keys are
    /// refused.
    pub fn insert(&mut self, arena: &IrArena, key: Value, val: Value) {
        if arena.values[key].is_constant() {
            warn!("value_map: refusing constant key {}", key);
            return;
        }
        if self.nodes.len() + 1 > self.buckets.len() * 3 / 4 {
            self.grow(arena);
        }
        let b = self.bucket_of(arena, key);
        let mut cur = self.buckets[b];
        while let Some(n) = cur {
            if Self::keys_eq(arena, self.nodes[n as usize].key, key) {
                self.nodes[n as usize].val = val;
                return;
            }
            cur = self.nodes[n as usize].next;
        }
        let n = self.nodes.len() as u32;
        self.nodes.push(Node { key, val, next: self.buckets[b] });
        self.buckets[b] = Some(n);
    }

    pub fn get(&self, arena: &IrArena, key: Value) -> Option<Value> {
        let b = self.bucket_of(arena, key);
        let mut cur = self.buckets[b];
        while let Some(n) = cur {
            let node = &self.nodes[n as usize];
            if Self::keys_eq(arena, node.key, key) {
                return Some(node.val);
            }
            cur = node.next;
        }
        None
    }

    /// The mapped value, or `v` itself when absent. Constants always map
    /// to themselves.
    pub fn remap(&self, arena: &IrArena, v: Value) -> Value {
        if arena.values[v].is_constant() {
            return v;
        }
        self.get(arena, v).unwrap_or(v)
    }

    /// Merge every entry of `src` into `self`, overwriting on collision.
    pub fn merge(&mut self, arena: &IrArena, src: &ValueMap) {
        for node in &src.nodes {
            self.insert(arena, node.key, node.val);
        }
    }

    fn grow(&mut self, arena: &IrArena) {
        let new_cap = self.buckets.len() * 2;
        self.buckets = vec![None; new_cap];
        for i in 0..self.nodes.len() {
            let b = self.bucket_of(arena, self.nodes[i].key);
            self.nodes[i].next = self.buckets[b];
            self.buckets[b] = Some(i as u32);
        }
    }
}

impl Default for ValueMap {
    fn default() -> Self {
        Self::new()
    }
}
