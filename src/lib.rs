//! SSA-form mid-level IR core.
//!
//! A module owns functions, each function owns a CFG of basic blocks, each
//! block owns a linear list of instructions, and every non-void instruction
//! defines exactly one value that other instructions reference through
//! operand records. All IR objects live in one arena owned by the module;
//! mutation primitives keep use lists, operand lists, and CFG edge arrays
//! consistent through every edit.

pub mod common;
pub mod ir;
pub mod analysis;
