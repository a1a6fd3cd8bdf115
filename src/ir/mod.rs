pub mod builder;
pub mod cfg;
pub mod edit;
pub mod ir;
pub mod printer;
pub mod types;
pub mod verify;

pub use builder::Builder;
pub use ir::{
    Block, FcmpPred, Func, IcmpPred, Inst, InstData, InstFlags, IrArena, IrConst, IrModule, Loop,
    LoopData, Opcode, Operand, OperandKind, Value, ValueKind,
};
pub use types::{ArrayDim, BasicType, IrType, TypeKind};
