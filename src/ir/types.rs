//! IR types: basic scalars, pointers, arrays, and function signatures.
//!
//! Equality is structural. Two types are *strictly* equal (derived
//! `PartialEq`) if they also agree on the `is_const` qualifier at every
//! level, and *loosely* equal (`loose_eq`) otherwise.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicType {
    I1,
    I8,
    I32,
    I64,
    F32,
    F64,
    Void,
}

/// One dimension of an array type. The first dimension of an array
/// parameter is dynamic (its extent is unknown at compile time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayDim {
    pub dynamic: bool,
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Basic(BasicType),
    Pointer(Box<IrType>),
    Array { elem: Box<IrType>, dims: Vec<ArrayDim> },
    Function { ret: Box<IrType>, params: Vec<IrType>, variadic: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IrType {
    pub kind: TypeKind,
    pub is_const: bool,
}

impl IrType {
    pub fn basic(b: BasicType) -> Self {
        Self { kind: TypeKind::Basic(b), is_const: false }
    }

    pub fn i1() -> Self {
        Self::basic(BasicType::I1)
    }

    pub fn i8() -> Self {
        Self::basic(BasicType::I8)
    }

    pub fn i32() -> Self {
        Self::basic(BasicType::I32)
    }

    pub fn i64() -> Self {
        Self::basic(BasicType::I64)
    }

    pub fn f32() -> Self {
        Self::basic(BasicType::F32)
    }

    pub fn f64() -> Self {
        Self::basic(BasicType::F64)
    }

    pub fn void() -> Self {
        Self::basic(BasicType::Void)
    }

    pub fn pointer_to(elem: IrType) -> Self {
        Self { kind: TypeKind::Pointer(Box::new(elem)), is_const: false }
    }

    pub fn array_of(elem: IrType, dims: Vec<ArrayDim>) -> Self {
        Self { kind: TypeKind::Array { elem: Box::new(elem), dims }, is_const: false }
    }

    pub fn function(ret: IrType, params: Vec<IrType>, variadic: bool) -> Self {
        Self {
            kind: TypeKind::Function { ret: Box::new(ret), params, variadic },
            is_const: false,
        }
    }

    pub fn with_const(mut self) -> Self {
        self.is_const = true;
        self
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Basic(BasicType::Void))
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Basic(BasicType::I1 | BasicType::I8 | BasicType::I32 | BasicType::I64)
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self.kind, TypeKind::Basic(BasicType::F32 | BasicType::F64))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, TypeKind::Pointer(_))
    }

    /// The pointed-to type, if this is a pointer.
    pub fn pointee(&self) -> Option<&IrType> {
        match &self.kind {
            TypeKind::Pointer(elem) => Some(elem),
            _ => None,
        }
    }

    /// The return type, if this is a function type.
    pub fn return_type(&self) -> Option<&IrType> {
        match &self.kind {
            TypeKind::Function { ret, .. } => Some(ret),
            _ => None,
        }
    }

    /// Size in bytes on the target. Arrays with a dynamic dimension decay
    /// to pointers, as do function types.
    pub fn size(&self) -> usize {
        match &self.kind {
            TypeKind::Basic(b) => match b {
                BasicType::I1 | BasicType::I8 => 1,
                BasicType::I32 | BasicType::F32 => 4,
                BasicType::I64 | BasicType::F64 => 8,
                BasicType::Void => 0,
            },
            TypeKind::Pointer(_) | TypeKind::Function { .. } => 8,
            TypeKind::Array { elem, dims } => {
                if dims.iter().any(|d| d.dynamic) {
                    return 8;
                }
                dims.iter().fold(elem.size(), |acc, d| acc * d.size.max(0) as usize)
            }
        }
    }

    /// Structural equality ignoring `is_const` at every level.
    pub fn loose_eq(&self, other: &IrType) -> bool {
        match (&self.kind, &other.kind) {
            (TypeKind::Basic(a), TypeKind::Basic(b)) => a == b,
            (TypeKind::Pointer(a), TypeKind::Pointer(b)) => a.loose_eq(b),
            (
                TypeKind::Array { elem: a, dims: da },
                TypeKind::Array { elem: b, dims: db },
            ) => da == db && a.loose_eq(b),
            (
                TypeKind::Function { ret: ra, params: pa, variadic: va },
                TypeKind::Function { ret: rb, params: pb, variadic: vb },
            ) => {
                va == vb
                    && ra.loose_eq(rb)
                    && pa.len() == pb.len()
                    && pa.iter().zip(pb).all(|(x, y)| x.loose_eq(y))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_vs_loose_equality() {
        let a = IrType::i32();
        let b = IrType::i32().with_const();
        assert_ne!(a, b);
        assert!(a.loose_eq(&b));

        let p1 = IrType::pointer_to(IrType::i32().with_const());
        let p2 = IrType::pointer_to(IrType::i32());
        assert_ne!(p1, p2);
        assert!(p1.loose_eq(&p2));
        assert!(!p1.loose_eq(&IrType::pointer_to(IrType::i64())));
    }

    #[test]
    fn test_array_equality_and_size() {
        let dims = vec![
            ArrayDim { dynamic: false, size: 2 },
            ArrayDim { dynamic: false, size: 3 },
        ];
        let a = IrType::array_of(IrType::i32(), dims.clone());
        let b = IrType::array_of(IrType::i32(), dims);
        assert_eq!(a, b);
        assert_eq!(a.size(), 24);

        let dyn_arr = IrType::array_of(
            IrType::i32(),
            vec![ArrayDim { dynamic: true, size: 0 }, ArrayDim { dynamic: false, size: 3 }],
        );
        assert_eq!(dyn_arr.size(), 8);
        assert!(!a.loose_eq(&dyn_arr));
    }

    #[test]
    fn test_function_type() {
        let f = IrType::function(IrType::i32(), vec![IrType::i32(), IrType::f32()], false);
        assert_eq!(f.return_type(), Some(&IrType::i32()));
        let g = IrType::function(IrType::i32(), vec![IrType::i32().with_const(), IrType::f32()], false);
        assert_ne!(f, g);
        assert!(f.loose_eq(&g));
    }

    #[test]
    fn test_classification() {
        assert!(IrType::i1().is_integer());
        assert!(IrType::f64().is_float());
        assert!(IrType::void().is_void());
        let p = IrType::pointer_to(IrType::f32());
        assert!(p.is_pointer());
        assert_eq!(p.pointee(), Some(&IrType::f32()));
    }
}
