//! The typed source tree consumed by the lowering engine.
//!
//! This module is the narrow interface to the host compiler: a self-contained
//! rendering of the operations the converter needs from the compiler's typed
//! SSA tree. The host side populates these structures; nothing in here knows
//! how they were produced.
//!
//! - Types carry precision, signedness, overflow behavior, memory size and
//!   alignment; records carry per-field offsets and bit-field metadata.
//! - Expressions are reference-counted trees. SSA names carry the value
//!   range and nonzero-bits mask recorded by the host's range analysis.
//! - A function's blocks are stored in post-order, each with phi nodes,
//!   statements and a terminator. The exit block is implicit: terminators
//!   that leave the function use [`SourceTerm::Exit`].

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Error, Result};

pub type Type = Rc<TypeData>;
pub type Expr = Rc<ExprData>;

/// Declaration handle into [`SourceUnit::decls`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(pub u32);

/// Index of a source basic block within [`SourceFunction::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SrcBlockId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct TypeData {
    pub kind: TypeKind,
    /// Size in memory in bytes; `None` for incomplete or dynamically sized
    /// types (which the lowering rejects).
    pub bytes: Option<u64>,
    /// Alignment in bytes.
    pub align: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Void,
    /// Integers and enumerations. `wraps` is true when overflow is defined
    /// to wrap (unsigned arithmetic, or a signed type under -fwrapv).
    Int {
        bits: u32,
        unsigned: bool,
        wraps: bool,
    },
    /// Booleans may be wider than one bit; only the values 0 and "true"
    /// (1 if unsigned, -1 if signed) are valid.
    Bool { bits: u32, unsigned: bool },
    /// IEEE binary floating point; 16, 32, 64 or 128 bits.
    Float { bits: u32 },
    Ptr { pointee: Type },
    Array {
        elem: Type,
        /// Maximum index of the domain when it is a known constant
        /// (minimum is always 0).
        max_index: Option<u128>,
    },
    Record { fields: Vec<Field> },
    Union { fields: Vec<Field> },
    Vector { elem: Type, count: u32 },
    Complex { elem: Type },
}

/// A record or union member.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: Option<String>,
    /// Byte offset of the containing unit.
    pub offset: u64,
    /// Additional offset in bits; may exceed 8 for packed layouts.
    pub bit_offset: u64,
    /// True for bit-field members; the width is the field type's precision.
    pub bitfield: bool,
    pub ty: Type,
}

impl TypeData {
    pub fn int(bits: u32, unsigned: bool) -> Type {
        TypeData::int_with_wrap(bits, unsigned, unsigned)
    }

    pub fn int_with_wrap(bits: u32, unsigned: bool, wraps: bool) -> Type {
        let bytes = bits.div_ceil(8).next_power_of_two() as u64;
        Rc::new(TypeData {
            kind: TypeKind::Int {
                bits,
                unsigned,
                wraps,
            },
            bytes: Some(bytes),
            align: bytes.min(16) as u32,
        })
    }

    pub fn boolean() -> Type {
        Rc::new(TypeData {
            kind: TypeKind::Bool {
                bits: 1,
                unsigned: true,
            },
            bytes: Some(1),
            align: 1,
        })
    }

    pub fn float(bits: u32) -> Type {
        let bytes = (bits / 8) as u64;
        Rc::new(TypeData {
            kind: TypeKind::Float { bits },
            bytes: Some(bytes),
            align: bytes as u32,
        })
    }

    pub fn pointer(pointee: Type, ptr_bits: u32) -> Type {
        let bytes = (ptr_bits / 8) as u64;
        Rc::new(TypeData {
            kind: TypeKind::Ptr { pointee },
            bytes: Some(bytes),
            align: bytes as u32,
        })
    }

    pub fn array(elem: Type, count: u64) -> Type {
        let bytes = elem.bytes.map(|b| b * count);
        let align = elem.align;
        Rc::new(TypeData {
            kind: TypeKind::Array {
                elem,
                max_index: count.checked_sub(1).map(|m| m as u128),
            },
            bytes,
            align,
        })
    }

    pub fn record(fields: Vec<Field>, bytes: u64, align: u32) -> Type {
        Rc::new(TypeData {
            kind: TypeKind::Record { fields },
            bytes: Some(bytes),
            align,
        })
    }

    pub fn union(fields: Vec<Field>, bytes: u64, align: u32) -> Type {
        Rc::new(TypeData {
            kind: TypeKind::Union { fields },
            bytes: Some(bytes),
            align,
        })
    }

    pub fn vector(elem: Type, count: u32) -> Type {
        let bytes = elem.bytes.map(|b| b * count as u64);
        let align = bytes.unwrap_or(1).min(16) as u32;
        Rc::new(TypeData {
            kind: TypeKind::Vector { elem, count },
            bytes,
            align,
        })
    }

    pub fn complex(elem: Type) -> Type {
        let bytes = elem.bytes.map(|b| b * 2);
        let align = elem.align;
        Rc::new(TypeData {
            kind: TypeKind::Complex { elem },
            bytes,
            align,
        })
    }

    pub fn is_integral(&self) -> bool {
        matches!(self.kind, TypeKind::Int { .. } | TypeKind::Bool { .. })
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.kind, TypeKind::Bool { .. })
    }

    pub fn is_float(&self) -> bool {
        matches!(self.kind, TypeKind::Float { .. })
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, TypeKind::Ptr { .. })
    }

    pub fn is_vector(&self) -> bool {
        matches!(self.kind, TypeKind::Vector { .. })
    }

    pub fn is_complex(&self) -> bool {
        matches!(self.kind, TypeKind::Complex { .. })
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Void)
    }

    /// Signedness as used by comparisons and conversions. Pointers compare
    /// unsigned.
    pub fn is_unsigned(&self) -> bool {
        match &self.kind {
            TypeKind::Int { unsigned, .. } | TypeKind::Bool { unsigned, .. } => *unsigned,
            TypeKind::Ptr { .. } => true,
            _ => false,
        }
    }

    /// Whether overflow is defined to wrap for this type's arithmetic.
    pub fn overflow_wraps(&self) -> bool {
        match &self.kind {
            TypeKind::Int { wraps, .. } => *wraps,
            TypeKind::Bool { unsigned, .. } => *unsigned,
            TypeKind::Ptr { .. } => false,
            _ => false,
        }
    }

    /// The element type of vectors, complex numbers and arrays.
    pub fn element_type(&self) -> Option<&Type> {
        match &self.kind {
            TypeKind::Vector { elem, .. }
            | TypeKind::Complex { elem }
            | TypeKind::Array { elem, .. } => Some(elem),
            _ => None,
        }
    }
}

/// Reject types the engine does not support. Elements of aggregates are not
/// checked here; they are checked when the fields are accessed, so programs
/// with invalid types in unused members can still be analyzed.
pub fn check_type(ty: &TypeData) -> Result<()> {
    match &ty.kind {
        TypeKind::Int { bits, .. } | TypeKind::Bool { bits, .. } => {
            if *bits > 128 {
                return Err(Error::not_implemented(
                    "check_type: integral type with precision > 128",
                ));
            }
        }
        TypeKind::Float { bits } => {
            if !matches!(bits, 16 | 32 | 64 | 128) {
                return Err(Error::not_implemented(format!("check_type: fp{}", bits)));
            }
        }
        TypeKind::Vector { elem, .. } | TypeKind::Complex { elem } => check_type(elem)?,
        _ => {}
    }
    Ok(())
}

/// The logical bitsize used in the IR for a source type.
pub fn bitsize_for_type(ty: &TypeData) -> Result<u64> {
    check_type(ty)?;
    match &ty.kind {
        TypeKind::Int { bits, .. } | TypeKind::Bool { bits, .. } => Ok(*bits as u64),
        _ => {
            let bytes = ty
                .bytes
                .ok_or_else(|| Error::not_implemented("bitsize_for_type: incomplete type"))?;
            Ok(bytes * 8)
        }
    }
}

/// The size of a source type when stored in memory.
pub fn bytesize_for_type(ty: &TypeData) -> Result<u64> {
    ty.bytes
        .ok_or_else(|| Error::not_implemented("bytesize_for_type: incomplete type"))
}

/// How an SSA name got its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsaDef {
    /// Defined by a statement or phi; looked up in the conversion table.
    Stmt,
    /// The default definition of a function parameter.
    Param(u32),
    /// The default definition of an uninitialized local: reading it yields
    /// a fully indeterminate value.
    UninitVar(DeclId),
}

/// A recorded value range for an SSA name (inclusive bounds, possibly
/// several disjoint pairs).
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    pub pairs: Vec<(u128, u128)>,
}

/// Constructor element position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtorIndex {
    Element(u64),
    /// A `[lo ... hi]` designator; not supported by the lowering.
    Range,
    Field(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprData {
    pub kind: ExprKind,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    SsaName {
        id: u32,
        def: SsaDef,
        range: Option<ValueRange>,
        nonzero_bits: Option<u128>,
    },
    IntCst {
        value: u128,
    },
    /// IEEE bit pattern of a floating-point literal.
    RealCst {
        bits: u128,
    },
    StringCst {
        bytes: Vec<u8>,
    },
    VectorCst {
        elems: Vec<Expr>,
    },
    ComplexCst {
        real: Expr,
        imag: Expr,
    },
    Constructor {
        elems: Vec<(CtorIndex, Expr)>,
        no_clearing: bool,
        /// An end-of-life clobber rather than an initializer.
        clobber: bool,
        /// True when the clobber marks the end of the object's lifetime.
        clobber_eol: bool,
    },
    /// `*(base + offset)`.
    MemRef {
        base: Expr,
        offset: Expr,
    },
    /// `base + (step * index + index2 + offset)`.
    TargetMemRef {
        base: Expr,
        offset: Expr,
        index: Option<Expr>,
        step: Option<Expr>,
        index2: Option<Expr>,
    },
    ArrayRef {
        array: Expr,
        index: Expr,
    },
    ComponentRef {
        object: Expr,
        /// Index into the record type's field list.
        field: usize,
    },
    BitFieldRef {
        object: Expr,
        bits: u64,
        bit_offset: u64,
    },
    AddrExpr {
        operand: Expr,
    },
    ViewConvert {
        operand: Expr,
    },
    RealPart {
        operand: Expr,
    },
    ImagPart {
        operand: Expr,
    },
    VarDecl {
        decl: DeclId,
    },
    ResultDecl {
        decl: DeclId,
    },
    /// Folded arithmetic; only appears inside initializers.
    Unary {
        code: UnaryCode,
        arg: Expr,
    },
    /// Folded arithmetic (such as `&a - &b`); only appears inside
    /// initializers.
    Binary {
        code: BinaryCode,
        arg1: Expr,
        arg2: Expr,
    },
}

impl ExprKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::SsaName { .. } => "ssa_name",
            ExprKind::IntCst { .. } => "integer_cst",
            ExprKind::RealCst { .. } => "real_cst",
            ExprKind::StringCst { .. } => "string_cst",
            ExprKind::VectorCst { .. } => "vector_cst",
            ExprKind::ComplexCst { .. } => "complex_cst",
            ExprKind::Constructor { .. } => "constructor",
            ExprKind::MemRef { .. } => "mem_ref",
            ExprKind::TargetMemRef { .. } => "target_mem_ref",
            ExprKind::ArrayRef { .. } => "array_ref",
            ExprKind::ComponentRef { .. } => "component_ref",
            ExprKind::BitFieldRef { .. } => "bit_field_ref",
            ExprKind::AddrExpr { .. } => "addr_expr",
            ExprKind::ViewConvert { .. } => "view_convert_expr",
            ExprKind::RealPart { .. } => "realpart_expr",
            ExprKind::ImagPart { .. } => "imagpart_expr",
            ExprKind::VarDecl { .. } => "var_decl",
            ExprKind::ResultDecl { .. } => "result_decl",
            ExprKind::Unary { .. } => "unary_expr",
            ExprKind::Binary { .. } => "binary_expr",
        }
    }
}

impl ExprData {
    pub fn int_cst(ty: Type, value: u128) -> Expr {
        Rc::new(ExprData {
            kind: ExprKind::IntCst { value },
            ty,
        })
    }

    pub fn ssa(ty: Type, id: u32) -> Expr {
        Rc::new(ExprData {
            kind: ExprKind::SsaName {
                id,
                def: SsaDef::Stmt,
                range: None,
                nonzero_bits: None,
            },
            ty,
        })
    }

    pub fn param(ty: Type, id: u32, param: u32) -> Expr {
        Rc::new(ExprData {
            kind: ExprKind::SsaName {
                id,
                def: SsaDef::Param(param),
                range: None,
                nonzero_bits: None,
            },
            ty,
        })
    }
}

/// Unary tree codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryCode {
    Abs,
    Absu,
    BitNot,
    /// Float to integer truncation.
    FixTrunc,
    /// Integer to float.
    Float,
    Negate,
    /// Value-preserving conversion (NOP/CONVERT).
    Convert,
    Paren,
    Conj,
    VecUnpackLo,
    VecUnpackHi,
    VecUnpackFloatLo,
    VecUnpackFloatHi,
}

/// Binary tree codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryCode {
    Eq,
    Ne,
    Ge,
    Gt,
    Le,
    Lt,
    UnEq,
    UnLt,
    UnLe,
    UnGt,
    UnGe,
    Unordered,
    Ordered,
    Ltgt,
    BitAnd,
    BitIor,
    BitXor,
    ExactDiv,
    Lshift,
    Rshift,
    Lrotate,
    Rrotate,
    Max,
    Min,
    Minus,
    Mult,
    Plus,
    PointerDiff,
    PointerPlus,
    Rdiv,
    TruncDiv,
    TruncMod,
    WidenMult,
    MultHighpart,
    /// Build a complex value from real and imaginary parts.
    Complex,
    VecPackTrunc,
    VecPackFixTrunc,
    VecWidenMultLo,
    VecWidenMultHi,
}

/// Ternary tree codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TernaryCode {
    Cond,
    VecCond,
    VecPerm,
    Sad,
    DotProd,
    BitInsert,
}

/// Right-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Rhs {
    Single(Expr),
    Unary {
        code: UnaryCode,
        arg: Expr,
    },
    Binary {
        code: BinaryCode,
        arg1: Expr,
        arg2: Expr,
    },
    Ternary {
        code: TernaryCode,
        arg1: Expr,
        arg2: Expr,
        arg3: Expr,
    },
}

/// Call classification provided by the host compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    Builtin(String),
    Internal(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign {
        lhs: Expr,
        rhs: Rhs,
    },
    Call {
        lhs: Option<Expr>,
        target: CallTarget,
        args: Vec<Expr>,
    },
    Return {
        value: Option<Expr>,
    },
    Asm {
        template: String,
        nof_labels: u32,
    },
    Nop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub low: Expr,
    pub high: Option<Expr>,
    pub block: SrcBlockId,
}

/// Block terminator in the source CFG.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceTerm {
    Jump(SrcBlockId),
    Cond {
        code: BinaryCode,
        lhs: Expr,
        rhs: Expr,
        true_block: SrcBlockId,
        false_block: SrcBlockId,
    },
    Switch {
        index: Expr,
        cases: Vec<SwitchCase>,
        default_block: SrcBlockId,
    },
    /// Leaves the function: a return, or a block with no successors such as
    /// one ending in `__builtin_unreachable`.
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourcePhi {
    /// The defined SSA name.
    pub result: Expr,
    /// One `(value, predecessor)` pair per incoming edge.
    pub args: Vec<(Expr, SrcBlockId)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceBlock {
    pub phis: Vec<SourcePhi>,
    pub stmts: Vec<Stmt>,
    pub term: SourceTerm,
    /// Exception or computed-goto edges leave the block.
    pub has_abnormal_edge: bool,
    /// The block is part of an irreducible loop.
    pub in_irreducible_loop: bool,
}

impl SourceBlock {
    pub fn new(term: SourceTerm) -> Self {
        SourceBlock {
            phis: Vec::new(),
            stmts: Vec::new(),
            term,
            has_abnormal_edge: false,
            in_irreducible_loop: false,
        }
    }
}

/// A function parameter as described by the host compiler.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: Option<String>,
    pub ty: Type,
    /// Declared nonnull (directly or via an all-pointers attribute).
    pub nonnull: bool,
    /// The implicit `this` of a constructor; bound to memory id 1.
    pub is_this: bool,
    /// Interprocedurally known bits: the parameter satisfies
    /// `(param & !mask) == value` at every call site.
    pub known_bits: Option<(u128, u128)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceFunction {
    pub name: String,
    pub params: Vec<ParamDecl>,
    /// Basic blocks in post-order: the entry block is last.
    pub blocks: Vec<SourceBlock>,
    pub locals: Vec<DeclId>,
    /// The result declaration, absent for void functions.
    pub result: Option<DeclId>,
    /// Nested functions carry a static chain and are not supported.
    pub has_static_chain: bool,
}

/// A variable declaration (global, local, or function result).
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: Option<String>,
    pub ty: Type,
    pub is_static: bool,
    pub read_only: bool,
    /// Compiler-introduced data (switch tables and the like); unconstrained
    /// pointers cannot alias it.
    pub artificial: bool,
    /// The `alias` attribute: this decl names another variable's storage.
    pub alias_of: Option<String>,
    pub init: Option<Expr>,
}

/// The translation unit: the declaration arena, the global variables, and
/// target-specific queries.
#[derive(Debug, Clone, Default)]
pub struct SourceUnit {
    pub decls: Vec<VarDecl>,
    pub globals: Vec<DeclId>,
    /// Value of CLZ at zero per operand width, when the target defines one.
    pub clz_zero_values: HashMap<u32, u64>,
    /// Value of CTZ at zero per operand width, when the target defines one.
    pub ctz_zero_values: HashMap<u32, u64>,
}

impl SourceUnit {
    pub fn decl(&self, id: DeclId) -> &VarDecl {
        &self.decls[id.0 as usize]
    }

    pub fn add_decl(&mut self, decl: VarDecl) -> DeclId {
        self.decls.push(decl);
        DeclId(self.decls.len() as u32 - 1)
    }

    pub fn add_global(&mut self, decl: VarDecl) -> DeclId {
        let id = self.add_decl(decl);
        self.globals.push(id);
        id
    }

    pub fn clz_value_at_zero(&self, bits: u32) -> Option<u64> {
        self.clz_zero_values.get(&bits).copied()
    }

    pub fn ctz_value_at_zero(&self, bits: u32) -> Option<u64> {
        self.ctz_zero_values.get(&bits).copied()
    }
}
