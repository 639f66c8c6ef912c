//! Deref-chain IR for shader programs.
//!
//! The IR is structured rather than CFG-based:
//! - A `Program` owns all variables and functions.
//! - A function has one or more overloads (`Signature`), each optionally with a
//!   `FuncBody`.
//! - A body is a tree of `Block`s. A block is an ordered list of instructions;
//!   `If` instructions own a then-block and an else-block.
//! - Storage locations are named by `Deref` chains rooted at a variable.
//!
//! Assumptions:
//! - Type checking has already occurred; every deref and value is well-typed.
//! - Instructions, derefs and blocks are owned by exactly one parent. New ones
//!   are only created through the body's `BodyAlloc`, which gives each a fresh
//!   ID, so two instructions never share a destination.

pub mod builder;
pub mod display;
pub mod metadata;
pub mod types;
pub mod typing;
pub mod verify;

#[cfg(test)]
mod metadata_tests;
#[cfg(test)]
mod verify_tests;

use crate::IdArena;
use builder::{BodyAlloc, Cursor};
use metadata::{Metadata, MetadataSet};
use types::TypeRef;

// =============================================================================
// ID Types
// =============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<u32> for $name {
            fn from(id: u32) -> Self {
                $name(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Variable in the program-wide variable table.
    VarId,
    "v"
);
define_id!(
    /// Function in the program.
    FuncId,
    "f"
);
define_id!(
    /// Instruction within a function body.
    InstId,
    "i"
);
define_id!(
    /// Deref chain within a function body. Distinct derefs never share an ID.
    DerefId,
    "d"
);
define_id!(
    /// Block within a function body.
    BlockId,
    "bb"
);

// =============================================================================
// Variables
// =============================================================================

/// Storage class of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableMode {
    Uniform,
    ShaderIn,
    ShaderOut,
    Shared,
    Global,
    /// Function-local temporary.
    Local,
    /// Function parameter.
    Param,
}

impl VariableMode {
    /// Keyword used for this mode in textual IR.
    pub fn keyword(self) -> &'static str {
        match self {
            VariableMode::Uniform => "uniform",
            VariableMode::ShaderIn => "in",
            VariableMode::ShaderOut => "out",
            VariableMode::Shared => "shared",
            VariableMode::Global => "global",
            VariableMode::Local => "local",
            VariableMode::Param => "param",
        }
    }

    /// Whether variables of this mode are declared at program scope.
    pub fn is_global(self) -> bool {
        !matches!(self, VariableMode::Local | VariableMode::Param)
    }
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub ty: TypeRef,
    pub mode: VariableMode,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: TypeRef, mode: VariableMode) -> Self {
        Variable {
            name: name.into(),
            ty,
            mode,
        }
    }
}

/// Program-wide variable table.
pub type Variables = IdArena<VarId, Variable>;

// =============================================================================
// Deref chains and values
// =============================================================================

/// One step of a deref chain.
#[derive(Debug)]
pub enum DerefStep {
    /// Struct member by declaration index.
    Field(u32),
    /// Array element, matrix column or vector component.
    Index(Box<Value>),
    /// Every index, pairwise with the other operand of a copy.
    Wildcard,
}

/// A storage location: a root variable followed by field/index steps.
///
/// Derefs are deliberately not `Clone`. Attaching a location to a second
/// instruction requires `BodyAlloc::clone_deref`, which produces an
/// independent chain with a fresh ID.
#[derive(Debug)]
pub struct Deref {
    id: DerefId,
    var: VarId,
    steps: Vec<DerefStep>,
}

impl Deref {
    pub(crate) fn new(id: DerefId, var: VarId, steps: Vec<DerefStep>) -> Self {
        Deref { id, var, steps }
    }

    pub fn id(&self) -> DerefId {
        self.id
    }

    pub fn var(&self) -> VarId {
        self.var
    }

    pub fn steps(&self) -> &[DerefStep] {
        &self.steps
    }

    pub fn wildcard_count(&self) -> usize {
        self.steps.iter().filter(|s| matches!(s, DerefStep::Wildcard)).count()
    }

    pub fn has_wildcard(&self) -> bool {
        self.wildcard_count() > 0
    }

    pub fn ends_with_wildcard(&self) -> bool {
        matches!(self.steps.last(), Some(DerefStep::Wildcard))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Eq,
    Ne,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
        }
    }
}

/// An rvalue.
#[derive(Debug)]
pub enum Value {
    Const(Constant),
    /// Read the value stored at a location.
    Load(Deref),
    /// Integer discriminant held by a subroutine handle.
    SubroutineIndex(Box<Value>),
    Binary {
        op: BinOp,
        lhs: Box<Value>,
        rhs: Box<Value>,
    },
}

impl Value {
    pub fn int(value: i32) -> Value {
        Value::Const(Constant::Int(value))
    }

    pub fn bool(value: bool) -> Value {
        Value::Const(Constant::Bool(value))
    }

    pub fn binary(op: BinOp, lhs: Value, rhs: Value) -> Value {
        Value::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

// =============================================================================
// Instructions
// =============================================================================

/// A particular overload of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SigRef {
    pub func: FuncId,
    pub overload: u32,
}

#[derive(Debug)]
pub enum Callee {
    /// A known overload.
    Direct(SigRef),
    /// Dispatch through the runtime value of a subroutine variable,
    /// optionally indexed when the variable is an array of handles.
    Indirect {
        binding: VarId,
        array_index: Option<Box<Value>>,
    },
}

#[derive(Debug)]
pub enum InstKind {
    /// Copy the whole value at `src` to `dst`. Both resolve to the same type.
    Copy { dst: Deref, src: Deref },
    Call {
        callee: Callee,
        args: Vec<Value>,
        ret: Option<Deref>,
    },
    If {
        cond: Value,
        then_block: Block,
        else_block: Block,
    },
    Return(Option<Value>),
}

#[derive(Debug)]
pub struct Inst {
    id: InstId,
    pub kind: InstKind,
}

impl Inst {
    pub(crate) fn new(id: InstId, kind: InstKind) -> Self {
        Inst { id, kind }
    }

    pub fn id(&self) -> InstId {
        self.id
    }
}

// =============================================================================
// Blocks
// =============================================================================

/// An ordered instruction list. Owns its instructions.
#[derive(Debug)]
pub struct Block {
    id: BlockId,
    insts: Vec<Inst>,
}

impl Block {
    pub(crate) fn new(id: BlockId) -> Self {
        Block {
            id,
            insts: Vec::new(),
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    /// Instruction at `index`, for passes that walk a block by position.
    pub fn inst_at_mut(&mut self, index: usize) -> &mut Inst {
        &mut self.insts[index]
    }

    pub fn position(&self, id: InstId) -> Option<usize> {
        self.insts.iter().position(|inst| inst.id == id)
    }

    /// Append an instruction.
    pub fn push(&mut self, inst: Inst) {
        self.insts.push(inst);
    }

    pub(crate) fn insert_at(&mut self, index: usize, inst: Inst) {
        self.insts.insert(index, inst);
    }

    /// Remove an instruction, returning it together with a cursor at the
    /// position it occupied.
    pub fn remove(&mut self, id: InstId) -> (Inst, Cursor) {
        let index = match self.position(id) {
            Some(index) => index,
            None => panic!("instruction {} is not in block {}", id, self.id),
        };
        let inst = self.insts.remove(index);
        let cursor = match self.insts.get(index) {
            Some(next) => Cursor::Before(next.id),
            None => Cursor::AtEnd,
        };
        (inst, cursor)
    }

    /// Remove the instruction at `index`. Later instructions shift down by one.
    pub fn remove_at(&mut self, index: usize) -> Inst {
        self.insts.remove(index)
    }

    /// Blocks nested directly inside this block's instructions, in order.
    pub fn children(&self) -> impl Iterator<Item = &Block> {
        self.insts.iter().flat_map(|inst| match &inst.kind {
            InstKind::If {
                then_block,
                else_block,
                ..
            } => vec![then_block, else_block],
            _ => vec![],
        })
    }

    /// Visit this block and every nested block in pre-order.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Block, Option<BlockId>)) {
        self.walk_from(None, f);
    }

    fn walk_from<'a>(&'a self, parent: Option<BlockId>, f: &mut impl FnMut(&'a Block, Option<BlockId>)) {
        f(self, parent);
        for child in self.children() {
            child.walk_from(Some(self.id), f);
        }
    }

    /// Total number of instructions, including nested blocks.
    pub fn deep_len(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |block, _| count += block.len());
        count
    }
}

// =============================================================================
// Functions
// =============================================================================

/// A function implementation.
#[derive(Debug)]
pub struct FuncBody {
    /// Top-level block. Everything else is nested inside it.
    pub root: Block,
    /// ID allocation scope for everything in this body.
    pub alloc: BodyAlloc,
    /// Function-local variables, in declaration order.
    pub locals: Vec<VarId>,
    /// Validity of derived analyses.
    pub metadata: Metadata,
}

impl FuncBody {
    pub fn new() -> Self {
        let mut alloc = BodyAlloc::default();
        let root = alloc.block();
        FuncBody {
            root,
            alloc,
            locals: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    /// Builder positioned in the root block.
    pub fn builder(&mut self, cursor: Cursor) -> builder::Builder<'_> {
        builder::Builder::new(&mut self.root, &mut self.alloc, cursor)
    }

    /// Make sure every analysis in `set` is computed and valid.
    ///
    /// Returns the analyses that had to be recomputed.
    pub fn require_metadata(&mut self, set: MetadataSet) -> MetadataSet {
        self.metadata.require(&self.root, set)
    }
}

impl Default for FuncBody {
    fn default() -> Self {
        Self::new()
    }
}

/// One overload of a function.
#[derive(Debug)]
pub struct Signature {
    pub params: Vec<VarId>,
    pub return_type: Option<TypeRef>,
    pub body: Option<FuncBody>,
}

#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub overloads: Vec<Signature>,
    /// Subroutine interfaces this function implements. Empty for ordinary functions.
    pub subroutine_types: Vec<TypeRef>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Function {
            name: name.into(),
            overloads: Vec::new(),
            subroutine_types: Vec::new(),
        }
    }

    pub fn is_subroutine(&self) -> bool {
        !self.subroutine_types.is_empty()
    }
}

// =============================================================================
// Program
// =============================================================================

#[derive(Debug, Default)]
pub struct Program {
    /// Named struct and subroutine types, in declaration order.
    pub types: Vec<TypeRef>,
    pub variables: Variables,
    pub functions: IdArena<FuncId, Function>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_type(&mut self, ty: TypeRef) {
        self.types.push(ty);
    }

    pub fn add_variable(&mut self, var: Variable) -> VarId {
        self.variables.alloc(var)
    }

    pub fn add_function(&mut self, func: Function) -> FuncId {
        self.functions.alloc(func)
    }

    /// Add an overload to an existing function.
    pub fn add_overload(&mut self, func: FuncId, sig: Signature) -> SigRef {
        let overloads = &mut self.functions[func].overloads;
        overloads.push(sig);
        SigRef {
            func,
            overload: (overloads.len() - 1) as u32,
        }
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id]
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id]
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions.iter().find(|(_, f)| f.name == name).map(|(id, _)| *id)
    }

    pub fn signature(&self, sig: SigRef) -> &Signature {
        &self.functions[sig.func].overloads[sig.overload as usize]
    }

    pub fn body(&self, sig: SigRef) -> Option<&FuncBody> {
        self.signature(sig).body.as_ref()
    }

    pub fn body_mut(&mut self, sig: SigRef) -> Option<&mut FuncBody> {
        self.functions[sig.func].overloads[sig.overload as usize].body.as_mut()
    }

    pub fn param_types(&self, sig: SigRef) -> Vec<TypeRef> {
        self.signature(sig).params.iter().map(|p| self.variables[*p].ty.clone()).collect()
    }

    /// Every overload in declaration order.
    pub fn signatures(&self) -> impl Iterator<Item = (SigRef, &Signature)> {
        self.functions.iter().flat_map(|(func, f)| {
            f.overloads.iter().enumerate().map(move |(i, sig)| {
                (
                    SigRef {
                        func: *func,
                        overload: i as u32,
                    },
                    sig,
                )
            })
        })
    }

    pub fn bodies_mut(&mut self) -> impl Iterator<Item = &mut FuncBody> {
        self.functions.values_mut().flat_map(|f| f.overloads.iter_mut()).filter_map(|sig| sig.body.as_mut())
    }

    pub fn globals(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.variables.iter().filter(|(_, v)| v.mode.is_global()).map(|(id, v)| (*id, v))
    }
}
