//! Instruction builder.
//!
//! A `Builder` holds a single cursor into one block. `emit` splices an
//! instruction at the cursor and advances past it, so a run of `emit` calls
//! produces instructions in the order they were issued:
//!
//! ```ignore
//! let (copy, cursor) = block.remove(copy_id);
//! let mut b = Builder::new(&mut block, &mut alloc, cursor);
//! b.copy(dst_a, src_a); // lands where `copy` was
//! b.copy(dst_b, src_b); // lands right after the previous one
//! ```
//!
//! Passes walking a block by position use `Builder::at_index` instead and
//! resume their walk at `index()`, which skips everything they just emitted.
//!
//! The builder is not reentrant and is never shared across bodies; nested
//! blocks are built with `build_block`, which hands out a second builder that
//! borrows the first.

use crate::IdSource;

use super::{
    Block, BlockId, Callee, Deref, DerefId, DerefStep, Inst, InstId, InstKind, Value, VarId,
};

/// Insertion point within a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// Immediately before the given instruction.
    Before(InstId),
    /// After the last instruction.
    AtEnd,
}

/// Allocation scope of a function body.
///
/// Every instruction, deref and block created in a body gets its ID here.
#[derive(Debug, Clone, Default)]
pub struct BodyAlloc {
    insts: IdSource<InstId>,
    derefs: IdSource<DerefId>,
    blocks: IdSource<BlockId>,
}

impl BodyAlloc {
    /// New empty block.
    pub fn block(&mut self) -> Block {
        Block::new(self.blocks.next())
    }

    /// New detached instruction.
    pub fn inst(&mut self, kind: InstKind) -> Inst {
        Inst::new(self.insts.next(), kind)
    }

    /// Deref of a whole variable.
    pub fn deref_var(&mut self, var: VarId) -> Deref {
        Deref::new(self.derefs.next(), var, Vec::new())
    }

    pub fn deref(&mut self, var: VarId, steps: Vec<DerefStep>) -> Deref {
        Deref::new(self.derefs.next(), var, steps)
    }

    /// `parent.field`.
    pub fn deref_field(&mut self, parent: &Deref, index: u32) -> Deref {
        self.extend(parent, DerefStep::Field(index))
    }

    /// `parent[index]`.
    pub fn deref_index(&mut self, parent: &Deref, index: Value) -> Deref {
        self.extend(parent, DerefStep::Index(Box::new(index)))
    }

    /// `parent[*]`.
    pub fn deref_wildcard(&mut self, parent: &Deref) -> Deref {
        self.extend(parent, DerefStep::Wildcard)
    }

    fn extend(&mut self, parent: &Deref, step: DerefStep) -> Deref {
        let mut steps = self.clone_steps(parent.steps());
        steps.push(step);
        Deref::new(self.derefs.next(), parent.var(), steps)
    }

    /// Independent copy of a deref, including any index expressions, with fresh IDs.
    pub fn clone_deref(&mut self, deref: &Deref) -> Deref {
        let steps = self.clone_steps(deref.steps());
        Deref::new(self.derefs.next(), deref.var(), steps)
    }

    fn clone_steps(&mut self, steps: &[DerefStep]) -> Vec<DerefStep> {
        steps
            .iter()
            .map(|step| match step {
                DerefStep::Field(i) => DerefStep::Field(*i),
                DerefStep::Index(value) => DerefStep::Index(Box::new(self.clone_value(value))),
                DerefStep::Wildcard => DerefStep::Wildcard,
            })
            .collect()
    }

    /// Independent copy of a value. Every deref inside it is cloned.
    pub fn clone_value(&mut self, value: &Value) -> Value {
        match value {
            Value::Const(c) => Value::Const(*c),
            Value::Load(deref) => Value::Load(self.clone_deref(deref)),
            Value::SubroutineIndex(inner) => Value::SubroutineIndex(Box::new(self.clone_value(inner))),
            Value::Binary { op, lhs, rhs } => Value::Binary {
                op: *op,
                lhs: Box::new(self.clone_value(lhs)),
                rhs: Box::new(self.clone_value(rhs)),
            },
        }
    }

    pub fn clone_values(&mut self, values: &[Value]) -> Vec<Value> {
        values.iter().map(|v| self.clone_value(v)).collect()
    }
}

/// Splices instructions into a block at a cursor.
pub struct Builder<'a> {
    block: &'a mut Block,
    alloc: &'a mut BodyAlloc,
    /// Index the next instruction will be inserted at.
    index: usize,
}

impl<'a> Builder<'a> {
    pub fn new(block: &'a mut Block, alloc: &'a mut BodyAlloc, cursor: Cursor) -> Self {
        let index = match cursor {
            Cursor::AtEnd => block.len(),
            Cursor::Before(id) => match block.position(id) {
                Some(index) => index,
                None => panic!("cursor instruction {} is not in block {}", id, block.id()),
            },
        };
        Builder { block, alloc, index }
    }

    /// Builder inserting at position `index` of `block`.
    pub fn at_index(block: &'a mut Block, alloc: &'a mut BodyAlloc, index: usize) -> Self {
        assert!(index <= block.len(), "insertion index {} past end of block {}", index, block.id());
        Builder { block, alloc, index }
    }

    /// Position the next instruction will be inserted at. Everything emitted so
    /// far sits just before it.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Current insertion point.
    pub fn cursor(&self) -> Cursor {
        match self.block.insts().get(self.index) {
            Some(inst) => Cursor::Before(inst.id()),
            None => Cursor::AtEnd,
        }
    }

    pub fn alloc(&mut self) -> &mut BodyAlloc {
        &mut *self.alloc
    }

    /// Insert an already-built instruction at the cursor and advance past it.
    pub fn insert(&mut self, inst: Inst) -> InstId {
        let id = inst.id();
        self.block.insert_at(self.index, inst);
        self.index += 1;
        id
    }

    /// Build an instruction at the cursor and advance past it.
    pub fn emit(&mut self, kind: InstKind) -> InstId {
        let inst = self.alloc.inst(kind);
        self.insert(inst)
    }

    pub fn copy(&mut self, dst: Deref, src: Deref) -> InstId {
        self.emit(InstKind::Copy { dst, src })
    }

    pub fn call(&mut self, callee: Callee, args: Vec<Value>, ret: Option<Deref>) -> InstId {
        self.emit(InstKind::Call { callee, args, ret })
    }

    pub fn if_else(&mut self, cond: Value, then_block: Block, else_block: Block) -> InstId {
        self.emit(InstKind::If {
            cond,
            then_block,
            else_block,
        })
    }

    pub fn ret(&mut self, value: Option<Value>) -> InstId {
        self.emit(InstKind::Return(value))
    }

    /// Build a fresh block with a nested builder positioned at its end.
    pub fn build_block(&mut self, f: impl FnOnce(&mut Builder<'_>)) -> Block {
        let mut block = self.alloc.block();
        {
            let mut inner = Builder::new(&mut block, &mut *self.alloc, Cursor::AtEnd);
            f(&mut inner);
        }
        block
    }

    pub fn deref_var(&mut self, var: VarId) -> Deref {
        self.alloc.deref_var(var)
    }

    pub fn deref_field(&mut self, parent: &Deref, index: u32) -> Deref {
        self.alloc.deref_field(parent, index)
    }

    pub fn deref_index(&mut self, parent: &Deref, index: Value) -> Deref {
        self.alloc.deref_index(parent, index)
    }

    pub fn deref_wildcard(&mut self, parent: &Deref) -> Deref {
        self.alloc.deref_wildcard(parent)
    }

    pub fn clone_deref(&mut self, deref: &Deref) -> Deref {
        self.alloc.clone_deref(deref)
    }
}
