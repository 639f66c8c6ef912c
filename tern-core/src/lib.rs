pub mod ast;
pub mod error;
pub mod ir;
pub mod lexer;
pub mod lower_subroutines;
pub mod parser;
pub mod pipeline;
pub mod registry;
pub mod resolve;
pub mod split_var_copies;

#[cfg(test)]
mod lower_subroutines_tests;
#[cfg(test)]
mod split_var_copies_tests;

use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

use indexmap::IndexMap;

use error::Result;

pub use lower_subroutines::lower_subroutines;
pub use pipeline::{PassKind, Pipeline, PipelineOptions, PipelineReport};
pub use registry::SubroutineRegistry;
pub use split_var_copies::split_var_copies;

// =============================================================================
// Generic ID allocation
// =============================================================================

/// Generic counter for generating unique IDs.
///
/// The ID type must implement `From<u32>` to convert the raw counter value.
#[derive(Debug, Clone)]
pub struct IdSource<Id> {
    next_id: u32,
    _phantom: PhantomData<Id>,
}

impl<Id: From<u32>> IdSource<Id> {
    pub fn new() -> Self {
        IdSource {
            next_id: 0,
            _phantom: PhantomData,
        }
    }

    pub fn next(&mut self) -> Id {
        let id = Id::from(self.next_id);
        self.next_id += 1;
        id
    }
}

impl<Id: From<u32>> Default for IdSource<Id> {
    fn default() -> Self {
        Self::new()
    }
}

/// Arena that allocates IDs and stores associated items.
///
/// Combines ID generation with storage, ensuring each item gets a unique ID.
/// Uses IndexMap for deterministic iteration order (insertion order).
#[derive(Debug, Clone)]
pub struct IdArena<Id, T> {
    source: IdSource<Id>,
    items: IndexMap<Id, T>,
}

impl<Id: From<u32> + Copy + Eq + Hash, T> IdArena<Id, T> {
    pub fn new() -> Self {
        IdArena {
            source: IdSource::new(),
            items: IndexMap::new(),
        }
    }

    /// Allocate a new ID and store the item.
    pub fn alloc(&mut self, item: T) -> Id {
        let id = self.source.next();
        self.items.insert(id, item);
        id
    }

    /// Get an item by ID.
    pub fn get(&self, id: Id) -> Option<&T> {
        self.items.get(&id)
    }

    /// Get a mutable reference to an item by ID.
    pub fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        self.items.get_mut(&id)
    }

    /// Iterate over all (id, item) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Id, &T)> {
        self.items.iter()
    }

    /// Iterate over all items (without IDs).
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    /// Iterate mutably over all items (without IDs).
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.values_mut()
    }

    /// Number of items in the arena.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<Id: From<u32> + Copy + Eq + Hash, T> Default for IdArena<Id, T> {
    fn default() -> Self {
        Self::new()
    }
}

// IDs only come from the arena that owns the items, so a miss is a bug in the caller.
impl<Id: From<u32> + Copy + Eq + Hash + std::fmt::Debug, T> Index<Id> for IdArena<Id, T> {
    type Output = T;

    fn index(&self, id: Id) -> &T {
        match self.items.get(&id) {
            Some(item) => item,
            None => panic!("IdArena: unknown id {:?}", id),
        }
    }
}

impl<Id: From<u32> + Copy + Eq + Hash + std::fmt::Debug, T> IndexMut<Id> for IdArena<Id, T> {
    fn index_mut(&mut self, id: Id) -> &mut T {
        match self.items.get_mut(&id) {
            Some(item) => item,
            None => panic!("IdArena: unknown id {:?}", id),
        }
    }
}

impl<'a, Id: From<u32> + Copy + Eq + Hash, T> IntoIterator for &'a IdArena<Id, T> {
    type Item = (&'a Id, &'a T);
    type IntoIter = indexmap::map::Iter<'a, Id, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<'a, Id: From<u32> + Copy + Eq + Hash, T> IntoIterator for &'a mut IdArena<Id, T> {
    type Item = (&'a Id, &'a mut T);
    type IntoIter = indexmap::map::IterMut<'a, Id, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter_mut()
    }
}

// =============================================================================
// Typestate Compiler Pipeline
// =============================================================================
//
// Each struct represents a stage. Methods consume `self` and return the next
// stage, so reading, resolving and lowering can only happen in order:
//
//   Compiler::parse(source)?          -> Parsed      (syntax tree)
//     -> .resolve()?                  -> Resolved    (IR program)
//       -> .verify()?                 -> Resolved    (optional)
//       -> .lower(&options)?          -> Lowered     (IR program + report)

/// Entry point for the textual IR pipeline.
pub struct Compiler;

impl Compiler {
    /// Parse textual IR into a syntax tree.
    pub fn parse(source: &str) -> Result<Parsed> {
        let module = parser::parse(source)?;
        Ok(Parsed { module })
    }
}

/// Textual IR that has been parsed but not yet resolved.
pub struct Parsed {
    pub module: ast::Module,
}

impl Parsed {
    /// Resolve names and types, producing an IR program.
    pub fn resolve(self) -> Result<Resolved> {
        let program = resolve::resolve(&self.module)?;
        Ok(Resolved { program })
    }
}

/// A resolved IR program, ready for lowering.
pub struct Resolved {
    pub program: ir::Program,
}

impl Resolved {
    /// Run the IR verifier over the program as read.
    pub fn verify(self) -> Result<Resolved> {
        ir::verify::verify_program(&self.program).map_err(|errors| error::CompilerError::VerificationError {
            pass: "input".to_string(),
            errors,
        })?;
        Ok(self)
    }

    /// Run the lowering pipeline.
    pub fn lower(mut self, options: &PipelineOptions) -> Result<Lowered> {
        let report = Pipeline::new(options.clone()).run(&mut self.program)?;
        Ok(Lowered {
            program: self.program,
            report,
        })
    }
}

/// Program after the lowering pipeline ran.
pub struct Lowered {
    pub program: ir::Program,
    pub report: PipelineReport,
}

impl Lowered {
    /// Print the lowered program in textual IR form.
    pub fn to_text(&self) -> String {
        ir::display::print_program(&self.program)
    }
}
