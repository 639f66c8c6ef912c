//! Subroutine registry.
//!
//! An ordered, read-only list of every function that implements at least one
//! subroutine interface. A function's position in the registry is the integer
//! a subroutine handle holds when it selects that function, so the order is
//! fixed once the registry is built and never changes during lowering.

use crate::ir::types::{Type, TypeRef};
use crate::ir::{FuncId, Program};

/// One registered subroutine implementation.
#[derive(Debug, Clone)]
pub struct SubroutineEntry {
    pub func: FuncId,
    pub name: String,
    /// Interfaces the function declares it implements.
    pub interfaces: Vec<TypeRef>,
    /// Parameter types of each overload, indexed like `Function::overloads`.
    overloads: Vec<Vec<TypeRef>>,
}

impl SubroutineEntry {
    /// Whether this function implements `interface`.
    pub fn implements(&self, interface: &Type) -> bool {
        self.interfaces.iter().any(|i| **i == *interface)
    }

    /// The overload whose parameter types are exactly `arg_types`.
    pub fn exact_matching_overload(&self, arg_types: &[TypeRef]) -> Option<u32> {
        self.overloads.iter().position(|params| params.as_slice() == arg_types).map(|i| i as u32)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubroutineRegistry {
    entries: Vec<SubroutineEntry>,
}

impl SubroutineRegistry {
    /// Register every subroutine implementation in declaration order.
    pub fn from_program(program: &Program) -> Self {
        let order: Vec<FuncId> =
            program.functions.iter().filter(|(_, f)| f.is_subroutine()).map(|(id, _)| *id).collect();
        Self::with_order(program, &order)
    }

    /// Register the given functions, in the given order.
    pub fn with_order(program: &Program, order: &[FuncId]) -> Self {
        let entries = order
            .iter()
            .map(|&func| {
                let function = program.function(func);
                assert!(function.is_subroutine(), "{} implements no subroutine interface", function.name);
                let overloads = function
                    .overloads
                    .iter()
                    .map(|sig| sig.params.iter().map(|p| program.variable(*p).ty.clone()).collect())
                    .collect();
                SubroutineEntry {
                    func,
                    name: function.name.clone(),
                    interfaces: function.subroutine_types.clone(),
                    overloads,
                }
            })
            .collect();
        SubroutineRegistry { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at a registry index. Panics when out of range.
    pub fn get(&self, index: usize) -> &SubroutineEntry {
        &self.entries[index]
    }

    /// Registry index of a function, if registered.
    pub fn index_of(&self, func: FuncId) -> Option<usize> {
        self.entries.iter().position(|e| e.func == func)
    }

    /// `(index, entry)` pairs in registry order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (usize, &SubroutineEntry)> {
        self.entries.iter().enumerate()
    }

    /// Entries implementing `interface`, in registry order.
    pub fn eligible<'a>(&'a self, interface: &'a Type) -> impl DoubleEndedIterator<Item = (usize, &'a SubroutineEntry)> {
        self.iter().filter(move |(_, e)| e.implements(interface))
    }
}
