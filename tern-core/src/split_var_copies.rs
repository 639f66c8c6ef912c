//! Copy splitting.
//!
//! Replaces every `copy` between aggregate-typed locations with copies of
//! its leaves, recursing on the shared type of the two operands:
//! - scalar, vector, subroutine handle: one copy
//! - struct: recurse on each member in declaration order
//! - array, matrix: recurse once on `dst[*]` / `src[*]`
//!
//! Arrays are never unrolled to concrete indices, so the output grows with the
//! nesting depth of the type, not with array lengths. For example, with
//! `struct S { a: vec3, b: float[4] }`, `copy x, y` becomes
//! `copy x.a, y.a` followed by `copy x.b[*], y.b[*]`.
//!
//! Only instruction content changes. No block is added, removed or reordered,
//! so block indices and dominance stay valid.

use log::{debug, trace};

use crate::ir::builder::{BodyAlloc, Builder};
use crate::ir::display::print_deref;
use crate::ir::metadata::MetadataSet;
use crate::ir::types::{Type, TypeRef};
use crate::ir::typing::deref_type;
use crate::ir::{Block, Deref, FuncBody, InstKind, Program, Variables};

/// Split aggregate copies in every function body. Returns whether anything changed.
pub fn split_var_copies(program: &mut Program) -> bool {
    let Program {
        variables, functions, ..
    } = program;

    let mut progress = false;
    for function in functions.values_mut() {
        for (overload, sig) in function.overloads.iter_mut().enumerate() {
            if let Some(body) = sig.body.as_mut() {
                if split_var_copies_body(variables, body) {
                    debug!("split_var_copies: split copies in {} (overload {})", function.name, overload);
                    progress = true;
                }
            }
        }
    }
    progress
}

/// Split aggregate copies in one function body and record what it preserved.
pub fn split_var_copies_body(vars: &Variables, body: &mut FuncBody) -> bool {
    let FuncBody {
        root, alloc, metadata, ..
    } = body;

    let progress = split_block(vars, root, alloc);
    if progress {
        metadata.preserve(MetadataSet::BLOCK_INDEX | MetadataSet::DOMINANCE);
    } else {
        metadata.mark_unchanged();
    }
    progress
}

fn split_block(vars: &Variables, block: &mut Block, alloc: &mut BodyAlloc) -> bool {
    let mut progress = false;

    // Leaf copies emitted for a split land before `index`, so they are never
    // revisited.
    let mut index = 0;
    while index < block.len() {
        let aggregate = match &mut block.inst_at_mut(index).kind {
            InstKind::If {
                then_block,
                else_block,
                ..
            } => {
                progress |= split_block(vars, then_block, alloc);
                progress |= split_block(vars, else_block, alloc);
                None
            }
            InstKind::Copy { dst, src } => {
                let ty = deref_type(vars, dst);
                debug_assert_eq!(ty, deref_type(vars, src), "copy operands must have the same type");
                if ty.is_leaf() { None } else { Some(ty) }
            }
            _ => None,
        };
        let Some(ty) = aggregate else {
            index += 1;
            continue;
        };

        let inst = block.remove_at(index);
        let id = inst.id();
        let InstKind::Copy { dst, src } = inst.kind else {
            unreachable!("instruction {} was checked to be a copy", id)
        };
        trace!("splitting copy {}, {} of type {}", print_deref(vars, &dst), print_deref(vars, &src), ty);

        let mut b = Builder::at_index(block, alloc, index);
        split_copy(&mut b, vars, dst, src, &ty);
        index = b.index();
        progress = true;
    }

    progress
}

/// Emit the leaf copies of `dst = src`, both of type `ty`, at the builder's cursor.
fn split_copy(b: &mut Builder<'_>, vars: &Variables, dst: Deref, src: Deref, ty: &TypeRef) {
    match &**ty {
        Type::Scalar(_) | Type::Vector { .. } | Type::Subroutine { .. } => {
            trace!("  copy {}, {}", print_deref(vars, &dst), print_deref(vars, &src));
            b.copy(dst, src);
        }
        Type::Struct { fields, .. } => {
            for (index, field) in fields.iter().enumerate() {
                let field_dst = b.deref_field(&dst, index as u32);
                let field_src = b.deref_field(&src, index as u32);
                split_copy(b, vars, field_dst, field_src, &field.ty);
            }
        }
        Type::Array { elem, .. } => {
            let elem_dst = b.deref_wildcard(&dst);
            let elem_src = b.deref_wildcard(&src);
            split_copy(b, vars, elem_dst, elem_src, elem);
        }
        Type::Matrix { rows, .. } => {
            let column_dst = b.deref_wildcard(&dst);
            let column_src = b.deref_wildcard(&src);
            split_copy(b, vars, column_dst, column_src, &Type::vec(*rows));
        }
    }
}
