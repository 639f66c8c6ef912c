//! Subroutine lowering.
//!
//! Rewrites every indirect call into an if-ladder of direct calls, one rung per
//! registered implementation of the binding's interface:
//!
//! ```text
//! call indirect sel(n) -> c
//! ```
//!
//! with `diffuse` at registry index 0 and `specular` at index 2 becomes
//!
//! ```text
//! if subroutine_index(sel) == 0 {
//!   call diffuse(n) -> c
//! } else {
//!   if subroutine_index(sel) == 2 {
//!     call specular(n) -> c
//!   }
//! }
//! ```
//!
//! The ladder is built from the highest registry index down, each new rung
//! wrapping the previous one in its else-block. The first rung built takes the
//! call's original arguments and return destination; every later rung gets an
//! independent deep copy, so no location is ever attached to two calls.
//!
//! The pass adds blocks, so every derived analysis is invalidated whenever it
//! changes a body.

use log::{debug, trace};

use crate::ir::builder::{BodyAlloc, Builder};
use crate::ir::metadata::MetadataSet;
use crate::ir::types::TypeRef;
use crate::ir::typing::value_type;
use crate::ir::{
    BinOp, Block, Callee, Deref, DerefStep, FuncBody, Inst, InstKind, Program, SigRef, Value, VarId, Variables,
};
use crate::registry::SubroutineRegistry;

/// Lower indirect calls in every function body. Returns whether anything changed.
pub fn lower_subroutines(program: &mut Program, registry: &SubroutineRegistry) -> bool {
    let Program {
        variables, functions, ..
    } = program;

    let mut progress = false;
    for function in functions.values_mut() {
        for (overload, sig) in function.overloads.iter_mut().enumerate() {
            if let Some(body) = sig.body.as_mut() {
                if lower_subroutines_body(variables, registry, body) {
                    debug!("lower_subroutines: lowered calls in {} (overload {})", function.name, overload);
                    progress = true;
                }
            }
        }
    }
    progress
}

/// Lower indirect calls in one function body and record what it preserved.
pub fn lower_subroutines_body(vars: &Variables, registry: &SubroutineRegistry, body: &mut FuncBody) -> bool {
    let FuncBody {
        root, alloc, metadata, ..
    } = body;

    let progress = lower_block(vars, registry, root, alloc);
    if progress {
        metadata.invalidate_all();
    } else {
        metadata.mark_unchanged();
    }
    debug_assert!(!progress || metadata.valid() == MetadataSet::NONE);
    progress
}

fn lower_block(vars: &Variables, registry: &SubroutineRegistry, block: &mut Block, alloc: &mut BodyAlloc) -> bool {
    let mut progress = false;

    // A ladder replaces its call in place and is never revisited.
    let mut index = 0;
    while index < block.len() {
        let indirect = match &mut block.inst_at_mut(index).kind {
            InstKind::If {
                then_block,
                else_block,
                ..
            } => {
                progress |= lower_block(vars, registry, then_block, alloc);
                progress |= lower_block(vars, registry, else_block, alloc);
                false
            }
            InstKind::Call {
                callee: Callee::Indirect { .. },
                ..
            } => true,
            _ => false,
        };
        if !indirect {
            index += 1;
            continue;
        }

        let inst = block.remove_at(index);
        let id = inst.id();
        let InstKind::Call {
            callee: Callee::Indirect { binding, array_index },
            args,
            ret,
        } = inst.kind
        else {
            unreachable!("instruction {} was checked to be an indirect call", id)
        };

        let call = IndirectCall {
            binding,
            array_index: array_index.map(|index| *index),
            args,
            ret,
        };
        match build_ladder(vars, registry, alloc, call) {
            Some(ladder) => {
                let mut b = Builder::at_index(block, alloc, index);
                b.insert(ladder);
                index = b.index();
            }
            None => debug!("lower_subroutines: no implementation for call through {}, removed", vars[binding].name),
        }
        progress = true;
    }

    progress
}

/// Operands of the indirect call being replaced.
struct IndirectCall {
    binding: VarId,
    array_index: Option<Value>,
    args: Vec<Value>,
    ret: Option<Deref>,
}

/// Build the if-ladder for one call. `None` when no registered function implements
/// the binding's interface with a matching overload.
fn build_ladder(vars: &Variables, registry: &SubroutineRegistry, alloc: &mut BodyAlloc, call: IndirectCall) -> Option<Inst> {
    let interface = vars[call.binding].ty.without_array();
    let arg_types: Vec<TypeRef> = call.args.iter().map(|arg| value_type(vars, arg)).collect();

    // Highest registry index first.
    let rungs: Vec<(usize, SigRef)> = registry
        .eligible(interface)
        .rev()
        .filter_map(|(index, entry)| match entry.exact_matching_overload(&arg_types) {
            Some(overload) => Some((
                index,
                SigRef {
                    func: entry.func,
                    overload,
                },
            )),
            None => {
                // Upstream type checking guarantees a match for well-formed programs.
                debug!("lower_subroutines: {} has no overload for the call's arguments, skipped", entry.name);
                None
            }
        })
        .collect();
    if rungs.is_empty() {
        return None;
    }

    let mut operands = Vec::with_capacity(rungs.len());
    for _ in 1..rungs.len() {
        let args = alloc.clone_values(&call.args);
        let ret = call.ret.as_ref().map(|ret| alloc.clone_deref(ret));
        operands.push((args, ret));
    }
    operands.insert(0, (call.args, call.ret));

    let mut ladder: Option<Inst> = None;
    for ((index, sig), (args, ret)) in rungs.into_iter().zip(operands) {
        let selector = selector(alloc, call.binding, call.array_index.as_ref());
        let discriminant = Value::int(index as i32);
        let cond = Value::binary(BinOp::Eq, Value::SubroutineIndex(Box::new(selector)), discriminant);

        let mut then_block = alloc.block();
        let direct = alloc.inst(InstKind::Call {
            callee: Callee::Direct(sig),
            args,
            ret,
        });
        then_block.push(direct);

        let mut else_block = alloc.block();
        if let Some(inner) = ladder.take() {
            else_block.push(inner);
        }

        trace!("  rung for registry index {}: {} overload {}", index, sig.func, sig.overload);
        ladder = Some(alloc.inst(InstKind::If {
            cond,
            then_block,
            else_block,
        }));
    }
    ladder
}

/// `binding` or `binding[index]`, with a fresh copy of the index.
fn selector(alloc: &mut BodyAlloc, binding: VarId, array_index: Option<&Value>) -> Value {
    let steps = match array_index {
        Some(index) => vec![DerefStep::Index(Box::new(alloc.clone_value(index)))],
        None => Vec::new(),
    };
    Value::Load(alloc.deref(binding, steps))
}
