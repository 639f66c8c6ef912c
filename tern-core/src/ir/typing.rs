//! Type resolution for derefs and values.
//!
//! A deref's type is obtained by folding its steps over the root variable's
//! type. `try_deref_type` reports malformed chains; `deref_type` treats them
//! as invariant violations, which is what the passes want.

use thiserror::Error;

use super::types::{Type, TypeRef};
use super::{Constant, Deref, DerefStep, Value, Variables};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DerefError {
    #[error("field {index} out of range for type {ty}")]
    FieldOutOfRange { index: u32, ty: TypeRef },

    #[error("field access on non-struct type {0}")]
    NotAStruct(TypeRef),

    #[error("cannot index into type {0}")]
    NotIndexable(TypeRef),

    #[error("wildcard applied to type {0}")]
    InvalidWildcard(TypeRef),
}

/// Type of one step applied to `parent`.
pub fn step_type(parent: &TypeRef, step: &DerefStep) -> Result<TypeRef, DerefError> {
    match step {
        DerefStep::Field(index) => match &**parent {
            Type::Struct { fields, .. } => match fields.get(*index as usize) {
                Some(field) => Ok(field.ty.clone()),
                None => Err(DerefError::FieldOutOfRange {
                    index: *index,
                    ty: parent.clone(),
                }),
            },
            _ => Err(DerefError::NotAStruct(parent.clone())),
        },
        DerefStep::Index(_) => parent.element_type().ok_or_else(|| DerefError::NotIndexable(parent.clone())),
        DerefStep::Wildcard => {
            if parent.accepts_wildcard() {
                parent.element_type().ok_or_else(|| DerefError::InvalidWildcard(parent.clone()))
            } else {
                Err(DerefError::InvalidWildcard(parent.clone()))
            }
        }
    }
}

pub fn try_deref_type(vars: &Variables, deref: &Deref) -> Result<TypeRef, DerefError> {
    let mut ty = vars[deref.var()].ty.clone();
    for step in deref.steps() {
        ty = step_type(&ty, step)?;
    }
    Ok(ty)
}

/// Resolved type of a deref chain. Panics on a malformed chain.
pub fn deref_type(vars: &Variables, deref: &Deref) -> TypeRef {
    match try_deref_type(vars, deref) {
        Ok(ty) => ty,
        Err(e) => panic!("malformed deref rooted at {}: {}", vars[deref.var()].name, e),
    }
}

pub fn constant_type(c: &Constant) -> TypeRef {
    match c {
        Constant::Bool(_) => Type::bool(),
        Constant::Int(_) => Type::int(),
        Constant::UInt(_) => Type::uint(),
        Constant::Float(_) => Type::float(),
    }
}

/// Type of a value. Panics on a malformed deref inside it.
pub fn value_type(vars: &Variables, value: &Value) -> TypeRef {
    match value {
        Value::Const(c) => constant_type(c),
        Value::Load(deref) => deref_type(vars, deref),
        Value::SubroutineIndex(_) => Type::int(),
        Value::Binary { .. } => Type::bool(),
    }
}
