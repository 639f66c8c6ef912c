//! IR verification.
//!
//! Checks the invariants the lowering passes rely on:
//! - Every deref chain is well-formed for its root variable's type
//! - Wildcard steps only appear in `copy` operands, with matching counts
//! - `copy` operands resolve to the same type
//! - Conditions are boolean, array indices are integers
//! - Direct calls match the callee's parameter and return types
//! - Indirect calls bind a subroutine variable, indexed iff it is an array
//! - `return` values match the enclosing signature

use std::fmt;

use thiserror::Error;

use super::types::{Type, TypeRef};
use super::typing::{constant_type, try_deref_type, DerefError};
use super::{
    Block, Callee, Deref, DerefStep, FuncBody, InstId, InstKind, Program, SigRef, Value, Variables,
};

/// Where a verification error was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub function: String,
    pub inst: InstId,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.function, self.inst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("{at}: malformed deref: {error}")]
    MalformedDeref { at: Location, error: DerefError },

    #[error("{at}: wildcard deref outside of a copy")]
    WildcardOutsideCopy { at: Location },

    #[error("{at}: copy from {src} to {dst}")]
    CopyTypeMismatch { at: Location, dst: TypeRef, src: TypeRef },

    #[error("{at}: copy operands have {dst} and {src} wildcards")]
    WildcardMismatch { at: Location, dst: usize, src: usize },

    #[error("{at}: condition has type {ty}, expected bool")]
    ConditionNotBool { at: Location, ty: TypeRef },

    #[error("{at}: index has type {ty}, expected an integer")]
    IndexNotInteger { at: Location, ty: TypeRef },

    #[error("{at}: comparison between {lhs} and {rhs}")]
    OperandMismatch { at: Location, lhs: TypeRef, rhs: TypeRef },

    #[error("{at}: subroutine_index applied to {ty}")]
    NotASubroutineHandle { at: Location, ty: TypeRef },

    #[error("{at}: call to {callee} passes {got} arguments, expected {expected}")]
    ArgumentCount {
        at: Location,
        callee: String,
        expected: usize,
        got: usize,
    },

    #[error("{at}: argument {index} of call to {callee} has type {got}, expected {expected}")]
    ArgumentType {
        at: Location,
        callee: String,
        index: usize,
        expected: TypeRef,
        got: TypeRef,
    },

    #[error("{at}: call to {callee} returns {expected}, destination has type {got}")]
    ReturnDestinationMismatch {
        at: Location,
        callee: String,
        expected: String,
        got: TypeRef,
    },

    #[error("{at}: indirect call through {binding} of type {ty}")]
    NotASubroutineBinding { at: Location, binding: String, ty: TypeRef },

    #[error("{at}: indirect call through {binding} {}", index_hint(.arrayed))]
    BindingIndexMismatch { at: Location, binding: String, arrayed: bool },

    #[error("{at}: return of {got} from function returning {expected}")]
    ReturnType { at: Location, expected: String, got: String },
}

/// Verify every body in the program.
pub fn verify_program(program: &Program) -> Result<(), Vec<VerifyError>> {
    let mut errors = Vec::new();
    for (sig, signature) in program.signatures() {
        if let Some(body) = &signature.body {
            errors.extend(verify_body(program, sig, body));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Verify one body, returning every violation found.
pub fn verify_body(program: &Program, sig: SigRef, body: &FuncBody) -> Vec<VerifyError> {
    let mut verifier = Verifier {
        program,
        vars: &program.variables,
        function: program.function(sig.func).name.clone(),
        return_type: program.signature(sig).return_type.clone(),
        errors: Vec::new(),
    };
    verifier.block(&body.root);
    verifier.errors
}

struct Verifier<'a> {
    program: &'a Program,
    vars: &'a Variables,
    function: String,
    return_type: Option<TypeRef>,
    errors: Vec<VerifyError>,
}

fn index_hint(arrayed: &bool) -> &'static str {
    if *arrayed {
        "needs an array index"
    } else {
        "cannot be indexed"
    }
}

fn type_name(ty: &Option<TypeRef>) -> String {
    match ty {
        Some(ty) => ty.to_string(),
        None => "void".to_string(),
    }
}

impl<'a> Verifier<'a> {
    fn at(&self, inst: InstId) -> Location {
        Location {
            function: self.function.clone(),
            inst,
        }
    }

    fn block(&mut self, block: &Block) {
        for inst in block.insts() {
            let id = inst.id();
            match &inst.kind {
                InstKind::Copy { dst, src } => self.copy(id, dst, src),
                InstKind::Call { callee, args, ret } => self.call(id, callee, args, ret.as_ref()),
                InstKind::If {
                    cond,
                    then_block,
                    else_block,
                } => {
                    if let Some(ty) = self.value(id, cond) {
                        if !ty.is_bool() {
                            self.errors.push(VerifyError::ConditionNotBool { at: self.at(id), ty });
                        }
                    }
                    self.block(then_block);
                    self.block(else_block);
                }
                InstKind::Return(value) => {
                    let got = value.as_ref().and_then(|v| self.value(id, v));
                    let well_typed = match value {
                        None => self.return_type.is_none(),
                        // An ill-formed value was already reported.
                        Some(_) => got.is_none() || got == self.return_type,
                    };
                    if !well_typed {
                        self.errors.push(VerifyError::ReturnType {
                            at: self.at(id),
                            expected: type_name(&self.return_type),
                            got: type_name(&got),
                        });
                    }
                }
            }
        }
    }

    fn copy(&mut self, id: InstId, dst: &Deref, src: &Deref) {
        let dst_ty = self.deref(id, dst, true);
        let src_ty = self.deref(id, src, true);
        if let (Some(dst_ty), Some(src_ty)) = (dst_ty, src_ty) {
            if dst_ty != src_ty {
                self.errors.push(VerifyError::CopyTypeMismatch {
                    at: self.at(id),
                    dst: dst_ty,
                    src: src_ty,
                });
            }
        }
        if dst.wildcard_count() != src.wildcard_count() {
            self.errors.push(VerifyError::WildcardMismatch {
                at: self.at(id),
                dst: dst.wildcard_count(),
                src: src.wildcard_count(),
            });
        }
    }

    fn call(&mut self, id: InstId, callee: &Callee, args: &[Value], ret: Option<&Deref>) {
        let arg_types: Vec<Option<TypeRef>> = args.iter().map(|a| self.value(id, a)).collect();
        let ret_ty = ret.and_then(|r| self.deref(id, r, false));

        match callee {
            Callee::Direct(sig) => {
                let name = self.program.function(sig.func).name.clone();
                let params = self.program.param_types(*sig);
                if params.len() != args.len() {
                    self.errors.push(VerifyError::ArgumentCount {
                        at: self.at(id),
                        callee: name.clone(),
                        expected: params.len(),
                        got: args.len(),
                    });
                } else {
                    for (index, (expected, got)) in params.iter().zip(arg_types).enumerate() {
                        match got {
                            Some(got) if got != *expected => self.errors.push(VerifyError::ArgumentType {
                                at: self.at(id),
                                callee: name.clone(),
                                index,
                                expected: expected.clone(),
                                got,
                            }),
                            _ => {}
                        }
                    }
                }
                if let Some(got) = ret_ty {
                    let expected = self.program.signature(*sig).return_type.clone();
                    if expected.as_ref() != Some(&got) {
                        self.errors.push(VerifyError::ReturnDestinationMismatch {
                            at: self.at(id),
                            callee: name,
                            expected: type_name(&expected),
                            got,
                        });
                    }
                }
            }
            Callee::Indirect { binding, array_index } => {
                let var = &self.vars[*binding];
                if !var.ty.without_array().is_subroutine() {
                    self.errors.push(VerifyError::NotASubroutineBinding {
                        at: self.at(id),
                        binding: var.name.clone(),
                        ty: var.ty.clone(),
                    });
                }
                if var.ty.is_array() != array_index.is_some() {
                    self.errors.push(VerifyError::BindingIndexMismatch {
                        at: self.at(id),
                        binding: var.name.clone(),
                        arrayed: var.ty.is_array(),
                    });
                }
                if let Some(index) = array_index {
                    self.index(id, index);
                }
            }
        }
    }

    /// Check a deref and return its type if well-formed.
    fn deref(&mut self, id: InstId, deref: &Deref, in_copy: bool) -> Option<TypeRef> {
        if !in_copy && deref.has_wildcard() {
            self.errors.push(VerifyError::WildcardOutsideCopy { at: self.at(id) });
        }
        for step in deref.steps() {
            if let DerefStep::Index(index) = step {
                self.index(id, index);
            }
        }
        match try_deref_type(self.vars, deref) {
            Ok(ty) => Some(ty),
            Err(error) => {
                self.errors.push(VerifyError::MalformedDeref { at: self.at(id), error });
                None
            }
        }
    }

    fn index(&mut self, id: InstId, index: &Value) {
        if let Some(ty) = self.value(id, index) {
            if !ty.is_integer() {
                self.errors.push(VerifyError::IndexNotInteger { at: self.at(id), ty });
            }
        }
    }

    /// Check a value and return its type if well-formed.
    fn value(&mut self, id: InstId, value: &Value) -> Option<TypeRef> {
        match value {
            Value::Const(c) => Some(constant_type(c)),
            Value::Load(deref) => self.deref(id, deref, false),
            Value::SubroutineIndex(inner) => {
                if let Some(ty) = self.value(id, inner) {
                    if !ty.is_subroutine() {
                        self.errors.push(VerifyError::NotASubroutineHandle { at: self.at(id), ty });
                    }
                }
                Some(Type::int())
            }
            Value::Binary { lhs, rhs, .. } => {
                let lhs = self.value(id, lhs);
                let rhs = self.value(id, rhs);
                if let (Some(lhs), Some(rhs)) = (lhs, rhs) {
                    if lhs != rhs {
                        self.errors.push(VerifyError::OperandMismatch { at: self.at(id), lhs, rhs });
                    }
                }
                Some(Type::bool())
            }
        }
    }
}
