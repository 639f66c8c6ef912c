use super::builder::Cursor;
use super::types::{StructField, Type};
use super::verify::{verify_program, VerifyError};
use super::{
    Callee, DerefStep, FuncBody, Function, Program, SigRef, Signature, Value, VarId, Variable, VariableMode,
};
use crate::ir::typing::DerefError;
use crate::Compiler;

// =============================================================================
// Test Helpers
// =============================================================================

/// A program with one void function `main` whose body is built by `build`.
fn with_main(program: &mut Program, build: impl FnOnce(&mut FuncBody)) {
    let func = program.add_function(Function::new("main"));
    let mut body = FuncBody::new();
    build(&mut body);
    program.add_overload(
        func,
        Signature {
            params: Vec::new(),
            return_type: None,
            body: Some(body),
        },
    );
}

fn var(program: &mut Program, name: &str, ty: super::types::TypeRef) -> VarId {
    program.add_variable(Variable::new(name, ty, VariableMode::Global))
}

fn errors(program: &Program) -> Vec<VerifyError> {
    verify_program(program).err().unwrap_or_default()
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_resolved_program_verifies() {
    let program = Compiler::parse(
        r#"
struct Light { color: vec3, falloff: float[4] }
subroutine Shade
uniform sels: Shade[2]
in n: vec3
out frag: vec4

fn diffuse(x: vec3) -> vec4 : Shade {
  local t: vec4
  return t
}

fn main() {
  local a: Light
  local b: Light
  copy a, b
  copy a.falloff[*], b.falloff[*]
  call indirect sels[1](n) -> frag
  if subroutine_index(sels[0]) == 0 {
    call diffuse(n) -> frag
  }
}
"#,
    )
    .unwrap()
    .resolve()
    .unwrap()
    .program;
    assert_eq!(verify_program(&program), Ok(()));
}

#[test]
fn test_copy_type_mismatch() {
    let mut program = Program::new();
    let a = var(&mut program, "a", Type::vec(3));
    let b = var(&mut program, "b", Type::vec(4));
    with_main(&mut program, |body| {
        let mut bld = body.builder(Cursor::AtEnd);
        let (d, s) = (bld.deref_var(a), bld.deref_var(b));
        bld.copy(d, s);
    });
    let errs = errors(&program);
    assert_eq!(errs.len(), 1);
    assert!(matches!(errs[0], VerifyError::CopyTypeMismatch { .. }));
    assert!(errs[0].to_string().starts_with("main@i0"), "{}", errs[0]);
}

#[test]
fn test_malformed_deref() {
    let mut program = Program::new();
    let s = Type::structure("S", vec![StructField::new("x", Type::float())]);
    let a = var(&mut program, "a", s);
    let f = var(&mut program, "f", Type::float());
    with_main(&mut program, |body| {
        let mut bld = body.builder(Cursor::AtEnd);
        let d = bld.deref_var(f);
        let s = bld.alloc().deref(a, vec![DerefStep::Field(3)]);
        bld.copy(d, s);
    });
    let errs = errors(&program);
    assert!(errs.iter().any(|e| matches!(
        e,
        VerifyError::MalformedDeref {
            error: DerefError::FieldOutOfRange { index: 3, .. },
            ..
        }
    )));
}

#[test]
fn test_wildcard_rules() {
    let mut program = Program::new();
    let a = var(&mut program, "a", Type::array(Type::float(), 2));
    let f = var(&mut program, "f", Type::float());
    let v = var(&mut program, "v", Type::vec(2));
    with_main(&mut program, |body| {
        let mut bld = body.builder(Cursor::AtEnd);
        // Mismatched wildcard counts.
        let d = bld.alloc().deref(a, vec![DerefStep::Wildcard]);
        let s = bld.alloc().deref(a, vec![DerefStep::Index(Box::new(Value::int(0)))]);
        bld.copy(d, s);
        // Wildcard on a vector.
        let d = bld.alloc().deref(v, vec![DerefStep::Wildcard]);
        let s = bld.deref_var(f);
        bld.copy(d, s);
        // Wildcard outside of a copy.
        let arg = Value::Load(bld.alloc().deref(a, vec![DerefStep::Wildcard]));
        let ret = bld.deref_var(f);
        bld.call(
            Callee::Indirect {
                binding: f,
                array_index: None,
            },
            vec![arg],
            Some(ret),
        );
    });
    let errs = errors(&program);
    assert!(errs.iter().any(|e| matches!(e, VerifyError::WildcardMismatch { dst: 1, src: 0, .. })));
    assert!(errs.iter().any(|e| matches!(
        e,
        VerifyError::MalformedDeref {
            error: DerefError::InvalidWildcard(_),
            ..
        }
    )));
    assert!(errs.iter().any(|e| matches!(e, VerifyError::WildcardOutsideCopy { .. })));
    assert!(errs.iter().any(|e| matches!(e, VerifyError::NotASubroutineBinding { .. })));
}

#[test]
fn test_condition_and_index_types() {
    let mut program = Program::new();
    let a = var(&mut program, "a", Type::array(Type::float(), 2));
    let f = var(&mut program, "f", Type::float());
    with_main(&mut program, |body| {
        let mut bld = body.builder(Cursor::AtEnd);
        let then_block = bld.build_block(|_| {});
        let else_block = bld.build_block(|_| {});
        bld.if_else(Value::int(1), then_block, else_block);

        let d = bld.deref_var(f);
        let s = bld.alloc().deref(a, vec![DerefStep::Index(Box::new(Value::bool(true)))]);
        bld.copy(d, s);
    });
    let errs = errors(&program);
    assert!(errs.iter().any(|e| matches!(e, VerifyError::ConditionNotBool { .. })));
    assert!(errs.iter().any(|e| matches!(e, VerifyError::IndexNotInteger { .. })));
}

#[test]
fn test_direct_call_checks() {
    let mut program = Program::new();
    let x = program.add_variable(Variable::new("x", Type::float(), VariableMode::Param));
    let callee = program.add_function(Function::new("f"));
    let sig = program.add_overload(
        callee,
        Signature {
            params: vec![x],
            return_type: Some(Type::float()),
            body: None,
        },
    );
    let v = var(&mut program, "v", Type::vec(2));
    with_main(&mut program, |body| {
        let mut bld = body.builder(Cursor::AtEnd);
        bld.call(Callee::Direct(sig), vec![], None);
        let ret = bld.deref_var(v);
        bld.call(Callee::Direct(sig), vec![Value::int(1)], Some(ret));
    });
    let errs = errors(&program);
    assert_eq!(errs.len(), 3, "{:?}", errs);
    assert!(matches!(errs[0], VerifyError::ArgumentCount { expected: 1, got: 0, .. }));
    assert!(matches!(errs[1], VerifyError::ArgumentType { index: 0, .. }));
    assert!(matches!(errs[2], VerifyError::ReturnDestinationMismatch { .. }));
}

#[test]
fn test_indirect_binding_index() {
    let mut program = Program::new();
    let shade = Type::subroutine("Shade");
    let one = var(&mut program, "one", shade.clone());
    let many = var(&mut program, "many", Type::array(shade, 2));
    with_main(&mut program, |body| {
        let mut bld = body.builder(Cursor::AtEnd);
        bld.call(
            Callee::Indirect {
                binding: one,
                array_index: Some(Box::new(Value::int(0))),
            },
            vec![],
            None,
        );
        bld.call(
            Callee::Indirect {
                binding: many,
                array_index: None,
            },
            vec![],
            None,
        );
    });
    let errs = errors(&program);
    assert_eq!(errs.len(), 2);
    assert!(matches!(errs[0], VerifyError::BindingIndexMismatch { arrayed: false, .. }));
    assert!(matches!(errs[1], VerifyError::BindingIndexMismatch { arrayed: true, .. }));
    assert!(errs[1].to_string().contains("needs an array index"));
}

#[test]
fn test_subroutine_index_operand() {
    let mut program = Program::new();
    let f = var(&mut program, "f", Type::float());
    with_main(&mut program, |body| {
        let mut bld = body.builder(Cursor::AtEnd);
        let handle = Value::Load(bld.deref_var(f));
        let cond = Value::binary(super::BinOp::Eq, Value::SubroutineIndex(Box::new(handle)), Value::int(0));
        let then_block = bld.build_block(|_| {});
        let else_block = bld.build_block(|_| {});
        bld.if_else(cond, then_block, else_block);
    });
    let errs = errors(&program);
    assert_eq!(errs.len(), 1);
    assert!(matches!(errs[0], VerifyError::NotASubroutineHandle { .. }));
}

#[test]
fn test_return_type() {
    let mut program = Program::new();
    with_main(&mut program, |body| {
        let mut bld = body.builder(Cursor::AtEnd);
        bld.ret(Some(Value::int(1)));
    });
    let errs = errors(&program);
    assert!(matches!(&errs[..], [VerifyError::ReturnType { .. }]));
    assert!(errs[0].to_string().contains("returning void"));
}

#[test]
fn test_errors_collected_across_bodies() {
    let mut program = Program::new();
    with_main(&mut program, |body| {
        body.builder(Cursor::AtEnd).ret(Some(Value::int(1)));
    });
    with_main(&mut program, |body| {
        body.builder(Cursor::AtEnd).ret(Some(Value::bool(true)));
    });
    assert_eq!(errors(&program).len(), 2);
    let sig = SigRef {
        func: program.function_by_name("main").unwrap(),
        overload: 0,
    };
    assert!(program.body(sig).is_some());
}
