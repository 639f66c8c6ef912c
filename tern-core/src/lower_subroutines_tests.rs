//! Tests for subroutine lowering.

use std::collections::HashSet;

use crate::Compiler;
use crate::ir::display::print_body;
use crate::ir::metadata::MetadataSet;
use crate::ir::typing::deref_type;
use crate::ir::verify::verify_program;
use crate::ir::{Block, Callee, Constant, DerefStep, InstKind, Program, SigRef, Value};
use crate::lower_subroutines::lower_subroutines;
use crate::registry::SubroutineRegistry;

// =============================================================================
// Test Helpers
// =============================================================================

fn program(source: &str) -> Program {
    Compiler::parse(source).unwrap().resolve().unwrap().program
}

fn lower(program: &mut Program) -> bool {
    let registry = SubroutineRegistry::from_program(program);
    lower_subroutines(program, &registry)
}

fn main_sig(program: &Program) -> SigRef {
    SigRef {
        func: program.function_by_name("main").unwrap(),
        overload: 0,
    }
}

fn main_text(program: &Program) -> String {
    print_body(program, program.body(main_sig(program)).unwrap())
}

/// Discriminant constants of every rung, outermost first.
fn rung_constants(block: &Block) -> Vec<i32> {
    let mut out = Vec::new();
    block.walk(&mut |b, _| {
        for inst in b.insts() {
            if let InstKind::If { cond, .. } = &inst.kind {
                match cond {
                    Value::Binary { rhs, .. } => match &**rhs {
                        Value::Const(Constant::Int(i)) => out.push(*i),
                        other => panic!("unexpected discriminant {:?}", other),
                    },
                    other => panic!("unexpected condition {:?}", other),
                }
            }
        }
    });
    out
}

/// Every direct call in a block tree.
fn direct_calls(block: &Block) -> Vec<&crate::ir::Inst> {
    let mut out = Vec::new();
    block.walk(&mut |b, _| {
        out.extend(b.insts().iter().filter(|i| {
            matches!(
                i.kind,
                InstKind::Call {
                    callee: Callee::Direct(_),
                    ..
                }
            )
        }));
    });
    out
}

/// Registry indices 1, 3 and 4 implement `Shade`; 0 and 2 implement `Other`.
const LADDER: &str = r#"
subroutine Shade
subroutine Other
uniform sel: Shade
in n: vec3
out frag: vec4

fn o0(x: vec3) -> vec4 : Other {
  local t: vec4
  return t
}

fn s1(x: vec3) -> vec4 : Shade {
  local t: vec4
  return t
}

fn o2(x: vec3) -> vec4 : Other {
  local t: vec4
  return t
}

fn s3(x: vec3) -> vec4 : Shade {
  local t: vec4
  return t
}

fn s4(x: vec3) -> vec4 : Shade, Other {
  local t: vec4
  return t
}

fn main() {
  call indirect sel(n) -> frag
}
"#;

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_ladder_covers_exactly_eligible_indices() {
    let mut program = program(LADDER);
    assert!(lower(&mut program));

    let body = program.body(main_sig(&program)).unwrap();
    let constants = rung_constants(&body.root);
    assert_eq!(constants, vec![1, 3, 4]);
    assert_eq!(constants.iter().collect::<HashSet<_>>().len(), 3);
    assert_eq!(direct_calls(&body.root).len(), 3);
    assert!(verify_program(&program).is_ok());
}

#[test]
fn test_ladder_text() {
    let mut program = program(LADDER);
    assert!(lower(&mut program));
    let expected = "\
if subroutine_index(sel) == 1 {
  call s1(n) -> frag
} else {
  if subroutine_index(sel) == 3 {
    call s3(n) -> frag
  } else {
    if subroutine_index(sel) == 4 {
      call s4(n) -> frag
    }
  }
}
";
    assert_eq!(main_text(&program), expected);
}

#[test]
fn test_return_destination_is_reused_once() {
    let mut program = program(LADDER);
    let sig = main_sig(&program);
    let original = match &program.body(sig).unwrap().root.insts()[0].kind {
        InstKind::Call { ret: Some(ret), .. } => ret.id(),
        other => panic!("expected a call, got {:?}", other),
    };

    assert!(lower(&mut program));

    let body = program.body(sig).unwrap();
    let mut ids = Vec::new();
    for call in direct_calls(&body.root) {
        let InstKind::Call { callee, ret: Some(ret), .. } = &call.kind else {
            panic!("rung call lost its destination");
        };
        assert_eq!(deref_type(&program.variables, ret), crate::ir::types::Type::vec(4));
        ids.push((callee_name(&program, callee), ret.id()));
    }

    // The first rung built is the highest index.
    let s4 = ids.iter().find(|(name, _)| name == "s4").unwrap();
    assert_eq!(s4.1, original);
    assert_eq!(ids.iter().filter(|(_, id)| *id == original).count(), 1);
    assert_eq!(ids.iter().map(|(_, id)| *id).collect::<HashSet<_>>().len(), ids.len());
}

fn callee_name(program: &Program, callee: &Callee) -> String {
    match callee {
        Callee::Direct(sig) => program.function(sig.func).name.clone(),
        Callee::Indirect { .. } => panic!("indirect call left after lowering"),
    }
}

#[test]
fn test_arguments_are_cloned_per_rung() {
    let mut program = program(LADDER);
    assert!(lower(&mut program));

    let body = program.body(main_sig(&program)).unwrap();
    let mut arg_ids = HashSet::new();
    for call in direct_calls(&body.root) {
        let InstKind::Call { args, .. } = &call.kind else { unreachable!() };
        match &args[0] {
            Value::Load(deref) => assert!(arg_ids.insert(deref.id())),
            other => panic!("unexpected argument {:?}", other),
        }
    }
    assert_eq!(arg_ids.len(), 3);
}

#[test]
fn test_no_eligible_candidate_removes_call() {
    let mut program = program(
        r#"
subroutine Shade
subroutine Unused
uniform sel: Unused
in n: vec3
out frag: vec4

fn s0(x: vec3) -> vec4 : Shade {
  local t: vec4
  return t
}

fn main() {
  copy frag, frag
  call indirect sel(n) -> frag
  return
}
"#,
    );
    assert!(lower(&mut program));
    assert_eq!(main_text(&program), "copy frag, frag\nreturn\n");
}

#[test]
fn test_candidate_without_matching_overload_is_skipped() {
    let mut program = program(
        r#"
subroutine Shade
uniform sel: Shade
in n: vec3
in f: float
out frag: vec4

fn a(x: vec3) -> vec4 : Shade {
  local t: vec4
  return t
}

fn b(x: float) -> vec4 : Shade {
  local t: vec4
  return t
}

fn b(x: vec3) -> vec4 : Shade {
  local t: vec4
  return t
}

fn c(x: float) -> vec4 : Shade {
  local t: vec4
  return t
}

fn main() {
  call indirect sel(n) -> frag
}
"#,
    );
    assert!(lower(&mut program));

    let body = program.body(main_sig(&program)).unwrap();
    assert_eq!(rung_constants(&body.root), vec![0, 1]);
    let calls = direct_calls(&body.root);
    let InstKind::Call {
        callee: Callee::Direct(sig),
        ..
    } = &calls[1].kind
    else {
        unreachable!()
    };
    assert_eq!(program.function(sig.func).name, "b");
    assert_eq!(sig.overload, 1);
}

#[test]
fn test_arrayed_binding_clones_index_per_rung() {
    let mut program = program(
        r#"
subroutine Shade
uniform sels: Shade[4]
uniform i: int
in n: vec3

fn a(x: vec3) : Shade {
  return
}

fn b(x: vec3) : Shade {
  return
}

fn main() {
  call indirect sels[i](n)
}
"#,
    );
    assert!(lower(&mut program));
    assert_eq!(
        main_text(&program),
        "if subroutine_index(sels[i]) == 0 {\n  call a(n)\n} else {\n  if subroutine_index(sels[i]) == 1 {\n    call b(n)\n  }\n}\n"
    );

    let body = program.body(main_sig(&program)).unwrap();
    let mut index_ids = HashSet::new();
    body.root.walk(&mut |b, _| {
        for inst in b.insts() {
            if let InstKind::If {
                cond: Value::Binary { lhs, .. },
                ..
            } = &inst.kind
            {
                let Value::SubroutineIndex(selector) = &**lhs else { unreachable!() };
                let Value::Load(deref) = &**selector else { unreachable!() };
                let DerefStep::Index(index) = &deref.steps()[0] else { unreachable!() };
                let Value::Load(index) = &**index else { unreachable!() };
                assert!(index_ids.insert(index.id()));
            }
        }
    });
    assert_eq!(index_ids.len(), 2);
    assert!(verify_program(&program).is_ok());
}

#[test]
fn test_calls_in_nested_blocks_are_lowered() {
    let mut program = program(
        r#"
subroutine Shade
uniform sel: Shade
uniform flag: bool

fn a() : Shade {
  return
}

fn main() {
  if flag {
    call indirect sel()
  } else {
    call a()
  }
}
"#,
    );
    assert!(lower(&mut program));
    assert_eq!(
        main_text(&program),
        "if flag {\n  if subroutine_index(sel) == 0 {\n    call a()\n  }\n} else {\n  call a()\n}\n"
    );
}

#[test]
fn test_direct_calls_untouched_and_no_progress() {
    let mut program = program(
        r#"
subroutine Shade

fn a() : Shade {
  return
}

fn main() {
  call a()
}
"#,
    );
    let before = main_text(&program);
    assert!(!lower(&mut program));
    assert_eq!(main_text(&program), before);
}

#[test]
fn test_metadata_invalidated_on_progress() {
    let mut program = program(LADDER);
    let sig = main_sig(&program);
    program.body_mut(sig).unwrap().require_metadata(MetadataSet::ALL);

    assert!(lower(&mut program));
    let body = program.body(sig).unwrap();
    assert_eq!(body.metadata.valid(), MetadataSet::NONE);
    assert!(body.metadata.block_index().is_none());
    assert!(body.metadata.dominance().is_none());
}

#[test]
fn test_metadata_kept_without_progress() {
    let mut program = program(LADDER);
    let s1 = SigRef {
        func: program.function_by_name("s1").unwrap(),
        overload: 0,
    };
    program.body_mut(s1).unwrap().require_metadata(MetadataSet::ALL);

    assert!(lower(&mut program));
    assert!(program.body(s1).unwrap().metadata.is_valid(MetadataSet::ALL));
    assert!(program.body(s1).unwrap().metadata.dominance().is_some());
}

#[test]
fn test_consecutive_calls_lowered_in_order() {
    let mut program = program(
        r#"
subroutine Shade
subroutine Unused
uniform sel: Shade
uniform none: Unused

fn a() : Shade {
  return
}

fn main() {
  call indirect sel()
  call indirect none()
  call indirect none()
  call indirect sel()
  call a()
  call indirect sel()
  return
}
"#,
    );
    assert!(lower(&mut program));

    let rung = "if subroutine_index(sel) == 0 {\n  call a()\n}\n";
    let expected = format!("{rung}{rung}call a()\n{rung}return\n");
    assert_eq!(main_text(&program), expected);
    assert_eq!(program.body(main_sig(&program)).unwrap().root.len(), 5);
    assert!(verify_program(&program).is_ok());

    assert!(!lower(&mut program));
    assert_eq!(main_text(&program), expected);
}
