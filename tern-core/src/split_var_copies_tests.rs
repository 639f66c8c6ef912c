//! Tests for copy splitting.

use crate::Compiler;
use crate::ir::display::print_body;
use crate::ir::metadata::MetadataSet;
use crate::ir::typing::deref_type;
use crate::ir::verify::verify_program;
use crate::ir::{Block, DerefStep, InstKind, Program, SigRef};
use crate::split_var_copies::split_var_copies;

// =============================================================================
// Test Helpers
// =============================================================================

fn program(source: &str) -> Program {
    Compiler::parse(source).unwrap().resolve().unwrap().program
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

/// Every copy in a block tree.
fn copies(block: &Block) -> Vec<&crate::ir::Inst> {
    let mut out = Vec::new();
    block.walk(&mut |b, _| {
        out.extend(b.insts().iter().filter(|i| matches!(i.kind, InstKind::Copy { .. })));
    });
    out
}

const LIGHT: &str = r#"
struct Light { color: vec3, falloff: float[4] }

fn main() {
  local a: Light
  local b: Light
  copy a, b
}
"#;

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_struct_splits_into_leaf_and_wildcard() {
    let mut program = program(LIGHT);
    assert!(split_var_copies(&mut program));
    assert_eq!(main_text(&program), "copy a.color, b.color\ncopy a.falloff[*], b.falloff[*]\n");
}

#[test]
fn test_array_is_never_unrolled() {
    let mut program = program(
        r#"
fn main() {
  local a: vec4[64]
  local b: vec4[64]
  copy a, b
}
"#,
    );
    assert!(split_var_copies(&mut program));
    assert_eq!(main_text(&program), "copy a[*], b[*]\n");
}

#[test]
fn test_nested_struct_with_matrix() {
    let mut program = program(
        r#"
struct Inner { m: mat3x4, s: float }
struct Outer { inner: Inner, tag: int }

fn main() {
  local a: Outer
  local b: Outer
  copy a, b
}
"#,
    );
    assert!(split_var_copies(&mut program));
    assert_eq!(
        main_text(&program),
        "copy a.inner.m[*], b.inner.m[*]\ncopy a.inner.s, b.inner.s\ncopy a.tag, b.tag\n"
    );
}

#[test]
fn test_array_of_structs_keeps_wildcard_inside_chain() {
    let mut program = program(
        r#"
struct Light { color: vec3, falloff: float[4] }

fn main() {
  local a: Light[8]
  local b: Light[8]
  copy a, b
}
"#,
    );
    assert!(split_var_copies(&mut program));
    assert_eq!(
        main_text(&program),
        "copy a[*].color, b[*].color\ncopy a[*].falloff[*], b[*].falloff[*]\n"
    );
}

#[test]
fn test_every_split_copy_has_leaf_type() {
    let mut program = program(
        r#"
struct Inner { m: mat2, v: float[3][2] }
struct Outer { inner: Inner[2], n: vec2 }

fn main() {
  local a: Outer
  local b: Outer
  copy a, b
  if true {
    copy a.inner, b.inner
  }
}
"#,
    );
    assert!(split_var_copies(&mut program));

    let sig = main_sig(&program);
    let body = program.body(sig).unwrap();
    let all = copies(&body.root);
    assert!(!all.is_empty());
    for inst in all {
        let InstKind::Copy { dst, src } = &inst.kind else { unreachable!() };
        assert!(deref_type(&program.variables, dst).is_leaf());
        assert_eq!(deref_type(&program.variables, dst), deref_type(&program.variables, src));
        assert_eq!(dst.wildcard_count(), src.wildcard_count());
    }
    assert!(verify_program(&program).is_ok());
}

#[test]
fn test_leaf_copies_are_untouched() {
    let mut program = program(
        r#"
fn main() {
  local a: vec3
  local b: vec3
  copy a, b
}
"#,
    );
    let before = program.body(main_sig(&program)).unwrap().root.insts()[0].id();
    assert!(!split_var_copies(&mut program));
    let body = program.body(main_sig(&program)).unwrap();
    assert_eq!(body.root.insts()[0].id(), before);
}

#[test]
fn test_second_run_is_a_fixed_point() {
    let mut program = program(LIGHT);
    assert!(split_var_copies(&mut program));
    let once = main_text(&program);
    assert!(!split_var_copies(&mut program));
    assert_eq!(main_text(&program), once);
}

#[test]
fn test_split_position_and_order() {
    let mut program = program(
        r#"
struct Pair { x: float, y: float }

fn main() {
  local a: Pair
  local b: Pair
  local f: float
  copy f, a.x
  copy a, b
  copy a.y, f
}
"#,
    );
    assert!(split_var_copies(&mut program));
    assert_eq!(
        main_text(&program),
        "copy f, a.x\ncopy a.x, b.x\ncopy a.y, b.y\ncopy a.y, f\n"
    );
}

#[test]
fn test_nested_blocks_are_split() {
    let mut program = program(
        r#"
struct Pair { x: float, y: float }
uniform flag: bool

fn main() {
  local a: Pair
  local b: Pair
  if flag {
    copy a, b
  } else {
    copy b, a
  }
}
"#,
    );
    assert!(split_var_copies(&mut program));
    assert_eq!(
        main_text(&program),
        "if flag {\n  copy a.x, b.x\n  copy a.y, b.y\n} else {\n  copy b.x, a.x\n  copy b.y, a.y\n}\n"
    );
}

#[test]
fn test_indexed_operands_get_independent_index_copies() {
    let mut program = program(
        r#"
struct Pair { x: float, y: float }
uniform i: int

fn main() {
  local a: Pair[4]
  local b: Pair
  copy a[i], b
}
"#,
    );
    assert!(split_var_copies(&mut program));

    let body = program.body(main_sig(&program)).unwrap();
    let mut index_ids = Vec::new();
    for inst in body.root.insts() {
        let InstKind::Copy { dst, .. } = &inst.kind else { unreachable!() };
        match &dst.steps()[0] {
            DerefStep::Index(value) => match &**value {
                crate::ir::Value::Load(d) => index_ids.push(d.id()),
                other => panic!("unexpected index {:?}", other),
            },
            other => panic!("unexpected step {:?}", other),
        }
    }
    assert_eq!(index_ids.len(), 2);
    assert_ne!(index_ids[0], index_ids[1]);
}

#[test]
fn test_metadata_preserved_on_progress() {
    let mut program = program(LIGHT);
    let sig = main_sig(&program);
    program.body_mut(sig).unwrap().require_metadata(MetadataSet::ALL);

    assert!(split_var_copies(&mut program));
    let body = program.body(sig).unwrap();
    assert!(body.metadata.is_valid(MetadataSet::ALL));
    assert!(body.metadata.block_index().is_some());
    assert!(body.metadata.dominance().is_some());
}

#[test]
fn test_no_progress_still_clears_validation_flag() {
    let mut program = program(
        r#"
fn main() {
  local a: float
  local b: float
  copy a, b
}
"#,
    );
    let sig = main_sig(&program);
    program.body_mut(sig).unwrap().metadata.set_validation_flag();
    assert!(!split_var_copies(&mut program));
    assert!(!program.body(sig).unwrap().metadata.validation_flag_armed());
}

#[test]
fn test_long_block_splits_every_copy_in_order() {
    let mut source = String::from(
        "struct Pair { x: float, y: float }\n\nfn main() {\n  local a: Pair\n  local b: Pair\n  local f: float\n",
    );
    let mut expected = String::new();
    for _ in 0..100 {
        source.push_str("  copy a, b\n  copy b, a\n  copy f, a.x\n");
        expected.push_str("copy a.x, b.x\ncopy a.y, b.y\ncopy b.x, a.x\ncopy b.y, a.y\ncopy f, a.x\n");
    }
    source.push_str("}\n");

    let mut program = program(&source);
    assert!(split_var_copies(&mut program));
    assert_eq!(main_text(&program), expected);
    assert_eq!(program.body(main_sig(&program)).unwrap().root.len(), 500);

    assert!(!split_var_copies(&mut program));
    assert_eq!(main_text(&program), expected);
}
