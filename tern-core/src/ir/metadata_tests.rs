use super::metadata::{BlockIndex, Dominance, Metadata, MetadataSet};
use super::{FuncBody, InstKind, SigRef};
use crate::Compiler;

const NESTED: &str = r#"
uniform flag: bool

fn main() {
  if flag {
    if flag {
      return
    }
  } else {
    return
  }
}
"#;

fn nested_body() -> FuncBody {
    let mut program = Compiler::parse(NESTED).unwrap().resolve().unwrap().program;
    let sig = SigRef {
        func: program.function_by_name("main").unwrap(),
        overload: 0,
    };
    let sig = &mut program.functions[sig.func].overloads[sig.overload as usize];
    sig.body.take().unwrap()
}

#[test]
fn test_set_operations() {
    let all = MetadataSet::BLOCK_INDEX | MetadataSet::DOMINANCE;
    assert_eq!(all, MetadataSet::ALL);
    assert!(all.contains(MetadataSet::DOMINANCE));
    assert!(!MetadataSet::BLOCK_INDEX.contains(MetadataSet::ALL));
    assert_eq!(all.intersection(MetadataSet::BLOCK_INDEX), MetadataSet::BLOCK_INDEX);
    assert!(MetadataSet::NONE.is_empty());
    assert!(MetadataSet::ALL.contains(MetadataSet::NONE));
}

#[test]
fn test_starts_valid_without_caches() {
    let metadata = Metadata::new();
    assert!(metadata.is_valid(MetadataSet::ALL));
    assert!(metadata.block_index().is_none());
    assert!(metadata.dominance().is_none());
}

#[test]
fn test_preserve_drops_only_invalidated_caches() {
    let mut body = nested_body();
    assert_eq!(body.require_metadata(MetadataSet::ALL), MetadataSet::ALL);

    body.metadata.preserve(MetadataSet::BLOCK_INDEX);
    assert_eq!(body.metadata.valid(), MetadataSet::BLOCK_INDEX);
    assert!(body.metadata.block_index().is_some());
    assert!(body.metadata.dominance().is_none());

    // Preserving cannot revalidate.
    body.metadata.preserve(MetadataSet::ALL);
    assert_eq!(body.metadata.valid(), MetadataSet::BLOCK_INDEX);

    assert_eq!(body.require_metadata(MetadataSet::ALL), MetadataSet::DOMINANCE);
    assert!(body.metadata.is_valid(MetadataSet::ALL));
}

#[test]
fn test_invalidate_all() {
    let mut body = nested_body();
    body.require_metadata(MetadataSet::ALL);
    body.metadata.invalidate_all();
    assert_eq!(body.metadata.valid(), MetadataSet::NONE);
    assert!(body.metadata.block_index().is_none());
    assert_eq!(body.require_metadata(MetadataSet::DOMINANCE), MetadataSet::DOMINANCE);
    assert_eq!(body.metadata.valid(), MetadataSet::DOMINANCE);
}

#[test]
fn test_require_is_idempotent() {
    let mut body = nested_body();
    assert_eq!(body.require_metadata(MetadataSet::ALL), MetadataSet::ALL);
    assert_eq!(body.require_metadata(MetadataSet::ALL), MetadataSet::NONE);
}

#[test]
fn test_block_index_is_preorder() {
    let body = nested_body();
    let index = BlockIndex::compute(&body.root);
    assert_eq!(index.len(), 5);

    let outer = &body.root.insts()[0];
    let InstKind::If {
        then_block,
        else_block,
        ..
    } = &outer.kind
    else {
        unreachable!()
    };
    let InstKind::If {
        then_block: inner_then,
        else_block: inner_else,
        ..
    } = &then_block.insts()[0].kind
    else {
        unreachable!()
    };

    assert_eq!(index.index_of(body.root.id()), Some(0));
    assert_eq!(index.index_of(then_block.id()), Some(1));
    assert_eq!(index.index_of(inner_then.id()), Some(2));
    assert_eq!(index.index_of(inner_else.id()), Some(3));
    assert_eq!(index.index_of(else_block.id()), Some(4));
}

#[test]
fn test_dominance_follows_nesting() {
    let body = nested_body();
    let dom = Dominance::compute(&body.root);

    let InstKind::If {
        then_block,
        else_block,
        ..
    } = &body.root.insts()[0].kind
    else {
        unreachable!()
    };
    let InstKind::If {
        then_block: inner_then,
        ..
    } = &then_block.insts()[0].kind
    else {
        unreachable!()
    };

    let root = body.root.id();
    assert_eq!(dom.immediate_dominator(root), None);
    assert_eq!(dom.immediate_dominator(then_block.id()), Some(root));
    assert_eq!(dom.immediate_dominator(inner_then.id()), Some(then_block.id()));
    assert!(dom.dominates(root, inner_then.id()));
    assert!(dom.dominates(then_block.id(), then_block.id()));
    assert!(!dom.dominates(else_block.id(), inner_then.id()));
    assert!(!dom.dominates(inner_then.id(), then_block.id()));
}

#[cfg(debug_assertions)]
#[test]
fn test_validation_flag_cleared_by_declarations() {
    let mut metadata = Metadata::new();

    metadata.set_validation_flag();
    assert!(metadata.validation_flag_armed());
    metadata.mark_unchanged();
    assert!(!metadata.validation_flag_armed());
    metadata.check_validation_flag("test");

    metadata.set_validation_flag();
    metadata.preserve(MetadataSet::ALL);
    metadata.check_validation_flag("test");

    metadata.set_validation_flag();
    metadata.invalidate_all();
    metadata.check_validation_flag("test");
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "without declaring which metadata it preserved")]
fn test_validation_flag_catches_silent_pass() {
    let mut metadata = Metadata::new();
    metadata.set_validation_flag();
    metadata.check_validation_flag("forgetful-pass");
}
