//! Validity tracking for derived analyses of a function body.
//!
//! Every pass declares on return which analyses it kept intact:
//! - `preserve(set)` keeps only the analyses in `set` valid,
//! - `invalidate_all()` keeps none,
//! - `mark_unchanged()` records that the pass changed nothing.
//!
//! Debug builds additionally arm a `not_properly_reset` bit before a pass runs
//! (`set_validation_flag`) and assert after it returns
//! (`check_validation_flag`) that the pass made one of the three declarations.

use indexmap::IndexMap;
use serde::Serialize;

use super::{Block, BlockId};

/// A set of analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetadataSet {
    pub block_index: bool,
    pub dominance: bool,
}

impl MetadataSet {
    pub const NONE: MetadataSet = MetadataSet {
        block_index: false,
        dominance: false,
    };
    pub const BLOCK_INDEX: MetadataSet = MetadataSet {
        block_index: true,
        dominance: false,
    };
    pub const DOMINANCE: MetadataSet = MetadataSet {
        block_index: false,
        dominance: true,
    };
    pub const ALL: MetadataSet = MetadataSet {
        block_index: true,
        dominance: true,
    };

    pub fn union(self, other: MetadataSet) -> MetadataSet {
        MetadataSet {
            block_index: self.block_index || other.block_index,
            dominance: self.dominance || other.dominance,
        }
    }

    pub fn intersection(self, other: MetadataSet) -> MetadataSet {
        MetadataSet {
            block_index: self.block_index && other.block_index,
            dominance: self.dominance && other.dominance,
        }
    }

    pub fn contains(self, other: MetadataSet) -> bool {
        self.intersection(other) == other
    }

    pub fn is_empty(self) -> bool {
        self == MetadataSet::NONE
    }
}

impl std::ops::BitOr for MetadataSet {
    type Output = MetadataSet;

    fn bitor(self, rhs: MetadataSet) -> MetadataSet {
        self.union(rhs)
    }
}

/// Pre-order numbering of every block in a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndex {
    order: IndexMap<BlockId, usize>,
}

impl BlockIndex {
    pub fn compute(root: &Block) -> Self {
        let mut order = IndexMap::new();
        root.walk(&mut |block, _| {
            let next = order.len();
            order.insert(block.id(), next);
        });
        BlockIndex { order }
    }

    pub fn index_of(&self, block: BlockId) -> Option<usize> {
        self.order.get(&block).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Blocks in index order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.order.keys().copied()
    }
}

/// Immediate dominators.
///
/// In the structured form the branch blocks of a conditional are immediately
/// dominated by the block that holds the conditional; the root has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dominance {
    idom: IndexMap<BlockId, Option<BlockId>>,
}

impl Dominance {
    pub fn compute(root: &Block) -> Self {
        let mut idom = IndexMap::new();
        root.walk(&mut |block, parent| {
            idom.insert(block.id(), parent);
        });
        Dominance { idom }
    }

    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(&block).copied().flatten()
    }

    /// Whether `a` dominates `b`. Every block dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut current = Some(b);
        while let Some(block) = current {
            if block == a {
                return true;
            }
            current = self.immediate_dominator(block);
        }
        false
    }
}

/// Per-body validity record plus the cached analyses.
#[derive(Debug, Clone)]
pub struct Metadata {
    valid: MetadataSet,
    block_index: Option<BlockIndex>,
    dominance: Option<Dominance>,
    #[cfg(debug_assertions)]
    not_properly_reset: bool,
}

impl Metadata {
    /// Everything starts valid; analyses are computed on first request.
    pub fn new() -> Self {
        Metadata {
            valid: MetadataSet::ALL,
            block_index: None,
            dominance: None,
            #[cfg(debug_assertions)]
            not_properly_reset: false,
        }
    }

    pub fn valid(&self) -> MetadataSet {
        self.valid
    }

    pub fn is_valid(&self, set: MetadataSet) -> bool {
        self.valid.contains(set)
    }

    /// Keep only the analyses in `set` valid.
    pub fn preserve(&mut self, set: MetadataSet) {
        self.valid = self.valid.intersection(set);
        if !self.valid.block_index {
            self.block_index = None;
        }
        if !self.valid.dominance {
            self.dominance = None;
        }
        self.clear_validation_flag();
    }

    pub fn invalidate_all(&mut self) {
        self.preserve(MetadataSet::NONE);
    }

    /// Declare that the last pass left the body untouched.
    pub fn mark_unchanged(&mut self) {
        self.clear_validation_flag();
    }

    /// Cached block index, if computed and still valid.
    pub fn block_index(&self) -> Option<&BlockIndex> {
        self.block_index.as_ref().filter(|_| self.valid.block_index)
    }

    /// Cached dominance, if computed and still valid.
    pub fn dominance(&self) -> Option<&Dominance> {
        self.dominance.as_ref().filter(|_| self.valid.dominance)
    }

    /// Compute every analysis in `set` that is invalid or missing.
    pub(crate) fn require(&mut self, root: &Block, set: MetadataSet) -> MetadataSet {
        let mut recomputed = MetadataSet::NONE;
        if set.block_index && self.block_index().is_none() {
            self.block_index = Some(BlockIndex::compute(root));
            self.valid.block_index = true;
            recomputed.block_index = true;
        }
        if set.dominance && self.dominance().is_none() {
            self.dominance = Some(Dominance::compute(root));
            self.valid.dominance = true;
            recomputed.dominance = true;
        }
        recomputed
    }

    /// Arm the debug check before a pass runs.
    pub fn set_validation_flag(&mut self) {
        #[cfg(debug_assertions)]
        {
            self.not_properly_reset = true;
        }
    }

    /// After a pass: assert it declared what it preserved. No-op in release builds.
    pub fn check_validation_flag(&self, pass: &str) {
        #[cfg(debug_assertions)]
        assert!(
            !self.not_properly_reset,
            "{} returned without declaring which metadata it preserved",
            pass
        );
        #[cfg(not(debug_assertions))]
        let _ = pass;
    }

    /// Whether the debug check is currently armed. Always false in release builds.
    pub fn validation_flag_armed(&self) -> bool {
        #[cfg(debug_assertions)]
        {
            self.not_properly_reset
        }
        #[cfg(not(debug_assertions))]
        {
            false
        }
    }

    fn clear_validation_flag(&mut self) {
        #[cfg(debug_assertions)]
        {
            self.not_properly_reset = false;
        }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}
