//! Vectorization analysis results: per-value shapes, block predicates, and
//! the region of the function being vectorized.
//!
//! Nothing here computes shapes or predicates (that's the job of whichever
//! divergence analysis ran before), [`VectorizationInfo`] only records them,
//! and lets transformations keep them up to date for the code they add.

use crate::cf::loops::{Loop, LoopInfo};
use crate::cf::unstructured::ControlFlowGraph;
use crate::{Block, EntityOrientedDenseMap, FuncDefBody, FxIndexSet, Value};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a (scalar) value varies across the SIMD lanes of the vectorized code.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum VectorShape {
    /// Same value in all lanes.
    Uniform,

    /// Lane `i` holds `base + i * stride` (for some `base`, equal across lanes).
    Strided { stride: i64 },

    /// No known relationship between lanes.
    Varying,
}

impl VectorShape {
    pub fn is_uniform(self) -> bool {
        matches!(self, VectorShape::Uniform)
    }

    pub fn is_varying(self) -> bool {
        matches!(self, VectorShape::Varying)
    }
}

impl fmt::Display for VectorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorShape::Uniform => f.write_str("uni"),
            VectorShape::Strided { stride } => write!(f, "stride({stride})"),
            VectorShape::Varying => f.write_str("varying"),
        }
    }
}

/// The part of a function that gets vectorized.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum VectorRegion {
    /// Every block of the function (whole-function vectorization).
    WholeFunction,

    /// The blocks of a single loop (outer-loop vectorization), entered
    /// through the loop header.
    Loop(Loop),
}

pub struct VectorizationInfo {
    region: VectorRegion,
    vector_width: u32,

    value_shapes: FxHashMap<Value, VectorShape>,

    /// Shapes of terminators, when they can't be derived from their inputs
    /// (e.g. a branch on a uniform condition, in a block with a varying predicate).
    terminator_shapes: EntityOrientedDenseMap<Block, VectorShape>,

    /// Per-block masks (`None` meaning "all lanes active").
    predicates: EntityOrientedDenseMap<Block, Value>,

    /// Blocks that were created as BOSCC guards (see [`crate::passes::boscc`]).
    boscc_guards: FxIndexSet<Block>,
}

impl VectorizationInfo {
    pub fn new(region: VectorRegion, vector_width: u32) -> Self {
        assert!(vector_width > 0, "vec_info: vector width must be non-zero");
        Self {
            region,
            vector_width,
            value_shapes: FxHashMap::default(),
            terminator_shapes: EntityOrientedDenseMap::new(),
            predicates: EntityOrientedDenseMap::new(),
            boscc_guards: FxIndexSet::default(),
        }
    }

    pub fn vector_width(&self) -> u32 {
        self.vector_width
    }

    /// Is `block` part of the vectorized region?
    ///
    /// For [`VectorRegion::Loop`], membership follows `loop_info`, so blocks
    /// added to the loop later (via [`LoopInfo::add_block_to_loop`]) are
    /// automatically part of the region as well.
    pub fn in_region(&self, block: Block, loop_info: &LoopInfo) -> bool {
        match self.region {
            VectorRegion::WholeFunction => true,
            VectorRegion::Loop(lp) => loop_info.contains(lp, block),
        }
    }

    /// The single block through which the vectorized region is entered.
    pub fn region_entry(&self, func: &FuncDefBody, loop_info: &LoopInfo) -> Block {
        match self.region {
            VectorRegion::WholeFunction => func.entry,
            VectorRegion::Loop(lp) => loop_info.header(lp),
        }
    }

    /// Returns the shape of `value`, with constants always being uniform, and
    /// values never given a shape (by [`VectorizationInfo::set_shape`])
    /// conservatively treated as varying.
    pub fn shape(&self, value: Value) -> VectorShape {
        if value.is_constant() {
            return VectorShape::Uniform;
        }
        self.value_shapes.get(&value).copied().unwrap_or(VectorShape::Varying)
    }

    pub fn set_shape(&mut self, value: Value, shape: VectorShape) {
        self.value_shapes.insert(value, shape);
    }

    pub fn terminator_shape(&self, block: Block) -> Option<VectorShape> {
        self.terminator_shapes.get(block).copied()
    }

    pub fn set_terminator_shape(&mut self, block: Block, shape: VectorShape) {
        self.terminator_shapes.insert(block, shape);
    }

    /// Shape of the branch terminating `block`: its explicitly recorded shape if
    /// any, or that of its condition (unconditional terminators are uniform).
    pub fn branch_shape(&self, block: Block, cfg: &ControlFlowGraph) -> VectorShape {
        if let Some(shape) = self.terminator_shape(block) {
            return shape;
        }
        cfg.control_inst_on_exit_from
            .get(block)
            .and_then(|control_inst| control_inst.cond())
            .map_or(VectorShape::Uniform, |cond| self.shape(cond))
    }

    pub fn predicate(&self, block: Block) -> Option<Value> {
        self.predicates.get(block).copied()
    }

    pub fn set_predicate(&mut self, block: Block, predicate: Value) {
        self.predicates.insert(block, predicate);
    }

    pub fn is_boscc_guard(&self, block: Block) -> bool {
        self.boscc_guards.contains(&block)
    }

    pub fn mark_boscc_guard(&mut self, block: Block) {
        self.boscc_guards.insert(block);
    }

    /// All BOSCC guard blocks, in creation order.
    pub fn boscc_guards(&self) -> impl ExactSizeIterator<Item = Block> + '_ {
        self.boscc_guards.iter().copied()
    }
}
