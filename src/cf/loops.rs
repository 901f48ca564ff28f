//! Loop structure analysis (loop membership, headers, latches and nesting).

use crate::cf::unstructured::ControlFlowGraph;
use crate::{Block, EntityDefs, EntityOrientedDenseMap, FuncDefBody, FxIndexSet};
use itertools::Itertools;
use std::ops;

crate::entity::entities! {
    /// Entity handle for a [`LoopDef`] (a natural loop, found by [`LoopInfo`]).
    Loop => LoopDef,
}

/// Definition for a [`Loop`]: a strongly connected subgraph of the CFG.
#[derive(Clone)]
pub struct LoopDef {
    /// The only block of the loop that can be entered from outside the loop.
    //
    // FIXME(eddyb) irreducible control-flow is not supported, and will result
    // in the first block reached (in the traversal) being treated as the header.
    pub header: Block,

    /// The innermost loop containing this one, if any.
    pub parent: Option<Loop>,

    /// All the blocks in the loop, including those of nested loops.
    pub blocks: FxIndexSet<Block>,
}

/// Loop forest of a function, with each block mapped to its innermost loop.
///
/// Unlike most analyses, this can be updated in place by transformations that
/// add blocks to the CFG (see [`LoopInfo::add_block_to_loop`]).
#[derive(Clone, Default)]
pub struct LoopInfo {
    loops: EntityDefs<Loop>,
    innermost_loop_of: EntityOrientedDenseMap<Block, Loop>,
}

impl ops::Index<Loop> for LoopInfo {
    type Output = LoopDef;
    fn index(&self, lp: Loop) -> &LoopDef {
        &self.loops[lp]
    }
}

impl LoopInfo {
    pub fn with_func(func: &FuncDefBody) -> Self {
        let mut loop_info = Self::default();
        loop_info.compute(func);
        loop_info
    }

    /// Reset and compute the loop forest of `func`.
    pub fn compute(&mut self, func: &FuncDefBody) {
        let mut finder = LoopFinder::new(&func.cfg);
        finder.find_earliest_scc_root_of(func.entry);
        assert!(finder.scc_stack.is_empty());

        self.loops = finder.loops;
        self.innermost_loop_of = finder.innermost_loop_of;
    }

    /// Iterate over all loops, with outer loops always preceding the loops
    /// nested within them.
    pub fn loops(&self) -> impl Iterator<Item = Loop> + '_ {
        self.loops.keys()
    }

    /// Returns the innermost loop containing `block`, if any.
    pub fn loop_for(&self, block: Block) -> Option<Loop> {
        self.innermost_loop_of.get(block).copied()
    }

    pub fn header(&self, lp: Loop) -> Block {
        self.loops[lp].header
    }

    pub fn is_loop_header(&self, block: Block) -> bool {
        self.loop_for(block).is_some_and(|lp| self.header(lp) == block)
    }

    /// Returns `true` if `block` is part of `lp` (or of a loop nested in it).
    pub fn contains(&self, lp: Loop, block: Block) -> bool {
        self.loops[lp].blocks.contains(&block)
    }

    /// Number of loops containing `block` (`0` for blocks outside all loops).
    pub fn depth(&self, block: Block) -> usize {
        std::iter::successors(self.loop_for(block), |&lp| self.loops[lp].parent).count()
    }

    /// Returns the single block inside `lp` that branches back to its header,
    /// or `None` if there are several such blocks.
    pub fn latch(&self, lp: Loop, cfg: &ControlFlowGraph) -> Option<Block> {
        let header = self.header(lp);
        cfg.preds(header).filter(|&pred| self.contains(lp, pred)).unique().exactly_one().ok()
    }

    /// Add a newly created `block` to `lp` and every loop containing `lp`,
    /// making `lp` the innermost loop of `block`.
    #[track_caller]
    pub fn add_block_to_loop(&mut self, block: Block, lp: Loop) {
        assert!(
            self.loop_for(block).is_none(),
            "loop_info: {block:?} already belongs to a loop"
        );
        self.innermost_loop_of.insert(block, lp);

        let mut next = Some(lp);
        while let Some(lp) = next {
            self.loops[lp].blocks.insert(block);
            next = self.loops[lp].parent;
        }
    }
}

/// Minimal loop analysis, based on Tarjan's SCC (strongly connected components)
/// algorithm, applied recursively (for every level of loop nesting).
///
/// Here "minimal" means that each loops is the smallest CFG subgraph possible
/// (excluding any control-flow paths that cannot reach a backedge and cycle),
/// i.e. each loop is a CFG SCC (strongly connected component).
struct LoopFinder<'a> {
    cfg: &'a ControlFlowGraph,

    loops: EntityDefs<Loop>,
    innermost_loop_of: EntityOrientedDenseMap<Block, Loop>,

    /// The loop whose body is being searched for nested loops, if any.
    enclosing_loop: Option<Loop>,

    /// SCC accumulation stack, where CFG nodes collect during the depth-first
    /// traversal, and are only popped when their "SCC root" (loop header) is
    /// (note that multiple SCCs on the stack does *not* indicate SCC nesting,
    /// but rather a path between two SCCs, i.e. a loop *following* another).
    scc_stack: Vec<Block>,
    /// Per-CFG-node traversal state (often just pointing to a `scc_stack` slot).
    scc_state: EntityOrientedDenseMap<Block, SccState>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SccStackIdx(u32);

#[derive(PartialEq, Eq)]
enum SccState {
    /// CFG node has been reached and ended up somewhere on the `scc_stack`,
    /// where it will remain until the SCC it's part of will be completed.
    Pending(SccStackIdx),

    /// CFG node had been reached once, but is no longer on the `scc_stack`, its
    /// parent SCC having been completed (or it wasn't in an SCC to begin with).
    Complete,
}

impl<'a> LoopFinder<'a> {
    fn new(cfg: &'a ControlFlowGraph) -> Self {
        Self {
            cfg,
            loops: EntityDefs::new(),
            innermost_loop_of: EntityOrientedDenseMap::new(),
            enclosing_loop: None,
            scc_stack: vec![],
            scc_state: EntityOrientedDenseMap::new(),
        }
    }

    /// Tarjan's SCC algorithm works by computing the "earliest" reachable node,
    /// from every node (often using the name `lowlink`), which will be equal
    /// to the origin node itself iff that node is an "SCC root" (loop header),
    /// and always point to an "earlier" node if a cycle (via loop backedge) was
    /// found from somewhere else in the SCC (i.e. from inside the loop body).
    ///
    /// Here we track stack indices (as the stack order is the traversal order),
    /// and distinguish the acyclic case to avoid treating most nodes as self-loops.
    fn find_earliest_scc_root_of(&mut self, node: Block) -> Option<SccStackIdx> {
        let state_entry = self.scc_state.entry(node);
        if let Some(state) = &state_entry {
            return match *state {
                SccState::Pending(scc_stack_idx) => Some(scc_stack_idx),
                SccState::Complete => None,
            };
        }
        let scc_stack_idx = SccStackIdx(self.scc_stack.len().try_into().unwrap());
        self.scc_stack.push(node);
        *state_entry = Some(SccState::Pending(scc_stack_idx));

        let control_inst = self
            .cfg
            .control_inst_on_exit_from
            .get(node)
            .expect("cfg: missing `ControlInst` for reachable block");

        let earliest_scc_root = control_inst
            .targets
            .iter()
            .filter_map(|&target| self.find_earliest_scc_root_of(target))
            .min();

        // If this node has been chosen as the root of an SCC, complete that SCC.
        if earliest_scc_root == Some(scc_stack_idx) {
            let scc_start = scc_stack_idx.0 as usize;

            let new_loop = self.loops.define(LoopDef {
                header: node,
                parent: self.enclosing_loop,
                blocks: self.scc_stack[scc_start..].iter().copied().collect(),
            });
            // NOTE(eddyb) nested loops are found later, and will overwrite this.
            for &scc_node in &self.scc_stack[scc_start..] {
                self.innermost_loop_of.insert(scc_node, new_loop);
            }

            // Find nested loops by marking *only* the loop header as complete,
            // clearing loop body nodes' state, and recursing on them: all the
            // nodes outside the loop (otherwise reachable from within), and the
            // loop header itself, are already marked as complete, meaning that
            // all exits and backedges will be ignored, and the recursion will
            // only find more SCCs within the loop body (i.e. nested loops).
            self.scc_state[node] = SccState::Complete;
            let loop_body_range = scc_start + 1..self.scc_stack.len();
            for &scc_node in &self.scc_stack[loop_body_range.clone()] {
                self.scc_state.remove(scc_node);
            }
            let outer_loop = self.enclosing_loop.replace(new_loop);
            for i in loop_body_range.clone() {
                self.find_earliest_scc_root_of(self.scc_stack[i]);
            }
            self.enclosing_loop = outer_loop;
            assert_eq!(self.scc_stack.len(), loop_body_range.end);

            // Remove the entire SCC from the accumulation stack all at once.
            self.scc_stack.truncate(scc_start);

            return None;
        }

        // Not actually in an SCC at all, just some node outside any CFG cycles.
        if earliest_scc_root.is_none() {
            assert!(self.scc_stack.pop() == Some(node));
            self.scc_state[node] = SccState::Complete;
        }

        earliest_scc_root
    }
}
