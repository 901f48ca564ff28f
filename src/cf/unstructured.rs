//! Unstructured control-flow graph (CFG) abstractions and utilities.

use crate::{Block, EntityOrientedDenseMap, Value};
use smallvec::SmallVec;

/// The control-flow graph (CFG) of a function, as control-flow instructions
/// ([`ControlInst`]s) attached to [`Block`]s, as an "action on exit", i.e.
/// "terminator".
#[derive(Clone, Default)]
pub struct ControlFlowGraph {
    pub control_inst_on_exit_from: EntityOrientedDenseMap<Block, ControlInst>,
}

#[derive(Clone, Debug)]
pub struct ControlInst {
    pub kind: ControlInstKind,

    pub inputs: SmallVec<[Value; 2]>,

    /// Successors, with [`ControlInstKind::CondBranch`] using `targets[0]` for
    /// the "true" case, and `targets[1]` for the "false" case.
    pub targets: SmallVec<[Block; 2]>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ControlInstKind {
    /// Reaching this point in the control-flow is undefined behavior.
    Unreachable,

    /// Leave the current function, optionally returning a value.
    Return,

    /// Unconditional branch to a single target.
    Branch,

    /// Two-way branch on a boolean condition (`inputs[0]`), which for
    /// vectorized code may differ between lanes (i.e. "divergent").
    CondBranch,
}

impl ControlInst {
    pub fn ret(value: Option<Value>) -> Self {
        Self {
            kind: ControlInstKind::Return,
            inputs: value.into_iter().collect(),
            targets: SmallVec::new(),
        }
    }

    pub fn branch(target: Block) -> Self {
        Self {
            kind: ControlInstKind::Branch,
            inputs: SmallVec::new(),
            targets: [target].into_iter().collect(),
        }
    }

    pub fn cond_branch(cond: Value, on_true: Block, on_false: Block) -> Self {
        Self {
            kind: ControlInstKind::CondBranch,
            inputs: [cond].into_iter().collect(),
            targets: [on_true, on_false].into_iter().collect(),
        }
    }

    /// The condition of a [`ControlInstKind::CondBranch`] (`None` otherwise).
    pub fn cond(&self) -> Option<Value> {
        match self.kind {
            ControlInstKind::CondBranch => Some(self.inputs[0]),
            ControlInstKind::Unreachable | ControlInstKind::Return | ControlInstKind::Branch => {
                None
            }
        }
    }
}

impl ControlFlowGraph {
    /// Iterate over all [`Block`]s reachable from `entry`, in reverse
    /// post-order (RPO).
    ///
    /// RPO iteration over a CFG provides certain guarantees, most importantly
    /// that dominators are visited before the entire subgraph they dominate.
    pub fn rev_post_order(&self, entry: Block) -> impl DoubleEndedIterator<Item = Block> + use<> {
        let mut post_order = SmallVec::<[_; 8]>::new();
        self.post_order_from(entry, &mut EntityOrientedDenseMap::new(), &mut post_order);
        post_order.into_iter().rev()
    }

    /// Depth-first traversal of every [`Block`] reachable from `block` (and not
    /// yet in `visited`), pushing each one onto `post_order` after its targets.
    fn post_order_from(
        &self,
        block: Block,
        visited: &mut EntityOrientedDenseMap<Block, ()>,
        post_order: &mut SmallVec<[Block; 8]>,
    ) {
        if visited.insert(block, ()).is_some() {
            return;
        }

        let control_inst = self
            .control_inst_on_exit_from
            .get(block)
            .expect("cfg: missing `ControlInst` for reachable block");

        // NOTE(eddyb) this doesn't impact semantics, but combined with the
        // final reversal, it keeps targets in the original order in the cases
        // when they didn't get deduplicated.
        for &target in control_inst.targets.iter().rev() {
            self.post_order_from(target, visited, post_order);
        }

        post_order.push(block);
    }

    /// Iterate over the source [`Block`] of every edge targeting `block`
    /// (a predecessor with several edges into `block` is yielded once per edge).
    //
    // FIXME(eddyb) this is linear in the size of the whole CFG, cache a
    // predecessor map if this starts showing up in profiles.
    pub fn preds(&self, block: Block) -> impl Iterator<Item = Block> + '_ {
        self.control_inst_on_exit_from.iter().flat_map(move |(source, control_inst)| {
            control_inst
                .targets
                .iter()
                .filter(move |&&target| target == block)
                .map(move |_| source)
        })
    }

    /// Count all the edges into `block` (i.e. the number of times `block`
    /// appears in the `targets` of all the [`ControlInst`]s).
    pub fn incoming_edge_count(&self, block: Block) -> IncomingEdgeCount {
        let mut count = IncomingEdgeCount::default();
        for _ in self.preds(block) {
            count += IncomingEdgeCount::ONE;
        }
        count
    }
}

// HACK(eddyb) this only serves to disallow accessing `IncomingEdgeCount`'s private field.
mod sealed {
    /// Opaque newtype for the count of incoming edges (into a [`Block`](crate::Block)).
    ///
    /// The private field prevents direct mutation or construction, forcing the
    /// use of [`IncomingEdgeCount::ONE`] and addition operations to produce some
    /// specific count (which would require explicit workarounds for misuse).
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct IncomingEdgeCount(usize);

    impl IncomingEdgeCount {
        pub const ONE: Self = Self(1);
    }

    impl std::ops::Add for IncomingEdgeCount {
        type Output = Self;
        fn add(self, other: Self) -> Self {
            Self(self.0 + other.0)
        }
    }

    impl std::ops::AddAssign for IncomingEdgeCount {
        fn add_assign(&mut self, other: Self) {
            *self = *self + other;
        }
    }
}
pub use sealed::IncomingEdgeCount;
