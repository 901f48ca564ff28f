//! Dominator and post-dominator trees.
//!
//! Both are computed from scratch with the Cooper-Harvey-Kennedy iterative
//! algorithm ("A Simple, Fast Dominance Algorithm"), on the CFG numbered in
//! reverse post-order, but the [`DominatorTree`] can also be patched in place
//! (see [`DominatorTree::add_new_block`] and
//! [`DominatorTree::change_immediate_dominator`]), for transformations that
//! know exactly how their CFG edits affect dominance, and [`DominatorTree::verify`]
//! can be used afterwards to check that knowledge against a full recompute.

use crate::cf::verify::VerifyError;
use crate::{Block, EntityOrientedDenseMap, FuncDefBody};
use smallvec::SmallVec;

/// Sentinel for "no immediate dominator computed yet" (see `compute_idoms_in_rpo`).
const UNDEF: usize = usize::MAX;

/// Compute immediate dominators for a graph whose nodes have been numbered
/// in reverse post-order, starting at `0` (the root), where `preds[i]` lists
/// the RPO numbers of all predecessors of node `i`.
///
/// The result maps every node to the RPO number of its immediate dominator,
/// with the root being its own immediate dominator.
fn compute_idoms_in_rpo(preds: &[SmallVec<[usize; 4]>]) -> Vec<usize> {
    let mut idoms = vec![UNDEF; preds.len()];
    if idoms.is_empty() {
        return idoms;
    }
    idoms[0] = 0;

    let intersect = |idoms: &[usize], mut a: usize, mut b: usize| {
        while a != b {
            while a > b {
                a = idoms[a];
            }
            while b > a {
                b = idoms[b];
            }
        }
        a
    };

    // If the graph is free of irreducible control flow, this converges after
    // one iteration (plus one more to confirm nothing changed).
    let mut changed = true;
    while changed {
        changed = false;
        for node in 1..preds.len() {
            let mut processed_preds = preds[node].iter().copied().filter(|&p| idoms[p] != UNDEF);
            let Some(first) = processed_preds.next() else {
                continue;
            };
            let new_idom = processed_preds.fold(first, |idom, p| intersect(&idoms, idom, p));
            if idoms[node] != new_idom {
                idoms[node] = new_idom;
                changed = true;
            }
        }
    }
    idoms
}

#[derive(Copy, Clone)]
struct DomNode {
    /// The immediate dominator, which is `None` only for the root of the tree.
    idom: Option<Block>,
}

/// Walk up the (post-)dominator tree from `b`, looking for `a`.
fn tree_dominates(nodes: &EntityOrientedDenseMap<Block, DomNode>, a: Block, b: Block) -> bool {
    if a == b {
        return true;
    }
    let mut node = b;
    while let Some(&DomNode { idom: Some(idom) }) = nodes.get(node) {
        if idom == a {
            return true;
        }
        node = idom;
    }
    false
}

/// The dominator tree for a single function, rooted at its entry block.
///
/// Unreachable blocks are not part of the tree (see [`DominatorTree::contains`]).
#[derive(Clone, Default)]
pub struct DominatorTree {
    nodes: EntityOrientedDenseMap<Block, DomNode>,
    root: Option<Block>,
}

impl DominatorTree {
    /// Allocate and compute a dominator tree.
    pub fn with_func(func: &FuncDefBody) -> Self {
        let mut dom_tree = Self::default();
        dom_tree.compute(func);
        dom_tree
    }

    /// Reset and compute the dominator tree of `func`.
    pub fn compute(&mut self, func: &FuncDefBody) {
        let rpo: Vec<Block> = func.cfg.rev_post_order(func.entry).collect();

        let mut rpo_idx = EntityOrientedDenseMap::new();
        for (i, &block) in rpo.iter().enumerate() {
            rpo_idx.insert(block, i);
        }

        let mut preds = vec![SmallVec::new(); rpo.len()];
        for &block in &rpo {
            for &target in &func.cfg.control_inst_on_exit_from[block].targets {
                preds[rpo_idx[target]].push(rpo_idx[block]);
            }
        }

        let idoms = compute_idoms_in_rpo(&preds);

        self.nodes.clear();
        for (i, &block) in rpo.iter().enumerate() {
            self.nodes.insert(block, DomNode { idom: (i != 0).then(|| rpo[idoms[i]]) });
        }
        self.root = rpo.first().copied();
    }

    pub fn root(&self) -> Option<Block> {
        self.root
    }

    /// Is `block` part of the tree (i.e. is it reachable from the entry)?
    pub fn contains(&self, block: Block) -> bool {
        self.nodes.contains_key(block)
    }

    /// Returns the immediate dominator of `block`, or `None` if `block` is
    /// either the entry, or unreachable.
    pub fn idom(&self, block: Block) -> Option<Block> {
        self.nodes.get(block)?.idom
    }

    /// Returns `true` if `a` dominates `b`, i.e. every control-flow path from
    /// the entry to `b` must go through `a` (every block dominates itself).
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        tree_dominates(&self.nodes, a, b)
    }

    /// Register a new `block` (not yet in the tree), immediately dominated by `idom`.
    #[track_caller]
    pub fn add_new_block(&mut self, block: Block, idom: Block) {
        assert!(self.contains(idom), "dom_tree: {idom:?} is not part of the tree");
        let previous = self.nodes.insert(block, DomNode { idom: Some(idom) });
        assert!(previous.is_none(), "dom_tree: {block:?} was already part of the tree");
    }

    /// Make `new_idom` the immediate dominator of `block` (both already in the tree).
    #[track_caller]
    pub fn change_immediate_dominator(&mut self, block: Block, new_idom: Block) {
        assert!(self.contains(new_idom), "dom_tree: {new_idom:?} is not part of the tree");
        assert!(Some(block) != self.root, "dom_tree: cannot change the idom of the root");
        assert!(
            !self.dominates(block, new_idom),
            "dom_tree: making {new_idom:?} the idom of {block:?} would introduce a cycle"
        );
        self.nodes[block].idom = Some(new_idom);
    }

    /// Check that this (potentially incrementally patched) tree is exactly the
    /// dominator tree that would be computed from scratch for `func`.
    pub fn verify(&self, func: &FuncDefBody) -> Result<(), VerifyError> {
        let fresh = Self::with_func(func);

        if fresh.root != self.root {
            return Err(VerifyError::DomTreeRootMismatch { expected: fresh.root, found: self.root });
        }
        for (block, &DomNode { idom: expected }) in fresh.nodes.iter() {
            match self.nodes.get(block) {
                None => return Err(VerifyError::DomTreeMissingBlock(block)),
                Some(&DomNode { idom: found }) if found != expected => {
                    return Err(VerifyError::DomTreeIdomMismatch { block, expected, found });
                }
                Some(_) => {}
            }
        }
        if let Some((block, _)) = self.nodes.iter().find(|&(block, _)| !fresh.contains(block)) {
            return Err(VerifyError::DomTreeUnreachableBlock(block));
        }
        Ok(())
    }
}

/// The post-dominator tree for a single function.
///
/// All the exits of the function (i.e. blocks without successors) hang off
/// an implicit "virtual exit" root, and blocks which cannot reach any exit
/// (e.g. stuck in infinite loops) are not part of the tree.
#[derive(Clone, Default)]
pub struct PostDominatorTree {
    /// `idom: None` means the immediate post-dominator is the virtual exit.
    nodes: EntityOrientedDenseMap<Block, DomNode>,
}

impl PostDominatorTree {
    /// Allocate and compute a post-dominator tree.
    pub fn with_func(func: &FuncDefBody) -> Self {
        let mut post_dom_tree = Self::default();
        post_dom_tree.compute(func);
        post_dom_tree
    }

    /// Reset and compute the post-dominator tree of `func`.
    pub fn compute(&mut self, func: &FuncDefBody) {
        let blocks: Vec<Block> = func.cfg.rev_post_order(func.entry).collect();

        // Reverse CFG (with the virtual exit as its root), i.e. the edges
        // come from successors, and go into predecessors.
        let mut reverse_succs = EntityOrientedDenseMap::<Block, SmallVec<[Block; 4]>>::new();
        let mut exits = vec![];
        for &block in &blocks {
            let targets = &func.cfg.control_inst_on_exit_from[block].targets;
            if targets.is_empty() {
                exits.push(block);
            }
            for &target in targets {
                reverse_succs.entry(target).get_or_insert_with(SmallVec::new).push(block);
            }
        }

        // Post-order of the reverse CFG, using an explicit stack (`true` for
        // the second visit, once all successors have been pushed).
        let mut reverse_post_order = vec![];
        let mut seen = EntityOrientedDenseMap::<Block, ()>::new();
        let mut stack: Vec<(Block, bool)> = exits.iter().rev().map(|&exit| (exit, false)).collect();
        while let Some((block, successors_done)) = stack.pop() {
            if successors_done {
                reverse_post_order.push(block);
                continue;
            }
            if seen.insert(block, ()).is_some() {
                continue;
            }
            stack.push((block, true));
            for &pred in reverse_succs.get(block).into_iter().flatten().rev() {
                if !seen.contains_key(pred) {
                    stack.push((pred, false));
                }
            }
        }

        // RPO number `0` is the virtual exit, every block is offset by `1`.
        let rpo: Vec<Block> = reverse_post_order.into_iter().rev().collect();
        let mut rpo_idx = EntityOrientedDenseMap::new();
        for (i, &block) in rpo.iter().enumerate() {
            rpo_idx.insert(block, i + 1);
        }
        let mut preds = vec![SmallVec::new(); rpo.len() + 1];
        for &block in &rpo {
            let targets = &func.cfg.control_inst_on_exit_from[block].targets;
            if targets.is_empty() {
                preds[rpo_idx[block]].push(0);
            }
            for &target in targets {
                if let Some(&target_idx) = rpo_idx.get(target) {
                    preds[rpo_idx[block]].push(target_idx);
                }
            }
        }

        let idoms = compute_idoms_in_rpo(&preds);

        self.nodes.clear();
        for (i, &block) in rpo.iter().enumerate() {
            let ipdom = idoms[i + 1];
            self.nodes.insert(block, DomNode { idom: (ipdom != 0).then(|| rpo[ipdom - 1]) });
        }
    }

    /// Is `block` part of the tree (i.e. can it reach an exit of the function)?
    pub fn contains(&self, block: Block) -> bool {
        self.nodes.contains_key(block)
    }

    /// Returns the immediate post-dominator of `block`, or `None` if that's the
    /// virtual exit (or `block` isn't part of the tree).
    pub fn ipdom(&self, block: Block) -> Option<Block> {
        self.nodes.get(block)?.idom
    }

    /// Returns `true` if `a` post-dominates `b`, i.e. every control-flow path
    /// from `b` to an exit of the function must go through `a`.
    pub fn post_dominates(&self, a: Block, b: Block) -> bool {
        tree_dominates(&self.nodes, a, b)
    }
}
