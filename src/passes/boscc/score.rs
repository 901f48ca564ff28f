//! Cost model for the regions BOSCC might skip over.

use crate::cf::dom::DominatorTree;
use crate::platform::PlatformInfo;
use crate::vec_info::{VectorShape, VectorizationInfo};
use crate::{Block, Callee, FuncDefBody, Inst, InstKind, mem};
use rustc_hash::FxHashSet;

/// Estimates the cost of executing (vectorized) blocks, in abstract units,
/// with most instructions costing `1`, and memory accesses or calls which
/// can't be done with a single vector instruction costing more.
#[derive(Copy, Clone)]
pub struct RegionScorer<'a> {
    pub func: &'a FuncDefBody,
    pub vec_info: &'a VectorizationInfo,
    pub plat_info: &'a PlatformInfo,
    pub dom_tree: &'a DominatorTree,
}

impl RegionScorer<'_> {
    pub fn inst_score(&self, inst: Inst) -> usize {
        let inst_def = self.func.at(inst).def();
        match &inst_def.kind {
            // Gathers/scatters cost roughly one scalar access per lane.
            InstKind::Mem(mem::MemOp::Load | mem::MemOp::Store) => {
                match self.vec_info.shape(inst_def.inputs[mem::MemOp::PTR_INPUT_IDX]) {
                    VectorShape::Varying => 8,
                    VectorShape::Uniform => 1,
                    VectorShape::Strided { .. } => 2,
                }
            }

            InstKind::Call(Callee::Indirect) => 8,
            InstKind::Call(Callee::Named(name)) => {
                let vector_width = self.vec_info.vector_width();
                if self.plat_info.is_function_vectorizable(name, vector_width) { 1 } else { 1 + 2 }
            }

            InstKind::Phi { .. } | InstKind::Not | InstKind::Op(_) => 1,
        }
    }

    /// Score of all the instructions in `block`, plus its terminator (which
    /// counts as any other plain instruction).
    pub fn block_score(&self, block: Block) -> usize {
        let terminator_score = 1;
        self.func.at(block).at_insts().map(|inst| self.inst_score(inst.position)).sum::<usize>()
            + terminator_score
    }

    /// Total score of the region dominated by `entry` (i.e. all the blocks
    /// reachable from `entry`, without leaving its dominator subtree).
    pub fn dom_region_score(&self, entry: Block) -> usize {
        let mut seen = FxHashSet::default();
        let mut stack = vec![entry];
        let mut score = 0;
        while let Some(block) = stack.pop() {
            if block != entry && !self.dom_tree.dominates(entry, block) {
                continue;
            }
            if !seen.insert(block) {
                continue;
            }
            score += self.block_score(block);

            stack.extend(
                self.func.cfg.control_inst_on_exit_from[block].targets.iter().rev().copied(),
            );
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use crate::builder::FuncBuilder;
    use crate::vec_info::VectorRegion;
    use proptest::prelude::*;

    fn scorer_for<'a>(
        func: &'a FuncDefBody,
        vec_info: &'a VectorizationInfo,
        plat_info: &'a PlatformInfo,
        dom_tree: &'a DominatorTree,
    ) -> RegionScorer<'a> {
        RegionScorer { func, vec_info, plat_info, dom_tree }
    }

    #[derive(Copy, Clone, Debug)]
    enum TestInst {
        Load(VectorShape),
        Store(VectorShape),
        IndirectCall,
        MappedCall,
        UnmappedCall,
        Not,
        Op,
    }

    impl TestInst {
        fn expected_score(self) -> usize {
            match self {
                TestInst::Load(shape) | TestInst::Store(shape) => match shape {
                    VectorShape::Varying => 8,
                    VectorShape::Uniform => 1,
                    VectorShape::Strided { .. } => 2,
                },
                TestInst::IndirectCall => 8,
                TestInst::UnmappedCall => 3,
                TestInst::MappedCall | TestInst::Not | TestInst::Op => 1,
            }
        }
    }

    fn any_shape() -> impl Strategy<Value = VectorShape> {
        prop_oneof![
            Just(VectorShape::Uniform),
            Just(VectorShape::Varying),
            (-16i64..16).prop_map(|stride| VectorShape::Strided { stride }),
        ]
    }

    fn any_inst() -> impl Strategy<Value = TestInst> {
        prop_oneof![
            any_shape().prop_map(TestInst::Load),
            any_shape().prop_map(TestInst::Store),
            Just(TestInst::IndirectCall),
            Just(TestInst::MappedCall),
            Just(TestInst::UnmappedCall),
            Just(TestInst::Not),
            Just(TestInst::Op),
        ]
    }

    proptest! {
        #[test]
        fn block_score_is_additive(insts in prop::collection::vec(any_inst(), 0..32)) {
            let mut b = FuncBuilder::new("entry");
            let entry = b.entry();
            let mut shapes = vec![];
            for (i, &inst) in insts.iter().enumerate() {
                let ptr = Value::FuncParam(i as u32);
                match inst {
                    TestInst::Load(shape) => {
                        b.load(entry, "v", ptr);
                        shapes.push((ptr, shape));
                    }
                    TestInst::Store(shape) => {
                        b.store(entry, ptr, Value::Const(0));
                        shapes.push((ptr, shape));
                    }
                    TestInst::IndirectCall => {
                        b.call_indirect(entry, "r", ptr, []);
                    }
                    TestInst::MappedCall => {
                        b.call(entry, "r", "sqrtf", [ptr]);
                    }
                    TestInst::UnmappedCall => {
                        b.call(entry, "r", "printf", [ptr]);
                    }
                    TestInst::Not => {
                        b.not(entry, "n", ptr);
                    }
                    TestInst::Op => {
                        b.op(entry, "x", "add", [ptr, Value::Const(1)]);
                    }
                }
            }
            b.ret(entry, None);
            let func = b.finish();

            let mut vec_info = VectorizationInfo::new(VectorRegion::WholeFunction, 8);
            for (ptr, shape) in shapes {
                vec_info.set_shape(ptr, shape);
            }
            let mut plat_info = PlatformInfo::new();
            plat_info.add_vector_mapping("sqrtf", "sqrtf_v8", 8);
            let dom_tree = DominatorTree::with_func(&func);
            let scorer = scorer_for(&func, &vec_info, &plat_info, &dom_tree);

            let expected: usize = insts.iter().map(|inst| inst.expected_score()).sum::<usize>() + 1;
            prop_assert_eq!(scorer.block_score(entry), expected);
            prop_assert_eq!(scorer.dom_region_score(entry), expected);
        }
    }

    #[test]
    fn diamond_blocks_are_counted_once() {
        // entry -> {left, right} -> merge, each with 2 instructions (plus terminator).
        let mut b = FuncBuilder::new("entry");
        let entry = b.entry();
        let left = b.block("left");
        let right = b.block("right");
        let merge = b.block("merge");
        for block in [entry, left, right, merge] {
            b.filler(block, 2);
        }
        b.cond_branch(entry, Value::FuncParam(0), left, right);
        b.branch(left, merge);
        b.branch(right, merge);
        b.ret(merge, None);
        let func = b.finish();

        let vec_info = VectorizationInfo::new(VectorRegion::WholeFunction, 4);
        let plat_info = PlatformInfo::new();
        let dom_tree = DominatorTree::with_func(&func);
        let scorer = scorer_for(&func, &vec_info, &plat_info, &dom_tree);

        assert_eq!(scorer.block_score(merge), 3);
        assert_eq!(scorer.dom_region_score(entry), 4 * 3);

        // `merge` isn't dominated by `left`, so it's not part of its region.
        assert_eq!(scorer.dom_region_score(left), 3);
    }

    #[test]
    fn loops_are_counted_once() {
        // entry -> header <-> body, header -> exit
        let mut b = FuncBuilder::new("entry");
        let entry = b.entry();
        let header = b.block("header");
        let body = b.block("body");
        let exit = b.block("exit");
        b.filler(body, 9);
        b.branch(entry, header);
        b.cond_branch(header, Value::FuncParam(0), body, exit);
        b.branch(body, header);
        b.ret(exit, None);
        let func = b.finish();

        let vec_info = VectorizationInfo::new(VectorRegion::WholeFunction, 4);
        let plat_info = PlatformInfo::new();
        let dom_tree = DominatorTree::with_func(&func);
        let scorer = scorer_for(&func, &vec_info, &plat_info, &dom_tree);

        assert_eq!(scorer.dom_region_score(header), 1 + 10 + 1);
        assert_eq!(scorer.dom_region_score(body), 10);
    }
}
