//! Guard block insertion (the actual CFG rewrite performed by BOSCC).

use super::{BosccTransform, BranchSide};
use crate::cf::unstructured::{ControlInst, ControlInstKind};
use crate::vec_info::VectorShape;
use crate::{Block, Callee, InstDef, InstKind, Value};
use smallvec::smallvec;

impl BosccTransform<'_> {
    /// Insert a guard block on the `side` edge out of `branch_block`, which
    /// only enters the successor on that side if any lane needs it, and
    /// otherwise continues to the other successor.
    ///
    /// Every analysis (other than the post-dominator tree) is updated to
    /// account for the new block, which is returned.
    #[track_caller]
    pub fn speculate(&mut self, branch_block: Block, side: BranchSide) -> Block {
        let control_inst = &self.func.cfg.control_inst_on_exit_from[branch_block];
        assert_eq!(
            control_inst.kind,
            ControlInstKind::CondBranch,
            "boscc: can only speculate over conditional branches"
        );
        assert!(
            !self.vec_info.branch_shape(branch_block, &self.func.cfg).is_uniform(),
            "boscc: speculating over a uniform branch is pointless"
        );
        let target = control_inst.targets[side.target_idx()];
        let other = control_inst.targets[side.opposite().target_idx()];
        let cond = control_inst.inputs[0];
        assert_ne!(target, other, "boscc: both sides of the branch lead to {target:?}");
        assert!(
            self.dom_tree.dominates(branch_block, target),
            "boscc: can only speculate over dominated regions"
        );

        let guard_name = format!("{}_boscc", self.func.blocks[target].name);
        let guard = self.func.new_block(guard_name);
        self.dom_tree.add_new_block(guard, branch_block);
        self.dom_tree.change_immediate_dominator(target, guard);
        if let Some(target_loop) = self.loop_info.loop_for(target) {
            self.loop_info.add_block_to_loop(guard, target_loop);
        }
        if let Some(predicate) = self.vec_info.predicate(target) {
            self.vec_info.set_predicate(guard, predicate);
        }
        self.vec_info.mark_boscc_guard(guard);

        // The lanes that need `target` are those where `cond` selects `side`.
        let mask = match side {
            BranchSide::True => cond,
            BranchSide::False => {
                let neg = self.func.append_inst(
                    guard,
                    InstDef {
                        name: Some("neg".into()),
                        kind: InstKind::Not,
                        inputs: smallvec![cond],
                    },
                );
                let neg = Value::InstOutput(neg);
                let cond_shape = self.vec_info.shape(cond);
                self.vec_info.set_shape(neg, cond_shape);
                neg
            }
        };

        let any_func =
            self.plat_info.request_mask_reduction_func("rv_any", self.vec_info.vector_width());
        let boscc_test = self.func.append_inst(
            guard,
            InstDef {
                name: Some("boscc_test".into()),
                kind: InstKind::Call(Callee::Named(any_func)),
                inputs: smallvec![mask],
            },
        );
        let boscc_test = Value::InstOutput(boscc_test);
        self.vec_info.set_shape(boscc_test, VectorShape::Uniform);

        self.func
            .cfg
            .control_inst_on_exit_from
            .insert(guard, ControlInst::cond_branch(boscc_test, target, other));
        self.vec_info.set_terminator_shape(guard, VectorShape::Uniform);

        self.func.cfg.control_inst_on_exit_from[branch_block].targets[side.target_idx()] = guard;

        // `target` is now entered from `guard` (instead of `branch_block`).
        self.func.at_mut(target).for_each_phi_incoming(|incoming| {
            for (pred, _) in incoming {
                if *pred == branch_block {
                    *pred = guard;
                }
            }
        });

        // `other` gained an edge from `guard`, only taken when no lane needs
        // `target`, and so none of the lanes can observe the incoming value.
        self.func
            .at_mut(other)
            .for_each_phi_incoming(|incoming| incoming.push((guard, Value::Undef)));

        guard
    }
}
