//! Legality checks and profitability heuristic for BOSCC speculation.

use super::{BosccConfig, BosccDecision, RegionScorer};
use crate::Block;
use crate::cf::loops::LoopInfo;
use crate::cf::unstructured::{ControlInstKind, IncomingEdgeCount};

/// Decides which (if any) side of a divergent branch to speculate over.
#[derive(Copy, Clone)]
pub struct BranchHeuristic<'a> {
    pub scorer: RegionScorer<'a>,
    pub loop_info: &'a LoopInfo,
    pub config: &'a BosccConfig,
}

impl BranchHeuristic<'_> {
    /// Can the edge from `branch_block` to its successor `succ` get a guard?
    ///
    /// This requires `succ` to be entered only from `branch_block` (which then
    /// dominates it), and to not be a loop header or latch (for the branch's
    /// loop, which must also be the innermost loop of `succ`, i.e. loop exits
    /// and entries are never speculated over).
    pub fn is_legal_side(&self, branch_block: Block, succ: Block) -> bool {
        let func = self.scorer.func;

        let branch_loop = self.loop_info.loop_for(branch_block);
        if self.loop_info.loop_for(succ) != branch_loop {
            return false;
        }
        if let Some(lp) = branch_loop {
            if self.loop_info.header(lp) == succ
                || self.loop_info.latch(lp, &func.cfg) == Some(succ)
            {
                return false;
            }
        }

        if func.cfg.incoming_edge_count(succ) != IncomingEdgeCount::ONE {
            return false;
        }

        // Already guarded (e.g. by a previous run of the pass).
        !self.scorer.vec_info.is_boscc_guard(succ)
    }

    /// Decide whether (and over which side) to speculate the conditional
    /// branch terminating `branch_block`.
    pub fn decide(&self, branch_block: Block) -> BosccDecision {
        let func = self.scorer.func;
        let control_inst = &func.cfg.control_inst_on_exit_from[branch_block];
        if control_inst.kind != ControlInstKind::CondBranch {
            return BosccDecision::DontSpeculate;
        }
        let (on_true, on_false) = (control_inst.targets[0], control_inst.targets[1]);

        let vec_info = self.scorer.vec_info;
        if !vec_info.in_region(on_true, self.loop_info)
            || !vec_info.in_region(on_false, self.loop_info)
        {
            return BosccDecision::DontSpeculate;
        }

        // Branches entering or exiting a loop are never speculated, even over
        // the side that stays in the loop of `branch_block`.
        let branch_loop = self.loop_info.loop_for(branch_block);
        if self.loop_info.loop_for(on_true) != branch_loop
            || self.loop_info.loop_for(on_false) != branch_loop
        {
            return BosccDecision::DontSpeculate;
        }

        let side_score = |succ| {
            self.is_legal_side(branch_block, succ).then(|| self.scorer.dom_region_score(succ))
        };
        select_side(side_score(on_true), side_score(on_false), self.config)
    }
}

/// Pick the side to speculate over, given the scores of the regions dominated
/// by each side (`None` for sides that can't legally be speculated over).
///
/// A side is only picked if its score is within the configured window, and
/// strictly greater than that of the other side (with illegal sides scoring
/// `0`), and the `true` side is preferred, i.e. ties are never speculated.
pub fn select_side(
    true_score: Option<usize>,
    false_score: Option<usize>,
    config: &BosccConfig,
) -> BosccDecision {
    let beats = |score: Option<usize>, other_score: Option<usize>| {
        score.filter(|&score| config.score_in_window(score) && score > other_score.unwrap_or(0))
    };

    if let Some(score) = beats(true_score, false_score) {
        BosccDecision::SpeculateTrueSide { score }
    } else if let Some(score) = beats(false_score, true_score) {
        BosccDecision::SpeculateFalseSide { score }
    } else {
        BosccDecision::DontSpeculate
    }
}
