//! BOSCC ("branch on superword condition codes") speculation.
//!
//! A divergent (i.e. non-uniform) conditional branch gets linearized by the
//! vectorizer, so both of its sides always execute, under complementary masks.
//! When one side leads into a large region that only it dominates, that region
//! is pure overhead whenever no lane takes that side, so a guard block is
//! inserted on that edge, branching (uniformly) on "any lane active", i.e.:
//!
//! ```text
//!  before:                      after:
//!    branch: br %c, target, other     branch: br %c, target_boscc, other
//!                                     target_boscc:
//!                                       %boscc_test = call rv_any(%c)
//!                                       br %boscc_test, target, other
//! ```
//!
//! (with the mask being `not %c` when speculating over the `false` side).
//!
//! The transform keeps the dominator tree, loop membership, predicates and
//! shapes up to date for every block and instruction it adds, and only
//! recomputes the post-dominator tree (once, at the very end).

use crate::cf::dom::{DominatorTree, PostDominatorTree};
use crate::cf::loops::LoopInfo;
use crate::cf::unstructured::ControlInstKind;
use crate::platform::PlatformInfo;
use crate::print::FuncPrinter;
use crate::vec_info::VectorizationInfo;
use crate::{Block, FuncDefBody};
use serde::Deserialize;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info, trace};

mod heuristic;
mod score;
mod speculate;

pub use heuristic::{BranchHeuristic, select_side};
pub use score::RegionScorer;

/// Name of the environment variable overriding [`BosccConfig::min_score`].
pub const BOSCC_LIMIT_ENV_VAR: &str = "BOSCC_LIMIT";

/// Tunables for deciding which branches are worth speculating over.
///
/// A side of a branch is only speculated over if the score of the region it
/// dominates (see [`RegionScorer::dom_region_score`]) is within
/// `min_score..=max_score` (below that, the guard isn't worth its own cost,
/// and above that, the scores are no longer meaningful).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BosccConfig {
    pub min_score: usize,
    pub max_score: usize,
}

impl Default for BosccConfig {
    fn default() -> Self {
        Self { min_score: 64, max_score: 10_000_000 }
    }
}

impl BosccConfig {
    /// Default configuration, with `min_score` taken from the `BOSCC_LIMIT`
    /// environment variable (if it's set, see [`BosccConfig::with_limit_override`]).
    pub fn from_env() -> Self {
        Self::default().with_limit_override(std::env::var(BOSCC_LIMIT_ENV_VAR).ok().as_deref())
    }

    /// Replace `min_score` with `limit`, parsed as an integer, ignoring it
    /// entirely if it's missing or doesn't parse.
    ///
    /// A negative `limit` disables speculation (by making `min_score` larger
    /// than any score, as if it had wrapped around to an unsigned integer).
    pub fn with_limit_override(self, limit: Option<&str>) -> Self {
        match limit.and_then(|limit| limit.trim().parse::<i64>().ok()) {
            Some(limit) => {
                Self { min_score: usize::try_from(limit).unwrap_or(usize::MAX), ..self }
            }
            None => self,
        }
    }

    /// Parse a JSON object, with any missing fields taking their default values.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn score_in_window(&self, score: usize) -> bool {
        (self.min_score..=self.max_score).contains(&score)
    }
}

/// Which successor of a conditional branch to speculate over.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BranchSide {
    True,
    False,
}

impl BranchSide {
    /// Index of this side in the `targets` of a [`ControlInstKind::CondBranch`].
    pub fn target_idx(self) -> usize {
        match self {
            BranchSide::True => 0,
            BranchSide::False => 1,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            BranchSide::True => BranchSide::False,
            BranchSide::False => BranchSide::True,
        }
    }
}

/// Outcome of [`BranchHeuristic::decide`] for a single branch.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BosccDecision {
    DontSpeculate,
    SpeculateTrueSide { score: usize },
    SpeculateFalseSide { score: usize },
}

impl BosccDecision {
    pub fn side_and_score(self) -> Option<(BranchSide, usize)> {
        match self {
            BosccDecision::DontSpeculate => None,
            BosccDecision::SpeculateTrueSide { score } => Some((BranchSide::True, score)),
            BosccDecision::SpeculateFalseSide { score } => Some((BranchSide::False, score)),
        }
    }
}

/// Record of one speculation performed by [`BosccTransform::run`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SpeculatedBranch {
    /// The block ending in the speculated-over branch.
    pub block: Block,
    pub block_name: Rc<str>,

    /// The successor which is now only entered through `guard`.
    pub target: Block,
    pub target_name: Rc<str>,

    pub guard: Block,

    /// Score of the region dominated by `target`.
    pub score: usize,
}

impl fmt::Display for SpeculatedBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "boscc: skip succ {} of block {}  score: {}",
            self.target_name, self.block_name, self.score
        )
    }
}

/// The BOSCC pass, borrowing the function and all the analyses it needs to
/// consult and keep up to date.
pub struct BosccTransform<'a> {
    func: &'a mut FuncDefBody,
    vec_info: &'a mut VectorizationInfo,
    plat_info: &'a mut PlatformInfo,
    dom_tree: &'a mut DominatorTree,
    post_dom_tree: &'a mut PostDominatorTree,
    loop_info: &'a mut LoopInfo,

    config: BosccConfig,
    report: Vec<SpeculatedBranch>,
}

impl<'a> BosccTransform<'a> {
    /// Prepare the pass, with its configuration taken from the environment
    /// (see [`BosccConfig::from_env`]).
    pub fn new(
        func: &'a mut FuncDefBody,
        vec_info: &'a mut VectorizationInfo,
        plat_info: &'a mut PlatformInfo,
        dom_tree: &'a mut DominatorTree,
        post_dom_tree: &'a mut PostDominatorTree,
        loop_info: &'a mut LoopInfo,
    ) -> Self {
        Self {
            func,
            vec_info,
            plat_info,
            dom_tree,
            post_dom_tree,
            loop_info,
            config: BosccConfig::from_env(),
            report: vec![],
        }
    }

    pub fn with_config(self, config: BosccConfig) -> Self {
        Self { config, ..self }
    }

    pub fn config(&self) -> &BosccConfig {
        &self.config
    }

    /// All the speculations performed so far.
    pub fn report(&self) -> &[SpeculatedBranch] {
        &self.report
    }

    pub fn scorer(&self) -> RegionScorer<'_> {
        RegionScorer {
            func: &*self.func,
            vec_info: &*self.vec_info,
            plat_info: &*self.plat_info,
            dom_tree: &*self.dom_tree,
        }
    }

    pub fn heuristic(&self) -> BranchHeuristic<'_> {
        BranchHeuristic {
            scorer: self.scorer(),
            loop_info: &*self.loop_info,
            config: &self.config,
        }
    }

    /// Decide whether (and over which side) to speculate the branch ending `block`.
    pub fn decide(&self, block: Block) -> BosccDecision {
        self.heuristic().decide(block)
    }

    /// Speculate over every profitable divergent branch in the vectorized region.
    ///
    /// Always returns `false`, as no other pass needs to rerun afterwards.
    pub fn run(&mut self) -> bool {
        self.dom_tree.compute(self.func);

        // NOTE(eddyb) collected ahead of time, so that guard blocks (which
        // branch uniformly anyway) are never considered.
        let rpo: Vec<Block> = self.func.cfg.rev_post_order(self.func.entry).collect();

        let mut num_speculated = 0;
        for block in rpo {
            if !self.vec_info.in_region(block, self.loop_info) {
                continue;
            }
            let control_inst = &self.func.cfg.control_inst_on_exit_from[block];
            if control_inst.kind != ControlInstKind::CondBranch
                || self.vec_info.branch_shape(block, &self.func.cfg).is_uniform()
            {
                continue;
            }

            let decision = self.decide(block);
            debug!(
                block = %self.func.blocks[block].name,
                ?decision,
                "boscc: considered divergent branch"
            );
            let Some((side, score)) = decision.side_and_score() else {
                continue;
            };

            let target = self.func.cfg.control_inst_on_exit_from[block].targets[side.target_idx()];
            let guard = self.speculate(block, side);
            num_speculated += 1;

            let record = SpeculatedBranch {
                block,
                block_name: self.func.blocks[block].name.clone(),
                target,
                target_name: self.func.blocks[target].name.clone(),
                guard,
                score,
            };
            info!("{record}");
            self.report.push(record);
        }

        if num_speculated > 0 {
            info!("boscc: inserted {num_speculated} BOSCC branches");
            trace!(
                "boscc: after transform:\n{}",
                FuncPrinter::new(self.func).with_vec_info(self.vec_info)
            );
        }

        self.post_dom_tree.compute(self.func);

        if let Err(e) = self.dom_tree.verify(self.func) {
            panic!("boscc: dominator tree out of sync after transform: {e}");
        }
        #[cfg(debug_assertions)]
        if let Err(e) = crate::cf::verify::verify_func(self.func) {
            panic!("boscc: malformed function after transform: {e}");
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_override() {
        let config = BosccConfig::default();
        assert_eq!(config.with_limit_override(None), config);
        assert_eq!(config.with_limit_override(Some("12")).min_score, 12);
        assert_eq!(config.with_limit_override(Some(" 7\n")).min_score, 7);
        assert_eq!(config.with_limit_override(Some("lots")), config);
        assert_eq!(config.with_limit_override(Some("")), config);
    }

    #[test]
    fn negative_limit_disables_speculation() {
        let config = BosccConfig::default().with_limit_override(Some("-3"));
        assert_eq!(config.min_score, usize::MAX);
        assert!(!config.score_in_window(0));
        assert!(!config.score_in_window(config.max_score));
    }

    #[test]
    fn config_from_json() {
        let config = BosccConfig::from_json(r#"{ "min_score": 10 }"#).unwrap();
        assert_eq!(config, BosccConfig { min_score: 10, max_score: 10_000_000 });
        assert_eq!(BosccConfig::from_json("{}").unwrap(), BosccConfig::default());
        assert!(BosccConfig::from_json(r#"{ "min_score": "ten" }"#).is_err());
        assert!(BosccConfig::from_json(r#"{ "min": 10 }"#).is_err());
    }

    #[test]
    fn window_is_inclusive() {
        let config = BosccConfig { min_score: 4, max_score: 8 };
        assert!(!config.score_in_window(3));
        assert!(config.score_in_window(4));
        assert!(config.score_in_window(8));
        assert!(!config.score_in_window(9));
    }

    #[test]
    fn report_line() {
        let record = SpeculatedBranch {
            block: Block::from(0),
            block_name: "entry".into(),
            target: Block::from(1),
            target_name: "a".into(),
            guard: Block::from(4),
            score: 70,
        };
        assert_eq!(record.to_string(), "boscc: skip succ a of block entry  score: 70");
    }
}
