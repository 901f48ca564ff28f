//! Structural verification of functions and of their (patched) analyses.

use crate::cf::unstructured::ControlInstKind;
use crate::{Block, FuncDefBody, Inst, InstKind};
use itertools::Itertools;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("{0:?} has no terminator")]
    MissingTerminator(Block),

    #[error("terminator of {block:?} ({kind:?}) has {inputs} inputs and {targets} targets")]
    MalformedTerminator { block: Block, kind: ControlInstKind, inputs: usize, targets: usize },

    #[error("phi {inst:?} in {block:?} follows a non-phi instruction")]
    PhiAfterNonPhi { block: Block, inst: Inst },

    #[error(
        "phi {inst:?} in {block:?} records incoming edges from {recorded:?}, \
         but the actual predecessors are {actual:?}"
    )]
    PhiIncomingMismatch { block: Block, inst: Inst, recorded: Vec<Block>, actual: Vec<Block> },

    #[error("dominator tree root is {found:?}, expected {expected:?}")]
    DomTreeRootMismatch { expected: Option<Block>, found: Option<Block> },

    #[error("dominator tree is missing reachable {0:?}")]
    DomTreeMissingBlock(Block),

    #[error("dominator tree contains unreachable {0:?}")]
    DomTreeUnreachableBlock(Block),

    #[error("dominator tree has {found:?} as the idom of {block:?}, expected {expected:?}")]
    DomTreeIdomMismatch { block: Block, expected: Option<Block>, found: Option<Block> },
}

/// Check that every block of `func` has a well-formed terminator, and that
/// every phi records exactly one incoming value per incoming CFG edge.
pub fn verify_func(func: &FuncDefBody) -> Result<(), VerifyError> {
    for block in func.blocks.keys() {
        let control_inst = func
            .cfg
            .control_inst_on_exit_from
            .get(block)
            .ok_or(VerifyError::MissingTerminator(block))?;

        let (expected_inputs, expected_targets) = match control_inst.kind {
            ControlInstKind::Unreachable => (0..=0, 0),
            ControlInstKind::Return => (0..=1, 0),
            ControlInstKind::Branch => (0..=0, 1),
            ControlInstKind::CondBranch => (1..=1, 2),
        };
        if !expected_inputs.contains(&control_inst.inputs.len())
            || control_inst.targets.len() != expected_targets
        {
            return Err(VerifyError::MalformedTerminator {
                block,
                kind: control_inst.kind,
                inputs: control_inst.inputs.len(),
                targets: control_inst.targets.len(),
            });
        }
    }

    for block in func.blocks.keys() {
        let mut seen_non_phi = false;
        let mut actual_preds = None;
        for &inst in &func.blocks[block].insts {
            let InstKind::Phi { incoming } = &func.insts[inst].kind else {
                seen_non_phi = true;
                continue;
            };
            if seen_non_phi {
                return Err(VerifyError::PhiAfterNonPhi { block, inst });
            }

            let actual: &Vec<Block> = actual_preds
                .get_or_insert_with(|| func.cfg.preds(block).sorted().collect::<Vec<_>>());
            let recorded: Vec<Block> = incoming.iter().map(|&(pred, _)| pred).sorted().collect();
            if recorded != *actual {
                return Err(VerifyError::PhiIncomingMismatch {
                    block,
                    inst,
                    recorded,
                    actual: actual.clone(),
                });
            }
        }
    }

    Ok(())
}
