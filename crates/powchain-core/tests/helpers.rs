use powchain_core::{Block, BlockCandidate, BlockView, Chain};

/// Chain at `difficulty` with one block per payload.
pub fn chain_with(difficulty: u32, payloads: &[&str]) -> Chain {
    let mut chain = Chain::new(difficulty).expect("valid difficulty");
    for data in payloads {
        chain.append(*data);
    }
    chain
}

/// Copy `chain`, let `edit` change the block views, and adopt the result
/// without re-checking it.
pub fn rebuild(chain: &Chain, edit: impl FnOnce(&mut Vec<BlockView>)) -> Chain {
    let mut views = chain.snapshot();
    edit(&mut views);
    let blocks = views.into_iter().map(Block::from_view).collect();
    Chain::from_blocks(blocks, chain.config().clone()).expect("non-empty chain")
}

/// Re-mine `view` in place after its fields were edited, restoring its
/// self-consistency at `difficulty`.
pub fn remine(view: &mut BlockView, difficulty: u32) {
    let mut candidate =
        BlockCandidate::new(view.index, view.timestamp, &*view.data, &*view.previous_hash);
    candidate.mine(difficulty);
    *view = candidate.freeze().view();
}
