//! Uncle validation for proof-of-work blocks.
//!
//! An uncle is a stale header whose parent is one of the block's last
//! `generations` ancestors. It must not itself be an ancestor, must not have
//! been included before within that window and must not be a sibling of the
//! block (sharing the block's own parent).

use std::collections::{HashMap, HashSet};

use forge_core::error::ConsensusError;
use forge_core::traits::ChainReader;
use forge_core::types::{Block, Hash256, Header};

use crate::validator::{HeaderValidator, SealRules};

/// Check every uncle of `block`, running full header validation on each
/// against its ancestor parent.
pub fn verify_uncles<R, C>(
    validator: &HeaderValidator<R>,
    chain: &C,
    block: &Block,
) -> Result<(), ConsensusError>
where
    R: SealRules,
    C: ChainReader + ?Sized,
{
    let config = chain.config();
    let max = config.uncles.max_uncles;
    if block.uncles.len() > max {
        return Err(ConsensusError::TooManyUncles {
            count: block.uncles.len(),
            max,
        });
    }
    if block.uncles.is_empty() {
        return Ok(());
    }

    let (mut ancestors, mut included) = gather_ancestors(chain, block, config.uncles.generations)?;
    let block_hash = block.hash();
    ancestors.insert(block_hash, block.header.clone());
    included.insert(block_hash);

    for uncle in &block.uncles {
        let hash = uncle.hash();
        if !included.insert(hash) {
            return Err(ConsensusError::DuplicateUncle(hash));
        }
        if ancestors.contains_key(&hash) {
            return Err(ConsensusError::UncleIsAncestor(hash));
        }
        let parent = match ancestors.get(&uncle.parent_hash) {
            Some(parent) if uncle.parent_hash != block.header.parent_hash => parent,
            _ => return Err(ConsensusError::UncleTooOld(hash)),
        };
        validator.verify_with_parent(config, uncle, parent, true, true)?;
    }
    Ok(())
}

/// Walk back up to `generations` ancestors of `block`, collecting their
/// headers and the hashes of every uncle they included.
fn gather_ancestors<C>(
    chain: &C,
    block: &Block,
    generations: u64,
) -> Result<(HashMap<Hash256, Header>, HashSet<Hash256>), ConsensusError>
where
    C: ChainReader + ?Sized,
{
    let mut ancestors = HashMap::new();
    let mut included = HashSet::new();

    let Some(mut number) = block.number().checked_sub(1) else {
        return Ok((ancestors, included));
    };
    let mut hash = block.header.parent_hash;

    for _ in 0..generations {
        let Some(ancestor) = chain.get_header(&hash, number)? else {
            break;
        };
        if ancestor.has_uncles() {
            let Some(ancestor_block) = chain.get_block(&hash, number)? else {
                break;
            };
            included.extend(ancestor_block.uncles.iter().map(Header::hash));
        }
        let parent_hash = ancestor.parent_hash;
        ancestors.insert(hash, ancestor);
        match number.checked_sub(1) {
            Some(n) => number = n,
            None => break,
        }
        hash = parent_hash;
    }
    Ok((ancestors, included))
}
