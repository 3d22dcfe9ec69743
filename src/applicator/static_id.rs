//! Static id claims.
//!
//! The requested id lands in the root space unless a committed range covers
//! it, in which case it is allocated inside that range's table.

use chrono::Utc;
use log::debug;

use super::{check_index_bounds, entries_by_owner, release_entries, release_owned, Applicator};
use crate::cache::{CacheContext, Target};
use crate::claim::{Claim, ClaimType};
use crate::error::{Error, Result};
use crate::index::IdSpan;

#[derive(Debug)]
struct StaticPlan {
    id: u64,
    target: Target,
    reclaim: bool,
    stale: Vec<(u64, Target)>,
}

#[derive(Debug, Default)]
pub struct StaticApplicator {
    plan: Option<StaticPlan>,
}

/// Table a static id belongs in, from the root entries that contain it
fn target_for(ctx: &CacheContext, claim: &Claim, id: u64) -> Result<Target> {
    let parents: Vec<_> = ctx
        .space()
        .parents(IdSpan::single(id))
        .into_iter()
        .filter(|entry| !entry.is_owned_by(claim))
        .collect();

    let target = match parents.as_slice() {
        [] => Target::Root,
        [parent] if parent.is_range() => Target::Range(parent.claim_key()),
        [parent] => {
            return Err(Error::AlreadyAllocated {
                id,
                owner: parent.claim_key(),
            })
        }
        _ => return Err(Error::MultipleParents(id)),
    };

    if let Target::Range(_) = target {
        if let Some(existing) = ctx.table(&target)?.get(id) {
            return Err(Error::AlreadyAllocated {
                id,
                owner: existing.claim_key(),
            });
        }
    }
    Ok(target)
}

impl Applicator for StaticApplicator {
    fn validate(&mut self, ctx: &CacheContext, claim: &Claim) -> Result<()> {
        let id = claim
            .spec
            .id
            .ok_or_else(|| Error::MissingStaticId { claim: claim.key() })?;
        check_index_bounds(ctx, claim, IdSpan::single(id))?;

        let mut owned = entries_by_owner(ctx, claim);
        let reclaimed = owned.get(&id).cloned().filter(|target| {
            ctx.table(target)
                .ok()
                .and_then(|table| table.get(id))
                .is_some_and(|entry| entry.span().is_single())
        });

        let plan = match reclaimed {
            Some(target) => {
                owned.remove(&id);
                StaticPlan {
                    id,
                    target,
                    reclaim: true,
                    stale: owned.into_iter().collect(),
                }
            }
            None => StaticPlan {
                id,
                target: target_for(ctx, claim, id)?,
                reclaim: false,
                stale: owned.into_iter().collect(),
            },
        };
        self.plan = Some(plan);
        Ok(())
    }

    fn apply(&mut self, ctx: &mut CacheContext, claim: &mut Claim) -> Result<()> {
        if self.plan.is_none() {
            self.validate(ctx, claim)?;
        }
        let Some(plan) = self.plan.take() else {
            return Ok(());
        };

        release_entries(ctx, &plan.stale)?;
        let labels = claim.entry_labels(ClaimType::StaticId);
        let table = ctx.table_mut(&plan.target)?;
        if plan.reclaim {
            table.update(plan.id, labels)?;
        } else {
            table.claim(IdSpan::single(plan.id), labels)?;
        }
        debug!(
            "Static claim {} holds id {} in {}",
            claim.key(),
            plan.id,
            plan.target
        );

        claim.status.id = Some(plan.id);
        claim.status.range = None;
        claim.stamp_expiry(Utc::now());
        Ok(())
    }

    fn delete(&mut self, ctx: &mut CacheContext, claim: &Claim) -> Result<()> {
        release_owned(ctx, claim)?;
        Ok(())
    }
}
