//! Dynamic id claims.
//!
//! A dynamic claim gets the lowest free id of its target: the root space, or
//! the Range Table its selector resolves to. Once assigned the id is sticky;
//! re-applying the claim keeps it.

use chrono::Utc;
use log::{debug, warn};

use super::{entries_by_owner, release_entries, release_owned, resolve_selector, Applicator};
use crate::cache::{CacheContext, Target};
use crate::claim::{Claim, ClaimType};
use crate::error::{Error, Result};
use crate::index::IdSpan;

#[derive(Debug)]
struct DynamicPlan {
    /// Known id: the reclaimed one or a free status hint. `None` takes the
    /// lowest free id of `within` at apply time.
    id: Option<u64>,
    target: Target,
    within: IdSpan,
    reclaim: bool,
    stale: Vec<(u64, Target)>,
}

#[derive(Debug, Default)]
pub struct DynamicApplicator {
    plan: Option<DynamicPlan>,
}

impl DynamicApplicator {
    fn reclaim(ctx: &CacheContext, claim: &Claim) -> Option<DynamicPlan> {
        let owned = entries_by_owner(ctx, claim);
        let single = |id: &u64, target: &Target| {
            ctx.table(target)
                .ok()
                .and_then(|table| table.get(*id))
                .is_some_and(|entry| entry.span().is_single())
        };

        // keep the id in status if the claim still owns it, else the lowest
        let keep = claim
            .status
            .id
            .filter(|id| owned.get(id).is_some_and(|target| single(id, target)))
            .or_else(|| {
                owned
                    .iter()
                    .find(|(id, target)| single(id, target))
                    .map(|(id, _)| *id)
            })?;

        let target = owned.get(&keep)?.clone();
        let within = ctx.table(&target).ok()?.bounds();
        let stale: Vec<(u64, Target)> = owned.into_iter().filter(|(id, _)| *id != keep).collect();
        if !stale.is_empty() {
            // a claim should never hold more than one entry outside of a transient state
            warn!(
                "Dynamic claim {} owns {} entries besides id {}, releasing them",
                claim.key(),
                stale.len(),
                keep
            );
        }
        Some(DynamicPlan {
            id: Some(keep),
            target,
            within,
            reclaim: true,
            stale,
        })
    }
}

impl Applicator for DynamicApplicator {
    fn validate(&mut self, ctx: &CacheContext, claim: &Claim) -> Result<()> {
        if let Some(plan) = Self::reclaim(ctx, claim) {
            self.plan = Some(plan);
            return Ok(());
        }

        let target = match &claim.spec.selector {
            Some(selector) => resolve_selector(ctx, claim, selector)?,
            None => Target::Root,
        };
        let table = ctx.table(&target)?;
        let within = match target {
            Target::Root => ctx.index().assignable()?,
            Target::Range(_) => table.bounds(),
        };

        // an id recorded in status (e.g. while restoring) wins if still free
        let id = claim
            .status
            .id
            .filter(|id| within.contains(*id) && table.is_free(IdSpan::single(*id)));
        if id.is_none() && table.first_free(within).is_none() {
            return Err(Error::Exhausted(target.to_string()));
        }

        // reclaim() found no usable entry, so anything owned is stale
        let stale = entries_by_owner(ctx, claim).into_iter().collect();
        self.plan = Some(DynamicPlan {
            id,
            target,
            within,
            reclaim: false,
            stale,
        });
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
        let labels = claim.entry_labels(ClaimType::DynamicId);
        let table = ctx.table_mut(&plan.target)?;
        let id = match plan.id {
            Some(id) if plan.reclaim => {
                table.update(id, labels)?;
                id
            }
            Some(id) => {
                table.claim(IdSpan::single(id), labels)?;
                id
            }
            None => table.claim_free(plan.within, labels)?,
        };
        debug!(
            "Dynamic claim {} holds id {} in {}",
            claim.key(),
            id,
            plan.target
        );

        claim.status.id = Some(id);
        claim.status.range = None;
        claim.stamp_expiry(Utc::now());
        Ok(())
    }

    fn delete(&mut self, ctx: &mut CacheContext, claim: &Claim) -> Result<()> {
        release_owned(ctx, claim)?;
        Ok(())
    }
}
