//! Size claims: a block of `size` contiguous ids placed first-fit in the
//! assignable part of the index. Once placed the block behaves like a range.

use super::range::{self, RangePlan};
use super::Applicator;
use crate::cache::{CacheContext, Target};
use crate::claim::{Claim, ClaimType};
use crate::error::{Error, Result};
use crate::index::IdSpan;

#[derive(Debug)]
pub struct SizeApplicator {
    size: u64,
    plan: Option<RangePlan>,
}

impl SizeApplicator {
    pub fn new(size: u64) -> Self {
        Self { size, plan: None }
    }

    /// A root marker this claim already owns with the right size
    fn owned_block(&self, ctx: &CacheContext, claim: &Claim) -> Option<IdSpan> {
        ctx.space()
            .entries()
            .find(|entry| {
                entry.is_owned_by(claim) && entry.is_range() && entry.span().len() == self.size
            })
            .map(|entry| entry.span())
    }

    /// The range recorded in status, if it still fits and is free
    fn hinted_block(&self, ctx: &CacheContext, claim: &Claim, within: IdSpan) -> Option<IdSpan> {
        let span = claim.status.range.as_deref()?.parse::<IdSpan>().ok()?;
        let free = ctx
            .space()
            .overlapping(span)
            .iter()
            .all(|entry| entry.is_owned_by(claim));
        (span.len() == self.size && within.contains_span(&span) && free).then_some(span)
    }
}

impl Applicator for SizeApplicator {
    fn validate(&mut self, ctx: &CacheContext, claim: &Claim) -> Result<()> {
        if let Some(span) = self.owned_block(ctx, claim) {
            self.plan = Some(RangePlan::new(ctx, claim, span));
            return Ok(());
        }

        let within = ctx.index().assignable()?;
        let span = match self.hinted_block(ctx, claim, within) {
            Some(span) => span,
            None => ctx
                .space()
                .find_free_block(within, self.size, |entry| entry.is_owned_by(claim))
                .ok_or_else(|| Error::NoFreeBlock {
                    table: Target::Root.to_string(),
                    size: self.size,
                })?,
        };
        self.plan = Some(RangePlan::new(ctx, claim, span));
        Ok(())
    }

    fn apply(&mut self, ctx: &mut CacheContext, claim: &mut Claim) -> Result<()> {
        if self.plan.is_none() {
            self.validate(ctx, claim)?;
        }
        match self.plan.take() {
            Some(plan) => range::commit(ctx, claim, plan, ClaimType::Size),
            None => Ok(()),
        }
    }

    fn delete(&mut self, ctx: &mut CacheContext, claim: &Claim) -> Result<()> {
        range::delete(ctx, claim)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{apply_claim, release_claim};
    use super::*;
    use crate::index::IdKind;

    #[test]
    fn test_first_fit_placement() {
        let mut ctx = context(IdKind::Vlan);
        apply_claim(&mut ctx, &mut claim("s").with_id(5)).unwrap();

        let mut a = claim("a").with_size(4);
        apply_claim(&mut ctx, &mut a).unwrap();
        // VLAN 0 is not assignable, 5 is taken
        assert_eq!(a.status.range.as_deref(), Some("1-4"));

        let mut b = claim("b").with_size(4);
        apply_claim(&mut ctx, &mut b).unwrap();
        assert_eq!(b.status.range.as_deref(), Some("6-9"));
        assert!(ctx.range("default/b").is_some());
        assert_eq!(ctx.space().get(7).unwrap().claim_type(), ClaimType::Size);
    }

    #[test]
    fn test_reapply_is_stable() {
        let mut ctx = context(IdKind::Vlan);
        let mut a = claim("a").with_size(10);
        apply_claim(&mut ctx, &mut a).unwrap();
        let first = a.status.range.clone();

        let mut again = claim("a").with_size(10);
        apply_claim(&mut ctx, &mut again).unwrap();
        assert_eq!(again.status.range, first);
        assert_eq!(ctx.space().len(), 1);
    }

    #[test]
    fn test_resize_may_reuse_own_ids() {
        let mut ctx = context(IdKind::Vlan);
        apply_claim(&mut ctx, &mut claim("a").with_size(4)).unwrap();
        let mut grown = claim("a").with_size(6);
        apply_claim(&mut ctx, &mut grown).unwrap();
        assert_eq!(grown.status.range.as_deref(), Some("1-6"));
        assert_eq!(ctx.space().len(), 1);
    }

    #[test]
    fn test_no_free_block() {
        let mut ctx = context(IdKind::Vlan);
        let err = apply_claim(&mut ctx, &mut claim("a").with_size(4095)).unwrap_err();
        assert_eq!(
            err,
            Error::NoFreeBlock {
                table: "root".to_string(),
                size: 4095
            }
        );
        assert_eq!(ctx.entry_count(), 0);
    }

    #[test]
    fn test_status_hint_and_delete() {
        let mut ctx = context(IdKind::Vlan);
        let mut a = claim("a").with_size(3);
        a.status.range = Some("100-102".to_string());
        apply_claim(&mut ctx, &mut a).unwrap();
        assert_eq!(a.status.range.as_deref(), Some("100-102"));

        release_claim(&mut ctx, &a).unwrap();
        assert_eq!(ctx.entry_count(), 0);
        assert!(ctx.range("default/a").is_none());
    }
}
