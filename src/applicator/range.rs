//! Range claims.
//!
//! A committed range occupies one marker entry in the root space and gets a
//! Range Table of its own for the ids inside it. Ranges may not overlap any
//! root entry owned by someone else.

use chrono::Utc;
use log::{debug, info};

use super::{
    check_index_bounds, drop_range_table, entries_by_owner, release_entries, release_owned,
    Applicator,
};
use crate::cache::{CacheContext, Target};
use crate::claim::{Claim, ClaimType};
use crate::error::{Error, Result};
use crate::index::IdSpan;

/// Validated placement of a range or size claim
#[derive(Debug)]
pub(crate) struct RangePlan {
    pub span: IdSpan,
    /// The claim already owns a root marker with exactly this span
    pub exists: bool,
    pub stale: Vec<(u64, Target)>,
}

impl RangePlan {
    /// Plan for `span`, treating every other owned entry as stale
    pub(crate) fn new(ctx: &CacheContext, claim: &Claim, span: IdSpan) -> Self {
        let exists = ctx
            .space()
            .get(span.start())
            .is_some_and(|entry| entry.span() == span && entry.is_owned_by(claim));
        let stale = entries_by_owner(ctx, claim)
            .into_iter()
            .filter(|(id, target)| !(exists && *id == span.start() && *target == Target::Root))
            .collect();
        Self { span, exists, stale }
    }
}

/// Make sure nobody else holds ids inside `span`
pub(crate) fn check_overlap(ctx: &CacheContext, claim: &Claim, span: IdSpan) -> Result<()> {
    if let Some(entry) = ctx
        .space()
        .overlapping(span)
        .into_iter()
        .find(|entry| !entry.is_owned_by(claim))
    {
        return Err(Error::RangeOverlap {
            range: span.to_string(),
            existing: entry.span().to_string(),
            owner: entry.claim_key(),
        });
    }
    Ok(())
}

/// Commit a validated range plan: release stale entries, write the root
/// marker and ensure the Range Table exists.
pub(crate) fn commit(
    ctx: &mut CacheContext,
    claim: &mut Claim,
    plan: RangePlan,
    claim_type: ClaimType,
) -> Result<()> {
    release_entries(ctx, &plan.stale)?;

    let key = claim.key();
    let labels = claim.entry_labels(claim_type);
    if plan.exists {
        ctx.table_mut(&Target::Root)?.update(plan.span.start(), labels)?;
    } else {
        // a table left behind by an earlier span of this claim
        drop_range_table(ctx, &key);
        ctx.table_mut(&Target::Root)?.claim(plan.span, labels)?;
        info!("Committed range {} for claim {}", plan.span, key);
    }
    ctx.create_range(&key, plan.span);
    debug!("Range table {} spans {}", key, plan.span);

    claim.status.range = Some(plan.span.to_string());
    claim.status.id = None;
    claim.stamp_expiry(Utc::now());
    Ok(())
}

/// Release the root marker and drop the Range Table with everything in it
pub(crate) fn delete(ctx: &mut CacheContext, claim: &Claim) -> Result<()> {
    release_owned(ctx, claim)?;
    drop_range_table(ctx, &claim.key());
    Ok(())
}

#[derive(Debug)]
pub struct RangeApplicator {
    span: IdSpan,
    plan: Option<RangePlan>,
}

impl RangeApplicator {
    pub fn new(span: IdSpan) -> Self {
        Self { span, plan: None }
    }
}

impl Applicator for RangeApplicator {
    fn validate(&mut self, ctx: &CacheContext, claim: &Claim) -> Result<()> {
        check_index_bounds(ctx, claim, self.span)?;
        let plan = RangePlan::new(ctx, claim, self.span);
        if !plan.exists {
            check_overlap(ctx, claim, self.span)?;
        }
        self.plan = Some(plan);
        Ok(())
    }

    fn apply(&mut self, ctx: &mut CacheContext, claim: &mut Claim) -> Result<()> {
        if self.plan.is_none() {
            self.validate(ctx, claim)?;
        }
        match self.plan.take() {
            Some(plan) => commit(ctx, claim, plan, ClaimType::Range),
            None => Ok(()),
        }
    }

    fn delete(&mut self, ctx: &mut CacheContext, claim: &Claim) -> Result<()> {
        delete(ctx, claim)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{apply_claim, release_claim};
    use super::*;
    use crate::claim::labels;
    use crate::claim::selector::LabelSelector;
    use crate::index::IdKind;

    #[test]
    fn test_range_creates_marker_and_table() {
        let mut ctx = context(IdKind::As);
        let mut r = claim("r").with_range("10-19");
        apply_claim(&mut ctx, &mut r).unwrap();

        assert_eq!(r.status.range.as_deref(), Some("10-19"));
        assert_eq!(ctx.space().len(), 1);
        let marker = ctx.space().get(15).unwrap();
        assert_eq!(marker.span(), IdSpan::new(10, 19).unwrap());
        assert_eq!(marker.claim_type(), ClaimType::Range);
        assert_eq!(ctx.range("default/r").unwrap().bounds(), marker.span());
    }

    #[test]
    fn test_overlap_is_rejected() {
        let mut ctx = context(IdKind::As);
        apply_claim(&mut ctx, &mut claim("a").with_range("10-19")).unwrap();
        apply_claim(&mut ctx, &mut claim("s").with_id(25)).unwrap();

        let err = apply_claim(&mut ctx, &mut claim("b").with_range("19-100")).unwrap_err();
        assert_eq!(
            err,
            Error::RangeOverlap {
                range: "19-100".to_string(),
                existing: "10-19".to_string(),
                owner: "default/a".to_string()
            }
        );

        let err = apply_claim(&mut ctx, &mut claim("c").with_range("20-30")).unwrap_err();
        assert!(matches!(err, Error::RangeOverlap { .. }));
        assert!(ctx.range("default/b").is_none());
        assert!(ctx.range("default/c").is_none());
    }

    #[test]
    fn test_reapply_keeps_children() {
        let mut ctx = context(IdKind::As);
        apply_claim(&mut ctx, &mut claim("r").with_range("10-19")).unwrap();
        apply_claim(&mut ctx, &mut claim("s").with_id(12)).unwrap();

        apply_claim(&mut ctx, &mut claim("r").with_range("10-19").with_label("tier", "gold"))
            .unwrap();
        assert_eq!(ctx.range("default/r").unwrap().len(), 1);
        assert_eq!(
            ctx.space().get(10).unwrap().labels().get("tier").map(String::as_str),
            Some("gold")
        );
    }

    #[test]
    fn test_changed_range_cascades_children() {
        let mut ctx = context(IdKind::As);
        apply_claim(&mut ctx, &mut claim("r").with_range("10-19")).unwrap();
        apply_claim(&mut ctx, &mut claim("s").with_id(12)).unwrap();

        // growing over its own old span is allowed
        apply_claim(&mut ctx, &mut claim("r").with_range("10-29")).unwrap();
        assert_eq!(ctx.space().len(), 1);
        let table = ctx.range("default/r").unwrap();
        assert_eq!(table.bounds(), IdSpan::new(10, 29).unwrap());
        assert!(table.is_empty());
    }

    #[test]
    fn test_delete_drops_range_table() {
        let mut ctx = context(IdKind::As);
        let mut r = claim("r").with_range("10-19");
        apply_claim(&mut ctx, &mut r).unwrap();
        let selector = LabelSelector::default().with_label(labels::CLAIM_NAME, "r");
        apply_claim(&mut ctx, &mut claim("d").with_selector(selector)).unwrap();

        release_claim(&mut ctx, &r).unwrap();
        assert_eq!(ctx.entry_count(), 0);
        assert!(ctx.range("default/r").is_none());
    }
}
