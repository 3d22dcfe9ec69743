//! Allocation policy per claim type.
//!
//! Each claim type has an applicator implementing the same three steps:
//!
//! - **validate**: work out, without touching any table, whether the claim
//!   re-claims something it already owns, which table it targets and exactly
//!   which ids it will occupy. All conflicts surface here.
//! - **apply**: execute the validated plan and write the claim status.
//! - **delete**: release everything the claim owns.
//!
//! Reclaim runs before allocation so a claim that is merely re-applied keeps
//! its id or range. Overlap checks ignore the claim's own entries.

pub mod dynamic;
pub mod range;
pub mod size;
pub mod static_id;

use log::{debug, warn};
use std::collections::BTreeMap;

use crate::cache::{CacheContext, Target};
use crate::claim::selector::LabelSelector;
use crate::claim::{Claim, ClaimRequest};
use crate::error::{Error, Result};
use crate::index::IdSpan;

pub use dynamic::DynamicApplicator;
pub use range::RangeApplicator;
pub use size::SizeApplicator;
pub use static_id::StaticApplicator;

/// Validate / apply / delete contract shared by all claim types
pub trait Applicator {
    fn validate(&mut self, ctx: &CacheContext, claim: &Claim) -> Result<()>;

    /// Runs `validate` first if it has not been run for this claim
    fn apply(&mut self, ctx: &mut CacheContext, claim: &mut Claim) -> Result<()>;

    fn delete(&mut self, ctx: &mut CacheContext, claim: &Claim) -> Result<()>;
}

/// Closed set of applicators, selected once from the resolved request
#[derive(Debug)]
pub enum ClaimApplicator {
    Dynamic(DynamicApplicator),
    Static(StaticApplicator),
    Range(RangeApplicator),
    Size(SizeApplicator),
}

impl ClaimApplicator {
    pub fn new(request: ClaimRequest) -> Self {
        match request {
            ClaimRequest::Dynamic => ClaimApplicator::Dynamic(DynamicApplicator::default()),
            ClaimRequest::Static(_) => ClaimApplicator::Static(StaticApplicator::default()),
            ClaimRequest::Range(span) => ClaimApplicator::Range(RangeApplicator::new(span)),
            ClaimRequest::Size(size) => ClaimApplicator::Size(SizeApplicator::new(size)),
        }
    }

    fn inner(&mut self) -> &mut dyn Applicator {
        match self {
            ClaimApplicator::Dynamic(a) => a,
            ClaimApplicator::Static(a) => a,
            ClaimApplicator::Range(a) => a,
            ClaimApplicator::Size(a) => a,
        }
    }
}

impl Applicator for ClaimApplicator {
    fn validate(&mut self, ctx: &CacheContext, claim: &Claim) -> Result<()> {
        self.inner().validate(ctx, claim)
    }

    fn apply(&mut self, ctx: &mut CacheContext, claim: &mut Claim) -> Result<()> {
        self.inner().apply(ctx, claim)
    }

    fn delete(&mut self, ctx: &mut CacheContext, claim: &Claim) -> Result<()> {
        self.inner().delete(ctx, claim)
    }
}

/// Resolve, validate and apply a claim against `ctx`.
///
/// Once applied the claim's live entries supersede any of its records
/// restore had to protect.
pub fn apply_claim(ctx: &mut CacheContext, claim: &mut Claim) -> Result<()> {
    let request = claim.request(ctx.kind())?;
    let mut applicator = ClaimApplicator::new(request);
    applicator.validate(ctx, claim)?;
    applicator.apply(ctx, claim)?;
    unprotect(ctx, claim);
    Ok(())
}

/// Release everything `claim` owns in `ctx`.
///
/// Claims whose shape no longer validates still get their earlier
/// allocations released.
pub fn release_claim(ctx: &mut CacheContext, claim: &Claim) -> Result<()> {
    match claim.request(ctx.kind()) {
        Ok(request) => ClaimApplicator::new(request).delete(ctx, claim)?,
        Err(_) => {
            release_owned(ctx, claim)?;
            drop_range_table(ctx, &claim.key());
        }
    }
    unprotect(ctx, claim);
    Ok(())
}

fn unprotect(ctx: &mut CacheContext, claim: &Claim) {
    let dropped = ctx.unprotect_owned(claim);
    if dropped > 0 {
        debug!("Claim {} no longer protects {} records", claim.key(), dropped);
    }
}

/// Entries owned by `claim` across the root space and every Range Table,
/// as id -> table.
pub fn entries_by_owner(ctx: &CacheContext, claim: &Claim) -> BTreeMap<u64, Target> {
    ctx.tables()
        .flat_map(|(target, table)| {
            table
                .entries()
                .filter(|entry| entry.is_owned_by(claim))
                .map(move |entry| (entry.id(), target.clone()))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Release the given entries; releasing a range marker from the root also
/// drops the Range Table it created.
pub(crate) fn release_entries(ctx: &mut CacheContext, entries: &[(u64, Target)]) -> Result<()> {
    for (id, target) in entries {
        let entry = match ctx.table_mut(target) {
            Ok(table) => table.release(*id)?,
            // already gone with a Range Table released earlier in this loop
            Err(Error::RangeTableNotFound(_)) => continue,
            Err(e) => return Err(e),
        };
        debug!("Released {} from {} ({})", entry.span(), target, entry.claim_key());
        if *target == Target::Root && entry.is_range() {
            drop_range_table(ctx, &entry.claim_key());
        }
    }
    Ok(())
}

/// Release every entry owned by `claim`, returning how many were released
pub(crate) fn release_owned(ctx: &mut CacheContext, claim: &Claim) -> Result<usize> {
    let owned: Vec<(u64, Target)> = entries_by_owner(ctx, claim).into_iter().collect();
    release_entries(ctx, &owned)?;
    Ok(owned.len())
}

pub(crate) fn drop_range_table(ctx: &mut CacheContext, name: &str) {
    if let Some(table) = ctx.delete_range(name) {
        if !table.is_empty() {
            warn!(
                "Range table {} dropped with {} entries still allocated",
                name,
                table.len()
            );
        }
    }
}

/// Check `span` against the index's `min_id`/`max_id`.
///
/// The index's own boundary reservations are exempt: they exist precisely to
/// cover the ids outside those bounds.
pub(crate) fn check_index_bounds(ctx: &CacheContext, claim: &Claim, span: IdSpan) -> Result<()> {
    let index = ctx.index();
    if index.owns(&claim.owner) {
        return Ok(());
    }
    let assignable = index.assignable()?;
    if assignable.contains_span(&span) {
        return Ok(());
    }
    let id = if assignable.contains(span.start()) {
        span.end()
    } else {
        span.start()
    };
    Err(Error::OutOfBounds {
        id,
        min: assignable.start(),
        max: assignable.end(),
    })
}

/// Find the Range Table a selector points at.
///
/// Every matching root entry must be a range marker and all of them must
/// belong to the same range. Entries of the claim itself never match: they
/// are released before the claim allocates.
pub(crate) fn resolve_selector(
    ctx: &CacheContext,
    claim: &Claim,
    selector: &LabelSelector,
) -> Result<Target> {
    let mut parent: Option<String> = None;
    let matches = ctx
        .space()
        .select(selector)
        .into_iter()
        .filter(|entry| !entry.is_owned_by(claim));
    for entry in matches {
        if !entry.is_range() {
            return Err(Error::SelectorNotRange {
                claim: claim.key(),
                entry: entry.span().to_string(),
            });
        }
        let key = entry.claim_key();
        match &parent {
            None => parent = Some(key),
            Some(existing) if *existing == key => {}
            Some(_) => return Err(Error::ConflictingParents(claim.key())),
        }
    }

    let name = parent.ok_or_else(|| Error::SelectorNoMatch(claim.key()))?;
    if ctx.range(&name).is_none() {
        return Err(Error::RangeTableNotFound(name));
    }
    Ok(Target::Range(name))
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::claim::labels;
    use crate::index::IdKind;

    #[test]
    fn test_entries_by_owner_spans_tables() {
        let mut ctx = context(IdKind::As);
        apply_claim(&mut ctx, &mut claim("r").with_range("10-19")).unwrap();

        let selector = LabelSelector::default().with_label(labels::CLAIM_NAME, "r");
        let mut inside = claim("d").with_selector(selector);
        apply_claim(&mut ctx, &mut inside).unwrap();
        apply_claim(&mut ctx, &mut claim("s").with_id(40)).unwrap();

        let owned = entries_by_owner(&ctx, &claim("d"));
        assert_eq!(owned.len(), 1);
        assert_eq!(owned.get(&10), Some(&Target::Range("default/r".to_string())));

        let owned = entries_by_owner(&ctx, &claim("s"));
        assert_eq!(owned.get(&40), Some(&Target::Root));
    }

    #[test]
    fn test_ownership_requires_matching_owner() {
        let mut ctx = context(IdKind::As);
        apply_claim(&mut ctx, &mut claim("s").with_id(5)).unwrap();

        // same claim name, different owner
        let mut impostor = Claim::new("s", "pool", owner("other")).with_id(5);
        assert!(entries_by_owner(&ctx, &impostor).is_empty());
        let err = apply_claim(&mut ctx, &mut impostor).unwrap_err();
        assert_eq!(
            err,
            Error::AlreadyAllocated {
                id: 5,
                owner: "default/s".to_string()
            }
        );
    }

    #[test]
    fn test_release_invalid_claim_cleans_up() {
        let mut ctx = context(IdKind::As);
        let mut c = claim("s").with_id(5);
        apply_claim(&mut ctx, &mut c).unwrap();

        // claim turned invalid after it was applied
        let invalid = c.with_range("1-2");
        release_claim(&mut ctx, &invalid).unwrap();
        assert_eq!(ctx.entry_count(), 0);
    }

    #[test]
    fn test_selector_errors() {
        let mut ctx = context(IdKind::As);
        apply_claim(&mut ctx, &mut claim("s").with_id(5).with_label("site", "ams")).unwrap();
        apply_claim(&mut ctx, &mut claim("r1").with_range("10-19").with_label("pool", "p")).unwrap();
        apply_claim(&mut ctx, &mut claim("r2").with_range("20-29").with_label("pool", "p")).unwrap();

        let c = claim("d");
        let none = LabelSelector::default().with_label("site", "fra");
        assert_eq!(
            resolve_selector(&ctx, &c, &none),
            Err(Error::SelectorNoMatch("default/d".to_string()))
        );

        let single = LabelSelector::default().with_label("site", "ams");
        assert!(matches!(
            resolve_selector(&ctx, &c, &single),
            Err(Error::SelectorNotRange { .. })
        ));

        let both = LabelSelector::default().with_label("pool", "p");
        assert_eq!(
            resolve_selector(&ctx, &c, &both),
            Err(Error::ConflictingParents("default/d".to_string()))
        );
    }
}
