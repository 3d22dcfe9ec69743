//! Rebuilding a cache context from persisted state.
//!
//! Restore replays the persisted claims of an index through the applicators,
//! exactly as live requests would run. The replay order matters:
//!
//! 1. the index's own boundary reservations, then orphaned root entries
//! 2. range claims, then size claims, so their Range Tables exist
//! 3. static claims, so they hold their ids before dynamic ones pick
//! 4. dynamic claims
//!
//! Each replayed claim is seeded with the id or span its persisted entry
//! recorded, so dynamic and size claims land where they were before.
//!
//! Records without a claim (orphans) and records of claims that fail to
//! replay are reported and loaded back as they were, labels included, so
//! their ids stay taken. A record that cannot be loaded because its ids
//! collide with a live entry is protected instead: the next save neither
//! deletes nor overwrites it.

use log::{debug, info, warn};

use super::{EntryRecord, Storage, Store};
use crate::applicator::apply_claim;
use crate::cache::{CacheContext, Target};
use crate::claim::{Claim, ClaimType};
use crate::error::Result;
use crate::index::Entry;

/// Outcome of a restore
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Number of claims replayed successfully
    pub restored: usize,
    /// Names of records no claim owns
    pub orphans: Vec<String>,
    /// Keys of claims whose replay failed
    pub failed: Vec<String>,
}

fn replay_rank(claim_type: ClaimType) -> u8 {
    match claim_type {
        ClaimType::Range => 0,
        ClaimType::Size => 1,
        ClaimType::StaticId => 2,
        ClaimType::DynamicId => 3,
        ClaimType::Invalid => 4,
    }
}

/// Seed `claim.status` from the entries it owned when it was last saved
fn seed_status(claim: &mut Claim, owned: &[&EntryRecord]) {
    match claim.claim_type() {
        ClaimType::DynamicId => {
            claim.status.id = owned
                .iter()
                .find(|record| record.id.is_single())
                .map(|record| record.id.start());
        }
        ClaimType::Size => {
            claim.status.range = owned
                .iter()
                .find(|record| record.target() == Target::Root && !record.id.is_single())
                .map(|record| record.id.to_string());
        }
        _ => {}
    }
}

/// Put a record back into its table under its original labels
fn load_record(ctx: &mut CacheContext, record: &EntryRecord) -> Result<()> {
    let target = record.target();
    ctx.table_mut(&target)?.claim(record.id, record.entry_labels())?;
    if target == Target::Root && matches!(record.claim_type, ClaimType::Range | ClaimType::Size) {
        let name = format!("{}/{}", record.claim_namespace, record.claim_name);
        ctx.create_range(&name, record.id);
    }
    Ok(())
}

/// Load records no replayed claim backs, protecting the ones that collide
fn hold_unbacked(ctx: &mut CacheContext, mut unbacked: Vec<&EntryRecord>) {
    // root markers first so nested records find their Range Table
    unbacked.sort_by(|a, b| {
        a.range
            .is_some()
            .cmp(&b.range.is_some())
            .then_with(|| a.name.cmp(&b.name))
    });
    for record in unbacked {
        match load_record(ctx, record) {
            Ok(()) => debug!(
                "Holding {} for claim {}/{}",
                record.name, record.claim_namespace, record.claim_name
            ),
            Err(e) => {
                warn!("Cannot load entry {} ({}), keeping its record", record.name, e);
                ctx.protect(record.name.clone(), Entry::new(record.id, record.entry_labels()));
            }
        }
    }
}

impl<S: Storage> Store<S> {
    /// Rebuild `ctx` from storage.
    ///
    /// Fails only when the index itself is unusable or storage cannot be
    /// read; individual claims that fail to replay end up in the report.
    pub fn restore(&self, ctx: &mut CacheContext) -> Result<RestoreReport> {
        let key = ctx.key();
        let index = ctx.index().clone();

        for mut reservation in index.reservation_claims() {
            apply_claim(ctx, &mut reservation)?;
            debug!("Reserved {} for index {}", reservation.name, key);
        }

        let records = self.storage.list_entries(&key)?;
        let mut claims: Vec<Claim> = self
            .storage
            .list_claims(&key)?
            .into_iter()
            .filter(|claim| claim.index_key() == key)
            .collect();

        let mut report = RestoreReport::default();
        let mut orphans = Vec::new();

        for record in &records {
            let claimed = claims.iter().any(|claim| record.is_owned_by(claim));
            if !claimed && !index.owns(&record.owner) {
                warn!(
                    "Orphaned entry {} in index {} (claim {}/{} not found)",
                    record.name, key, record.claim_namespace, record.claim_name
                );
                report.orphans.push(record.name.clone());
                orphans.push(record);
            }
        }

        // orphaned root entries go in before any replay so claims nested in
        // an orphaned range still find its table; nested ones wait for the
        // Range Tables of the replayed claims
        let (nested, root): (Vec<&EntryRecord>, Vec<&EntryRecord>) =
            orphans.into_iter().partition(|record| record.range.is_some());
        hold_unbacked(ctx, root);
        let mut unbacked = nested;

        // claims without persisted entries were never applied
        claims.retain(|claim| records.iter().any(|record| record.is_owned_by(claim)));
        claims.sort_by(|a, b| {
            replay_rank(a.claim_type())
                .cmp(&replay_rank(b.claim_type()))
                .then_with(|| a.key().cmp(&b.key()))
        });

        for mut claim in claims {
            let owned: Vec<&EntryRecord> = records
                .iter()
                .filter(|record| record.is_owned_by(&claim))
                .collect();
            seed_status(&mut claim, &owned);

            match apply_claim(ctx, &mut claim) {
                Ok(()) => report.restored += 1,
                Err(e) => {
                    warn!("Failed to restore claim {} in index {}: {}", claim.key(), key, e);
                    unbacked.extend(owned);
                    report.failed.push(claim.key());
                }
            }
        }
        hold_unbacked(ctx, unbacked);

        info!(
            "Restored index {}: {} claims, {} orphans, {} failed",
            key,
            report.restored,
            report.orphans.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
