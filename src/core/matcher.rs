//! Identity resolution against the enrolled faces.
//!
//! Both operations read the full record set from the store on every call and
//! scan it linearly. Records whose stored embedding cannot be decoded, or whose
//! dimensionality differs from the query, are skipped with a warning and never
//! count as a match; every other error aborts the scan.

use crate::common::{Config, FaceAuthError, Result};
use crate::core::embedding::{validate_embedding, DistanceMetric, Embedding};
use crate::storage::{IdentityRecord, IdentityStore};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    pub metric: DistanceMetric,
    pub accept_threshold: f32,
    pub duplicate_threshold: f32,
}

impl MatchPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            metric: config.matching.metric,
            accept_threshold: config.matching.accept_threshold,
            duplicate_threshold: config.matching.duplicate_threshold,
        }
    }
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Euclidean,
            accept_threshold: 0.55,
            duplicate_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Match { identity: IdentityRecord, distance: f32 },
    NoMatch,
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Match { .. })
    }
}

pub struct MatchEngine<'a, S: IdentityStore + ?Sized> {
    store: &'a S,
    policy: MatchPolicy,
}

impl<'a, S: IdentityStore + ?Sized> MatchEngine<'a, S> {
    pub fn new(store: &'a S, policy: MatchPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    pub fn check_duplicate(&self, candidate: &[f32]) -> Result<()> {
        let records = self.store.list_identities()?;
        check_duplicate_in(&records, candidate, &self.policy)
    }

    pub fn authenticate(&self, query: &[f32]) -> Result<MatchOutcome> {
        let records = self.store.list_identities()?;
        authenticate_in(&records, query, &self.policy)
    }
}

/// Fails with `DuplicateFace` naming the first enrolled identity that is the
/// same person as `candidate`.
pub fn check_duplicate_in(
    records: &[IdentityRecord],
    candidate: &[f32],
    policy: &MatchPolicy,
) -> Result<()> {
    validate_embedding(candidate)?;

    for record in records {
        let Some(stored) = usable_embedding(record, candidate.len())? else {
            continue;
        };

        if policy.metric.same_person(&stored, candidate, policy.duplicate_threshold)? {
            tracing::info!(
                "Candidate face matches existing identity {} ({})",
                record.id, record.username
            );
            return Err(FaceAuthError::DuplicateFace {
                id: record.id,
                username: record.username.clone(),
            });
        }
    }

    Ok(())
}

/// Nearest enrolled identity strictly below the accept threshold. Ties keep
/// the record seen first.
pub fn authenticate_in(
    records: &[IdentityRecord],
    query: &[f32],
    policy: &MatchPolicy,
) -> Result<MatchOutcome> {
    validate_embedding(query)?;
    tracing::info!("Comparing against {} registered users", records.len());

    let mut best_distance = policy.accept_threshold;
    let mut best: Option<&IdentityRecord> = None;

    for record in records {
        let Some(stored) = usable_embedding(record, query.len())? else {
            continue;
        };

        let distance = policy.metric.distance(query, &stored)?;
        tracing::debug!("Checking {}: distance {:.4}", record.username, distance);

        if distance < policy.accept_threshold && distance < best_distance {
            best_distance = distance;
            best = Some(record);
        }
    }

    Ok(match best {
        Some(identity) => MatchOutcome::Match {
            identity: identity.clone(),
            distance: best_distance,
        },
        None => MatchOutcome::NoMatch,
    })
}

/// The stored embedding if it can take part in a comparison of `dimension`
/// components. Corrupt records are logged and yield `None`.
fn usable_embedding(record: &IdentityRecord, dimension: usize) -> Result<Option<Embedding>> {
    let embedding = match record.embedding() {
        Ok(Some(embedding)) => embedding,
        Ok(None) => return Ok(None),
        Err(FaceAuthError::CorruptRecord { id, reason }) => {
            tracing::warn!("Skipping corrupt record {} ({}): {}", id, record.username, reason);
            return Ok(None);
        }
        Err(other) => return Err(other),
    };

    if embedding.len() != dimension {
        tracing::warn!(
            "Skipping corrupt record {} ({}): embedding has {} components, expected {}",
            record.id, record.username, embedding.len(), dimension
        );
        return Ok(None);
    }

    Ok(Some(embedding))
}
