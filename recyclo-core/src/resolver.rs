//! Label resolver: turns the top label into fee facts and collection centers.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::model::{CenterId, CollectionCenter, FeeRecord};
use crate::ports::{CenterTablePort, FeeTablePort, LookupError};
use crate::synonyms::SynonymMap;

/// Default bound for a single data store query.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
/// How a set of centers was found.
pub enum MatchStrategy {
    /// Identifier equals the label.
    Exact,
    /// Accepted-items text matched the label or one of its synonyms.
    Fallback,
    /// Nothing matched.
    None,
}

#[derive(Debug, Clone, PartialEq)]
/// Centers found for a label together with the step that found them.
pub struct CenterMatches {
    /// Matching centers, in data store order.
    pub centers: Vec<CollectionCenter>,
    /// Step that produced `centers`.
    pub strategy: MatchStrategy,
}

impl CenterMatches {
    fn none() -> Self {
        Self {
            centers: Vec::new(),
            strategy: MatchStrategy::None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The two independent fee tables.
pub enum FeeSource {
    /// General fee table keyed by label.
    Base,
    /// Per-center table keyed by identifier.
    Center,
}

impl fmt::Display for FeeSource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeeSource::Base => "base fee table",
            FeeSource::Center => "center fee table",
        };
        write!(formatter, "{name}")
    }
}

#[derive(Debug)]
/// Fee lookup result; `degraded` names a source that failed while the other answered.
pub struct FeeOutcome {
    /// Fee facts from the sources that answered.
    pub record: FeeRecord,
    /// Source that failed, if exactly one did.
    pub degraded: Option<(FeeSource, LookupError)>,
}

/// Resolves fees and centers for a label against the data store ports.
pub struct LabelResolver {
    fees: Arc<dyn FeeTablePort>,
    centers: Arc<dyn CenterTablePort>,
    synonyms: SynonymMap,
    lookup_timeout: Duration,
}

impl LabelResolver {
    /// Create a resolver over the given tables.
    #[must_use]
    pub fn new(
        fees: Arc<dyn FeeTablePort>,
        centers: Arc<dyn CenterTablePort>,
        synonyms: SynonymMap,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            fees,
            centers,
            synonyms,
            lookup_timeout,
        }
    }

    async fn bounded<T, F>(&self, query: F) -> Result<T, LookupError>
    where
        F: Future<Output = Result<T, LookupError>>,
    {
        tokio::time::timeout(self.lookup_timeout, query)
            .await
            .map_err(|_elapsed| LookupError::TimedOut(self.lookup_timeout))?
    }

    /// Find collection centers for a label.
    ///
    /// Exact identifier matches win outright. Only when there are none, and the label has a
    /// synonym rule, are accepted-items searched, capped by the rule's limit. An empty
    /// result is a normal outcome.
    ///
    /// # Errors
    ///
    /// Returns a [`LookupError`] when a query fails or times out.
    pub async fn resolve_centers(&self, label: &str) -> Result<CenterMatches, LookupError> {
        let id = CenterId(label.to_owned());
        let exact = self.bounded(self.centers.by_id(&id)).await?;
        if !exact.is_empty() {
            info!(label, count = exact.len(), "exact center match");
            return Ok(CenterMatches {
                centers: exact,
                strategy: MatchStrategy::Exact,
            });
        }

        let Some(terms) = self.synonyms.terms_for(label) else {
            debug!(label, "no exact center and no fallback rule");
            return Ok(CenterMatches::none());
        };
        let limit = self.synonyms.limit_for(label);

        let mut found = self
            .bounded(self.centers.search_accepted_items(&terms, limit))
            .await?;
        found.truncate(limit);

        if found.is_empty() {
            info!(label, ?terms, "no centers found by fallback search");
            return Ok(CenterMatches::none());
        }
        info!(label, count = found.len(), limit, "fallback center match");
        Ok(CenterMatches {
            centers: found,
            strategy: MatchStrategy::Fallback,
        })
    }

    /// Look up both fee sources for a label concurrently.
    ///
    /// # Errors
    ///
    /// Returns the base table's [`LookupError`] only when both sources failed.
    pub async fn resolve_fee(&self, label: &str) -> Result<FeeOutcome, LookupError> {
        let id = CenterId(label.to_owned());
        let (base, center) = tokio::join!(
            self.bounded(self.fees.base_amount(label)),
            self.bounded(self.centers.center_amount(&id)),
        );

        let mut record = FeeRecord::empty(label);
        let degraded = match (base, center) {
            (Ok(base_amount), Ok(center_amount)) => {
                record.base_amount = base_amount;
                record.center_amount = center_amount;
                None
            }
            (Ok(base_amount), Err(err)) => {
                record.base_amount = base_amount;
                Some((FeeSource::Center, err))
            }
            (Err(err), Ok(center_amount)) => {
                record.center_amount = center_amount;
                Some((FeeSource::Base, err))
            }
            (Err(base_err), Err(center_err)) => {
                warn!(label, %base_err, %center_err, "both fee sources failed");
                return Err(base_err);
            }
        };

        if let Some((source, err)) = &degraded {
            warn!(label, %source, error = %err, "fee source failed; using the other");
        }
        debug!(
            label,
            base = ?record.base_amount,
            center = ?record.center_amount,
            "fee resolved"
        );
        Ok(FeeOutcome { record, degraded })
    }
}
