use super::{FetchStrategy, SourceEntry};
use crate::error::{Error, Result};
use crate::keys::{self, RequiredKeys};
use crate::traits::{InfoMap, SourceReading};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::{debug, warn};

/// When a consensus pass may stop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementPolicy {
    /// Stop at the first merge of two or more agreeing sources whose info
    /// meets the required keys. The threshold is only enforced as a minimum
    /// number of registered sources.
    #[default]
    KeysSatisfied,
    /// Additionally require `min_source_agreement` sources to have reported
    /// the address before stopping.
    Strict,
}

/// Several sources must report the same address
///
/// Every source that answers is grouped by the address it reported. When an
/// address is seen again, the info of the new source is merged with the
/// info of the sources that reported it before. On shared keys the source
/// visited first wins, then the next earliest, down to the newcomer. The pass stops as
/// soon as a merge is acceptable under the [`AgreementPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct Consensus {
    min_source_agreement: usize,
    policy: AgreementPolicy,
}

impl Consensus {
    /// Require `min_source_agreement` sources, using the default policy
    pub fn new(min_source_agreement: usize) -> Self {
        Self {
            min_source_agreement,
            policy: AgreementPolicy::default(),
        }
    }

    /// Use a different agreement policy
    pub fn with_policy(mut self, policy: AgreementPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Minimum number of agreeing sources
    pub fn min_source_agreement(&self) -> usize {
        self.min_source_agreement
    }

    /// The agreement policy
    pub fn policy(&self) -> AgreementPolicy {
        self.policy
    }

    fn accepts(&self, agreeing: usize) -> bool {
        match self.policy {
            AgreementPolicy::KeysSatisfied => agreeing >= 2,
            AgreementPolicy::Strict => agreeing >= self.min_source_agreement.max(1),
        }
    }
}

#[async_trait]
impl FetchStrategy for Consensus {
    fn name(&self) -> &'static str {
        "consensus"
    }

    fn check(&self, num_sources: usize) -> Result<()> {
        if num_sources < self.min_source_agreement {
            warn!(
                "{} sources are required for agreement but only {} configured",
                self.min_source_agreement, num_sources
            );
            return Err(Error::InsufficientSources {
                required: self.min_source_agreement,
                configured: num_sources,
            });
        }
        Ok(())
    }

    async fn fetch(
        &self,
        sources: &[&SourceEntry],
        required: Option<&RequiredKeys>,
    ) -> Result<SourceReading> {
        // Info of every source that reported a given address, in visit order.
        let mut agreements: HashMap<IpAddr, Vec<InfoMap>> = HashMap::new();

        for entry in sources {
            let Some(reading) = entry.try_fetch().await? else {
                continue;
            };

            let agreeing = agreements.entry(reading.ip).or_default();

            let mut merged = reading.info.clone();
            // Latest first, so the earliest visitor is applied last and wins.
            for earlier in agreeing.iter().rev() {
                merged.extend(earlier.iter().map(|(k, v)| (k.clone(), v.clone())));
            }

            let count = agreeing.len() + 1;
            debug!(
                "Source {} reported {} ({} agreeing)",
                entry.source().name(),
                reading.ip,
                count
            );

            if self.accepts(count) && keys::satisfies(&merged, required) {
                return Ok(SourceReading::with_info(reading.ip, merged));
            }

            agreeing.push(reading.info);
        }

        Err(Error::NoAgreement)
    }
}
