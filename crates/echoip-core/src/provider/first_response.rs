use super::{FetchStrategy, SourceEntry};
use crate::error::{Error, Result};
use crate::keys::{self, RequiredKeys};
use crate::traits::SourceReading;
use async_trait::async_trait;
use tracing::debug;

/// First sufficient answer wins
///
/// Sources are tried in the order given; failing sources are skipped and
/// the first reading whose info meets the required keys is returned
/// without contacting the remaining sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstResponse;

#[async_trait]
impl FetchStrategy for FirstResponse {
    fn name(&self) -> &'static str {
        "first-response"
    }

    async fn fetch(
        &self,
        sources: &[&SourceEntry],
        required: Option<&RequiredKeys>,
    ) -> Result<SourceReading> {
        for entry in sources {
            let Some(reading) = entry.try_fetch().await? else {
                continue;
            };

            if keys::satisfies(&reading.info, required) {
                debug!("Source {} answered {}", entry.source().name(), reading.ip);
                return Ok(reading);
            }

            debug!(
                "Source {} answered {} without the required keys",
                entry.source().name(),
                reading.ip
            );
        }

        Err(Error::NoSourcesResponded)
    }
}
