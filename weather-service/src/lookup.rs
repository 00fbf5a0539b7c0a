use common::models::{CacheTier, WeatherRecord};
use tracing::{debug, instrument};

use crate::cache::CacheGateway;
use crate::upstream::{FetchFailure, UpstreamGate};

/// A served lookup and where it came from
#[derive(Debug, Clone)]
pub struct Lookup {
    pub record: WeatherRecord,
    pub tier: CacheTier,
    pub attempts: u32,
}

/// Cache-first weather lookup: gateway, then upstream, then write-back.
pub struct WeatherLookup {
    cache: CacheGateway,
    gate: UpstreamGate,
}

impl WeatherLookup {
    pub fn new(cache: CacheGateway, gate: UpstreamGate) -> Self {
        Self { cache, gate }
    }

    pub fn cache(&self) -> &CacheGateway {
        &self.cache
    }

    #[instrument(skip(self), fields(city = %city))]
    pub async fn lookup(&self, city: &str) -> Result<Lookup, FetchFailure> {
        let cached = self.cache.get(city).await;
        if let Some(record) = cached.record {
            return Ok(Lookup {
                record,
                tier: cached.tier,
                attempts: 0,
            });
        }

        let fetched = self.gate.fetch(city).await?;
        self.cache.set(city, &fetched.record).await;
        debug!(attempts = fetched.attempts, "Cached upstream result");

        Ok(Lookup {
            record: fetched.record,
            tier: CacheTier::None,
            attempts: fetched.attempts,
        })
    }
}
