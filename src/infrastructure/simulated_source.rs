// Simulated reading source - Seeded stand-in for the field sensor network
use crate::application::clock::Clock;
use crate::application::reading_source::{PayloadStream, ReadingSource};
use crate::domain::reading::RawReading;
use crate::error::StreamError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    pub seed: u64,
    pub interval: Duration,
    /// Break the connection after this many payloads, to exercise reconnects.
    pub dropout_after: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            seed: 42,
            interval: Duration::from_secs(5),
            dropout_after: None,
        }
    }
}

/// Deterministic generator of plausible readings.
///
/// Values stay in typical field ranges: temperature 22-30 °C, soil moisture
/// 55-70 %, humidity 60-80 %, leaf wetness 0-1.
#[derive(Debug)]
pub struct ReadingGenerator {
    rng: StdRng,
}

impl ReadingGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generator for one farm; distinct farms get distinct sequences, and
    /// the same farm gets the same sequence across builds.
    pub fn for_farm(seed: u64, farm_id: &str) -> Self {
        Self::new(seed ^ farm_seed(farm_id))
    }

    pub fn next_reading(&mut self, clock: &dyn Clock) -> RawReading {
        RawReading {
            timestamp: Some(clock.now()),
            temperature: 22.0 + self.rng.gen_range(0.0..8.0),
            soil_moisture: 55.0 + self.rng.gen_range(0.0..15.0),
            humidity: 60.0 + self.rng.gen_range(0.0..20.0),
            leaf_wetness: Some(self.rng.gen_range(0.0..1.0)),
            zone: None,
        }
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a over the farm id.
fn farm_seed(farm_id: &str) -> u64 {
    farm_id.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

pub struct SimulatedSource {
    settings: SimulationSettings,
    clock: Arc<dyn Clock>,
}

impl SimulatedSource {
    pub fn new(settings: SimulationSettings, clock: Arc<dyn Clock>) -> Self {
        Self { settings, clock }
    }
}

#[async_trait]
impl ReadingSource for SimulatedSource {
    async fn open(&self, farm_id: &str) -> Result<PayloadStream, StreamError> {
        let mut generator = ReadingGenerator::for_farm(self.settings.seed, farm_id);
        let clock = self.clock.clone();
        let interval = self.settings.interval;
        let dropout_after = self.settings.dropout_after;
        let farm_id = farm_id.to_string();

        tracing::debug!("Opening simulated stream for farm {}", farm_id);

        let stream = async_stream::stream! {
            let mut ticker = tokio::time::interval(interval);
            let mut sent = 0u64;
            loop {
                ticker.tick().await;
                if dropout_after.is_some_and(|limit| sent >= limit) {
                    yield Err(StreamError::Transport {
                        farm_id: farm_id.clone(),
                        reason: "simulated dropout".to_string(),
                    });
                    break;
                }

                let raw = generator.next_reading(clock.as_ref());
                match serde_json::to_vec(&raw) {
                    Ok(payload) => {
                        sent += 1;
                        yield Ok(Bytes::from(payload));
                    }
                    Err(e) => tracing::error!("Failed to encode simulated reading: {}", e),
                }
            }
        };

        Ok(stream.boxed())
    }
}
