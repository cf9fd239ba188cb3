//! Continuous simulation: one unbounded generation loop per device.
//!
//! Device tasks only generate and enqueue readings; a single processor task
//! drains the channel and performs the I/O (metadata lookup, sink writes).
//! Per-device order is preserved because each device has one producer and
//! the channel is FIFO. Cancellation is observed between iterations; the
//! processor finishes every reading already enqueued before returning.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::RawReading;
use crate::pipeline::Pipeline;
use crate::source::{device_seed, SimulatedSource};

// ---

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub seed: Option<u64>,
    /// Stop each device after this many readings. `None` runs until cancelled.
    pub max_readings_per_device: Option<u64>,
    pub channel_capacity: usize,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        SimulationSettings {
            min_interval: Duration::from_secs(6),
            max_interval: Duration::from_secs(56),
            seed: None,
            max_readings_per_device: None,
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationStats {
    pub processed: u64,
    pub primary_successful: u64,
    pub backup_successful: u64,
    pub enrich_failures: u64,
}

/// Random pause in `[min, max]`, millisecond resolution.
pub fn next_interval<R: Rng>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    // ---
    let (lo, hi) = (min.as_millis() as u64, max.as_millis() as u64);
    if lo >= hi {
        return min;
    }
    Duration::from_millis(rng.gen_range(lo..=hi))
}

/// Run device loops until `cancel` fires (or every device hits its cap).
pub async fn run_simulation(
    pipeline: Pipeline,
    devices: &[String],
    settings: SimulationSettings,
    cancel: CancellationToken,
) -> SimulationStats {
    // ---
    let (tx, rx) = mpsc::channel(settings.channel_capacity.max(1));
    let source = SimulatedSource::new(settings.seed);

    info!(
        "Starting simulation for {} devices, interval {:?}..{:?}",
        devices.len(),
        settings.min_interval,
        settings.max_interval
    );

    let mut producers = Vec::with_capacity(devices.len());
    for device_id in devices {
        producers.push(tokio::spawn(device_loop(
            source.clone(),
            device_id.clone(),
            settings.clone(),
            tx.clone(),
            cancel.clone(),
        )));
    }
    // The processor stops once every producer has dropped its sender.
    drop(tx);

    let stats = process_readings(pipeline, rx).await;

    for producer in producers {
        if let Err(e) = producer.await {
            warn!("Device task ended abnormally: {}", e);
        }
    }

    info!(
        "Simulation stopped: {} processed, {} primary, {} backup, {} enrichment failures",
        stats.processed, stats.primary_successful, stats.backup_successful, stats.enrich_failures
    );
    stats
}

async fn device_loop(
    source: SimulatedSource,
    device_id: String,
    settings: SimulationSettings,
    tx: mpsc::Sender<RawReading>,
    cancel: CancellationToken,
) {
    // ---
    let mut generator = source.generator(&device_id);
    let mut rng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(device_seed(seed, &device_id).rotate_left(1)),
        None => StdRng::from_entropy(),
    };
    let mut sent = 0u64;

    info!(device_id = %device_id, "Device simulation started");
    loop {
        if cancel.is_cancelled() {
            break;
        }
        if settings.max_readings_per_device.is_some_and(|cap| sent >= cap) {
            break;
        }

        let reading = generator.step();
        if tx.send(reading).await.is_err() {
            warn!(device_id = %device_id, "Processor gone, stopping device");
            break;
        }
        sent += 1;

        let interval = next_interval(&mut rng, settings.min_interval, settings.max_interval);
        debug!(device_id = %device_id, "Next reading in {:?}", interval);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    info!(device_id = %device_id, sent, "Device simulation stopped");
}

async fn process_readings(pipeline: Pipeline, mut rx: mpsc::Receiver<RawReading>) -> SimulationStats {
    // ---
    let mut stats = SimulationStats::default();
    while let Some(raw) = rx.recv().await {
        let device_id = raw.device_key().to_string();
        match pipeline.process(raw).await {
            Ok(record) => {
                stats.processed += 1;
                stats.primary_successful += u64::from(record.primary_ok);
                stats.backup_successful += u64::from(record.backup_ok);
                info!(
                    device_id = %device_id,
                    record_id = %record.record_id,
                    primary_ok = record.primary_ok,
                    backup_ok = record.backup_ok,
                    "Reading processed"
                );
            }
            Err(e) => {
                stats.enrich_failures += 1;
                warn!(device_id = %device_id, "Reading dropped: {}", e);
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_interval_within_bounds() {
        // ---
        let mut rng = StdRng::seed_from_u64(4);
        let (min, max) = (Duration::from_secs(6), Duration::from_secs(56));
        for _ in 0..500 {
            let d = next_interval(&mut rng, min, max);
            assert!(d >= min && d <= max);
        }
    }

    #[test]
    fn test_degenerate_interval() {
        // ---
        let mut rng = StdRng::seed_from_u64(4);
        let d = Duration::from_millis(5);
        assert_eq!(next_interval(&mut rng, d, d), d);
        assert_eq!(next_interval(&mut rng, d, Duration::ZERO), d);
    }
}
