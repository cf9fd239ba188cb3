//! Where batch mode gets its readings: a simulator or a replay of stored
//! wire readings.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::error::SourceError;
use crate::generator::BoundedWalkGenerator;
use crate::models::{is_valid_device_id, RawReading};

// ---

/// Produces the ordered reading stream of one device.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Up to `count` readings for `device_id`, oldest first.
    async fn readings(&self, device_id: &str, count: usize)
        -> Result<Vec<RawReading>, SourceError>;
}

/// Generates readings with a fresh bounded-walk generator per device.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSource {
    seed: Option<u64>,
}

impl SimulatedSource {
    // ---
    pub fn new(seed: Option<u64>) -> Self {
        SimulatedSource { seed }
    }

    pub fn generator(&self, device_id: &str) -> BoundedWalkGenerator {
        // ---
        match self.seed {
            Some(seed) => BoundedWalkGenerator::with_seed(device_id, device_seed(seed, device_id)),
            None => BoundedWalkGenerator::new(device_id),
        }
    }
}

/// Per-device seed so devices sharing a base seed do not walk in lockstep.
pub fn device_seed(base: u64, device_id: &str) -> u64 {
    // FNV-1a
    device_id
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64 ^ base, |h, b| {
            (h ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
        })
}

#[async_trait]
impl ReadingSource for SimulatedSource {
    async fn readings(
        &self,
        device_id: &str,
        count: usize,
    ) -> Result<Vec<RawReading>, SourceError> {
        // ---
        let mut generator = self.generator(device_id);
        Ok((0..count).map(|_| generator.step()).collect())
    }
}

/// Replays wire readings stored as JSON lines in `<dir>/<device_id>.jsonl`.
///
/// The most recent `count` parseable lines are returned in file order.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    dir: PathBuf,
}

impl ReplaySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ReplaySource { dir: dir.into() }
    }
}

#[async_trait]
impl ReadingSource for ReplaySource {
    async fn readings(
        &self,
        device_id: &str,
        count: usize,
    ) -> Result<Vec<RawReading>, SourceError> {
        // ---
        if !is_valid_device_id(device_id) {
            return Err(SourceError::Unavailable {
                device_id: device_id.to_string(),
                reason: "device id is not a valid file name".into(),
            });
        }
        let path = self.dir.join(format!("{device_id}.jsonl"));
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SourceError::Unavailable {
                device_id: device_id.to_string(),
                reason: format!("{}: {}", path.display(), e),
            })?;

        let mut readings = Vec::new();
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawReading>(line) {
                Ok(reading) => readings.push(reading),
                Err(e) => debug!(device_id, "Skipping line {} of {}: {}", i + 1, path.display(), e),
            }
        }

        if readings.is_empty() {
            return Err(SourceError::Empty(device_id.to_string()));
        }

        let skip = readings.len().saturating_sub(count);
        Ok(readings.split_off(skip))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::ranges::Parameter;

    #[tokio::test]
    async fn test_simulated_source_walks_sequentially() {
        // ---
        let source = SimulatedSource::new(Some(17));
        let readings = source.readings("TURBINE_001", 20).await.unwrap();
        assert_eq!(readings.len(), 20);

        for pair in readings.windows(2) {
            let prev = pair[0].numeric(Parameter::RotorRpm).unwrap();
            let next = pair[1].numeric(Parameter::RotorRpm).unwrap();
            // 10% walk plus rounding slack at 2 decimals
            assert!(next <= prev * 1.1 + 0.01 && next >= prev * 0.9 - 0.01);
        }
    }

    #[test]
    fn test_device_seeds_differ() {
        // ---
        assert_ne!(device_seed(1, "TURBINE_001"), device_seed(1, "TURBINE_002"));
        assert_eq!(device_seed(1, "TURBINE_001"), device_seed(1, "TURBINE_001"));
    }

    #[tokio::test]
    async fn test_replay_returns_latest_readings() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let lines = [
            r#"{"device_id":"TURBINE_001","timestamp":"2025-06-01T09:00:00Z","output_power":1.0}"#,
            "not json",
            r#"{"device_id":"TURBINE_001","timestamp":"2025-06-01T09:01:00Z","output_power":2.0}"#,
            r#"{"device_id":"TURBINE_001","timestamp":"2025-06-01T09:02:00Z","output_power":3.0}"#,
        ];
        tokio::fs::write(dir.path().join("TURBINE_001.jsonl"), lines.join("\n"))
            .await
            .unwrap();

        let source = ReplaySource::new(dir.path());
        let readings = source.readings("TURBINE_001", 2).await.unwrap();
        let powers: Vec<f64> = readings
            .iter()
            .map(|r| r.numeric(Parameter::OutputPower).unwrap())
            .collect();
        assert_eq!(powers, vec![2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_replay_missing_device_is_an_error() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let source = ReplaySource::new(dir.path());
        let err = source.readings("TURBINE_009", 1).await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_replay_without_valid_lines_is_empty() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("TURBINE_001.jsonl"), "garbage\n\n")
            .await
            .unwrap();
        let err = ReplaySource::new(dir.path())
            .readings("TURBINE_001", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Empty(_)));
    }

    #[tokio::test]
    async fn test_replay_keeps_naive_and_unparseable_timestamps() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let lines = [
            r#"{"device_id":"TURBINE_001","timestamp":"2025-06-01T09:59:58.123456","output_power":1500.0}"#,
            r#"{"device_id":"TURBINE_001","timestamp":"garbage","output_power":1501.0}"#,
        ];
        tokio::fs::write(dir.path().join("TURBINE_001.jsonl"), lines.join("\n"))
            .await
            .unwrap();

        let readings = ReplaySource::new(dir.path())
            .readings("TURBINE_001", 5)
            .await
            .unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(
            readings[0].timestamp.map(|t| t.to_rfc3339()).as_deref(),
            Some("2025-06-01T09:59:58.123456+00:00")
        );
        assert!(readings[1].timestamp.is_none());
    }

    #[tokio::test]
    async fn test_replay_rejects_path_like_device_ids() {
        // ---
        let root = tempfile::tempdir().unwrap();
        let replay_dir = root.path().join("replay");
        tokio::fs::create_dir(&replay_dir).await.unwrap();
        tokio::fs::write(
            root.path().join("x.jsonl"),
            r#"{"device_id":"x","output_power":1.0}"#,
        )
        .await
        .unwrap();

        let err = ReplaySource::new(&replay_dir)
            .readings("../x", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }
}
