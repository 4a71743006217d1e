use std::{fs::File, io, path::Path};

use ron::ser::{PrettyConfig, to_writer_pretty};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Keeps the latest value together with a running, count weighted average.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AverageMeter {
    pub val: f64,
    pub sum: f64,
    pub count: usize,
    pub avg: f64,
}

impl AverageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// `n` is the number of samples `val` was averaged over.
    pub fn update(&mut self, val: f64, n: usize) {
        self.val = val;
        self.sum += val * n as f64;
        self.count += n;
        if self.count > 0 {
            self.avg = self.sum / self.count as f64;
        }
    }
}

#[derive(Error, Debug)]
pub enum LossHistoryError {
    #[error("Unable to write loss history due to {:?}", .0)]
    IoError(#[from] io::Error),
    #[error("Unable to serialize loss history due to {:?}", .0)]
    RonSerializationError(#[from] ron::error::Error),
    #[error("Unable to deserialize loss history due to {:?}", .0)]
    RonDeserializationError(#[from] ron::de::SpannedError),
}

/// Interval averages collected over the whole training run.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct LossHistory {
    pub generator: Vec<f64>,
    pub discriminator: Vec<f64>,
}

impl LossHistory {
    pub fn push(&mut self, generator: f64, discriminator: f64) {
        self.generator.push(generator);
        self.discriminator.push(discriminator);
    }

    pub fn len(&self) -> usize {
        self.generator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generator.is_empty()
    }

    /// Overwrites `path`.
    pub fn save_to_ron(&self, path: &Path) -> Result<(), LossHistoryError> {
        let file = File::create(path)?;
        to_writer_pretty(file, self, PrettyConfig::default())?;
        Ok(())
    }

    pub fn load_from_ron(path: &Path) -> Result<Self, LossHistoryError> {
        let file = File::open(path)?;
        Ok(ron::de::from_reader(file)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_average() {
        let mut meter = AverageMeter::new();
        meter.update(3.0, 2);
        meter.update(5.0, 1);
        assert_eq!(meter.val, 5.0);
        assert_eq!(meter.count, 3);
        assert!((meter.avg - 11.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut meter = AverageMeter::new();
        meter.update(7.0, 4);
        meter.reset();
        assert_eq!(meter, AverageMeter::default());
        meter.update(1.0, 1);
        assert_eq!(meter.avg, 1.0);
    }

    #[test]
    fn history_survives_disk() {
        let path = std::env::temp_dir().join("celeba_dcgan_history_survives_disk.ron");
        let mut history = LossHistory::default();
        history.push(0.5, 1.25);
        history.push(0.75, 1.0);
        history.save_to_ron(&path).expect("unable to save history");
        let loaded = LossHistory::load_from_ron(&path).expect("unable to load history");
        std::fs::remove_file(&path).expect("failed to remove history file");
        assert_eq!(history, loaded);
        assert_eq!(loaded.len(), 2);
    }
}
