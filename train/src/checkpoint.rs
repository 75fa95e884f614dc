use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    optim::Optimizer,
    prelude::Backend,
    record::{BinFileRecorder, FileRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::AutodiffBackend,
};

use crate::{
    error::{Result, TrainError},
    train::{Segmenter, create_default_optimizer},
};

const MODEL_RECORD: &str = "model";
const OPTIMIZER_RECORD: &str = "optimizer";

type CheckpointRecorder = BinFileRecorder<FullPrecisionSettings>;

/// Where the recorder puts the record `name`, extension included.
fn record_path<B: Backend>(dir: &Path, name: &str) -> PathBuf {
    dir.join(name)
        .with_extension(<CheckpointRecorder as FileRecorder<B>>::file_extension())
}

impl<B: AutodiffBackend> Segmenter<B> {
    /// Writes the model parameters and the optimizer state into `dir`.
    pub fn save_checkpoint(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| TrainError::checkpoint(dir, e))?;
        let recorder = CheckpointRecorder::new();

        self.model
            .clone()
            .save_file(dir.join(MODEL_RECORD), &recorder)
            .map_err(|e| TrainError::checkpoint(dir, e))?;
        Recorder::<B>::record(&recorder, self.optim.to_record(), dir.join(OPTIMIZER_RECORD))
            .map_err(|e| TrainError::checkpoint(dir, e))?;

        log::info!("Saved checkpoint to {}", dir.display());
        Ok(())
    }

    /// Restores model parameters and, when present, the optimizer state from `dir`.
    ///
    /// A checkpoint without optimizer state still restores the weights and keeps the
    /// current optimizer. The model record itself is all or nothing: burn records mirror
    /// the module tree, so there is no per-parameter fallback and a record that cannot be
    /// read fails the whole load. Checkpoints must come from the same network config.
    pub fn load_checkpoint(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        if !dir.is_dir() || !record_path::<B>(dir, MODEL_RECORD).is_file() {
            return Err(TrainError::CheckpointNotFound(dir.display().to_string()));
        }
        let recorder = CheckpointRecorder::new();

        self.model = self
            .model
            .clone()
            .load_file(dir.join(MODEL_RECORD), &recorder, &self.device)
            .map_err(|e| TrainError::checkpoint(dir, e))?;

        if record_path::<B>(dir, OPTIMIZER_RECORD).is_file() {
            let record = Recorder::<B>::load(&recorder, dir.join(OPTIMIZER_RECORD), &self.device)
                .map_err(|e| TrainError::checkpoint(dir, e))?;
            self.optim = create_default_optimizer(&self.config).load_record(record);
            log::info!("Restored model and optimizer from {}", dir.display());
        } else {
            log::warn!(
                "No optimizer state in {}, restored model weights only",
                dir.display()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrainConfig;
    use burn::backend::{Autodiff, NdArray};
    use network::{LayersPerBlock, NetworkConfig};

    type TestBackend = Autodiff<NdArray<f32>>;

    fn segmenter() -> Segmenter<TestBackend> {
        let network = NetworkConfig::new(1, 2)
            .with_dense_blocks(1)
            .with_layers_per_block(LayersPerBlock::Uniform(1))
            .with_growth_rate(2)
            .with_initial_filters(2);
        let config = TrainConfig::new(2, 1, 1);
        Segmenter::with_network(&config, network, &Default::default()).unwrap()
    }

    #[test]
    fn records_use_bin_extension() {
        let path = record_path::<TestBackend>(Path::new("ckpt"), MODEL_RECORD);
        assert_eq!(path, Path::new("ckpt/model.bin"));
    }

    #[test]
    fn save_writes_both_records() {
        let dir = tempfile::tempdir().unwrap();
        segmenter().save_checkpoint(dir.path()).unwrap();
        assert!(dir.path().join("model.bin").is_file());
        assert!(dir.path().join("optimizer.bin").is_file());
    }

    #[test]
    fn missing_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut segmenter = segmenter();

        let missing = dir.path().join("nope");
        assert!(matches!(
            segmenter.load_checkpoint(&missing),
            Err(TrainError::CheckpointNotFound(_))
        ));
        // Directory without a model record.
        assert!(matches!(
            segmenter.load_checkpoint(dir.path()),
            Err(TrainError::CheckpointNotFound(_))
        ));
    }

    #[test]
    fn unreadable_model_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        segmenter().save_checkpoint(dir.path()).unwrap();
        std::fs::write(dir.path().join("model.bin"), b"not a record").unwrap();

        let mut target = segmenter();
        assert!(matches!(
            target.load_checkpoint(dir.path()),
            Err(TrainError::Checkpoint { .. })
        ));
    }

    #[test]
    fn missing_optimizer_state_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let source = segmenter();
        source.save_checkpoint(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join("optimizer.bin")).unwrap();

        let mut target = segmenter();
        assert!(target.load_checkpoint(dir.path()).is_ok());
    }
}
