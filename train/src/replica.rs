use burn::{prelude::Backend, tensor::Tensor};

use crate::batch::SegmentationBatch;
use crate::error::{Result, TrainError};

/// A data-parallel group of replicas sharing one model.
///
/// Every replica gets an equal shard of the global batch. Per-replica losses are
/// combined with a plain sum since each one is already normalized by the global batch size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaGroup {
    replicas: usize,
}

impl Default for ReplicaGroup {
    fn default() -> Self {
        Self { replicas: 1 }
    }
}

impl ReplicaGroup {
    pub fn new(replicas: usize) -> Result<Self> {
        if replicas == 0 {
            return Err(TrainError::InvalidConfig(
                "a replica group needs at least one replica".into(),
            ));
        }
        Ok(Self { replicas })
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Splits along the batch axis into one equal shard per replica.
    pub fn split<B: Backend, const D: usize>(&self, tensor: Tensor<B, D>) -> Result<Vec<Tensor<B, D>>> {
        let batch = tensor.dims()[0];
        if batch == 0 || batch % self.replicas != 0 {
            return Err(TrainError::UnevenSplit {
                batch,
                replicas: self.replicas,
            });
        }

        let shard = batch / self.replicas;
        Ok((0..self.replicas)
            .map(|i| tensor.clone().narrow(0, i * shard, shard))
            .collect())
    }

    pub fn split_batch<B: Backend>(
        &self,
        batch: &SegmentationBatch<B>,
    ) -> Result<Vec<SegmentationBatch<B>>> {
        let images = self.split(batch.images.clone())?;
        let labels = self.split(batch.labels.clone())?;
        Ok(images
            .into_iter()
            .zip(labels)
            .map(|(images, labels)| SegmentationBatch::new(images, labels))
            .collect())
    }

    /// Sum of one value per replica.
    pub fn reduce_sum(&self, values: &[f32]) -> Result<f32> {
        self.check_shards(values.len())?;
        Ok(values.iter().sum())
    }

    pub(crate) fn check_shards(&self, shards: usize) -> Result<()> {
        if shards != self.replicas {
            return Err(TrainError::ReplicaMismatch {
                expected: self.replicas,
                actual: shards,
            });
        }
        Ok(())
    }
}
