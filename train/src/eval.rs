use burn::{
    module::AutodiffModule,
    tensor::{ElementConversion, backend::AutodiffBackend},
};
use network::ForwardMode;
use tracing::trace_span;

use crate::{
    batch::SegmentationBatch,
    error::Result,
    metrics::{PredictionMetric, ScalarMetric},
    replica::ReplicaGroup,
    train::Segmenter,
};

impl<B: AutodiffBackend> Segmenter<B> {
    /// Loss of a batch in inference mode, without touching the weights.
    pub fn test_step<L, A>(
        &self,
        batch: &SegmentationBatch<B>,
        loss_metric: &mut L,
        accuracy: &mut A,
    ) -> Result<f32>
    where
        L: ScalarMetric,
        A: PredictionMetric<B::InnerBackend>,
    {
        self.check_batch(batch)?;

        let model = self.model.valid();
        let images = batch.images.clone().inner();
        let labels = batch.labels.clone().inner();

        let probs = trace_span!("Eval forward", sync_burn = true)
            .in_scope(|| model.forward(images, ForwardMode::Inference));
        let loss = self
            .loss
            .forward(probs.clone(), labels.clone(), self.config.global_batch_size)
            .into_scalar()
            .elem::<f32>();

        loss_metric.update(loss);
        accuracy.update(&probs, &labels);
        Ok(loss)
    }

    /// Test step over one shard per replica, returning the summed loss.
    pub fn dist_test_step<L, A>(
        &self,
        group: &ReplicaGroup,
        shards: &[SegmentationBatch<B>],
        loss_metric: &mut L,
        accuracy: &mut A,
    ) -> Result<f32>
    where
        L: ScalarMetric,
        A: PredictionMetric<B::InnerBackend>,
    {
        group.check_shards(shards.len())?;
        let losses = shards
            .iter()
            .map(|shard| self.test_step(shard, loss_metric, accuracy))
            .collect::<Result<Vec<_>>>()?;
        group.reduce_sum(&losses)
    }
}

#[cfg(test)]
mod tests {
    use crate::metrics::{CategoricalAccuracy, MeanMetric};
    use crate::{ReplicaGroup, SegmentationBatch, Segmenter, TrainConfig, TrainError};
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::{Distribution, Tensor};
    use network::{LayersPerBlock, NetworkConfig};

    type TestBackend = Autodiff<NdArray<f32>>;

    fn segmenter(global_batch_size: usize) -> Segmenter<TestBackend> {
        let network = NetworkConfig::new(2, 3)
            .with_dense_blocks(2)
            .with_layers_per_block(LayersPerBlock::Uniform(1))
            .with_growth_rate(2)
            .with_initial_filters(4);
        let config = TrainConfig::new(3, global_batch_size, 2);
        Segmenter::with_network(&config, network, &Default::default()).unwrap()
    }

    fn batch(size: usize) -> SegmentationBatch<TestBackend> {
        let device = Default::default();
        let images = Tensor::random([size, 2, 8, 8], Distribution::Normal(0.0, 1.0), &device);
        let labels = Tensor::<TestBackend, 4>::zeros([size, 8, 8, 3], &device)
            .slice_assign(
                [0..size, 0..8, 0..8, 1..2],
                Tensor::ones([size, 8, 8, 1], &device),
            );
        SegmentationBatch::new(images, labels)
    }

    #[test]
    fn test_step_is_deterministic() {
        let segmenter = segmenter(2);
        let batch = batch(2);
        let mut loss_metric = MeanMetric::new();
        let mut accuracy = CategoricalAccuracy::new();

        let first = segmenter
            .test_step(&batch, &mut loss_metric, &mut accuracy)
            .unwrap();
        let second = segmenter
            .test_step(&batch, &mut loss_metric, &mut accuracy)
            .unwrap();

        assert!(first > 0.0);
        assert_eq!(first, second);
        assert_eq!(loss_metric.count(), 2);
    }

    #[test]
    fn dist_test_step_on_identical_shards_scales_with_replicas() {
        let segmenter = segmenter(2);
        let shard = batch(2);
        let single = segmenter
            .test_step(&shard, &mut MeanMetric::new(), &mut CategoricalAccuracy::new())
            .unwrap();

        for replicas in [1, 2, 4] {
            let group = ReplicaGroup::new(replicas).unwrap();
            let shards = vec![shard.clone(); replicas];
            let total = segmenter
                .dist_test_step(
                    &group,
                    &shards,
                    &mut MeanMetric::new(),
                    &mut CategoricalAccuracy::new(),
                )
                .unwrap();
            assert!((total - replicas as f32 * single).abs() < 1e-4 * replicas as f32);
        }
    }

    #[test]
    fn dist_test_step_needs_one_shard_per_replica() {
        let segmenter = segmenter(2);
        let group = ReplicaGroup::new(3).unwrap();
        let shards = vec![batch(2); 2];
        let result = segmenter.dist_test_step(
            &group,
            &shards,
            &mut MeanMetric::new(),
            &mut CategoricalAccuracy::new(),
        );
        assert!(matches!(
            result,
            Err(TrainError::ReplicaMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn larger_global_batch_halves_the_loss() {
        let shard = batch(2);
        let small = segmenter(2);
        let loss = small
            .test_step(&shard, &mut MeanMetric::new(), &mut CategoricalAccuracy::new())
            .unwrap();

        // Same weights, twice the global batch size.
        let config = TrainConfig::new(3, 4, 2);
        let large = Segmenter::from_model(
            &config,
            small.network_config().clone(),
            small.model().clone(),
            &Default::default(),
        )
        .unwrap();
        let halved = large
            .test_step(&shard, &mut MeanMetric::new(), &mut CategoricalAccuracy::new())
            .unwrap();
        assert!((loss - 2.0 * halved).abs() < 1e-5);
    }
}
