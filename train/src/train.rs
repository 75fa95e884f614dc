use burn::{
    module::Module,
    optim::{Adam, GradientsAccumulator, GradientsParams, Optimizer, adaptor::OptimizerAdaptor},
    tensor::{ElementConversion, Tensor, backend::AutodiffBackend},
};
use network::{FcDenseNet, ForwardMode, NetworkConfig};
use tracing::trace_span;

use crate::{
    batch::SegmentationBatch,
    config::TrainConfig,
    error::{Result, TrainError},
    loss::CategoricalCrossEntropy,
    metrics::{PredictionMetric, ScalarMetric},
    replica::ReplicaGroup,
};

pub(crate) type OptimizerType<B> = OptimizerAdaptor<Adam, FcDenseNet<B>, B>;

pub(crate) fn create_default_optimizer<B: AutodiffBackend>(
    config: &TrainConfig,
) -> OptimizerType<B> {
    config.adam().init()
}

/// Owns an FC-DenseNet together with its optimizer and loss, and runs single train
/// and test steps on it.
pub struct Segmenter<B: AutodiffBackend> {
    pub(crate) config: TrainConfig,
    pub(crate) network: NetworkConfig,
    pub(crate) model: FcDenseNet<B>,
    pub(crate) optim: OptimizerType<B>,
    pub(crate) loss: CategoricalCrossEntropy,
    learning_rate: f64,
    pub(crate) device: B::Device,
}

impl<B: AutodiffBackend> Segmenter<B> {
    /// Builds the default FCDenseNet56 for the configured channels and classes.
    pub fn new(config: &TrainConfig, device: &B::Device) -> Result<Self> {
        let network = NetworkConfig::fc_densenet56(config.input_channels, config.num_classes);
        Self::with_network(config, network, device)
    }

    pub fn with_network(
        config: &TrainConfig,
        network: NetworkConfig,
        device: &B::Device,
    ) -> Result<Self> {
        if let Some(seed) = config.seed {
            B::seed(seed);
        }
        let model = network.init(device)?;
        log::info!(
            "Created {} with {} parameters",
            network.name,
            model.num_params()
        );
        Self::from_model(config, network, model, device)
    }

    /// Wraps an existing model with a fresh optimizer.
    pub fn from_model(
        config: &TrainConfig,
        network: NetworkConfig,
        model: FcDenseNet<B>,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;
        if network.input_channels != config.input_channels
            || network.num_classes != config.num_classes
        {
            return Err(TrainError::InvalidConfig(format!(
                "network expects {} channels and {} classes, training config has {} and {}",
                network.input_channels,
                network.num_classes,
                config.input_channels,
                config.num_classes
            )));
        }

        Ok(Self {
            config: config.clone(),
            network,
            model,
            optim: create_default_optimizer(config),
            loss: CategoricalCrossEntropy::new(config.label_smoothing),
            learning_rate: config.learning_rate,
            device: device.clone(),
        })
    }

    pub fn model(&self) -> &FcDenseNet<B> {
        &self.model
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn network_config(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    /// Receptive field radius of the current weights, see [`FcDenseNet::estimate_radius`].
    pub fn estimate_radius(&self) -> usize {
        let _span = trace_span!("Estimate radius").entered();
        self.model.estimate_radius(self.network.radius, &self.device)
    }

    pub(crate) fn check_batch(&self, batch: &SegmentationBatch<B>) -> Result<()> {
        self.model.check_input(batch.images.dims())?;
        batch.check_labels(self.config.num_classes)
    }

    /// Forward pass in training mode. Returns the shard loss and the predicted probabilities.
    fn forward_loss(&self, batch: &SegmentationBatch<B>) -> (Tensor<B, 1>, Tensor<B, 4>) {
        let probs = trace_span!("Forward pass", sync_burn = true)
            .in_scope(|| self.model.forward(batch.images.clone(), ForwardMode::Train));

        let loss = trace_span!("Calculate losses", sync_burn = true).in_scope(|| {
            self.loss.forward(
                probs.clone(),
                batch.labels.clone(),
                self.config.global_batch_size,
            )
        });
        (loss, probs)
    }

    /// What gets differentiated: the data loss, plus the kernel L2 penalty if enabled.
    fn objective(&self, loss: Tensor<B, 1>) -> Tensor<B, 1> {
        if self.config.apply_weight_decay {
            loss + self.model.regularization_loss()
        } else {
            loss
        }
    }

    fn gradients(&self, loss: Tensor<B, 1>) -> GradientsParams {
        let objective = self.objective(loss);
        let grads = trace_span!("Backward pass", sync_burn = true).in_scope(|| objective.backward());
        GradientsParams::from_grads(grads, &self.model)
    }

    fn apply_gradients(&mut self, grads: GradientsParams) {
        let _span = trace_span!("Optimizer step", sync_burn = true).entered();
        self.model = self
            .optim
            .step(self.learning_rate, self.model.clone(), grads);
    }

    fn update_metrics<L, A>(
        probs: Tensor<B, 4>,
        batch: &SegmentationBatch<B>,
        loss: f32,
        loss_metric: &mut L,
        accuracy: &mut A,
    ) where
        L: ScalarMetric,
        A: PredictionMetric<B::InnerBackend>,
    {
        loss_metric.update(loss);
        accuracy.update(&probs.inner(), &batch.labels.clone().inner());
    }

    /// One optimizer update on a batch.
    ///
    /// The returned loss is the data loss normalized by the global batch size; the
    /// weight decay penalty, when enabled, is only part of what gets differentiated.
    pub fn train_step<L, A>(
        &mut self,
        batch: &SegmentationBatch<B>,
        loss_metric: &mut L,
        accuracy: &mut A,
    ) -> Result<f32>
    where
        L: ScalarMetric,
        A: PredictionMetric<B::InnerBackend>,
    {
        self.check_batch(batch)?;

        let (loss, probs) = self.forward_loss(batch);
        let value = loss.clone().into_scalar().elem::<f32>();
        let grads = self.gradients(loss);
        self.apply_gradients(grads);

        Self::update_metrics(probs, batch, value, loss_metric, accuracy);
        Ok(value)
    }

    /// Train step over one shard per replica.
    ///
    /// Gradients of all shards are summed into a single optimizer update. Returns the sum
    /// of the per-replica losses.
    pub fn dist_train_step<L, A>(
        &mut self,
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
        for shard in shards {
            self.check_batch(shard)?;
        }

        let mut accumulator = GradientsAccumulator::new();
        let mut losses = Vec::with_capacity(shards.len());
        for shard in shards {
            let (loss, probs) = self.forward_loss(shard);
            let value = loss.clone().into_scalar().elem::<f32>();
            accumulator.accumulate(&self.model, self.gradients(loss));

            Self::update_metrics(probs, shard, value, loss_metric, accuracy);
            losses.push(value);
        }
        self.apply_gradients(accumulator.grads());

        group.reduce_sum(&losses)
    }
}
