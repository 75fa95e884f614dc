use burn::{prelude::Backend, tensor::Tensor};

/// Probabilities are clipped to `[EPSILON, 1 - EPSILON]` before the log.
const EPSILON: f32 = 1e-7;

/// Cross entropy between channels-last class probabilities and one-hot labels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoricalCrossEntropy {
    label_smoothing: f32,
}

impl CategoricalCrossEntropy {
    pub fn new(label_smoothing: f32) -> Self {
        Self { label_smoothing }
    }

    pub fn label_smoothing(&self) -> f32 {
        self.label_smoothing
    }

    /// Loss of every pixel, `[batch, height, width, classes]` to `[batch, height, width]`.
    pub fn per_pixel<B: Backend>(&self, probs: Tensor<B, 4>, labels: Tensor<B, 4>) -> Tensor<B, 3> {
        let [_, _, _, classes] = labels.dims();
        let labels = if self.label_smoothing > 0.0 {
            labels * (1.0 - self.label_smoothing) + self.label_smoothing / classes as f32
        } else {
            labels
        };

        let probs = probs.clone() / probs.sum_dim(3);
        let log_probs = probs.clamp(EPSILON, 1.0 - EPSILON).log();
        (labels * log_probs).sum_dim(3).squeeze::<3>(3).neg()
    }

    /// Scalar loss of one replica's shard, normalized by the batch size over all replicas.
    pub fn forward<B: Backend>(
        &self,
        probs: Tensor<B, 4>,
        labels: Tensor<B, 4>,
        global_batch_size: usize,
    ) -> Tensor<B, 1> {
        reduce_batch_loss(self.per_pixel(probs, labels), global_batch_size)
    }
}

/// Sums the per-pixel loss over the batch axis, divides by `global_batch_size` and averages
/// what is left over the image.
pub fn reduce_batch_loss<B: Backend>(per_pixel: Tensor<B, 3>, global_batch_size: usize) -> Tensor<B, 1> {
    (per_pixel.sum_dim(0) / global_batch_size as f32).mean()
}
