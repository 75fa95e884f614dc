use burn::{
    config::Config,
    module::Module,
    nn::{BatchNorm, BatchNormConfig},
    prelude::Backend,
    tensor::Tensor,
};

/// Whether layers behave as during training or during inference.
///
/// Burn switches batch norm and dropout on whether the backend tracks gradients.
/// The receptive field estimate needs input gradients with inference behavior, so
/// the mode is passed explicitly instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    Train,
    Inference,
}

#[derive(Config, Debug)]
pub struct ChannelNormConfig {
    pub channels: usize,
    /// Burn momentum, i.e. the weight of the new batch statistics.
    #[config(default = 0.1)]
    pub momentum: f64,
    #[config(default = 1e-3)]
    pub epsilon: f64,
}

impl ChannelNormConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ChannelNorm<B> {
        ChannelNorm {
            inner: BatchNormConfig::new(self.channels)
                .with_momentum(self.momentum)
                .with_epsilon(self.epsilon)
                .init(device),
        }
    }
}

/// Batch normalization over the channel axis of an NCHW tensor.
#[derive(Module, Debug)]
pub struct ChannelNorm<B: Backend> {
    inner: BatchNorm<B, 2>,
}

impl<B: Backend> ChannelNorm<B> {
    pub fn forward(&self, x: Tensor<B, 4>, mode: ForwardMode) -> Tensor<B, 4> {
        match mode {
            ForwardMode::Train => self.inner.forward(x),
            ForwardMode::Inference => self.forward_running(x),
        }
    }

    fn forward_running(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, channels, _, _] = x.dims();
        let shape = [1, channels, 1, 1];

        let mean = self.inner.running_mean.value().reshape(shape);
        let var = self.inner.running_var.value().reshape(shape);
        let gamma = self.inner.gamma.val().reshape(shape);
        let beta = self.inner.beta.val().reshape(shape);

        (x - mean) / var.add_scalar(self.inner.epsilon).sqrt() * gamma + beta
    }
}
