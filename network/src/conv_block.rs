use burn::{
    config::Config,
    module::Module,
    nn::{
        Dropout, DropoutConfig, PaddingConfig2d,
        conv::{Conv2d, Conv2dConfig},
    },
    prelude::Backend,
    tensor::{Tensor, activation::relu},
};

use crate::norm::{ChannelNorm, ChannelNormConfig, ForwardMode};

#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    pub in_channels: usize,
    /// Output channels, the growth rate of the enclosing dense block.
    pub out_channels: usize,
    #[config(default = 0.1)]
    pub momentum: f64,
    #[config(default = 1e-3)]
    pub epsilon: f64,
    #[config(default = 0.2)]
    pub dropout: f64,
}

impl ConvBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBlock<B> {
        ConvBlock {
            norm: ChannelNormConfig::new(self.in_channels)
                .with_momentum(self.momentum)
                .with_epsilon(self.epsilon)
                .init(device),
            conv: Conv2dConfig::new([self.in_channels, self.out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .with_bias(false)
                .init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Batch norm, ReLU, 3x3 same convolution, dropout.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    norm: ChannelNorm<B>,
    conv: Conv2d<B>,
    dropout: Dropout,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>, mode: ForwardMode) -> Tensor<B, 4> {
        let x = relu(self.norm.forward(x, mode));
        let x = self.conv.forward(x);
        match mode {
            ForwardMode::Train => self.dropout.forward(x),
            ForwardMode::Inference => x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn outputs_growth_rate_channels_at_same_size() {
        let device = Default::default();
        let block = ConvBlockConfig::new(5, 3).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::ones([2, 5, 8, 6], &device);

        for mode in [ForwardMode::Train, ForwardMode::Inference] {
            assert_eq!(block.forward(x.clone(), mode).dims(), [2, 3, 8, 6]);
        }
    }
}
