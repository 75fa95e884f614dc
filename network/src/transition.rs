use burn::{
    config::Config,
    module::Module,
    nn::{
        PaddingConfig2d,
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
    },
    prelude::Backend,
    tensor::{Tensor, activation::relu},
};

use crate::norm::{ChannelNorm, ChannelNormConfig, ForwardMode};

#[derive(Config, Debug)]
pub struct TransitionDownConfig {
    pub channels: usize,
    #[config(default = 0.1)]
    pub momentum: f64,
    #[config(default = 1e-3)]
    pub epsilon: f64,
    #[config(default = 1e-4)]
    pub weight_decay: f64,
}

impl TransitionDownConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TransitionDown<B> {
        TransitionDown {
            norm: ChannelNormConfig::new(self.channels)
                .with_momentum(self.momentum)
                .with_epsilon(self.epsilon)
                .init(device),
            conv: Conv2dConfig::new([self.channels, self.channels], [1, 1])
                .with_padding(PaddingConfig2d::Same)
                .with_bias(false)
                .init(device),
            weight_decay: self.weight_decay,
        }
    }
}

/// Batch norm, ReLU, 1x1 convolution and a 2x2 max pool halving height and width.
#[derive(Module, Debug)]
pub struct TransitionDown<B: Backend> {
    norm: ChannelNorm<B>,
    conv: Conv2d<B>,
    weight_decay: f64,
}

impl<B: Backend> TransitionDown<B> {
    /// Height and width must be even; the pool floors odd sizes.
    pub fn forward(&self, x: Tensor<B, 4>, mode: ForwardMode) -> Tensor<B, 4> {
        let x = relu(self.norm.forward(x, mode));
        max_pool_2x2(self.conv.forward(x))
    }

    pub fn l2_penalty(&self) -> Tensor<B, 1> {
        self.conv.weight.val().powi_scalar(2).sum() * self.weight_decay
    }
}

/// 2x2 max pool with stride 2, built from a reshape and two reductions.
///
/// The backward pass comes from `max_dim`, so the gradient lands on the window maxima for
/// any height and width. A trailing odd row or column is dropped.
fn max_pool_2x2<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    let [n, c, h, w] = x.dims();
    let (h, w) = (h / 2, w / 2);
    x.slice([0..n, 0..c, 0..2 * h, 0..2 * w])
        .reshape([n, c, h, 2, w, 2])
        .max_dim(5)
        .max_dim(3)
        .reshape([n, c, h, w])
}

#[derive(Config, Debug)]
pub struct TransitionUpConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    #[config(default = 1e-4)]
    pub weight_decay: f64,
}

impl TransitionUpConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TransitionUp<B> {
        // Padding 1 plus one row/column of output padding gives exactly 2x.
        TransitionUp {
            conv: ConvTranspose2dConfig::new([self.in_channels, self.out_channels], [3, 3])
                .with_stride([2, 2])
                .with_padding([1, 1])
                .with_padding_out([1, 1])
                .init(device),
            weight_decay: self.weight_decay,
        }
    }
}

/// Stride 2 transposed convolution with ReLU, doubling height and width.
#[derive(Module, Debug)]
pub struct TransitionUp<B: Backend> {
    conv: ConvTranspose2d<B>,
    weight_decay: f64,
}

impl<B: Backend> TransitionUp<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.conv.forward(x))
    }

    pub fn l2_penalty(&self) -> Tensor<B, 1> {
        self.conv.weight.val().powi_scalar(2).sum() * self.weight_decay
    }
}
