use burn::{config::Config, module::Module, prelude::Backend, tensor::Tensor};

use crate::conv_block::{ConvBlock, ConvBlockConfig};
use crate::feature_maps::FeatureMaps;
use crate::norm::ForwardMode;

#[derive(Config, Debug)]
pub struct DenseBlockConfig {
    pub in_channels: usize,
    pub layers: usize,
    pub growth_rate: usize,
    /// Whether the returned filter count grows with each layer. Decoder blocks keep it fixed.
    #[config(default = true)]
    pub grow_filters: bool,
    #[config(default = 0.1)]
    pub momentum: f64,
    #[config(default = 1e-3)]
    pub epsilon: f64,
    #[config(default = 0.2)]
    pub dropout: f64,
}

impl DenseBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DenseBlock<B> {
        let layers = (0..self.layers)
            .map(|i| {
                ConvBlockConfig::new(self.in_channels + i * self.growth_rate, self.growth_rate)
                    .with_momentum(self.momentum)
                    .with_epsilon(self.epsilon)
                    .with_dropout(self.dropout)
                    .init(device)
            })
            .collect();

        DenseBlock {
            layers,
            growth_rate: self.growth_rate,
            grow_filters: self.grow_filters,
        }
    }
}

#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    layers: Vec<ConvBlock<B>>,
    growth_rate: usize,
    grow_filters: bool,
}

#[derive(Debug, Clone)]
pub struct DenseBlockOutput<B: Backend> {
    /// Block input with every grown map concatenated onto it.
    pub output: Tensor<B, 4>,
    pub filters: usize,
    pub feature_maps: FeatureMaps<B>,
}

impl<B: Backend> DenseBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>, filters: usize, mode: ForwardMode) -> DenseBlockOutput<B> {
        let mut feature_maps = FeatureMaps::new(x.clone());
        let mut x = x;
        let mut filters = filters;

        for layer in &self.layers {
            let grown = layer.forward(x.clone(), mode);
            feature_maps.push(grown.clone());
            x = Tensor::cat(vec![x, grown], 1);
            if self.grow_filters {
                filters += self.growth_rate;
            }
        }

        DenseBlockOutput {
            output: x,
            filters,
            feature_maps,
        }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}
