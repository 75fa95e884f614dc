use burn::{
    module::Module,
    nn::{
        PaddingConfig2d,
        conv::{Conv2d, Conv2dConfig},
    },
    prelude::Backend,
    tensor::{
        Tensor,
        activation::{relu, softmax},
    },
};

use crate::config::NetworkConfig;
use crate::dense_block::{DenseBlock, DenseBlockConfig, DenseBlockOutput};
use crate::error::{NetworkError, Result};
use crate::norm::{ChannelNorm, ChannelNormConfig, ForwardMode};
use crate::transition::{TransitionDown, TransitionDownConfig, TransitionUp, TransitionUpConfig};

#[derive(Module, Debug)]
pub struct EncoderStage<B: Backend> {
    dense: DenseBlock<B>,
    down: TransitionDown<B>,
}

#[derive(Module, Debug)]
pub struct DecoderStage<B: Backend> {
    up: TransitionUp<B>,
    dense: DenseBlock<B>,
}

/// Fully convolutional DenseNet for per-pixel classification.
///
/// Takes `[batch, channels, height, width]` images and returns
/// `[batch, height, width, classes]` probabilities.
#[derive(Module, Debug)]
pub struct FcDenseNet<B: Backend> {
    stem: Conv2d<B>,
    stem_norm: ChannelNorm<B>,
    encoder: Vec<EncoderStage<B>>,
    bottleneck: DenseBlock<B>,
    decoder: Vec<DecoderStage<B>>,
    head: Conv2d<B>,
    input_channels: usize,
    num_classes: usize,
    initial_filters: usize,
    growth_rate: usize,
    size_factor: usize,
    weight_decay: f64,
}

impl NetworkConfig {
    /// Builds the network. Fails if the configuration is invalid, in particular when
    /// an explicit layer list does not have `dense_blocks + 1` entries.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<FcDenseNet<B>> {
        self.validate()?;
        let schedule = self.schedule()?;
        let plan = self.channel_plan()?;
        log::info!("Layers in each dense block: {:?}", schedule.as_slice());

        let momentum = self.burn_bn_momentum();
        let dense = |in_channels: usize, layers: usize, grow_filters: bool| {
            DenseBlockConfig::new(in_channels, layers, self.growth_rate)
                .with_grow_filters(grow_filters)
                .with_momentum(momentum)
                .with_epsilon(self.bn_epsilon)
                .with_dropout(self.dropout)
                .init(device)
        };

        let stem = Conv2dConfig::new([self.input_channels, plan.stem], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .with_bias(false)
            .init(device);
        let stem_norm = ChannelNormConfig::new(plan.stem)
            .with_momentum(momentum)
            .with_epsilon(self.bn_epsilon)
            .init(device);

        let encoder = plan
            .encoder
            .iter()
            .map(|stage| EncoderStage {
                dense: dense(stage.input, stage.layers, true),
                down: TransitionDownConfig::new(stage.output)
                    .with_momentum(momentum)
                    .with_epsilon(self.bn_epsilon)
                    .with_weight_decay(self.weight_decay)
                    .init(device),
            })
            .collect::<Vec<_>>();
        log::info!("Number of skip connections: {}", encoder.len());

        let bottleneck = dense(plan.bottleneck_input, schedule.bottleneck(), true);

        let decoder = plan
            .decoder
            .iter()
            .map(|stage| DecoderStage {
                up: TransitionUpConfig::new(stage.upsample_in, stage.upsample_out)
                    .with_weight_decay(self.weight_decay)
                    .init(device),
                dense: dense(stage.input, stage.layers, false),
            })
            .collect();

        let head = Conv2dConfig::new([plan.head_input, self.num_classes], [1, 1])
            .with_padding(PaddingConfig2d::Same)
            .with_bias(false)
            .init(device);

        Ok(FcDenseNet {
            stem,
            stem_norm,
            encoder,
            bottleneck,
            decoder,
            head,
            input_channels: self.input_channels,
            num_classes: self.num_classes,
            initial_filters: self.initial_filters,
            growth_rate: self.growth_rate,
            size_factor: self.size_factor(),
            weight_decay: self.weight_decay,
        })
    }
}

impl<B: Backend> FcDenseNet<B> {
    /// Per-pixel class probabilities, channels last.
    ///
    /// Height and width must be multiples of [`Self::size_factor`], see [`Self::check_input`].
    pub fn forward(&self, input: Tensor<B, 4>, mode: ForwardMode) -> Tensor<B, 4> {
        let logits = self.forward_logits(input, mode);
        // NCHW -> NHWC so the softmax runs over the last axis.
        softmax(logits.permute([0, 2, 3, 1]), 3)
    }

    /// Channels-first logits before the softmax head.
    pub fn forward_logits(&self, input: Tensor<B, 4>, mode: ForwardMode) -> Tensor<B, 4> {
        let x = self.stem.forward(input);
        let mut x = relu(self.stem_norm.forward(x, mode));
        let mut filters = self.initial_filters;

        let mut skips = Vec::with_capacity(self.encoder.len());
        for stage in &self.encoder {
            let block = stage.dense.forward(x, filters, mode);
            filters = block.filters;
            skips.push(block.output.clone());
            x = stage.down.forward(block.output, mode);
        }

        let mut feature_maps = self.bottleneck.forward(x, filters, mode).feature_maps;

        // Most recently encoded skip first.
        for (stage, skip) in self.decoder.iter().zip(skips.into_iter().rev()) {
            let up = stage.up.forward(feature_maps.concat_grown());
            let x = Tensor::cat(vec![up, skip], 1);
            feature_maps = self.decoder_block(stage, x, mode).feature_maps;
        }

        self.head.forward(feature_maps.concat_grown())
    }

    /// Decoder blocks keep their filter count at the growth rate.
    fn decoder_block(
        &self,
        stage: &DecoderStage<B>,
        x: Tensor<B, 4>,
        mode: ForwardMode,
    ) -> DenseBlockOutput<B> {
        stage.dense.forward(x, self.growth_rate, mode)
    }

    /// Sum of the L2 penalties of the stem, transition down and transition up kernels.
    pub fn regularization_loss(&self) -> Tensor<B, 1> {
        let stem = self.stem.weight.val().powi_scalar(2).sum() * self.weight_decay;
        let down = self.encoder.iter().map(|stage| stage.down.l2_penalty());
        let up = self.decoder.iter().map(|stage| stage.up.l2_penalty());
        down.chain(up).fold(stem, |acc, penalty| acc + penalty)
    }

    /// Checks that an NCHW shape can run through the network and come back at the same size.
    pub fn check_input(&self, dims: [usize; 4]) -> Result<()> {
        let [batch, channels, height, width] = dims;
        if batch == 0 {
            return Err(NetworkError::invalid_input("a non-empty batch", "batch of 0"));
        }
        if channels != self.input_channels {
            return Err(NetworkError::invalid_input(
                format!("{} input channels", self.input_channels),
                format!("{channels} channels"),
            ));
        }
        if height == 0
            || width == 0
            || height % self.size_factor != 0
            || width % self.size_factor != 0
        {
            return Err(NetworkError::invalid_input(
                format!("height and width multiples of {}", self.size_factor),
                format!("{height}x{width}"),
            ));
        }
        Ok(())
    }

    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn size_factor(&self) -> usize {
        self.size_factor
    }

    pub fn dense_blocks(&self) -> usize {
        self.encoder.len()
    }
}
