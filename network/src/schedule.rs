use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, Result};

/// Number of conv blocks in each dense block.
///
/// `Uniform(n)` uses `n` layers in every encoder, bottleneck and decoder block.
/// `PerBlock` lists one entry per encoder block followed by the bottleneck; the
/// decoder mirrors the encoder entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayersPerBlock {
    Uniform(usize),
    PerBlock(Vec<usize>),
}

/// The resolved `2 * blocks + 1` entry schedule: encoder blocks, bottleneck, decoder blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSchedule {
    blocks: usize,
    layers: Vec<usize>,
}

impl LayerSchedule {
    pub fn resolve(layers_per_block: &LayersPerBlock, blocks: usize) -> Result<Self> {
        let layers = match layers_per_block {
            LayersPerBlock::Uniform(n) => vec![*n; 2 * blocks + 1],
            LayersPerBlock::PerBlock(list) => {
                if list.len() != blocks + 1 {
                    return Err(NetworkError::InvalidLayerSchedule {
                        expected: blocks + 1,
                        actual: list.len(),
                    });
                }
                // Mirror everything but the bottleneck entry.
                let mut layers = list.clone();
                layers.extend(list.iter().rev().skip(1));
                layers
            }
        };

        if layers.contains(&0) {
            return Err(NetworkError::invalid_config(
                "every dense block needs at least one layer",
            ));
        }

        Ok(Self { blocks, layers })
    }

    pub fn blocks(&self) -> usize {
        self.blocks
    }

    pub fn encoder(&self, stage: usize) -> usize {
        self.layers[stage]
    }

    pub fn bottleneck(&self) -> usize {
        self.layers[self.blocks]
    }

    pub fn decoder(&self, stage: usize) -> usize {
        self.layers[self.blocks + 1 + stage]
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.layers
    }
}

/// Channel counts of one encoder stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderChannels {
    pub layers: usize,
    pub input: usize,
    /// Dense block output, which is also the skip connection width.
    pub output: usize,
}

/// Channel counts of one decoder stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderChannels {
    pub layers: usize,
    /// New feature maps of the previous dense block fed to the transition up.
    pub upsample_in: usize,
    /// `growth_rate * layers` of the previous dense block.
    pub upsample_out: usize,
    pub skip: usize,
    /// Dense block input: transition up output concatenated with the skip.
    pub input: usize,
    /// Channels this block grows, which is all the next stage sees.
    pub grown: usize,
}

/// Static channel bookkeeping for the whole topology. Burn layers need their input
/// width at construction time, so this is computed before any tensor exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPlan {
    pub stem: usize,
    pub encoder: Vec<EncoderChannels>,
    pub bottleneck_input: usize,
    pub bottleneck_grown: usize,
    pub decoder: Vec<DecoderChannels>,
    pub head_input: usize,
}

impl ChannelPlan {
    pub fn new(schedule: &LayerSchedule, initial_filters: usize, growth_rate: usize) -> Self {
        let mut filters = initial_filters;
        let mut encoder = Vec::with_capacity(schedule.blocks());
        for stage in 0..schedule.blocks() {
            let layers = schedule.encoder(stage);
            let input = filters;
            filters += layers * growth_rate;
            encoder.push(EncoderChannels {
                layers,
                input,
                output: filters,
            });
        }

        let bottleneck_input = filters;
        let mut grown = schedule.bottleneck() * growth_rate;
        let bottleneck_grown = grown;

        let mut decoder = Vec::with_capacity(schedule.blocks());
        for (stage, skip) in encoder.iter().rev().enumerate() {
            let layers = schedule.decoder(stage);
            let upsample_out = growth_rate * schedule.as_slice()[schedule.blocks() + stage];
            let input = upsample_out + skip.output;
            let stage_grown = layers * growth_rate;
            decoder.push(DecoderChannels {
                layers,
                upsample_in: grown,
                upsample_out,
                skip: skip.output,
                input,
                grown: stage_grown,
            });
            grown = stage_grown;
        }

        Self {
            stem: initial_filters,
            encoder,
            bottleneck_input,
            bottleneck_grown,
            decoder,
            head_input: grown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_schedule_is_replicated() {
        let schedule = LayerSchedule::resolve(&LayersPerBlock::Uniform(4), 5).unwrap();
        assert_eq!(schedule.as_slice(), &[4; 11]);
        assert_eq!(schedule.bottleneck(), 4);
    }

    #[test]
    fn per_block_schedule_is_mirrored() {
        let layers = LayersPerBlock::PerBlock(vec![4, 5, 7, 10, 12, 15]);
        let schedule = LayerSchedule::resolve(&layers, 5).unwrap();
        assert_eq!(
            schedule.as_slice(),
            &[4, 5, 7, 10, 12, 15, 12, 10, 7, 5, 4]
        );
        assert_eq!(schedule.encoder(0), 4);
        assert_eq!(schedule.bottleneck(), 15);
        assert_eq!(schedule.decoder(0), 12);
        assert_eq!(schedule.decoder(4), 4);
    }

    #[test]
    fn per_block_schedule_length_is_checked() {
        for list in [vec![4, 5, 7], vec![4, 5, 7, 10, 12, 15, 16]] {
            let actual = list.len();
            let err = LayerSchedule::resolve(&LayersPerBlock::PerBlock(list), 5).unwrap_err();
            assert_eq!(
                err,
                NetworkError::InvalidLayerSchedule {
                    expected: 6,
                    actual
                }
            );
        }
    }

    #[test]
    fn empty_blocks_are_rejected() {
        assert!(LayerSchedule::resolve(&LayersPerBlock::Uniform(0), 2).is_err());
        assert!(LayerSchedule::resolve(&LayersPerBlock::PerBlock(vec![1, 0, 1]), 2).is_err());
    }

    #[test]
    fn fc_densenet103_channel_plan() {
        let layers = LayersPerBlock::PerBlock(vec![4, 5, 7, 10, 12, 15]);
        let schedule = LayerSchedule::resolve(&layers, 5).unwrap();
        let plan = ChannelPlan::new(&schedule, 48, 16);

        let skips: Vec<_> = plan.encoder.iter().map(|s| s.output).collect();
        assert_eq!(skips, vec![112, 192, 304, 464, 656]);
        assert_eq!(plan.bottleneck_input, 656);
        assert_eq!(plan.bottleneck_grown, 240);

        let upsample: Vec<_> = plan.decoder.iter().map(|s| s.upsample_out).collect();
        assert_eq!(upsample, vec![240, 192, 160, 112, 80]);
        let inputs: Vec<_> = plan.decoder.iter().map(|s| s.input).collect();
        assert_eq!(inputs, vec![896, 656, 464, 304, 192]);
        assert_eq!(plan.head_input, 64);
    }

    #[test]
    fn transition_up_sees_previous_block_growth() {
        let schedule = LayerSchedule::resolve(&LayersPerBlock::Uniform(3), 2).unwrap();
        let plan = ChannelPlan::new(&schedule, 8, 4);
        for stage in &plan.decoder {
            assert_eq!(stage.upsample_in, stage.upsample_out);
        }
        assert_eq!(plan.head_input, 12);
    }
}
