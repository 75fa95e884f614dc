use burn::prelude::Config;

use crate::error::NetworkError;
use crate::schedule::{ChannelPlan, LayerSchedule, LayersPerBlock};

#[derive(Config, Debug, PartialEq)]
pub struct NetworkConfig {
    /// Channels of the input image.
    pub input_channels: usize,

    /// Number of target classes of the softmax head.
    pub num_classes: usize,

    #[config(default = "String::from(\"FCDenseNet56\")")]
    pub name: String,

    /// Number of encoder (and decoder) dense blocks. Inputs must be multiples of `2^dense_blocks`.
    #[config(default = 5)]
    pub dense_blocks: usize,

    #[config(default = "LayersPerBlock::Uniform(4)")]
    pub layers_per_block: LayersPerBlock,

    /// Channels each conv block adds to its dense block.
    #[config(default = 12)]
    pub growth_rate: usize,

    #[config(default = 48)]
    pub initial_filters: usize,

    /// Weight of the running value when updating batch norm statistics.
    #[config(default = 0.9)]
    pub bn_momentum: f64,

    #[config(default = 1e-3)]
    pub bn_epsilon: f64,

    #[config(default = 0.2)]
    pub dropout: f64,

    /// L2 coefficient of the stem, transition down and transition up kernels.
    #[config(default = 1e-4)]
    pub weight_decay: f64,

    /// Theoretical receptive field radius in pixels.
    #[config(default = 384)]
    pub radius: usize,
}

impl NetworkConfig {
    pub fn fc_densenet56(input_channels: usize, num_classes: usize) -> Self {
        Self::new(input_channels, num_classes)
    }

    pub fn fc_densenet67(input_channels: usize, num_classes: usize) -> Self {
        Self::new(input_channels, num_classes)
            .with_name("FCDenseNet67".into())
            .with_radius(480)
            .with_layers_per_block(LayersPerBlock::Uniform(5))
            .with_growth_rate(16)
    }

    pub fn fc_densenet103(input_channels: usize, num_classes: usize) -> Self {
        Self::new(input_channels, num_classes)
            .with_name("FCDenseNet103".into())
            .with_radius(1120)
            .with_layers_per_block(LayersPerBlock::PerBlock(vec![4, 5, 7, 10, 12, 15]))
            .with_growth_rate(16)
    }

    /// Spatial dimensions must be a multiple of this for the output to match the input.
    pub fn size_factor(&self) -> usize {
        1 << self.dense_blocks
    }

    /// Burn blends running statistics with the opposite weighting.
    pub(crate) fn burn_bn_momentum(&self) -> f64 {
        1.0 - self.bn_momentum
    }

    pub fn schedule(&self) -> crate::error::Result<LayerSchedule> {
        LayerSchedule::resolve(&self.layers_per_block, self.dense_blocks)
    }

    pub fn channel_plan(&self) -> crate::error::Result<ChannelPlan> {
        Ok(ChannelPlan::new(
            &self.schedule()?,
            self.initial_filters,
            self.growth_rate,
        ))
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.dense_blocks == 0 {
            return Err(NetworkError::invalid_config("dense_blocks must be > 0"));
        }
        // 2^blocks has to stay addressable.
        if self.dense_blocks >= usize::BITS as usize / 2 {
            return Err(NetworkError::invalid_config(format!(
                "dense_blocks {} is too deep",
                self.dense_blocks
            )));
        }
        if self.input_channels == 0 {
            return Err(NetworkError::invalid_config("input_channels must be > 0"));
        }
        if self.num_classes == 0 {
            return Err(NetworkError::invalid_config("num_classes must be > 0"));
        }
        if self.growth_rate == 0 || self.initial_filters == 0 {
            return Err(NetworkError::invalid_config(
                "growth_rate and initial_filters must be > 0",
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(NetworkError::invalid_config(format!(
                "dropout {} must be in [0, 1)",
                self.dropout
            )));
        }
        if !(0.0..=1.0).contains(&self.bn_momentum) || self.bn_epsilon <= 0.0 {
            return Err(NetworkError::invalid_config(
                "bn_momentum must be in [0, 1] and bn_epsilon > 0",
            ));
        }
        if self.weight_decay < 0.0 {
            return Err(NetworkError::invalid_config("weight_decay must be >= 0"));
        }
        self.schedule().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_fc_densenet56() {
        let config = NetworkConfig::new(3, 2);
        assert_eq!(config.name, "FCDenseNet56");
        assert_eq!(config.dense_blocks, 5);
        assert_eq!(config.layers_per_block, LayersPerBlock::Uniform(4));
        assert_eq!(config.growth_rate, 12);
        assert_eq!(config.initial_filters, 48);
        assert_eq!(config.radius, 384);
        assert_eq!(config.size_factor(), 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn presets_are_valid() {
        for config in [
            NetworkConfig::fc_densenet56(1, 2),
            NetworkConfig::fc_densenet67(3, 4),
            NetworkConfig::fc_densenet103(5, 6),
        ] {
            assert!(config.validate().is_ok(), "{}", config.name);
            assert_eq!(config.radius % config.size_factor(), 0);
        }
    }

    #[test]
    fn momentum_uses_burn_convention() {
        let config = NetworkConfig::new(1, 2);
        assert!((config.burn_bn_momentum() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn schedule_length_mismatch_fails_validation() {
        let config = NetworkConfig::new(1, 2)
            .with_dense_blocks(2)
            .with_layers_per_block(LayersPerBlock::PerBlock(vec![2, 2]));
        assert_eq!(
            config.validate(),
            Err(NetworkError::InvalidLayerSchedule {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(NetworkConfig::new(0, 2).validate().is_err());
        assert!(NetworkConfig::new(1, 0).validate().is_err());
        assert!(NetworkConfig::new(1, 2).with_dense_blocks(0).validate().is_err());
        assert!(NetworkConfig::new(1, 2).with_dropout(1.0).validate().is_err());
        assert!(NetworkConfig::new(1, 2).with_growth_rate(0).validate().is_err());
    }

    #[test]
    fn config_json_roundtrip() {
        let config = NetworkConfig::fc_densenet103(3, 7);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: NetworkConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
