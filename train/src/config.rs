use burn::{optim::AdamConfig, prelude::Config};

use crate::error::TrainError;

#[derive(Config, Debug)]
pub struct TrainConfig {
    /// Number of target classes.
    pub num_classes: usize,

    /// Batch size summed over every replica. Losses are normalized by this, not by the
    /// size of the local shard.
    pub global_batch_size: usize,

    /// Channels of the input images.
    pub input_channels: usize,

    #[config(default = 1e-4)]
    pub learning_rate: f64,

    /// Moves this much probability mass from the one-hot label to a uniform distribution.
    #[config(default = 0.0)]
    pub label_smoothing: f32,

    #[config(default = 0.9)]
    pub beta_1: f32,

    #[config(default = 0.999)]
    pub beta_2: f32,

    #[config(default = 1e-7)]
    pub epsilon: f32,

    /// Add the L2 penalty of the stem and transition kernels to the optimized loss.
    #[config(default = false)]
    pub apply_weight_decay: bool,

    /// Seed for parameter init and dropout.
    pub seed: Option<u64>,
}

impl TrainConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.num_classes == 0 {
            return Err(TrainError::InvalidConfig("num_classes must be > 0".into()));
        }
        if self.input_channels == 0 {
            return Err(TrainError::InvalidConfig("input_channels must be > 0".into()));
        }
        if self.global_batch_size == 0 {
            return Err(TrainError::InvalidConfig(
                "global_batch_size must be > 0".into(),
            ));
        }
        if self.learning_rate <= 0.0 {
            return Err(TrainError::InvalidConfig(format!(
                "learning_rate {} must be > 0",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.label_smoothing) {
            return Err(TrainError::InvalidConfig(format!(
                "label_smoothing {} must be in [0, 1)",
                self.label_smoothing
            )));
        }
        Ok(())
    }

    pub(crate) fn adam(&self) -> AdamConfig {
        AdamConfig::new()
            .with_beta_1(self.beta_1)
            .with_beta_2(self.beta_2)
            .with_epsilon(self.epsilon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_keras() {
        let config = TrainConfig::new(3, 8, 1);
        assert_eq!(config.learning_rate, 1e-4);
        assert_eq!(config.label_smoothing, 0.0);
        assert_eq!(config.epsilon, 1e-7);
        assert!(!config.apply_weight_decay);
        assert_eq!(config.seed, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(TrainConfig::new(0, 8, 1).validate().is_err());
        assert!(TrainConfig::new(3, 0, 1).validate().is_err());
        assert!(TrainConfig::new(3, 8, 0).validate().is_err());
        assert!(
            TrainConfig::new(3, 8, 1)
                .with_learning_rate(0.0)
                .validate()
                .is_err()
        );
        assert!(
            TrainConfig::new(3, 8, 1)
                .with_label_smoothing(1.0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn json_keeps_seed() {
        let config = TrainConfig::new(3, 8, 1).with_seed(Some(7));
        let json = serde_json::to_string(&config).unwrap();
        let parsed: TrainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.seed, Some(7));
        assert_eq!(parsed.global_batch_size, 8);
    }
}
