mod config;
mod conv_block;
mod dense_block;
mod error;
mod fc_densenet;
mod feature_maps;
mod norm;
mod receptive_field;
mod schedule;
mod transition;

pub use config::NetworkConfig;
pub use conv_block::{ConvBlock, ConvBlockConfig};
pub use dense_block::{DenseBlock, DenseBlockConfig, DenseBlockOutput};
pub use error::{NetworkError, Result};
pub use fc_densenet::{DecoderStage, EncoderStage, FcDenseNet};
pub use feature_maps::FeatureMaps;
pub use norm::{ChannelNorm, ChannelNormConfig, ForwardMode};
pub use receptive_field::{gradient_profile, radius_from_profile, round_radius};
pub use schedule::{ChannelPlan, DecoderChannels, EncoderChannels, LayerSchedule, LayersPerBlock};
pub use transition::{TransitionDown, TransitionDownConfig, TransitionUp, TransitionUpConfig};
