#![recursion_limit = "256"]

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod eval;
pub mod loss;
pub mod metrics;
pub mod replica;
pub mod train;

pub use batch::SegmentationBatch;
pub use config::TrainConfig;
pub use error::{Result, TrainError};
pub use loss::{CategoricalCrossEntropy, reduce_batch_loss};
pub use metrics::{CategoricalAccuracy, MeanMetric, PredictionMetric, ScalarMetric};
pub use replica::ReplicaGroup;
pub use train::Segmenter;
