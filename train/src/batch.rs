use burn::{prelude::Backend, tensor::Tensor};

use crate::error::{Result, TrainError};

/// Images and their per-pixel labels.
#[derive(Debug, Clone)]
pub struct SegmentationBatch<B: Backend> {
    /// `[batch, channels, height, width]`
    pub images: Tensor<B, 4>,
    /// `[batch, height, width, classes]`, one-hot or smoothed.
    pub labels: Tensor<B, 4>,
}

impl<B: Backend> SegmentationBatch<B> {
    pub fn new(images: Tensor<B, 4>, labels: Tensor<B, 4>) -> Self {
        Self { images, labels }
    }

    pub fn batch_size(&self) -> usize {
        self.images.dims()[0]
    }

    /// Labels have to line up with the images pixel for pixel.
    pub fn check_labels(&self, num_classes: usize) -> Result<()> {
        let [batch, _, height, width] = self.images.dims();
        let expected = [batch, height, width, num_classes];
        let actual = self.labels.dims();
        if actual != expected {
            return Err(TrainError::ShapeMismatch {
                expected: expected.to_vec(),
                actual: actual.to_vec(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn labels_must_match_images() {
        let device = Default::default();
        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 8, 4], &device);

        let batch = SegmentationBatch::new(
            images.clone(),
            Tensor::zeros([2, 8, 4, 5], &device),
        );
        assert_eq!(batch.batch_size(), 2);
        assert!(batch.check_labels(5).is_ok());

        let transposed = SegmentationBatch::new(images, Tensor::zeros([2, 4, 8, 5], &device));
        match transposed.check_labels(5) {
            Err(TrainError::ShapeMismatch { expected, actual }) => {
                assert_eq!(expected, vec![2, 8, 4, 5]);
                assert_eq!(actual, vec![2, 4, 8, 5]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
