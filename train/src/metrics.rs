use burn::{
    prelude::Backend,
    tensor::{ElementConversion, Tensor},
};

/// Accumulator fed with one scalar per step, e.g. the loss.
pub trait ScalarMetric {
    fn update(&mut self, value: f32);
}

/// Accumulator fed with channels-last predictions and labels of the same shape.
pub trait PredictionMetric<B: Backend> {
    fn update(&mut self, prediction: &Tensor<B, 4>, labels: &Tensor<B, 4>);
}

/// Running mean of scalar updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeanMetric {
    total: f64,
    count: usize,
}

impl MeanMetric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mean of all updates since the last reset, 0 without updates.
    pub fn result(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            (self.total / self.count as f64) as f32
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl ScalarMetric for MeanMetric {
    fn update(&mut self, value: f32) {
        self.total += value as f64;
        self.count += 1;
    }
}

/// Fraction of pixels whose most likely class matches the label's.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoricalAccuracy {
    correct: usize,
    total: usize,
}

impl CategoricalAccuracy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f32 / self.total as f32
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl<B: Backend> PredictionMetric<B> for CategoricalAccuracy {
    fn update(&mut self, prediction: &Tensor<B, 4>, labels: &Tensor<B, 4>) {
        let [batch, height, width, _] = prediction.dims();
        let predicted = prediction.clone().argmax(3);
        let expected = labels.clone().argmax(3);
        let correct = predicted.equal(expected).int().sum().into_scalar().elem::<i64>();

        self.correct += correct.max(0) as usize;
        self.total += batch * height * width;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    #[test]
    fn mean_metric_averages_and_resets() {
        let mut metric = MeanMetric::new();
        assert_eq!(metric.result(), 0.0);

        for value in [1.0, 2.0, 6.0] {
            metric.update(value);
        }
        assert_eq!(metric.count(), 3);
        assert!((metric.result() - 3.0).abs() < 1e-6);

        metric.reset();
        assert_eq!(metric, MeanMetric::new());
    }

    #[test]
    fn accuracy_counts_matching_pixels() {
        let device = Default::default();
        let labels = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(
                vec![
                    1.0f32, 0.0, //
                    0.0, 1.0, //
                    0.0, 1.0, //
                    1.0, 0.0,
                ],
                [1, 2, 2, 2],
            ),
            &device,
        );
        let prediction = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(
                vec![
                    0.9f32, 0.1, // right
                    0.2, 0.8, // right
                    0.7, 0.3, // wrong
                    0.6, 0.4, // right
                ],
                [1, 2, 2, 2],
            ),
            &device,
        );

        let mut accuracy = CategoricalAccuracy::new();
        accuracy.update(&prediction, &labels);
        assert!((accuracy.result() - 0.75).abs() < 1e-6);

        accuracy.update(&labels, &labels);
        assert!((accuracy.result() - 7.0 / 8.0).abs() < 1e-6);

        accuracy.reset();
        assert_eq!(accuracy.result(), 0.0);
    }
}
