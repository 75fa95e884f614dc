use burn::{
    prelude::Backend,
    tensor::{Distribution, Tensor, TensorData, backend::AutodiffBackend},
};

use crate::fc_densenet::FcDenseNet;
use crate::norm::ForwardMode;

/// Gradient magnitudes at or below this count as untouched pixels.
const GRADIENT_EPS: f32 = 1e-8;

/// Height of the noise image used to measure the receptive field.
const PROBE_HEIGHT: usize = 64;

/// Rounds a radius up to the next multiple of `size_factor`.
pub fn round_radius(radius: usize, size_factor: usize) -> usize {
    radius.div_ceil(size_factor) * size_factor
}

/// Turns a per-column gradient profile into a radius.
///
/// The radius is half the span of columns with a non-trivial gradient, rounded up to a
/// multiple of `size_factor`. Flat profiles fall back to `theoretical`.
pub fn radius_from_profile(profile: &[f32], theoretical: usize, size_factor: usize) -> usize {
    let mut active = profile
        .iter()
        .enumerate()
        .filter(|(_, value)| **value > GRADIENT_EPS)
        .map(|(idx, _)| idx);

    let (Some(first), Some(last)) = (active.next(), active.last()) else {
        log::warn!(
            "ERF based radius detection failed, defaulting to theoretical radius: {theoretical}"
        );
        return theoretical;
    };

    let radius = round_radius((last - first) / 2, size_factor);
    log::info!("Computed radius: {radius}");
    radius
}

/// Collapses a `[1, channels, height, width]` input gradient to a per-column profile:
/// absolute value, mean over channels, max over rows.
///
/// Returns `None` when the gradient cannot be read back as `f32`.
pub fn gradient_profile<B: Backend>(grad: Tensor<B, 4>) -> Option<Vec<f32>> {
    let [_, _, _, width] = grad.dims();
    let profile = grad.abs().mean_dim(1).max_dim(2).reshape([width]);
    read_profile(profile.into_data().convert::<f32>())
}

fn read_profile(data: TensorData) -> Option<Vec<f32>> {
    match data.to_vec::<f32>() {
        Ok(profile) => Some(profile),
        Err(err) => {
            log::warn!("Failed to read input gradient: {err:?}");
            None
        }
    }
}

impl<B: AutodiffBackend> FcDenseNet<B> {
    /// Per-column input gradient profile of a loss placed entirely on the center pixel of
    /// a `height` x `width` noise image, run in inference mode.
    ///
    /// Both sizes must be multiples of [`FcDenseNet::size_factor`].
    pub fn input_gradient_profile(
        &self,
        height: usize,
        width: usize,
        device: &B::Device,
    ) -> Option<Vec<f32>> {
        let image = Tensor::<B, 4>::random(
            [1, self.input_channels(), height, width],
            Distribution::Normal(0.0, 1.0),
            device,
        )
        .require_grad();

        let probs = self.forward(image.clone(), ForwardMode::Inference);
        let [_, _, _, classes] = probs.dims();
        let (row, col) = (height / 2, width / 2);

        // Flip the center prediction; every other pixel matches its target and adds no loss.
        let center = probs.slice([0..1, row..row + 1, col..col + 1, 0..classes]);
        let target = center.clone().detach().neg().add_scalar(1.0);
        let loss = (target - center).abs().mean();

        let grads = loss.backward();
        let Some(grad) = image.grad(&grads) else {
            log::warn!("No gradient reached the input image");
            return None;
        };
        gradient_profile(grad)
    }

    /// Empirically measures the receptive field radius in pixels.
    ///
    /// Feeds a noise image `2 * theoretical` wide through the network, puts all of the loss
    /// on the center pixel and looks at which input columns receive gradient. Falls back to
    /// `theoretical` when the gradient is flat or unreadable.
    pub fn estimate_radius(&self, theoretical: usize, device: &B::Device) -> usize {
        log::info!("Theoretical RF: {theoretical}");
        let size_factor = self.size_factor();
        let height = PROBE_HEIGHT.next_multiple_of(size_factor);
        let width = (2 * theoretical).max(1).next_multiple_of(size_factor);

        match self.input_gradient_profile(height, width, device) {
            Some(profile) => radius_from_profile(&profile, theoretical, size_factor),
            None => {
                log::warn!("Defaulting to theoretical radius: {theoretical}");
                theoretical
            }
        }
    }
}
