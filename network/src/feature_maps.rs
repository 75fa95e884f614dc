use burn::{prelude::Backend, tensor::Tensor};

/// Tensors produced inside one dense block, in creation order.
///
/// Element 0 is the block input, the rest are the `growth_rate` wide outputs of
/// each conv block.
#[derive(Debug, Clone)]
pub struct FeatureMaps<B: Backend> {
    maps: Vec<Tensor<B, 4>>,
}

impl<B: Backend> FeatureMaps<B> {
    pub fn new(input: Tensor<B, 4>) -> Self {
        Self { maps: vec![input] }
    }

    pub fn push(&mut self, map: Tensor<B, 4>) {
        self.maps.push(map);
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn input(&self) -> &Tensor<B, 4> {
        &self.maps[0]
    }

    pub fn maps(&self) -> &[Tensor<B, 4>] {
        &self.maps
    }

    /// All maps concatenated along the channel axis.
    pub fn concat_all(&self) -> Tensor<B, 4> {
        Tensor::cat(self.maps.clone(), 1)
    }

    /// Only the newly grown maps, without the re-injected block input.
    ///
    /// Upsampling the block input as well would make the decoder width explode.
    /// Dense blocks always grow at least one map, so this is never empty for their output.
    pub fn concat_grown(&self) -> Tensor<B, 4> {
        Tensor::cat(self.maps[1..].to_vec(), 1)
    }
}
