use burn::{
    module::Module,
    nn::{
        conv::{ConvTranspose2d, ConvTranspose2dConfig},
        Tanh,
    },
    prelude::*,
};

use crate::{
    checkpoint::{export_param, import_param, StateDict, StateDictModule},
    error::CheckpointError,
    model::layers::{UpBlock, KERNEL_SIZE},
};

/// Maps latent vectors `[B, latent_dim]` to images `[B, 3, 32, 32]` in `[-1, 1]`.
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    conv1: UpBlock<B>,
    conv2: UpBlock<B>,
    conv3: UpBlock<B>,
    conv4: ConvTranspose2d<B>,
    tanh: Tanh,
}
impl<B: Backend> Generator<B> {
    pub fn forward(&self, latent: Tensor<B, 2>) -> Tensor<B, 4> {
        let [batch_size, latent_dim] = latent.dims();
        let input = latent.reshape([batch_size, latent_dim, 1, 1]);

        let output = self.conv1.forward(input); // [B, 4f, 4, 4]
        let output = self.conv2.forward(output); // [B, 2f, 8, 8]
        let output = self.conv3.forward(output); // [B, f, 16, 16]
        let output = self.conv4.forward(output); // [B, 3, 32, 32]

        self.tanh.forward(output)
    }

    pub fn latent_dim(&self) -> usize {
        self.conv1.in_channels()
    }
}

impl<B: Backend> StateDictModule for Generator<B> {
    fn state_dict(&self) -> StateDict {
        let mut dict = StateDict::new();
        self.conv1.export_state("conv1", &mut dict);
        self.conv2.export_state("conv2", &mut dict);
        self.conv3.export_state("conv3", &mut dict);
        export_param(&mut dict, "conv4.0.weight".to_string(), &self.conv4.weight);

        dict
    }

    fn apply_state_dict(&self, dict: &StateDict) -> Result<Self, CheckpointError> {
        let mut conv4 = self.conv4.clone();
        conv4.weight = import_param(dict, "conv4.0.weight", &conv4.weight)?;

        Ok(Self {
            conv1: self.conv1.import_state("conv1", dict)?,
            conv2: self.conv2.import_state("conv2", dict)?,
            conv3: self.conv3.import_state("conv3", dict)?,
            conv4,
            tanh: self.tanh.clone(),
        })
    }
}

#[derive(Config, Debug)]
pub struct GeneratorConfig {
    #[config(default = 100)]
    pub latent_dim: usize,
    /// Channels of the last hidden layer; earlier layers use 2x and 4x.
    #[config(default = 32)]
    pub feature_maps: usize,
}
impl GeneratorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Generator<B> {
        let fm = self.feature_maps;

        let conv1 = UpBlock::new([self.latent_dim, fm * 4], 1, 0, device);
        let conv2 = UpBlock::new([fm * 4, fm * 2], 2, 1, device);
        let conv3 = UpBlock::new([fm * 2, fm], 2, 1, device);
        let conv4 = ConvTranspose2dConfig::new([fm, 3], [KERNEL_SIZE, KERNEL_SIZE])
            .with_stride([2, 2])
            .with_padding([1, 1])
            .with_bias(false)
            .init(device);
        let tanh = Tanh::new();

        Generator {
            conv1,
            conv2,
            conv3,
            conv4,
            tanh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MyBackend;
    use burn::tensor::Distribution;

    #[test]
    fn test_output_shape_for_several_batch_sizes() {
        let device = Default::default();
        let generator = GeneratorConfig::new().init::<MyBackend>(&device);

        for batch_size in [1, 2, 5] {
            let latent = Tensor::<MyBackend, 2>::random(
                [batch_size, 100],
                Distribution::Normal(0.0, 1.0),
                &device,
            );
            let images = generator.forward(latent);
            assert_eq!(images.dims(), [batch_size, 3, 32, 32]);
        }
    }

    #[test]
    fn test_output_is_bounded_by_tanh() {
        let device = Default::default();
        let generator = GeneratorConfig::new().init::<MyBackend>(&device);
        let latent =
            Tensor::<MyBackend, 2>::random([4, 100], Distribution::Normal(0.0, 1.0), &device);

        let values = generator
            .forward(latent)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_latent_dim_is_read_from_first_layer() {
        let device = Default::default();
        let generator = GeneratorConfig::new()
            .with_latent_dim(64)
            .init::<MyBackend>(&device);

        assert_eq!(generator.latent_dim(), 64);
    }
}
