pub mod discriminator;
pub mod generator;
mod layers;

use burn::{module::Module, prelude::*};

use crate::model::{
    discriminator::{Discriminator, DiscriminatorConfig},
    generator::{Generator, GeneratorConfig},
};

pub const CHANNELS: usize = 3;
pub const IMAGE_SIZE: usize = 32;

#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    pub generator: Generator<B>,
    pub discriminator: Discriminator<B>,
}

#[derive(Config, Debug)]
pub struct ModelConfig {
    pub generator_config: GeneratorConfig,
    pub discriminator_config: DiscriminatorConfig,
}
impl ModelConfig {
    /// The notebook's network sizes.
    pub fn dcgan() -> Self {
        Self::new(GeneratorConfig::new(), DiscriminatorConfig::new())
    }

    pub fn latent_dim(&self) -> usize {
        self.generator_config.latent_dim
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Model<B> {
        let generator = self.generator_config.init(device);
        let discriminator = self.discriminator_config.init(device);

        Model {
            generator,
            discriminator,
        }
    }
}
