pub mod checkpoint;
pub mod data;
pub mod error;
pub mod model;
pub mod training;
pub mod utils;

use burn::backend::{Autodiff, NdArray};

pub use checkpoint::{load_pretrained_weights, StateDict, StateDictModule};
pub use model::{
    discriminator::{Discriminator, DiscriminatorConfig},
    generator::{Generator, GeneratorConfig},
    Model, ModelConfig,
};
pub use training::{train, train_loop, GanTrainer, TrainingConfig, TrainingHistory};

pub type MyBackend = NdArray<f32>;
pub type MyAutodiffBackend = Autodiff<MyBackend>;
