use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Sigmoid,
    },
    prelude::*,
};

use crate::{
    checkpoint::{export_param, import_param, StateDict, StateDictModule},
    error::CheckpointError,
    model::layers::{DownBlock, KERNEL_SIZE},
};

/// Scores images `[B, 3, 32, 32]` with the probability `[B]` that each is real.
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    conv1: DownBlock<B>,
    conv2: DownBlock<B>,
    conv3: DownBlock<B>,
    conv4: Conv2d<B>,
    sig: Sigmoid,
}
impl<B: Backend> Discriminator<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 1> {
        let output = self.conv1.forward(images); // [B, f, 16, 16]
        let output = self.conv2.forward(output); // [B, 2f, 8, 8]
        let output = self.conv3.forward(output); // [B, 4f, 4, 4]
        let output = self.conv4.forward(output); // [B, 1, 1, 1]

        self.sig.forward(output).flatten(0, 3)
    }
}

impl<B: Backend> StateDictModule for Discriminator<B> {
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
            sig: self.sig.clone(),
        })
    }
}

#[derive(Config, Debug)]
pub struct DiscriminatorConfig {
    /// Channels of the first layer; later layers use 2x and 4x.
    #[config(default = 32)]
    pub feature_maps: usize,
    #[config(default = 0.2)]
    pub negative_slope: f64,
}
impl DiscriminatorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Discriminator<B> {
        let fm = self.feature_maps;
        let slope = self.negative_slope;

        // no batch norm on the input layer
        let conv1 = DownBlock::new([3, fm], false, slope, device);
        let conv2 = DownBlock::new([fm, fm * 2], true, slope, device);
        let conv3 = DownBlock::new([fm * 2, fm * 4], true, slope, device);
        let conv4 = Conv2dConfig::new([fm * 4, 1], [KERNEL_SIZE, KERNEL_SIZE])
            .with_bias(false)
            .init(device);
        let sig = Sigmoid::new();

        Discriminator {
            conv1,
            conv2,
            conv3,
            conv4,
            sig,
        }
    }
}
