use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        BatchNorm, BatchNormConfig, LeakyRelu, LeakyReluConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

use crate::{
    checkpoint::{export_param, export_running, import_param, import_running, StateDict},
    error::CheckpointError,
};

pub const KERNEL_SIZE: usize = 4;

/// Transposed convolution, batch norm and ReLU. Upsamples the feature map.
#[derive(Module, Debug)]
pub struct UpBlock<B: Backend> {
    deconv: ConvTranspose2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
}
impl<B: Backend> UpBlock<B> {
    pub fn new(channels: [usize; 2], stride: usize, padding: usize, device: &B::Device) -> Self {
        let deconv = ConvTranspose2dConfig::new(channels, [KERNEL_SIZE, KERNEL_SIZE])
            .with_stride([stride, stride])
            .with_padding([padding, padding])
            .with_bias(false)
            .init(device);
        let bn = BatchNormConfig::new(channels[1]).init(device);
        let relu = Relu::new();

        Self { deconv, bn, relu }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let output = self.deconv.forward(input);
        let output = self.bn.forward(output);
        self.relu.forward(output)
    }

    /// Number of input channels the block expects.
    pub fn in_channels(&self) -> usize {
        self.deconv.weight.dims()[0]
    }

    pub fn export_state(&self, prefix: &str, dict: &mut StateDict) {
        export_param(dict, format!("{prefix}.0.weight"), &self.deconv.weight);
        export_batch_norm(dict, &format!("{prefix}.1"), &self.bn);
    }

    pub fn import_state(&self, prefix: &str, dict: &StateDict) -> Result<Self, CheckpointError> {
        let mut deconv = self.deconv.clone();
        deconv.weight = import_param(dict, &format!("{prefix}.0.weight"), &deconv.weight)?;
        let bn = import_batch_norm(dict, &format!("{prefix}.1"), &self.bn)?;

        Ok(Self {
            deconv,
            bn,
            relu: self.relu.clone(),
        })
    }
}

/// Strided convolution, optional batch norm and LeakyReLU. Downsamples the
/// feature map.
#[derive(Module, Debug)]
pub struct DownBlock<B: Backend> {
    conv: Conv2d<B>,
    bn: Option<BatchNorm<B, 2>>,
    lrelu: LeakyRelu,
}
impl<B: Backend> DownBlock<B> {
    pub fn new(
        channels: [usize; 2],
        batch_norm: bool,
        negative_slope: f64,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new(channels, [KERNEL_SIZE, KERNEL_SIZE])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);
        let bn = batch_norm.then(|| BatchNormConfig::new(channels[1]).init(device));
        let lrelu = LeakyReluConfig::new()
            .with_negative_slope(negative_slope)
            .init();

        Self { conv, bn, lrelu }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let output = self.conv.forward(input);
        let output = match &self.bn {
            Some(bn) => bn.forward(output),
            None => output,
        };
        self.lrelu.forward(output)
    }

    pub fn export_state(&self, prefix: &str, dict: &mut StateDict) {
        export_param(dict, format!("{prefix}.0.weight"), &self.conv.weight);
        if let Some(bn) = &self.bn {
            export_batch_norm(dict, &format!("{prefix}.1"), bn);
        }
    }

    pub fn import_state(&self, prefix: &str, dict: &StateDict) -> Result<Self, CheckpointError> {
        let mut conv = self.conv.clone();
        conv.weight = import_param(dict, &format!("{prefix}.0.weight"), &conv.weight)?;
        let bn = match &self.bn {
            Some(bn) => Some(import_batch_norm(dict, &format!("{prefix}.1"), bn)?),
            None => None,
        };

        Ok(Self {
            conv,
            bn,
            lrelu: self.lrelu.clone(),
        })
    }
}

// PyTorch names batch norm affine parameters `weight`/`bias`.
fn export_batch_norm<B: Backend>(dict: &mut StateDict, prefix: &str, bn: &BatchNorm<B, 2>) {
    export_param(dict, format!("{prefix}.weight"), &bn.gamma);
    export_param(dict, format!("{prefix}.bias"), &bn.beta);
    export_running(dict, format!("{prefix}.running_mean"), &bn.running_mean);
    export_running(dict, format!("{prefix}.running_var"), &bn.running_var);
}

fn import_batch_norm<B: Backend>(
    dict: &StateDict,
    prefix: &str,
    bn: &BatchNorm<B, 2>,
) -> Result<BatchNorm<B, 2>, CheckpointError> {
    let mut bn = bn.clone();
    bn.gamma = import_param(dict, &format!("{prefix}.weight"), &bn.gamma)?;
    bn.beta = import_param(dict, &format!("{prefix}.bias"), &bn.beta)?;
    bn.running_mean = import_running(dict, &format!("{prefix}.running_mean"), &bn.running_mean)?;
    bn.running_var = import_running(dict, &format!("{prefix}.running_var"), &bn.running_var)?;

    Ok(bn)
}
