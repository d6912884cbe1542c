use anyhow::Context;
use burn::{
    config::Config,
    data::dataloader::{DataLoader, DataLoaderBuilder},
    nn::loss::{BinaryCrossEntropyLoss, BinaryCrossEntropyLossConfig},
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        cast::ToElement,
        Int, Tensor, TensorData,
    },
};
use image::RgbImage;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::{path::Path, sync::Arc, time::Instant};
use tracing::info;

use crate::{
    checkpoint::load_pretrained_weights,
    data::{ImageBatch, ImageBatcher, ImageFolderDataset},
    error::TrainError,
    model::{discriminator::Discriminator, generator::Generator, ModelConfig, CHANNELS},
    utils::{make_grid, save_losses},
};

// ////////////////////////////////////////////////////////////////////////////
// Helpers
#[derive(Clone, Debug)]
pub struct DiscOutput<B: Backend> {
    pub loss_real: Tensor<B, 1>,
    pub loss_fake: Tensor<B, 1>,
    pub loss: Tensor<B, 1>,
}
#[derive(Clone, Debug)]
pub struct GenOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
}

/// All-ones (`real`) or all-zeros label vector matching `scores`.
fn targets<B: Backend>(
    scores: &Tensor<B, 1>,
    batch_size: usize,
    real: bool,
) -> Result<Tensor<B, 1, Int>, TrainError> {
    let [len] = scores.dims();
    if len != batch_size {
        return Err(TrainError::LabelMismatch {
            expected: batch_size,
            found: len,
        });
    }

    let device = scores.device();
    Ok(if real {
        Tensor::ones([len], &device)
    } else {
        Tensor::zeros([len], &device)
    })
}

/// BCE of the discriminator on real images against ones plus BCE on
/// generated images against zeros. The fake images are not detached.
pub fn calc_disc_loss<B: Backend>(
    real_images: Tensor<B, 4>,
    noise: Tensor<B, 2>,
    generator: &Generator<B>,
    discriminator: &Discriminator<B>,
    bce: &BinaryCrossEntropyLoss<B>,
) -> Result<DiscOutput<B>, TrainError> {
    let batch_size = real_images.dims()[0];

    let real_out = discriminator.forward(real_images);
    let real_targets = targets(&real_out, batch_size, true)?;
    let loss_real = bce.forward(real_out, real_targets);

    let fake_imgs = generator.forward(noise);
    let fake_out = discriminator.forward(fake_imgs);
    let fake_targets = targets(&fake_out, batch_size, false)?;
    let loss_fake = bce.forward(fake_out, fake_targets);

    let loss = loss_real.clone() + loss_fake.clone();

    Ok(DiscOutput {
        loss_real,
        loss_fake,
        loss,
    })
}

/// BCE of the discriminator on generated images against ones: the generator
/// is rewarded when its samples are scored as real.
pub fn calc_gen_loss<B: Backend>(
    noise: Tensor<B, 2>,
    generator: &Generator<B>,
    discriminator: &Discriminator<B>,
    bce: &BinaryCrossEntropyLoss<B>,
) -> Result<GenOutput<B>, TrainError> {
    let batch_size = noise.dims()[0];

    let generated_images = generator.forward(noise);
    let adversarial_out = discriminator.forward(generated_images);
    let adversarial_targets = targets(&adversarial_out, batch_size, true)?;
    let loss = bce.forward(adversarial_out, adversarial_targets);

    Ok(GenOutput { loss })
}

// ////////////////////////////////////////////////////////////////////////////
// Config

#[derive(Config)]
pub struct TrainingConfig {
    pub model_config: ModelConfig,
    pub gen_optimizer: AdamConfig,
    pub disc_optimizer: AdamConfig,

    #[config(default = 30)]
    pub num_epochs: usize,
    #[config(default = 128)]
    pub batch_size: usize,
    #[config(default = 1)]
    pub num_workers: usize,
    #[config(default = 2e-4)]
    pub lr: f64,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 32)]
    pub image_size: usize,
    /// Log progress every `log_interval` batches of an epoch.
    #[config(default = 50)]
    pub log_interval: usize,
    /// Render the fixed noise every `snapshot_interval` iterations.
    #[config(default = 50)]
    pub snapshot_interval: usize,
    #[config(default = 36)]
    pub fixed_noise_samples: usize,
    #[config(default = 6)]
    pub grid_rows: usize,
}

impl TrainingConfig {
    /// The notebook's setup: both networks trained with Adam(0.5, 0.999).
    pub fn dcgan() -> Self {
        Self::new(ModelConfig::dcgan(), dcgan_adam(), dcgan_adam())
    }
}

pub fn dcgan_adam() -> AdamConfig {
    AdamConfig::new()
        .with_beta_1(0.5)
        .with_beta_2(0.999)
        .with_epsilon(1e-8)
}

// ////////////////////////////////////////////////////////////////////////////
// Trainer

/// Owns the two optimizers, the loss and the latent sampler, and performs
/// the two adversarial updates. Each update only ever steps its own network.
pub struct GanTrainer<B: AutodiffBackend> {
    gen_optimizer: OptimizerAdaptor<Adam, Generator<B>, B>,
    disc_optimizer: OptimizerAdaptor<Adam, Discriminator<B>, B>,
    bce: BinaryCrossEntropyLoss<B>,
    rng: StdRng,
    lr: f64,
    batch_size: usize,
    latent_dim: usize,
    image_size: usize,
    device: B::Device,
    disc_steps: usize,
    gen_steps: usize,
}

impl<B: AutodiffBackend> GanTrainer<B> {
    pub fn new(config: &TrainingConfig, device: &B::Device) -> Self {
        Self {
            gen_optimizer: config.gen_optimizer.init(),
            disc_optimizer: config.disc_optimizer.init(),
            bce: BinaryCrossEntropyLossConfig::new().init(device),
            rng: StdRng::seed_from_u64(config.seed),
            lr: config.lr,
            batch_size: config.batch_size,
            latent_dim: config.model_config.latent_dim(),
            image_size: config.image_size,
            device: device.clone(),
            disc_steps: 0,
            gen_steps: 0,
        }
    }

    /// Number of discriminator updates applied so far.
    pub fn disc_steps(&self) -> usize {
        self.disc_steps
    }

    /// Number of generator updates applied so far.
    pub fn gen_steps(&self) -> usize {
        self.gen_steps
    }

    /// Draws `batch_size` standard normal latent vectors.
    pub fn sample_noise(&mut self, batch_size: usize) -> Tensor<B, 2> {
        let values = (&mut self.rng)
            .sample_iter::<f32, _>(StandardNormal)
            .take(batch_size * self.latent_dim)
            .collect::<Vec<_>>();

        Tensor::from_data(
            TensorData::new(values, [batch_size, self.latent_dim]),
            &self.device,
        )
    }

    fn check_latent_dim(&self, generator: &Generator<B>) -> Result<(), TrainError> {
        let expected = generator.latent_dim();
        if expected != self.latent_dim {
            return Err(TrainError::LatentDim {
                expected,
                found: self.latent_dim,
            });
        }
        Ok(())
    }

    /// One optimizer step on the discriminator from a batch of real images
    /// and an equally sized batch of generated ones. The generator is part
    /// of the differentiated graph but its parameters are never stepped.
    /// Returns the summed real + fake loss.
    pub fn discriminator_step(
        &mut self,
        real_images: Tensor<B, 4>,
        generator: &Generator<B>,
        discriminator: &mut Discriminator<B>,
    ) -> Result<f32, TrainError> {
        let dims = real_images.dims();
        let [batch_size, channels, height, width] = dims;
        if batch_size == 0 {
            return Err(TrainError::EmptyBatch);
        }
        let expected = [CHANNELS, self.image_size, self.image_size];
        if [channels, height, width] != expected {
            return Err(TrainError::ImageShape {
                expected,
                found: dims,
            });
        }
        self.check_latent_dim(generator)?;

        let noise = self.sample_noise(batch_size);
        let disc_out = calc_disc_loss(real_images, noise, generator, discriminator, &self.bce)?;
        let disc_loss = disc_out.loss.clone().into_scalar().to_f32();

        // Gradients are rebuilt from scratch by every backward pass, and only
        // the discriminator's are handed to its optimizer.
        let grads = disc_out.loss.backward();
        let grads = GradientsParams::from_grads(grads, &*discriminator);
        *discriminator = self
            .disc_optimizer
            .step(self.lr, discriminator.clone(), grads);
        self.disc_steps += 1;

        Ok(disc_loss)
    }

    /// One optimizer step on the generator, trained to make the discriminator
    /// score its samples as real. Uses no real images. Returns the loss.
    pub fn generator_step(
        &mut self,
        generator: &mut Generator<B>,
        discriminator: &Discriminator<B>,
    ) -> Result<f32, TrainError> {
        if self.batch_size == 0 {
            return Err(TrainError::InvalidBatchSize(self.batch_size));
        }
        self.check_latent_dim(generator)?;

        let noise = self.sample_noise(self.batch_size);
        let gen_out = calc_gen_loss(noise, generator, discriminator, &self.bce)?;
        let gen_loss = gen_out.loss.clone().into_scalar().to_f32();

        let grads = gen_out.loss.backward();
        let grads = GradientsParams::from_grads(grads, &*generator);
        *generator = self.gen_optimizer.step(self.lr, generator.clone(), grads);
        self.gen_steps += 1;

        Ok(gen_loss)
    }
}

// ////////////////////////////////////////////////////////////////////////////
// Training

/// Generator output on the fixed noise at a given iteration.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub epoch: usize,
    pub iteration: usize,
    pub grid: RgbImage,
}

#[derive(Clone, Debug, Default)]
pub struct TrainingHistory {
    pub generator_losses: Vec<f32>,
    pub discriminator_losses: Vec<f32>,
    pub snapshots: Vec<Snapshot>,
}

/// Renders the generator's output on `fixed_noise` as an image grid.
pub fn render_samples<B: Backend>(
    generator: &Generator<B>,
    fixed_noise: Tensor<B, 2>,
    nrow: usize,
) -> RgbImage {
    let images = generator.forward(fixed_noise).detach();
    make_grid(images, nrow, 2)
}

/// Runs `num_epochs` passes over `dataloader`, one discriminator update and
/// one generator update per batch.
pub fn train_loop<B: AutodiffBackend>(
    config: &TrainingConfig,
    trainer: &mut GanTrainer<B>,
    generator: &mut Generator<B>,
    discriminator: &mut Discriminator<B>,
    dataloader: Arc<dyn DataLoader<B, ImageBatch<B>>>,
    fixed_noise: Tensor<B, 2>,
) -> Result<TrainingHistory, TrainError> {
    let mut history = TrainingHistory::default();
    let batch_num = dataloader.num_items().div_ceil(config.batch_size.max(1));
    let log_interval = config.log_interval.max(1);
    let snapshot_interval = config.snapshot_interval.max(1);

    info!("Starting the training loop...");
    let mut iters = 0;
    let mut start_time = Instant::now();
    for epoch in 0..config.num_epochs {
        let mut batches = dataloader.iter().peekable();
        let mut it = 0;
        while let Some(batch) = batches.next() {
            let d_loss = trainer.discriminator_step(batch.images, generator, discriminator)?;
            let g_loss = trainer.generator_step(generator, discriminator)?;

            if it % log_interval == 0 {
                info!(
                    "[Epoch: {:2}/{:2}, Batch: {:4}/{:4}][D loss: {:.4}, G loss: {:.4}] Time: {:.2} s",
                    epoch,
                    config.num_epochs,
                    it,
                    batch_num,
                    d_loss,
                    g_loss,
                    start_time.elapsed().as_secs_f32()
                );
                start_time = Instant::now();
            }

            history.generator_losses.push(g_loss);
            history.discriminator_losses.push(d_loss);

            let last_batch = epoch + 1 == config.num_epochs && batches.peek().is_none();
            if iters % snapshot_interval == 0 || last_batch {
                history.snapshots.push(Snapshot {
                    epoch,
                    iteration: iters,
                    grid: render_samples(generator, fixed_noise.clone(), config.grid_rows),
                });
            }

            iters += 1;
            it += 1;
        }
    }
    info!("Training finished!");

    Ok(history)
}

/// Fine-tunes the DCGAN on the image folder at `data_root`, starting from the
/// pre-trained weights in `pretrained` when given. Writes the config, progress
/// grids and the loss history to `outdir`.
pub fn train<B: AutodiffBackend>(
    config: TrainingConfig,
    data_root: &Path,
    pretrained: Option<&Path>,
    outdir: &Path,
    device: &B::Device,
) -> anyhow::Result<TrainingHistory> {
    std::fs::create_dir_all(outdir)
        .with_context(|| format!("failed to create {}", outdir.display()))?;
    config
        .save(outdir.join("config.json"))
        .context("failed to save training config")?;
    B::seed(config.seed);

    let model = config.model_config.init::<B>(device);
    let (mut generator, mut discriminator) = match pretrained {
        Some(dir) => load_pretrained_weights(&model.generator, &model.discriminator, dir)
            .context("failed to load pre-trained weights")?,
        None => (model.generator, model.discriminator),
    };

    let dataset = ImageFolderDataset::new(data_root, config.image_size)
        .with_context(|| format!("failed to load dataset from {}", data_root.display()))?;
    let dataloader = DataLoaderBuilder::new(ImageBatcher::new(config.image_size))
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(dataset);

    let mut trainer = GanTrainer::<B>::new(&config, device);
    let fixed_noise = trainer.sample_noise(config.fixed_noise_samples);

    let history = train_loop(
        &config,
        &mut trainer,
        &mut generator,
        &mut discriminator,
        dataloader,
        fixed_noise,
    )?;

    for snapshot in &history.snapshots {
        let path = outdir.join(format!("progress-{:06}.png", snapshot.iteration));
        snapshot
            .grid
            .save(&path)
            .with_context(|| format!("failed to save {}", path.display()))?;
    }
    save_losses(&history, outdir.join("losses.csv")).context("failed to save loss history")?;

    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        checkpoint::{StateDict, StateDictModule},
        data::ImageItem,
        model::IMAGE_SIZE,
        MyAutodiffBackend,
    };
    use burn::{
        data::dataset::InMemDataset,
        tensor::Distribution,
    };

    type TestBackend = MyAutodiffBackend;

    fn small_config(batch_size: usize) -> TrainingConfig {
        TrainingConfig::dcgan()
            .with_batch_size(batch_size)
            .with_num_epochs(1)
            .with_seed(7)
    }

    fn real_batch(batch_size: usize) -> Tensor<TestBackend, 4> {
        let device = Default::default();
        let values = (0..batch_size * CHANNELS * IMAGE_SIZE * IMAGE_SIZE)
            .map(|i| ((i % 17) as f32 / 8.0) - 1.0)
            .collect::<Vec<_>>();
        Tensor::from_data(
            TensorData::new(values, [batch_size, CHANNELS, IMAGE_SIZE, IMAGE_SIZE]),
            &device,
        )
    }

    // Trainable entries only: batch-norm running statistics are buffers that
    // any training-mode forward pass refreshes.
    fn trainable(dict: &StateDict) -> Vec<(String, Vec<f32>)> {
        dict.iter()
            .filter(|(key, _)| !key.contains("running_"))
            .map(|(key, data)| (key.to_string(), data.to_vec::<f32>().unwrap()))
            .collect()
    }

    fn any_changed(before: &[(String, Vec<f32>)], after: &[(String, Vec<f32>)]) -> bool {
        before.iter().zip(after).any(|((_, a), (_, b))| a != b)
    }

    #[test]
    fn test_discriminator_step_only_updates_discriminator() {
        let device = Default::default();
        let config = small_config(4);
        let model = config.model_config.init::<TestBackend>(&device);
        let (generator, mut discriminator) = (model.generator, model.discriminator);
        let mut trainer = GanTrainer::new(&config, &device);

        let gen_before = trainable(&generator.state_dict());
        let disc_before = trainable(&discriminator.state_dict());

        let loss = trainer
            .discriminator_step(real_batch(4), &generator, &mut discriminator)
            .unwrap();

        assert!(loss.is_finite() && loss > 0.0);
        assert_eq!(trainable(&generator.state_dict()), gen_before);
        assert!(any_changed(&disc_before, &trainable(&discriminator.state_dict())));
        assert_eq!(trainer.disc_steps(), 1);
        assert_eq!(trainer.gen_steps(), 0);
    }

    #[test]
    fn test_generator_step_only_updates_generator() {
        let device = Default::default();
        let config = small_config(4);
        let model = config.model_config.init::<TestBackend>(&device);
        let (mut generator, discriminator) = (model.generator, model.discriminator);
        let mut trainer = GanTrainer::new(&config, &device);

        let gen_before = trainable(&generator.state_dict());
        let disc_before = trainable(&discriminator.state_dict());

        let loss = trainer
            .generator_step(&mut generator, &discriminator)
            .unwrap();

        assert!(loss.is_finite() && loss > 0.0);
        assert_eq!(trainable(&discriminator.state_dict()), disc_before);
        assert!(any_changed(&gen_before, &trainable(&generator.state_dict())));
        assert_eq!(trainer.gen_steps(), 1);
    }

    #[test]
    fn test_disc_loss_is_sum_of_two_bce_terms() {
        let device = Default::default();
        let model = ModelConfig::dcgan().init::<TestBackend>(&device);
        let bce = BinaryCrossEntropyLossConfig::new().init(&device);
        let noise =
            Tensor::<TestBackend, 2>::random([3, 100], Distribution::Normal(0.0, 1.0), &device);

        let out = calc_disc_loss(
            real_batch(3),
            noise,
            &model.generator,
            &model.discriminator,
            &bce,
        )
        .unwrap();

        let real = out.loss_real.into_scalar().to_f32();
        let fake = out.loss_fake.into_scalar().to_f32();
        let total = out.loss.into_scalar().to_f32();
        assert!(real >= 0.0 && fake >= 0.0);
        assert!((total - (real + fake)).abs() < 1e-6);
    }

    fn run_one_round(batch_size: usize) -> (f32, f32) {
        let device = Default::default();
        let config = small_config(batch_size);
        let model = config.model_config.init::<TestBackend>(&device);
        let dict_g = model.generator.state_dict();
        let dict_d = model.discriminator.state_dict();

        let mut losses = Vec::new();
        for _ in 0..2 {
            // identical starting weights and seed for both runs
            let mut generator = model.generator.load_state_dict(&dict_g).unwrap();
            let mut discriminator = model.discriminator.load_state_dict(&dict_d).unwrap();
            let mut trainer = GanTrainer::new(&config, &device);

            let d_loss = trainer
                .discriminator_step(real_batch(batch_size), &generator, &mut discriminator)
                .unwrap();
            let g_loss = trainer
                .generator_step(&mut generator, &discriminator)
                .unwrap();
            losses.push((d_loss, g_loss));
        }

        assert!((losses[0].0 - losses[1].0).abs() < 1e-5);
        assert!((losses[0].1 - losses[1].1).abs() < 1e-5);
        losses[0]
    }

    #[test]
    fn test_losses_are_reproducible_under_fixed_seed() {
        let (d_loss, g_loss) = run_one_round(4);
        assert!(d_loss.is_finite() && g_loss.is_finite());
    }

    #[test]
    #[ignore = "full-size batch is slow on the ndarray backend"]
    fn test_losses_are_reproducible_at_full_batch_size() {
        let (d_loss, g_loss) = run_one_round(128);
        assert!(d_loss > 0.0 && g_loss > 0.0);
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let device = Default::default();
        let config = small_config(4);
        let model = config.model_config.init::<TestBackend>(&device);
        let mut discriminator = model.discriminator;
        let mut trainer = GanTrainer::new(&config, &device);

        let empty = Tensor::<TestBackend, 4>::zeros([0, 3, 32, 32], &device);
        let result = trainer.discriminator_step(empty, &model.generator, &mut discriminator);

        assert!(matches!(result, Err(TrainError::EmptyBatch)));
        assert_eq!(trainer.disc_steps(), 0);
    }

    #[test]
    fn test_wrong_resolution_is_rejected() {
        let device = Default::default();
        let config = small_config(2);
        let model = config.model_config.init::<TestBackend>(&device);
        let mut discriminator = model.discriminator;
        let before = trainable(&discriminator.state_dict());
        let mut trainer = GanTrainer::new(&config, &device);

        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);
        let result = trainer.discriminator_step(images, &model.generator, &mut discriminator);

        assert!(matches!(
            result,
            Err(TrainError::ImageShape { found: [2, 3, 64, 64], .. })
        ));
        assert_eq!(trainable(&discriminator.state_dict()), before);
    }

    #[test]
    fn test_zero_batch_size_is_rejected_for_generator() {
        let device = Default::default();
        let config = small_config(0);
        let model = config.model_config.init::<TestBackend>(&device);
        let mut generator = model.generator;
        let mut trainer = GanTrainer::new(&config, &device);

        let result = trainer.generator_step(&mut generator, &model.discriminator);
        assert!(matches!(result, Err(TrainError::InvalidBatchSize(0))));
    }

    #[test]
    fn test_latent_mismatch_is_rejected() {
        let device = Default::default();
        let config = small_config(2);
        let generator = crate::model::generator::GeneratorConfig::new()
            .with_latent_dim(64)
            .init::<TestBackend>(&device);
        let mut generator_mut = generator.clone();
        let model = config.model_config.init::<TestBackend>(&device);
        let mut discriminator = model.discriminator;
        let mut trainer = GanTrainer::new(&config, &device);

        assert!(matches!(
            trainer.generator_step(&mut generator_mut, &discriminator),
            Err(TrainError::LatentDim {
                expected: 64,
                found: 100
            })
        ));
        assert!(matches!(
            trainer.discriminator_step(real_batch(2), &generator, &mut discriminator),
            Err(TrainError::LatentDim { .. })
        ));
    }

    #[test]
    fn test_loop_runs_one_update_pair_per_batch() {
        let device = Default::default();
        let batch_size = 2;
        let config = small_config(batch_size)
            .with_snapshot_interval(2)
            .with_fixed_noise_samples(4)
            .with_grid_rows(2);

        let items = (0..3 * batch_size)
            .map(|i| ImageItem {
                pixels: vec![(i * 40) as u8; IMAGE_SIZE * IMAGE_SIZE * CHANNELS],
                label: 0,
            })
            .collect::<Vec<_>>();
        let dataloader: Arc<dyn DataLoader<TestBackend, ImageBatch<TestBackend>>> =
            DataLoaderBuilder::new(ImageBatcher::new(IMAGE_SIZE))
                .batch_size(batch_size)
                .build(InMemDataset::new(items));

        let model = config.model_config.init::<TestBackend>(&device);
        let (mut generator, mut discriminator) = (model.generator, model.discriminator);
        let mut trainer = GanTrainer::new(&config, &device);
        let fixed_noise = trainer.sample_noise(config.fixed_noise_samples);

        let history = train_loop(
            &config,
            &mut trainer,
            &mut generator,
            &mut discriminator,
            dataloader,
            fixed_noise,
        )
        .unwrap();

        assert_eq!(trainer.disc_steps(), 3);
        assert_eq!(trainer.gen_steps(), 3);
        assert_eq!(history.discriminator_losses.len(), 3);
        assert_eq!(history.generator_losses.len(), 3);

        // iteration 0, iteration 2 and the final batch (also iteration 2)
        let iterations = history
            .snapshots
            .iter()
            .map(|s| s.iteration)
            .collect::<Vec<_>>();
        assert_eq!(iterations, vec![0, 2]);
        // 2x2 grid of 32px images with 2px padding
        assert_eq!(history.snapshots[0].grid.width(), 2 * 34 + 2);
    }

    #[test]
    fn test_final_batch_is_always_snapshotted() {
        let device = Default::default();
        let batch_size = 2;
        let config = small_config(batch_size)
            .with_num_epochs(2)
            .with_snapshot_interval(50)
            .with_fixed_noise_samples(2);

        let items = (0..2 * batch_size)
            .map(|_| ImageItem {
                pixels: vec![128; IMAGE_SIZE * IMAGE_SIZE * CHANNELS],
                label: 0,
            })
            .collect::<Vec<_>>();
        let dataloader: Arc<dyn DataLoader<TestBackend, ImageBatch<TestBackend>>> =
            DataLoaderBuilder::new(ImageBatcher::new(IMAGE_SIZE))
                .batch_size(batch_size)
                .build(InMemDataset::new(items));

        let model = config.model_config.init::<TestBackend>(&device);
        let (mut generator, mut discriminator) = (model.generator, model.discriminator);
        let mut trainer = GanTrainer::new(&config, &device);
        let fixed_noise = trainer.sample_noise(2);

        let history = train_loop(
            &config,
            &mut trainer,
            &mut generator,
            &mut discriminator,
            dataloader,
            fixed_noise,
        )
        .unwrap();

        let snapshots = history
            .snapshots
            .iter()
            .map(|s| (s.epoch, s.iteration))
            .collect::<Vec<_>>();
        assert_eq!(snapshots, vec![(0, 0), (1, 3)]);
        assert_eq!(history.generator_losses.len(), 4);
    }

    #[test]
    fn test_train_writes_artifacts() {
        let device = Default::default();
        let data = tempfile::tempdir().unwrap();
        let class = data.path().join("faces");
        std::fs::create_dir_all(&class).unwrap();
        for i in 0..4u8 {
            image::RgbImage::from_pixel(40, 36, image::Rgb([i * 60, 10, 200]))
                .save(class.join(format!("{i}.png")))
                .unwrap();
        }
        let out = tempfile::tempdir().unwrap();
        let config = small_config(2)
            .with_fixed_noise_samples(4)
            .with_grid_rows(2);

        let history =
            train::<TestBackend>(config, data.path(), None, out.path(), &device).unwrap();

        assert_eq!(history.discriminator_losses.len(), 2);
        assert!(out.path().join("config.json").exists());
        assert!(out.path().join("losses.csv").exists());
        assert!(out.path().join("progress-000000.png").exists());
        assert!(out.path().join("progress-000001.png").exists());
    }
}
