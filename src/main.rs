use anyhow::{Context, Result};
use burn::{
    config::Config,
    tensor::{backend::Backend, Distribution, Tensor},
};
use clap::{Parser, Subcommand};
use dcgan::{
    checkpoint::load_pretrained_weights, training::render_samples, ModelConfig, StateDict,
    TrainingConfig,
};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[cfg(feature = "wgpu")]
type MyBackend = burn::backend::Wgpu<f32>;
#[cfg(not(feature = "wgpu"))]
type MyBackend = dcgan::MyBackend;
type MyAutodiffBackend = burn::backend::Autodiff<MyBackend>;

#[derive(Parser)]
#[command(name = "dcgan")]
#[command(about = "Fine-tune a pre-trained DCGAN on an image folder", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run adversarial training on `data_root/<class>/<image>`
    Train {
        data_root: PathBuf,

        /// Directory holding weights_G.safetensors and weights_D.safetensors
        #[arg(short, long)]
        pretrained: Option<PathBuf>,

        #[arg(short, long, default_value = "/tmp/dcgan")]
        outdir: PathBuf,

        /// TrainingConfig JSON; defaults to the DCGAN settings
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        epochs: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Render generator samples, before and after loading pre-trained weights
    Sample {
        #[arg(short, long)]
        pretrained: Option<PathBuf>,

        #[arg(short, long, default_value = "/tmp/dcgan")]
        outdir: PathBuf,

        #[arg(short, long, default_value = "36")]
        count: usize,

        #[arg(long, default_value = "6")]
        nrow: usize,

        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Print the keys and shapes of a safetensors state dict
    Inspect { path: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let device = <MyBackend as Backend>::Device::default();

    match cli.command {
        Commands::Train {
            data_root,
            pretrained,
            outdir,
            config,
            epochs,
            batch_size,
            seed,
        } => {
            let mut config = match config {
                Some(path) => TrainingConfig::load(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => TrainingConfig::dcgan(),
            };
            if let Some(epochs) = epochs {
                config.num_epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }
            if let Some(seed) = seed {
                config.seed = seed;
            }

            let history = dcgan::train::<MyAutodiffBackend>(
                config,
                &data_root,
                pretrained.as_deref(),
                &outdir,
                &device,
            )?;
            info!(
                "{} iterations, {} snapshots written to {}",
                history.generator_losses.len(),
                history.snapshots.len(),
                outdir.display()
            );
        }
        Commands::Sample {
            pretrained,
            outdir,
            count,
            nrow,
            seed,
        } => sample(pretrained.as_deref(), &outdir, count, nrow, seed, &device)?,
        Commands::Inspect { path } => inspect(&path)?,
    }

    Ok(())
}

fn sample(
    pretrained: Option<&Path>,
    outdir: &Path,
    count: usize,
    nrow: usize,
    seed: u64,
    device: &<MyBackend as Backend>::Device,
) -> Result<()> {
    std::fs::create_dir_all(outdir)
        .with_context(|| format!("failed to create {}", outdir.display()))?;
    MyBackend::seed(seed);

    let model = ModelConfig::dcgan().init::<MyBackend>(device);
    let noise = Tensor::<MyBackend, 2>::random(
        [count, model.generator.latent_dim()],
        Distribution::Normal(0.0, 1.0),
        device,
    );

    let path = outdir.join("random.png");
    render_samples(&model.generator, noise.clone(), nrow).save(&path)?;
    info!("Randomly initialised generator samples saved to {}", path.display());

    if let Some(dir) = pretrained {
        let (generator, _) = load_pretrained_weights(&model.generator, &model.discriminator, dir)?;
        let path = outdir.join("pretrained.png");
        render_samples(&generator, noise, nrow).save(&path)?;
        info!("Pre-trained generator samples saved to {}", path.display());
    }

    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let dict = StateDict::load(path)?;

    println!("{} ({} tensors)", path.display(), dict.len());
    for (key, data) in dict.iter() {
        println!("{:<32} {:?} {:?}", key, data.shape, data.dtype);
    }

    Ok(())
}
