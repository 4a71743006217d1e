use std::{fmt, path::PathBuf, str::FromStr, time::Instant};

use burn::{
    config::{Config, ConfigError},
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    optim::AdamConfig,
    record::{FileRecorder, RecorderError},
    tensor::backend::AutodiffBackend,
};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, info};
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    celeba_database::{
        celeba_batcher::CelebaBatcher,
        celeba_dataset::{CelebaDataset, CelebaDatasetError},
    },
    logging::DcganLogger,
    metrics::{AverageMeter, LossHistory, LossHistoryError},
    util::{ImageGridOptions, ImageSaveError, Normalization, image_grid, tensor_to_images},
};

use super::{
    discriminator::DcganDiscriminator,
    gan::{Dcgan, DcganConfig, GanError},
    generator::DcganGenerator,
};

/// Name of the container config written next to the checkpoints.
pub const DCGAN_CONFIG_FILE: &str = "dcgan_config.json";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Adam,
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::Adam => f.write_str("adam"),
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = GanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "adam" => Ok(Self::Adam),
            anything_else => Err(GanError::NotImplemented(format!(
                "the {anything_else:?} optimizer"
            ))),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum DcganModelProvider {
    Config(DcganConfig),
    /// fresh container whose generator weights come from a checkpoint
    Pretrained {
        config: DcganConfig,
        checkpoint_path: PathBuf,
    },
    Checkpoint {
        config_path: PathBuf,
        checkpoint_path: PathBuf,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum TrainDataConfig {
    /// Folder scanned for images, optionally keeping only the first `limit`.
    ImageFolder {
        root_dir: PathBuf,
        limit: Option<usize>,
    },
    /// Index written by [`CelebaDataset::save_to_ron`].
    Index { path: PathBuf },
}

impl fmt::Display for TrainDataConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainDataConfig::ImageFolder { root_dir, .. } => write!(f, "{}", root_dir.display()),
            TrainDataConfig::Index { path } => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Config)]
pub struct TrainingConfig {
    #[config(default = "OptimizerKind::Adam")]
    pub optimizer: OptimizerKind,
    #[config(default = 0.0002)]
    pub learning_rate: f64,
    #[config(default = 0.5)]
    pub beta_1: f32,
    #[config(default = 0.999)]
    pub beta_2: f32,
    #[config(default = 5)]
    pub num_epochs: usize,
    /// the generator is updated on every n-th batch
    #[config(default = 3)]
    pub generator_interval: usize,
    #[config(default = 5)]
    pub batch_report_interval: usize,
    /// persist the loss history on every n-th batch
    pub stats_interval: Option<usize>,
    #[config(default = 0)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 64)]
    pub image_size: u32,
    /// images in the per-epoch sample grid
    #[config(default = 16)]
    pub num_samples: usize,
    pub ckpts_path: PathBuf,
    pub stats_path: PathBuf,
    pub gen_dir: PathBuf,
    pub train_data: TrainDataConfig,
}

impl TrainingConfig {
    fn validate(&self) -> Result<(), TrainingError> {
        let intervals = [
            ("generator_interval", Some(self.generator_interval)),
            ("batch_report_interval", Some(self.batch_report_interval)),
            ("stats_interval", self.stats_interval),
        ];
        for (name, interval) in intervals {
            if interval == Some(0) {
                return Err(TrainingError::InvalidConfig(format!("{name} must be positive")));
            }
        }
        Ok(())
    }

    /// Whether the generator steps on batch `batch_idx` of an epoch.
    pub fn trains_generator(&self, batch_idx: usize) -> bool {
        batch_idx % self.generator_interval == 0
    }

    pub fn checkpoint_path(&self, epoch: usize) -> PathBuf {
        self.ckpts_path.join(format!("dcgan-gen-epoch-{epoch}"))
    }

    pub fn stats_file(&self, gan_config: &DcganConfig) -> PathBuf {
        self.ckpts_path.join(format!("{}-stats.ron", gan_config.loss))
    }

    pub fn sample_path(&self, epoch: usize) -> PathBuf {
        self.gen_dir.join(format!("epoch-{epoch}.png"))
    }
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Dataset error: {0}")]
    DatasetError(#[from] CelebaDatasetError),
    #[error("Failed to load DcganConfig due to: {0}")]
    ModelConfigDeserializationError(#[from] ConfigError),
    #[error("Failed to load or save generator weights due to: {0}")]
    ModelWeightsError(#[from] RecorderError),
    #[error("{0}")]
    GanError(#[from] GanError),
    #[error("Failed to save the loss history due to: {0}")]
    StatsError(#[from] LossHistoryError),
    #[error("Failed to save generated samples due to: {0}")]
    SampleError(#[from] ImageSaveError),
    #[error("Invalid training configuration: {0}")]
    InvalidConfig(String),
}

/// What a finished run hands back.
pub struct TrainingSummary<B: AutodiffBackend> {
    pub gan: Dcgan<B>,
    /// last observed generator loss, `None` if the generator never stepped
    pub generator_loss: Option<f64>,
    pub discriminator_loss: Option<f64>,
    /// generator updates over the whole run
    pub generator_steps: usize,
    pub history: LossHistory,
}

pub fn load_model<B: AutodiffBackend, R: FileRecorder<B>>(
    model_provider: DcganModelProvider,
    device: &B::Device,
    recorder: &R,
) -> Result<Dcgan<B>, TrainingError> {
    let gan = match model_provider {
        DcganModelProvider::Config(config) => config.init::<B>(device),
        DcganModelProvider::Pretrained {
            config,
            checkpoint_path,
        } => {
            info!("Loading generator checkpoint from: {}", checkpoint_path.display());
            config
                .init::<B>(device)
                .load_generator(&checkpoint_path, recorder)?
        }
        DcganModelProvider::Checkpoint {
            config_path,
            checkpoint_path,
        } => {
            info!("Loading generator checkpoint from: {}", checkpoint_path.display());
            DcganConfig::load(&config_path)?
                .init::<B>(device)
                .load_generator(&checkpoint_path, recorder)?
        }
    };
    Ok(gan)
}

fn load_dataset(data: &TrainDataConfig) -> Result<CelebaDataset, TrainingError> {
    let dataset = match data {
        TrainDataConfig::ImageFolder { root_dir, limit } => CelebaDataset::new(root_dir, *limit)?,
        TrainDataConfig::Index { path } => CelebaDataset::load_from_ron(path)?,
    };
    Ok(dataset)
}

fn format_header<B: AutodiffBackend>(gan: &Dcgan<B>, data: &TrainDataConfig, train_len: usize) {
    let (disc_params, gen_params) = gan.num_params();
    let sep = "-".repeat(80);
    info!("{sep}");
    info!("{}", gan.loss().description());
    info!("Discriminator parameters: {disc_params}");
    info!("Generator parameters: {gen_params}");
    info!("Training data: {data} ({train_len} images)");
    info!("{sep}");
}

pub fn train_gan<B: AutodiffBackend, R: FileRecorder<B>>(
    config: TrainingConfig,
    model_provider: DcganModelProvider,
    device: B::Device,
    log: DcganLogger,
    recorder: R,
) -> Result<TrainingSummary<B>, TrainingError> {
    config.validate()?;
    for dir in [&config.ckpts_path, &config.stats_path, &config.gen_dir] {
        std::fs::create_dir_all(dir)?;
    }
    config.save(config.stats_path.join("training_config.json"))?;

    B::seed(config.seed);
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut gan = load_model::<B, R>(model_provider, &device, &recorder)?;
    gan.config().save(config.ckpts_path.join(DCGAN_CONFIG_FILE))?;
    let batch_size = gan.batch_size();

    let adam = match config.optimizer {
        OptimizerKind::Adam => AdamConfig::new()
            .with_beta_1(config.beta_1)
            .with_beta_2(config.beta_2),
    };
    let mut opt_generator = adam.init::<B, DcganGenerator<B>>();
    let mut opt_discriminator = adam.init::<B, DcganDiscriminator<B>>();

    let dataset = load_dataset(&config.train_data)?;
    let train_len = dataset.len();
    let num_batches = train_len / batch_size;
    format_header(&gan, &config.train_data, train_len);

    let normalization = Normalization::CELEBA;
    let batcher = CelebaBatcher::<B>::new(device.clone(), config.image_size, normalization);
    let builder = DataLoaderBuilder::new(batcher)
        .batch_size(batch_size)
        .shuffle(config.seed);
    let builder = if config.num_workers > 0 {
        builder.num_workers(config.num_workers)
    } else {
        builder
    };
    let dataloader_train = builder.build(dataset);

    let m = MultiProgress::new();
    let sty = ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("##-");
    let epoch_bar = m.add(ProgressBar::new(config.num_epochs as u64));
    epoch_bar.set_style(sty.clone());
    epoch_bar.set_message("Epochs");

    let stats_file = config.stats_file(gan.config());
    let mut history = LossHistory::default();
    let mut last_g_loss = None;
    let mut last_d_loss = None;
    let mut generator_steps = 0;
    let mut iteration = 0;
    let start = Instant::now();

    for epoch in 1..config.num_epochs + 1 {
        info!("EPOCH {} / {}", epoch, config.num_epochs);
        let start_epoch = Instant::now();
        let mut g_losses = AverageMeter::new();
        let mut d_losses = AverageMeter::new();
        let mut batch_times = AverageMeter::new();

        let training_bar = m.add(ProgressBar::new(num_batches as u64));
        training_bar.set_style(sty.clone());
        training_bar.set_message("Training Progress");

        for (batch_idx, batch) in dataloader_train.iter().enumerate() {
            let [actual, _, _, _] = batch.images.dims();
            if actual != batch_size {
                debug!("Skipping batch {batch_idx} with {actual} of {batch_size} images");
                continue;
            }
            let batch_start = Instant::now();

            let d_loss = gan.train_discriminator(
                batch.images,
                &mut opt_discriminator,
                config.learning_rate,
                &mut rng,
            )?;
            last_d_loss = Some(d_loss);
            d_losses.update(d_loss, batch_size);

            if config.trains_generator(batch_idx) {
                last_g_loss =
                    Some(gan.train_generator(&mut opt_generator, config.learning_rate, &mut rng)?);
                generator_steps += 1;
            }
            // between generator steps the latest value keeps counting
            if let Some(g_loss) = last_g_loss {
                g_losses.update(g_loss, batch_size);
            }

            batch_times.update(batch_start.elapsed().as_secs_f64() * 1000., 1);
            training_bar.inc(1);
            training_bar.set_message(format!(
                "G loss: {:>7.4} | D loss: {:>7.4}",
                g_losses.avg, d_losses.avg
            ));
            iteration += 1;

            if batch_idx % config.batch_report_interval == 0 && batch_idx != 0 {
                history.push(g_losses.avg, d_losses.avg);
                info!(
                    "Batch {} / {} | G loss: {:>7.4} | D loss: {:>7.4} | Avg time per batch: {} ms",
                    batch_idx, num_batches, g_losses.avg, d_losses.avg, batch_times.avg as u64
                );
                log.log_losses("training", iteration, g_losses.avg, d_losses.avg, batch_times.avg);
                for meter in [&mut g_losses, &mut d_losses, &mut batch_times] {
                    meter.reset();
                }
            }
            if let Some(stats_interval) = config.stats_interval {
                if batch_idx % stats_interval == 0 && batch_idx != 0 {
                    history.save_to_ron(&stats_file)?;
                }
            }
        }
        m.remove(&training_bar);
        epoch_bar.inc(1);

        info!("Elapsed time for epoch: {:.2?}", start_epoch.elapsed());
        let checkpoint = config.checkpoint_path(epoch);
        gan.save_generator(&checkpoint, &recorder)?;
        info!("Saving generator checkpoint to: {}", checkpoint.display());

        // same latent batch every epoch
        let gan_valid = gan.valid();
        let mut sample_rng = StdRng::seed_from_u64(config.seed);
        let latent = gan_valid.create_latent_variable(config.num_samples, &mut sample_rng);
        let samples = tensor_to_images(gan_valid.generate_images(latent), &normalization)?;
        let grid = image_grid(&samples, ImageGridOptions::Auto);
        grid.save(config.sample_path(epoch))
            .map_err(ImageSaveError::from)?;
        log.log_samples("training", iteration, &grid);
    }
    epoch_bar.finish();
    if config.stats_interval.is_some() {
        history.save_to_ron(&stats_file)?;
    }
    info!("Training done! Total elapsed time: {:.2?}", start.elapsed());

    Ok(TrainingSummary {
        gan,
        generator_loss: last_g_loss,
        discriminator_loss: last_d_loss,
        generator_steps,
        history,
    })
}
