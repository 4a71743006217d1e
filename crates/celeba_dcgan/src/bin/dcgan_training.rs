use std::path::PathBuf;

use burn::{
    backend::{Autodiff, NdArray, Wgpu, ndarray::NdArrayDevice, wgpu::WgpuDevice},
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
};
use celeba_dcgan::{
    celeba_database::celeba_dataset::{CelebaDataset, REDUX_SIZE},
    dcgan::{
        discriminator::DcganDiscriminatorConfig,
        gan::{DcganConfig, LossVariant},
        generator::DcganGeneratorConfig,
        training::{DcganModelProvider, OptimizerKind, TrainDataConfig, TrainingConfig, train_gan},
    },
    device::{BackendChoice, select_backend, touch_wgpu_device},
    logging::DcganLogger,
};
use clap::Parser;
use log::info;

#[derive(Parser, Debug)]
#[command(version, about = "Trains a DCGAN on CelebA")]
struct Cli {
    /// where generator checkpoints and loss statistics are written
    #[arg(short, long, default_value = "./checkpoints")]
    ckpts_path: PathBuf,
    /// generator checkpoint to resume from
    #[arg(short, long, value_name = "PATH")]
    pretrained: Option<PathBuf>,
    /// og | wasserstein
    #[arg(short = 't', long = "type", default_value = "og")]
    loss: LossVariant,
    /// only use the first 10 000 images
    #[arg(short, long)]
    redux: bool,
    #[arg(long, default_value = "./data/celebA")]
    root_dir: PathBuf,
    /// dataset index (.ron) used instead of scanning root_dir
    #[arg(long)]
    index: Option<PathBuf>,
    #[arg(long, default_value = "./generated")]
    gen_dir: PathBuf,
    #[arg(long, default_value = "./stats")]
    stats_path: PathBuf,
    #[arg(short, long, default_value_t = 5)]
    epochs: usize,
    #[arg(short, long, default_value_t = 128)]
    batch_size: usize,
    #[arg(short, long, default_value_t = 0.0002)]
    learning_rate: f64,
    #[arg(long, default_value = "adam")]
    optim: OptimizerKind,
    #[arg(long, default_value_t = 5)]
    report_interval: usize,
    /// save the loss history every n batches
    #[arg(long)]
    stats_interval: Option<usize>,
    #[arg(long, default_value_t = 0)]
    num_workers: usize,
    #[arg(long)]
    gpu: bool,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// stream losses and samples to a spawned rerun viewer
    #[arg(long)]
    viewer: bool,
    /// print the per channel mean and std of the dataset and exit
    #[arg(long)]
    measure_normalization: bool,
}

impl Cli {
    fn train_data(&self) -> TrainDataConfig {
        match &self.index {
            Some(path) => TrainDataConfig::Index { path: path.clone() },
            None => TrainDataConfig::ImageFolder {
                root_dir: self.root_dir.clone(),
                limit: self.redux.then_some(REDUX_SIZE),
            },
        }
    }

    fn training_config(&self) -> TrainingConfig {
        TrainingConfig::new(
            self.ckpts_path.clone(),
            self.stats_path.clone(),
            self.gen_dir.clone(),
            self.train_data(),
        )
        .with_optimizer(self.optim)
        .with_learning_rate(self.learning_rate)
        .with_num_epochs(self.epochs)
        .with_batch_report_interval(self.report_interval)
        .with_stats_interval(self.stats_interval)
        .with_num_workers(self.num_workers)
        .with_seed(self.seed)
    }

    fn model_provider(&self) -> DcganModelProvider {
        let config = DcganConfig::new(DcganGeneratorConfig::new(), DcganDiscriminatorConfig::new())
            .with_loss(self.loss)
            .with_batch_size(self.batch_size);
        match &self.pretrained {
            Some(checkpoint_path) => DcganModelProvider::Pretrained {
                config,
                checkpoint_path: checkpoint_path.clone(),
            },
            None => DcganModelProvider::Config(config),
        }
    }
}

fn run<B: AutodiffBackend>(
    cli: &Cli,
    device: B::Device,
    log: DcganLogger,
) -> Result<(), Box<dyn std::error::Error>> {
    let summary = train_gan::<B, _>(
        cli.training_config(),
        cli.model_provider(),
        device,
        log,
        CompactRecorder::new(),
    )?;
    let format_loss = |loss: Option<f64>| loss.map_or("-".to_string(), |l| format!("{l:.4}"));
    info!(
        "Final losses | G: {} | D: {}",
        format_loss(summary.generator_loss),
        format_loss(summary.discriminator_loss)
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log = if cli.viewer {
        let stream = rerun::RecordingStreamBuilder::new("train celeba dcgan").spawn()?;
        rerun::Logger::new(stream.clone()) // recording streams are ref-counted
            .with_path_prefix("logs")
            .with_filter(rerun::default_log_filter())
            .init()?;
        DcganLogger::new(stream)
    } else {
        pretty_env_logger::formatted_builder()
            .filter_level(log::LevelFilter::Info)
            .parse_default_env()
            .init();
        DcganLogger::disabled()
    };

    if cli.measure_normalization {
        let dataset = match cli.train_data() {
            TrainDataConfig::ImageFolder { root_dir, limit } => CelebaDataset::new(&root_dir, limit)?,
            TrainDataConfig::Index { path } => CelebaDataset::load_from_ron(&path)?,
        };
        let normalization = dataset.channel_statistics()?;
        info!("Mean = {:?}", normalization.mean);
        info!("Std = {:?}", normalization.std);
        return Ok(());
    }

    match select_backend(cli.gpu, touch_wgpu_device) {
        BackendChoice::Wgpu => run::<Autodiff<Wgpu<f32, i32>>>(&cli, WgpuDevice::DefaultDevice, log),
        BackendChoice::NdArray => run::<Autodiff<NdArray<f32>>>(&cli, NdArrayDevice::Cpu, log),
    }
}
