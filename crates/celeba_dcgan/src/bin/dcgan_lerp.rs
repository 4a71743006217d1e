use std::path::PathBuf;

use burn::{
    backend::{NdArray, Wgpu, ndarray::NdArrayDevice, wgpu::WgpuDevice},
    prelude::Backend,
    record::CompactRecorder,
};
use celeba_dcgan::{
    dcgan::{
        discriminator::DcganDiscriminatorConfig,
        gan::{DcganConfig, LossVariant},
        generator::DcganGeneratorConfig,
        interpolation::{
            DEFAULT_VIDEO_COMMAND, LerpSpace, VideoAssembler, interpolate_seeds, latent_play,
            load_config, load_gan, write_frames,
        },
        training::DCGAN_CONFIG_FILE,
    },
    device::{BackendChoice, select_backend, touch_wgpu_device},
    util::Normalization,
};
use clap::Parser;
use log::{info, warn};

// good seeds for the original loss: women 442, 491, 625; men 268, 296, 573
#[derive(Parser, Debug)]
#[command(version, about = "Lerp in latent/screen space")]
struct Cli {
    #[arg(long)]
    gpu: bool,
    /// gan | wgan | lsgan
    #[arg(short = 't', long = "type", default_value = "gan")]
    loss: LossVariant,
    /// generator checkpoint
    #[arg(short, long, value_name = "PATH")]
    pretrained: PathBuf,
    /// container config, defaults to dcgan_config.json next to the checkpoint
    #[arg(long)]
    config: Option<PathBuf>,
    /// output directory for interpolation/latent play
    #[arg(short, long, default_value = "./out")]
    dir: PathBuf,
    #[arg(short = 'f', long, default_value_t = 10, value_name = "N")]
    nb_frames: usize,
    /// turn frames into video/gif
    #[arg(short, long)]
    video: bool,
    #[arg(long, default_value = DEFAULT_VIDEO_COMMAND)]
    video_command: String,
    /// interpolate in latent space (random seeds s0 & s1)
    #[arg(short, long, num_args = 2, value_names = ["S0", "S1"], conflicts_with = "screen")]
    latent: Option<Vec<u64>>,
    /// interpolate in screen space (random seeds s0 & s1)
    #[arg(short, long, num_args = 2, value_names = ["S0", "S1"])]
    screen: Option<Vec<u64>>,
    /// play in latent space
    #[arg(long, value_name = "S")]
    latent_play: Option<u64>,
}

impl Cli {
    fn gan_config(&self) -> Result<DcganConfig, Box<dyn std::error::Error>> {
        let config_path = self.config.clone().or_else(|| {
            self.pretrained
                .parent()
                .map(|parent| parent.join(DCGAN_CONFIG_FILE))
        });
        let config = match config_path {
            Some(path) if path.is_file() => load_config(&path)?,
            _ => {
                warn!("No container config found, using the default architecture");
                DcganConfig::new(DcganGeneratorConfig::new(), DcganDiscriminatorConfig::new())
            }
        };
        Ok(config.with_loss(self.loss))
    }

    fn seeds(&self) -> Option<((u64, u64), LerpSpace)> {
        match (&self.latent, &self.screen) {
            (Some(seeds), _) => Some(((seeds[0], seeds[1]), LerpSpace::Latent)),
            (None, Some(seeds)) => Some(((seeds[0], seeds[1]), LerpSpace::Screen)),
            (None, None) => None,
        }
    }
}

fn run<B: Backend>(cli: &Cli, device: B::Device) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.gan_config()?;
    let gan = load_gan::<B, _>(&config, &cli.pretrained, &CompactRecorder::new(), &device)?;
    let normalization = Normalization::CELEBA;
    std::fs::create_dir_all(&cli.dir)?;

    if let Some((seeds, space)) = cli.seeds() {
        let frames = interpolate_seeds(&gan, seeds, space, cli.nb_frames);
        write_frames(frames, &cli.dir, cli.video, &normalization)?;
        if cli.video {
            match VideoAssembler::from_command_line(&cli.video_command) {
                Some(assembler) => {
                    assembler.assemble(&cli.dir, cli.nb_frames);
                }
                None => warn!("Empty video command, no video assembled"),
            }
        }
    }

    if let Some(seed) = cli.latent_play {
        let written = latent_play(&gan, seed, &cli.dir, &normalization)?;
        info!("Latent play: {} images saved in {}", written.len(), cli.dir.display());
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
    let cli = Cli::parse();

    match select_backend(cli.gpu, touch_wgpu_device) {
        BackendChoice::Wgpu => run::<Wgpu<f32, i32>>(&cli, WgpuDevice::DefaultDevice),
        BackendChoice::NdArray => run::<NdArray<f32>>(&cli, NdArrayDevice::Cpu),
    }
}
