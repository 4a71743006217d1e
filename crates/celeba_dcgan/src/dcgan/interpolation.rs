use std::{
    fmt,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use burn::{
    config::{Config, ConfigError},
    prelude::Backend,
    record::{FileRecorder, RecorderError},
    tensor::{DataError, Tensor, TensorData},
};
use log::{debug, info};
use rand::{SeedableRng, rngs::StdRng};
use thiserror::Error;

use crate::util::{ImageSaveError, Normalization, tensor_to_image};

use super::gan::{Dcgan, DcganConfig};

/// Value a latent coordinate is pushed to, against its sign, in latent play.
pub const LATENT_PLAY_MAGNITUDE: f32 = 3.0;

pub const DEFAULT_VIDEO_COMMAND: &str = "cargo xtask make-anim";

#[derive(Debug, Error)]
pub enum InterpolationError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to load DcganConfig due to: {0}")]
    ModelConfigDeserializationError(#[from] ConfigError),
    #[error("Failed to load generator weights due to: {0}")]
    ModelWeightsDeserializationError(#[from] RecorderError),
    #[error("Failed to save frame due to: {0}")]
    FrameError(#[from] ImageSaveError),
    #[error("Failed to read latent values due to {:?}", .0)]
    LatentError(DataError),
    #[error("At least one frame is required")]
    NoFrames,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LerpSpace {
    /// blend the latents, then decode
    Latent,
    /// decode both ends, then blend the pictures
    Screen,
}

impl fmt::Display for LerpSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LerpSpace::Latent => f.write_str("latent"),
            LerpSpace::Screen => f.write_str("screen"),
        }
    }
}

/// Builds an inference container from a saved config and a generator checkpoint.
pub fn load_gan<B: Backend, R: FileRecorder<B>>(
    config: &DcganConfig,
    checkpoint_path: &Path,
    recorder: &R,
    device: &B::Device,
) -> Result<Dcgan<B>, InterpolationError> {
    info!("Loading generator checkpoint from: {}", checkpoint_path.display());
    Ok(config
        .init::<B>(device)
        .load_generator(checkpoint_path, recorder)?)
}

pub fn load_config(path: &Path) -> Result<DcganConfig, InterpolationError> {
    Ok(DcganConfig::load(path)?)
}

/// Single latent vector drawn from an RNG seeded with `seed`.
pub fn latent_from_seed<B: Backend>(gan: &Dcgan<B>, seed: u64) -> Tensor<B, 4> {
    let mut rng = StdRng::seed_from_u64(seed);
    gan.create_latent_variable(1, &mut rng)
}

fn blend<B: Backend, const D: usize>(a: &Tensor<B, D>, b: &Tensor<B, D>, alpha: f64) -> Tensor<B, D> {
    a.clone().mul_scalar(1.0 - alpha) + b.clone().mul_scalar(alpha)
}

/// `nb_frames` decoded blends with `alpha = i / nb_frames`; `z1` itself is
/// never reached.
pub fn latent_lerp<B: Backend>(
    gan: &Dcgan<B>,
    z0: Tensor<B, 4>,
    z1: Tensor<B, 4>,
    nb_frames: usize,
) -> Vec<Tensor<B, 3>> {
    (0..nb_frames)
        .map(|i| gan.generate_image(blend(&z0, &z1, i as f64 / nb_frames as f64)))
        .collect()
}

/// Pixel space counterpart of [`latent_lerp`].
pub fn screen_lerp<B: Backend>(
    x0: Tensor<B, 3>,
    x1: Tensor<B, 3>,
    nb_frames: usize,
) -> Vec<Tensor<B, 3>> {
    (0..nb_frames)
        .map(|i| blend(&x0, &x1, i as f64 / nb_frames as f64))
        .collect()
}

pub fn interpolate_seeds<B: Backend>(
    gan: &Dcgan<B>,
    seeds: (u64, u64),
    space: LerpSpace,
    nb_frames: usize,
) -> Vec<Tensor<B, 3>> {
    info!(
        "Interpolating random seeds {} & {} in {} space...",
        seeds.0, seeds.1, space
    );
    let z0 = latent_from_seed(gan, seeds.0);
    let z1 = latent_from_seed(gan, seeds.1);
    match space {
        LerpSpace::Latent => latent_lerp(gan, z0, z1, nb_frames),
        LerpSpace::Screen => screen_lerp(gan.generate_image(z0), gan.generate_image(z1), nb_frames),
    }
}

/// Writes `frame<i>.png` for every frame. With `mirror`, frame `i` is also
/// written as `frame<2n - i - 1>.png` so the sequence plays forth and back.
pub fn write_frames<B: Backend>(
    frames: Vec<Tensor<B, 3>>,
    dir: &Path,
    mirror: bool,
    normalization: &Normalization,
) -> Result<Vec<PathBuf>, InterpolationError> {
    if frames.is_empty() {
        return Err(InterpolationError::NoFrames);
    }
    std::fs::create_dir_all(dir)?;
    let nb_frames = frames.len();
    let mut written = Vec::with_capacity(if mirror { 2 * nb_frames } else { nb_frames });
    for (i, frame) in frames.into_iter().enumerate() {
        let image = tensor_to_image(frame, normalization)?;
        let mut indices = vec![i];
        if mirror {
            indices.push(2 * nb_frames - i - 1);
        }
        for index in indices {
            let path = dir.join(format!("frame{index}.png"));
            image.save(&path).map_err(ImageSaveError::from)?;
            written.push(path);
        }
    }
    info!("Interpolated {} images saved in {}", nb_frames, dir.display());
    Ok(written)
}

/// One latent per coordinate of `z0`, with that coordinate pushed to
/// `-sign(z0[i]) * 3` and every other coordinate unchanged.
pub fn pushed_latents<B: Backend>(
    z0: &Tensor<B, 4>,
) -> Result<Vec<Tensor<B, 4>>, InterpolationError> {
    let shape = z0.dims();
    let values = z0
        .to_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(InterpolationError::LatentError)?;

    let latents = values
        .iter()
        .enumerate()
        .map(|(i, z)| {
            let mut pushed = values.clone();
            pushed[i] = if *z == 0.0 {
                0.0
            } else {
                -z.signum() * LATENT_PLAY_MAGNITUDE
            };
            debug!("i={:2}, z={:2.4}", i, z);
            Tensor::<B, 4>::from_data(TensorData::new(pushed, shape), &z0.device())
        })
        .collect();
    Ok(latents)
}

/// Saves `dim_og.png` for the seeded latent, then `dim<i>.png` for each
/// latent of [`pushed_latents`].
pub fn latent_play<B: Backend>(
    gan: &Dcgan<B>,
    seed: u64,
    dir: &Path,
    normalization: &Normalization,
) -> Result<Vec<PathBuf>, InterpolationError> {
    std::fs::create_dir_all(dir)?;
    let z0 = latent_from_seed(gan, seed);
    let latents = pushed_latents(&z0)?;

    let mut written = Vec::with_capacity(latents.len() + 1);
    let path = dir.join("dim_og.png");
    tensor_to_image(gan.generate_image(z0), normalization)?
        .save(&path)
        .map_err(ImageSaveError::from)?;
    written.push(path);

    for (i, latent) in latents.into_iter().enumerate() {
        let path = dir.join(format!("dim{i}.png"));
        tensor_to_image(gan.generate_image(latent), normalization)?
            .save(&path)
            .map_err(ImageSaveError::from)?;
        written.push(path);
    }
    Ok(written)
}

/// External program turning `frame<i>.png` files into an animation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoAssembler {
    program: String,
    args: Vec<String>,
}

impl Default for VideoAssembler {
    fn default() -> Self {
        Self {
            program: "cargo".into(),
            args: vec!["xtask".into(), "make-anim".into()],
        }
    }
}

impl VideoAssembler {
    /// Splits on whitespace; `None` for a blank line.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Runs `<command> <dir> <nb_frames>` with output discarded. Returns
    /// whether it succeeded; failures are only logged at debug level.
    pub fn assemble(&self, dir: &Path, nb_frames: usize) -> bool {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(dir)
            .arg(nb_frames.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(status) if status.success() => {
                info!("Interpolation video saved in {}", dir.join("video").display());
                true
            }
            Ok(status) => {
                debug!("{} exited with {}", self.program, status);
                false
            }
            Err(e) => {
                debug!("Unable to run {}: {}", self.program, e);
                false
            }
        }
    }
}
