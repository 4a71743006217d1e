use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use image::{
    Delay, Frame,
    codecs::gif::{GifEncoder, Repeat},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(version, about = "Helper for build and dev tasks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// stitches frame<i>.png files of an interpolation run into <dir>/video/interpolation.gif
    MakeAnim {
        dir: PathBuf,
        /// number of interpolated frames; mirrored frames after them are picked up too
        frames: usize,
        #[arg(long, default_value_t = 100)]
        delay_ms: u32,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::MakeAnim {
            dir,
            frames,
            delay_ms,
        } => {
            println!("🎞️ assembling {} frames from {}", frames, dir.display());
            let output = make_anim(&dir, frames, delay_ms)?;
            println!("✅ Animation saved to {}", output.display());
        }
    }
    Ok(())
}

/// Consecutive `frame0.png`, `frame1.png`, ... found in `dir`.
fn frame_paths(dir: &Path) -> Vec<PathBuf> {
    (0..)
        .map(|i| dir.join(format!("frame{i}.png")))
        .take_while(|path| path.is_file())
        .collect()
}

fn make_anim(dir: &Path, frames: usize, delay_ms: u32) -> anyhow::Result<PathBuf> {
    let paths = frame_paths(dir);
    if paths.len() < frames {
        bail!(
            "expected at least {} frames in {} but found {}",
            frames,
            dir.display(),
            paths.len()
        );
    }

    let video_dir = dir.join("video");
    create_dir_all(&video_dir)?;
    let output = video_dir.join("interpolation.gif");
    let file = File::create(&output).with_context(|| format!("creating {}", output.display()))?;

    let mut encoder = GifEncoder::new(file);
    encoder.set_repeat(Repeat::Infinite)?;

    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{wide_bar} {pos}/{len} ({eta})")?
            .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    for path in &paths {
        let image = image::open(path)
            .with_context(|| format!("decoding {}", path.display()))?
            .into_rgba8();
        encoder.encode_frame(Frame::from_parts(
            image,
            0,
            0,
            Delay::from_numer_denom_ms(delay_ms, 1),
        ))?;
        pb.inc(1);
    }
    pb.finish_with_message("done");
    Ok(output)
}
