use image::RgbImage;
use rerun::{AsComponents, RecordingStream, external::ndarray};

/// Sends training scalars and sample images to a rerun recording.
///
/// Logging failures never interrupt training; they only show up as debug
/// lines of the `log` facade.
#[derive(Clone)]
pub struct DcganLogger {
    stream: RecordingStream,
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum LogContainerParsingError {
    #[error("Pixel buffer does not fit [{}, {}, 3] due to {}", .0, .1, .2)]
    ShapeParsingError(usize, usize, String),
    #[error("failed to convert from image due to {}", .0)]
    ImageConstructionError(String),
}

/// Wraps an RGB picture as a rerun image archetype.
pub fn rerun_image(image: &RgbImage) -> Result<rerun::Image, LogContainerParsingError> {
    let (w, h) = image.dimensions();
    let (w, h) = (w as usize, h as usize);
    let nd = ndarray::Array3::<u8>::from_shape_vec((h, w, 3), image.as_raw().clone())
        .map_err(|e| LogContainerParsingError::ShapeParsingError(h, w, format!("{:?}", e)))?;
    rerun::Image::from_color_model_and_tensor(rerun::ColorModel::RGB, nd)
        .map_err(|e| LogContainerParsingError::ImageConstructionError(format!("{:?}", e)))
}

impl DcganLogger {
    pub fn new(stream: RecordingStream) -> Self {
        Self { stream }
    }

    /// A logger whose recording drops everything.
    pub fn disabled() -> Self {
        Self::new(RecordingStream::disabled())
    }

    fn send(&self, path: String, entity: &impl AsComponents) {
        if let Err(e) = self.stream.log(path.as_str(), entity) {
            log::debug!("rerun rejected {path}: {e}");
        }
    }

    /// Running averages of one reporting interval.
    pub fn log_losses(
        &self,
        base_path: &str,
        step: usize,
        generator_loss: f64,
        discriminator_loss: f64,
        batch_ms: f64,
    ) {
        self.stream.set_time_sequence("step", step as i64);
        self.send(
            format!("graphs/{}/loss/generator", base_path),
            &rerun::Scalar::new(generator_loss),
        );
        self.send(
            format!("graphs/{}/loss/discriminator", base_path),
            &rerun::Scalar::new(discriminator_loss),
        );
        self.send(
            format!("graphs/{}/batch_ms", base_path),
            &rerun::Scalar::new(batch_ms),
        );
    }

    pub fn log_samples(&self, base_path: &str, step: usize, grid: &RgbImage) {
        self.stream.set_time_sequence("step", step as i64);
        let path = format!("{}/images/samples", base_path);
        match rerun_image(grid) {
            Ok(image) => self.send(path, &image),
            Err(e) => self.send(
                path,
                &rerun::TextLog::new(format!("Failed to convert samples due to {:?}", e))
                    .with_level(rerun::TextLogLevel::ERROR),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_image_converts() {
        let image = RgbImage::from_pixel(4, 2, image::Rgb([1, 2, 3]));
        assert!(rerun_image(&image).is_ok());
    }

    #[test]
    fn disabled_logger_accepts_everything() {
        let logger = DcganLogger::disabled();
        logger.log_losses("training", 1, 0.5, 1.5, 12.0);
        logger.log_samples("training", 1, &RgbImage::new(2, 2));
    }
}
