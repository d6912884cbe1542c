use burn::prelude::*;
use image::{Rgb, RgbImage};
use serde::Serialize;
use std::path::Path;

use crate::training::TrainingHistory;

/// Lays a batch `[B, 3, H, W]` out on a grid with `nrow` images per row,
/// separated by `padding` black pixels. Values are min-max normalised over
/// the whole batch before conversion to 8 bit.
pub fn make_grid<B: Backend>(images: Tensor<B, 4>, nrow: usize, padding: usize) -> RgbImage {
    let [count, channels, height, width] = images.dims();
    let values = images
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .unwrap_or_default();

    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    let scale = 1.0 / (max - min).max(1e-5);

    let xmaps = nrow.clamp(1, count.max(1));
    let ymaps = count.div_ceil(xmaps);
    let cell_h = height + padding;
    let cell_w = width + padding;
    let mut grid = RgbImage::new(
        (xmaps * cell_w + padding) as u32,
        (ymaps * cell_h + padding) as u32,
    );

    for index in 0..count {
        let x0 = (index % xmaps) * cell_w + padding;
        let y0 = (index / xmaps) * cell_h + padding;
        let image = &values[index * channels * height * width..][..channels * height * width];

        for y in 0..height {
            for x in 0..width {
                let mut pixel = [0u8; 3];
                for (c, out) in pixel.iter_mut().enumerate() {
                    // grey images repeat their single channel
                    let plane = if channels == 1 { 0 } else { c };
                    let v = (image[(plane * height + y) * width + x] - min) * scale;
                    *out = (v * 255.0 + 0.5).clamp(0.0, 255.0) as u8;
                }
                grid.put_pixel((x0 + x) as u32, (y0 + y) as u32, Rgb(pixel));
            }
        }
    }

    grid
}

#[derive(Serialize)]
struct LossRecord {
    iteration: usize,
    generator_loss: f32,
    discriminator_loss: f32,
}

pub fn save_losses<P: AsRef<Path>>(history: &TrainingHistory, path: P) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    let losses = history
        .generator_losses
        .iter()
        .zip(&history.discriminator_losses);
    for (iteration, (generator_loss, discriminator_loss)) in losses.enumerate() {
        writer.serialize(LossRecord {
            iteration,
            generator_loss: *generator_loss,
            discriminator_loss: *discriminator_loss,
        })?;
    }
    writer.flush()?;

    Ok(())
}
