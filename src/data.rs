use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
    tensor::{ElementConversion, TensorData},
};
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

use crate::error::DatasetError;

const EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

// ////////////////////////////////////////////////////////////////////////////
// Dataset

/// One square RGB image, stored row-major as `[size, size, 3]` bytes.
#[derive(Debug, Clone)]
pub struct ImageItem {
    pub pixels: Vec<u8>,
    pub label: usize,
}

/// Images laid out as `root/<class>/<image>`, resized and center-cropped to a
/// fixed square resolution when loaded.
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    items: Vec<ImageItem>,
    classes: Vec<String>,
}

impl ImageFolderDataset {
    pub fn new<P: AsRef<Path>>(root: P, image_size: usize) -> Result<Self, DatasetError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(DatasetError::MissingRoot(root.to_path_buf()));
        }

        let mut class_dirs = Vec::new();
        let entries = std::fs::read_dir(root).map_err(|source| DatasetError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| DatasetError::Io {
                path: root.to_path_buf(),
                source,
            })?;
            if entry.path().is_dir() {
                class_dirs.push(entry.path());
            }
        }
        if class_dirs.is_empty() {
            return Err(DatasetError::NoClasses(root.to_path_buf()));
        }
        class_dirs.sort();

        let mut classes = Vec::with_capacity(class_dirs.len());
        let mut items = Vec::new();
        for (label, class_dir) in class_dirs.iter().enumerate() {
            for entry in WalkDir::new(class_dir).sort_by_file_name() {
                let entry = entry?;
                let path = entry.path();
                if entry.file_type().is_file() && has_image_extension(path) {
                    let pixels = load_image(path, image_size)?;
                    items.push(ImageItem { pixels, label });
                }
            }
            classes.push(class_name(class_dir));
        }
        if items.is_empty() {
            return Err(DatasetError::Empty(root.to_path_buf()));
        }

        info!(
            "Loaded {} images in {} classes from {}",
            items.len(),
            classes.len(),
            root.display()
        );

        Ok(Self { items, classes })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

impl Dataset<ImageItem> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn class_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Decodes an image, scales its shorter side to `size` and crops the center
/// square.
pub fn load_image(path: &Path, size: usize) -> Result<Vec<u8>, DatasetError> {
    let image = image::open(path).map_err(|source| DatasetError::Image {
        path: PathBuf::from(path),
        source,
    })?;
    let size = size as u32;
    let image = image.resize_to_fill(size, size, FilterType::Triangle);

    Ok(image.to_rgb8().into_raw())
}

// ////////////////////////////////////////////////////////////////////////////
// Batcher

#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// `[B, 3, size, size]`, values in `[-1, 1]`.
    pub images: Tensor<B, 4>,
    pub labels: Tensor<B, 1, Int>,
}

#[derive(Debug, Clone)]
pub struct ImageBatcher {
    image_size: usize,
}
impl ImageBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }

    fn to_tensor<B: Backend>(&self, item: &ImageItem, device: &B::Device) -> Tensor<B, 3> {
        let size = self.image_size;
        // x / 255 normalised with mean 0.5, std 0.5
        let values = item
            .pixels
            .iter()
            .map(|p| *p as f32 / 127.5 - 1.0)
            .collect::<Vec<_>>();

        // [H, W, C] -> [C, W, H] -> [C, H, W]
        Tensor::<B, 3>::from_data(TensorData::new(values, [size, size, 3]), device)
            .swap_dims(0, 2)
            .swap_dims(1, 2)
    }
}
impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let images = items
            .iter()
            .map(|item| self.to_tensor::<B>(item, device).unsqueeze_dim(0))
            .collect::<Vec<_>>();

        let labels = items
            .iter()
            .map(|item| {
                Tensor::<B, 1, Int>::from_data([(item.label as i64).elem::<B::IntElem>()], device)
            })
            .collect::<Vec<_>>();

        ImageBatch {
            images: Tensor::cat(images, 0),
            labels: Tensor::cat(labels, 0),
        }
    }
}
