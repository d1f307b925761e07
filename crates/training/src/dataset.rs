//! PNG dataset directories.
//!
//! Layout under a dataset root:
//! - `images/<name>.png`: input images (luma for depth 1, RGB for 3, RGBA for 4)
//! - `masks/<name>.png`: ground-truth masks; pixels brighter than 127 are foreground
//!
//! Images and masks are paired by file name and sorted by name.

use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage};

use crate::data::{ImageArray, ImageGeometry, LabelArray};
use crate::error::{HarnessError, HarnessResult};

pub const IMAGES_DIR: &str = "images";
pub const MASKS_DIR: &str = "masks";
const MASK_THRESHOLD: u8 = 127;

#[derive(Debug, Clone)]
pub struct Dataset {
    /// File names, in sample order.
    pub names: Vec<String>,
    pub images: ImageArray,
    pub labels: LabelArray,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Sorted `*.png` paths directly under `dir`.
pub fn list_pngs(dir: &Path) -> HarnessResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| HarnessError::io(dir, e))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| {
            p.extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

fn open(path: &Path) -> HarnessResult<DynamicImage> {
    image::open(path).map_err(|source| HarnessError::Image {
        path: path.to_path_buf(),
        source,
    })
}

fn check_size(path: &Path, geometry: &ImageGeometry, width: u32, height: u32) -> HarnessResult<()> {
    if (height as usize, width as usize) != (geometry.height, geometry.width) {
        log::warn!("{} is {width}x{height}", path.display());
        return Err(HarnessError::ShapeMismatch {
            what: "image file",
            expected: vec![geometry.height, geometry.width],
            found: vec![height as usize, width as usize],
        });
    }
    Ok(())
}

/// Decode one image into `[h, w, depth]` values in [0, 1].
fn decode_image(path: &Path, geometry: &ImageGeometry) -> HarnessResult<Vec<f32>> {
    let img = open(path)?;
    check_size(path, geometry, img.width(), img.height())?;
    let raw = match geometry.depth {
        1 => img.to_luma8().into_raw(),
        3 => img.to_rgb8().into_raw(),
        4 => img.to_rgba8().into_raw(),
        depth => {
            return Err(HarnessError::InvalidConfig(format!(
                "PNG datasets support depth 1, 3 or 4, not {depth}"
            )))
        }
    };
    Ok(raw.into_iter().map(|v| v as f32 / 255.0).collect())
}

fn decode_mask(path: &Path, geometry: &ImageGeometry) -> HarnessResult<Vec<bool>> {
    let img = open(path)?;
    check_size(path, geometry, img.width(), img.height())?;
    Ok(img
        .to_luma8()
        .into_raw()
        .into_iter()
        .map(|v| v > MASK_THRESHOLD)
        .collect())
}

pub fn load_images(paths: &[PathBuf], geometry: ImageGeometry) -> HarnessResult<ImageArray> {
    let mut data = Vec::with_capacity(paths.len() * geometry.image_len());
    for path in paths {
        data.extend(decode_image(path, &geometry)?);
    }
    ImageArray::new(data, paths.len(), geometry)
}

pub fn load_masks(paths: &[PathBuf], geometry: ImageGeometry) -> HarnessResult<LabelArray> {
    let mut data = Vec::with_capacity(paths.len() * geometry.pixels());
    for path in paths {
        data.extend(decode_mask(path, &geometry)?);
    }
    LabelArray::new(data, paths.len(), geometry.height, geometry.width)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Images only, for prediction; masks are not required.
pub fn load_unlabeled(root: &Path, geometry: ImageGeometry) -> HarnessResult<(Vec<String>, ImageArray)> {
    let paths = list_pngs(&root.join(IMAGES_DIR))?;
    let names = paths.iter().map(|p| file_name(p)).collect();
    Ok((names, load_images(&paths, geometry)?))
}

/// Every image under `root/images` with its mask from `root/masks`.
pub fn load_dataset(root: &Path, geometry: ImageGeometry) -> HarnessResult<Dataset> {
    let image_paths = list_pngs(&root.join(IMAGES_DIR))?;
    let masks_dir = root.join(MASKS_DIR);
    let mut names = Vec::with_capacity(image_paths.len());
    let mut mask_paths = Vec::with_capacity(image_paths.len());
    for path in &image_paths {
        let name = file_name(path);
        let mask = masks_dir.join(&name);
        if !mask.is_file() {
            return Err(HarnessError::Data(format!(
                "missing mask for {name} under {}",
                masks_dir.display()
            )));
        }
        names.push(name);
        mask_paths.push(mask);
    }

    let images = load_images(&image_paths, geometry)?;
    let labels = load_masks(&mask_paths, geometry)?;
    log::info!("loaded {} samples from {}", names.len(), root.display());
    Ok(Dataset {
        names,
        images,
        labels,
    })
}

/// Write each label map as a black/white PNG named after its sample.
pub fn save_masks(dir: &Path, names: &[String], labels: &LabelArray) -> HarnessResult<()> {
    if names.len() != labels.count {
        return Err(HarnessError::ShapeMismatch {
            what: "mask names",
            expected: vec![labels.count],
            found: vec![names.len()],
        });
    }
    fs::create_dir_all(dir).map_err(|e| HarnessError::io(dir, e))?;
    for (index, name) in names.iter().enumerate() {
        let pixels = labels
            .map(index)
            .iter()
            .map(|&v| if v { 255u8 } else { 0 })
            .collect();
        let img = GrayImage::from_raw(labels.width as u32, labels.height as u32, pixels)
            .ok_or_else(|| HarnessError::Data(format!("mask buffer for {name} has wrong size")))?;
        let path = dir.join(name);
        img.save(&path)
            .map_err(|source| HarnessError::Image { path, source })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn write_sample(root: &Path, name: &str, shade: u8, mask_on: &[(u32, u32)]) {
        fs::create_dir_all(root.join(IMAGES_DIR)).unwrap();
        fs::create_dir_all(root.join(MASKS_DIR)).unwrap();
        RgbImage::from_pixel(3, 2, Rgb([shade, 0, 255]))
            .save(root.join(IMAGES_DIR).join(name))
            .unwrap();
        let mut mask = GrayImage::new(3, 2);
        for &(x, y) in mask_on {
            mask.put_pixel(x, y, Luma([200]));
        }
        mask.save(root.join(MASKS_DIR).join(name)).unwrap();
    }

    #[test]
    fn loads_sorted_pairs() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path(), "b.png", 0, &[]);
        write_sample(dir.path(), "a.png", 255, &[(2, 1)]);

        let ds = load_dataset(dir.path(), ImageGeometry::new(2, 3, 3)).unwrap();
        assert_eq!(ds.names, vec!["a.png", "b.png"]);
        assert_eq!(ds.images.shape(), [2, 2, 3, 3]);
        assert_eq!(&ds.images.image(0)[..3], &[1.0, 0.0, 1.0]);
        assert_eq!(
            ds.labels.map(0),
            &[false, false, false, false, false, true]
        );
        assert!(ds.labels.map(1).iter().all(|&v| !v));
    }

    #[test]
    fn missing_mask_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path(), "a.png", 10, &[]);
        fs::remove_file(dir.path().join(MASKS_DIR).join("a.png")).unwrap();
        let err = load_dataset(dir.path(), ImageGeometry::new(2, 3, 3)).unwrap_err();
        assert!(matches!(err, HarnessError::Data(_)));
    }

    #[test]
    fn wrong_size_is_a_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_sample(dir.path(), "a.png", 10, &[]);
        let err = load_dataset(dir.path(), ImageGeometry::new(4, 4, 3)).unwrap_err();
        assert!(matches!(
            err,
            HarnessError::ShapeMismatch {
                what: "image file",
                ..
            }
        ));
    }

    #[test]
    fn saved_masks_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let labels = LabelArray::new(vec![true, false, false, true], 1, 2, 2).unwrap();
        save_masks(dir.path(), &["m.png".to_string()], &labels).unwrap();
        let loaded = load_masks(&[dir.path().join("m.png")], ImageGeometry::new(2, 2, 1)).unwrap();
        assert_eq!(loaded, labels);
    }
}
