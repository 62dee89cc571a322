//! Dataset materialization into `X.npy` / `Y.npy`
//!
//! `make_data` loads every image listed in a dataset ledger, runs the
//! requested transforms over the whole collection, stacks the result into a
//! single `u8` array (`X.npy`), then resolves the labels into an `i64` vector
//! (`Y.npy`). Both steps record what they did in `process.json`.

use ndarray::{ArrayD, IxDyn};
use npyz::WriterBuilder;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::ops::{load_image_array, ImageArray};
use crate::state::ledger::DatasetLedger;
use crate::state::process::ProcessRecord;
use crate::state::store::Store;
use crate::state::{temp_path, FEATURES_FILE, LABELS_FILE, LEDGER_FILE, PROCESS_FILE};

/// Build `X.npy` and `Y.npy` for a dataset.
///
/// Returns `Ok(false)` when the dataset ledger or one of its images is
/// missing; in that case nothing is written and the label step is skipped.
/// Every other failure is an error.
pub fn make_data(store: &Store, dataset: &Path, transforms: &[String], bundled: bool) -> Result<bool> {
    if !make_imageset(store, dataset, transforms)? {
        return Ok(false);
    }
    make_labelset(store, dataset, bundled)
}

/// [`make_data`] on tokio's blocking pool.
pub async fn make_data_async(
    store: Arc<Store>,
    dataset: PathBuf,
    transforms: Vec<String>,
    bundled: bool,
) -> Result<bool> {
    // Spawn blocking because decoding and transforms are CPU-bound
    tokio::task::spawn_blocking(move || make_data(&store, &dataset, &transforms, bundled))
        .await
        .map_err(|e| StoreError::Task(format!("Task join error: {}", e)))?
}

/// Load, transform and stack the dataset's images into `X.npy`, then set the
/// metadata transform list to `transforms`.
pub fn make_imageset(store: &Store, dataset: &Path, transforms: &[String]) -> Result<bool> {
    store.transforms().validate(transforms)?;

    let ledger = match DatasetLedger::read(&dataset.join(LEDGER_FILE)) {
        Ok(ledger) => ledger,
        Err(e) if e.is_not_found() => {
            log::warn!("⚠️  No ledger in {}, nothing to build", dataset.display());
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    let paths: Vec<PathBuf> = ledger
        .files()
        .into_iter()
        .map(|f| resolve_image(dataset, f))
        .collect();

    let mut images = match store
        .parallel()
        .map(|path: PathBuf| load_image_array(&path), paths)
    {
        Ok(images) => images,
        Err(e) if e.is_not_found() => {
            log::warn!("⚠️  {}", e);
            return Ok(false);
        }
        Err(e) => return Err(e),
    };
    log::debug!("📷 Loaded {} images from {}", images.len(), dataset.display());

    for key in transforms {
        let transform = store.transforms().get(key)?;
        images = store
            .parallel()
            .map(|image: ImageArray| transform.apply(image), images)?;
        log::debug!("   → applied {}", key);
    }

    let features = stack_images(&images)?;
    save_npy(
        &dataset.join(FEATURES_FILE),
        features.shape(),
        features.iter().copied(),
    )?;

    ProcessRecord::update(&dataset.join(PROCESS_FILE), |record| {
        record.transforms = transforms.to_vec();
    })?;

    log::info!(
        "🧮 Wrote {} with shape {:?}",
        dataset.join(FEATURES_FILE).display(),
        features.shape()
    );
    Ok(true)
}

/// Resolve the ledger's classes into `Y.npy`, collapsing to 0/1 when
/// `bundled`, and record the flag in the metadata.
pub fn make_labelset(store: &Store, dataset: &Path, bundled: bool) -> Result<bool> {
    let ledger = DatasetLedger::read(&dataset.join(LEDGER_FILE))?;
    let labels = store.classes().label_ids(&ledger.classes(), bundled)?;

    save_npy(
        &dataset.join(LABELS_FILE),
        &[labels.len()],
        labels.iter().copied(),
    )?;

    ProcessRecord::update(&dataset.join(PROCESS_FILE), |record| {
        record.bundled = Some(bundled);
    })?;

    log::info!(
        "🏷️  Wrote {} labels (bundled: {})",
        labels.len(),
        bundled
    );
    Ok(true)
}

/// Read a dataset's process metadata.
pub fn get_process(dataset: &Path) -> Result<ProcessRecord> {
    ProcessRecord::load(&dataset.join(PROCESS_FILE))
}

fn resolve_image(dataset: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        dataset.join(path)
    }
}

/// Stack equally-shaped images along a new leading axis.
///
/// An empty collection gives a `[0]` array.
pub fn stack_images(images: &[ImageArray]) -> Result<ArrayD<u8>> {
    let Some(first) = images.first() else {
        return Ok(ArrayD::zeros(IxDyn(&[0])));
    };
    let expected = first.shape().to_vec();

    let mut data = Vec::with_capacity(images.len() * first.len());
    for (index, image) in images.iter().enumerate() {
        if image.shape() != expected.as_slice() {
            return Err(StoreError::ShapeMismatch {
                index,
                expected,
                found: image.shape().to_vec(),
            });
        }
        data.extend(image.iter().copied());
    }

    let mut shape = Vec::with_capacity(expected.len() + 1);
    shape.push(images.len());
    shape.extend_from_slice(&expected);

    ArrayD::from_shape_vec(IxDyn(&shape), data)
        .map_err(|_| StoreError::UnsupportedLayout { shape })
}

/// Write a C-order `.npy` file through a temp file.
fn save_npy<T, I>(path: &Path, shape: &[usize], data: I) -> Result<()>
where
    T: npyz::AutoSerialize,
    I: IntoIterator<Item = T>,
{
    let tmp = temp_path(path);
    let shape: Vec<u64> = shape.iter().map(|&d| d as u64).collect();

    let file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
    let mut writer = npyz::WriteOptions::<T>::new()
        .default_dtype()
        .shape(&shape)
        .writer(BufWriter::new(file))
        .begin_nd()
        .map_err(|e| StoreError::io(&tmp, e))?;
    writer.extend(data).map_err(|e| StoreError::io(&tmp, e))?;
    writer.finish().map_err(|e| StoreError::io(&tmp, e))?;

    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_adds_leading_axis() {
        let images = vec![
            ArrayD::from_elem(IxDyn(&[2, 3]), 1u8),
            ArrayD::from_elem(IxDyn(&[2, 3]), 2u8),
        ];
        let stacked = stack_images(&images).unwrap();

        assert_eq!(stacked.shape(), &[2, 2, 3]);
        assert_eq!(stacked[[0, 1, 2]], 1);
        assert_eq!(stacked[[1, 0, 0]], 2);
    }

    #[test]
    fn test_stack_rejects_mixed_shapes() {
        let images = vec![
            ArrayD::from_elem(IxDyn(&[2, 3]), 0u8),
            ArrayD::from_elem(IxDyn(&[3, 2]), 0u8),
        ];
        assert!(matches!(
            stack_images(&images),
            Err(StoreError::ShapeMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn test_stack_empty() {
        assert_eq!(stack_images(&[]).unwrap().shape(), &[0]);
    }

    #[test]
    fn test_npy_readback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Y.npy");
        save_npy(&path, &[4], vec![0i64, 1, 0, 1]).unwrap();

        let npy = npyz::NpyFile::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(npy.shape(), &[4]);
        assert_eq!(npy.into_vec::<i64>().unwrap(), vec![0, 1, 0, 1]);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_resolve_image() {
        let dataset = Path::new("/data/datasets/dataset-0");
        assert_eq!(
            resolve_image(dataset, "images/a.png"),
            PathBuf::from("/data/datasets/dataset-0/images/a.png")
        );
        assert_eq!(
            resolve_image(dataset, "/abs/b.png"),
            PathBuf::from("/abs/b.png")
        );
    }
}
