//! Dataset construction and deletion

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};
use crate::state::ledger::{DatasetLedger, DatasetRecord};
use crate::state::process::ProcessRecord;
use crate::state::store::{file_name, Store};
use crate::state::{IMAGES_DIR, LEDGER_FILE, PROCESS_FILE};

/// A file waiting to be copied into a dataset
#[derive(Debug, Clone)]
struct PendingImage {
    source: PathBuf,
    class: String,
    conversions: Vec<String>,
}

/// Create a new dataset from `filenames` and return its directory.
///
/// With `from_store`, `filenames` are matched against the store ledger; rows
/// are taken in ledger order and each one only gets the requested conversions
/// it hasn't had yet. Names the store doesn't know are skipped. Without
/// `from_store`, `filenames` are paths to copy as-is, labelled with the
/// default class and given every requested conversion.
///
/// Each image is copied into `images/` and converted there, in order; the
/// ledger records where each one ended up. Two images that would end up under
/// one name are an error. A dataset that fails part way through copying or
/// converting is removed again.
pub fn new_dataset(
    store: &Store,
    filenames: &[String],
    conversions: &[String],
    from_store: bool,
) -> Result<PathBuf> {
    store.conversions().validate(conversions)?;

    // Step 1: Work out what each file still needs
    let pending = if from_store {
        resolve_from_store(store, filenames, conversions)?
    } else {
        filenames
            .iter()
            .map(|f| PendingImage {
                source: PathBuf::from(f),
                class: store.classes().default_key().to_string(),
                conversions: conversions.to_vec(),
            })
            .collect()
    };
    let basenames = pending
        .iter()
        .map(|p| file_name(&p.source))
        .collect::<Result<Vec<_>>>()?;
    if let Some(name) = first_duplicate(&basenames) {
        return Err(name_clash(&store.datasets_dir(), &name));
    }

    // Step 2: Pick the first free dataset number
    let index = next_dataset_index(&store.datasets_dir())?;
    let dataset = store.dataset_path(index);
    let images_dir = dataset.join(IMAGES_DIR);

    // Step 3: Lay out the directory and the initial metadata
    fs::create_dir(&dataset).map_err(|e| StoreError::io(&dataset, e))?;
    fs::create_dir(&images_dir).map_err(|e| StoreError::io(&images_dir, e))?;
    ProcessRecord::new(conversions.to_vec()).save(&dataset.join(PROCESS_FILE))?;

    log::info!(
        "📦 Building {} from {} images",
        dataset.display(),
        pending.len()
    );

    // Step 4: Copy and convert in parallel
    let jobs: Vec<(PathBuf, Vec<String>)> = pending
        .iter()
        .map(|p| (p.source.clone(), p.conversions.clone()))
        .collect();
    let outputs = match store.parallel().map_packed(
        |source: PathBuf, to_apply: Vec<String>| {
            copy_and_apply(store, &images_dir, &source, &to_apply)
        },
        jobs,
    ) {
        Ok(outputs) => outputs,
        Err(e) => {
            discard(&dataset);
            return Err(e);
        }
    };

    // Conversions can still send two images to one name
    let entries: Vec<String> = outputs.iter().map(|p| ledger_path(&dataset, p)).collect();
    if let Some(name) = first_duplicate(&entries) {
        discard(&dataset);
        return Err(name_clash(&dataset, &name));
    }

    // Step 5: Record where every image ended up
    let records = entries
        .into_iter()
        .zip(&pending)
        .map(|(file, p)| DatasetRecord {
            file,
            class: p.class.clone(),
        })
        .collect();
    DatasetLedger::new(records).write(&dataset.join(LEDGER_FILE))?;

    log::info!("✅ Dataset ready: {}", dataset.display());
    Ok(dataset)
}

/// Recursively delete a dataset directory. A missing directory is an error.
pub fn delete_dataset(dataset: &Path) -> Result<()> {
    fs::remove_dir_all(dataset).map_err(|e| StoreError::io(dataset, e))?;
    log::info!("🗑️  Deleted dataset {}", dataset.display());
    Ok(())
}

/// Smallest `i` such that `dataset-i` isn't an entry of `datasets_dir`.
///
/// Not locked: two processes creating datasets at once can pick the same
/// number.
pub fn next_dataset_index(datasets_dir: &Path) -> Result<usize> {
    let taken: HashSet<String> = fs::read_dir(datasets_dir)
        .map_err(|e| StoreError::io(datasets_dir, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();

    Ok((0..)
        .find(|i| !taken.contains(&format!("dataset-{i}")))
        .unwrap_or(taken.len()))
}

fn resolve_from_store(
    store: &Store,
    filenames: &[String],
    conversions: &[String],
) -> Result<Vec<PendingImage>> {
    let ledger = store.read_ledger()?;
    let wanted: HashSet<&str> = filenames.iter().map(String::as_str).collect();

    let pending: Vec<PendingImage> = ledger
        .records
        .iter()
        .filter(|r| wanted.contains(r.file.as_str()))
        .map(|r| PendingImage {
            source: store.images_dir().join(&r.file),
            class: r.class.clone(),
            conversions: r.remaining(conversions),
        })
        .collect();

    if pending.len() < wanted.len() {
        let known: HashSet<&str> = ledger.records.iter().map(|r| r.file.as_str()).collect();
        for missing in wanted.iter().filter(|f| !known.contains(*f)) {
            log::warn!("⚠️  {} is not in the store, skipping", missing);
        }
    }

    Ok(pending)
}

/// Copy one file into the dataset and run its conversions on the copy.
fn copy_and_apply(
    store: &Store,
    images_dir: &Path,
    source: &Path,
    conversions: &[String],
) -> Result<PathBuf> {
    let copy = images_dir.join(file_name(source)?);
    fs::copy(source, &copy).map_err(|e| StoreError::io(source, e))?;
    log::debug!("   → {} ({} conversions)", copy.display(), conversions.len());
    store.conversions().apply_chain(&copy, conversions)
}

/// Remove a half-built dataset
fn discard(dataset: &Path) {
    if let Err(e) = fs::remove_dir_all(dataset) {
        log::warn!("⚠️  Could not remove {}: {}", dataset.display(), e);
    }
}

/// First name that appears more than once
fn first_duplicate(names: &[String]) -> Option<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .find(|name| !seen.insert(name.as_str()))
        .cloned()
}

fn name_clash(path: &Path, name: &str) -> StoreError {
    StoreError::ledger(path, format!("two images would both be stored as '{name}'"))
}

/// Ledger entry for an image: relative to the dataset when it lives inside it.
fn ledger_path(dataset: &Path, image: &Path) -> String {
    image
        .strip_prefix(dataset)
        .unwrap_or(image)
        .to_string_lossy()
        .replace('\\', "/")
}
