use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::ledger::StoreLedger;
use super::{IMAGES_DIR, LEDGER_FILE};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::ops::{ClassVocabulary, ConversionRegistry, TransformRegistry};
use crate::parallel::ParallelMap;

/// Image extensions picked up by folder imports (compared lowercased)
const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff", "webp"];

const DATA_DIR: &str = "data";
const DATASETS_DIR: &str = "datasets";
const SCRATCH_DIR: &str = "tmp";
const DATASET_PREFIX: &str = "dataset-";

/// Result of an import into the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

/// Handle on a storage root.
///
/// Everything lives under `root`:
/// - `data/images/` the store's image pool
/// - `data/log.csv` the store ledger
/// - `data/datasets/dataset-<i>/` one directory per dataset
/// - `tmp/` scratch copies
///
/// The handle also carries the operation registries, the class vocabulary
/// and the worker pool size, so every store or dataset operation takes it
/// as its first argument.
pub struct Store {
    root: PathBuf,
    config: StoreConfig,
    conversions: ConversionRegistry,
    transforms: TransformRegistry,
    classes: ClassVocabulary,
    parallel: ParallelMap,
}

impl Store {
    /// Open a store with the built-in operations. Nothing is created on disk;
    /// see [`Store::init_storage_root`] and [`Store::init_ledger`].
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let store = Store {
            root: config.root.clone(),
            conversions: ConversionRegistry::with_defaults(config.scale_width, config.scale_height),
            transforms: TransformRegistry::with_defaults(config.scale_width, config.scale_height),
            classes: ClassVocabulary::from_config(&config)?,
            parallel: ParallelMap::new(config.pool_size),
            config,
        };

        log::debug!("📁 Store opened at: {}", store.root.display());
        Ok(store)
    }

    /// Replace the conversion registry.
    pub fn with_conversions(mut self, conversions: ConversionRegistry) -> Self {
        self.conversions = conversions;
        self
    }

    /// Replace the transform registry.
    pub fn with_transforms(mut self, transforms: TransformRegistry) -> Self {
        self.transforms = transforms;
        self
    }

    /// Replace the class vocabulary.
    pub fn with_classes(mut self, classes: ClassVocabulary) -> Self {
        self.classes = classes;
        self
    }

    pub fn conversions_mut(&mut self) -> &mut ConversionRegistry {
        &mut self.conversions
    }

    pub fn transforms_mut(&mut self) -> &mut TransformRegistry {
        &mut self.transforms
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn conversions(&self) -> &ConversionRegistry {
        &self.conversions
    }

    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }

    pub fn classes(&self) -> &ClassVocabulary {
        &self.classes
    }

    pub fn parallel(&self) -> &ParallelMap {
        &self.parallel
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_dir().join(IMAGES_DIR)
    }

    pub fn datasets_dir(&self) -> PathBuf {
        self.data_dir().join(DATASETS_DIR)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir().join(LEDGER_FILE)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.root.join(SCRATCH_DIR)
    }

    /// Directory of dataset number `index`
    pub fn dataset_path(&self, index: usize) -> PathBuf {
        self.datasets_dir().join(format!("{DATASET_PREFIX}{index}"))
    }

    /// Create `data/`, `data/images/` and `data/datasets/`. Directories that
    /// already exist are left alone.
    pub fn init_storage_root(&self) -> Result<()> {
        for dir in [self.data_dir(), self.images_dir(), self.datasets_dir()] {
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }
        log::info!("📁 Storage root ready at: {}", self.root.display());
        Ok(())
    }

    /// Write an empty store ledger with one flag column per registered
    /// conversion.
    ///
    /// Overwrites an existing ledger, rows included. Callers must check
    /// [`Store::ledger_exists`] first if the store may already hold data.
    pub fn init_ledger(&self) -> Result<()> {
        let path = self.ledger_path();
        StoreLedger::new(self.conversions.keys()).write(&path)?;
        log::info!("✅ Store ledger initialized at: {}", path.display());
        Ok(())
    }

    pub fn ledger_exists(&self) -> bool {
        self.ledger_path().is_file()
    }

    pub fn read_ledger(&self) -> Result<StoreLedger> {
        let path = self.ledger_path();
        if !path.exists() {
            return Err(StoreError::NotInitialized { path });
        }
        StoreLedger::read(&path)
    }

    pub fn write_ledger(&self, ledger: &StoreLedger) -> Result<()> {
        ledger.write(&self.ledger_path())
    }

    /// Import every image file under `folder` (recursively) with label `class`.
    pub fn import_folder(&self, folder: &Path, class: &str) -> Result<ImportReport> {
        log::info!("🔍 Scanning folder: {}", folder.display());

        let mut files = Vec::new();
        for entry in WalkDir::new(folder)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();

            // Only process files (not directories)
            if !path.is_file() {
                continue;
            }

            // Check if this is an image file by extension
            let Some(extension) = path.extension() else {
                continue;
            };
            let ext = extension.to_string_lossy().to_lowercase();
            if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }

            files.push(path.to_path_buf());
        }

        self.import_files(&files, class)
    }

    /// Copy `files` into the store pool and append ledger rows with every
    /// conversion flag unset. Files whose basename is already in the ledger
    /// are skipped.
    pub fn import_files(&self, files: &[PathBuf], class: &str) -> Result<ImportReport> {
        if !self.classes.contains(class) {
            return Err(StoreError::UnknownClass {
                key: class.to_string(),
            });
        }

        let mut ledger = self.read_ledger()?;
        let mut known: HashSet<String> = ledger.records.iter().map(|r| r.file.clone()).collect();
        let mut report = ImportReport::default();
        let mut jobs = Vec::new();

        for source in files {
            let name = file_name(source)?;
            if !known.insert(name.clone()) {
                report.skipped += 1;
                continue;
            }
            jobs.push((source.clone(), self.images_dir().join(&name)));
            ledger.push(name, class);
        }

        self.parallel.map_packed(
            |source: PathBuf, dest: PathBuf| {
                fs::copy(&source, &dest).map_err(|e| StoreError::io(&source, e))?;
                Ok(())
            },
            jobs,
        )?;

        self.write_ledger(&ledger)?;
        report.imported = files.len() - report.skipped;

        log::info!(
            "✅ Import complete: {} new, {} skipped",
            report.imported,
            report.skipped
        );
        Ok(report)
    }

    /// Apply `conversions` to stored files in place and flag them in the
    /// ledger. Conversions already flagged for a file are not run again.
    ///
    /// Each file is converted on a scratch copy. Nothing in the pool is
    /// touched until every chain succeeded and the resulting names are known
    /// to stay unique; a rename onto a name another row holds is an error.
    /// Returns the number of files that were converted.
    pub fn convert_store(&self, filenames: &[String], conversions: &[String]) -> Result<usize> {
        self.conversions.validate(conversions)?;

        let mut ledger = self.read_ledger()?;
        let wanted: HashSet<&str> = filenames.iter().map(String::as_str).collect();

        // Step 1: Work out what each matching row still needs
        let mut jobs = Vec::new();
        for (row, record) in ledger.records.iter().enumerate() {
            if !wanted.contains(record.file.as_str()) {
                continue;
            }
            let remaining = record.remaining(conversions);
            if remaining.is_empty() {
                continue;
            }
            jobs.push((row, remaining));
        }

        // Step 2: Convert scratch copies in parallel
        let images_dir = self.images_dir();
        let converted = match self.parallel.map(
            |(row, remaining): (usize, Vec<String>)| {
                let source = images_dir.join(&ledger.records[row].file);
                let scratch = self.scratch_copy(&format!("store-{row}"), &source)?;
                self.conversions.apply_chain(&scratch, &remaining)
            },
            jobs.clone(),
        ) {
            Ok(converted) => converted,
            Err(e) => {
                self.clear_scratch(&jobs);
                return Err(e);
            }
        };

        // Step 3: Check that the pool would still have unique names
        let mut final_names: Vec<String> = ledger.records.iter().map(|r| r.file.clone()).collect();
        for ((row, _), path) in jobs.iter().zip(&converted) {
            final_names[*row] = file_name(path)?;
        }
        let mut seen = HashSet::new();
        if let Some(name) = final_names.iter().find(|name| !seen.insert(name.as_str())) {
            self.clear_scratch(&jobs);
            return Err(StoreError::ledger(
                self.ledger_path(),
                format!("conversion would give two stored files the name '{name}'"),
            ));
        }

        // Step 4: Move results into the pool; renamed originals go first so
        // a new file can take over a name that is being freed
        for (row, _) in &jobs {
            if final_names[*row] != ledger.records[*row].file {
                let source = images_dir.join(&ledger.records[*row].file);
                fs::remove_file(&source).map_err(|e| StoreError::io(&source, e))?;
            }
        }
        for ((row, _), path) in jobs.iter().zip(&converted) {
            let dest = images_dir.join(&final_names[*row]);
            fs::copy(path, &dest).map_err(|e| StoreError::io(path, e))?;
        }
        self.clear_scratch(&jobs);

        for (row, applied) in &jobs {
            ledger.records[*row].file = final_names[*row].clone();
            for key in applied {
                ledger.mark_applied(*row, key);
            }
        }
        self.write_ledger(&ledger)?;

        log::info!(
            "🔄 Converted {} stored files with [{}]",
            jobs.len(),
            conversions.join(", ")
        );
        Ok(jobs.len())
    }

    /// Copy a file into `tmp/<slot>/`, creating it if needed.
    pub fn scratch_copy(&self, slot: &str, path: &Path) -> Result<PathBuf> {
        let dir = self.scratch_dir().join(slot);
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        let dest = dir.join(file_name(path)?);
        fs::copy(path, &dest).map_err(|e| StoreError::io(path, e))?;
        Ok(dest)
    }

    fn clear_scratch(&self, jobs: &[(usize, Vec<String>)]) {
        for (row, _) in jobs {
            let dir = self.scratch_dir().join(format!("store-{row}"));
            if !dir.exists() {
                continue;
            }
            if let Err(e) = fs::remove_dir_all(&dir) {
                log::warn!("⚠️  Could not clear {}: {}", dir.display(), e);
            }
        }
    }

    /// Indices of the existing `dataset-<i>` directories, ascending.
    pub fn list_datasets(&self) -> Result<Vec<usize>> {
        let dir = self.datasets_dir();
        let mut indices: Vec<usize> = fs::read_dir(&dir)
            .map_err(|e| StoreError::io(&dir, e))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix(DATASET_PREFIX))
                    .and_then(|n| n.parse().ok())
            })
            .collect();
        indices.sort_unstable();
        Ok(indices)
    }
}

/// Basename of a path as a string
pub(crate) fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            StoreError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })
}

// Implement Debug by hand; registries hold trait objects
impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("root", &self.root)
            .field("conversions", &self.conversions)
            .field("transforms", &self.transforms)
            .field("pool_size", &self.parallel.pool_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn open_store(root: &Path) -> Store {
        let mut config = StoreConfig::default().with_root(root);
        config.classes.insert("bar".to_string(), 1);
        let store = Store::open(config).unwrap();
        store.init_storage_root().unwrap();
        store.init_ledger().unwrap();
        store
    }

    fn write_image(path: &Path) {
        RgbImage::from_pixel(12, 8, Rgb([30, 60, 90])).save(path).unwrap();
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        store.init_storage_root().unwrap();

        assert!(store.images_dir().is_dir());
        assert!(store.datasets_dir().is_dir());
        assert!(store.ledger_exists());
        assert_eq!(
            store.read_ledger().unwrap().conversions,
            vec!["grayscale", "png", "scale"]
        );
    }

    #[test]
    fn test_init_ledger_overwrites_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        let mut ledger = store.read_ledger().unwrap();
        ledger.push("a.jpg", "bar");
        store.write_ledger(&ledger).unwrap();

        store.init_ledger().unwrap();
        assert!(store.read_ledger().unwrap().records.is_empty());
    }

    #[test]
    fn test_uninitialized_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(StoreConfig::default().with_root(dir.path())).unwrap();
        assert!(matches!(
            store.read_ledger(),
            Err(StoreError::NotInitialized { .. })
        ));
    }

    #[test]
    fn test_import_folder_skips_duplicates_and_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir.path().join("root"));

        let incoming = dir.path().join("incoming");
        fs::create_dir_all(incoming.join("nested")).unwrap();
        write_image(&incoming.join("one.jpg"));
        write_image(&incoming.join("nested/two.PNG"));
        fs::write(incoming.join("notes.txt"), "not an image").unwrap();

        let first = store.import_folder(&incoming, "bar").unwrap();
        assert_eq!(first, ImportReport { imported: 2, skipped: 0 });

        let second = store.import_folder(&incoming, "bar").unwrap();
        assert_eq!(second, ImportReport { imported: 0, skipped: 2 });

        let ledger = store.read_ledger().unwrap();
        assert_eq!(ledger.records.len(), 2);
        assert!(ledger.records.iter().all(|r| r.class == "bar"));
        assert!(ledger.records.iter().all(|r| r.flags.values().all(|f| !f)));
        assert!(store.images_dir().join("one.jpg").is_file());
        assert!(store.images_dir().join("two.PNG").is_file());
    }

    #[test]
    fn test_import_unknown_class() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        assert!(matches!(
            store.import_files(&[], "scatter"),
            Err(StoreError::UnknownClass { .. })
        ));
    }

    #[test]
    fn test_convert_store_sets_flags_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir.path().join("root"));
        let src = dir.path().join("chart.jpg");
        write_image(&src);
        store.import_files(&[src], "bar").unwrap();

        let files = vec!["chart.jpg".to_string()];
        let convs = vec!["png".to_string()];
        assert_eq!(store.convert_store(&files, &convs).unwrap(), 1);

        let ledger = store.read_ledger().unwrap();
        assert_eq!(ledger.records[0].file, "chart.png");
        assert!(ledger.records[0].is_applied("png"));
        assert!(!ledger.records[0].is_applied("scale"));
        assert!(store.images_dir().join("chart.png").is_file());
        assert!(!store.images_dir().join("chart.jpg").exists());

        // Already flagged: nothing to do
        let files = vec!["chart.png".to_string()];
        assert_eq!(store.convert_store(&files, &convs).unwrap(), 0);
    }

    #[test]
    fn test_convert_store_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir.path().join("root"));
        let red = dir.path().join("a.jpg");
        let blue = dir.path().join("a.png");
        RgbImage::from_pixel(4, 4, Rgb([255, 0, 0])).save(&red).unwrap();
        RgbImage::from_pixel(4, 4, Rgb([0, 0, 255])).save(&blue).unwrap();
        store.import_files(&[red, blue], "none").unwrap();

        let files = vec!["a.jpg".to_string()];
        let convs = vec!["png".to_string()];
        let err = store.convert_store(&files, &convs).unwrap_err();
        assert!(matches!(err, StoreError::LedgerFormat { .. }));

        // Pool and ledger are as they were
        let ledger = store.read_ledger().unwrap();
        assert_eq!(ledger.records[0].file, "a.jpg");
        assert!(!ledger.records[0].is_applied("png"));
        assert!(store.images_dir().join("a.jpg").is_file());
        let kept = image::open(store.images_dir().join("a.png")).unwrap().to_rgb8();
        assert_eq!(kept.get_pixel(0, 0), &Rgb([0, 0, 255]));
        assert!(!store.scratch_dir().join("store-0").exists());
    }

    #[test]
    fn test_convert_store_rejects_colliding_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir.path().join("root"));
        let jpg = dir.path().join("a.jpg");
        let bmp = dir.path().join("a.bmp");
        write_image(&jpg);
        write_image(&bmp);
        store.import_files(&[jpg, bmp], "none").unwrap();

        let files = vec!["a.jpg".to_string(), "a.bmp".to_string()];
        let convs = vec!["png".to_string()];
        assert!(store.convert_store(&files, &convs).is_err());

        assert!(store.images_dir().join("a.jpg").is_file());
        assert!(store.images_dir().join("a.bmp").is_file());
        assert!(!store.images_dir().join("a.png").exists());
        assert_eq!(store.read_ledger().unwrap().records.len(), 2);
    }

    #[test]
    fn test_list_datasets() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());
        for i in [2, 0, 10] {
            fs::create_dir_all(store.dataset_path(i)).unwrap();
        }
        fs::create_dir_all(store.datasets_dir().join("scratch")).unwrap();

        assert_eq!(store.list_datasets().unwrap(), vec![0, 2, 10]);
    }
}
