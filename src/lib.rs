//! Image dataset store
//!
//! Imports image files into a store, builds numbered datasets out of them
//! with file-level conversions, and materializes datasets into `X.npy` /
//! `Y.npy` arrays for model training.
//!
//! ```no_run
//! use imageset::{make_data, new_dataset, Store, StoreConfig};
//!
//! # fn main() -> imageset::Result<()> {
//! let store = Store::open(StoreConfig::default().with_root("/srv/imageset"))?;
//! store.init_storage_root()?;
//! if !store.ledger_exists() {
//!     store.init_ledger()?;
//! }
//! store.import_folder(std::path::Path::new("/tmp/charts"), "none")?;
//!
//! let files = vec!["bar_01.jpg".to_string()];
//! let dataset = new_dataset(&store, &files, &["png".to_string()], true)?;
//! make_data(&store, &dataset, &["grayscale".to_string()], true)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod ops;
pub mod parallel;
pub mod state;

pub use config::StoreConfig;
pub use dataset::{
    delete_dataset, get_process, make_data, make_data_async, make_imageset, make_labelset,
    new_dataset,
};
pub use error::{Result, StoreError};
pub use ops::{ClassVocabulary, Conversion, ConversionRegistry, ImageArray, Transform, TransformRegistry};
pub use parallel::ParallelMap;
pub use state::ledger::{DatasetLedger, DatasetRecord, StoreLedger, StoreRecord};
pub use state::process::ProcessRecord;
pub use state::store::{ImportReport, Store};
