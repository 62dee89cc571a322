//! Dataset operations
//!
//! A dataset is a numbered directory under `data/datasets/`:
//! - `images/` its own (converted) copies of the images
//! - `log.csv` file -> class ledger
//! - `process.json` conversions, transforms and bundling applied
//! - `X.npy` / `Y.npy` once materialized
//!
//! builder.rs creates and deletes datasets; materialize.rs turns them into
//! training arrays.

pub mod builder;
pub mod materialize;

pub use builder::{delete_dataset, new_dataset, next_dataset_index};
pub use materialize::{get_process, make_data, make_data_async, make_imageset, make_labelset};
