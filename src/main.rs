use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;

use imageset::{
    delete_dataset, get_process, make_data, new_dataset, Result, Store, StoreConfig,
};

/// Manage the image store and build training datasets from it
#[derive(Debug, Parser)]
#[command(name = "imageset", version, about)]
struct Cli {
    /// Storage root (overrides the config file and IMAGESET_ROOT)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log per-file steps
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the storage directories and the store ledger
    Init {
        /// Rewrite the ledger even if it already holds rows
        #[arg(long, default_value_t = false)]
        reset_ledger: bool,
    },
    /// Import every image under a folder into the store
    Import {
        folder: PathBuf,
        /// Class label for the imported images (defaults to the default class)
        #[arg(long)]
        class: Option<String>,
    },
    /// Apply conversions to stored images and flag them in the ledger
    Convert {
        #[arg(long, num_args = 1.., required = true)]
        conversions: Vec<String>,
        /// Stored filenames
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Create a new dataset
    New {
        #[arg(long, num_args = 0..)]
        conversions: Vec<String>,
        /// Treat FILES as paths on disk rather than store filenames
        #[arg(long, default_value_t = false)]
        raw: bool,
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Build X.npy and Y.npy for a dataset
    Make {
        /// Dataset number or directory
        dataset: String,
        #[arg(long, num_args = 0..)]
        transforms: Vec<String>,
        /// Keep every class id instead of collapsing to 0/1
        #[arg(long, default_value_t = false)]
        unbundled: bool,
    },
    /// Print a dataset's process metadata
    Show { dataset: String },
    /// Delete a dataset directory
    Delete { dataset: String },
    /// List existing datasets
    List,
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
    // RUST_LOG still wins when set
    builder.parse_default_env();
    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(buf, "[{}] {}", record.level(), record.args())
    });
    let _ = builder.try_init();
}

/// A dataset argument is either a number or a directory path.
fn dataset_dir(store: &Store, arg: &str) -> PathBuf {
    match arg.parse::<usize>() {
        Ok(index) => store.dataset_path(index),
        Err(_) => PathBuf::from(arg),
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = StoreConfig::load(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.root = root;
    }
    let store = Store::open(config)?;

    match cli.command {
        Command::Init { reset_ledger } => {
            store.init_storage_root()?;
            if store.ledger_exists() && !reset_ledger {
                log::info!(
                    "Ledger already exists at {}, leaving it alone",
                    store.ledger_path().display()
                );
            } else {
                store.init_ledger()?;
            }
        }
        Command::Import { folder, class } => {
            let class = class.unwrap_or_else(|| store.classes().default_key().to_string());
            let report = store.import_folder(&folder, &class)?;
            println!("{} imported, {} skipped", report.imported, report.skipped);
        }
        Command::Convert { conversions, files } => {
            let converted = store.convert_store(&files, &conversions)?;
            println!("{converted} files converted");
        }
        Command::New {
            conversions,
            raw,
            files,
        } => {
            let dataset = new_dataset(&store, &files, &conversions, !raw)?;
            println!("{}", dataset.display());
        }
        Command::Make {
            dataset,
            transforms,
            unbundled,
        } => {
            let dir = dataset_dir(&store, &dataset);
            if !make_data(&store, &dir, &transforms, !unbundled)? {
                log::error!("❌ Could not build arrays for {}", dir.display());
                std::process::exit(1);
            }
        }
        Command::Show { dataset } => {
            let process = get_process(&dataset_dir(&store, &dataset))?;
            println!("Conversions: {}", process.conversions.join(", "));
            println!("Transforms:  {}", process.transforms.join(", "));
            match process.bundled {
                Some(bundled) => println!("Bundled:     {bundled}"),
                None => println!("Bundled:     (labels not built)"),
            }
        }
        Command::Delete { dataset } => {
            delete_dataset(&dataset_dir(&store, &dataset))?;
        }
        Command::List => {
            for index in store.list_datasets()? {
                println!("{}", store.dataset_path(index).display());
            }
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        log::error!("❌ {e}");
        std::process::exit(1);
    }
}
