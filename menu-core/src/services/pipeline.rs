use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::BatchError;
use crate::logging::Logging;
use crate::model::record::{Failure, ImageOutcome, ResultRecord};
use crate::services::ai::{self, ChatCompletion};
use crate::services::ocr::{self, OcrEngine};

const IMAGE_EXTENSION: &str = "jpg";

pub struct Pipeline {
    ocr: Arc<dyn OcrEngine>,
    chat: Arc<dyn ChatCompletion>,
    workers: usize,
    logging: Logging,
}

impl Pipeline {
    /// `workers: None` sizes the pool to the host CPU count.
    pub fn new(
        ocr: Arc<dyn OcrEngine>,
        chat: Arc<dyn ChatCompletion>,
        workers: Option<usize>,
        logging: Logging,
    ) -> Self {
        let workers = workers.unwrap_or_else(num_cpus::get).max(1);

        Pipeline {
            ocr,
            chat,
            workers,
            logging,
        }
    }

    /// Processes every `.jpg` directly under `dir`. Returns one record per
    /// image, in listing order, once all of them are done.
    pub fn run(&self, dir: &Path) -> Result<Vec<ResultRecord>, BatchError> {
        let images = list_images(dir)?;
        info!(
            "Processing {} image(s) from {} with {} worker(s)",
            images.len(),
            dir.display(),
            self.workers
        );

        if images.is_empty() {
            return Ok(Vec::new());
        }

        let pool = self.build_pool()?;
        let engine: &dyn OcrEngine = self.ocr.as_ref();
        let chat: &dyn ChatCompletion = self.chat.as_ref();

        let mut tagged: Vec<(usize, ResultRecord)> = pool.install(|| {
            images
                .par_iter()
                .enumerate()
                .map(|(idx, path)| (idx, process_image(engine, chat, path)))
                .collect()
        });

        // Output order is the listing index, whatever order the pool collects in.
        tagged.sort_by_key(|(idx, _)| *idx);

        Ok(tagged.into_iter().map(|(_, record)| record).collect())
    }

    // Each worker thread gets the run's logger as its default.
    fn build_pool(&self) -> Result<ThreadPool, BatchError> {
        let logging = self.logging.clone();

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("menu-worker-{i}"))
            .spawn_handler(move |thread| {
                let logging = logging.clone();
                let mut builder = std::thread::Builder::new();
                if let Some(name) = thread.name() {
                    builder = builder.name(name.to_owned());
                }
                if let Some(size) = thread.stack_size() {
                    builder = builder.stack_size(size);
                }
                builder.spawn(move || logging.scope(|| thread.run()))?;
                Ok(())
            })
            .build()?;

        Ok(pool)
    }
}

/// OCR then structuring for a single image. Never fails: any error becomes
/// a failed outcome with `data = null`.
pub fn process_image(
    engine: &dyn OcrEngine,
    chat: &dyn ChatCompletion,
    path: &Path,
) -> ResultRecord {
    let file = file_name(path);

    let outcome = match structure_image(engine, chat, path) {
        Ok(data) => {
            info!("Processed data for {file}: {data}");
            ImageOutcome::Structured(data)
        }
        Err(failure) => {
            error!("Error processing {file}: {}", failure.reason);
            ImageOutcome::Failed(failure)
        }
    };

    ResultRecord::new(file, outcome)
}

fn structure_image(
    engine: &dyn OcrEngine,
    chat: &dyn ChatCompletion,
    path: &Path,
) -> Result<Value, Failure> {
    let raw_text = ocr::extract(engine, path)?;
    Ok(ai::structure(chat, &raw_text)?)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Regular files directly under `dir` with exactly the `jpg` extension,
/// sorted by path.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    let read_dir = fs::read_dir(dir).map_err(|source| BatchError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut images: Vec<PathBuf> = readable_entries(read_dir, dir)
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(IMAGE_EXTENSION))
        .collect();

    images.sort();
    Ok(images)
}

/// Skips directory entries that cannot be read, logging each one.
fn readable_entries<'a, T: 'a>(
    entries: impl Iterator<Item = io::Result<T>> + 'a,
    dir: &'a Path,
) -> impl Iterator<Item = T> + 'a {
    entries.filter_map(move |entry| match entry {
        Ok(e) => Some(e),
        Err(e) => {
            warn!("Skipping unreadable entry in {}: {e}", dir.display());
            None
        }
    })
}
