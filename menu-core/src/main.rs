use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

mod config;
mod error;
mod logging;
mod model;
mod services;

use config::PipelineConfig;
use error::AppError;
use logging::Logging;
use model::record::{FailureStage, RunReport};
use services::ai::OpenAiClient;
use services::ocr::TesseractCli;
use services::pipeline::Pipeline;
use services::writer;

fn run(logging: &Logging) -> Result<(), AppError> {
    let cfg = PipelineConfig::from_env();

    let chat = OpenAiClient::new(&cfg.endpoint, cfg.api_key.clone())?;
    let pipeline = Pipeline::new(
        Arc::new(TesseractCli::default()),
        Arc::new(chat),
        cfg.workers,
        logging.clone(),
    );

    let results = pipeline.run(&cfg.images_dir)?;

    let report = RunReport::from_records(&results);
    info!(
        "Run finished: {} succeeded, {} failed (decode {}, ocr {}, request {}, response {})",
        report.succeeded,
        report.failed,
        report.count(FailureStage::Decode),
        report.count(FailureStage::Ocr),
        report.count(FailureStage::Request),
        report.count(FailureStage::Response),
    );
    for f in &report.failures {
        info!("  {} failed at {:?}: {}", f.file, f.stage, f.reason);
    }

    writer::write(&results, &cfg.output_file)?;
    info!("Successfully wrote results to {}", cfg.output_file.display());

    Ok(())
}

fn main() -> ExitCode {
    let logging = Logging::init();

    logging.scope(|| match run(&logging) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    })
}
