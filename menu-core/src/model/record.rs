use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Image could not be opened or decoded.
    Decode,
    /// OCR engine missing or failed.
    Ocr,
    /// Chat-completion call failed (transport, auth, API error).
    Request,
    /// The model answered but the content was unusable.
    Response,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Failure {
    pub stage: FailureStage,
    pub reason: String,
}

/// What happened to one image.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageOutcome {
    Structured(Value),
    Failed(Failure),
}

/// One entry of the output document. Failures serialize as `"data": null`;
/// the failure itself stays in memory for the run report.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ResultRecord {
    pub file: String,

    pub data: Option<Value>,

    #[serde(skip)]
    pub failure: Option<Failure>,
}

impl ResultRecord {
    pub fn new(file: impl Into<String>, outcome: ImageOutcome) -> Self {
        let file = file.into();
        match outcome {
            ImageOutcome::Structured(v) => ResultRecord {
                file,
                data: Some(v),
                failure: None,
            },
            ImageOutcome::Failed(f) => ResultRecord {
                file,
                data: None,
                failure: Some(f),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FailedItem {
    pub file: String,
    pub stage: FailureStage,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<FailedItem>,
}

impl RunReport {
    pub fn from_records(records: &[ResultRecord]) -> Self {
        let mut report = RunReport {
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
        };

        for r in records {
            match &r.failure {
                None => report.succeeded += 1,
                Some(f) => {
                    report.failed += 1;
                    report.failures.push(FailedItem {
                        file: r.file.clone(),
                        stage: f.stage,
                        reason: f.reason.clone(),
                    });
                }
            }
        }

        report
    }

    pub fn count(&self, stage: FailureStage) -> usize {
        self.failures.iter().filter(|f| f.stage == stage).count()
    }
}
