//! Pipeline configuration.

use std::time::Duration;

/// Stages the orchestrator can run. A run may be restricted to a prefix of
/// the sequence with `--stages`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingest,
    Classify,
    Extract,
}

impl Stage {
    /// Parse a `--stages` list ("ingest,classify,extract").
    pub fn parse_list(input: &str) -> Result<Vec<Stage>, String> {
        input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| match s {
                "ingest" => Ok(Stage::Ingest),
                "classify" => Ok(Stage::Classify),
                "extract" => Ok(Stage::Extract),
                other => Err(format!("unknown stage '{other}'")),
            })
            .collect()
    }
}

/// Orchestrator tunables; defaults match the documented contract.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Max documents processed concurrently within a claim.
    pub concurrency: usize,
    /// Hard ingestion budget per document. The contract grants 120s per
    /// page; without a page count before ingestion, the budget is applied
    /// per document with this cap.
    pub ingestion_timeout: Duration,
    pub classify_timeout: Duration,
    pub extract_timeout: Duration,
    /// Classifications below this confidence count as low-confidence.
    pub classify_low_confidence: f64,
    /// Candidate window radius for the extractor.
    pub window: usize,
    pub classifier_model: String,
    pub extractor_model: String,
    pub prompt_version: String,
    /// Stages to execute, in pipeline order.
    pub stages: Vec<Stage>,
    /// Compute comparative metrics against the truth registry.
    pub compute_metrics: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            ingestion_timeout: Duration::from_secs(120),
            classify_timeout: Duration::from_secs(60),
            extract_timeout: Duration::from_secs(120),
            classify_low_confidence: 0.5,
            window: ctxbuilder_extraction::DEFAULT_WINDOW,
            classifier_model: String::new(),
            extractor_model: String::new(),
            prompt_version: "extract-v1".to_string(),
            stages: vec![Stage::Ingest, Stage::Classify, Stage::Extract],
            compute_metrics: true,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn runs_stage(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }
}
