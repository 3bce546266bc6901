use std::{
    fmt,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use schemars::JsonSchema;
use section_mask::{MaskSource, Pipeline, PrecomputedMaskSource, SectionImage};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr, VariantNames};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error, info, warn};

use crate::{
    error::{BatchError, Result},
    layout::list_sections,
    validation::{validate_directory, ValidationRules},
};

/// Work done for every section of a batch
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, VariantNames, IntoStaticStr,
    PartialEq, Eq, Hash
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SectionJob {
    /// Write the mask of each section
    Mask,
    /// Clean each section with the mask already on disk
    Clean,
    /// Mask and clean in one pass
    Full,
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub workers: usize,
    pub timeout: Duration,
    /// Checked on the input directory before any task starts
    pub validation: Option<ValidationRules>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            timeout: Duration::from_secs(300),
            validation: None,
        }
    }
}

/// Directories of one batch; every output keeps its input's file name
#[derive(Debug, Clone)]
pub struct BatchPaths {
    pub input_dir: PathBuf,
    pub mask_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl BatchPaths {
    fn outputs(&self, job: SectionJob, name: &str) -> Vec<PathBuf> {
        match job {
            SectionJob::Mask => vec![self.mask_dir.join(name)],
            SectionJob::Clean => vec![self.output_dir.join(name)],
            SectionJob::Full => vec![self.mask_dir.join(name), self.output_dir.join(name)],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskFailure {
    pub name: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub job: SectionJob,
    pub processed: usize,
    pub skipped: usize,
    pub failures: Vec<TaskFailure>,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failure(&self, name: &str) -> Option<&TaskFailure> {
        self.failures.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} processed, {} skipped, {} failed",
            self.job,
            self.processed,
            self.skipped,
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(f, "\n  {} [{}] {}", failure.name, failure.kind, failure.message)?;
        }
        Ok(())
    }
}

/// Runs one pipeline over every section of a directory on a bounded pool
pub struct BatchRunner {
    pipeline: Arc<Pipeline>,
    options: RunnerOptions,
}

impl BatchRunner {
    pub fn new(pipeline: Pipeline, options: RunnerOptions) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            options,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn run(&self, job: SectionJob, paths: BatchPaths) -> Result<BatchSummary> {
        if let Some(rules) = &self.options.validation {
            let report = validate_directory(&paths.input_dir, rules);
            if !report.is_valid() {
                return Err(BatchError::Validation(report));
            }
        }

        let names = list_sections(&paths.input_dir)?;
        if matches!(job, SectionJob::Mask | SectionJob::Full) {
            std::fs::create_dir_all(&paths.mask_dir)?;
        }
        if matches!(job, SectionJob::Clean | SectionJob::Full) {
            std::fs::create_dir_all(&paths.output_dir)?;
        }

        info!(
            "{job}: {} sections in {} with {}",
            names.len(),
            paths.input_dir.display(),
            self.pipeline.info()
        );
        let started = Instant::now();

        let mut summary = BatchSummary {
            job,
            processed: 0,
            skipped: 0,
            failures: Vec::new(),
        };
        let paths = Arc::new(paths);
        let permits = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let mut pending = JoinSet::new();

        for name in names {
            if paths.outputs(job, &name).iter().all(|p| p.exists()) {
                warn!("Skipping {name}: output already exists");
                summary.skipped += 1;
                continue;
            }
            pending.spawn(run_section(
                Arc::clone(&self.pipeline),
                Arc::clone(&paths),
                Arc::clone(&permits),
                job,
                name,
                self.options.timeout,
            ));
        }

        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok((_, Ok(()))) => summary.processed += 1,
                Ok((name, Err(err))) => {
                    error!("{name}: {err}");
                    summary.failures.push(TaskFailure {
                        name,
                        kind: err.kind().to_string(),
                        message: err.to_string(),
                    });
                }
                Err(join_error) => {
                    error!("Section task failed to join: {join_error}");
                    summary.failures.push(TaskFailure {
                        name: String::new(),
                        kind: "task_panicked".to_string(),
                        message: join_error.to_string(),
                    });
                }
            }
        }
        summary.failures.sort_by(|a, b| a.name.cmp(&b.name));

        info!("{summary} in {:.1?}", started.elapsed());
        Ok(summary)
    }
}

async fn run_section(
    pipeline: Arc<Pipeline>,
    paths: Arc<BatchPaths>,
    permits: Arc<Semaphore>,
    job: SectionJob,
    name: String,
    timeout: Duration,
) -> (String, Result<()>) {
    let permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(closed) => return (name, Err(BatchError::Config(closed.to_string()))),
    };

    // the permit lives as long as the work, even after a timeout detaches it
    let work_name = name.clone();
    let handle = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        process_section(&pipeline, job, &paths, &work_name)
    });

    let outcome = match tokio::time::timeout(timeout, handle).await {
        Err(_) => Err(BatchError::Timeout {
            name: name.clone(),
            timeout,
        }),
        Ok(Err(join_error)) => Err(BatchError::TaskPanicked {
            name: name.clone(),
            message: panic_message(join_error),
        }),
        Ok(Ok(result)) => result.map_err(BatchError::from),
    };
    (name, outcome)
}

fn panic_message(join_error: tokio::task::JoinError) -> String {
    if !join_error.is_panic() {
        return join_error.to_string();
    }
    let payload = join_error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn process_section(
    pipeline: &Pipeline,
    job: SectionJob,
    paths: &BatchPaths,
    name: &str,
) -> section_mask::Result<()> {
    let image = SectionImage::open(paths.input_dir.join(name))?;
    debug!(
        "{name}: {}x{} {}-bit, {} channel(s)",
        image.dimensions().0,
        image.dimensions().1,
        image.bit_depth(),
        image.channel_count()
    );

    match job {
        SectionJob::Mask => {
            let mask = pipeline.extract_mask(name, &image)?;
            mask.mask.save(paths.mask_dir.join(name))?;
        }
        SectionJob::Clean => {
            let mask = PrecomputedMaskSource::new(&paths.mask_dir).extract_mask(name, &image)?;
            let cleaned = pipeline.clean(image, &mask)?;
            cleaned.save(paths.output_dir.join(name))?;
        }
        SectionJob::Full => {
            let section = pipeline.process(name, image)?;
            section.mask.mask.save(paths.mask_dir.join(name))?;
            section.cleaned.save(paths.output_dir.join(name))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outputs_per_job() {
        let paths = BatchPaths {
            input_dir: "in".into(),
            mask_dir: "masks".into(),
            output_dir: "out".into(),
        };
        assert_eq!(paths.outputs(SectionJob::Mask, "001.tif"), vec![PathBuf::from("masks/001.tif")]);
        assert_eq!(paths.outputs(SectionJob::Clean, "001.tif"), vec![PathBuf::from("out/001.tif")]);
        assert_eq!(paths.outputs(SectionJob::Full, "001.tif").len(), 2);
    }

    #[test]
    fn test_summary_display() {
        let summary = BatchSummary {
            job: SectionJob::Clean,
            processed: 3,
            skipped: 1,
            failures: vec![TaskFailure {
                name: "004.tif".into(),
                kind: "missing_mask".into(),
                message: "Mask masks/004.tif does not exist".into(),
            }],
        };
        let text = summary.to_string();
        assert!(text.starts_with("clean: 3 processed, 1 skipped, 1 failed"));
        assert!(text.contains("004.tif [missing_mask]"));
        assert!(!summary.is_success());
        assert!(summary.failure("004.tif").is_some());
    }

    fn explode() -> u8 {
        panic!("section exploded")
    }

    #[tokio::test]
    async fn test_panic_message_is_captured() {
        let handle = tokio::task::spawn_blocking(explode);
        let join_error = handle.await.expect_err("Task should panic");
        assert_eq!(panic_message(join_error), "section exploded");
    }
}
