use std::sync::Arc;

use chrono::Utc;
use tracing::{info, info_span, warn, Instrument};

use crate::config::Config;
use crate::db::{job_repo, Database};
use crate::enrichment::Enricher;
use crate::model::{ContentKind, JobStatus};
use crate::publish::{self, PublishOutcome};
use crate::resolver;
use crate::sanitize;
use crate::services::Services;
use crate::storage::WorkArea;
use crate::strategy::{
    run_chain, AttemptContext, ChainError, StageError, StageSink, StrategyRegistry,
};

use super::context::PipelineContext;
use super::error::PipelineError;
use super::progress::{ProgressEvent, ProgressReporter};
use super::stages::DbStageSink;

/// How a single run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed { entry_id: String },
    Failed { error: String },
    /// The job was reset or deleted mid-run; this run wrote nothing further.
    Interrupted,
}

/// Resolver → strategy chain → enrichment → publish, for one job at a time.
pub struct Pipeline {
    db: Database,
    registry: Arc<StrategyRegistry>,
    enricher: Arc<Enricher>,
    work_area: WorkArea,
    catalog_content_chars: usize,
}

impl Pipeline {
    /// Builds strategies and the enricher from services.
    pub fn from_services(db: Database, services: &Services, config: &Config) -> Self {
        let registry = StrategyRegistry::from_services(services, config);
        let enricher = Enricher::new(Arc::clone(&services.enrichment), config);
        Self::new(
            db,
            Arc::new(registry),
            Arc::new(enricher),
            WorkArea::new(&config.storage.work_directory),
            config,
        )
    }

    /// Inject specific sub-components.
    pub fn new(
        db: Database,
        registry: Arc<StrategyRegistry>,
        enricher: Arc<Enricher>,
        work_area: WorkArea,
        config: &Config,
    ) -> Self {
        Self {
            db,
            registry,
            enricher,
            work_area,
            catalog_content_chars: config.limits.catalog_content_chars,
        }
    }

    pub fn work_area(&self) -> &WorkArea {
        &self.work_area
    }

    /// Runs a pending job to a terminal state.
    pub async fn run(
        &self,
        job_id: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<RunOutcome, PipelineError> {
        let job = job_repo::find_by_id(&self.db, job_id)?
            .ok_or_else(|| PipelineError::NotFound(job_id.to_string()))?;
        if job.status != JobStatus::Pending {
            return Err(PipelineError::NotPending {
                job_id: job.id,
                status: job.status,
            });
        }

        let span = info_span!("pipeline",
            job_id = %job.id,
            kind = %job.kind,
            source = %sanitize::hash_source(&job.source_url),
            attempt = job.retry_count,
        );
        self.run_job(PipelineContext::new(job), progress)
            .instrument(span)
            .await
    }

    async fn run_job(
        &self,
        mut ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<RunOutcome, PipelineError> {
        let sink = DbStageSink::new(&self.db, &ctx.job, progress);

        // Step 1: Resolve and run the strategy chain
        ctx.order = resolver::resolve(ctx.job.kind, &ctx.job.submitted_url);
        let chain = {
            let attempt = AttemptContext {
                job: &ctx.job,
                work_area: &self.work_area,
                stages: &sink,
            };
            run_chain(&self.registry, &ctx.order, &attempt)
                .instrument(info_span!("extract", strategies = ctx.order.len()))
                .await
        };
        let extraction = match chain {
            Ok(extraction) => extraction,
            Err(ChainError::Interrupted) => return Ok(self.interrupted(&ctx)),
            Err(err) => return self.fail(&sink, &ctx, &err.message(), progress),
        };
        if !job_repo::save_extraction(&self.db, sink.expect(), &extraction, Utc::now())? {
            return Ok(self.interrupted(&ctx));
        }
        ctx.extraction = Some(extraction);

        // Step 2: Enrich. Article jobs stay in Processing.
        if ctx.job.kind == ContentKind::Video {
            match sink.enter(JobStatus::Enhancing) {
                Ok(()) => {}
                Err(StageError::Interrupted) => return Ok(self.interrupted(&ctx)),
                Err(e) => return self.fail(&sink, &ctx, &e.to_string(), progress),
            }
        }
        let text = ctx
            .extraction
            .as_ref()
            .map(|e| e.text.as_str())
            .unwrap_or_default();
        let enrichment = self.enricher.enrich(text, ctx.job.tier).await;
        if !job_repo::save_enrichment(&self.db, sink.expect(), &enrichment, Utc::now())? {
            return Ok(self.interrupted(&ctx));
        }
        ctx.enrichment = Some(enrichment);

        // Step 3: Complete and publish atomically
        self.step_publish(&sink, &ctx, progress)
    }

    fn step_publish(
        &self,
        sink: &DbStageSink<'_>,
        ctx: &PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<RunOutcome, PipelineError> {
        let _step = info_span!("publish").entered();
        let (Some(extraction), Some(enrichment)) = (&ctx.extraction, &ctx.enrichment) else {
            return self.fail(sink, ctx, "publish failed: missing results", progress);
        };

        let now = Utc::now();
        let entry = publish::build_entry(
            &ctx.job,
            extraction,
            enrichment,
            self.catalog_content_chars,
            now,
        );

        match publish::complete_and_publish(&self.db, sink.expect(), &entry, now) {
            Ok(PublishOutcome::Published(stored)) => {
                info!(
                    entry_id = %stored.id,
                    method = %extraction.method,
                    degraded = enrichment.degraded,
                    "Job completed"
                );
                progress.report(ProgressEvent::Completed {
                    entry_id: stored.id.clone(),
                    category: stored.category,
                });
                Ok(RunOutcome::Completed { entry_id: stored.id })
            }
            Ok(PublishOutcome::Superseded) => Ok(self.interrupted(ctx)),
            Err(e) => self.fail(sink, ctx, &format!("publish failed: {}", e), progress),
        }
    }

    fn fail(
        &self,
        sink: &DbStageSink<'_>,
        ctx: &PipelineContext,
        error: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<RunOutcome, PipelineError> {
        if !job_repo::mark_failed(&self.db, sink.expect(), error, Utc::now())? {
            return Ok(self.interrupted(ctx));
        }
        warn!(from = %sink.current(), "Job failed: {}", error);
        progress.report(ProgressEvent::Failed {
            error: error.to_string(),
        });
        Ok(RunOutcome::Failed {
            error: error.to_string(),
        })
    }

    fn interrupted(&self, ctx: &PipelineContext) -> RunOutcome {
        info!(job_id = %ctx.job.id, "Job changed underneath the run, stopping");
        RunOutcome::Interrupted
    }
}
