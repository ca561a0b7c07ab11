//! Run orchestration
//!
//! Drives the CREATED → EXTRACTING → STAGING → ETL_RUNNING → {SUCCEEDED |
//! FAILED} sequence for one pipeline. Transitions are strictly sequential
//! and one-directional: a phase failure finalizes the run as failed without
//! attempting later phases, and there is no retry or rollback within a run.

use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use sluice_core::domain::pipeline::PipelineDefinition;
use sluice_core::domain::run::{PhaseStatus, RunStatus, TriggeredBy};
use sluice_extract::{SelectExtractor, SourceExtractors};

use crate::error::{Result, RunnerError};
use crate::repository::{
    AuditStore, MetadataStore, PgAuditStore, PgMetadataStore, PgWarehouse, Warehouse,
};
use crate::schedule::next_due_date;

/// Orchestrates pipeline execution with a full audit trail
pub struct PipelineRunner<M, A, W> {
    metadata: M,
    audit: A,
    warehouse: W,
    extractors: Arc<dyn SelectExtractor>,
}

impl PipelineRunner<PgMetadataStore, PgAuditStore, PgWarehouse> {
    /// Production runner over a shared Postgres pool
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            metadata: PgMetadataStore::new(pool.clone()),
            audit: PgAuditStore::new(pool.clone()),
            warehouse: PgWarehouse::new(pool),
            extractors: Arc::new(SourceExtractors),
        }
    }
}

impl<M, A, W> PipelineRunner<M, A, W>
where
    M: MetadataStore,
    A: AuditStore,
    W: Warehouse,
{
    /// Builds a runner over explicit stores
    pub fn with_stores(
        metadata: M,
        audit: A,
        warehouse: W,
        extractors: Arc<dyn SelectExtractor>,
    ) -> Self {
        Self {
            metadata,
            audit,
            warehouse,
            extractors,
        }
    }

    /// Executes the full extract → stage → ETL sequence for a named pipeline
    ///
    /// Returns whether the run succeeded. Phase failures are recorded into
    /// the audit trail and reported as `Ok(false)`; only an unknown or
    /// inactive name and store errors surface as `Err`. The next-due date
    /// advances even on failure, so a broken pipeline does not come due
    /// again on every invocation.
    pub async fn run_pipeline(
        &self,
        name: &str,
        force: bool,
        triggered_by: TriggeredBy,
    ) -> Result<bool> {
        let definition = self
            .metadata
            .find_by_name(name)
            .await?
            .ok_or_else(|| RunnerError::NotFound(name.to_string()))?;

        info!(
            pipeline = %definition.name,
            trigger = %triggered_by,
            force,
            "starting pipeline run"
        );

        let run_id = self.audit.open_run(definition.id, triggered_by).await?;
        let outcome = self.execute_phases(&definition, run_id).await?;

        self.audit.finalize_run(run_id, outcome).await?;

        let next_due = next_due_date(chrono::Utc::now().date_naive(), definition.refresh_frequency);
        self.metadata
            .record_outcome(definition.id, outcome, next_due)
            .await?;

        match outcome {
            RunStatus::Succeeded => info!(pipeline = %definition.name, "pipeline completed"),
            _ => warn!(pipeline = %definition.name, "pipeline failed"),
        }

        Ok(outcome == RunStatus::Succeeded)
    }

    /// Runs every due pipeline in sequence
    ///
    /// One pipeline's failure does not stop the batch; store errors abort
    /// the whole invocation.
    pub async fn run_due(&self, force: bool) -> Result<BatchSummary> {
        let due = self.metadata.due_pipelines(force).await?;
        info!("found {} due pipeline(s)", due.len());

        let mut summary = BatchSummary::default();
        for definition in due {
            match self
                .run_pipeline(&definition.name, force, TriggeredBy::Scheduled)
                .await
            {
                Ok(true) => summary.succeeded += 1,
                Ok(false) => summary.failed += 1,
                Err(RunnerError::NotFound(name)) => {
                    // Deactivated between selection and lookup
                    warn!(pipeline = %name, "skipping: no longer active");
                    summary.failed += 1;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(summary)
    }

    /// Runs the three phases in order, recording each outcome exactly once
    ///
    /// Store failures propagate; phase failures become the final run status.
    async fn execute_phases(
        &self,
        definition: &PipelineDefinition,
        run_id: Uuid,
    ) -> Result<RunStatus> {
        // Phase 1: extraction
        let extractor = self
            .extractors
            .select(definition.source_kind, &definition.source_location);

        let records = match extractor.extract().await {
            Ok(records) => {
                self.audit
                    .record_extraction(run_id, records.len() as i64, PhaseStatus::Success, None)
                    .await?;
                records
            }
            Err(err) => {
                let message = err.to_string();
                error!(pipeline = %definition.name, error = %message, "extraction failed");
                self.audit
                    .record_extraction(run_id, 0, PhaseStatus::Failed, Some(&message))
                    .await?;
                return Ok(RunStatus::Failed);
            }
        };

        // Phase 2: staging
        match self
            .warehouse
            .reload_staging(&definition.staging_table, &records)
            .await
        {
            Ok(staged) => {
                self.audit
                    .record_staging(run_id, staged as i64, PhaseStatus::Success, None)
                    .await?;
            }
            Err(err) => {
                let message = format!("{err:#}");
                error!(pipeline = %definition.name, error = %message, "staging failed");
                self.audit
                    .record_staging(run_id, 0, PhaseStatus::Failed, Some(&message))
                    .await?;
                return Ok(RunStatus::Failed);
            }
        }

        // Phase 3: ETL
        match self.run_transform(definition).await {
            Ok(rows) => {
                self.audit
                    .record_etl(run_id, rows, PhaseStatus::Success, None)
                    .await?;
                Ok(RunStatus::Succeeded)
            }
            Err(err) => {
                let message = format!("{err:#}");
                error!(pipeline = %definition.name, error = %message, "etl failed");
                self.audit
                    .record_etl(run_id, 0, PhaseStatus::Failed, Some(&message))
                    .await?;
                Ok(RunStatus::Failed)
            }
        }
    }

    /// Invokes the transform procedure and reads its best-effort row count
    ///
    /// The count comes from the latest ETL log entry for the procedure
    /// name; a procedure that never logs reports zero.
    async fn run_transform(&self, definition: &PipelineDefinition) -> anyhow::Result<i64> {
        self.warehouse
            .run_procedure(&definition.transform_procedure)
            .await?;

        self.warehouse
            .latest_rows_affected(&definition.transform_procedure)
            .await
    }
}

/// Outcome counts for one batch invocation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate, Utc};
    use serde_json::Value;
    use std::sync::Mutex;

    use sluice_core::domain::pipeline::{RefreshFrequency, SourceKind};
    use sluice_core::domain::record::Record;
    use sluice_core::domain::run::{PhaseOutcome, PipelineRun};
    use sluice_core::dto::pipeline::RegisterPipeline;
    use sluice_extract::{ExtractError, Extractor};

    fn definition(name: &str, location: &str, next_due: NaiveDate, is_active: bool) -> PipelineDefinition {
        let now = Utc::now();
        PipelineDefinition {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            source_kind: SourceKind::Api,
            source_location: location.to_string(),
            staging_table: "staging_test".to_string(),
            output_table: "dim_test".to_string(),
            transform_procedure: "load_dim_test".to_string(),
            refresh_frequency: RefreshFrequency::Weekly,
            next_due_date: next_due,
            last_run_date: None,
            last_run_status: None,
            is_active,
            created_at: now,
            updated_at: now,
        }
    }

    fn yesterday() -> NaiveDate {
        Utc::now().date_naive() - Duration::days(1)
    }

    // =========================================================================
    // Fakes
    // =========================================================================

    #[derive(Clone)]
    struct FakeMetadata {
        definitions: Vec<PipelineDefinition>,
        outcomes: Arc<Mutex<Vec<(Uuid, RunStatus, NaiveDate)>>>,
    }

    impl FakeMetadata {
        fn with(definitions: Vec<PipelineDefinition>) -> Self {
            Self {
                definitions,
                outcomes: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl MetadataStore for FakeMetadata {
        async fn due_pipelines(&self, force: bool) -> anyhow::Result<Vec<PipelineDefinition>> {
            let today = Utc::now().date_naive();
            Ok(self
                .definitions
                .iter()
                .filter(|d| d.is_active && (force || d.next_due_date <= today))
                .cloned()
                .collect())
        }

        async fn find_by_name(&self, name: &str) -> anyhow::Result<Option<PipelineDefinition>> {
            Ok(self
                .definitions
                .iter()
                .find(|d| d.is_active && d.name == name)
                .cloned())
        }

        async fn list_all(&self) -> anyhow::Result<Vec<PipelineDefinition>> {
            Ok(self.definitions.clone())
        }

        async fn register(&self, _req: RegisterPipeline) -> anyhow::Result<PipelineDefinition> {
            unimplemented!("not exercised by the runner")
        }

        async fn record_outcome(
            &self,
            pipeline_id: Uuid,
            status: RunStatus,
            next_due: NaiveDate,
        ) -> anyhow::Result<()> {
            self.outcomes
                .lock()
                .unwrap()
                .push((pipeline_id, status, next_due));
            Ok(())
        }

        async fn deactivate(&self, _name: &str) -> anyhow::Result<bool> {
            unimplemented!("not exercised by the runner")
        }
    }

    #[derive(Clone, Default)]
    struct FakeAudit {
        runs: Arc<Mutex<Vec<PipelineRun>>>,
    }

    impl FakeAudit {
        fn update(&self, run_id: Uuid, apply: impl FnOnce(&mut PipelineRun)) {
            let mut runs = self.runs.lock().unwrap();
            let run = runs.iter_mut().find(|run| run.id == run_id).unwrap();
            apply(run);
        }

        fn single_run(&self) -> PipelineRun {
            let runs = self.runs.lock().unwrap();
            assert_eq!(runs.len(), 1, "expected exactly one audit row");
            runs[0].clone()
        }

        fn run_count(&self) -> usize {
            self.runs.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AuditStore for FakeAudit {
        async fn open_run(
            &self,
            pipeline_id: Uuid,
            triggered_by: TriggeredBy,
        ) -> anyhow::Result<Uuid> {
            let id = Uuid::new_v4();
            self.runs.lock().unwrap().push(PipelineRun {
                id,
                pipeline_id,
                started_at: Utc::now(),
                completed_at: None,
                overall_status: RunStatus::Running,
                triggered_by,
                extraction: PhaseOutcome::default(),
                staging: PhaseOutcome::default(),
                etl: PhaseOutcome::default(),
            });
            Ok(id)
        }

        async fn record_extraction(
            &self,
            run_id: Uuid,
            rows: i64,
            status: PhaseStatus,
            error: Option<&str>,
        ) -> anyhow::Result<()> {
            self.update(run_id, |run| {
                run.extraction = PhaseOutcome {
                    status: Some(status),
                    error: error.map(str::to_string),
                    rows: Some(rows),
                };
            });
            Ok(())
        }

        async fn record_staging(
            &self,
            run_id: Uuid,
            rows: i64,
            status: PhaseStatus,
            error: Option<&str>,
        ) -> anyhow::Result<()> {
            self.update(run_id, |run| {
                run.staging = PhaseOutcome {
                    status: Some(status),
                    error: error.map(str::to_string),
                    rows: Some(rows),
                };
            });
            Ok(())
        }

        async fn record_etl(
            &self,
            run_id: Uuid,
            rows: i64,
            status: PhaseStatus,
            error: Option<&str>,
        ) -> anyhow::Result<()> {
            self.update(run_id, |run| {
                run.etl = PhaseOutcome {
                    status: Some(status),
                    error: error.map(str::to_string),
                    rows: Some(rows),
                };
            });
            Ok(())
        }

        async fn finalize_run(&self, run_id: Uuid, overall: RunStatus) -> anyhow::Result<()> {
            self.update(run_id, |run| {
                run.overall_status = overall;
                run.completed_at = Some(Utc::now());
            });
            Ok(())
        }

        async fn latest_run(&self, pipeline_id: Uuid) -> anyhow::Result<Option<PipelineRun>> {
            Ok(self
                .runs
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|run| run.pipeline_id == pipeline_id)
                .cloned())
        }
    }

    #[derive(Clone, Default)]
    struct FakeWarehouse {
        fail_staging: bool,
        logged_rows: i64,
        staged: Arc<Mutex<Vec<(String, usize)>>>,
        procedures: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Warehouse for FakeWarehouse {
        async fn reload_staging(&self, table: &str, records: &[Record]) -> anyhow::Result<u64> {
            if self.fail_staging {
                anyhow::bail!("duplicate key value violates unique constraint");
            }
            self.staged
                .lock()
                .unwrap()
                .push((table.to_string(), records.len()));
            Ok(records.len() as u64)
        }

        async fn run_procedure(&self, procedure: &str) -> anyhow::Result<()> {
            self.procedures.lock().unwrap().push(procedure.to_string());
            Ok(())
        }

        async fn latest_rows_affected(&self, _procedure: &str) -> anyhow::Result<i64> {
            Ok(self.logged_rows)
        }
    }

    struct StubExtractor {
        records: usize,
        fail: bool,
    }

    #[async_trait]
    impl Extractor for StubExtractor {
        async fn extract(&self) -> sluice_extract::Result<Vec<Record>> {
            if self.fail {
                return Err(ExtractError::Shape(
                    "connection reset by peer".to_string(),
                ));
            }

            Ok((0..self.records)
                .map(|index| {
                    let mut record = Record::new();
                    record.insert("code".to_string(), Value::String(format!("A{index}")));
                    record.insert("name".to_string(), Value::String("Test".to_string()));
                    record
                })
                .collect())
        }
    }

    /// Selector returning a fixed batch, or a failing extractor for
    /// locations that contain `fail_location`
    struct StubExtractors {
        records: usize,
        fail_location: Option<&'static str>,
    }

    impl SelectExtractor for StubExtractors {
        fn select(&self, _kind: SourceKind, location: &str) -> Box<dyn Extractor> {
            let fail = self
                .fail_location
                .is_some_and(|fragment| location.contains(fragment));
            Box::new(StubExtractor {
                records: self.records,
                fail,
            })
        }
    }

    fn runner_with(
        metadata: FakeMetadata,
        audit: FakeAudit,
        warehouse: FakeWarehouse,
        extractors: StubExtractors,
    ) -> PipelineRunner<FakeMetadata, FakeAudit, FakeWarehouse> {
        PipelineRunner::with_stores(metadata, audit, warehouse, Arc::new(extractors))
    }

    // =========================================================================
    // Tests
    // =========================================================================

    #[tokio::test]
    async fn test_unknown_pipeline_short_circuits() {
        let metadata = FakeMetadata::with(vec![]);
        let audit = FakeAudit::default();
        let runner = runner_with(
            metadata.clone(),
            audit.clone(),
            FakeWarehouse::default(),
            StubExtractors {
                records: 0,
                fail_location: None,
            },
        );

        let result = runner
            .run_pipeline("GP_Practices", false, TriggeredBy::Manual)
            .await;

        assert!(matches!(result, Err(RunnerError::NotFound(name)) if name == "GP_Practices"));
        assert_eq!(audit.run_count(), 0);
        assert!(metadata.outcomes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_pipeline_is_not_found() {
        let metadata = FakeMetadata::with(vec![definition(
            "LSOA",
            "https://example.org/lsoa.csv",
            yesterday(),
            false,
        )]);
        let audit = FakeAudit::default();
        let runner = runner_with(
            metadata,
            audit.clone(),
            FakeWarehouse::default(),
            StubExtractors {
                records: 5,
                fail_location: None,
            },
        );

        let result = runner.run_pipeline("LSOA", false, TriggeredBy::Manual).await;

        assert!(matches!(result, Err(RunnerError::NotFound(_))));
        assert_eq!(audit.run_count(), 0);
    }

    #[tokio::test]
    async fn test_extraction_failure_skips_later_phases() {
        let metadata = FakeMetadata::with(vec![definition(
            "Bank_Holidays",
            "https://example.org/holidays.json",
            yesterday(),
            true,
        )]);
        let audit = FakeAudit::default();
        let warehouse = FakeWarehouse::default();
        let runner = runner_with(
            metadata.clone(),
            audit.clone(),
            warehouse.clone(),
            StubExtractors {
                records: 0,
                fail_location: Some("holidays.json"),
            },
        );

        let succeeded = runner
            .run_pipeline("Bank_Holidays", false, TriggeredBy::Manual)
            .await
            .unwrap();
        assert!(!succeeded);

        let run = audit.single_run();
        assert_eq!(run.overall_status, RunStatus::Failed);
        assert_eq!(run.extraction.status, Some(PhaseStatus::Failed));
        assert!(!run.extraction.error.as_deref().unwrap_or("").is_empty());
        assert!(run.staging.status.is_none());
        assert!(run.etl.status.is_none());
        assert!(warehouse.staged.lock().unwrap().is_empty());
        assert!(warehouse.procedures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_records_still_runs_etl() {
        let metadata = FakeMetadata::with(vec![definition(
            "Bank_Holidays",
            "https://example.org/holidays.json",
            yesterday(),
            true,
        )]);
        let audit = FakeAudit::default();
        let warehouse = FakeWarehouse::default();
        let runner = runner_with(
            metadata,
            audit.clone(),
            warehouse.clone(),
            StubExtractors {
                records: 0,
                fail_location: None,
            },
        );

        let succeeded = runner
            .run_pipeline("Bank_Holidays", false, TriggeredBy::Manual)
            .await
            .unwrap();
        assert!(succeeded);

        let run = audit.single_run();
        assert_eq!(run.staging.status, Some(PhaseStatus::Success));
        assert_eq!(run.staging.rows, Some(0));
        assert_eq!(run.etl.status, Some(PhaseStatus::Success));
        assert_eq!(
            warehouse.procedures.lock().unwrap().as_slice(),
            ["load_dim_test"]
        );
    }

    #[tokio::test]
    async fn test_successful_run_records_full_audit() {
        let def = definition(
            "GP_Practices",
            "https://example.org/epraccur.zip",
            yesterday(),
            true,
        );
        let pipeline_id = def.id;
        let metadata = FakeMetadata::with(vec![def]);
        let audit = FakeAudit::default();
        let warehouse = FakeWarehouse {
            logged_rows: 150,
            ..FakeWarehouse::default()
        };
        let runner = runner_with(
            metadata.clone(),
            audit.clone(),
            warehouse,
            StubExtractors {
                records: 150,
                fail_location: None,
            },
        );

        let succeeded = runner
            .run_pipeline("GP_Practices", false, TriggeredBy::Scheduled)
            .await
            .unwrap();
        assert!(succeeded);

        let run = audit.single_run();
        assert_eq!(run.triggered_by, TriggeredBy::Scheduled);
        assert_eq!(run.extraction.rows, Some(150));
        assert_eq!(run.staging.rows, Some(150));
        assert_eq!(run.extraction.status, Some(PhaseStatus::Success));
        assert_eq!(run.staging.status, Some(PhaseStatus::Success));
        assert_eq!(run.etl.status, Some(PhaseStatus::Success));
        assert_eq!(run.etl.rows, Some(150));
        assert_eq!(run.overall_status, RunStatus::Succeeded);
        assert!(run.completed_at.is_some());

        let outcomes = metadata.outcomes.lock().unwrap();
        let (id, status, next_due) = outcomes[0];
        assert_eq!(id, pipeline_id);
        assert_eq!(status, RunStatus::Succeeded);
        assert_eq!(
            next_due,
            next_due_date(Utc::now().date_naive(), RefreshFrequency::Weekly)
        );
    }

    #[tokio::test]
    async fn test_staging_failure_skips_etl() {
        let metadata = FakeMetadata::with(vec![definition(
            "IMD",
            "https://example.org/imd.zip",
            yesterday(),
            true,
        )]);
        let audit = FakeAudit::default();
        let warehouse = FakeWarehouse {
            fail_staging: true,
            ..FakeWarehouse::default()
        };
        let runner = runner_with(
            metadata,
            audit.clone(),
            warehouse.clone(),
            StubExtractors {
                records: 25,
                fail_location: None,
            },
        );

        let succeeded = runner
            .run_pipeline("IMD", false, TriggeredBy::Manual)
            .await
            .unwrap();
        assert!(!succeeded);

        let run = audit.single_run();
        assert_eq!(run.extraction.status, Some(PhaseStatus::Success));
        assert_eq!(run.staging.status, Some(PhaseStatus::Failed));
        assert!(
            run.staging
                .error
                .as_deref()
                .unwrap()
                .contains("duplicate key")
        );
        assert!(run.etl.status.is_none());
        assert_eq!(run.overall_status, RunStatus::Failed);
        assert!(warehouse.procedures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_run_still_advances_due_date() {
        let metadata = FakeMetadata::with(vec![definition(
            "Bank_Holidays",
            "https://example.org/holidays.json",
            yesterday(),
            true,
        )]);
        let runner = runner_with(
            metadata.clone(),
            FakeAudit::default(),
            FakeWarehouse::default(),
            StubExtractors {
                records: 0,
                fail_location: Some("holidays.json"),
            },
        );

        runner
            .run_pipeline("Bank_Holidays", false, TriggeredBy::Manual)
            .await
            .unwrap();

        let outcomes = metadata.outcomes.lock().unwrap();
        let (_, status, next_due) = outcomes[0];
        assert_eq!(status, RunStatus::Failed);
        assert!(next_due > Utc::now().date_naive());
    }

    #[tokio::test]
    async fn test_batch_continues_past_failures() {
        let metadata = FakeMetadata::with(vec![
            definition(
                "Bank_Holidays",
                "https://example.org/holidays.json",
                yesterday(),
                true,
            ),
            definition(
                "GP_Practices",
                "https://example.org/epraccur.zip",
                yesterday(),
                true,
            ),
        ]);
        let audit = FakeAudit::default();
        let runner = runner_with(
            metadata,
            audit.clone(),
            FakeWarehouse::default(),
            StubExtractors {
                records: 10,
                fail_location: Some("holidays.json"),
            },
        );

        let summary = runner.run_due(false).await.unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(audit.run_count(), 2);
    }

    #[tokio::test]
    async fn test_batch_respects_due_dates_unless_forced() {
        let future = Utc::now().date_naive() + Duration::days(30);
        let metadata = FakeMetadata::with(vec![
            definition("Future", "https://example.org/a.json", future, true),
            definition("Inactive", "https://example.org/b.json", yesterday(), false),
        ]);
        let runner = runner_with(
            metadata,
            FakeAudit::default(),
            FakeWarehouse::default(),
            StubExtractors {
                records: 1,
                fail_location: None,
            },
        );

        let summary = runner.run_due(false).await.unwrap();
        assert_eq!(summary.attempted(), 0);

        // Force bypasses the due date but never resurrects inactive rows
        let summary = runner.run_due(true).await.unwrap();
        assert_eq!(summary.attempted(), 1);
        assert_eq!(summary.succeeded, 1);
    }
}
