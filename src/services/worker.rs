use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::regeneration_job::{self, Entity as RegenerationJob, JobStatus};
use crate::error::{AppError, AppResult};
use crate::models::EntityType;
use crate::services::derivatives::DerivativeService;
use crate::services::entity_names::EntityNameResolver;
use crate::services::templates::TemplateService;

/// Progress is written to the job row after this many entities (and after
/// the last one).
pub const PROGRESS_FLUSH_EVERY: usize = 10;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WorkerStatus {
    pub is_running: bool,
    pub current_job_id: Option<Uuid>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct JobCounts {
    processed: i32,
    failed: i32,
}

#[derive(Default)]
struct WorkerState {
    busy: AtomicBool,
    recovered: AtomicBool,
    current_job: Mutex<Option<Uuid>>,
    scheduler: Mutex<Option<CancellationToken>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds the single in-process job slot; releasing it on drop covers every
/// exit path of a job, panics included.
struct JobSlot<'a> {
    state: &'a WorkerState,
}

impl<'a> JobSlot<'a> {
    fn acquire(state: &'a WorkerState) -> Option<Self> {
        state
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { state })
    }

    fn set_job(&self, id: Uuid) {
        *lock(&self.state.current_job) = Some(id);
    }
}

impl Drop for JobSlot<'_> {
    fn drop(&mut self) {
        *lock(&self.state.current_job) = None;
        self.state.busy.store(false, Ordering::Release);
    }
}

/// Background regeneration of derivatives, one job at a time.
#[derive(Clone)]
pub struct Worker {
    db: DatabaseConnection,
    derivatives: DerivativeService,
    templates: TemplateService,
    names: Arc<dyn EntityNameResolver>,
    state: Arc<WorkerState>,
}

impl Worker {
    pub fn new(
        db: DatabaseConnection,
        derivatives: DerivativeService,
        templates: TemplateService,
        names: Arc<dyn EntityNameResolver>,
    ) -> Self {
        Self {
            db,
            derivatives,
            templates,
            names,
            state: Arc::new(WorkerState::default()),
        }
    }

    /// Starts polling: once right away, then every `poll_interval`.
    /// Calling it while already running does nothing.
    pub fn start(&self, poll_interval: Duration) {
        let mut scheduler = lock(&self.state.scheduler);
        if scheduler.is_some() {
            tracing::warn!("Worker already running");
            return;
        }

        let token = CancellationToken::new();
        *scheduler = Some(token.clone());
        drop(scheduler);

        let worker = self.clone();
        tokio::spawn(async move { worker.run(token, poll_interval).await });
    }

    /// Stops future polls. A job already in flight runs to completion.
    pub fn stop(&self) {
        match lock(&self.state.scheduler).take() {
            Some(token) => {
                token.cancel();
                tracing::info!("Worker stopping");
            }
            None => tracing::debug!("Worker not running"),
        }
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            is_running: lock(&self.state.scheduler).is_some(),
            current_job_id: *lock(&self.state.current_job),
        }
    }

    async fn run(self, token: CancellationToken, poll_interval: Duration) {
        tracing::info!(interval = ?poll_interval, "Worker started");

        // Restarts of the same instance must not touch its own in-flight job.
        if !self.state.recovered.swap(true, Ordering::AcqRel) {
            if let Err(e) = self.recover_stuck_jobs().await {
                tracing::error!(error = %e, "Failed to recover stuck jobs");
            }
        }

        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.process_next_job().await {
                        tracing::error!(error = %e, "Worker error");
                    }
                }
            }
        }

        tracing::info!("Worker stopped");
    }

    /// Jobs left in `processing` by a previous process go back to `pending`.
    /// The job this instance is running is skipped. Only sound while a single
    /// worker process runs; `start` calls it once per instance.
    pub async fn recover_stuck_jobs(&self) -> AppResult<u64> {
        let mut update = RegenerationJob::update_many()
            .col_expr(regeneration_job::Column::Status, Expr::value(JobStatus::Pending))
            .col_expr(regeneration_job::Column::StartedAt, Expr::value(Option::<chrono::NaiveDateTime>::None))
            .col_expr(regeneration_job::Column::UpdatedAt, Expr::value(chrono::Utc::now().naive_utc()))
            .filter(regeneration_job::Column::Status.eq(JobStatus::Processing));
        let running = *lock(&self.state.current_job);
        if let Some(id) = running {
            update = update.filter(regeneration_job::Column::Id.ne(id));
        }
        let result = update.exec(&self.db).await?;

        if result.rows_affected > 0 {
            tracing::info!("Recovered {} stuck jobs (reset to pending)", result.rows_affected);
        }
        Ok(result.rows_affected)
    }

    /// Runs the oldest pending job, if any and if no job is running in this
    /// process. Returns the id of the job that was run.
    pub async fn process_next_job(&self) -> AppResult<Option<Uuid>> {
        let Some(slot) = JobSlot::acquire(&self.state) else {
            tracing::debug!("Job already in progress, skipping poll");
            return Ok(None);
        };

        let next = RegenerationJob::find()
            .filter(regeneration_job::Column::Status.eq(JobStatus::Pending))
            .order_by_asc(regeneration_job::Column::CreatedAt)
            .order_by_asc(regeneration_job::Column::Id)
            .one(&self.db)
            .await?;

        let Some(job) = next else {
            return Ok(None);
        };

        let now = chrono::Utc::now().naive_utc();
        let claimed = RegenerationJob::update_many()
            .col_expr(regeneration_job::Column::Status, Expr::value(JobStatus::Processing))
            .col_expr(regeneration_job::Column::StartedAt, Expr::value(Some(now)))
            .col_expr(regeneration_job::Column::UpdatedAt, Expr::value(now))
            .filter(regeneration_job::Column::Id.eq(job.id))
            .filter(regeneration_job::Column::Status.eq(JobStatus::Pending))
            .exec(&self.db)
            .await?;

        if claimed.rows_affected == 0 {
            tracing::debug!(job_id = %job.id, "Job claimed elsewhere");
            return Ok(None);
        }

        slot.set_job(job.id);
        tracing::info!(job_id = %job.id, template = %job.size_template, "Worker picked up job");

        self.run_job(&job).await?;
        Ok(Some(job.id))
    }

    #[tracing::instrument(skip_all, fields(job_id = %job.id, template = %job.size_template))]
    async fn run_job(&self, job: &regeneration_job::Model) -> AppResult<()> {
        let started = Instant::now();
        let mut counts = JobCounts::default();

        match self.execute(job, &mut counts).await {
            Ok(()) => {
                tracing::info!(
                    processed = counts.processed,
                    failed = counts.failed,
                    "Job completed, took {:.2?}",
                    started.elapsed()
                );
                self.finish(job.id, JobStatus::Completed, counts, None).await
            }
            Err(e) => {
                tracing::error!(error = %e, "Job failed");
                self.finish(job.id, JobStatus::Failed, counts, Some(e.to_string()))
                    .await
            }
        }
    }

    async fn execute(&self, job: &regeneration_job::Model, counts: &mut JobCounts) -> AppResult<()> {
        let template = self
            .templates
            .get_by_name(&job.size_template)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Size template '{}' not found", job.size_template))
            })?;

        let explicit = job.explicit_entity_ids();
        let entity_ids = if explicit.is_empty() {
            self.derivatives
                .entity_ids_with_originals(job.entity_type)
                .await?
        } else {
            explicit
        };

        let total = entity_ids.len() as i32;
        if total != job.total_count {
            self.update_job(
                job.id,
                RegenerationJob::update_many()
                    .col_expr(regeneration_job::Column::TotalCount, Expr::value(total)),
            )
            .await?;
        }

        if entity_ids.is_empty() {
            tracing::info!("No entities to regenerate");
            return Ok(());
        }

        for (index, entity_id) in entity_ids.iter().enumerate() {
            match self
                .derivatives
                .regenerate_entity_image(job.entity_type, entity_id, &template, self.names.as_ref())
                .await
            {
                Ok(_) => counts.processed += 1,
                Err(e) => {
                    counts.failed += 1;
                    tracing::warn!(%entity_id, error = %e, "Failed to regenerate image");
                }
            }

            if (index + 1) % PROGRESS_FLUSH_EVERY == 0 || index + 1 == entity_ids.len() {
                self.update_job(
                    job.id,
                    RegenerationJob::update_many()
                        .col_expr(regeneration_job::Column::ProcessedCount, Expr::value(counts.processed))
                        .col_expr(regeneration_job::Column::FailedCount, Expr::value(counts.failed)),
                )
                .await?;
            }
        }

        Ok(())
    }

    async fn update_job(
        &self,
        id: Uuid,
        update: sea_orm::UpdateMany<RegenerationJob>,
    ) -> AppResult<()> {
        update
            .col_expr(regeneration_job::Column::UpdatedAt, Expr::value(chrono::Utc::now().naive_utc()))
            .filter(regeneration_job::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Moves a `processing` job to a terminal state. Rows already terminal
    /// are left alone.
    async fn finish(
        &self,
        id: Uuid,
        status: JobStatus,
        counts: JobCounts,
        error_message: Option<String>,
    ) -> AppResult<()> {
        let now = chrono::Utc::now().naive_utc();
        RegenerationJob::update_many()
            .col_expr(regeneration_job::Column::Status, Expr::value(status))
            .col_expr(regeneration_job::Column::ProcessedCount, Expr::value(counts.processed))
            .col_expr(regeneration_job::Column::FailedCount, Expr::value(counts.failed))
            .col_expr(regeneration_job::Column::ErrorMessage, Expr::value(error_message))
            .col_expr(regeneration_job::Column::CompletedAt, Expr::value(Some(now)))
            .col_expr(regeneration_job::Column::UpdatedAt, Expr::value(now))
            .filter(regeneration_job::Column::Id.eq(id))
            .filter(regeneration_job::Column::Status.eq(JobStatus::Processing))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Queues a regeneration of every entity of the template's type.
    pub async fn enqueue(&self, template_id: Uuid) -> AppResult<regeneration_job::Model> {
        let template = self.templates.get_by_id(template_id).await?;
        let estimate = self
            .derivatives
            .entity_ids_with_originals(template.entity_type)
            .await?
            .len();

        self.create_job(template.entity_type, &template.name, Vec::new(), estimate)
            .await
    }

    /// Queues a regeneration of an explicit set of entities.
    pub async fn enqueue_for_entities(
        &self,
        template_name: &str,
        entity_ids: Vec<String>,
    ) -> AppResult<regeneration_job::Model> {
        let template = self
            .templates
            .get_by_name(template_name)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Size template '{}' not found", template_name))
            })?;
        if entity_ids.is_empty() {
            return Err(AppError::BadRequest("entity_ids must not be empty".to_string()));
        }

        let total = entity_ids.len();
        self.create_job(template.entity_type, &template.name, entity_ids, total)
            .await
    }

    /// Inserts a `pending` job row without checking the template.
    pub async fn create_job(
        &self,
        entity_type: EntityType,
        template_name: &str,
        entity_ids: Vec<String>,
        total_count: usize,
    ) -> AppResult<regeneration_job::Model> {
        let now = chrono::Utc::now().naive_utc();
        let job = regeneration_job::ActiveModel {
            id: Set(Uuid::new_v4()),
            entity_type: Set(entity_type),
            size_template: Set(template_name.to_string()),
            entity_ids: Set(serde_json::json!(entity_ids)),
            status: Set(JobStatus::Pending),
            total_count: Set(total_count as i32),
            processed_count: Set(0),
            failed_count: Set(0),
            error_message: Set(None),
            started_at: Set(None),
            completed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let job = job.insert(&self.db).await?;
        tracing::info!(job_id = %job.id, template = %job.size_template, total = job.total_count, "Regeneration job queued");
        Ok(job)
    }

    pub async fn get_job(&self, id: Uuid) -> AppResult<regeneration_job::Model> {
        RegenerationJob::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))
    }

    /// Newest first.
    pub async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        page: u64,
        limit: u64,
    ) -> AppResult<(Vec<regeneration_job::Model>, u64)> {
        let mut query = RegenerationJob::find().order_by_desc(regeneration_job::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(regeneration_job::Column::Status.eq(status));
        }

        let paginator = query.paginate(&self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let jobs = paginator.fetch_page(page.max(1) - 1).await?;
        Ok((jobs, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::entity_names::NoEntityNames;
    use crate::services::storage::LocalStorage;
    use migration::{Migrator, MigratorTrait};

    async fn worker() -> (Worker, tempfile::TempDir) {
        let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let templates = TemplateService::new(db.clone());
        let derivatives = DerivativeService::new(
            db.clone(),
            LocalStorage::new(dir.path(), "/uploads"),
            templates.clone(),
        );
        (
            Worker::new(db, derivatives, templates, Arc::new(NoEntityNames)),
            dir,
        )
    }

    #[test]
    fn slot_tracks_current_job() {
        let state = WorkerState::default();
        let id = Uuid::new_v4();
        {
            let slot = JobSlot::acquire(&state).unwrap();
            slot.set_job(id);
            assert_eq!(*lock(&state.current_job), Some(id));
            assert!(JobSlot::acquire(&state).is_none());
        }
        assert_eq!(*lock(&state.current_job), None);
        assert!(JobSlot::acquire(&state).is_some());
    }

    #[tokio::test]
    async fn busy_worker_skips_poll() {
        let (worker, _dir) = worker().await;
        let job = worker
            .create_job(EntityType::Brand, "logo", vec![], 0)
            .await
            .unwrap();

        let slot = JobSlot::acquire(&worker.state).unwrap();
        assert_eq!(worker.process_next_job().await.unwrap(), None);
        assert_eq!(
            worker.get_job(job.id).await.unwrap().status,
            JobStatus::Pending
        );

        drop(slot);
        assert_eq!(worker.process_next_job().await.unwrap(), Some(job.id));
    }

    #[tokio::test]
    async fn finished_jobs_are_never_reopened() {
        let (worker, _dir) = worker().await;
        let job = worker
            .create_job(EntityType::Product, "missing", vec![], 0)
            .await
            .unwrap();
        worker.process_next_job().await.unwrap();

        // A late write for a terminal job is ignored.
        worker
            .finish(job.id, JobStatus::Completed, JobCounts::default(), None)
            .await
            .unwrap();
        assert_eq!(worker.recover_stuck_jobs().await.unwrap(), 0);

        let job = worker.get_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    async fn mark_processing(worker: &Worker, id: Uuid) {
        RegenerationJob::update_many()
            .col_expr(regeneration_job::Column::Status, Expr::value(JobStatus::Processing))
            .filter(regeneration_job::Column::Id.eq(id))
            .exec(&worker.db)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn recovery_skips_the_job_in_flight() {
        let (worker, _dir) = worker().await;
        let running = worker
            .create_job(EntityType::Product, "thumb", vec![], 0)
            .await
            .unwrap();
        let orphan = worker
            .create_job(EntityType::Product, "thumb", vec![], 0)
            .await
            .unwrap();
        mark_processing(&worker, running.id).await;
        mark_processing(&worker, orphan.id).await;

        let slot = JobSlot::acquire(&worker.state).unwrap();
        slot.set_job(running.id);

        assert_eq!(worker.recover_stuck_jobs().await.unwrap(), 1);
        assert_eq!(
            worker.get_job(running.id).await.unwrap().status,
            JobStatus::Processing
        );
        assert_eq!(
            worker.get_job(orphan.id).await.unwrap().status,
            JobStatus::Pending
        );

        let counts = JobCounts { processed: 5, failed: 0 };
        worker
            .finish(running.id, JobStatus::Completed, counts, None)
            .await
            .unwrap();
        drop(slot);

        let job = worker.get_job(running.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed_count, 5);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn restart_keeps_the_job_in_flight() {
        let (worker, _dir) = worker().await;
        let poll = Duration::from_secs(3600);

        // Holding the slot keeps the poll loop away from the rows below.
        let slot = JobSlot::acquire(&worker.state).unwrap();
        worker.start(poll);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(worker.state.recovered.load(Ordering::Acquire));

        let job = worker
            .create_job(EntityType::Product, "thumb", vec![], 0)
            .await
            .unwrap();
        slot.set_job(job.id);
        mark_processing(&worker, job.id).await;
        let other = worker
            .create_job(EntityType::Product, "thumb", vec![], 0)
            .await
            .unwrap();
        mark_processing(&worker, other.id).await;

        worker.stop();
        worker.start(poll);
        tokio::time::sleep(Duration::from_millis(100)).await;
        for id in [job.id, other.id] {
            assert_eq!(
                worker.get_job(id).await.unwrap().status,
                JobStatus::Processing
            );
        }

        let counts = JobCounts { processed: 3, failed: 1 };
        worker
            .finish(job.id, JobStatus::Completed, counts, None)
            .await
            .unwrap();
        drop(slot);
        worker.stop();

        let job = worker.get_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!((job.processed_count, job.failed_count), (3, 1));
    }
}
