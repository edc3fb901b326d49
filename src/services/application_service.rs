use crate::dto::job_dto::{ApplyPayload, UpdateApplicationStatusPayload};
use crate::error::{Error, Result};
use crate::models::application::{Application, ApplicationWithJob, ApplicationWithWorker};
use crate::models::profile::{Profile, UserRole};
use crate::realtime::{ChangeBus, ChangeKind, Table};
use crate::services::activity_service::ActivityService;
use crate::services::job_service::JobService;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

pub const WORKER_VERIFICATION_REQUIRED: &str =
    "You must be verified by an administrator before applying for jobs.";

#[derive(Clone)]
pub struct ApplicationService {
    pool: PgPool,
    bus: ChangeBus,
    jobs: JobService,
    activity: ActivityService,
}

impl ApplicationService {
    pub fn new(pool: PgPool, bus: ChangeBus, jobs: JobService, activity: ActivityService) -> Self {
        Self {
            pool,
            bus,
            jobs,
            activity,
        }
    }

    pub async fn apply(
        &self,
        worker: &Profile,
        job_id: Uuid,
        payload: ApplyPayload,
    ) -> Result<Application> {
        if worker.role != UserRole::Worker {
            return Err(Error::Forbidden("Only workers can apply for jobs.".into()));
        }
        if !worker.is_verified {
            return Err(Error::Forbidden(WORKER_VERIFICATION_REQUIRED.into()));
        }
        let job = self.jobs.get(job_id).await?;
        if job.status != "open" {
            return Err(Error::BadRequest(
                "This job is no longer accepting applications.".into(),
            ));
        }

        let application = sqlx::query_as::<_, Application>(
            r#"
            INSERT INTO applications (job_id, worker_id, status, cover_letter)
            VALUES ($1, $2, 'pending', $3)
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(worker.id)
        .bind(payload.cover_letter)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(application_id = %application.id, job_id = %job_id, "application submitted");
        self.bus
            .publish(Table::Applications, ChangeKind::Insert, &application);

        // A lost activity row never fails the application itself.
        if let Err(e) = self
            .activity
            .log(
                worker.id,
                "job_application",
                &format!("Applied for job: {}", job.title),
                Some(json!({ "job_id": job_id })),
            )
            .await
        {
            tracing::error!(error = ?e, "failed to log application activity");
        }
        Ok(application)
    }

    /// Applications for a job, visible to its owner only.
    pub async fn list_for_job(
        &self,
        owner_id: Uuid,
        job_id: Uuid,
    ) -> Result<Vec<ApplicationWithWorker>> {
        let job = self.jobs.get(job_id).await?;
        if job.employer_id != owner_id {
            return Err(Error::Forbidden(
                "Only the job owner can view its applications.".into(),
            ));
        }
        let rows = sqlx::query_as::<_, ApplicationWithWorker>(
            r#"
            SELECT a.*,
                   p.full_name AS worker_name,
                   p.phone AS worker_phone,
                   p.skills AS worker_skills,
                   p.profile_photo_url AS worker_photo_url,
                   p.is_verified AS worker_is_verified
            FROM applications a
            JOIN profiles p ON p.id = a.worker_id
            WHERE a.job_id = $1
            ORDER BY a.applied_at DESC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_for_worker(&self, worker_id: Uuid) -> Result<Vec<ApplicationWithJob>> {
        let rows = sqlx::query_as::<_, ApplicationWithJob>(
            r#"
            SELECT a.*,
                   j.title AS job_title,
                   j.location AS job_location,
                   j.pay_rate AS job_pay_rate,
                   j.employer_id AS employer_id,
                   p.full_name AS employer_name
            FROM applications a
            JOIN jobs j ON j.id = a.job_id
            JOIN profiles p ON p.id = j.employer_id
            WHERE a.worker_id = $1
            ORDER BY a.applied_at DESC
            "#,
        )
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn applied_job_ids(&self, worker_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT job_id FROM applications WHERE worker_id = $1")
            .bind(worker_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// The job owner accepts or rejects. Last write wins.
    pub async fn update_status(
        &self,
        owner_id: Uuid,
        application_id: Uuid,
        payload: UpdateApplicationStatusPayload,
    ) -> Result<Application> {
        let before = sqlx::query_as::<_, Application>("SELECT * FROM applications WHERE id = $1")
            .bind(application_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Application not found".into()))?;
        let job = self.jobs.get(before.job_id).await?;
        if job.employer_id != owner_id {
            return Err(Error::Forbidden(
                "Only the job owner can update this application.".into(),
            ));
        }

        let after = sqlx::query_as::<_, Application>(
            "UPDATE applications SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(application_id)
        .bind(&payload.status)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(application_id = %application_id, status = %after.status, "application status changed");
        self.bus.publish_update(Table::Applications, &before, &after);
        Ok(after)
    }
}
