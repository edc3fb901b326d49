use crate::dto::profile_dto::{
    UpdateProfilePayload, VerificationRequestPayload, WorkerSearchQuery,
};
use crate::error::{Error, Result};
use crate::models::profile::Profile;
use crate::models::verification::VerificationRequest;
use crate::realtime::{ChangeBus, Table};
use crate::services::activity_service::ActivityService;
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

fn updated_fields(payload: &UpdateProfilePayload) -> Vec<&'static str> {
    let mut fields = Vec::new();
    let mut mark = |set: bool, name: &'static str| {
        if set {
            fields.push(name);
        }
    };
    mark(payload.full_name.is_some(), "full_name");
    mark(payload.phone.is_some(), "phone");
    mark(payload.company_name.is_some(), "company_name");
    mark(payload.bio.is_some(), "bio");
    mark(payload.address.is_some(), "address");
    mark(payload.skills.is_some(), "skills");
    mark(payload.profile_photo_url.is_some(), "profile_photo_url");
    mark(payload.resume_url.is_some(), "resume_url");
    mark(payload.identity_document_url.is_some(), "identity_document_url");
    mark(payload.certification_urls.is_some(), "certification_urls");
    fields
}

#[derive(Clone)]
pub struct ProfileService {
    pool: PgPool,
    bus: ChangeBus,
    activity: ActivityService,
}

impl ProfileService {
    pub fn new(pool: PgPool, bus: ChangeBus, activity: ActivityService) -> Self {
        Self {
            pool,
            bus,
            activity,
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Profile> {
        sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Profile not found".into()))
    }

    /// Owner edit of the caller's own profile; absent fields are left as they are.
    pub async fn update(&self, id: Uuid, payload: UpdateProfilePayload) -> Result<Profile> {
        let before = self.get(id).await?;
        let fields = updated_fields(&payload);

        let after = sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles SET
                full_name = COALESCE($2, full_name),
                phone = COALESCE($3, phone),
                company_name = COALESCE($4, company_name),
                bio = COALESCE($5, bio),
                address = COALESCE($6, address),
                skills = COALESCE($7, skills),
                profile_photo_url = COALESCE($8, profile_photo_url),
                resume_url = COALESCE($9, resume_url),
                identity_document_url = COALESCE($10, identity_document_url),
                certification_urls = COALESCE($11, certification_urls),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(payload.full_name)
        .bind(payload.phone)
        .bind(payload.company_name)
        .bind(payload.bio)
        .bind(payload.address)
        .bind(payload.skills)
        .bind(payload.profile_photo_url)
        .bind(payload.resume_url)
        .bind(payload.identity_document_url)
        .bind(payload.certification_urls)
        .fetch_one(&self.pool)
        .await?;

        self.bus.publish_update(Table::Profiles, &before, &after);
        if let Err(e) = self
            .activity
            .log(
                id,
                "profile_update",
                "Updated profile information",
                Some(json!({ "updated_fields": fields, "timestamp": Utc::now() })),
            )
            .await
        {
            tracing::error!(error = ?e, "failed to log profile activity");
        }
        Ok(after)
    }

    /// Workers for the "find workers" directory, most recently updated first.
    pub async fn search_workers(&self, query: WorkerSearchQuery) -> Result<Vec<Profile>> {
        let limit = query.limit.unwrap_or(50).clamp(1, 200);

        let mut filters = vec![
            "role = 'worker'".to_string(),
            "deleted_at IS NULL".to_string(),
            "user_status = 'active'".to_string(),
        ];
        let mut args: Vec<String> = Vec::new();

        if let Some(search) = query.search.filter(|s| !s.trim().is_empty()) {
            args.push(format!("%{}%", search.trim()));
            filters.push(format!(
                "(full_name ILIKE ${0} OR bio ILIKE ${0})",
                args.len()
            ));
        }
        if let Some(location) = query.location.filter(|s| !s.trim().is_empty()) {
            args.push(format!("%{}%", location.trim()));
            filters.push(format!("address ILIKE ${}", args.len()));
        }
        if let Some(skill) = query.skill.filter(|s| !s.trim().is_empty() && s != "all") {
            args.push(format!("%{}%", skill.trim()));
            filters.push(format!(
                "EXISTS (SELECT 1 FROM unnest(skills) s WHERE s ILIKE ${})",
                args.len()
            ));
        }

        let sql = format!(
            "SELECT * FROM profiles WHERE {} ORDER BY updated_at DESC LIMIT ${}",
            filters.join(" AND "),
            args.len() + 1
        );
        let mut statement = sqlx::query_as::<_, Profile>(&sql);
        for value in &args {
            statement = statement.bind(value);
        }
        let workers = statement.bind(limit).fetch_all(&self.pool).await?;
        Ok(workers)
    }

    pub async fn submit_verification(
        &self,
        id: Uuid,
        payload: VerificationRequestPayload,
    ) -> Result<VerificationRequest> {
        let request = sqlx::query_as::<_, VerificationRequest>(
            r#"
            INSERT INTO verification_requests (user_id, verification_type, document_urls)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(payload.verification_type.trim())
        .bind(payload.document_urls)
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(request_id = %request.id, "verification submitted");
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_present_fields_are_reported() {
        let payload = UpdateProfilePayload {
            bio: Some("Carpenter".into()),
            skills: Some(vec!["carpentry".into()]),
            ..Default::default()
        };
        assert_eq!(updated_fields(&payload), vec!["bio", "skills"]);
    }
}
