use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime, Document};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::AccountSummary;
use crate::utils::{fmt_date, ApiError};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Open,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    #[default]
    Applied,
    Approved,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Application {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub provider_id: ObjectId,
    pub status: ApplicationStatus,
    pub applied_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobPost {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub description: String,
    pub duration: String,
    pub service_id: ObjectId,
    #[serde(default)]
    pub location: Option<String>,
    pub customer_id: ObjectId,
    #[serde(default)]
    pub job_status: JobStatus,
    #[serde(default)]
    pub assigned_provider_id: Option<ObjectId>,
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub completed_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl JobPost {
    pub fn application_of(&self, provider_id: &ObjectId) -> Option<&Application> {
        self.applications.iter().find(|a| &a.provider_id == provider_id)
    }

    fn application_mut(&mut self, application_id: &ObjectId) -> Result<&mut Application, ApiError> {
        self.applications
            .iter_mut()
            .find(|a| &a.id == application_id)
            .ok_or_else(|| ApiError::not_found("Application not found"))
    }

    /// Adds a fresh `applied` entry for the provider.
    pub fn apply(&mut self, provider_id: ObjectId, now: DateTime) -> Result<&Application, ApiError> {
        if self.application_of(&provider_id).is_some() {
            return Err(ApiError::bad_request("You have already applied to this job post"));
        }
        if self.job_status != JobStatus::Open {
            return Err(ApiError::bad_request("This job post is no longer accepting applications"));
        }

        self.applications.push(Application {
            id: ObjectId::new(),
            provider_id,
            status: ApplicationStatus::Applied,
            applied_at: now,
        });
        self.updated_at = now;
        Ok(&self.applications[self.applications.len() - 1])
    }

    /// Approves an application, assigning its provider and starting the job.
    pub fn approve_application(&mut self, application_id: &ObjectId, now: DateTime) -> Result<ObjectId, ApiError> {
        let application = self.application_mut(application_id)?;
        if application.status == ApplicationStatus::Approved {
            return Err(ApiError::bad_request("Application is already approved"));
        }
        application.status = ApplicationStatus::Approved;
        let provider_id = application.provider_id;

        self.job_status = JobStatus::InProgress;
        self.assigned_provider_id = Some(provider_id);
        self.updated_at = now;
        Ok(provider_id)
    }

    pub fn reject_application(&mut self, application_id: &ObjectId, now: DateTime) -> Result<ObjectId, ApiError> {
        let application = self.application_mut(application_id)?;
        if application.status == ApplicationStatus::Rejected {
            return Err(ApiError::bad_request("Application is already rejected"));
        }
        application.status = ApplicationStatus::Rejected;
        let provider_id = application.provider_id;

        if self.assigned_provider_id == Some(provider_id) {
            self.assigned_provider_id = None;
            if self.job_status == JobStatus::InProgress {
                self.job_status = JobStatus::Open;
            }
        }
        self.updated_at = now;
        Ok(provider_id)
    }

    /// Marks the job done; only a provider holding an approved application may.
    pub fn complete(&mut self, provider_id: &ObjectId, now: DateTime) -> Result<(), ApiError> {
        let approved = self
            .application_of(provider_id)
            .is_some_and(|a| a.status == ApplicationStatus::Approved);
        if !approved {
            return Err(ApiError::forbidden("You can only complete jobs you were approved for"));
        }
        if self.job_status == JobStatus::Completed {
            return Err(ApiError::bad_request("Job is already completed"));
        }

        self.job_status = JobStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Pushes a new application unless the job closed or the provider applied meanwhile.
    pub fn application_push(&self, application: &Application) -> Result<(Document, Document), mongodb::bson::ser::Error> {
        let filter = doc! {
            "_id": self.id,
            "job_status": to_bson(&JobStatus::Open)?,
            "applications.provider_id": { "$ne": application.provider_id },
        };
        let update = doc! {
            "$push": { "applications": to_bson(application)? },
            "$set": { "updated_at": self.updated_at },
        };
        Ok((filter, update))
    }

    /// Writes an approve/reject decision, pinned to the state it was computed from.
    pub fn decision_write(
        &self,
        before: &JobPost,
        application_id: &ObjectId,
    ) -> Result<(Document, Document), mongodb::bson::ser::Error> {
        let status_in = |job: &JobPost| {
            job.applications
                .iter()
                .find(|a| &a.id == application_id)
                .map(|a| a.status)
                .unwrap_or_default()
        };

        let filter = doc! {
            "_id": self.id,
            "job_status": to_bson(&before.job_status)?,
            "assigned_provider_id": before.assigned_provider_id,
            "applications": { "$elemMatch": {
                "_id": application_id,
                "status": to_bson(&status_in(before))?,
            } },
        };
        let update = doc! { "$set": {
            "applications.$.status": to_bson(&status_in(self))?,
            "job_status": to_bson(&self.job_status)?,
            "assigned_provider_id": self.assigned_provider_id,
            "updated_at": self.updated_at,
        } };
        Ok((filter, update))
    }

    /// Marks the job completed if the provider's application is still approved.
    pub fn completion_write(
        &self,
        before: &JobPost,
        provider_id: &ObjectId,
    ) -> Result<(Document, Document), mongodb::bson::ser::Error> {
        let filter = doc! {
            "_id": self.id,
            "job_status": to_bson(&before.job_status)?,
            "applications": { "$elemMatch": {
                "provider_id": provider_id,
                "status": to_bson(&ApplicationStatus::Approved)?,
            } },
        };
        let update = doc! { "$set": {
            "job_status": to_bson(&self.job_status)?,
            "completed_at": self.completed_at,
            "updated_at": self.updated_at,
        } };
        Ok((filter, update))
    }

    /// Whether a work post for this job may be published by the provider.
    pub fn completed_by(&self, provider_id: &ObjectId) -> bool {
        self.job_status == JobStatus::Completed
            && self
                .application_of(provider_id)
                .is_some_and(|a| a.status == ApplicationStatus::Approved)
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ApplicationResponse {
    pub id: String,
    pub provider_id: String,
    pub status: ApplicationStatus,
    pub applied_at: String,
}

impl From<Application> for ApplicationResponse {
    fn from(a: Application) -> Self {
        ApplicationResponse {
            id: a.id.to_hex(),
            provider_id: a.provider_id.to_hex(),
            status: a.status,
            applied_at: fmt_date(&a.applied_at),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct JobPostResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub duration: String,
    pub service_id: String,
    pub location: Option<String>,
    pub customer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<AccountSummary>,
    pub job_status: JobStatus,
    pub assigned_provider_id: Option<String>,
    pub applications: Vec<ApplicationResponse>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<JobPost> for JobPostResponse {
    fn from(j: JobPost) -> Self {
        JobPostResponse {
            id: j.id.map(|id| id.to_hex()).unwrap_or_default(),
            title: j.title,
            description: j.description,
            duration: j.duration,
            service_id: j.service_id.to_hex(),
            location: j.location,
            customer_id: j.customer_id.to_hex(),
            customer: None,
            job_status: j.job_status,
            assigned_provider_id: j.assigned_provider_id.map(|id| id.to_hex()),
            applications: j.applications.into_iter().map(Into::into).collect(),
            completed_at: j.completed_at.as_ref().map(fmt_date),
            created_at: fmt_date(&j.created_at),
            updated_at: fmt_date(&j.updated_at),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateJobPostDto {
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration: Option<String>,
    pub service_id: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateJobPostDto {
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration: Option<String>,
    pub service_id: Option<String>,
    pub location: Option<String>,
    pub job_status: Option<JobStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobPost {
        let now = DateTime::now();
        JobPost {
            id: Some(ObjectId::new()),
            title: "Fix roof".into(),
            description: "Leaking in two places".into(),
            duration: "3 days".into(),
            service_id: ObjectId::new(),
            location: None,
            customer_id: ObjectId::new(),
            job_status: JobStatus::Open,
            assigned_provider_id: None,
            applications: Vec::new(),
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn duplicate_applications_are_rejected() {
        let mut post = job();
        let provider = ObjectId::new();
        post.apply(provider, DateTime::now()).unwrap();
        let err = post.apply(provider, DateTime::now()).unwrap_err();
        assert_eq!(err.message, "You have already applied to this job post");
        assert_eq!(post.applications.len(), 1);
    }

    #[test]
    fn approving_starts_the_job() {
        let mut post = job();
        let provider = ObjectId::new();
        let app_id = post.apply(provider, DateTime::now()).unwrap().id;

        assert_eq!(post.approve_application(&app_id, DateTime::now()).unwrap(), provider);
        assert_eq!(post.job_status, JobStatus::InProgress);
        assert_eq!(post.assigned_provider_id, Some(provider));

        let err = post.approve_application(&app_id, DateTime::now()).unwrap_err();
        assert_eq!(err.message, "Application is already approved");
    }

    #[test]
    fn closed_jobs_take_no_applications() {
        let mut post = job();
        let first = post.apply(ObjectId::new(), DateTime::now()).unwrap().id;
        post.approve_application(&first, DateTime::now()).unwrap();
        assert!(post.apply(ObjectId::new(), DateTime::now()).is_err());
    }

    #[test]
    fn rejecting_twice_fails_and_unknown_ids_are_404() {
        let mut post = job();
        let app_id = post.apply(ObjectId::new(), DateTime::now()).unwrap().id;
        post.reject_application(&app_id, DateTime::now()).unwrap();
        assert_eq!(
            post.reject_application(&app_id, DateTime::now()).unwrap_err().message,
            "Application is already rejected"
        );
        assert_eq!(
            post.reject_application(&ObjectId::new(), DateTime::now()).unwrap_err().status,
            rocket::http::Status::NotFound
        );
    }

    #[test]
    fn rejecting_the_assignee_reopens_the_job() {
        let mut post = job();
        let app_id = post.apply(ObjectId::new(), DateTime::now()).unwrap().id;
        post.approve_application(&app_id, DateTime::now()).unwrap();
        post.reject_application(&app_id, DateTime::now()).unwrap();
        assert_eq!(post.job_status, JobStatus::Open);
        assert!(post.assigned_provider_id.is_none());
    }

    #[test]
    fn only_the_approved_provider_completes() {
        let mut post = job();
        let provider = ObjectId::new();
        let outsider = ObjectId::new();
        let app_id = post.apply(provider, DateTime::now()).unwrap().id;

        assert_eq!(
            post.complete(&provider, DateTime::now()).unwrap_err().status,
            rocket::http::Status::Forbidden
        );

        post.approve_application(&app_id, DateTime::now()).unwrap();
        assert!(post.complete(&outsider, DateTime::now()).is_err());
        assert!(!post.completed_by(&provider));

        post.complete(&provider, DateTime::now()).unwrap();
        assert_eq!(post.job_status, JobStatus::Completed);
        assert!(post.completed_at.is_some());
        assert!(post.completed_by(&provider));
        assert!(!post.completed_by(&outsider));
    }

    #[test]
    fn application_push_requires_an_open_job_without_the_provider() {
        let mut post = job();
        let provider = ObjectId::new();
        let application = post.apply(provider, DateTime::now()).unwrap().clone();
        let (filter, update) = post.application_push(&application).unwrap();

        assert_eq!(filter.get_str("job_status").unwrap(), "open");
        assert_eq!(
            filter.get_document("applications.provider_id").unwrap(),
            &doc! { "$ne": provider }
        );
        let pushed = update.get_document("$push").unwrap().get_document("applications").unwrap();
        assert_eq!(pushed.get_object_id("_id").unwrap(), application.id);
        assert_eq!(pushed.get_str("status").unwrap(), "applied");
    }

    #[test]
    fn decision_write_pins_the_previous_state() {
        let mut post = job();
        let provider = ObjectId::new();
        let app_id = post.apply(provider, DateTime::now()).unwrap().id;
        let before = post.clone();
        post.approve_application(&app_id, DateTime::now()).unwrap();

        let (filter, update) = post.decision_write(&before, &app_id).unwrap();
        assert_eq!(filter.get_str("job_status").unwrap(), "open");
        assert!(filter.get("assigned_provider_id").unwrap().as_null().is_some());
        let matched = filter.get_document("applications").unwrap().get_document("$elemMatch").unwrap();
        assert_eq!(matched.get_object_id("_id").unwrap(), app_id);
        assert_eq!(matched.get_str("status").unwrap(), "applied");

        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("applications.$.status").unwrap(), "approved");
        assert_eq!(set.get_str("job_status").unwrap(), "in_progress");
        assert_eq!(set.get_object_id("assigned_provider_id").unwrap(), provider);
    }

    #[test]
    fn completion_write_needs_an_approved_application() {
        let mut post = job();
        let provider = ObjectId::new();
        let app_id = post.apply(provider, DateTime::now()).unwrap().id;
        post.approve_application(&app_id, DateTime::now()).unwrap();
        let before = post.clone();
        post.complete(&provider, DateTime::now()).unwrap();

        let (filter, update) = post.completion_write(&before, &provider).unwrap();
        assert_eq!(filter.get_str("job_status").unwrap(), "in_progress");
        let matched = filter.get_document("applications").unwrap().get_document("$elemMatch").unwrap();
        assert_eq!(matched.get_object_id("provider_id").unwrap(), provider);
        assert_eq!(matched.get_str("status").unwrap(), "approved");
        assert_eq!(update.get_document("$set").unwrap().get_str("job_status").unwrap(), "completed");
    }

    #[test]
    fn statuses_serialize_snake_case() {
        assert_eq!(serde_json::to_value(JobStatus::InProgress).unwrap(), "in_progress");
        assert_eq!(serde_json::to_value(ApplicationStatus::Applied).unwrap(), "applied");
    }
}
