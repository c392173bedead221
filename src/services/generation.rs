use std::rc::Rc;

use log::debug;

use crate::config::WidgetConfig;
use crate::error::{AssistantError, Result};
use crate::models::{
    GenerationJob, JobListResponse, JobRequest, UploadFile, UploadRefKind, UploadResponse, UploadResult,
};
use crate::services::transport::{HttpRequest, HttpResponse, HttpTransport, Transport};

const UPLOAD_FAILED: &str = "Failed to upload file";
const CREATE_FAILED: &str = "Failed to create generation job";
const STATUS_FAILED: &str = "Failed to fetch job status";

/// Thin client for the course generation endpoints. Stateless; retries are
/// left to [`JobPoller`](crate::services::poller::JobPoller).
#[derive(Clone)]
pub struct GenerationJobClient {
    api_base: String,
    transport: Rc<dyn Transport>,
}

impl GenerationJobClient {
    pub fn new(api_base: impl Into<String>, transport: Rc<dyn Transport>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            transport,
        }
    }

    pub fn from_config(config: &WidgetConfig) -> Self {
        Self::new(config.generation_api_base.clone(), Rc::new(HttpTransport::csrf()))
    }

    pub async fn upload_file(&self, file: UploadFile) -> Result<UploadResult> {
        let url = format!("{}/upload/", self.api_base);
        debug!("uploading {} ({} bytes)", file.name, file.bytes.len());
        let resp = self
            .transport
            .send(HttpRequest::multipart(url, "file", file))
            .await
            .map_err(|e| AssistantError::Upload(e.user_message()))?;
        if !resp.is_success() {
            return Err(AssistantError::Upload(failure_message(&resp, UPLOAD_FAILED)));
        }
        let body: UploadResponse = resp
            .json()
            .map_err(|_| AssistantError::Upload(UPLOAD_FAILED.to_string()))?;
        match body {
            UploadResponse { file_id: Some(id), .. } => Ok(UploadResult {
                reference: id,
                kind: UploadRefKind::FileId,
            }),
            UploadResponse { file_path: Some(path), .. } => Ok(UploadResult {
                reference: path,
                kind: UploadRefKind::FilePath,
            }),
            UploadResponse { error, .. } => Err(AssistantError::Upload(
                error.unwrap_or_else(|| UPLOAD_FAILED.to_string()),
            )),
        }
    }

    pub async fn create_generation_job(&self, course_id: &str, request: &JobRequest) -> Result<GenerationJob> {
        let url = format!(
            "{}/generate/{}/",
            self.api_base,
            urlencoding::encode(course_id)
        );
        let body = serde_json::to_value(request)?;
        let resp = self
            .transport
            .send(HttpRequest::post_json(url, body))
            .await
            .map_err(|e| AssistantError::JobCreation(e.user_message()))?;
        if !resp.is_success() {
            return Err(AssistantError::JobCreation(failure_message(&resp, CREATE_FAILED)));
        }
        let job: GenerationJob = resp
            .json()
            .map_err(|_| AssistantError::JobCreation(CREATE_FAILED.to_string()))?;
        if job.id.is_empty() {
            return Err(AssistantError::JobCreation(
                "Server did not return a job id".to_string(),
            ));
        }
        Ok(job)
    }

    pub async fn get_job_status(&self, job_id: &str) -> Result<GenerationJob> {
        let url = format!("{}/jobs/{}/", self.api_base, urlencoding::encode(job_id));
        let resp = self
            .transport
            .send(HttpRequest::get(url))
            .await
            .map_err(|e| AssistantError::JobStatus(e.user_message()))?;
        if !resp.is_success() {
            return Err(AssistantError::JobStatus(failure_message(&resp, STATUS_FAILED)));
        }
        let mut job: GenerationJob = resp
            .json()
            .map_err(|e| AssistantError::JobStatus(e.user_message()))?;
        if job.id.is_empty() {
            job.id = job_id.to_string();
        }
        Ok(job)
    }

    pub async fn list_jobs(&self, course_id: Option<&str>) -> Result<Vec<GenerationJob>> {
        let mut url = format!("{}/jobs/", self.api_base);
        if let Some(course_id) = course_id {
            url.push_str("?course_id=");
            url.push_str(&urlencoding::encode(course_id));
        }
        let resp = self
            .transport
            .send(HttpRequest::get(url))
            .await
            .map_err(|e| AssistantError::JobStatus(e.user_message()))?;
        if !resp.is_success() {
            return Err(AssistantError::JobStatus(failure_message(&resp, STATUS_FAILED)));
        }
        let list: JobListResponse = resp
            .json()
            .map_err(|e| AssistantError::JobStatus(e.user_message()))?;
        Ok(list.into_jobs())
    }
}

fn failure_message(resp: &HttpResponse, fallback: &str) -> String {
    resp.server_message().unwrap_or_else(|| fallback.to_string())
}

/// Check a picked file against the upload rules before anything is sent.
pub fn validate_upload(file: &UploadFile, max_mb: u32) -> Result<()> {
    let is_pdf = file.mime == "application/pdf" || file.name.to_lowercase().ends_with(".pdf");
    if !is_pdf {
        return Err(AssistantError::InvalidInput("Please select a PDF file.".to_string()));
    }
    let size_mb = file.size_mb();
    if size_mb > f64::from(max_mb) {
        return Err(AssistantError::InvalidInput(format!(
            "File size must be less than {}MB. Current size: {:.1}MB",
            max_mb, size_mb
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobSource, JobStatus};
    use crate::services::transport::mock::{self, MockTransport};
    use crate::services::transport::{Method, RequestBody};
    use serde_json::json;

    fn client(transport: &Rc<MockTransport>) -> GenerationJobClient {
        GenerationJobClient::new("/api/ai-assistant/", transport.clone())
    }

    fn pdf(size: usize) -> UploadFile {
        UploadFile {
            name: "notes.pdf".into(),
            mime: "application/pdf".into(),
            bytes: vec![0; size],
        }
    }

    #[tokio::test]
    async fn upload_sends_multipart_file() {
        let transport = Rc::new(MockTransport::new([mock::ok(json!({"file_id": "f1"}))]));
        let result = client(&transport).upload_file(pdf(16)).await.unwrap();
        assert_eq!(result, UploadResult { reference: "f1".into(), kind: UploadRefKind::FileId });

        let request = &transport.requests()[0];
        assert_eq!(request.url, "/api/ai-assistant/upload/");
        assert!(matches!(&request.body, RequestBody::Multipart { field, .. } if field == "file"));
    }

    #[tokio::test]
    async fn upload_accepts_file_path() {
        let transport = Rc::new(MockTransport::new([mock::ok(json!({"file_path": "uploads/a.pdf"}))]));
        let result = client(&transport).upload_file(pdf(1)).await.unwrap();
        assert_eq!(result.kind, UploadRefKind::FilePath);
        assert_eq!(result.reference, "uploads/a.pdf");
    }

    #[tokio::test]
    async fn upload_error_messages() {
        let transport = Rc::new(MockTransport::new([
            mock::status(413, json!({"error": "File too large"})),
            mock::status(500, json!({})),
            mock::ok(json!({})),
            mock::fail("offline"),
        ]));
        let client = client(&transport);
        assert_eq!(
            client.upload_file(pdf(1)).await.unwrap_err(),
            AssistantError::Upload("File too large".into())
        );
        assert_eq!(
            client.upload_file(pdf(1)).await.unwrap_err(),
            AssistantError::Upload("Failed to upload file".into())
        );
        assert_eq!(
            client.upload_file(pdf(1)).await.unwrap_err(),
            AssistantError::Upload("Failed to upload file".into())
        );
        assert_eq!(
            client.upload_file(pdf(1)).await.unwrap_err(),
            AssistantError::Upload("offline".into())
        );
    }

    #[tokio::test]
    async fn create_job_posts_to_course_endpoint() {
        let transport = Rc::new(MockTransport::new([mock::ok(json!({"id": "j1", "status": "starting"}))]));
        let request = JobRequest {
            source: JobSource::File("f1".into()),
            instructions: "Build a course".into(),
            model: Some("gpt-4o".into()),
        };
        let job = client(&transport)
            .create_generation_job("course-v1:Org+C+R", &request)
            .await
            .unwrap();
        assert_eq!(job.id, "j1");
        assert_eq!(job.status, JobStatus::Starting);

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::Post);
        assert_eq!(sent.url, "/api/ai-assistant/generate/course-v1%3AOrg%2BC%2BR/");
        assert_eq!(
            sent.json_body(),
            Some(&json!({"pdf_file": "f1", "instructions": "Build a course", "model": "gpt-4o"}))
        );
    }

    #[tokio::test]
    async fn create_job_failure() {
        let transport = Rc::new(MockTransport::new([
            mock::status(400, json!({"detail": "instructions required"})),
            mock::ok(json!({"status": "starting"})),
        ]));
        let client = client(&transport);
        let request = JobRequest {
            source: JobSource::Text("raw".into()),
            instructions: String::new(),
            model: None,
        };
        assert_eq!(
            client.create_generation_job("c", &request).await.unwrap_err(),
            AssistantError::JobCreation("instructions required".into())
        );
        assert!(matches!(
            client.create_generation_job("c", &request).await,
            Err(AssistantError::JobCreation(_))
        ));
    }

    #[tokio::test]
    async fn job_status_fills_missing_id() {
        let transport = Rc::new(MockTransport::new([
            mock::ok(json!({"status": "processing", "progress_percent": 40, "progress_message": "Outlining"})),
            mock::status(404, json!({"detail": "Not found."})),
        ]));
        let client = client(&transport);
        let job = client.get_job_status("j1").await.unwrap();
        assert_eq!(job.id, "j1");
        assert_eq!(job.progress_percent, 40.0);
        assert_eq!(job.progress_message.as_deref(), Some("Outlining"));
        assert_eq!(transport.requests()[0].url, "/api/ai-assistant/jobs/j1/");

        assert_eq!(
            client.get_job_status("j1").await.unwrap_err(),
            AssistantError::JobStatus("Not found.".into())
        );
    }

    #[tokio::test]
    async fn list_jobs_with_and_without_filter() {
        let transport = Rc::new(MockTransport::new([
            mock::ok(json!([{"id": 1, "status": "completed"}, {"id": 2, "status": "failed"}])),
            mock::ok(json!({"results": [{"id": "a", "status": "processing"}]})),
        ]));
        let client = client(&transport);
        let all = client.list_jobs(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "1");

        let filtered = client.list_jobs(Some("course-v1:A+B+C")).await.unwrap();
        assert_eq!(filtered[0].status, JobStatus::Processing);

        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec![
                "/api/ai-assistant/jobs/".to_string(),
                "/api/ai-assistant/jobs/?course_id=course-v1%3AA%2BB%2BC".to_string(),
            ]
        );
    }

    #[test]
    fn upload_validation() {
        assert!(validate_upload(&pdf(1024), 50).is_ok());

        let doc = UploadFile { name: "notes.docx".into(), mime: "application/msword".into(), bytes: vec![] };
        assert_eq!(
            validate_upload(&doc, 50).unwrap_err().to_string(),
            "Please select a PDF file."
        );

        let big = pdf(3 * 1024 * 1024 / 2);
        assert_eq!(
            validate_upload(&big, 1).unwrap_err().to_string(),
            "File size must be less than 1MB. Current size: 1.5MB"
        );

        let no_mime = UploadFile { name: "Slides.PDF".into(), mime: String::new(), bytes: vec![1] };
        assert!(validate_upload(&no_mime, 1).is_ok());
    }
}
