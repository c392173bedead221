use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Error,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Error => "error",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
        }
    }
}

/// Accepted shapes of a non-streamed chat reply.
#[derive(Clone, PartialEq, Debug)]
pub enum AssistantReply {
    Text(String),
    /// The backend answered, but with `metadata.error` instead of text.
    Error(String),
}

// API DTOs
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// One `data:` frame of the streaming endpoint.
#[derive(Deserialize, Debug)]
pub struct StreamFrame {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: StreamDelta,
}

#[derive(Deserialize, Debug, Default)]
pub struct StreamDelta {
    pub content: Option<String>,
}

impl StreamFrame {
    pub fn content(&self) -> Option<&str> {
        self.choices.first()?.delta.content.as_deref()
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    #[serde(alias = "pending", alias = "queued")]
    Starting,
    #[serde(alias = "running", alias = "in_progress")]
    Processing,
    Completed,
    Failed,
    /// Any status this client does not know, e.g. `cancelled`. Terminal.
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Unknown)
    }

    pub fn label(self) -> &'static str {
        match self {
            JobStatus::Starting => "Starting...",
            JobStatus::Processing => "Processing...",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
            JobStatus::Unknown => "Stopped",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
pub struct GenerationJob {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default, deserialize_with = "clamped_percent")]
    pub progress_percent: f64,
    #[serde(default)]
    pub progress_message: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl GenerationJob {
    /// Placeholder record shown between job creation and the first poll.
    pub fn starting(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Starting,
            ..Self::default()
        }
    }
}

// Job ids are integers on some deployments and UUID strings on others.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

fn clamped_percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    Ok(value.clamp(0.0, 100.0))
}

/// Which field of the upload response carried the reference.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UploadRefKind {
    FileId,
    FilePath,
}

/// Opaque handle for an uploaded source document.
#[derive(Clone, PartialEq, Debug)]
pub struct UploadResult {
    pub reference: String,
    pub kind: UploadRefKind,
}

/// Raw upload endpoint body before normalisation.
#[derive(Deserialize, Debug, Default)]
pub struct UploadResponse {
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub file_id: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A file picked by the user, already read into memory.
#[derive(Clone, PartialEq, Debug)]
pub struct UploadFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn size_mb(&self) -> f64 {
        self.bytes.len() as f64 / (1024.0 * 1024.0)
    }
}

/// Where the generator should take its material from.
#[derive(Serialize, Clone, PartialEq, Debug)]
pub enum JobSource {
    #[serde(rename = "pdf_file")]
    File(String),
    #[serde(rename = "source_url")]
    Url(String),
    #[serde(rename = "source_text")]
    Text(String),
}

#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct JobRequest {
    #[serde(flatten)]
    pub source: JobSource,
    pub instructions: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum JobListResponse {
    Plain(Vec<GenerationJob>),
    Paginated { results: Vec<GenerationJob> },
}

impl JobListResponse {
    pub fn into_jobs(self) -> Vec<GenerationJob> {
        match self {
            JobListResponse::Plain(jobs) => jobs,
            JobListResponse::Paginated { results } => results,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct ModelOption {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}
