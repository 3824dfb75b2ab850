//! Generation backend abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::GenerationError;
use crate::core::job::Job;
use crate::util::serde::{GenerationType, JobId, UserId};

/// Payload handed to the generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Job being executed.
    pub job_id: JobId,
    /// Owner of the job.
    pub user_id: UserId,
    /// Opaque project context.
    pub project_context: Option<serde_json::Value>,
    /// Requested content kind.
    pub generation_type: GenerationType,
    /// Prompt text.
    pub prompt: String,
    /// Backend parameters.
    pub input_params: serde_json::Value,
}

impl From<&Job> for GenerationRequest {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            user_id: job.user_id.clone(),
            project_context: job.project_context.clone(),
            generation_type: job.generation_type,
            prompt: job.prompt.clone(),
            input_params: job.input_params.clone(),
        }
    }
}

/// Successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutput {
    /// Reference to the stored artifact.
    pub result_ref: String,
}

/// The AI backend that performs the actual generation.
///
/// The scheduler treats it as opaque: it only distinguishes success, with a
/// result reference, from failure. Calls are wrapped in a timeout by the
/// worker pool, so implementations need not enforce one themselves.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_credit_queue::core::{GenerationError, GenerationOutput, GenerationRequest, GenerationService};
///
/// struct EchoBackend;
///
/// #[async_trait]
/// impl GenerationService for EchoBackend {
///     async fn generate(&self, req: GenerationRequest) -> Result<GenerationOutput, GenerationError> {
///         Ok(GenerationOutput { result_ref: format!("echo://{}", req.job_id) })
///     }
/// }
/// ```
#[async_trait]
pub trait GenerationService: Send + Sync + 'static {
    /// Run one generation.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, GenerationError>;
}
