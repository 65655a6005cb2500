//! # Run Controller
//!
//! Cancels the target `PipelineRun` once job activities are done. Tekton
//! cancels a run when its `spec.status` is set to the cancellation sentinel,
//! so cancelling is a read-modify-replace of the object. The replace carries
//! the fetched `resourceVersion`; a concurrent writer surfaces as
//! [`ControllerError::Conflict`] and is not retried.

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, PostParams};
use kube::discovery::ApiResource;
use kube::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from the control plane.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("PipelineRun {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("PipelineRun {namespace}/{name} was modified concurrently, update rejected")]
    Conflict { namespace: String, name: String },

    #[error("PipelineRun {namespace}/{name} is malformed: {reason}")]
    MalformedRun {
        namespace: String,
        name: String,
        reason: String,
    },

    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),
}

impl ControllerError {
    /// Map a kube error for `namespace/name` onto the not-found and conflict cases.
    #[must_use]
    pub fn from_kube(err: kube::Error, namespace: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(ref response) if response.code == 404 => Self::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(ref response) if response.code == 409 => Self::Conflict {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            other => Self::Kube(other),
        }
    }
}

/// The parts of a `PipelineRun` the terminator cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSnapshot {
    pub namespace: String,
    pub name: String,
    /// Current `spec.status`, unset for a run nobody has paused or cancelled.
    pub spec_status: Option<String>,
    pub resource_version: Option<String>,
}

/// Control-plane operations on the target run.
#[async_trait]
pub trait RunController: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<RunSnapshot, ControllerError>;

    async fn cancel(&self, namespace: &str, name: &str) -> Result<(), ControllerError>;
}

#[async_trait]
impl<R: RunController + ?Sized> RunController for Arc<R> {
    async fn get(&self, namespace: &str, name: &str) -> Result<RunSnapshot, ControllerError> {
        (**self).get(namespace, name).await
    }

    async fn cancel(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        (**self).cancel(namespace, name).await
    }
}

/// Tekton `PipelineRun` API resource definition.
#[must_use]
pub fn pipeline_run_resource() -> ApiResource {
    ApiResource {
        group: "tekton.dev".to_string(),
        version: "v1beta1".to_string(),
        api_version: "tekton.dev/v1beta1".to_string(),
        kind: "PipelineRun".to_string(),
        plural: "pipelineruns".to_string(),
    }
}

/// [`RunController`] talking to the Kubernetes API server.
pub struct KubeRunController {
    client: Client,
    resource: ApiResource,
    cancel_status: String,
}

impl KubeRunController {
    pub fn new(client: Client, cancel_status: impl Into<String>) -> Self {
        Self {
            client,
            resource: pipeline_run_resource(),
            cancel_status: cancel_status.into(),
        }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.resource)
    }

    async fn fetch(&self, namespace: &str, name: &str) -> Result<DynamicObject, ControllerError> {
        self.api(namespace)
            .get(name)
            .await
            .map_err(|e| ControllerError::from_kube(e, namespace, name))
    }
}

#[async_trait]
impl RunController for KubeRunController {
    async fn get(&self, namespace: &str, name: &str) -> Result<RunSnapshot, ControllerError> {
        let run = self.fetch(namespace, name).await?;
        Ok(snapshot(namespace, name, &run))
    }

    async fn cancel(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        let mut run = self.fetch(namespace, name).await?;
        let previous = spec_status(&run);

        set_spec_status(&mut run, &self.cancel_status).map_err(|reason| {
            ControllerError::MalformedRun {
                namespace: namespace.to_string(),
                name: name.to_string(),
                reason,
            }
        })?;

        debug!(
            namespace = %namespace,
            name = %name,
            resource_version = ?run.metadata.resource_version,
            "Submitting PipelineRun cancellation"
        );

        self.api(namespace)
            .replace(name, &PostParams::default(), &run)
            .await
            .map_err(|e| ControllerError::from_kube(e, namespace, name))?;

        info!(
            namespace = %namespace,
            name = %name,
            previous_status = ?previous,
            status = %self.cancel_status,
            "PipelineRun cancelled"
        );
        Ok(())
    }
}

fn spec_status(run: &DynamicObject) -> Option<String> {
    run.data
        .get("spec")
        .and_then(|spec| spec.get("status"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn snapshot(namespace: &str, name: &str, run: &DynamicObject) -> RunSnapshot {
    RunSnapshot {
        namespace: namespace.to_string(),
        name: name.to_string(),
        spec_status: spec_status(run),
        resource_version: run.metadata.resource_version.clone(),
    }
}

fn set_spec_status(run: &mut DynamicObject, status: &str) -> Result<(), String> {
    let spec = run
        .data
        .get_mut("spec")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| "missing spec".to_string())?;
    spec.insert("status".to_string(), Value::String(status.to_string()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;
    use serde_json::json;

    fn pipeline_run(data: Value) -> DynamicObject {
        let mut run = DynamicObject::new("build-42", &pipeline_run_resource())
            .within("ci")
            .data(data);
        run.metadata.resource_version = Some("1234".to_string());
        run
    }

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} for test"),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_resource_definition() {
        let resource = pipeline_run_resource();
        assert_eq!(resource.api_version, "tekton.dev/v1beta1");
        assert_eq!(resource.plural, "pipelineruns");
    }

    #[test]
    fn test_set_spec_status_preserves_spec() {
        let mut run = pipeline_run(json!({
            "spec": { "pipelineRef": { "name": "build" }, "timeout": "1h0m0s" }
        }));

        set_spec_status(&mut run, "PipelineRunCancelled").unwrap();

        assert_eq!(spec_status(&run).as_deref(), Some("PipelineRunCancelled"));
        assert_eq!(run.data["spec"]["pipelineRef"]["name"], "build");
        assert_eq!(run.data["spec"]["timeout"], "1h0m0s");
    }

    #[test]
    fn test_set_spec_status_overwrites_pending() {
        let mut run = pipeline_run(json!({ "spec": { "status": "PipelineRunPending" } }));

        set_spec_status(&mut run, "Cancelled").unwrap();

        assert_eq!(spec_status(&run).as_deref(), Some("Cancelled"));
    }

    #[test]
    fn test_set_spec_status_requires_spec() {
        let mut run = pipeline_run(json!({ "status": {} }));
        assert!(set_spec_status(&mut run, "Cancelled").is_err());
    }

    #[test]
    fn test_snapshot() {
        let run = pipeline_run(json!({ "spec": {} }));

        let snap = snapshot("ci", "build-42", &run);

        assert_eq!(snap.spec_status, None);
        assert_eq!(snap.resource_version.as_deref(), Some("1234"));
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            ControllerError::from_kube(api_error(404, "NotFound"), "ci", "build-42"),
            ControllerError::NotFound { .. }
        ));
        assert!(matches!(
            ControllerError::from_kube(api_error(409, "Conflict"), "ci", "build-42"),
            ControllerError::Conflict { .. }
        ));
        assert!(matches!(
            ControllerError::from_kube(api_error(403, "Forbidden"), "ci", "build-42"),
            ControllerError::Kube(_)
        ));
    }

    #[test]
    fn test_error_messages() {
        let err = ControllerError::from_kube(api_error(404, "NotFound"), "ci", "build-42");
        assert_eq!(err.to_string(), "PipelineRun ci/build-42 not found");
    }
}
