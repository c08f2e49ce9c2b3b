//! Where application states come from.

use std::sync::Arc;

use async_trait::async_trait;

use super::{ApplicationStatus, parse_application_list};
use crate::{
    error::{Error, Result},
    exec::{ExecRequest, ProcessExecutor},
};

/// ArgoCD Application resource, fully qualified so it never clashes with
/// other `applications` CRDs.
pub const APPLICATION_RESOURCE: &str = "applications.argoproj.io";

/// Supplies the current list of applications.
#[async_trait]
pub trait ApplicationSource: Send + Sync {
    /// Fetch every application's current state.
    async fn fetch(&self) -> Result<Vec<ApplicationStatus>>;

    /// Number of applications that exist right now, whatever their state.
    async fn count(&self) -> Result<usize> {
        Ok(self.fetch().await?.len())
    }
}

/// [`ApplicationSource`] that asks kubectl.
pub struct KubectlApplicationSource {
    executor: Arc<dyn ProcessExecutor>,
    namespace: String,
    context: Option<String>,
}

impl KubectlApplicationSource {
    /// Source reading Applications in `namespace` of the current context.
    pub fn new(executor: Arc<dyn ProcessExecutor>, namespace: impl Into<String>) -> Self {
        Self { executor, namespace: namespace.into(), context: None }
    }

    /// Query a specific kubectl context instead of the current one.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn request(&self) -> ExecRequest {
        let mut request = ExecRequest::new("kubectl").args([
            "get",
            APPLICATION_RESOURCE,
            "-n",
            self.namespace.as_str(),
            "-o",
            "json",
        ]);
        if let Some(context) = &self.context {
            request = request.args(["--context", context.as_str()]);
        }
        request
    }
}

#[async_trait]
impl ApplicationSource for KubectlApplicationSource {
    async fn fetch(&self) -> Result<Vec<ApplicationStatus>> {
        let output = self.executor.execute(&self.request()).await?;
        if !output.success() {
            return Err(Error::other(format!(
                "listing applications failed: {}",
                output.stderr.trim()
            )));
        }
        parse_application_list(&output.stdout)
    }
}
