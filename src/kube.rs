//! kubectl helpers.
//!
//! Thin wrappers that run `kubectl ... -o json` through a
//! [`ProcessExecutor`] and pick fields out of the result.

use serde_json::Value;

use crate::{
    error::{Error, Result},
    exec::{ExecRequest, ProcessExecutor},
};

/// Run `kubectl <args> -o json` and parse stdout.
///
/// A non-zero exit or unparsable output is an error; callers that poll treat
/// it as transient.
pub async fn kubectl_get_json(executor: &dyn ProcessExecutor, args: &[&str]) -> Result<Value> {
    let request = ExecRequest::new("kubectl").args(args.iter().copied()).args(["-o", "json"]);
    let output = executor.execute(&request).await?;
    if !output.success() {
        return Err(Error::other(format!(
            "kubectl {} failed: {}",
            args.first().copied().unwrap_or_default(),
            output.stderr.trim()
        )));
    }
    Ok(serde_json::from_str(&output.stdout)?)
}

/// The `items` array of a kubectl list, or an empty slice.
pub fn items(list: &Value) -> &[Value] {
    list.get("items").and_then(Value::as_array).map_or(&[], Vec::as_slice)
}

/// String field at a JSON pointer.
pub fn str_at<'a>(item: &'a Value, pointer: &str) -> Option<&'a str> {
    item.pointer(pointer).and_then(Value::as_str)
}

/// Whether a `Node` object reports condition `Ready=True`.
pub fn node_is_ready(node: &Value) -> bool {
    node.pointer("/status/conditions")
        .and_then(Value::as_array)
        .is_some_and(|conditions| {
            conditions.iter().any(|c| {
                str_at(c, "/type") == Some("Ready") && str_at(c, "/status") == Some("True")
            })
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::exec::testing::{ScriptedExecutor, fail, ok};

    #[test]
    fn test_node_is_ready() {
        let ready = json!({"status": {"conditions": [
            {"type": "MemoryPressure", "status": "False"},
            {"type": "Ready", "status": "True"}
        ]}});
        let not_ready = json!({"status": {"conditions": [{"type": "Ready", "status": "Unknown"}]}});
        assert!(node_is_ready(&ready));
        assert!(!node_is_ready(&not_ready));
        assert!(!node_is_ready(&json!({})));
    }

    #[test]
    fn test_items() {
        assert_eq!(items(&json!({"items": [1, 2]})).len(), 2);
        assert!(items(&json!({"kind": "List"})).is_empty());
    }

    #[tokio::test]
    async fn test_kubectl_get_json() {
        let exec = ScriptedExecutor::new()
            .on("kubectl get nodes", ok(r#"{"items": []}"#))
            .on("kubectl get pods", fail(1, "connection refused"));

        let value = kubectl_get_json(&exec, &["get", "nodes"]).await.unwrap();
        assert!(items(&value).is_empty());
        assert_eq!(exec.calls()[0], "kubectl get nodes -o json");

        let err = kubectl_get_json(&exec, &["get", "pods"]).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }
}
