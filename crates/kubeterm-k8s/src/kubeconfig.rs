//! Kubeconfig helpers: context listing and per-context client construction

use std::fs;
use std::path::Path;

use kube::config::{KubeConfigOptions, Kubeconfig};

use crate::error::SessionError;
use kubeterm_types::ContextInfo;

/// Namespace used when nothing better is known
pub const DEFAULT_NAMESPACE: &str = "default";

/// Namespace file mounted alongside the service-account token
pub const SERVICE_ACCOUNT_NAMESPACE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Read a namespace from a file such as the service-account mount.
/// Returns `None` if the file is missing or blank.
pub fn namespace_from_file(path: impl AsRef<Path>) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let namespace = content.trim();
    (!namespace.is_empty()).then(|| namespace.to_string())
}

/// [`namespace_from_file`], falling back to [`DEFAULT_NAMESPACE`]
pub fn namespace_from_file_or_default(path: impl AsRef<Path>) -> String {
    namespace_from_file(path).unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
}

/// Names of all contexts, sorted
pub(crate) fn context_names(kubeconfig: &Kubeconfig) -> Vec<String> {
    let mut names: Vec<String> = kubeconfig.contexts.iter().map(|c| c.name.clone()).collect();
    names.sort();
    names
}

pub(crate) fn has_context(kubeconfig: &Kubeconfig, name: &str) -> bool {
    kubeconfig.contexts.iter().any(|c| c.name == name)
}

/// Namespace configured on a context, if any
pub(crate) fn context_namespace(kubeconfig: &Kubeconfig, name: &str) -> Option<String> {
    kubeconfig
        .contexts
        .iter()
        .find(|c| c.name == name)
        .and_then(|c| c.context.as_ref())
        .and_then(|c| c.namespace.clone())
        .filter(|ns| !ns.is_empty())
}

/// Get all available contexts from kubeconfig
pub(crate) fn context_infos(kubeconfig: &Kubeconfig, current: Option<&str>) -> Vec<ContextInfo> {
    let mut infos: Vec<ContextInfo> = kubeconfig
        .contexts
        .iter()
        .map(|ctx| {
            let context = ctx.context.as_ref();
            ContextInfo::new(
                ctx.name.clone(),
                context.map(|c| c.cluster.clone()).unwrap_or_default(),
                context.and_then(|c| c.user.clone()).unwrap_or_default(),
                context.and_then(|c| c.namespace.clone()),
                Some(ctx.name.as_str()) == current,
            )
        })
        .collect();
    infos.sort_by(|a, b| a.name.cmp(&b.name));
    infos
}

/// Create a kube::Client for a specific context, or for the kubeconfig's
/// current context when `context` is `None`
pub(crate) async fn client_for_context(
    kubeconfig: &Kubeconfig,
    context: Option<&str>,
) -> Result<kube::Client, SessionError> {
    let label = context
        .map(str::to_string)
        .or_else(|| kubeconfig.current_context.clone())
        .unwrap_or_default();

    let config = kube::Config::from_custom_kubeconfig(
        kubeconfig.clone(),
        &KubeConfigOptions {
            context: context.map(str::to_string),
            ..Default::default()
        },
    )
    .await
    .map_err(|source| SessionError::Kubeconfig {
        context: label.clone(),
        source,
    })?;

    kube::Client::try_from(config).map_err(|source| SessionError::ClientBuild {
        context: label,
        source,
    })
}
