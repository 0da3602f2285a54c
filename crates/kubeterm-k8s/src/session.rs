//! The active cluster binding and context switching

use std::path::Path;

use kube::config::{Kubeconfig, KubeconfigError};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::kubeconfig::{
    DEFAULT_NAMESPACE, SERVICE_ACCOUNT_NAMESPACE, client_for_context, context_infos,
    context_names, context_namespace, has_context, namespace_from_file_or_default,
};
use kubeterm_types::{ClusterMode, ContextInfo};

/// One consistent view of the active cluster binding
#[derive(Clone)]
pub struct ClusterBinding {
    pub client: kube::Client,
    pub namespace: String,
    /// Active kubeconfig context (local mode only)
    pub context: Option<String>,
}

/// Owns the active cluster client and namespace for the whole process.
///
/// Construct once at startup and share it (e.g. behind an `Arc`) with every
/// consumer. All reads go through a shared lock and every mutation replaces
/// the binding under the exclusive lock, so a reader never sees a client from
/// one context next to the namespace of another.
pub struct ClusterSessionManager {
    mode: ClusterMode,

    /// Loaded kubeconfig, present only in local mode
    kubeconfig: Option<Kubeconfig>,

    /// The active binding
    state: RwLock<ClusterBinding>,

    /// Serializes context switches while the new client is being built
    switch_lock: Mutex<()>,
}

impl ClusterSessionManager {
    /// Try in-cluster credentials first, then fall back to the local
    /// kubeconfig. Fails if neither yields a usable client.
    ///
    /// An empty or missing `preferred_namespace` is derived from the
    /// service-account mount (in-cluster) or the current context (local),
    /// falling back to `"default"`.
    pub async fn initialize(preferred_namespace: Option<&str>) -> Result<Self, SessionError> {
        let preferred = preferred_namespace.filter(|ns| !ns.is_empty());

        let in_cluster_err = match kube::Config::incluster() {
            Ok(config) => {
                info!("Using in-cluster service account credentials");
                return Self::in_cluster(config, preferred);
            }
            Err(e) => e,
        };
        debug!(error = %in_cluster_err, "In-cluster config unavailable, trying kubeconfig");

        Self::from_kubeconfig(Kubeconfig::read(), preferred, &in_cluster_err.to_string()).await
    }

    /// Local fallback of [`Self::initialize`]. A kubeconfig that cannot be
    /// read, or that yields no usable client, is an authentication failure.
    async fn from_kubeconfig(
        kubeconfig: Result<Kubeconfig, KubeconfigError>,
        preferred_namespace: Option<&str>,
        in_cluster_err: &str,
    ) -> Result<Self, SessionError> {
        let authentication = |local: String| SessionError::Authentication {
            in_cluster: in_cluster_err.to_string(),
            local,
        };

        let kubeconfig = kubeconfig.map_err(|e| authentication(e.to_string()))?;
        Self::local(kubeconfig, preferred_namespace)
            .await
            .map_err(|e| authentication(e.to_string()))
    }

    /// Build an in-cluster session from an already loaded config
    pub fn in_cluster(
        config: kube::Config,
        preferred_namespace: Option<&str>,
    ) -> Result<Self, SessionError> {
        Self::in_cluster_with_namespace_file(
            config,
            preferred_namespace,
            SERVICE_ACCOUNT_NAMESPACE,
        )
    }

    /// Like [`Self::in_cluster`], reading the fallback namespace from
    /// `namespace_file` instead of the service-account mount
    pub fn in_cluster_with_namespace_file(
        config: kube::Config,
        preferred_namespace: Option<&str>,
        namespace_file: impl AsRef<Path>,
    ) -> Result<Self, SessionError> {
        let namespace = match preferred_namespace.filter(|ns| !ns.is_empty()) {
            Some(ns) => ns.to_string(),
            None => namespace_from_file_or_default(namespace_file),
        };

        let client = kube::Client::try_from(config).map_err(|source| SessionError::ClientBuild {
            context: ClusterMode::InCluster.as_str().to_string(),
            source,
        })?;

        Ok(Self::with_binding(
            ClusterMode::InCluster,
            None,
            ClusterBinding {
                client,
                namespace,
                context: None,
            },
        ))
    }

    /// Build a local session bound to the kubeconfig's current context
    pub async fn local(
        kubeconfig: Kubeconfig,
        preferred_namespace: Option<&str>,
    ) -> Result<Self, SessionError> {
        let current = kubeconfig.current_context.clone().filter(|c| !c.is_empty());
        let client = client_for_context(&kubeconfig, None).await?;

        let namespace = preferred_namespace
            .filter(|ns| !ns.is_empty())
            .map(str::to_string)
            .or_else(|| {
                current
                    .as_deref()
                    .and_then(|name| context_namespace(&kubeconfig, name))
            })
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        info!(
            context = current.as_deref().unwrap_or_default(),
            namespace = %namespace,
            "Using local kubeconfig"
        );

        Ok(Self::with_binding(
            ClusterMode::Local,
            Some(kubeconfig),
            ClusterBinding {
                client,
                namespace,
                context: current,
            },
        ))
    }

    fn with_binding(
        mode: ClusterMode,
        kubeconfig: Option<Kubeconfig>,
        binding: ClusterBinding,
    ) -> Self {
        Self {
            mode,
            kubeconfig,
            state: RwLock::new(binding),
            switch_lock: Mutex::new(()),
        }
    }

    pub fn mode(&self) -> ClusterMode {
        self.mode
    }

    pub fn is_local(&self) -> bool {
        self.mode == ClusterMode::Local
    }

    /// The active client
    pub fn client(&self) -> kube::Client {
        self.state.read().client.clone()
    }

    /// The active namespace
    pub fn namespace(&self) -> String {
        self.state.read().namespace.clone()
    }

    /// Client, namespace and context read under a single lock acquisition
    pub fn snapshot(&self) -> ClusterBinding {
        self.state.read().clone()
    }

    /// Set the active namespace. The client is left untouched.
    pub fn set_namespace(&self, namespace: impl Into<String>) {
        let namespace = namespace.into();
        debug!(namespace = %namespace, "Setting active namespace");
        self.state.write().namespace = namespace;
    }

    /// Sorted context names and the active context. Empty in in-cluster mode.
    pub fn contexts(&self) -> (Vec<String>, Option<String>) {
        match self.local_kubeconfig() {
            Some(kubeconfig) => (context_names(kubeconfig), self.state.read().context.clone()),
            None => (Vec::new(), None),
        }
    }

    /// Per-context details, sorted by name. Empty in in-cluster mode.
    pub fn context_infos(&self) -> Vec<ContextInfo> {
        match self.local_kubeconfig() {
            Some(kubeconfig) => {
                let current = self.state.read().context.clone();
                context_infos(kubeconfig, current.as_deref())
            }
            None => Vec::new(),
        }
    }

    /// Bind to another kubeconfig context.
    ///
    /// The new client is built before the exclusive lock is taken; client,
    /// namespace and context are then replaced together. On any error the
    /// active binding is unchanged.
    pub async fn switch_context(&self, name: &str) -> Result<(), SessionError> {
        let kubeconfig = self
            .local_kubeconfig()
            .ok_or(SessionError::UnsupportedOperation)?;

        if !has_context(kubeconfig, name) {
            return Err(SessionError::ContextNotFound(name.to_string()));
        }

        let _switching = self.switch_lock.lock().await;

        let client = client_for_context(kubeconfig, Some(name)).await?;
        let namespace =
            context_namespace(kubeconfig, name).unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        info!(context = name, namespace = %namespace, "Switching cluster context");

        *self.state.write() = ClusterBinding {
            client,
            namespace,
            context: Some(name.to_string()),
        };

        Ok(())
    }

    fn local_kubeconfig(&self) -> Option<&Kubeconfig> {
        match self.mode {
            ClusterMode::Local => self.kubeconfig.as_ref(),
            ClusterMode::InCluster => None,
        }
    }
}
