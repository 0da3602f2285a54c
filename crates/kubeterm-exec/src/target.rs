use crate::error::ExecError;

/// The container an exec session attaches to.
///
/// All three parts are required. Picking a default container is left to the
/// caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecTarget {
    pod: String,
    namespace: String,
    container: String,
}

impl ExecTarget {
    pub fn new(
        pod: impl Into<String>,
        namespace: impl Into<String>,
        container: impl Into<String>,
    ) -> Result<Self, ExecError> {
        let target = Self {
            pod: pod.into(),
            namespace: namespace.into(),
            container: container.into(),
        };

        if target.pod.is_empty() {
            return Err(ExecError::MissingField("pod name"));
        }
        if target.namespace.is_empty() {
            return Err(ExecError::MissingField("namespace"));
        }
        if target.container.is_empty() {
            return Err(ExecError::MissingField("container"));
        }
        Ok(target)
    }

    pub fn pod(&self) -> &str {
        &self.pod
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn container(&self) -> &str {
        &self.container
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_target() {
        let target = ExecTarget::new("web-1", "shop", "app").unwrap();
        assert_eq!(target.pod(), "web-1");
        assert_eq!(target.namespace(), "shop");
        assert_eq!(target.container(), "app");
    }

    #[test]
    fn test_missing_parts_rejected() {
        let err = ExecTarget::new("web-1", "shop", "").unwrap_err();
        assert_eq!(err.to_string(), "container is required");

        assert!(matches!(
            ExecTarget::new("", "shop", "app"),
            Err(ExecError::MissingField("pod name"))
        ));
        assert!(matches!(
            ExecTarget::new("web-1", "", "app"),
            Err(ExecError::MissingField("namespace"))
        ));
    }
}
