//! Mock implementation of the host interface for testing purposes.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use microcloud_unit::{ConfigMap, ConfigValue, Host, UnitStatus};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Inner {
    config: ConfigMap,
    resources: HashMap<String, PathBuf>,
    statuses: Vec<UnitStatus>,
}

/// Mock host with settable config and a recorded status history.
#[derive(Clone, Debug, Default)]
pub struct MockHost {
    inner: Arc<Mutex<Inner>>,
}

impl MockHost {
    /// Creates a mock host with an empty config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock host with the given config.
    #[must_use]
    pub fn with_config(config: ConfigMap) -> Self {
        let host = Self::new();
        host.inner.lock().config = config;
        host
    }

    /// Sets one config option, as an operator would.
    pub fn set_config(&self, key: &str, value: impl Into<ConfigValue>) {
        self.inner
            .lock()
            .config
            .insert(key.to_string(), value.into());
    }

    /// Attaches a resource file.
    pub fn attach_resource(&self, name: &str, path: impl AsRef<Path>) {
        self.inner
            .lock()
            .resources
            .insert(name.to_string(), path.as_ref().to_path_buf());
    }

    /// The current status, if one was set.
    #[must_use]
    pub fn current_status(&self) -> Option<UnitStatus> {
        self.inner.lock().statuses.last().cloned()
    }

    /// Every status set so far, oldest first.
    #[must_use]
    pub fn status_history(&self) -> Vec<UnitStatus> {
        self.inner.lock().statuses.clone()
    }
}

#[async_trait]
impl Host for MockHost {
    type Error = Error;

    async fn config(&self) -> Result<ConfigMap, Self::Error> {
        Ok(self.inner.lock().config.clone())
    }

    async fn status(&self) -> Result<Option<UnitStatus>, Self::Error> {
        Ok(self.current_status())
    }

    async fn set_status(&self, status: UnitStatus) -> Result<(), Self::Error> {
        self.inner.lock().statuses.push(status);
        Ok(())
    }

    async fn resource(&self, name: &str) -> Result<Option<PathBuf>, Self::Error> {
        Ok(self.inner.lock().resources.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_config_snapshot() {
        let host = MockHost::new();
        host.set_config("mode", "cluster");

        let snapshot = host.config().await.unwrap();
        host.set_config("mode", "standalone");

        assert_eq!(snapshot["mode"], ConfigValue::from("cluster"));
        assert_eq!(
            host.config().await.unwrap()["mode"],
            ConfigValue::from("standalone")
        );
    }

    #[tokio::test]
    async fn test_status_history() {
        let host = MockHost::new();
        assert_eq!(host.status().await.unwrap(), None);

        host.set_status(UnitStatus::maintenance("Installing"))
            .await
            .unwrap();
        host.set_status(UnitStatus::active("")).await.unwrap();

        assert_eq!(host.status_history().len(), 2);
        assert_eq!(host.current_status(), Some(UnitStatus::active("")));
    }

    #[tokio::test]
    async fn test_resources() {
        let host = MockHost::new();
        host.attach_resource("microcloud-snap", "/tmp/microcloud.snap");

        assert_eq!(
            host.resource("microcloud-snap").await.unwrap(),
            Some(PathBuf::from("/tmp/microcloud.snap"))
        );
        assert_eq!(host.resource("microcloud-binary").await.unwrap(), None);
    }
}
