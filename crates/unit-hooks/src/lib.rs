//! Host and peer bag backed by Juju hook tools.
//!
//! Every operation shells out to a hook tool (`config-get`, `status-set`,
//! `relation-get` and so on) through a [`CommandExecutor`], asking for JSON
//! output where the tool supports it.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod relation;

pub use error::Error;
pub use relation::{HookLeader, HookPeerBag, PEER_RELATION};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use microcloud_command::{CommandExecutor, CommandLine};
use microcloud_unit::{ConfigMap, ConfigValue, Host, StatusKind, UnitStatus};
use serde::Deserialize;
use tracing::{debug, warn};

/// Timeout for a single hook tool call.
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct StatusGet {
    status: String,

    #[serde(default)]
    message: String,
}

/// Hook tools for the unit running the current hook.
#[derive(Clone, Debug)]
pub struct HookTools<E> {
    executor: E,
}

impl<E> HookTools<E>
where
    E: CommandExecutor,
{
    /// Creates hook tools running through `executor`.
    pub const fn new(executor: E) -> Self {
        Self { executor }
    }

    async fn run(&self, command: CommandLine) -> Result<String, Error> {
        Ok(self.executor.run(&command, TOOL_TIMEOUT).await?.stdout)
    }
}

/// Converts `config-get` output, skipping unset and unsupported options.
fn parse_config(output: &str) -> Result<ConfigMap, Error> {
    let raw: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(output).map_err(|e| Error::Parse("config-get", e))?;

    let mut config = ConfigMap::new();
    for (key, value) in raw {
        let value = match value {
            serde_json::Value::Bool(value) => ConfigValue::Bool(value),
            serde_json::Value::String(value) => ConfigValue::String(value),
            serde_json::Value::Null => continue,
            other => match other.as_i64() {
                Some(value) => ConfigValue::Int(value),
                None => {
                    warn!("ignoring option {key} with unsupported value {other}");
                    continue;
                }
            },
        };
        config.insert(key, value);
    }

    Ok(config)
}

fn parse_status(output: &str) -> Result<Option<UnitStatus>, Error> {
    let status: StatusGet =
        serde_json::from_str(output).map_err(|e| Error::Parse("status-get", e))?;

    // "unknown", "error" and friends are not statuses the agent sets.
    Ok(status
        .status
        .parse::<StatusKind>()
        .ok()
        .map(|kind| UnitStatus::new(kind, status.message)))
}

#[async_trait]
impl<E> Host for HookTools<E>
where
    E: CommandExecutor,
{
    type Error = Error;

    async fn config(&self) -> Result<ConfigMap, Self::Error> {
        let output = self
            .run(CommandLine::new("config-get").arg("--format=json"))
            .await?;
        parse_config(&output)
    }

    async fn status(&self) -> Result<Option<UnitStatus>, Self::Error> {
        let output = self
            .run(CommandLine::new("status-get").arg("--format=json"))
            .await?;
        parse_status(&output)
    }

    async fn set_status(&self, status: UnitStatus) -> Result<(), Self::Error> {
        debug!("status: {status}");
        self.run(
            CommandLine::new("status-set")
                .arg(status.kind().as_str())
                .arg(status.message()),
        )
        .await?;
        Ok(())
    }

    async fn resource(&self, name: &str) -> Result<Option<PathBuf>, Self::Error> {
        // resource-get fails when nothing is attached.
        match self.run(CommandLine::new("resource-get").arg(name)).await {
            Ok(output) => {
                let path = output.trim();
                Ok((!path.is_empty()).then(|| PathBuf::from(path)))
            }
            Err(e) => {
                debug!("no {name} resource: {e}");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use microcloud_command_mock::{MockExecutor, Response};

    #[tokio::test]
    async fn test_config_get() {
        let executor = MockExecutor::new();
        executor.respond(
            &["config-get"],
            Response::stdout(
                r#"{"mode":"cluster","microceph":true,"snap-channel-lxd":"","osd-count":3,"ratio":0.5,"unset":null}"#,
            ),
        );

        let config = HookTools::new(executor).config().await.unwrap();

        assert_eq!(config.len(), 4);
        assert_eq!(config["mode"], ConfigValue::from("cluster"));
        assert_eq!(config["microceph"], ConfigValue::from(true));
        assert_eq!(config["osd-count"], ConfigValue::Int(3));
        assert!(!config.contains_key("ratio"));
    }

    #[tokio::test]
    async fn test_config_get_garbage() {
        let executor = MockExecutor::new();
        executor.respond(&["config-get"], Response::stdout("not json"));

        let result = HookTools::new(executor).config().await;

        assert_matches!(result, Err(Error::Parse("config-get", _)));
    }

    #[tokio::test]
    async fn test_status_round_trip() {
        let executor = MockExecutor::new();
        executor.respond(
            &["status-get"],
            Response::stdout(
                r#"{"message":"Can't modify mode after initialization","status":"blocked","status-data":{}}"#,
            ),
        );
        let tools = HookTools::new(executor.clone());

        tools
            .set_status(UnitStatus::waiting("waiting for leader"))
            .await
            .unwrap();

        assert_eq!(
            executor.calls()[0].argv(),
            ["status-set", "waiting", "waiting for leader"]
        );
        assert_eq!(
            tools.status().await.unwrap(),
            Some(UnitStatus::blocked("Can't modify mode after initialization"))
        );
    }

    #[tokio::test]
    async fn test_unknown_status() {
        let executor = MockExecutor::new();
        executor.respond(
            &["status-get"],
            Response::stdout(r#"{"message":"","status":"unknown","status-data":{}}"#),
        );

        assert_eq!(HookTools::new(executor).status().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_resource() {
        let executor = MockExecutor::new();
        executor.respond(
            &["resource-get", "microcloud-binary"],
            Response::fail("ERROR could not download resource", 1),
        );
        executor.respond(
            &["resource-get", "microcloud-snap"],
            Response::stdout(
                "/var/lib/juju/agents/unit-microcloud-0/resources/microcloud-snap/microcloud.snap\n",
            ),
        );
        let tools = HookTools::new(executor);

        assert_eq!(tools.resource("microcloud-binary").await.unwrap(), None);
        assert_eq!(
            tools.resource("microcloud-snap").await.unwrap(),
            Some(PathBuf::from(
                "/var/lib/juju/agents/unit-microcloud-0/resources/microcloud-snap/microcloud.snap"
            ))
        );
    }
}
