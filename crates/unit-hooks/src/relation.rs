use std::collections::HashMap;

use async_trait::async_trait;
use microcloud_command::{CommandExecutor, CommandLine};
use microcloud_peers::{LeaderHandle, PeerBag, UnitName};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{Error, TOOL_TIMEOUT};

/// Name of the peer relation.
pub const PEER_RELATION: &str = "cluster";

async fn run<E: CommandExecutor>(executor: &E, command: CommandLine) -> Result<String, Error> {
    Ok(executor.run(&command, TOOL_TIMEOUT).await?.stdout)
}

async fn run_json<E, T>(
    executor: &E,
    tool: &'static str,
    command: CommandLine,
) -> Result<T, Error>
where
    E: CommandExecutor,
    T: DeserializeOwned,
{
    let output = run(executor, command).await?;
    serde_json::from_str(&output).map_err(|e| Error::Parse(tool, e))
}

async fn relation_id<E: CommandExecutor>(executor: &E) -> Result<Option<String>, Error> {
    let ids: Vec<String> = run_json(
        executor,
        "relation-ids",
        CommandLine::new("relation-ids").args([PEER_RELATION, "--format=json"]),
    )
    .await?;
    Ok(ids.into_iter().next())
}

async fn is_leader<E: CommandExecutor>(executor: &E) -> Result<bool, Error> {
    run_json(
        executor,
        "is-leader",
        CommandLine::new("is-leader").arg("--format=json"),
    )
    .await
}

/// The peer relation as seen by the unit running the current hook.
#[derive(Clone, Debug)]
pub struct HookPeerBag<E> {
    executor: E,
    unit: UnitName,
}

impl<E> HookPeerBag<E>
where
    E: CommandExecutor + Clone,
{
    /// Creates a bag for `unit`, usually taken from `JUJU_UNIT_NAME`.
    pub fn new(executor: E, unit: impl Into<UnitName>) -> Self {
        Self {
            executor,
            unit: unit.into(),
        }
    }

    async fn databag(
        &self,
        relation: &str,
        app: bool,
        owner: &str,
    ) -> Result<HashMap<String, String>, Error> {
        let mut command = CommandLine::new("relation-get").args(["-r", relation]);
        if app {
            command = command.arg("--app");
        }
        run_json(
            &self.executor,
            "relation-get",
            command.args(["--format=json", "-", owner]),
        )
        .await
    }
}

#[async_trait]
impl<E> PeerBag for HookPeerBag<E>
where
    E: CommandExecutor + Clone,
{
    type Error = Error;
    type Leader = HookLeader<E>;

    fn local_unit(&self) -> &UnitName {
        &self.unit
    }

    async fn members(&self) -> Result<Option<Vec<UnitName>>, Self::Error> {
        let Some(relation) = relation_id(&self.executor).await? else {
            return Ok(None);
        };

        // relation-list leaves out the local unit.
        let remote: Vec<String> = run_json(
            &self.executor,
            "relation-list",
            CommandLine::new("relation-list").args(["-r", relation.as_str(), "--format=json"]),
        )
        .await?;

        let mut members: Vec<UnitName> = remote.into_iter().map(UnitName::from).collect();
        members.push(self.unit.clone());
        members.sort();
        members.dedup();

        Ok(Some(members))
    }

    async fn unit_data(&self, unit: &UnitName, key: &str) -> Result<Option<String>, Self::Error> {
        let Some(relation) = relation_id(&self.executor).await? else {
            return Ok(None);
        };

        let mut data = self.databag(&relation, false, unit.as_str()).await?;
        Ok(data.remove(key).filter(|value| !value.is_empty()))
    }

    async fn set_local(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        let Some(relation) = relation_id(&self.executor).await? else {
            warn!("no {PEER_RELATION} relation yet, dropping {key}");
            return Ok(());
        };

        run(
            &self.executor,
            CommandLine::new("relation-set")
                .args(["-r", relation.as_str()])
                .arg(format!("{key}={value}")),
        )
        .await?;
        Ok(())
    }

    async fn app_data(&self, key: &str) -> Result<Option<String>, Self::Error> {
        let Some(relation) = relation_id(&self.executor).await? else {
            return Ok(None);
        };

        let mut data = self
            .databag(&relation, true, self.unit.application())
            .await?;
        Ok(data.remove(key).filter(|value| !value.is_empty()))
    }

    async fn leader(&self) -> Result<Option<Self::Leader>, Self::Error> {
        if !is_leader(&self.executor).await? {
            return Ok(None);
        }

        Ok(Some(HookLeader {
            executor: self.executor.clone(),
            unit: self.unit.clone(),
        }))
    }
}

/// Leader capability backed by `relation-set --app`.
#[derive(Clone, Debug)]
pub struct HookLeader<E> {
    executor: E,
    unit: UnitName,
}

#[async_trait]
impl<E> LeaderHandle for HookLeader<E>
where
    E: CommandExecutor + Clone,
{
    type Error = Error;

    async fn set_app(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        if !is_leader(&self.executor).await? {
            return Err(Error::NotLeader(self.unit.clone()));
        }

        let Some(relation) = relation_id(&self.executor).await? else {
            warn!("no {PEER_RELATION} relation yet, dropping application {key}");
            return Ok(());
        };

        debug!("writing application {key}={value}");
        run(
            &self.executor,
            CommandLine::new("relation-set")
                .args(["-r", relation.as_str(), "--app"])
                .arg(format!("{key}={value}")),
        )
        .await?;
        Ok(())
    }
}
