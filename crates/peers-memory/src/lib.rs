//! In-memory implementation of the peer bag, shared by every unit of a
//! simulated group.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use microcloud_peers::{LeaderHandle, PeerBag, UnitName};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct Group {
    app: HashMap<String, String>,
    leader: Option<UnitName>,
    units: BTreeMap<UnitName, HashMap<String, String>>,
}

/// A peer group living in memory. Hand out one [`MemoryPeerBag`] per unit.
#[derive(Clone, Debug, Default)]
pub struct MemoryPeerGroup {
    group: Arc<Mutex<Group>>,
}

impl MemoryPeerGroup {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `unit` to the group and returns its view of the bag.
    pub async fn join(&self, unit: impl Into<UnitName>) -> MemoryPeerBag {
        let unit = unit.into();
        self.group
            .lock()
            .await
            .units
            .entry(unit.clone())
            .or_default();

        MemoryPeerBag {
            group: self.clone(),
            unit,
        }
    }

    /// Makes `unit` the leader of the group.
    pub async fn set_leader(&self, unit: impl Into<UnitName>) {
        let unit = unit.into();
        debug!("{unit} is now the leader");
        self.group.lock().await.leader = Some(unit);
    }

    /// Reads a key from the application-scoped map.
    pub async fn app_value(&self, key: &str) -> Option<String> {
        self.group.lock().await.app.get(key).cloned()
    }
}

/// One unit's view of a [`MemoryPeerGroup`].
#[derive(Clone, Debug)]
pub struct MemoryPeerBag {
    group: MemoryPeerGroup,
    unit: UnitName,
}

/// Leader capability for a [`MemoryPeerGroup`].
#[derive(Clone, Debug)]
pub struct MemoryLeader {
    group: MemoryPeerGroup,
    unit: UnitName,
}

#[async_trait]
impl LeaderHandle for MemoryLeader {
    type Error = Error;

    async fn set_app(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        let mut group = self.group.group.lock().await;

        // Leadership may have moved since the handle was issued.
        if group.leader.as_ref() != Some(&self.unit) {
            return Err(Error::NotLeader(self.unit.clone()));
        }

        group.app.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl PeerBag for MemoryPeerBag {
    type Error = Error;
    type Leader = MemoryLeader;

    fn local_unit(&self) -> &UnitName {
        &self.unit
    }

    async fn members(&self) -> Result<Option<Vec<UnitName>>, Self::Error> {
        let group = self.group.group.lock().await;
        Ok(Some(group.units.keys().cloned().collect()))
    }

    async fn unit_data(&self, unit: &UnitName, key: &str) -> Result<Option<String>, Self::Error> {
        let group = self.group.group.lock().await;
        Ok(group.units.get(unit).and_then(|data| data.get(key)).cloned())
    }

    async fn set_local(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        let mut group = self.group.group.lock().await;
        let data = group
            .units
            .get_mut(&self.unit)
            .ok_or_else(|| Error::UnknownUnit(self.unit.clone()))?;
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn app_data(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.group.app_value(key).await)
    }

    async fn leader(&self) -> Result<Option<Self::Leader>, Self::Error> {
        let group = self.group.group.lock().await;
        Ok((group.leader.as_ref() == Some(&self.unit)).then(|| MemoryLeader {
            group: self.group.clone(),
            unit: self.unit.clone(),
        }))
    }
}
