#![allow(dead_code)]

use microcloud_agent::{
    Agent, AgentSettings, MICROCEPH, MICROOVN, MODE, SNAP_CHANNEL_LXD, SNAP_CHANNEL_MICROCEPH,
    SNAP_CHANNEL_MICROCLOUD, SNAP_CHANNEL_MICROOVN,
};
use microcloud_command_mock::MockExecutor;
use microcloud_peers::MICROCLOUD_INITIALIZED;
use microcloud_peers_memory::{MemoryPeerBag, MemoryPeerGroup};
use microcloud_state::PersistentState;
use microcloud_state_memory::MemoryStateStore;
use microcloud_unit::{ConfigMap, Event, Outcome, UnitStatus};
use microcloud_unit_mock::MockHost;
use tempfile::TempDir;

pub type TestAgent = Agent<MockHost, MemoryPeerBag, MemoryStateStore, MockExecutor>;

pub fn default_config() -> ConfigMap {
    let mut config = ConfigMap::new();
    config.insert(MODE.to_string(), "cluster".into());
    config.insert(MICROCEPH.to_string(), false.into());
    config.insert(MICROOVN.to_string(), false.into());
    config.insert(SNAP_CHANNEL_LXD.to_string(), "5.21/stable".into());
    config.insert(SNAP_CHANNEL_MICROCLOUD.to_string(), "".into());
    config.insert(SNAP_CHANNEL_MICROCEPH.to_string(), "".into());
    config.insert(SNAP_CHANNEL_MICROOVN.to_string(), "".into());
    config
}

/// State of a unit whose install finished and whose cluster exists.
pub fn initialized_state(config: ConfigMap) -> PersistentState {
    PersistentState {
        config,
        ready_to_bootstrap: true,
        microcloud_initialized: true,
        joined: true,
        ..PersistentState::default()
    }
}

pub struct TestUnit {
    pub name: String,
    pub agent: TestAgent,
    pub host: MockHost,
    pub executor: MockExecutor,
    pub store: MemoryStateStore,
    pub bag: MemoryPeerBag,
    pub settings: AgentSettings,
    _dir: TempDir,
}

impl TestUnit {
    pub async fn new(group: &MemoryPeerGroup, name: &str) -> Self {
        Self::with_state(group, name, PersistentState::default()).await
    }

    pub async fn with_state(group: &MemoryPeerGroup, name: &str, state: PersistentState) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let settings = AgentSettings {
            legacy_lxd_dir: dir.path().join("lxd"),
            debug_binary_path: dir.path().join("microcloud.debug"),
            architecture: "x86_64".to_string(),
            ..AgentSettings::default()
        };
        let host = MockHost::with_config(default_config());
        let executor = MockExecutor::new();
        let store = MemoryStateStore::with_state(state);
        let bag = group.join(name).await;

        let agent = Agent::load(
            host.clone(),
            bag.clone(),
            store.clone(),
            executor.clone(),
            settings.clone(),
        )
        .await
        .unwrap();

        Self {
            name: name.to_string(),
            agent,
            host,
            executor,
            store,
            bag,
            settings,
            _dir: dir,
        }
    }

    pub async fn deliver(&mut self, event: Event) -> Vec<(Event, Outcome)> {
        self.agent.deliver(event).await.unwrap()
    }

    /// Outcome of `event` itself, ignoring replayed events.
    pub async fn deliver_one(&mut self, event: Event) -> Outcome {
        self.deliver(event)
            .await
            .into_iter()
            .rev()
            .find(|(handled, _)| *handled == event)
            .map(|(_, outcome)| outcome)
            .unwrap()
    }

    /// Simulates a process restart: the agent reloads from its store.
    pub async fn restart(&mut self) {
        self.agent = Agent::load(
            self.host.clone(),
            self.bag.clone(),
            self.store.clone(),
            self.executor.clone(),
            self.settings.clone(),
        )
        .await
        .unwrap();
    }

    pub fn status(&self) -> Option<UnitStatus> {
        self.host.current_status()
    }

    pub fn calls(&self, prefix: &[&str]) -> usize {
        self.executor.count(prefix)
    }
}

pub struct TestCluster {
    pub group: MemoryPeerGroup,
    pub units: Vec<TestUnit>,
}

impl TestCluster {
    /// A group of `size` units named `microcloud/N`, led by `microcloud/0`.
    pub async fn new(size: usize) -> Self {
        let group = MemoryPeerGroup::new();
        let mut units = Vec::with_capacity(size);
        for index in 0..size {
            units.push(TestUnit::new(&group, &format!("microcloud/{index}")).await);
        }
        group.set_leader("microcloud/0").await;

        Self { group, units }
    }

    pub async fn install(&mut self, index: usize) {
        assert_eq!(
            self.units[index].deliver_one(Event::Install).await,
            Outcome::Completed
        );
    }

    /// Delivers `event` to every unit in order.
    pub async fn broadcast(&mut self, event: Event) {
        for unit in &mut self.units {
            unit.deliver(event).await;
        }
    }

    /// Delivers `event` to the units at `indices` only.
    pub async fn deliver_to(&mut self, indices: &[usize], event: Event) {
        for &index in indices {
            self.units[index].deliver(event).await;
        }
    }

    /// `microcloud init` calls across the whole group.
    pub fn init_calls(&self) -> usize {
        self.units
            .iter()
            .map(|unit| unit.calls(&["microcloud", "init"]))
            .sum()
    }

    pub async fn cluster_initialized(&self) -> bool {
        self.group.app_value(MICROCLOUD_INITIALIZED).await.as_deref() == Some("True")
    }
}
