use microcloud_command::CommandExecutor;
use microcloud_peers::{
    FLAG_SET, LeaderHandle, MICROCLOUD_INITIALIZED, PeerBag, READY_TO_BOOTSTRAP,
};
use microcloud_state::{PersistentState, StateStore};
use microcloud_unit::{Host, UnitStatus};
use tracing::{debug, info};

use crate::commands;
use crate::error::{AgentError, Result};
use crate::phase::LifecyclePhase;
use crate::settings::AgentSettings;

/// Smallest group that may be initialized.
pub const MIN_MEMBERS: usize = 2;

/// Readiness of the peer group.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QuorumCheck {
    /// The peer relation does not exist yet.
    NoRelation,

    /// Every member is ready.
    Met {
        /// Number of members.
        members: usize,
    },

    /// Some members are not ready, or the group is too small.
    NotMet {
        /// Members reporting ready.
        ready: usize,

        /// All members.
        total: usize,
    },
}

impl QuorumCheck {
    /// Whether init may proceed.
    #[must_use]
    pub const fn is_met(self) -> bool {
        matches!(self, Self::Met { .. })
    }
}

/// Why a membership event changed nothing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WaitReason {
    /// Local install has not finished.
    NotInstalled,

    /// Another unit leads and will initialize.
    NotLeader,

    /// Quorum is not met yet.
    Quorum(QuorumCheck),
}

/// What a membership event led to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MembershipOutcome {
    /// Nothing to do yet.
    Waiting(WaitReason),

    /// This unit initialized the cluster and published it.
    Initialized,

    /// A previous init was published again.
    Republished,

    /// This unit joined the cluster.
    Joined,

    /// This unit is already a member.
    AlreadyMember,
}

/// Next step derived from local state and the group's view.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    /// Do nothing.
    Wait(WaitReason),

    /// Run cluster init, then publish it.
    Initialize,

    /// Publish an init that ran earlier.
    Republish,

    /// Join the initialized cluster.
    Join,

    /// Nothing left to do.
    Done,
}

/// Snapshot of the peer bag taken at the start of an event.
pub struct Observation<L> {
    /// The group record says the cluster is initialized.
    pub cluster_initialized: bool,

    /// Leader capability, if this unit leads.
    pub leader: Option<L>,

    /// Readiness of the group.
    pub quorum: QuorumCheck,
}

/// Decides the next step. Pure; every event re-runs it from scratch.
#[must_use]
pub fn plan<L>(state: &PersistentState, observation: &Observation<L>) -> Step {
    if !state.ready_to_bootstrap {
        return Step::Wait(WaitReason::NotInstalled);
    }

    if observation.cluster_initialized {
        return if state.joined { Step::Done } else { Step::Join };
    }

    let is_leader = observation.leader.is_some();

    if state.microcloud_initialized {
        return if is_leader {
            Step::Republish
        } else {
            Step::Wait(WaitReason::NotLeader)
        };
    }

    if !is_leader {
        return Step::Wait(WaitReason::NotLeader);
    }

    if observation.quorum.is_met() {
        Step::Initialize
    } else {
        Step::Wait(WaitReason::Quorum(observation.quorum))
    }
}

/// Drives the group from "everyone ready" to "cluster initialized".
pub struct PeerCoordinator<'a, P, E> {
    peers: &'a P,
    executor: &'a E,
    settings: &'a AgentSettings,
}

impl<'a, P, E> PeerCoordinator<'a, P, E>
where
    P: PeerBag,
    E: CommandExecutor,
{
    /// Creates a coordinator over `peers`.
    pub const fn new(peers: &'a P, executor: &'a E, settings: &'a AgentSettings) -> Self {
        Self {
            peers,
            executor,
            settings,
        }
    }

    /// Records local install completion and publishes readiness if the peer
    /// relation exists. Membership events publish it again later otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer bag fails.
    pub async fn publish_ready(&self, state: &mut PersistentState) -> Result<()> {
        state.ready_to_bootstrap = true;
        self.sync_ready(state).await
    }

    /// Checks whether every member reports ready.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer bag fails.
    pub async fn check_quorum(&self) -> Result<QuorumCheck> {
        let Some(members) = self.peers.members().await.map_err(AgentError::peers)? else {
            return Ok(QuorumCheck::NoRelation);
        };

        let mut ready = 0;
        for member in &members {
            if self
                .peers
                .unit_flag(member, READY_TO_BOOTSTRAP)
                .await
                .map_err(AgentError::peers)?
            {
                ready += 1;
            }
        }

        let total = members.len();
        if total >= MIN_MEMBERS && ready == total {
            Ok(QuorumCheck::Met { members: total })
        } else {
            Ok(QuorumCheck::NotMet { ready, total })
        }
    }

    /// Reads the peer bag.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer bag fails.
    pub async fn observe(&self) -> Result<Observation<P::Leader>> {
        Ok(Observation {
            cluster_initialized: self
                .peers
                .app_flag(MICROCLOUD_INITIALIZED)
                .await
                .map_err(AgentError::peers)?,
            leader: self.peers.leader().await.map_err(AgentError::peers)?,
            quorum: self.check_quorum().await?,
        })
    }

    /// Handles a membership change.
    ///
    /// Init runs at most once per group: local state is saved right after
    /// it succeeds and before the group record is written, so a replay only
    /// republishes.
    ///
    /// # Errors
    ///
    /// Returns failed init or join commands, and peer bag, host or store
    /// failures.
    pub async fn advance<H, S>(
        &self,
        host: &H,
        store: &S,
        state: &mut PersistentState,
    ) -> Result<MembershipOutcome>
    where
        H: Host,
        S: StateStore,
    {
        self.sync_ready(state).await?;

        let observation = self.observe().await?;
        let step = plan(state, &observation);
        debug!(
            "phase {}, quorum {:?}: {step:?}",
            LifecyclePhase::of(state),
            observation.quorum
        );

        match (step, observation.leader) {
            (Step::Wait(reason), _) => Ok(MembershipOutcome::Waiting(reason)),
            (Step::Done, _) => Ok(MembershipOutcome::AlreadyMember),
            (Step::Initialize, Some(leader)) => {
                info!(
                    "phase {} -> {}",
                    LifecyclePhase::AwaitingQuorum,
                    LifecyclePhase::Initializing
                );
                host.set_status(UnitStatus::maintenance("Initializing Microcloud"))
                    .await
                    .map_err(AgentError::host)?;

                self.executor
                    .run(&commands::microcloud_init(), self.settings.command_timeout)
                    .await?;

                state.microcloud_initialized = true;
                state.joined = true;
                store.save(state).await.map_err(AgentError::state)?;

                leader
                    .set_app(MICROCLOUD_INITIALIZED, FLAG_SET)
                    .await
                    .map_err(AgentError::peers)?;
                info!(
                    "phase {} -> {}",
                    LifecyclePhase::Initializing,
                    LifecyclePhase::Initialized
                );

                Ok(MembershipOutcome::Initialized)
            }
            (Step::Republish, Some(leader)) => {
                info!("publishing earlier cluster init");
                leader
                    .set_app(MICROCLOUD_INITIALIZED, FLAG_SET)
                    .await
                    .map_err(AgentError::peers)?;

                Ok(MembershipOutcome::Republished)
            }
            (Step::Initialize | Step::Republish, None) => {
                Ok(MembershipOutcome::Waiting(WaitReason::NotLeader))
            }
            (Step::Join, _) => {
                info!("cluster is initialized, joining");
                host.set_status(UnitStatus::maintenance("Adding node to Microcloud"))
                    .await
                    .map_err(AgentError::host)?;

                self.executor
                    .run(&commands::microcloud_add(), self.settings.command_timeout)
                    .await?;

                state.microcloud_initialized = true;
                state.joined = true;
                store.save(state).await.map_err(AgentError::state)?;

                Ok(MembershipOutcome::Joined)
            }
        }
    }

    async fn sync_ready(&self, state: &PersistentState) -> Result<()> {
        if !state.ready_to_bootstrap {
            return Ok(());
        }

        if self.peers.members().await.map_err(AgentError::peers)?.is_none() {
            debug!("peer relation not created yet, readiness published later");
            return Ok(());
        }

        if self
            .peers
            .update_local(READY_TO_BOOTSTRAP, FLAG_SET)
            .await
            .map_err(AgentError::peers)?
        {
            info!("published readiness for {}", self.peers.local_unit());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use microcloud_command_mock::{MockExecutor, Response};
    use microcloud_peers_memory::MemoryPeerGroup;
    use microcloud_state_memory::MemoryStateStore;
    use microcloud_unit_mock::MockHost;

    fn observation(
        cluster_initialized: bool,
        leader: bool,
        quorum: QuorumCheck,
    ) -> Observation<()> {
        Observation {
            cluster_initialized,
            leader: leader.then_some(()),
            quorum,
        }
    }

    fn ready_state() -> PersistentState {
        PersistentState {
            ready_to_bootstrap: true,
            ..PersistentState::default()
        }
    }

    const MET: QuorumCheck = QuorumCheck::Met { members: 3 };

    #[test]
    fn test_plan_waits_for_install() {
        let state = PersistentState::default();

        assert_eq!(
            plan(&state, &observation(true, true, MET)),
            Step::Wait(WaitReason::NotInstalled)
        );
    }

    #[test]
    fn test_plan_only_leader_initializes() {
        let state = ready_state();

        assert_eq!(plan(&state, &observation(false, true, MET)), Step::Initialize);
        assert_eq!(
            plan(&state, &observation(false, false, MET)),
            Step::Wait(WaitReason::NotLeader)
        );
    }

    #[test]
    fn test_plan_waits_for_quorum() {
        let state = ready_state();
        let quorum = QuorumCheck::NotMet { ready: 1, total: 2 };

        assert_eq!(
            plan(&state, &observation(false, true, quorum)),
            Step::Wait(WaitReason::Quorum(quorum))
        );
    }

    #[test]
    fn test_plan_never_initializes_twice() {
        let mut state = ready_state();
        state.microcloud_initialized = true;
        state.joined = true;

        assert_eq!(plan(&state, &observation(false, true, MET)), Step::Republish);
        assert_eq!(plan(&state, &observation(true, true, MET)), Step::Done);
    }

    #[test]
    fn test_plan_joins_once() {
        let mut state = ready_state();

        assert_eq!(plan(&state, &observation(true, false, MET)), Step::Join);

        state.joined = true;
        assert_eq!(plan(&state, &observation(true, false, MET)), Step::Done);
    }

    #[tokio::test]
    async fn test_quorum_needs_two_ready_members() {
        let group = MemoryPeerGroup::new();
        let first = group.join("microcloud/0").await;
        let executor = MockExecutor::new();
        let settings = AgentSettings::default();
        let coordinator = PeerCoordinator::new(&first, &executor, &settings);

        first.set_local(READY_TO_BOOTSTRAP, FLAG_SET).await.unwrap();
        assert_eq!(
            coordinator.check_quorum().await.unwrap(),
            QuorumCheck::NotMet { ready: 1, total: 1 }
        );

        let second = group.join("microcloud/1").await;
        assert_eq!(
            coordinator.check_quorum().await.unwrap(),
            QuorumCheck::NotMet { ready: 1, total: 2 }
        );

        second.set_local(READY_TO_BOOTSTRAP, FLAG_SET).await.unwrap();
        assert_eq!(
            coordinator.check_quorum().await.unwrap(),
            QuorumCheck::Met { members: 2 }
        );
    }

    #[tokio::test]
    async fn test_leader_initializes_and_persists_before_publishing() {
        let group = MemoryPeerGroup::new();
        let leader = group.join("microcloud/0").await;
        let follower = group.join("microcloud/1").await;
        group.set_leader("microcloud/0").await;
        follower.set_local(READY_TO_BOOTSTRAP, FLAG_SET).await.unwrap();

        let executor = MockExecutor::new();
        let settings = AgentSettings::default();
        let host = MockHost::new();
        let store = MemoryStateStore::new();
        let mut state = ready_state();

        let outcome = PeerCoordinator::new(&leader, &executor, &settings)
            .advance(&host, &store, &mut state)
            .await
            .unwrap();

        assert_eq!(outcome, MembershipOutcome::Initialized);
        assert_eq!(executor.count(&["microcloud", "init", "--auto"]), 1);
        assert!(store.snapshot().await.unwrap().microcloud_initialized);
        assert_eq!(
            group.app_value(MICROCLOUD_INITIALIZED).await.as_deref(),
            Some(FLAG_SET)
        );
        assert_eq!(LifecyclePhase::of(&state), LifecyclePhase::Initialized);
    }

    #[tokio::test]
    async fn test_failed_init_leaves_phase() {
        let group = MemoryPeerGroup::new();
        let leader = group.join("microcloud/0").await;
        let follower = group.join("microcloud/1").await;
        group.set_leader("microcloud/0").await;
        follower.set_local(READY_TO_BOOTSTRAP, FLAG_SET).await.unwrap();

        let executor = MockExecutor::new();
        executor.respond(&["microcloud", "init"], Response::fail("no network", 1));
        let settings = AgentSettings::default();
        let store = MemoryStateStore::new();
        let mut state = ready_state();

        let result = PeerCoordinator::new(&leader, &executor, &settings)
            .advance(&MockHost::new(), &store, &mut state)
            .await;

        assert_matches!(result, Err(AgentError::ExternalCommandFailed { .. }));
        assert_eq!(LifecyclePhase::of(&state), LifecyclePhase::AwaitingQuorum);
        assert_eq!(group.app_value(MICROCLOUD_INITIALIZED).await, None);
    }

    #[tokio::test]
    async fn test_follower_joins_after_init() {
        let group = MemoryPeerGroup::new();
        let leader = group.join("microcloud/0").await;
        let follower = group.join("microcloud/1").await;
        group.set_leader("microcloud/0").await;

        let executor = MockExecutor::new();
        let settings = AgentSettings::default();
        let store = MemoryStateStore::new();
        let host = MockHost::new();
        let mut state = ready_state();
        let coordinator = PeerCoordinator::new(&follower, &executor, &settings);

        assert_eq!(
            coordinator.advance(&host, &store, &mut state).await.unwrap(),
            MembershipOutcome::Waiting(WaitReason::NotLeader)
        );
        assert_eq!(
            follower
                .unit_data(follower.local_unit(), READY_TO_BOOTSTRAP)
                .await
                .unwrap()
                .as_deref(),
            Some(FLAG_SET)
        );

        leader
            .leader()
            .await
            .unwrap()
            .unwrap()
            .set_app(MICROCLOUD_INITIALIZED, FLAG_SET)
            .await
            .unwrap();

        assert_eq!(
            coordinator.advance(&host, &store, &mut state).await.unwrap(),
            MembershipOutcome::Joined
        );
        assert_eq!(
            coordinator.advance(&host, &store, &mut state).await.unwrap(),
            MembershipOutcome::AlreadyMember
        );
        assert_eq!(executor.count(&["microcloud", "add"]), 1);
        assert_eq!(executor.count(&["microcloud", "init"]), 0);
    }
}
