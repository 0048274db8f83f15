use microcloud_command::CommandExecutor;
use microcloud_peers::PeerBag;
use microcloud_state::{BlockReason, PersistentState, StateStore};
use microcloud_unit::{ConfigMap, Event, Host, Outcome, UnitStatus};
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::config::{ConfigDelta, compute_delta};
use crate::coordinator::{MembershipOutcome, PeerCoordinator, WaitReason};
use crate::error::{AgentError, Result};
use crate::phase::LifecyclePhase;
use crate::reconciler::{ConfigReconciler, validate};
use crate::settings::AgentSettings;
use crate::sideload::Sideloader;

enum ConfigCheck {
    Unchanged,
    Rejected,
    Changed(ConfigDelta, ConfigMap),
}

/// One unit's agent: owns its state and routes events to handlers.
pub struct Agent<H, P, S, E> {
    host: H,
    peers: P,
    store: S,
    executor: E,
    settings: AgentSettings,
    state: PersistentState,
}

impl<H, P, S, E> Agent<H, P, S, E>
where
    H: Host,
    P: PeerBag,
    S: StateStore,
    E: CommandExecutor,
{
    /// Creates an agent, loading its state from `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be loaded.
    pub async fn load(
        host: H,
        peers: P,
        store: S,
        executor: E,
        settings: AgentSettings,
    ) -> Result<Self> {
        let state = store.load().await.map_err(AgentError::state)?;
        debug!("loaded state in phase {}", LifecyclePhase::of(&state));

        Ok(Self {
            host,
            peers,
            store,
            executor,
            settings,
            state,
        })
    }

    /// The unit's current state.
    pub const fn state(&self) -> &PersistentState {
        &self.state
    }

    /// The unit's current phase.
    pub const fn phase(&self) -> LifecyclePhase {
        LifecyclePhase::of(&self.state)
    }

    /// Delivers `event` after replaying every deferred event.
    ///
    /// Events that defer again are queued for the next delivery. Returns
    /// each handled event with its outcome, in order.
    ///
    /// # Errors
    ///
    /// Returns the first infrastructure error. The failed event and every
    /// event after it stay queued.
    pub async fn deliver(&mut self, event: Event) -> Result<Vec<(Event, Outcome)>> {
        let mut pending = self.state.take_deferred();
        if !pending.contains(&event) {
            pending.push(event);
        }
        if pending.len() > 1 {
            info!("replaying {} deferred event(s) before {event}", pending.len() - 1);
        }

        self.run_queue(pending).await
    }

    /// Replays deferred events only, for hooks without a handler of their own.
    ///
    /// # Errors
    ///
    /// Same as [`Self::deliver`].
    pub async fn replay(&mut self) -> Result<Vec<(Event, Outcome)>> {
        let pending = self.state.take_deferred();
        if !pending.is_empty() {
            info!("replaying {} deferred event(s)", pending.len());
        }

        self.run_queue(pending).await
    }

    async fn run_queue(&mut self, pending: Vec<Event>) -> Result<Vec<(Event, Outcome)>> {
        let mut handled = Vec::with_capacity(pending.len());

        for (index, next) in pending.iter().copied().enumerate() {
            match self.dispatch(next).await {
                Ok(outcome) => {
                    if outcome == Outcome::Deferred {
                        self.state.defer(next);
                    }
                    handled.push((next, outcome));
                }
                Err(e) => {
                    error!("{next} failed: {e}");
                    for rest in &pending[index..] {
                        self.state.defer(*rest);
                    }
                    self.persist().await?;
                    return Err(e);
                }
            }
        }

        self.persist().await?;

        Ok(handled)
    }

    /// Routes one event to its handler.
    ///
    /// # Errors
    ///
    /// Returns infrastructure errors. Recoverable failures are reported as
    /// [`Outcome::Deferred`] instead.
    pub async fn dispatch(&mut self, event: Event) -> Result<Outcome> {
        info!("handling {event} in phase {}", self.phase());

        let outcome = match event {
            Event::Install => self.on_install().await?,
            Event::Start => self.on_start().await?,
            Event::ConfigChanged => self.on_config_changed().await?,
            // Leadership can move onto a unit whose peers are all ready
            // without any relation data changing.
            Event::ClusterRelationCreated
            | Event::ClusterRelationJoined
            | Event::ClusterRelationChanged
            | Event::LeaderElected
            | Event::UpdateStatus => self.on_membership().await?,
            Event::ClusterRelationDeparted => Self::on_departed(),
        };

        self.persist().await?;
        debug!("{event}: {outcome:?}");

        Ok(outcome)
    }

    async fn on_install(&mut self) -> Result<Outcome> {
        match self.check_config().await? {
            ConfigCheck::Rejected => return Ok(Outcome::Completed),
            ConfigCheck::Unchanged => {}
            ConfigCheck::Changed(delta, desired) => {
                if let Some(outcome) = self.apply(&delta, &desired).await? {
                    return Ok(outcome);
                }
            }
        }

        self.detect_container().await;

        let sideloaded = Sideloader::new(&self.host, &self.executor, &self.settings)
            .sideload(&mut self.state)
            .await;
        if let Err(e) = sideloaded {
            return self.recover(e).await;
        }

        PeerCoordinator::new(&self.peers, &self.executor, &self.settings)
            .publish_ready(&mut self.state)
            .await?;

        self.set_status(UnitStatus::waiting(
            "Microcloud installed successfully, waiting for leader node to initialize the cluster",
        ))
        .await?;

        // Our own readiness write only fires relation-changed on the other
        // units, so the last unit to become ready checks quorum itself.
        if self.on_membership().await? == Outcome::Deferred {
            self.state.defer(Event::ClusterRelationChanged);
        }

        Ok(Outcome::Completed)
    }

    async fn on_start(&mut self) -> Result<Outcome> {
        if !self.state.microcloud_initialized {
            debug!("cluster not initialized yet, nothing to do on start");
            return Ok(Outcome::Completed);
        }

        if !self.state.reboot_required
            && self.current_status().await?.is_some_and(|s| s.is_blocked())
        {
            self.set_status(UnitStatus::active(
                "Pending configuration changes were applied during the last reboot",
            ))
            .await?;
        }

        let desired = self.host.config().await.map_err(AgentError::host)?;
        if compute_delta(&desired, &self.state.config).is_empty() {
            return Ok(Outcome::Completed);
        }

        self.on_config_changed().await
    }

    async fn on_config_changed(&mut self) -> Result<Outcome> {
        let ConfigCheck::Changed(delta, desired) = self.check_config().await? else {
            return Ok(Outcome::Completed);
        };

        if let Some(outcome) = self.apply(&delta, &desired).await? {
            return Ok(outcome);
        }

        self.set_status(UnitStatus::active(
            "Configuration change(s) applied successfully",
        ))
        .await?;

        Ok(Outcome::Completed)
    }

    async fn on_membership(&mut self) -> Result<Outcome> {
        let advanced = PeerCoordinator::new(&self.peers, &self.executor, &self.settings)
            .advance(&self.host, &self.store, &mut self.state)
            .await;

        match advanced {
            Ok(outcome) => {
                if let Some(status) = membership_status(outcome) {
                    self.set_status(status).await?;
                }
                Ok(Outcome::Completed)
            }
            Err(e) => self.recover(e).await,
        }
    }

    fn on_departed() -> Outcome {
        info!("peer departed, membership removal is not supported");
        Outcome::Completed
    }

    /// Reads desired config, validates the delta and heals a stale block.
    async fn check_config(&mut self) -> Result<ConfigCheck> {
        let desired = self.host.config().await.map_err(AgentError::host)?;
        let delta = compute_delta(&desired, &self.state.config);

        if delta.is_empty() {
            self.heal_immutable_block().await?;
            return Ok(ConfigCheck::Unchanged);
        }

        if let Err(e) = validate(&delta, self.phase()).into_result() {
            warn!("rejecting config change to {delta}: {e}");
            self.block(&e).await?;
            return Ok(ConfigCheck::Rejected);
        }

        Ok(ConfigCheck::Changed(delta, desired))
    }

    async fn heal_immutable_block(&mut self) -> Result<()> {
        let Some(BlockReason::ImmutableKey(key)) = self.state.blocked_on.clone() else {
            return Ok(());
        };

        if self.current_status().await?.is_some_and(|s| s.is_blocked()) {
            info!("{key} was reset, unblocking");
            self.set_status(UnitStatus::active(format!(
                "Unblocking as the {key} key was reset to its initial value"
            )))
            .await?;
        } else {
            debug!("status moved on since {key} was rejected");
            self.state.blocked_on = None;
        }

        Ok(())
    }

    /// Applies `delta`. Returns an outcome if the event must stop here.
    async fn apply(
        &mut self,
        delta: &ConfigDelta,
        desired: &ConfigMap,
    ) -> Result<Option<Outcome>> {
        let applied = ConfigReconciler::new(&self.executor, &self.settings)
            .apply(&self.host, delta, desired, &mut self.state.config)
            .await;

        match applied {
            Ok(keys) => {
                info!("applied {}", keys.into_iter().collect::<Vec<_>>().join(", "));
                Ok(None)
            }
            Err(e) => {
                // Subsystems installed before the failure stay recorded.
                self.persist().await?;
                self.recover(e).await.map(Some)
            }
        }
    }

    /// Turns a recoverable failure into a blocked status and a deferral.
    async fn recover(&mut self, error: AgentError) -> Result<Outcome> {
        if !error.is_deferrable() {
            return Err(error);
        }

        warn!("deferring: {error}");
        self.block(&error).await?;
        Ok(Outcome::Deferred)
    }

    async fn detect_container(&mut self) {
        let result = self
            .executor
            .run(&commands::detect_container(), self.settings.command_timeout)
            .await;

        self.state.inside_container = match result {
            Ok(_) => true,
            Err(e) if e.is_timeout() => {
                warn!("{e}, assuming no container");
                false
            }
            Err(_) => false,
        };
        debug!("inside container: {}", self.state.inside_container);
    }

    async fn block(&mut self, error: &AgentError) -> Result<()> {
        self.host
            .set_status(UnitStatus::blocked(error.to_string()))
            .await
            .map_err(AgentError::host)?;
        self.state.blocked_on = error.block_reason();
        Ok(())
    }

    async fn set_status(&mut self, status: UnitStatus) -> Result<()> {
        if !status.is_blocked() {
            self.state.blocked_on = None;
        }
        self.host.set_status(status).await.map_err(AgentError::host)
    }

    async fn current_status(&self) -> Result<Option<UnitStatus>> {
        self.host.status().await.map_err(AgentError::host)
    }

    async fn persist(&self) -> Result<()> {
        self.store.save(&self.state).await.map_err(AgentError::state)
    }
}

impl<H, P, S, E> Agent<H, P, S, E> {
    /// The host this agent reports to.
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// The agent's view of the peer bag.
    pub const fn peers(&self) -> &P {
        &self.peers
    }

    /// The executor running external commands.
    pub const fn executor(&self) -> &E {
        &self.executor
    }
}

fn membership_status(outcome: MembershipOutcome) -> Option<UnitStatus> {
    match outcome {
        MembershipOutcome::Initialized | MembershipOutcome::Republished => {
            Some(UnitStatus::active("Microcloud initialized successfully"))
        }
        MembershipOutcome::Joined => {
            Some(UnitStatus::active("Node successfully added to Microcloud"))
        }
        MembershipOutcome::Waiting(WaitReason::Quorum(quorum)) => {
            debug!("quorum not met: {quorum:?}");
            None
        }
        MembershipOutcome::Waiting(_) | MembershipOutcome::AlreadyMember => None,
    }
}
