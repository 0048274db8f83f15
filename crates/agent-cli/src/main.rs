//! Hook entry point: handles the hook Juju is running for this unit.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use microcloud_agent::{Agent, AgentError, AgentSettings};
use microcloud_command::SystemExecutor;
use microcloud_state_fs::FsStateStore;
use microcloud_unit::Event;
use microcloud_unit_hooks::{HookPeerBag, HookTools};
use tracing::{Level, debug, info};

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Agent error
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Neither a hook name nor a dispatch path was given
    #[error("no hook name given and JUJU_DISPATCH_PATH is unset")]
    MissingHook,
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Hook to handle
    #[arg(env = "JUJU_HOOK_NAME")]
    hook: Option<String>,

    /// Dispatch path set by Juju, such as `hooks/install`
    #[arg(long, env = "JUJU_DISPATCH_PATH", hide = true)]
    dispatch_path: Option<PathBuf>,

    /// Unit running the hook
    #[arg(long, env = "JUJU_UNIT_NAME")]
    unit: String,

    /// Where the unit's state is kept between hooks
    #[arg(
        long,
        default_value = ".microcloud-agent/state.json",
        env = "MICROCLOUD_AGENT_STATE_FILE"
    )]
    state_file: PathBuf,

    /// Timeout in seconds for install, init and join commands
    #[arg(
        long,
        default_value_t = 600,
        env = "MICROCLOUD_AGENT_COMMAND_TIMEOUT"
    )]
    command_timeout: u64,

    /// Directory whose presence triggers an LXD migration
    #[arg(long, default_value = "/var/lib/lxd", env = "MICROCLOUD_AGENT_LEGACY_LXD_DIR")]
    legacy_lxd_dir: PathBuf,

    /// Where a sideloaded MicroCloud binary is installed
    #[arg(
        long,
        default_value = "/var/snap/microcloud/common/microcloud.debug",
        env = "MICROCLOUD_AGENT_DEBUG_BINARY"
    )]
    debug_binary_path: PathBuf,

    /// Log level
    #[arg(long, default_value = "info", env = "MICROCLOUD_AGENT_LOG_LEVEL")]
    log_level: Level,
}

impl Args {
    fn hook_name(&self) -> Option<String> {
        self.hook.clone().or_else(|| {
            self.dispatch_path
                .as_ref()
                .and_then(|path| path.file_name())
                .map(|name| name.to_string_lossy().into_owned())
        })
    }

    fn settings(&self) -> AgentSettings {
        AgentSettings {
            command_timeout: Duration::from_secs(self.command_timeout),
            legacy_lxd_dir: self.legacy_lxd_dir.clone(),
            debug_binary_path: self.debug_binary_path.clone(),
            ..AgentSettings::default()
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    // Juju captures stderr into the unit log.
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(std::io::stderr)
        .init();

    let hook = args.hook_name().ok_or(Error::MissingHook)?;
    let executor = SystemExecutor::new();

    let mut agent = Agent::load(
        HookTools::new(executor),
        HookPeerBag::new(executor, args.unit.as_str()),
        FsStateStore::new(&args.state_file),
        executor,
        args.settings(),
    )
    .await?;

    let handled = match hook.parse::<Event>() {
        Ok(event) => agent.deliver(event).await?,
        Err(e) => {
            debug!("{e}, only replaying deferred events");
            agent.replay().await?
        }
    };

    for (event, outcome) in handled {
        info!("{event}: {outcome:?}");
    }

    Ok(())
}
