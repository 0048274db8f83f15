use std::path::PathBuf;
use std::time::Duration;

use microcloud_command::DEFAULT_TIMEOUT;

/// Node-level knobs that are not charm config.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AgentSettings {
    /// Timeout for every external command.
    pub command_timeout: Duration,

    /// Directory whose presence means a legacy LXD install needs migrating.
    pub legacy_lxd_dir: PathBuf,

    /// Where a sideloaded `MicroCloud` binary is placed.
    pub debug_binary_path: PathBuf,

    /// CPU architecture of the node, as reported by the kernel.
    pub architecture: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_TIMEOUT,
            legacy_lxd_dir: PathBuf::from("/var/lib/lxd"),
            debug_binary_path: PathBuf::from("/var/snap/microcloud/common/microcloud.debug"),
            architecture: std::env::consts::ARCH.to_string(),
        }
    }
}
