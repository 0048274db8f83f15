//! Command lines the agent runs against the node.

use std::path::Path;

use microcloud_command::CommandLine;

use crate::config::Subsystem;

const COHORT: &str = "--cohort=+";

/// Installs a subsystem's snap from `channel`.
pub fn snap_install(subsystem: Subsystem, channel: &str) -> CommandLine {
    CommandLine::new("snap")
        .args(["install", subsystem.snap_name()])
        .arg(format!("--channel={channel}"))
        .arg(COHORT)
}

/// Moves an installed snap to `channel`.
pub fn snap_refresh(subsystem: Subsystem, channel: &str) -> CommandLine {
    CommandLine::new("snap")
        .args(["refresh", subsystem.snap_name()])
        .arg(format!("--channel={channel}"))
        .arg(COHORT)
}

/// Migrates data from a legacy LXD install.
pub fn lxd_migrate() -> CommandLine {
    CommandLine::new("lxd.migrate").arg("-yes")
}

/// Creates the cluster.
pub fn microcloud_init() -> CommandLine {
    CommandLine::new("microcloud").args(["init", "--auto"])
}

/// Joins the existing cluster.
pub fn microcloud_add() -> CommandLine {
    CommandLine::new("microcloud").args(["add", "--auto"])
}

/// Exits 0 inside a container.
pub fn detect_container() -> CommandLine {
    CommandLine::new("systemd-detect-virt").args(["--quiet", "--container"])
}

/// Installs a locally supplied snap file.
pub fn snap_install_dangerous(path: &Path) -> CommandLine {
    CommandLine::new("snap")
        .args(["install", "--dangerous"])
        .arg(path.display().to_string())
}

/// Reverts a sideloaded `MicroCloud` snap to the store version.
pub fn snap_revert_microcloud(channel: &str) -> CommandLine {
    CommandLine::new("snap")
        .args(["refresh", Subsystem::MicroCloud.snap_name()])
        .arg(format!("--channel={channel}"))
        .arg("--amend")
}

/// Enables the daemon socket, which a dangerous install leaves disabled.
pub fn enable_daemon_socket() -> CommandLine {
    CommandLine::new("systemctl").args([
        "enable",
        "--now",
        "snap.microcloud.daemon.unix.socket",
    ])
}

/// Waits for the daemon to answer.
pub fn microcloud_waitready() -> CommandLine {
    CommandLine::new("microcloud").args(["waitready", "--timeout=30"])
}

/// Reloads the daemon so it picks up a debug binary.
pub fn reload_daemon() -> CommandLine {
    CommandLine::new("systemctl").args(["reload", "snap.microcloud.daemon.service"])
}
