//! Resource-group attachment for helper processes.

use crate::cmd::{Cmd, CmdError};

/// cgroup v1 controllers a container's limits are spread across.
pub const CONTROLLERS: [&str; 11] = [
    "memory",
    "cpu",
    "devices",
    "perf_event",
    "cpuset",
    "blkio",
    "pids",
    "freezer",
    "net_cls",
    "net_prio",
    "hugetlb",
];

/// `controllers:path` group spec for a container's cgroup.
pub(super) fn group_spec(container_id: &str) -> String {
    format!("{}:/docker/{}", CONTROLLERS.join(","), container_id)
}

/// Move `pid` into the container's cgroups. `--sticky` keeps the daemon from
/// moving its future children elsewhere.
pub(super) fn classify(container_id: &str, pid: u32) -> Result<(), CmdError> {
    Cmd::new("cgclassify")
        .args(["--sticky", "-g"])
        .arg(group_spec(container_id))
        .arg(pid.to_string())
        .run()
        .map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_spec_lists_every_controller() {
        assert_eq!(
            group_spec("abc123"),
            "memory,cpu,devices,perf_event,cpuset,blkio,pids,freezer,net_cls,net_prio,hugetlb:/docker/abc123"
        );
    }
}
