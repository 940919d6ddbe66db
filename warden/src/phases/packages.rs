//! Host package and firewall phases.

use super::{CommandPhase, sudo};
use crate::runner::TimeoutClass;

/// Packages the later phases call out to.
const PACKAGES: &[&str] = &["ca-certificates", "curl", "git", "openssl", "ufw"];

/// Ports the platform serves on.
const SERVED_PORTS: &[&str] = &["80/tcp", "443/tcp"];

pub(super) fn system_packages() -> CommandPhase {
    CommandPhase::new(|_| {
        vec![
            sudo(["apt-get", "update", "-q"]).timeout(TimeoutClass::Long),
            sudo(["env", "DEBIAN_FRONTEND=noninteractive", "apt-get", "install", "-y", "-q"])
                .args(PACKAGES.iter().copied())
                .timeout(TimeoutClass::Long),
        ]
    })
}

/// Opens the served ports plus SSH, then enables the firewall.
pub(super) fn firewall() -> CommandPhase {
    CommandPhase::new(|_| {
        let mut plan = vec![sudo(["ufw", "allow", "OpenSSH"])];
        plan.extend(SERVED_PORTS.iter().map(|&port| sudo(["ufw", "allow", port])));
        plan.push(sudo(["ufw", "--force", "enable"]));
        plan
    })
}
