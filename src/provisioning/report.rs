use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;

use super::address::AddressMap;
use super::naming::Role;

const BANNER: &str = "#################################################################";

/// Resolved addresses grouped by role, each group in machine-name order.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct AddressReport {
    pub masters: Vec<Ipv4Addr>,
    pub infra: Vec<Ipv4Addr>,
    pub nodes: Vec<Ipv4Addr>,
}

impl AddressReport {
    pub fn from_addresses(addresses: &AddressMap) -> Self {
        let mut report = AddressReport::default();
        // BTreeMap iteration is already sorted by name
        for (name, ip) in addresses {
            match Role::from_machine_name(name) {
                Role::Master => report.masters.push(*ip),
                Role::Infra => report.infra.push(*ip),
                Role::Compute => report.nodes.push(*ip),
            }
        }
        report
    }

    /// Shell-assignable lines, without the banner.
    pub fn assignments(&self) -> [String; 3] {
        [
            format!("MASTER_IP=\"{}\"", join(&self.masters)),
            format!("INFRA_IPS=\"{}\"", join(&self.infra)),
            format!("NODE_IPS=\"{}\"", join(&self.nodes)),
        ]
    }
}

fn join(ips: &[Ipv4Addr]) -> String {
    ips.iter().map(Ipv4Addr::to_string).collect::<Vec<_>>().join(" ")
}

impl fmt::Display for AddressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", BANNER)?;
        for line in self.assignments() {
            writeln!(f, "{}", line)?;
        }
        writeln!(f, "{}", BANNER)
    }
}
