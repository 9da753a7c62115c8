use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a machine plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Master,
    Infra,
    Compute,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Master, Role::Infra, Role::Compute];

    /// Token embedded in machine names.
    pub fn token(self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Infra => "infra",
            Role::Compute => "compute",
        }
    }

    /// Finds the role token embedded in a machine name. Names without one
    /// are treated as compute nodes.
    pub fn from_machine_name(name: &str) -> Role {
        if name.contains(Role::Master.token()) {
            Role::Master
        } else if name.contains(Role::Infra.token()) {
            Role::Infra
        } else {
            Role::Compute
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineSpec {
    pub role: Role,
    pub ordinal: u32,
    pub name: String,
}

/// `prefix-<role><ordinal>`, ordinal zero-padded to three digits.
pub fn machine_name(prefix: &str, role: Role, ordinal: u32) -> String {
    format!("{}-{}{:03}", prefix, role.token(), ordinal)
}

/// Specs for ordinals `1..=count` of one role.
pub fn derive(prefix: &str, role: Role, count: u32) -> Vec<MachineSpec> {
    (1..=count)
        .map(|ordinal| MachineSpec {
            role,
            ordinal,
            name: machine_name(prefix, role, ordinal),
        })
        .collect()
}

/// Requested machine counts per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyCounts {
    pub masters: u32,
    pub infra: u32,
    pub compute: u32,
}

impl Default for TopologyCounts {
    fn default() -> Self {
        Self {
            masters: 1,
            infra: 2,
            compute: 2,
        }
    }
}

impl TopologyCounts {
    pub fn count(&self, role: Role) -> u32 {
        match role {
            Role::Master => self.masters,
            Role::Infra => self.infra,
            Role::Compute => self.compute,
        }
    }
}

/// The full machine set of one run: masters, then infra, then compute.
/// Computed once and never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTopology {
    machines: Vec<MachineSpec>,
}

impl ClusterTopology {
    pub fn new(prefix: &str, counts: TopologyCounts) -> Self {
        let machines = Role::ALL
            .iter()
            .flat_map(|&role| derive(prefix, role, counts.count(role)))
            .collect();
        Self { machines }
    }

    pub fn machines(&self) -> &[MachineSpec] {
        &self.machines
    }

    pub fn names(&self) -> Vec<String> {
        self.machines.iter().map(|m| m.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_zero_padded() {
        let specs = derive("demo", Role::Compute, 3);
        let names: Vec<_> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["demo-compute001", "demo-compute002", "demo-compute003"]);
        assert_eq!(specs[2].ordinal, 3);
    }

    #[test]
    fn zero_count_yields_nothing() {
        assert!(derive("demo", Role::Infra, 0).is_empty());
    }

    #[test]
    fn topology_names_are_unique_and_ordered() {
        let topology = ClusterTopology::new(
            "ci",
            TopologyCounts {
                masters: 3,
                infra: 2,
                compute: 12,
            },
        );
        assert_eq!(topology.len(), 17);
        let names = topology.names();
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        assert_eq!(names[0], "ci-master001");
        assert_eq!(names[3], "ci-infra001");
        assert_eq!(names[16], "ci-compute012");
        for spec in topology.machines() {
            let suffix = spec.name.strip_prefix("ci-").unwrap();
            let digits = suffix.trim_start_matches(spec.role.token());
            assert_eq!(digits.len(), 3);
            assert_eq!(digits.parse::<u32>().unwrap(), spec.ordinal);
        }
    }

    #[test]
    fn role_from_name() {
        assert_eq!(Role::from_machine_name("x-master001"), Role::Master);
        assert_eq!(Role::from_machine_name("x-infra002"), Role::Infra);
        assert_eq!(Role::from_machine_name("x-compute010"), Role::Compute);
        assert_eq!(Role::from_machine_name("x-7"), Role::Compute);
    }
}
