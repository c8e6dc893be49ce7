//! Feed scenarios: which kinds of objects the simulated producer reports.

use serde::{Deserialize, Serialize};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Every threat profile, evenly weighted
    #[default]
    Mixed,

    /// Loitering munitions and reconnaissance UAVs only
    DroneSwarm,

    /// Cruise and tactical missiles only
    MissileSalvo,

    /// Stationary region-level alerts at oblast centres
    RegionAlerts,
}

impl Scenario {
    pub fn all() -> Vec<Scenario> {
        vec![
            Scenario::Mixed,
            Scenario::DroneSwarm,
            Scenario::MissileSalvo,
            Scenario::RegionAlerts,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Mixed => "mixed",
            Scenario::DroneSwarm => "drone_swarm",
            Scenario::MissileSalvo => "missile_salvo",
            Scenario::RegionAlerts => "region_alerts",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::Mixed => "Drones, UAVs, cruise and tactical missiles crossing the area",
            Scenario::DroneSwarm => "Slow, low, numerous drones with frequent course changes",
            Scenario::MissileSalvo => "Fast, high missiles on straight courses",
            Scenario::RegionAlerts => "Air-raid alerts raised and cleared per region",
        }
    }

    /// Whether targets in this scenario move at all.
    pub fn is_kinematic(&self) -> bool {
        !matches!(self, Scenario::RegionAlerts)
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mixed" => Ok(Scenario::Mixed),
            "drone_swarm" | "droneswarm" | "drones" => Ok(Scenario::DroneSwarm),
            "missile_salvo" | "missilesalvo" | "missiles" => Ok(Scenario::MissileSalvo),
            "region_alerts" | "regionalerts" | "alerts" => Ok(Scenario::RegionAlerts),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
