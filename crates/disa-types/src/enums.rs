//! Enumeration types shared by the DISA services.
//!
//! Every enum serializes as its `SCREAMING_SNAKE_CASE` wire name, which is
//! also what [`core::fmt::Display`] prints (so mission descriptions read
//! `Severity: HIGH`).

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Implements `as_str` and `Display` from a variant-to-wire-name table.
macro_rules! wire_names {
    ($name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            /// The wire name of this variant.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Incidents
// ---------------------------------------------------------------------------

/// Incident severity, totally ordered `LOW < MEDIUM < HIGH < CRITICAL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum Severity {
    /// Minor incident, local handling.
    Low,
    /// Needs coordinated response.
    Medium,
    /// Major incident.
    High,
    /// Highest level. Escalation stops here.
    Critical,
}

wire_names!(Severity {
    Low => "LOW",
    Medium => "MEDIUM",
    High => "HIGH",
    Critical => "CRITICAL",
});

impl Severity {
    /// The next severity level up, or `None` when already `CRITICAL`.
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Low => Some(Self::Medium),
            Self::Medium => Some(Self::High),
            Self::High => Some(Self::Critical),
            Self::Critical => None,
        }
    }
}

/// Kind of disaster reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum IncidentType {
    /// Earthquake.
    Earthquake,
    /// Flood.
    Flood,
    /// Fire.
    Fire,
    /// Landslide.
    Landslide,
    /// Tsunami.
    Tsunami,
    /// Cyclone.
    Cyclone,
    /// Drought.
    Drought,
}

wire_names!(IncidentType {
    Earthquake => "EARTHQUAKE",
    Flood => "FLOOD",
    Fire => "FIRE",
    Landslide => "LANDSLIDE",
    Tsunami => "TSUNAMI",
    Cyclone => "CYCLONE",
    Drought => "DROUGHT",
});

/// Incident lifecycle status. Freely settable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum IncidentStatus {
    /// Reported but not yet acted on.
    Reported,
    /// Response under way.
    Active,
    /// Closed out.
    Resolved,
}

wire_names!(IncidentStatus {
    Reported => "REPORTED",
    Active => "ACTIVE",
    Resolved => "RESOLVED",
});

// ---------------------------------------------------------------------------
// Assessments
// ---------------------------------------------------------------------------

/// Damage severity recorded by an assessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum DamageSeverity {
    /// Cosmetic damage.
    Minor,
    /// Repairable damage.
    Moderate,
    /// Structural damage.
    Severe,
    /// Total loss or life-threatening.
    Critical,
}

wire_names!(DamageSeverity {
    Minor => "MINOR",
    Moderate => "MODERATE",
    Severe => "SEVERE",
    Critical => "CRITICAL",
});

/// Assessment lifecycle. `COMPLETED` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum AssessmentStatus {
    /// Still being written.
    Draft,
    /// Submitted. Cannot be completed again.
    Completed,
}

wire_names!(AssessmentStatus {
    Draft => "DRAFT",
    Completed => "COMPLETED",
});

// ---------------------------------------------------------------------------
// Missions
// ---------------------------------------------------------------------------

/// Kind of logistics mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum MissionType {
    /// Supply delivery.
    Delivery,
    /// Rescue operation.
    Rescue,
    /// Evacuation of residents.
    Evacuation,
    /// Transport of casualties.
    MedicalTransport,
    /// Field assessment trip.
    Assessment,
}

wire_names!(MissionType {
    Delivery => "DELIVERY",
    Rescue => "RESCUE",
    Evacuation => "EVACUATION",
    MedicalTransport => "MEDICAL_TRANSPORT",
    Assessment => "ASSESSMENT",
});

/// Mission lifecycle.
///
/// ```text
/// PENDING --> IN_PROGRESS --> COMPLETED
///    |             |
///    +-------------+--> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum MissionStatus {
    /// Created, not yet dispatched.
    Pending,
    /// Dispatched.
    InProgress,
    /// Finished.
    Completed,
    /// Abandoned before completion.
    Cancelled,
}

wire_names!(MissionStatus {
    Pending => "PENDING",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

impl MissionStatus {
    /// Whether a mission may move from `self` to `next`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress | Self::Cancelled)
                | (Self::InProgress, Self::Completed | Self::Cancelled)
        )
    }

    /// Whether no further transitions are possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Kind of field task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum TaskType {
    /// Search and rescue.
    RescueOperation,
    /// First aid and medical care.
    MedicalAid,
    /// Clearing debris. Also the fallback for unrecognised actions.
    DebrisRemoval,
}

wire_names!(TaskType {
    RescueOperation => "RESCUE_OPERATION",
    MedicalAid => "MEDICAL_AID",
    DebrisRemoval => "DEBRIS_REMOVAL",
});

/// Task urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum Priority {
    /// Can wait.
    Low,
    /// Normal.
    Medium,
    /// Ahead of normal work.
    High,
    /// Drop everything.
    Urgent,
}

wire_names!(Priority {
    Low => "LOW",
    Medium => "MEDIUM",
    High => "HIGH",
    Urgent => "URGENT",
});

/// Task lifecycle. Only assignment moves `PENDING` to `IN_PROGRESS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum TaskStatus {
    /// Not assigned yet.
    Pending,
    /// Assigned to a person.
    InProgress,
    /// Done.
    Completed,
}

wire_names!(TaskStatus {
    Pending => "PENDING",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
});

// ---------------------------------------------------------------------------
// Resources and shelters
// ---------------------------------------------------------------------------

/// Category of stocked relief supplies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum ResourceType {
    /// Food rations.
    Food,
    /// Drinking water.
    Water,
    /// Medicine and medical consumables.
    Medicine,
    /// Tools and equipment.
    Equipment,
    /// Clothing and blankets.
    Clothing,
    /// Hygiene kits.
    Hygiene,
}

wire_names!(ResourceType {
    Food => "FOOD",
    Water => "WATER",
    Medicine => "MEDICINE",
    Equipment => "EQUIPMENT",
    Clothing => "CLOTHING",
    Hygiene => "HYGIENE",
});

/// Shelter status.
///
/// `OPERATIONAL <-> FULL` follows occupancy. `CLOSED -> UNDER_PREPARATION ->
/// OPERATIONAL` is driven by nearby `incident.created` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum ShelterStatus {
    /// Open and admitting evacuees.
    Operational,
    /// Open but at capacity.
    Full,
    /// Being readied.
    UnderPreparation,
    /// Not in use.
    Closed,
}

wire_names!(ShelterStatus {
    Operational => "OPERATIONAL",
    Full => "FULL",
    UnderPreparation => "UNDER_PREPARATION",
    Closed => "CLOSED",
});

impl ShelterStatus {
    /// The status one activation step further, if any.
    ///
    /// `OPERATIONAL` and `FULL` are already active and stay put.
    pub const fn activated(self) -> Option<Self> {
        match self {
            Self::Closed => Some(Self::UnderPreparation),
            Self::UnderPreparation => Some(Self::Operational),
            Self::Operational | Self::Full => None,
        }
    }

    /// Whether the shelter is listed as available to evacuees.
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Operational | Self::UnderPreparation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn severity_escalates_one_step() {
        assert_eq!(Severity::Low.next(), Some(Severity::Medium));
        assert_eq!(Severity::High.next(), Some(Severity::Critical));
        assert_eq!(Severity::Critical.next(), None);
    }

    #[test]
    fn wire_names_match_serde() {
        let json = serde_json::to_string(&MissionType::MedicalTransport).unwrap_or_default();
        assert_eq!(json, "\"MEDICAL_TRANSPORT\"");
        assert_eq!(MissionType::MedicalTransport.to_string(), "MEDICAL_TRANSPORT");

        let status: ShelterStatus =
            serde_json::from_str("\"UNDER_PREPARATION\"").unwrap_or(ShelterStatus::Closed);
        assert_eq!(status, ShelterStatus::UnderPreparation);
    }

    #[test]
    fn mission_state_machine() {
        use MissionStatus::{Cancelled, Completed, InProgress, Pending};
        assert!(Pending.can_transition_to(InProgress));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(InProgress));
        assert!(Completed.is_terminal());
        assert!(!InProgress.is_terminal());
    }

    #[test]
    fn shelter_activation_is_staged() {
        assert_eq!(ShelterStatus::Closed.activated(), Some(ShelterStatus::UnderPreparation));
        assert_eq!(
            ShelterStatus::UnderPreparation.activated(),
            Some(ShelterStatus::Operational)
        );
        assert_eq!(ShelterStatus::Operational.activated(), None);
        assert_eq!(ShelterStatus::Full.activated(), None);
    }
}
