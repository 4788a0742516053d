//! Type-safe identifier wrappers around `u64`.
//!
//! Every entity owned by a DISA service has a strongly-typed ID so that an
//! incident id can never be passed where a task id is expected. IDs are
//! assigned sequentially by the owning service's store, starting at 1.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates a newtype wrapper around `u64` with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub u64);

        impl $name {
            /// Wrap a raw numeric identifier.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Return the inner numeric value.
            pub const fn into_inner(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a reported incident.
    IncidentId
}

define_id! {
    /// Unique identifier for a damage assessment.
    AssessmentId
}

define_id! {
    /// Unique identifier for a logistics mission.
    MissionId
}

define_id! {
    /// Unique identifier for a field task.
    TaskId
}

define_id! {
    /// Unique identifier for a stocked resource.
    ResourceId
}

define_id! {
    /// Unique identifier for a shelter.
    ShelterId
}

define_id! {
    /// Unique identifier for a person registered with the personnel service.
    PersonnelId
}

impl PersonnelId {
    /// The human-readable personnel code carried on `task.assigned` events,
    /// e.g. `PER-301`.
    pub fn code(self) -> String {
        format!("PER-{:03}", self.0)
    }

    /// Parse a personnel code back into an id.
    ///
    /// Non-digit characters are stripped, so `PER-301`, `301` and `per301`
    /// all resolve to the same id. Returns `None` when no digits remain or
    /// the number does not fit.
    pub fn from_code(code: &str) -> Option<Self> {
        let digits: String = code.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return None;
        }
        digits.parse().ok().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let incident = IncidentId::new(1);
        let task = TaskId::new(1);
        assert_eq!(incident.into_inner(), task.into_inner());
    }

    #[test]
    fn id_serializes_as_bare_number() {
        let id = MissionId::new(42);
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "42");
    }

    #[test]
    fn personnel_code_is_zero_padded() {
        assert_eq!(PersonnelId::new(7).code(), "PER-007");
        assert_eq!(PersonnelId::new(301).code(), "PER-301");
        assert_eq!(PersonnelId::new(1234).code(), "PER-1234");
    }

    #[test]
    fn personnel_code_parses_digits_only() {
        assert_eq!(PersonnelId::from_code("PER-301"), Some(PersonnelId::new(301)));
        assert_eq!(PersonnelId::from_code("42"), Some(PersonnelId::new(42)));
        assert_eq!(PersonnelId::from_code("PER-"), None);
        assert_eq!(PersonnelId::from_code(""), None);
    }
}
