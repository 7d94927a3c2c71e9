//! Administrative and observed statuses plus their timestamped history

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::support::DomainError;

/// Operator-controlled availability override. Gates all admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AdminStatus {
    #[default]
    Operational,
    InternalUse,
    OutOfService,
    Planned,
    Blocked,
    Unspecified,
}

impl AdminStatus {
    /// Whether reservations and sessions may be started at all.
    pub fn admits_requests(&self) -> bool {
        matches!(self, Self::Operational | Self::InternalUse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operational => "Operational",
            Self::InternalUse => "InternalUse",
            Self::OutOfService => "OutOfService",
            Self::Planned => "Planned",
            Self::Blocked => "Blocked",
            Self::Unspecified => "Unspecified",
        }
    }
}

impl std::fmt::Display for AdminStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AdminStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "operational" => Ok(Self::Operational),
            "internaluse" => Ok(Self::InternalUse),
            "outofservice" => Ok(Self::OutOfService),
            "planned" => Ok(Self::Planned),
            "blocked" => Ok(Self::Blocked),
            "unspecified" => Ok(Self::Unspecified),
            other => Err(DomainError::Validation(format!(
                "unknown admin status '{}'",
                other
            ))),
        }
    }
}

/// Observed status of a single EVSE, derived from its admin status,
/// connectivity, reservation and session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvseStatus {
    Available,
    Reserved,
    Charging,
    OutOfService,
    Offline,
    Unspecified,
}

impl EvseStatus {
    /// Pure projection of the EVSE's state. A held session or reservation
    /// always shows through, so the status cannot drift from what the EVSE
    /// actually holds; otherwise connectivity and then the admin status decide.
    pub fn derive(admin: AdminStatus, online: bool, reserved: bool, charging: bool) -> Self {
        if charging {
            Self::Charging
        } else if reserved {
            Self::Reserved
        } else if !online {
            Self::Offline
        } else if !admin.admits_requests() {
            Self::OutOfService
        } else {
            Self::Available
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Reserved => "Reserved",
            Self::Charging => "Charging",
            Self::OutOfService => "OutOfService",
            Self::Offline => "Offline",
            Self::Unspecified => "Unspecified",
        }
    }
}

impl std::fmt::Display for EvseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate status of a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StationStatus {
    Available,
    Reserved,
    Charging,
    OutOfService,
    Offline,
    Unspecified,
}

impl StationStatus {
    /// Available wins if any EVSE is available, then Reserved, then Charging.
    /// A station without EVSEs reports Unspecified.
    pub fn aggregate(admin: AdminStatus, evses: &[EvseStatus]) -> Self {
        if !admin.admits_requests() {
            return Self::OutOfService;
        }
        if evses.is_empty() {
            return Self::Unspecified;
        }
        let any = |s: EvseStatus| evses.iter().any(|e| *e == s);
        if any(EvseStatus::Available) {
            Self::Available
        } else if any(EvseStatus::Reserved) {
            Self::Reserved
        } else if any(EvseStatus::Charging) {
            Self::Charging
        } else if evses.iter().all(|e| *e == EvseStatus::Offline) {
            Self::Offline
        } else {
            Self::OutOfService
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Reserved => "Reserved",
            Self::Charging => "Charging",
            Self::OutOfService => "OutOfService",
            Self::Offline => "Offline",
            Self::Unspecified => "Unspecified",
        }
    }
}

impl std::fmt::Display for StationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamped<T> {
    pub value: T,
    pub timestamp: DateTime<Utc>,
}

/// Bounded history of timestamped values; the newest entry is "current".
#[derive(Debug, Clone)]
pub struct StatusSchedule<T> {
    current: Timestamped<T>,
    previous: VecDeque<Timestamped<T>>,
    max_entries: usize,
}

pub const DEFAULT_SCHEDULE_SIZE: usize = 16;

impl<T: Copy + PartialEq> StatusSchedule<T> {
    pub fn new(initial: T, timestamp: DateTime<Utc>) -> Self {
        Self::with_capacity(initial, timestamp, DEFAULT_SCHEDULE_SIZE)
    }

    pub fn with_capacity(initial: T, timestamp: DateTime<Utc>, max_entries: usize) -> Self {
        Self {
            current: Timestamped {
                value: initial,
                timestamp,
            },
            previous: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn current(&self) -> T {
        self.current.value
    }

    pub fn changed_at(&self) -> DateTime<Utc> {
        self.current.timestamp
    }

    /// Record a new value. Returns the previous value when it changed.
    pub fn set(&mut self, value: T, timestamp: DateTime<Utc>) -> Option<T> {
        if self.current.value == value {
            return None;
        }
        let old = std::mem::replace(&mut self.current, Timestamped { value, timestamp });
        self.previous.push_back(old);
        while self.previous.len() + 1 > self.max_entries {
            self.previous.pop_front();
        }
        Some(old.value)
    }

    /// Oldest first, current last.
    pub fn history(&self) -> Vec<Timestamped<T>> {
        self.previous
            .iter()
            .copied()
            .chain(std::iter::once(self.current))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_allows_operational_and_internal_use() {
        assert!(AdminStatus::Operational.admits_requests());
        assert!(AdminStatus::InternalUse.admits_requests());
        assert!(!AdminStatus::OutOfService.admits_requests());
        assert!(!AdminStatus::Unspecified.admits_requests());
    }

    #[test]
    fn evse_status_projection() {
        use EvseStatus::*;
        let op = AdminStatus::Operational;
        assert_eq!(EvseStatus::derive(op, true, false, false), Available);
        assert_eq!(EvseStatus::derive(op, true, true, false), Reserved);
        assert_eq!(EvseStatus::derive(op, true, true, true), Charging);
        assert_eq!(EvseStatus::derive(op, false, false, false), Offline);
        assert_eq!(
            EvseStatus::derive(AdminStatus::OutOfService, true, false, false),
            OutOfService
        );
        assert_eq!(
            EvseStatus::derive(AdminStatus::OutOfService, true, false, true),
            Charging
        );
    }

    #[test]
    fn station_aggregate_prefers_available() {
        use EvseStatus::*;
        let op = AdminStatus::Operational;
        assert_eq!(
            StationStatus::aggregate(op, &[Charging, Available]),
            StationStatus::Available
        );
        assert_eq!(
            StationStatus::aggregate(op, &[Charging, Reserved]),
            StationStatus::Reserved
        );
        assert_eq!(
            StationStatus::aggregate(op, &[Offline, Offline]),
            StationStatus::Offline
        );
        assert_eq!(StationStatus::aggregate(op, &[]), StationStatus::Unspecified);
        assert_eq!(
            StationStatus::aggregate(AdminStatus::OutOfService, &[Available]),
            StationStatus::OutOfService
        );
    }

    #[test]
    fn schedule_keeps_most_recent_and_bounds_history() {
        let t0 = Utc::now();
        let mut schedule = StatusSchedule::with_capacity(AdminStatus::Operational, t0, 2);
        assert_eq!(schedule.set(AdminStatus::Operational, t0), None);
        assert_eq!(
            schedule.set(AdminStatus::OutOfService, t0),
            Some(AdminStatus::Operational)
        );
        schedule.set(AdminStatus::InternalUse, t0);
        assert_eq!(schedule.current(), AdminStatus::InternalUse);
        assert_eq!(schedule.history().len(), 2);
    }

    #[test]
    fn admin_status_parses_case_insensitively() {
        assert_eq!("outOfService".parse::<AdminStatus>(), Ok(AdminStatus::OutOfService));
        assert!("broken".parse::<AdminStatus>().is_err());
    }
}
