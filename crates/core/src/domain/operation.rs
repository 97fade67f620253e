use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::catalog::OperationStatus;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub String);

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Customs inspection channel assigned to an operation. Determines whether a
/// GATT Article 1 valuation adjustment is required (`Visual` and `Fisica`
/// inspections only).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionType {
    Expresso,
    Visual,
    Fisica,
}

impl InspectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expresso => "expresso",
            Self::Visual => "visual",
            Self::Fisica => "fisica",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "expresso" => Some(Self::Expresso),
            "visual" => Some(Self::Visual),
            "fisica" => Some(Self::Fisica),
            _ => None,
        }
    }
}

/// A customs brokerage case tracked from intake to closure.
///
/// `status` is mutated only through the transition engine; `version` is the
/// optimistic concurrency token bumped on every committed mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub reference: String,
    pub client_name: String,
    pub status: OperationStatus,
    pub inspection_type: Option<InspectionType>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry of the append-only status history log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub operation_id: OperationId,
    pub previous_status: OperationStatus,
    pub new_status: OperationStatus,
    pub actor: String,
    pub comment: Option<String>,
    pub source_ip: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::InspectionType;

    #[test]
    fn inspection_type_round_trips_from_storage_encoding() {
        for inspection in [InspectionType::Expresso, InspectionType::Visual, InspectionType::Fisica]
        {
            assert_eq!(InspectionType::parse(inspection.as_str()), Some(inspection));
        }
    }

    #[test]
    fn inspection_type_parse_rejects_unknown_channel() {
        assert_eq!(InspectionType::parse("documental"), None);
    }
}
