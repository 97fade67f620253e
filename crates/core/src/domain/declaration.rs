use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::operation::OperationId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeclarationId(pub String);

impl std::fmt::Display for DeclarationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Variant of a customs filing: the pre-shipment estimate or the post-arrival
/// actual. An operation holds at most one of each.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationType {
    Preliminary,
    Final,
}

impl DeclarationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preliminary => "preliminary",
            Self::Final => "final",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "preliminary" => Some(Self::Preliminary),
            "final" => Some(Self::Final),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Preliminary => "preliminary",
            Self::Final => "final",
        }
    }
}

/// One line item of a declaration with its own tax computation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TariffLine {
    pub line_number: u32,
    pub tariff_code: String,
    pub quantity: Decimal,
    pub unit_value: Decimal,
    pub total_value: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
}

/// A customs filing belonging to exactly one operation.
///
/// Monetary fields are fixed-point decimals; `insurance_value`, `cif_value`
/// and the default `taxable_base` are derived at intake (see
/// `valuation::DeclarationDerivation`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub id: DeclarationId,
    pub operation_id: OperationId,
    pub declaration_type: DeclarationType,
    pub fob_value: Decimal,
    pub freight_value: Decimal,
    pub insurance_value: Decimal,
    pub cif_value: Decimal,
    pub taxable_base: Decimal,
    pub total_taxes: Decimal,
    pub gatt_method: Option<String>,
    pub lines: Vec<TariffLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Declaration {
    pub fn line(&self, line_number: u32) -> Option<&TariffLine> {
        self.lines.iter().find(|line| line.line_number == line_number)
    }
}
