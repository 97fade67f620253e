use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::declaration::DeclarationId;
use crate::domain::operation::OperationId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrossingResultId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossingStatus {
    Pending,
    Match,
    Discrepancy,
    Resolved,
}

impl CrossingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Match => "match",
            Self::Discrepancy => "discrepancy",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "match" => Some(Self::Match),
            "discrepancy" => Some(Self::Discrepancy),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// Field of a declaration where the preliminary and final filings disagree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyField {
    TaxableBase,
    TotalTaxes,
    FobValue,
    CifValue,
    FreightValue,
    InsuranceValue,
    TariffLineMissing,
    TariffLineQuantity,
    TariffLineValue,
    TariffLineTax,
}

impl DiscrepancyField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaxableBase => "taxable_base",
            Self::TotalTaxes => "total_taxes",
            Self::FobValue => "fob_value",
            Self::CifValue => "cif_value",
            Self::FreightValue => "freight_value",
            Self::InsuranceValue => "insurance_value",
            Self::TariffLineMissing => "tariff_line_missing",
            Self::TariffLineQuantity => "tariff_line_quantity",
            Self::TariffLineValue => "tariff_line_value",
            Self::TariffLineTax => "tariff_line_tax",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "taxable_base" => Some(Self::TaxableBase),
            "total_taxes" => Some(Self::TotalTaxes),
            "fob_value" => Some(Self::FobValue),
            "cif_value" => Some(Self::CifValue),
            "freight_value" => Some(Self::FreightValue),
            "insurance_value" => Some(Self::InsuranceValue),
            "tariff_line_missing" => Some(Self::TariffLineMissing),
            "tariff_line_quantity" => Some(Self::TariffLineQuantity),
            "tariff_line_value" => Some(Self::TariffLineValue),
            "tariff_line_tax" => Some(Self::TariffLineTax),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::TaxableBase => "taxable base",
            Self::TotalTaxes => "total taxes",
            Self::FobValue => "FOB value",
            Self::CifValue => "CIF value",
            Self::FreightValue => "freight value",
            Self::InsuranceValue => "insurance value",
            Self::TariffLineMissing => "tariff line presence",
            Self::TariffLineQuantity => "tariff line quantity",
            Self::TariffLineValue => "tariff line total value",
            Self::TariffLineTax => "tariff line tax amount",
        }
    }
}

/// One reconciliation difference between the preliminary and final
/// declarations. `difference` is always final minus preliminary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub field: DiscrepancyField,
    pub line_number: Option<u32>,
    pub preliminary_value: String,
    pub final_value: String,
    pub difference: Decimal,
    pub description: String,
}

/// Outcome of crossing the preliminary declaration against the final one.
///
/// Derived state: created or replaced on every crossing execution, never
/// authored by a user. `discrepancies` is empty exactly when the status is
/// `Match`; `Resolved` is reachable only from `Discrepancy` through the
/// resolution workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossingResult {
    pub id: CrossingResultId,
    pub operation_id: OperationId,
    pub preliminary_declaration_id: DeclarationId,
    pub final_declaration_id: DeclarationId,
    pub status: CrossingStatus,
    pub discrepancies: Vec<Discrepancy>,
    pub resolved_by: Option<String>,
    pub resolution_comment: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub executed_at: DateTime<Utc>,
}
