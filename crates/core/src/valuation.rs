//! GATT Article 1 valuation adjustment and declaration intake derivations.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::operation::InspectionType;

/// Rounds a monetary amount to 2 decimal places, half away from zero.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Whether the inspection channel requires a GATT Article 1 adjustment.
/// Express clearances skip valuation review entirely.
pub fn requires_gatt_adjustment(inspection_type: Option<InspectionType>) -> bool {
    matches!(inspection_type, Some(InspectionType::Visual) | Some(InspectionType::Fisica))
}

/// Computes the adjusted customs taxable base per GATT Article 1: the
/// original base plus commissions, unrecorded transport costs, and the
/// manual adjustment (which may be negative).
#[derive(Clone, Debug, Default)]
pub struct GattAdjustmentCalculator;

impl GattAdjustmentCalculator {
    pub fn new() -> Self {
        Self
    }

    pub fn compute_adjusted_base(
        &self,
        original_taxable_base: Decimal,
        commissions: Decimal,
        unrecorded_transport: Decimal,
        adjustment_amount: Decimal,
    ) -> Decimal {
        original_taxable_base + commissions + unrecorded_transport + adjustment_amount
    }
}

/// Monetary fields derived at declaration intake.
///
/// Insurance is 2% of FOB, CIF is FOB + freight + insurance, and the taxable
/// base mirrors CIF until edited independently. These rules must match the
/// values on declarations already in the system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclarationDerivation {
    pub insurance_value: Decimal,
    pub cif_value: Decimal,
    pub taxable_base: Decimal,
}

impl DeclarationDerivation {
    pub fn from_fob_and_freight(fob_value: Decimal, freight_value: Decimal) -> Self {
        let insurance_value = round_currency(fob_value * Decimal::new(2, 2));
        let cif_value = round_currency(fob_value + freight_value + insurance_value);
        Self { insurance_value, cif_value, taxable_base: cif_value }
    }
}
