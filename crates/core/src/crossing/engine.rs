use std::collections::BTreeSet;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::crossing::{
    CrossingResult, CrossingResultId, CrossingStatus, Discrepancy, DiscrepancyField,
};
use crate::domain::declaration::{Declaration, DeclarationType, TariffLine};
use crate::errors::DomainError;

/// Tolerance applied to every monetary comparison. Values are fixed-point
/// decimals; the tolerance absorbs rounding noise from upstream systems, not
/// real differences.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrossingConfig {
    pub epsilon: Decimal,
}

impl Default for CrossingConfig {
    fn default() -> Self {
        Self { epsilon: Decimal::new(1, 2) }
    }
}

/// Compares a preliminary declaration against the final one and produces the
/// structured discrepancy report.
///
/// Execution is deterministic: header fields are compared in a fixed order,
/// tariff lines in ascending line-number order, so identical inputs always
/// yield an identical discrepancy list.
#[derive(Clone, Debug, Default)]
pub struct DeclarationCrossingEngine {
    config: CrossingConfig,
}

impl DeclarationCrossingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CrossingConfig) -> Self {
        Self { config }
    }

    pub fn execute(
        &self,
        preliminary: &Declaration,
        final_declaration: &Declaration,
    ) -> Result<CrossingResult, DomainError> {
        if preliminary.declaration_type != DeclarationType::Preliminary {
            return Err(DomainError::Validation(format!(
                "declaration {} is not a preliminary declaration",
                preliminary.id
            )));
        }
        if final_declaration.declaration_type != DeclarationType::Final {
            return Err(DomainError::Validation(format!(
                "declaration {} is not a final declaration",
                final_declaration.id
            )));
        }
        if preliminary.operation_id != final_declaration.operation_id {
            return Err(DomainError::Validation(
                "declarations belong to different operations".to_string(),
            ));
        }

        let mut discrepancies = Vec::new();
        self.compare_headers(preliminary, final_declaration, &mut discrepancies);
        self.compare_lines(preliminary, final_declaration, &mut discrepancies);

        let status =
            if discrepancies.is_empty() { CrossingStatus::Match } else { CrossingStatus::Discrepancy };

        Ok(CrossingResult {
            id: CrossingResultId(Uuid::new_v4().to_string()),
            operation_id: preliminary.operation_id.clone(),
            preliminary_declaration_id: preliminary.id.clone(),
            final_declaration_id: final_declaration.id.clone(),
            status,
            discrepancies,
            resolved_by: None,
            resolution_comment: None,
            resolved_at: None,
            executed_at: Utc::now(),
        })
    }

    fn differs(&self, preliminary: Decimal, final_value: Decimal) -> bool {
        (final_value - preliminary).abs() > self.config.epsilon
    }

    fn compare_headers(
        &self,
        preliminary: &Declaration,
        final_declaration: &Declaration,
        discrepancies: &mut Vec<Discrepancy>,
    ) {
        let headers: [(DiscrepancyField, fn(&Declaration) -> Decimal); 6] = [
            (DiscrepancyField::TaxableBase, |declaration| declaration.taxable_base),
            (DiscrepancyField::TotalTaxes, |declaration| declaration.total_taxes),
            (DiscrepancyField::FobValue, |declaration| declaration.fob_value),
            (DiscrepancyField::CifValue, |declaration| declaration.cif_value),
            (DiscrepancyField::FreightValue, |declaration| declaration.freight_value),
            (DiscrepancyField::InsuranceValue, |declaration| declaration.insurance_value),
        ];

        for (field, extract) in headers {
            let preliminary_value = extract(preliminary);
            let final_value = extract(final_declaration);
            if self.differs(preliminary_value, final_value) {
                discrepancies.push(Discrepancy {
                    field,
                    line_number: None,
                    preliminary_value: preliminary_value.to_string(),
                    final_value: final_value.to_string(),
                    difference: final_value - preliminary_value,
                    description: format!(
                        "{} differs between declarations: preliminary {preliminary_value}, final {final_value}",
                        field.label()
                    ),
                });
            }
        }
    }

    fn compare_lines(
        &self,
        preliminary: &Declaration,
        final_declaration: &Declaration,
        discrepancies: &mut Vec<Discrepancy>,
    ) {
        let line_numbers: BTreeSet<u32> = preliminary
            .lines
            .iter()
            .chain(final_declaration.lines.iter())
            .map(|line| line.line_number)
            .collect();

        for line_number in line_numbers {
            match (preliminary.line(line_number), final_declaration.line(line_number)) {
                (Some(line), None) => {
                    discrepancies.push(missing_line(line_number, line, true));
                }
                (None, Some(line)) => {
                    discrepancies.push(missing_line(line_number, line, false));
                }
                (Some(preliminary_line), Some(final_line)) => {
                    self.compare_line_pair(preliminary_line, final_line, discrepancies);
                }
                (None, None) => unreachable!("line number sourced from one of the declarations"),
            }
        }
    }

    fn compare_line_pair(
        &self,
        preliminary: &TariffLine,
        final_line: &TariffLine,
        discrepancies: &mut Vec<Discrepancy>,
    ) {
        let fields: [(DiscrepancyField, Decimal, Decimal); 3] = [
            (DiscrepancyField::TariffLineQuantity, preliminary.quantity, final_line.quantity),
            (DiscrepancyField::TariffLineValue, preliminary.total_value, final_line.total_value),
            (DiscrepancyField::TariffLineTax, preliminary.tax_amount, final_line.tax_amount),
        ];

        for (field, preliminary_value, final_value) in fields {
            if self.differs(preliminary_value, final_value) {
                discrepancies.push(Discrepancy {
                    field,
                    line_number: Some(preliminary.line_number),
                    preliminary_value: preliminary_value.to_string(),
                    final_value: final_value.to_string(),
                    difference: final_value - preliminary_value,
                    description: format!(
                        "{} differs on line {}: preliminary {preliminary_value}, final {final_value}",
                        field.label(),
                        preliminary.line_number
                    ),
                });
            }
        }
    }
}

/// A line present on only one side. The difference treats the absent side as
/// zero so the sign still reads final minus preliminary.
fn missing_line(line_number: u32, line: &TariffLine, missing_in_final: bool) -> Discrepancy {
    let (preliminary_value, final_value, difference, side) = if missing_in_final {
        (line.total_value.to_string(), "absent".to_string(), -line.total_value, "final")
    } else {
        ("absent".to_string(), line.total_value.to_string(), line.total_value, "preliminary")
    };

    Discrepancy {
        field: DiscrepancyField::TariffLineMissing,
        line_number: Some(line_number),
        preliminary_value,
        final_value,
        difference,
        description: format!("tariff line {line_number} is missing in the {side} declaration"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{CrossingConfig, DeclarationCrossingEngine};
    use crate::domain::crossing::{CrossingStatus, DiscrepancyField};
    use crate::domain::declaration::{Declaration, DeclarationId, DeclarationType, TariffLine};
    use crate::domain::operation::OperationId;

    fn declaration(
        id: &str,
        declaration_type: DeclarationType,
        fob: Decimal,
        cif: Decimal,
        lines: Vec<TariffLine>,
    ) -> Declaration {
        let now = Utc::now();
        Declaration {
            id: DeclarationId(id.to_string()),
            operation_id: OperationId("OP-1".to_string()),
            declaration_type,
            fob_value: fob,
            freight_value: Decimal::new(15_000, 2),
            insurance_value: Decimal::new(2_000, 2),
            cif_value: cif,
            taxable_base: cif,
            total_taxes: Decimal::new(21_600, 2),
            gatt_method: Some("transaction_value".to_string()),
            lines,
            created_at: now,
            updated_at: now,
        }
    }

    fn line(line_number: u32, quantity: i64, total_value: i64, tax_amount: i64) -> TariffLine {
        TariffLine {
            line_number,
            tariff_code: "8471.30.00".to_string(),
            quantity: Decimal::new(quantity, 0),
            unit_value: Decimal::new(10_000, 2),
            total_value: Decimal::new(total_value, 2),
            tax_rate: Decimal::new(1_800, 2),
            tax_amount: Decimal::new(tax_amount, 2),
        }
    }

    #[test]
    fn identical_declarations_cross_as_match() {
        let engine = DeclarationCrossingEngine::new();
        let preliminary = declaration(
            "D-1",
            DeclarationType::Preliminary,
            Decimal::new(100_000, 2),
            Decimal::new(120_000, 2),
            vec![line(1, 10, 100_000, 18_000)],
        );
        let final_declaration = declaration(
            "D-2",
            DeclarationType::Final,
            Decimal::new(100_000, 2),
            Decimal::new(120_000, 2),
            vec![line(1, 10, 100_000, 18_000)],
        );

        let result = engine.execute(&preliminary, &final_declaration).expect("crossing");

        assert_eq!(result.status, CrossingStatus::Match);
        assert!(result.discrepancies.is_empty());
    }

    #[test]
    fn cif_difference_yields_exactly_one_discrepancy() {
        let engine = DeclarationCrossingEngine::new();
        let preliminary = declaration(
            "D-1",
            DeclarationType::Preliminary,
            Decimal::new(100_000, 2),
            Decimal::new(120_000, 2),
            vec![],
        );
        let mut final_declaration = declaration(
            "D-2",
            DeclarationType::Final,
            Decimal::new(100_000, 2),
            Decimal::new(125_000, 2),
            vec![],
        );
        // keep taxable base aligned so only CIF differs
        final_declaration.taxable_base = preliminary.taxable_base;

        let result = engine.execute(&preliminary, &final_declaration).expect("crossing");

        assert_eq!(result.status, CrossingStatus::Discrepancy);
        assert_eq!(result.discrepancies.len(), 1);
        let discrepancy = &result.discrepancies[0];
        assert_eq!(discrepancy.field, DiscrepancyField::CifValue);
        assert_eq!(discrepancy.difference, Decimal::new(5_000, 2));
        assert_eq!(discrepancy.preliminary_value, "1200.00");
        assert_eq!(discrepancy.final_value, "1250.00");
    }

    #[test]
    fn differences_within_epsilon_are_ignored() {
        let engine = DeclarationCrossingEngine::with_config(CrossingConfig::default());
        let preliminary = declaration(
            "D-1",
            DeclarationType::Preliminary,
            Decimal::new(100_000, 2),
            Decimal::new(120_000, 2),
            vec![],
        );
        let mut final_declaration = declaration(
            "D-2",
            DeclarationType::Final,
            Decimal::new(100_001, 2),
            Decimal::new(120_000, 2),
            vec![],
        );
        final_declaration.taxable_base = preliminary.taxable_base;

        let result = engine.execute(&preliminary, &final_declaration).expect("crossing");
        assert_eq!(result.status, CrossingStatus::Match);
    }

    #[test]
    fn line_differences_are_reported_per_field_in_line_order() {
        let engine = DeclarationCrossingEngine::new();
        let preliminary = declaration(
            "D-1",
            DeclarationType::Preliminary,
            Decimal::new(100_000, 2),
            Decimal::new(120_000, 2),
            vec![line(1, 10, 100_000, 18_000), line(2, 5, 50_000, 9_000)],
        );
        let final_declaration = declaration(
            "D-2",
            DeclarationType::Final,
            Decimal::new(100_000, 2),
            Decimal::new(120_000, 2),
            vec![line(1, 12, 100_000, 18_500), line(3, 4, 40_000, 7_200)],
        );

        let result = engine.execute(&preliminary, &final_declaration).expect("crossing");

        let fields: Vec<(DiscrepancyField, Option<u32>)> = result
            .discrepancies
            .iter()
            .map(|discrepancy| (discrepancy.field, discrepancy.line_number))
            .collect();
        assert_eq!(
            fields,
            vec![
                (DiscrepancyField::TariffLineQuantity, Some(1)),
                (DiscrepancyField::TariffLineTax, Some(1)),
                (DiscrepancyField::TariffLineMissing, Some(2)),
                (DiscrepancyField::TariffLineMissing, Some(3)),
            ]
        );

        let missing_in_final = &result.discrepancies[2];
        assert_eq!(missing_in_final.difference, Decimal::new(-50_000, 2));
        assert_eq!(missing_in_final.final_value, "absent");

        let missing_in_preliminary = &result.discrepancies[3];
        assert_eq!(missing_in_preliminary.difference, Decimal::new(40_000, 2));
        assert_eq!(missing_in_preliminary.preliminary_value, "absent");
    }

    #[test]
    fn crossing_is_deterministic_for_identical_inputs() {
        let engine = DeclarationCrossingEngine::new();
        let preliminary = declaration(
            "D-1",
            DeclarationType::Preliminary,
            Decimal::new(100_000, 2),
            Decimal::new(120_000, 2),
            vec![line(1, 10, 100_000, 18_000), line(2, 5, 50_000, 9_000)],
        );
        let final_declaration = declaration(
            "D-2",
            DeclarationType::Final,
            Decimal::new(101_000, 2),
            Decimal::new(121_000, 2),
            vec![line(1, 11, 100_000, 18_000)],
        );

        let first = engine.execute(&preliminary, &final_declaration).expect("first run");
        let second = engine.execute(&preliminary, &final_declaration).expect("second run");

        assert_eq!(first.discrepancies, second.discrepancies);
        assert_eq!(first.status, second.status);
    }

    #[test]
    fn swapped_declaration_types_are_rejected() {
        let engine = DeclarationCrossingEngine::new();
        let preliminary = declaration(
            "D-1",
            DeclarationType::Final,
            Decimal::new(100_000, 2),
            Decimal::new(120_000, 2),
            vec![],
        );
        let final_declaration = declaration(
            "D-2",
            DeclarationType::Preliminary,
            Decimal::new(100_000, 2),
            Decimal::new(120_000, 2),
            vec![],
        );

        engine
            .execute(&preliminary, &final_declaration)
            .expect_err("type mismatch must be rejected");
    }
}
