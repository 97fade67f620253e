use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::declaration::DeclarationId;
use crate::domain::operation::OperationId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GattFormId(pub String);

/// GATT Article 1 valuation adjustment form, one-to-one with the declaration
/// requiring adjustment.
///
/// Once `completed_at` is set the form is immutable; any further submission
/// fails with `AlreadyFinalized`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GattForm {
    pub id: GattFormId,
    pub operation_id: OperationId,
    pub declaration_id: DeclarationId,
    pub commercial_links: bool,
    pub commissions: Decimal,
    pub unrecorded_transport: Decimal,
    pub adjustment_amount: Decimal,
    pub justification: String,
    pub adjusted_taxable_base: Decimal,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl GattForm {
    pub fn is_finalized(&self) -> bool {
        self.completed_at.is_some()
    }
}
