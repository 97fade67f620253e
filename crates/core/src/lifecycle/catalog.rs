use serde::{Deserialize, Serialize};

/// Lifecycle states of a customs operation.
///
/// The primary progression runs Draft through Closed. A review band
/// (InReview, PendingCorrection, PreliquidationReview, AnalystAssigned) sits
/// between DocumentationComplete and DeclarationInProgress. Cancelled is an
/// absorbing state reachable from every non-terminal state; Closed and
/// Cancelled have no outbound edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Draft,
    DocumentationComplete,
    InReview,
    PendingCorrection,
    PreliquidationReview,
    AnalystAssigned,
    DeclarationInProgress,
    SubmittedToCustoms,
    ValuationReview,
    PaymentPreparation,
    InTransit,
    Closed,
    Cancelled,
}

impl OperationStatus {
    pub const ALL: [OperationStatus; 13] = [
        Self::Draft,
        Self::DocumentationComplete,
        Self::InReview,
        Self::PendingCorrection,
        Self::PreliquidationReview,
        Self::AnalystAssigned,
        Self::DeclarationInProgress,
        Self::SubmittedToCustoms,
        Self::ValuationReview,
        Self::PaymentPreparation,
        Self::InTransit,
        Self::Closed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::DocumentationComplete => "documentation_complete",
            Self::InReview => "in_review",
            Self::PendingCorrection => "pending_correction",
            Self::PreliquidationReview => "preliquidation_review",
            Self::AnalystAssigned => "analyst_assigned",
            Self::DeclarationInProgress => "declaration_in_progress",
            Self::SubmittedToCustoms => "submitted_to_customs",
            Self::ValuationReview => "valuation_review",
            Self::PaymentPreparation => "payment_preparation",
            Self::InTransit => "in_transit",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "documentation_complete" => Some(Self::DocumentationComplete),
            "in_review" => Some(Self::InReview),
            "pending_correction" => Some(Self::PendingCorrection),
            "preliquidation_review" => Some(Self::PreliquidationReview),
            "analyst_assigned" => Some(Self::AnalystAssigned),
            "declaration_in_progress" => Some(Self::DeclarationInProgress),
            "submitted_to_customs" => Some(Self::SubmittedToCustoms),
            "valuation_review" => Some(Self::ValuationReview),
            "payment_preparation" => Some(Self::PaymentPreparation),
            "in_transit" => Some(Self::InTransit),
            "closed" => Some(Self::Closed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Human-readable label used in error messages and history views.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::DocumentationComplete => "Documentation complete",
            Self::InReview => "In review",
            Self::PendingCorrection => "Pending correction",
            Self::PreliquidationReview => "Preliquidation review",
            Self::AnalystAssigned => "Analyst assigned",
            Self::DeclarationInProgress => "Declaration in progress",
            Self::SubmittedToCustoms => "Submitted to customs",
            Self::ValuationReview => "Valuation review",
            Self::PaymentPreparation => "Payment preparation",
            Self::InTransit => "In transit",
            Self::Closed => "Closed",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }

    /// Whether the given edge exists in the lifecycle graph.
    ///
    /// The complete edge set: forward progression along the primary
    /// sequence, the internal review-band moves, and Cancelled from every
    /// non-terminal state. Nothing else.
    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        use OperationStatus::{
            AnalystAssigned, Cancelled, Closed, DeclarationInProgress, DocumentationComplete,
            Draft, InReview, InTransit, PaymentPreparation, PendingCorrection,
            PreliquidationReview, SubmittedToCustoms, ValuationReview,
        };

        if self.is_terminal() {
            return false;
        }
        if next == Cancelled {
            return true;
        }

        matches!(
            (self, next),
            (Draft, DocumentationComplete)
                | (DocumentationComplete, InReview)
                | (InReview, PreliquidationReview)
                | (InReview, PendingCorrection)
                | (PendingCorrection, InReview)
                | (PreliquidationReview, AnalystAssigned)
                | (PreliquidationReview, PendingCorrection)
                | (AnalystAssigned, DeclarationInProgress)
                | (DeclarationInProgress, SubmittedToCustoms)
                | (SubmittedToCustoms, ValuationReview)
                | (ValuationReview, PaymentPreparation)
                | (PaymentPreparation, InTransit)
                | (InTransit, Closed)
        )
    }

    /// All states reachable from this one in a single transition.
    pub fn allowed_transitions(&self) -> Vec<OperationStatus> {
        Self::ALL.iter().copied().filter(|next| self.can_transition_to(*next)).collect()
    }
}
