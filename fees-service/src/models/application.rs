use uuid::Uuid;

use crate::models::payment::PaymentPlan;

/// Application profile as recorded by the portal. The fees service only
/// reads these; creation and updates happen upstream.
#[derive(Debug, Clone)]
pub struct ApplicationProfile {
    pub application_id: Uuid,
    /// Service being applied for, e.g. "licensure-exam".
    pub service: String,
    /// Jurisdiction code the application was filed under.
    pub jurisdiction: String,
    /// Declared payment type. Treated as a hint only; the resolver corrects
    /// it against the actual payment history.
    pub payment_type_hint: Option<PaymentPlan>,
}
