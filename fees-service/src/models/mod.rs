pub mod application;
pub mod payment;
pub mod receipt;
pub mod schedule;

pub use application::ApplicationProfile;
pub use payment::{Payment, PaymentPlan, PaymentStatus, PlanItem, SettlementMethod};
pub use receipt::{Receipt, ReceiptLineItem};
pub use schedule::{FeeSchedule, FeeScheduleSnapshot, ScheduleKey, ScheduleLineItem};
