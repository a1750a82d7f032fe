//! Domain layer - Payment records and polling state.
//!
//! Pure types with no I/O: the payment record as the remote ledger
//! returns it, the poll watermark, and the bounded seen-set used to
//! suppress duplicate deliveries across overlapping windows.

pub mod payment;
pub mod seen;
pub mod watermark;

// Re-export core types for convenience
pub use payment::{OperationId, Payment, PaymentData, Payments, UserBalance};
pub use seen::SeenSet;
pub use watermark::Watermark;
