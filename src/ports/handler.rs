//! Payment Handler Port - Caller-supplied Dispatch Target
//!
//! The watcher invokes a handler once per newly observed payment, each
//! on its own task. Errors are reported by the watcher and never abort
//! the poll loop.

use std::future::Future;

use async_trait::async_trait;

use crate::domain::payment::Payment;

/// Receives newly observed payments.
#[async_trait]
pub trait PaymentHandler: Send + Sync + 'static {
  async fn handle(&self, payment: Payment) -> anyhow::Result<()>;
}

/// Any async closure `Fn(Payment) -> Result<()>` is a handler.
#[async_trait]
impl<F, Fut> PaymentHandler for F
where
  F: Fn(Payment) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
  async fn handle(&self, payment: Payment) -> anyhow::Result<()> {
    (self)(payment).await
  }
}
