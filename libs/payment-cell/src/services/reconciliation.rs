// libs/payment-cell/src/services/reconciliation.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};

use crate::models::{
    reconciliation_overwrite, AmountMismatch, ExternalUpdate, GatewayTransaction, MissingInDatabase,
    MissingInGateway, Payment, PaymentError, ReconcileOptions, ReconciliationReport,
    StatusMismatch, MAX_RECONCILE_DAYS,
};
use crate::services::gateway::PaymentGateway;
use crate::services::repository::PaymentRepository;

/// Differences up to this many leones are treated as rounding.
pub const AMOUNT_TOLERANCE_LEONE: i64 = 1;

pub struct ReconciliationService {
    gateway: Arc<dyn PaymentGateway>,
    payments: Arc<dyn PaymentRepository>,
    provider_name: String,
}

impl ReconciliationService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        payments: Arc<dyn PaymentRepository>,
        provider_name: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            payments,
            provider_name: provider_name.into(),
        }
    }

    /// Compare the provider's transactions with local payments over the trailing
    /// `options.days` ending at `now`.
    ///
    /// Only status mismatches are ever corrected, and only with `auto_fix`.
    #[instrument(skip(self), fields(provider = %self.provider_name))]
    pub async fn run(
        &self,
        options: ReconcileOptions,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationReport, PaymentError> {
        if !(1..=MAX_RECONCILE_DAYS).contains(&options.days) {
            return Err(PaymentError::ValidationError(format!(
                "days must be between 1 and {}, got {}",
                MAX_RECONCILE_DAYS, options.days
            )));
        }
        let window_start = Duration::try_days(options.days)
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| PaymentError::ValidationError(format!("days out of range: {}", options.days)))?;

        let gateway_transactions = self.gateway.list_transactions(window_start, now).await?;
        let local_payments = self.payments
            .list_in_window(&self.provider_name, window_start, now)
            .await?;

        info!(
            "Reconciling {} gateway transactions against {} local payments",
            gateway_transactions.len(),
            local_payments.len()
        );

        let gateway_by_ref: HashMap<&str, &GatewayTransaction> = gateway_transactions
            .iter()
            .map(|tx| (tx.reference.as_str(), tx))
            .collect();
        let local_by_ref: HashMap<&str, &Payment> = local_payments
            .iter()
            .filter_map(|p| p.transaction_id.as_deref().filter(|r| !r.is_empty()).map(|reference| (reference, p)))
            .collect();

        let mut report = ReconciliationReport {
            window_start: Some(window_start),
            window_end: Some(now),
            auto_fix: options.auto_fix,
            total_gateway: gateway_transactions.len(),
            total_local: local_payments.len(),
            ..Default::default()
        };

        for tx in &gateway_transactions {
            let Some(payment) = local_by_ref.get(tx.reference.as_str()) else {
                report.discrepancies.missing_in_database.push(MissingInDatabase {
                    reference: tx.reference.clone(),
                    provider_status: tx.provider_status.clone(),
                    amount_leone: tx.amount_leone,
                });
                continue;
            };

            report.matched += 1;

            let gateway_status = tx.status();
            if gateway_status != payment.payment_status {
                report.discrepancies.status_mismatches.push(StatusMismatch {
                    payment_id: payment.id,
                    transaction_id: tx.reference.clone(),
                    local_status: payment.payment_status,
                    gateway_status,
                });
            }

            if (tx.amount_leone - payment.amount_leone).abs() > AMOUNT_TOLERANCE_LEONE {
                report.discrepancies.amount_mismatches.push(AmountMismatch {
                    payment_id: payment.id,
                    transaction_id: tx.reference.clone(),
                    local_amount: payment.amount_leone,
                    gateway_amount: tx.amount_leone,
                });
            }
        }

        for payment in &local_payments {
            let Some(reference) = payment.transaction_id.as_deref().filter(|r| !r.is_empty()) else {
                report.unreferenced += 1;
                continue;
            };
            if !gateway_by_ref.contains_key(reference) {
                report.discrepancies.missing_in_gateway.push(MissingInGateway {
                    payment_id: payment.id,
                    transaction_id: reference.to_string(),
                    status: payment.payment_status,
                    amount_leone: payment.amount_leone,
                });
            }
        }

        report.missing_in_database = report.discrepancies.missing_in_database.len();
        report.missing_in_gateway = report.discrepancies.missing_in_gateway.len();
        report.status_mismatch = report.discrepancies.status_mismatches.len();
        report.amount_mismatch = report.discrepancies.amount_mismatches.len();

        if options.auto_fix {
            self.fix_statuses(&mut report).await;
        }

        if report.missing_in_database + report.missing_in_gateway + report.status_mismatch + report.amount_mismatch > 0 {
            warn!(
                "Reconciliation found discrepancies: {} missing locally, {} missing at gateway, {} status, {} amount",
                report.missing_in_database,
                report.missing_in_gateway,
                report.status_mismatch,
                report.amount_mismatch
            );
        } else {
            info!("Reconciliation clean: {} matched", report.matched);
        }
        if report.unreferenced > 0 {
            info!("{} local payments never reached the gateway and were not compared", report.unreferenced);
        }

        Ok(report)
    }

    async fn fix_statuses(&self, report: &mut ReconciliationReport) {
        for mismatch in &report.discrepancies.status_mismatches {
            if let ExternalUpdate::Refuse(reason) = reconciliation_overwrite(mismatch.local_status, mismatch.gateway_status) {
                report.fix_errors.push(format!("{}: {}", mismatch.transaction_id, reason));
                continue;
            }

            match self.payments.update_status(mismatch.payment_id, mismatch.gateway_status).await {
                Ok(_) => {
                    info!(
                        "Auto-fixed payment {} from {} to {}",
                        mismatch.payment_id, mismatch.local_status, mismatch.gateway_status
                    );
                    report.fixed += 1;
                }
                Err(e) => {
                    warn!("Failed to auto-fix payment {}: {}", mismatch.payment_id, e);
                    report.fix_errors.push(format!("{}: {}", mismatch.transaction_id, e));
                }
            }
        }
    }
}
