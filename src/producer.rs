//! NATS publisher for verdict and rejection reports

use crate::types::verdict::{RejectionReport, VerdictReport};
use anyhow::Result;
use async_nats::Client;
use tracing::debug;

/// Producer for publishing scoring outcomes to NATS
#[derive(Clone)]
pub struct ReportProducer {
    client: Client,
    verdict_subject: String,
    rejection_subject: String,
}

impl ReportProducer {
    pub fn new(client: Client, verdict_subject: &str, rejection_subject: &str) -> Self {
        Self {
            client,
            verdict_subject: verdict_subject.to_string(),
            rejection_subject: rejection_subject.to_string(),
        }
    }

    /// Publish a verdict report
    pub async fn publish_verdict(&self, report: &VerdictReport) -> Result<()> {
        let payload = serde_json::to_vec(report)?;
        self.client
            .publish(self.verdict_subject.clone(), payload.into())
            .await?;

        debug!(
            report_id = %report.report_id,
            transaction_id = ?report.transaction_id,
            is_fraud = report.verdict.is_fraud,
            "Published verdict"
        );
        Ok(())
    }

    /// Publish a rejection for a transaction that could not be scored
    pub async fn publish_rejection(&self, report: &RejectionReport) -> Result<()> {
        let payload = serde_json::to_vec(report)?;
        self.client
            .publish(self.rejection_subject.clone(), payload.into())
            .await?;

        debug!(
            report_id = %report.report_id,
            transaction_id = ?report.transaction_id,
            error_kind = %report.error_kind,
            "Published rejection"
        );
        Ok(())
    }

    pub fn verdict_subject(&self) -> &str {
        &self.verdict_subject
    }

    pub fn rejection_subject(&self) -> &str {
        &self.rejection_subject
    }
}
