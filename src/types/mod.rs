//! Type definitions for the fraud scoring pipeline

pub mod feature;
pub mod transaction;
pub mod verdict;

pub use feature::{EncodedRow, FeatureValue, ReconciledFeatureRow};
pub use transaction::{RawTransactionInput, RawValue};
pub use verdict::{Anomaly, Evaluation, RejectionReport, Verdict, VerdictReport};
