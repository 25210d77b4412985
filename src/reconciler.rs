//! Feature reconciliation: raw input to a complete, ordered feature row.
//!
//! The row matches the bundle's `selected_features` exactly, in length and
//! order. Absent fields are filled with documented defaults and reported as
//! anomalies; values that cannot be coerced to their column's kind abort the
//! evaluation.

use crate::error::EvaluationError;
use crate::models::bundle::{FeatureColumn, FeatureKind, FeatureTransform, ModelBundle};
use crate::types::feature::{FeatureValue, ReconciledFeatureRow};
use crate::types::transaction::{RawTransactionInput, RawValue};
use crate::types::verdict::Anomaly;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// Days from 0001-01-01 (CE day 1) to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

/// Reconciled row plus the substitutions made to build it
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub row: ReconciledFeatureRow,
    pub anomalies: Vec<Anomaly>,
}

/// Builds feature rows for one bundle.
pub struct FeatureReconciler<'a> {
    bundle: &'a ModelBundle,
}

impl<'a> FeatureReconciler<'a> {
    pub fn new(bundle: &'a ModelBundle) -> Self {
        Self { bundle }
    }

    /// Number of features in every produced row
    pub fn feature_count(&self) -> usize {
        self.bundle.selected_features().len()
    }

    pub fn feature_names(&self) -> &[String] {
        self.bundle.selected_features()
    }

    /// Reconcile a raw input against the bundle's feature schema.
    pub fn reconcile(&self, raw: &RawTransactionInput) -> Result<Reconciliation, EvaluationError> {
        let columns = self.bundle.columns();
        let mut values = Vec::with_capacity(columns.len());
        let mut anomalies = Vec::new();

        for column in columns {
            let field = column.source.field_name(&column.name);

            let value = match raw.get(field) {
                Some(value) => self.coerce(column, value)?,
                None => {
                    let substituted = self.default_for(column)?;
                    anomalies.push(Anomaly::MissingFeature {
                        column: column.name.clone(),
                        substituted: substituted.clone(),
                    });
                    substituted
                }
            };
            values.push(value);
        }

        Ok(Reconciliation {
            row: ReconciledFeatureRow::new(values),
            anomalies,
        })
    }

    fn default_for(&self, column: &FeatureColumn) -> Result<FeatureValue, EvaluationError> {
        match column.kind {
            FeatureKind::Numeric => Ok(FeatureValue::Numeric(column.source.default.unwrap_or(0.0))),
            FeatureKind::Categorical => {
                let encoder = self.bundle.encoders().get(&column.name).ok_or_else(|| {
                    EvaluationError::Inference(format!("no encoder for column {:?}", column.name))
                })?;
                Ok(FeatureValue::Categorical(encoder.fallback_label().to_string()))
            }
        }
    }

    fn coerce(&self, column: &FeatureColumn, value: &RawValue) -> Result<FeatureValue, EvaluationError> {
        match column.kind {
            FeatureKind::Categorical => match value {
                RawValue::Other(_) => Err(type_error(&column.name, value, "a label")),
                _ => Ok(FeatureValue::Categorical(to_label(value))),
            },
            FeatureKind::Numeric => {
                let number = to_number(&column.name, value, column.source.transform)?;
                if let Some(bounds) = column.source.bounds {
                    if !bounds.contains(number) {
                        return Err(EvaluationError::FeatureRange {
                            column: column.name.clone(),
                            value: number,
                            bounds: bounds.to_string(),
                        });
                    }
                }
                Ok(FeatureValue::Numeric(number))
            }
        }
    }
}

/// Reconcile `raw` against `bundle`
pub fn reconcile(
    raw: &RawTransactionInput,
    bundle: &ModelBundle,
) -> Result<Reconciliation, EvaluationError> {
    FeatureReconciler::new(bundle).reconcile(raw)
}

fn type_error(column: &str, value: &RawValue, expected: &'static str) -> EvaluationError {
    EvaluationError::FeatureType {
        column: column.to_string(),
        value: value.to_string(),
        expected,
    }
}

fn to_number(
    column: &str,
    value: &RawValue,
    transform: FeatureTransform,
) -> Result<f64, EvaluationError> {
    let number = match transform {
        FeatureTransform::Identity => match value {
            RawValue::Number(n) => *n,
            RawValue::Bool(b) => f64::from(u8::from(*b)),
            RawValue::Timestamp(ts) => ts.timestamp() as f64,
            RawValue::Text(s) => match s.trim().parse::<f64>() {
                Ok(n) => n,
                Err(_) => parse_datetime(s)
                    .map(|ts| ts.timestamp() as f64)
                    .ok_or_else(|| type_error(column, value, "a number"))?,
            },
            RawValue::Null | RawValue::Other(_) => {
                return Err(type_error(column, value, "a number"))
            }
        },
        FeatureTransform::UnixSeconds => match value {
            RawValue::Number(n) => *n,
            RawValue::Timestamp(ts) => ts.timestamp() as f64,
            RawValue::Text(s) => parse_datetime(s)
                .map(|ts| ts.timestamp() as f64)
                .ok_or_else(|| type_error(column, value, "a date/time"))?,
            _ => return Err(type_error(column, value, "a date/time")),
        },
        FeatureTransform::DaysSinceEpoch => match value {
            RawValue::Number(n) => *n,
            RawValue::Timestamp(ts) => days_since_epoch(ts.date_naive()) as f64,
            RawValue::Text(s) => parse_datetime(s)
                .map(|ts| days_since_epoch(ts.date_naive()) as f64)
                .ok_or_else(|| type_error(column, value, "a date"))?,
            _ => return Err(type_error(column, value, "a date")),
        },
    };

    if !number.is_finite() {
        return Err(type_error(column, value, "a finite number"));
    }
    Ok(number)
}

/// Label text for a categorical column. Text is used verbatim. Integral
/// numbers drop the fraction so a zip code sent as `10001` matches the
/// trained label "10001".
fn to_label(value: &RawValue) -> String {
    match value {
        RawValue::Text(s) => s.clone(),
        RawValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
        RawValue::Number(n) => n.to_string(),
        RawValue::Bool(b) => b.to_string(),
        RawValue::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        RawValue::Null => String::new(),
        RawValue::Other(v) => v.to_string(),
    }
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS` (taken as UTC), or a bare `YYYY-MM-DD`
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn days_since_epoch(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce()) - UNIX_EPOCH_DAYS_FROM_CE
}
