//! Per-key financial totals and their fixed-schema CSV export.
//!
//! All sums are carried in 128-bit integers: totals over long histories can
//! exceed what an `f64` represents exactly, so floating point never touches
//! these values.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
    string::FromUtf8Error,
};

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::model::{KeyId, ShieldedTransactionRecord, TxDirection, ViewingKeyProfile};

/// Export column order. Changing it breaks downstream spreadsheets.
pub const CSV_HEADER: [&str; 6] = ["label", "id", "received", "sent", "net", "count"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySummary {
    pub label: String,
    pub key_id: KeyId,
    #[serde(serialize_with = "as_decimal_string")]
    pub received: u128,
    #[serde(serialize_with = "as_decimal_string")]
    pub sent: u128,
    #[serde(serialize_with = "as_decimal_string")]
    pub net: i128,
    pub count: usize,
}

impl KeySummary {
    fn empty(profile: &ViewingKeyProfile) -> Self {
        Self {
            label: profile.label.clone(),
            key_id: profile.id.clone(),
            received: 0,
            sent: 0,
            net: 0,
            count: 0,
        }
    }

    fn add(&mut self, record: &ShieldedTransactionRecord) {
        let amount = u128::from(record.amount.atomic());
        match record.direction {
            TxDirection::In => self.received += amount,
            TxDirection::Out => self.sent += amount,
        }
        self.count += 1;
    }

    fn finish(mut self) -> Self {
        // u64 amounts summed per key stay far below i128::MAX.
        self.net = self.received as i128 - self.sent as i128;
        self
    }
}

fn as_decimal_string<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Display,
    S: Serializer,
{
    serializer.collect_str(value)
}

/// One summary per registered key, in registry order. Keys without records
/// report zeros; records owned by unknown keys are ignored.
pub fn summarize<'a>(
    keys: &[ViewingKeyProfile],
    records: impl IntoIterator<Item = &'a ShieldedTransactionRecord>,
) -> Vec<KeySummary> {
    let mut totals: HashMap<&KeyId, KeySummary> = keys
        .iter()
        .map(|profile| (&profile.id, KeySummary::empty(profile)))
        .collect();

    for record in records {
        if let Some(summary) = totals.get_mut(&record.key_id) {
            summary.add(record);
        }
    }

    keys.iter()
        .filter_map(|profile| totals.remove(&profile.id))
        .map(KeySummary::finish)
        .collect()
}

#[derive(Debug, Error)]
pub enum AuditExportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("export is not valid utf-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

/// Serializes summaries as `label,id,received,sent,net,count`. Text fields
/// are always quoted with embedded quotes doubled, even when they look
/// numeric; amount and count columns are never quoted.
pub fn export_csv(summaries: &[KeySummary]) -> Result<String, AuditExportError> {
    // Quoting is applied per column below, so the writer must not add its own.
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER.map(quote_text))?;
    for summary in summaries {
        writer.write_record([
            quote_text(&summary.label),
            quote_text(summary.key_id.as_str()),
            summary.received.to_string(),
            summary.sent.to_string(),
            summary.net.to_string(),
            summary.count.to_string(),
        ])?;
    }

    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

fn quote_text(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyFlow {
    pub received: u128,
    pub sent: u128,
    pub count: usize,
}

/// Buckets records by UTC block date for time-series charts.
pub fn daily_flows<'a>(
    records: impl IntoIterator<Item = &'a ShieldedTransactionRecord>,
) -> BTreeMap<NaiveDate, DailyFlow> {
    let mut days: BTreeMap<NaiveDate, DailyFlow> = BTreeMap::new();
    for record in records {
        let Some(time) = record.block_time() else {
            continue;
        };
        let day = days.entry(time.date_naive()).or_default();
        let amount = u128::from(record.amount.atomic());
        match record.direction {
            TxDirection::In => day.received += amount,
            TxDirection::Out => day.sent += amount,
        }
        day.count += 1;
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Amount, ShieldedPool};

    fn record(
        key: &str,
        txid: &str,
        amount: u64,
        direction: TxDirection,
        time: i64,
    ) -> ShieldedTransactionRecord {
        ShieldedTransactionRecord {
            txid: txid.to_string(),
            height: 1,
            time,
            amount: Amount::from_atomic(amount),
            direction,
            pool: ShieldedPool::Sapling,
            key_id: KeyId::from(key),
            memo: None,
        }
    }

    #[test]
    fn single_incoming_record() {
        let keys = vec![ViewingKeyProfile::new("k1", "Main", "uview1main")];
        let records = vec![record("k1", "tx", 150_000_000, TxDirection::In, 0)];

        let summaries = summarize(&keys, &records);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].received.to_string(), "150000000");
        assert_eq!(summaries[0].sent.to_string(), "0");
        assert_eq!(summaries[0].net.to_string(), "150000000");
        assert_eq!(summaries[0].count, 1);
    }

    #[test]
    fn keys_without_records_report_zeros() {
        let keys = vec![
            ViewingKeyProfile::new("k1", "Main", "uview1main"),
            ViewingKeyProfile::new("k2", "Idle", "uview1idle"),
        ];
        let records = vec![record("k1", "tx", 5, TxDirection::In, 0)];

        let summaries = summarize(&keys, &records);
        assert_eq!(summaries[1].key_id, KeyId::from("k2"));
        assert_eq!(
            (summaries[1].received, summaries[1].sent, summaries[1].net, summaries[1].count),
            (0, 0, 0, 0)
        );
        let json = serde_json::to_value(&summaries[1]).unwrap();
        assert_eq!(json["received"], "0");
        assert_eq!(json["net"], "0");
    }

    #[test]
    fn net_is_exact_past_float_precision() {
        let keys = vec![ViewingKeyProfile::new("k1", "Whale", "uview1whale")];
        let big = (1u64 << 53) + 1;
        let records = vec![
            record("k1", "a", big, TxDirection::In, 0),
            record("k1", "b", big, TxDirection::In, 0),
            record("k1", "c", 1, TxDirection::Out, 0),
            record("k1", "d", u64::MAX, TxDirection::In, 0),
        ];

        let summary = &summarize(&keys, &records)[0];
        let expected_received = 2 * u128::from(big) + u128::from(u64::MAX);
        assert_eq!(summary.received, expected_received);
        assert_eq!(summary.net, expected_received as i128 - 1);
    }

    #[test]
    fn net_may_be_negative() {
        let keys = vec![ViewingKeyProfile::new("k1", "Spender", "uview1s")];
        let records = vec![
            record("k1", "a", 10, TxDirection::In, 0),
            record("k1", "b", 25, TxDirection::Out, 0),
        ];
        assert_eq!(summarize(&keys, &records)[0].net, -15);
    }

    #[test]
    fn csv_has_fixed_columns_and_escapes_text() {
        let summaries = vec![KeySummary {
            label: "Cold \"vault\", A".into(),
            key_id: KeyId::from("k1"),
            received: 10,
            sent: 25,
            net: -15,
            count: 2,
        }];

        let csv = export_csv(&summaries).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("\"label\",\"id\",\"received\",\"sent\",\"net\",\"count\"")
        );
        assert_eq!(
            lines.next(),
            Some("\"Cold \"\"vault\"\", A\",\"k1\",10,25,-15,2")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn csv_quotes_numeric_looking_text() {
        let summaries = vec![KeySummary {
            label: "2024".into(),
            key_id: KeyId::from("42"),
            received: 7,
            sent: 0,
            net: 7,
            count: 1,
        }];

        let csv = export_csv(&summaries).unwrap();
        assert_eq!(csv.lines().nth(1), Some("\"2024\",\"42\",7,0,7,1"));
    }

    #[test]
    fn daily_flows_bucket_by_utc_date() {
        let day_one = 1_700_000_000; // 2023-11-14
        let records = vec![
            record("k1", "a", 5, TxDirection::In, day_one),
            record("k1", "b", 2, TxDirection::Out, day_one + 60),
            record("k1", "c", 7, TxDirection::In, day_one + 86_400),
        ];

        let days = daily_flows(&records);
        let first = NaiveDate::from_ymd_opt(2023, 11, 14).unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(
            days[&first],
            DailyFlow {
                received: 5,
                sent: 2,
                count: 2
            }
        );
    }
}
