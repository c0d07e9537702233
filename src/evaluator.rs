//! Keep/remove decisions for single records.
//!
//! A record is kept when any of its populated timestamp fields falls inside
//! the policy's range, when it carries no usable timestamp at all, or when it
//! is deleted and deleted items are exempt. Child records (chat messages) are
//! decided on their own fields, independently of their container.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::category::{Category, ALL_TIMESTAMP_FIELDS, TIME_CONTACTED};
use crate::extraction::Record;
use crate::policy::{DateRange, Policy};
use crate::timestamp::{
    parse_exif_capture_time, parse_exif_date_time, parse_timestamp, Timestamp, TimestampError,
};

pub const EXIF_CAPTURE_TIME: &str = "EXIFCaptureTime";
pub const EXIF_DATE_TIME: &str = "DateTime";

/// Category messages nested in a container are evaluated as.
pub const MESSAGE_CATEGORY: Category = Category::InstantMessage;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("field `{field}` holds {found} where a timestamp was expected")]
    UnexpectedValue { field: String, found: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Keep,
    Remove,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Keep => f.write_str("Keeping"),
            Verdict::Remove => f.write_str("Removing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reason {
    DeletedExempt,
    WithinRange,
    NoTimestamps,
    OutsideRange,
    EvaluationFailed { error: String },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::DeletedExempt => f.write_str("deleted, not date filtered"),
            Reason::WithinRange => f.write_str("a timestamp is within range"),
            Reason::NoTimestamps => f.write_str("no timestamps recorded"),
            Reason::OutsideRange => f.write_str("every timestamp is outside range"),
            Reason::EvaluationFailed { error } => write!(f, "evaluation failed: {}", error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FieldStatus {
    Within,
    Outside,
    Unparseable { error: String },
}

/// One timestamp the evaluator looked at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldTrace {
    pub field: String,
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Timestamp>,
    #[serde(flatten)]
    pub status: FieldStatus,
}

impl fmt::Display for FieldTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.value) {
            (FieldStatus::Within, Some(ts)) => write!(f, "{}: {} within range", self.field, ts),
            (FieldStatus::Outside, Some(ts)) => write!(f, "{}: {} outside range", self.field, ts),
            (FieldStatus::Unparseable { error }, _) => {
                write!(f, "{}: `{}` ignored ({})", self.field, self.raw, error)
            }
            (_, None) => write!(f, "{}: `{}`", self.field, self.raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub id: String,
    pub category: Category,
    pub verdict: Verdict,
    pub reason: Reason,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<FieldTrace>,
}

impl Evaluation {
    pub fn is_keep(&self) -> bool {
        self.verdict == Verdict::Keep
    }
}

/// A container's own evaluation plus one per nested message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordEvaluation {
    pub record: Evaluation,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Evaluation>,
}

// Per-record state threaded through field inspection.
pub(crate) struct Accumulator<'a> {
    range: &'a DateRange,
    populated: bool,
    within: bool,
    trace: Vec<FieldTrace>,
}

impl<'a> Accumulator<'a> {
    pub(crate) fn new(range: &'a DateRange) -> Self {
        Self {
            range,
            populated: false,
            within: false,
            trace: Vec::new(),
        }
    }

    pub(crate) fn observe<F>(&mut self, field: &str, raw: &str, parse: F)
    where
        F: Fn(&str) -> Result<Timestamp, TimestampError>,
    {
        // blank strings are as good as null
        if raw.trim().is_empty() {
            return;
        }

        let (value, status) = match parse(raw) {
            Ok(ts) => {
                self.populated = true;
                if self.range.contains(&ts) {
                    self.within = true;
                    (Some(ts), FieldStatus::Within)
                } else {
                    (Some(ts), FieldStatus::Outside)
                }
            }
            Err(e) => (
                None,
                FieldStatus::Unparseable {
                    error: e.to_string(),
                },
            ),
        };

        self.trace.push(FieldTrace {
            field: field.to_string(),
            raw: raw.to_string(),
            value,
            status,
        });
    }

    pub(crate) fn finish(self, id: String, category: Category) -> Evaluation {
        let (verdict, reason) = if self.within {
            (Verdict::Keep, Reason::WithinRange)
        } else if !self.populated {
            (Verdict::Keep, Reason::NoTimestamps)
        } else {
            (Verdict::Remove, Reason::OutsideRange)
        };

        Evaluation {
            id,
            category,
            verdict,
            reason,
            trace: self.trace,
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Applies a [`Policy`] to records.
///
/// Field tables are resolved per category once, at construction, with the
/// `TimeContacted` exemption already applied.
#[derive(Debug, Clone)]
pub struct Evaluator {
    policy: Policy,
    tables: HashMap<Category, Vec<&'static str>>,
    generic: Vec<&'static str>,
}

impl Evaluator {
    pub fn new(policy: Policy) -> Self {
        let resolve = |fields: &'static [&'static str]| -> Vec<&'static str> {
            fields
                .iter()
                .copied()
                .filter(|field| !(policy.exempt_contact_last_seen && *field == TIME_CONTACTED))
                .collect()
        };

        let tables = Category::KNOWN
            .iter()
            .map(|category| (category.clone(), resolve(category.timestamp_fields())))
            .collect();
        let generic = resolve(ALL_TIMESTAMP_FIELDS);

        Self {
            policy,
            tables,
            generic,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn fields_for(&self, category: &Category) -> &[&'static str] {
        self.tables
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(self.generic.as_slice())
    }

    /// Evaluates `record` against the fields of `category`.
    ///
    /// Never fails: a record that cannot be evaluated is kept, with the
    /// failure recorded as its reason.
    pub fn evaluate(&self, record: &Record, category: &Category) -> Evaluation {
        self.try_evaluate(record, category)
            .unwrap_or_else(|err| Evaluation {
                id: record.id.clone(),
                category: category.clone(),
                verdict: Verdict::Keep,
                reason: Reason::EvaluationFailed {
                    error: err.to_string(),
                },
                trace: Vec::new(),
            })
    }

    pub fn evaluate_data_file(&self, record: &Record) -> Evaluation {
        self.evaluate(record, &Category::DataFile)
    }

    pub fn evaluate_model(&self, record: &Record) -> RecordEvaluation {
        let children = record
            .messages
            .iter()
            .flatten()
            .map(|message| self.evaluate(message, &MESSAGE_CATEGORY))
            .collect();

        RecordEvaluation {
            record: self.evaluate(record, &record.model_category()),
            children,
        }
    }

    fn try_evaluate(
        &self,
        record: &Record,
        category: &Category,
    ) -> Result<Evaluation, EvaluationError> {
        if record.is_deleted() && self.policy.exempt_deleted {
            return Ok(Evaluation {
                id: record.id.clone(),
                category: category.clone(),
                verdict: Verdict::Keep,
                reason: Reason::DeletedExempt,
                trace: Vec::new(),
            });
        }

        let unexpected = |field: &str, value: &Value| EvaluationError::UnexpectedValue {
            field: field.to_string(),
            found: value_kind(value),
        };

        let mut acc = Accumulator::new(&self.policy.range);

        for field in self.fields_for(category) {
            match record.fields.get(*field) {
                None | Some(Value::Null) => {}
                Some(Value::String(raw)) => acc.observe(field, raw, parse_timestamp),
                Some(Value::Array(items)) => {
                    for item in items {
                        match item {
                            Value::Null => {}
                            Value::String(raw) => acc.observe(field, raw, parse_timestamp),
                            other => return Err(unexpected(field, other)),
                        }
                    }
                }
                Some(other) => return Err(unexpected(field, other)),
            }
        }

        for meta in &record.metadata {
            let Some(raw) = meta.value.as_deref() else {
                continue;
            };
            match meta.name.as_str() {
                EXIF_CAPTURE_TIME => acc.observe(EXIF_CAPTURE_TIME, raw, parse_exif_capture_time),
                EXIF_DATE_TIME => acc.observe(EXIF_DATE_TIME, raw, parse_exif_date_time),
                _ => {}
            }
        }

        Ok(acc.finish(record.id.clone(), category.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::MetaDataField;
    use proptest::prelude::*;
    use serde_json::json;

    fn day() -> DateRange {
        DateRange::parse("2015-02-20T00:00:00-08:00", "2015-02-20T23:59:59-08:00")
            .unwrap_or_else(|e| panic!("{e}"))
    }

    fn evaluator() -> Evaluator {
        Evaluator::new(Policy::new(day()))
    }

    fn record(category: &str, fields: Value) -> Record {
        serde_json::from_value(json!({
            "id": "r1",
            "category": category,
            "fields": fields,
        }))
        .unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn creation_time_within_range_is_kept() {
        let file = record("Image", json!({"CreationTime": "2015-02-20T10:00:00-08:00"}));
        let eval = evaluator().evaluate_data_file(&file);
        assert_eq!(eval.verdict, Verdict::Keep);
        assert_eq!(eval.reason, Reason::WithinRange);
        assert_eq!(eval.trace.len(), 1);
        assert_eq!(eval.trace[0].status, FieldStatus::Within);
    }

    #[test]
    fn creation_time_the_evening_before_is_removed() {
        let file = record("Image", json!({"CreationTime": "2015-02-19T23:59:00-08:00"}));
        let eval = evaluator().evaluate_data_file(&file);
        assert_eq!(eval.verdict, Verdict::Remove);
        assert_eq!(eval.reason, Reason::OutsideRange);
    }

    #[test]
    fn any_field_within_range_keeps() {
        let file = record(
            "Image",
            json!({
                "CreationTime": "2014-01-01T00:00:00Z",
                "ModifyTime": "2015-02-20T12:00:00-08:00",
                "AccessTime": "2016-01-01T00:00:00Z",
            }),
        );
        let eval = evaluator().evaluate_data_file(&file);
        assert_eq!(eval.verdict, Verdict::Keep);
        assert_eq!(eval.trace.len(), 3);
    }

    #[test]
    fn exif_capture_time_within_range_is_kept() {
        let mut file = record("Image", json!({"CreationTime": "2014-01-01T00:00:00Z"}));
        file.metadata.push(MetaDataField {
            name: EXIF_CAPTURE_TIME.to_string(),
            value: Some("02/20/2015 11:30:00 PM".to_string()),
        });

        // 23:30 UTC is 15:30 PST, inside the day
        let eval = evaluator().evaluate_data_file(&file);
        assert_eq!(eval.verdict, Verdict::Keep);
        let exif = &eval.trace[1];
        assert_eq!(exif.field, EXIF_CAPTURE_TIME);
        assert_eq!(exif.status, FieldStatus::Within);
        assert_eq!(
            exif.value.map(|ts| ts.naive_local().to_string()),
            Some("2015-02-20 23:30:00".to_string())
        );
    }

    #[test]
    fn exif_date_time_with_hour_24() {
        let mut file = record("Image", json!({}));
        file.metadata.push(MetaDataField {
            name: EXIF_DATE_TIME.to_string(),
            value: Some("2015:02:20 24:44:06-08:00".to_string()),
        });
        let eval = evaluator().evaluate_data_file(&file);
        assert_eq!(eval.verdict, Verdict::Keep);
        assert_eq!(eval.reason, Reason::WithinRange);
    }

    #[test]
    fn unrelated_metadata_is_ignored() {
        let mut file = record("Image", json!({"CreationTime": "2014-01-01T00:00:00Z"}));
        file.metadata.push(MetaDataField {
            name: "Make".to_string(),
            value: Some("02/20/2015 11:30:00 PM".to_string()),
        });
        assert_eq!(evaluator().evaluate_data_file(&file).verdict, Verdict::Remove);
    }

    #[test]
    fn malformed_strings_count_as_absent() {
        let only_garbage = record("SMS", json!({"TimeStamp": "not a date"}));
        let eval = evaluator().evaluate_model(&only_garbage).record;
        assert_eq!(eval.verdict, Verdict::Keep);
        assert_eq!(eval.reason, Reason::NoTimestamps);
        assert!(matches!(
            eval.trace[0].status,
            FieldStatus::Unparseable { .. }
        ));

        let garbage_and_old = record(
            "SMS",
            json!({"TimeStamp": "not a date", "AllTimeStamps": ["2014-01-01T00:00:00Z"]}),
        );
        let eval = evaluator().evaluate_model(&garbage_and_old).record;
        assert_eq!(eval.verdict, Verdict::Remove);
    }

    #[test]
    fn list_fields_are_each_checked() {
        let sms = record(
            "SMS",
            json!({"AllTimeStamps": [null, "2014-01-01T00:00:00Z", "2015-02-20T09:00:00-08:00"]}),
        );
        let eval = evaluator().evaluate_model(&sms).record;
        assert_eq!(eval.verdict, Verdict::Keep);
        assert_eq!(eval.trace.len(), 2);
    }

    #[test]
    fn fields_outside_the_category_table_are_not_consulted() {
        // Duration is not a timestamp and Contact has no CreationTime
        let voicemail = record("Voicemail", json!({"Duration": "2014-01-01T00:00:00Z"}));
        assert_eq!(
            evaluator().evaluate_model(&voicemail).record.reason,
            Reason::NoTimestamps
        );
        let contact = record("Contact", json!({"CreationTime": "2014-01-01T00:00:00Z"}));
        assert_eq!(
            evaluator().evaluate_model(&contact).record.reason,
            Reason::NoTimestamps
        );
    }

    #[test]
    fn time_contacted_is_exempt_by_default() {
        let contact = record("Contact", json!({"TimeContacted": "2014-01-01T00:00:00Z"}));
        let eval = evaluator().evaluate_model(&contact).record;
        assert_eq!(eval.verdict, Verdict::Keep);
        assert_eq!(eval.reason, Reason::NoTimestamps);

        let strict = Evaluator::new(Policy::new(day()).exempt_contact_last_seen(false));
        assert_eq!(strict.evaluate_model(&contact).record.verdict, Verdict::Remove);
    }

    #[test]
    fn unknown_models_use_every_known_field() {
        let event = record("Data.Models.FitnessEvent", json!({"EndTime": "2014-01-01T00:00:00Z"}));
        let eval = evaluator().evaluate_model(&event).record;
        assert_eq!(eval.category, Category::Other("FitnessEvent".to_string()));
        assert_eq!(eval.verdict, Verdict::Remove);
    }

    #[test]
    fn deleted_items_are_exempt_unless_asked() {
        let mut old = record("Call", json!({"TimeStamp": "2014-01-01T00:00:00Z"}));
        old.deleted = Some(json!(true));

        let eval = evaluator().evaluate_model(&old).record;
        assert_eq!(eval.verdict, Verdict::Keep);
        assert_eq!(eval.reason, Reason::DeletedExempt);

        let strict = Evaluator::new(Policy::new(day()).exempt_deleted(false));
        assert_eq!(strict.evaluate_model(&old).record.verdict, Verdict::Remove);
    }

    #[test]
    fn unexpected_value_fails_open() {
        let odd = record("Call", json!({"TimeStamp": 1424451600}));
        let eval = evaluator().evaluate_model(&odd).record;
        assert_eq!(eval.verdict, Verdict::Keep);
        assert!(matches!(eval.reason, Reason::EvaluationFailed { .. }));

        let odd_item = record("SMS", json!({"AllTimeStamps": [{"value": "x"}]}));
        let eval = evaluator().evaluate_model(&odd_item).record;
        assert_eq!(eval.verdict, Verdict::Keep);
        assert!(matches!(eval.reason, Reason::EvaluationFailed { .. }));
    }

    #[test]
    fn chat_messages_are_decided_independently() {
        let chat: Record = serde_json::from_value(json!({
            "id": "chat-1",
            "category": "Chat",
            "fields": {
                "StartTime": "2015-01-01T08:00:00-08:00",
                "LastActivity": "2015-01-31T08:00:00-08:00",
            },
            "messages": [
                {"id": "m1", "fields": {"TimeStamp": "2015-01-01T08:00:00-08:00"}},
                {"id": "m2", "fields": {"TimeStamp": "2015-02-20T13:15:00-08:00"}},
                {"id": "m3", "fields": {"DateRead": "2015-03-01T08:00:00-08:00"}},
                {"id": "m4", "fields": {}},
            ],
        }))
        .unwrap_or_else(|e| panic!("{e}"));

        let eval = evaluator().evaluate_model(&chat);
        assert_eq!(eval.record.category, Category::Chat);
        assert_eq!(eval.record.verdict, Verdict::Remove);

        let verdicts: Vec<(&str, Verdict)> = eval
            .children
            .iter()
            .map(|c| (c.id.as_str(), c.verdict))
            .collect();
        assert_eq!(
            verdicts,
            vec![
                ("m1", Verdict::Remove),
                ("m2", Verdict::Keep),
                ("m3", Verdict::Remove),
                ("m4", Verdict::Keep),
            ]
        );
        assert!(eval
            .children
            .iter()
            .all(|c| c.category == MESSAGE_CATEGORY));
    }

    #[test]
    fn deleted_message_does_not_shield_siblings() {
        let chat: Record = serde_json::from_value(json!({
            "id": "chat-1",
            "category": "Chat",
            "fields": {"StartTime": "2015-02-20T08:00:00-08:00"},
            "messages": [
                {"id": "m1", "deleted": "Deleted", "fields": {"TimeStamp": "2014-01-01T08:00:00Z"}},
                {"id": "m2", "fields": {"TimeStamp": "2014-01-01T08:00:00Z"}},
            ],
        }))
        .unwrap_or_else(|e| panic!("{e}"));

        let eval = evaluator().evaluate_model(&chat);
        assert_eq!(eval.record.verdict, Verdict::Keep);
        assert_eq!(eval.children[0].reason, Reason::DeletedExempt);
        assert_eq!(eval.children[1].verdict, Verdict::Remove);
    }

    #[test]
    fn trace_lines_read_well() {
        let file = record("Image", json!({"CreationTime": "2015-02-20T10:00:00-08:00"}));
        let eval = evaluator().evaluate_data_file(&file);
        assert_eq!(
            eval.trace[0].to_string(),
            "CreationTime: 2015-02-20 10:00:00 -08:00 within range"
        );
    }

    fn arb_category() -> impl Strategy<Value = Category> {
        prop::sample::select(Category::KNOWN.to_vec())
    }

    fn arb_flags() -> impl Strategy<Value = (bool, bool)> {
        (any::<bool>(), any::<bool>())
    }

    // seconds relative to the start of the range
    fn arb_inside() -> impl Strategy<Value = i64> {
        0i64..86_400
    }

    fn arb_outside() -> impl Strategy<Value = i64> {
        prop_oneof![-400_000_000i64..0, 86_400i64..400_000_000]
    }

    fn at_offset(secs: i64) -> String {
        (day().start() + chrono::Duration::seconds(secs)).to_rfc3339()
    }

    fn populated(category: &Category, fields: &[&str], values: &[String]) -> Record {
        let map: serde_json::Map<String, Value> = fields
            .iter()
            .zip(values.iter().cycle())
            .map(|(f, v)| (f.to_string(), json!(v)))
            .collect();
        record(category.name(), Value::Object(map))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn no_timestamps_always_keeps(category in arb_category(), deleted in any::<bool>(), (ed, ec) in arb_flags()) {
            let evaluator = Evaluator::new(Policy::new(day()).exempt_deleted(ed).exempt_contact_last_seen(ec));
            let nulls: serde_json::Map<String, Value> = category
                .timestamp_fields()
                .iter()
                .map(|f| (f.to_string(), Value::Null))
                .collect();
            let mut rec = record(category.name(), Value::Object(nulls));
            rec.deleted = Some(Value::Bool(deleted));
            prop_assert!(evaluator.evaluate(&rec, &category).is_keep());
        }

        #[test]
        fn exempt_deleted_always_keeps(category in arb_category(), secs in prop::collection::vec(arb_outside(), 1..5)) {
            let evaluator = Evaluator::new(Policy::new(day()));
            let values: Vec<String> = secs.into_iter().map(at_offset).collect();
            let mut rec = populated(&category, evaluator.fields_for(&category), &values);
            rec.deleted = Some(json!("Deleted"));
            let eval = evaluator.evaluate(&rec, &category);
            prop_assert_eq!(eval.verdict, Verdict::Keep);
            prop_assert_eq!(eval.reason, Reason::DeletedExempt);
        }

        #[test]
        fn one_inside_rest_absent_keeps(category in arb_category(), inside in arb_inside(), pick in any::<prop::sample::Index>(), (ed, ec) in arb_flags()) {
            let evaluator = Evaluator::new(Policy::new(day()).exempt_deleted(ed).exempt_contact_last_seen(ec));
            let fields = evaluator.fields_for(&category);
            prop_assume!(!fields.is_empty());
            let field = fields[pick.index(fields.len())];
            let rec = populated(&category, &[field], &[at_offset(inside)]);
            let eval = evaluator.evaluate(&rec, &category);
            prop_assert_eq!(eval.verdict, Verdict::Keep);
            prop_assert_eq!(eval.reason, Reason::WithinRange);
        }

        #[test]
        fn all_outside_removes(category in arb_category(), secs in prop::collection::vec(arb_outside(), 1..5), deleted in any::<bool>(), ec in any::<bool>()) {
            let evaluator = Evaluator::new(Policy::new(day()).exempt_deleted(false).exempt_contact_last_seen(ec));
            let fields = evaluator.fields_for(&category);
            prop_assume!(!fields.is_empty());
            let values: Vec<String> = secs.into_iter().map(at_offset).collect();
            let mut rec = populated(&category, fields, &values);
            rec.deleted = Some(Value::Bool(deleted));
            let eval = evaluator.evaluate(&rec, &category);
            prop_assert_eq!(eval.verdict, Verdict::Remove);
            prop_assert_eq!(eval.reason, Reason::OutsideRange);
        }
    }
}
