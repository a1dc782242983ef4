//! Field-level change detection between two versions of a reservation.
//!
//! Values are compared according to the field's [`FieldKind`]. Empty
//! representations are interchangeable for every kind. Lists compare as sets,
//! numbers compare numerically across number/string encodings, and date-times
//! and times of day compare after normalisation. Everything else compares as
//! strings.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{borrow::Cow, collections::BTreeSet};

mod format;

pub use format::{describe_changes, format_change_value, ValueFormatter, NOT_SET};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    DateTime,
    TimeOfDay,
    List,
    Flag,
    Object,
}

/// 通知対象となるフィールドの定義
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifiableField {
    pub field: &'static str,
    pub display_name: &'static str,
    pub kind: FieldKind,
}

impl NotifiableField {
    pub const fn new(field: &'static str, display_name: &'static str, kind: FieldKind) -> Self {
        Self {
            field,
            display_name,
            kind,
        }
    }

    pub fn find(field: &str) -> Option<&'static NotifiableField> {
        NOTIFIABLE_FIELDS.iter().find(|f| f.field == field)
    }
}

pub const NOTIFIABLE_FIELDS: &[NotifiableField] = &[
    NotifiableField::new("eventTitle", "Event Title", FieldKind::Text),
    NotifiableField::new("eventDescription", "Description", FieldKind::Text),
    NotifiableField::new("startDateTime", "Start Time", FieldKind::DateTime),
    NotifiableField::new("endDateTime", "End Time", FieldKind::DateTime),
    NotifiableField::new("attendeeCount", "Attendee Count", FieldKind::Number),
    NotifiableField::new("requestedRooms", "Locations", FieldKind::List),
    NotifiableField::new("setupTime", "Setup Time", FieldKind::TimeOfDay),
    NotifiableField::new("teardownTime", "Teardown Time", FieldKind::TimeOfDay),
    NotifiableField::new("doorOpenTime", "Door Open Time", FieldKind::TimeOfDay),
    NotifiableField::new("doorCloseTime", "Door Close Time", FieldKind::TimeOfDay),
    NotifiableField::new("specialRequirements", "Special Requirements", FieldKind::Text),
    NotifiableField::new("assignedTo", "Assigned To", FieldKind::Text),
    NotifiableField::new("categories", "Categories", FieldKind::List),
    NotifiableField::new("isOffsite", "Offsite", FieldKind::Flag),
    NotifiableField::new("offsiteName", "Offsite Location", FieldKind::Text),
    NotifiableField::new("offsiteAddress", "Offsite Address", FieldKind::Text),
    NotifiableField::new("contact", "Contact", FieldKind::Object),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
    pub display_name: String,
}

/// `modified` に含まれる許可リスト上のフィールドについて、
/// `original` と意味的に異なるものだけを返す。
/// `modified` にキー自体が無いフィールドは「送られていない」とみなして比較しない
pub fn detect_changes(
    original: &Value,
    modified: &Value,
    allow_list: &[NotifiableField],
) -> Vec<FieldChange> {
    allow_list
        .iter()
        .filter_map(|f| {
            let new_value = modified.get(f.field)?;
            let old_value = original.get(f.field);
            (!values_equal(f.kind, old_value, Some(new_value))).then(|| FieldChange {
                field: f.field.to_string(),
                old_value: old_value.cloned().unwrap_or(Value::Null),
                new_value: new_value.clone(),
                display_name: f.display_name.to_string(),
            })
        })
        .collect()
}

pub fn values_equal(kind: FieldKind, a: Option<&Value>, b: Option<&Value>) -> bool {
    match (non_empty(a), non_empty(b)) {
        (None, None) => true,
        (Some(a), Some(b)) => non_empty_equal(kind, a, b),
        _ => false,
    }
}

pub(crate) fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn non_empty(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !is_empty_value(v))
}

fn non_empty_equal(kind: FieldKind, a: &Value, b: &Value) -> bool {
    match (kind, a, b) {
        (FieldKind::List, Value::Array(x), Value::Array(y)) => element_set(x) == element_set(y),
        (_, Value::Array(_), _) | (_, _, Value::Array(_)) => false,
        (FieldKind::Number, _, _) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => scalar_string(a) == scalar_string(b),
        },
        (FieldKind::DateTime | FieldKind::TimeOfDay, Value::String(x), Value::String(y)) => {
            x == y || normalize_temporal(x) == normalize_temporal(y)
        }
        // serde_json の Map はキー順に依存せず比較される
        (FieldKind::Object, Value::Object(_), Value::Object(_)) => a == b,
        _ => scalar_string(a) == scalar_string(b),
    }
}

fn element_set(values: &[Value]) -> BTreeSet<Cow<'_, str>> {
    values.iter().map(scalar_string).collect()
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn scalar_string(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        Value::Null => Cow::Borrowed(""),
        other => Cow::Owned(other.to_string()),
    }
}

/// 秒を省略した日時 (`...T10:00`) やオフセット付きの日時を正規化する。
/// 日時として読めない文字列はそのまま返す
pub(crate) fn normalize_temporal(value: &str) -> Cow<'_, str> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Cow::Owned(format_date_time(&dt.with_timezone(&Utc).naive_utc()) + "Z");
    }
    const FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
    if let Some(dt) = FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
    {
        return Cow::Owned(format_date_time(&dt));
    }
    if let Some(t) = crate::model::reservation::fields::parse_time_of_day(value) {
        return Cow::Owned(t.format("%H:%M:%S").to_string());
    }
    Cow::Borrowed(value)
}

fn format_date_time(dt: &NaiveDateTime) -> String {
    if dt.nanosecond() == 0 {
        dt.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S%.9f").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn field(name: &'static str) -> [NotifiableField; 1] {
        [NotifiableField::find(name)
            .copied()
            .unwrap_or(NotifiableField::new(name, name, FieldKind::Text))]
    }

    #[rstest]
    #[case::empty_list_vs_missing(json!({"locations": []}), json!({}), "locations")]
    #[case::empty_list_vs_explicit_null(json!({"locations": []}), json!({"locations": null}), "locations")]
    #[case::null_vs_empty_list(json!({"locations": null}), json!({"locations": []}), "locations")]
    #[case::empty_string_vs_null(json!({"offsiteName": ""}), json!({"offsiteName": null}), "offsiteName")]
    #[case::number_vs_numeric_string(json!({"attendeeCount": 50}), json!({"attendeeCount": "50"}), "attendeeCount")]
    #[case::float_vs_integer(json!({"attendeeCount": 50.0}), json!({"attendeeCount": 50}), "attendeeCount")]
    #[case::numeric_strings(json!({"attendeeCount": "50"}), json!({"attendeeCount": "50.0"}), "attendeeCount")]
    #[case::padded_numeric_string(json!({"attendeeCount": " 50 "}), json!({"attendeeCount": 50}), "attendeeCount")]
    #[case::minutes_vs_seconds(
        json!({"startDateTime": "2026-02-18T10:00"}),
        json!({"startDateTime": "2026-02-18T10:00:00"}),
        "startDateTime"
    )]
    #[case::zero_fraction(
        json!({"startDateTime": "2026-02-18T10:00:00.000"}),
        json!({"startDateTime": "2026-02-18T10:00"}),
        "startDateTime"
    )]
    #[case::offsets_same_instant(
        json!({"startDateTime": "2026-02-18T10:00:00+09:00"}),
        json!({"startDateTime": "2026-02-18T01:00:00Z"}),
        "startDateTime"
    )]
    #[case::time_of_day(json!({"setupTime": "09:30"}), json!({"setupTime": "09:30:00"}), "setupTime")]
    #[case::text_same_string(json!({"eventTitle": "Gala"}), json!({"eventTitle": "Gala"}), "eventTitle")]
    #[case::list_order(json!({"categories": ["a", "b"]}), json!({"categories": ["b", "a"]}), "categories")]
    #[case::list_element_types(json!({"requestedRooms": [1, 2]}), json!({"requestedRooms": ["2", "1"]}), "requestedRooms")]
    #[case::flag_vs_string(json!({"isOffsite": true}), json!({"isOffsite": "true"}), "isOffsite")]
    #[case::object_key_order(
        json!({"contact": {"name": "N", "email": "e@x"}}),
        json!({"contact": {"email": "e@x", "name": "N"}}),
        "contact"
    )]
    fn equivalent_values_produce_no_change(
        #[case] original: Value,
        #[case] modified: Value,
        #[case] name: &'static str,
    ) {
        assert!(detect_changes(&original, &modified, &field(name)).is_empty());
    }

    #[rstest]
    #[case::list_grows(json!({"categories": ["a"]}), json!({"categories": ["a", "b"]}), "categories")]
    #[case::count_changes(json!({"attendeeCount": 50}), json!({"attendeeCount": 75}), "attendeeCount")]
    #[case::cleared(json!({"offsiteName": "Hall"}), json!({"offsiteName": null}), "offsiteName")]
    #[case::set_from_empty(json!({"offsiteName": ""}), json!({"offsiteName": "Hall"}), "offsiteName")]
    #[case::time_moves(
        json!({"startDateTime": "2026-02-18T10:00"}),
        json!({"startDateTime": "2026-02-18T10:30:00"}),
        "startDateTime"
    )]
    #[case::text_case_matters(json!({"eventTitle": "Gala"}), json!({"eventTitle": "gala"}), "eventTitle")]
    #[case::non_numeric_string(json!({"attendeeCount": 50}), json!({"attendeeCount": "fifty"}), "attendeeCount")]
    #[case::text_that_looks_like_time(
        json!({"specialRequirements": "10:00"}),
        json!({"specialRequirements": "10:00:00"}),
        "specialRequirements"
    )]
    #[case::text_that_looks_like_number(json!({"eventTitle": "50"}), json!({"eventTitle": "50.0"}), "eventTitle")]
    #[case::time_of_day_moves(json!({"setupTime": "09:30"}), json!({"setupTime": "09:45:00"}), "setupTime")]
    #[case::list_vs_scalar(json!({"categories": ["a"]}), json!({"categories": "a"}), "categories")]
    #[case::flag_flips(json!({"isOffsite": true}), json!({"isOffsite": false}), "isOffsite")]
    #[case::object_value_changes(
        json!({"contact": {"name": "N", "email": "e@x"}}),
        json!({"contact": {"name": "N", "email": "f@x"}}),
        "contact"
    )]
    fn differing_values_produce_one_change(
        #[case] original: Value,
        #[case] modified: Value,
        #[case] name: &'static str,
    ) {
        let changes = detect_changes(&original, &modified, &field(name));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, name);
        assert_eq!(changes[0].new_value, modified[name]);
    }

    #[test]
    fn fields_outside_allow_list_or_not_sent_are_ignored() {
        let original = json!({"eventTitle": "Gala", "attendeeCount": 50, "internal": 1});
        let modified = json!({"internal": 2, "attendeeCount": 75});
        let changes = detect_changes(&original, &modified, NOTIFIABLE_FIELDS);
        assert_eq!(
            changes,
            vec![FieldChange {
                field: "attendeeCount".into(),
                old_value: json!(50),
                new_value: json!(75),
                display_name: "Attendee Count".into(),
            }]
        );
    }

    #[test]
    fn changes_follow_allow_list_order() {
        let original = json!({"categories": ["a"], "eventTitle": "Gala"});
        let modified = json!({"categories": ["b"], "eventTitle": "Dinner"});
        let fields: Vec<_> = detect_changes(&original, &modified, NOTIFIABLE_FIELDS)
            .into_iter()
            .map(|c| c.field)
            .collect();
        assert_eq!(fields, vec!["eventTitle", "categories"]);
    }

    #[test]
    fn equality_follows_field_kind() {
        let (a, b) = (json!("10:00"), json!("10:00:00"));
        assert!(values_equal(FieldKind::TimeOfDay, Some(&a), Some(&b)));
        assert!(!values_equal(FieldKind::Text, Some(&a), Some(&b)));
        let (a, b) = (json!("50"), json!("50.0"));
        assert!(values_equal(FieldKind::Number, Some(&a), Some(&b)));
        assert!(!values_equal(FieldKind::Text, Some(&a), Some(&b)));
        assert!(values_equal(FieldKind::Number, None, Some(&json!(""))));
    }

    #[test]
    fn missing_original_reports_null_old_value() {
        let changes = detect_changes(&json!({}), &json!({"assignedTo": "Sam"}), NOTIFIABLE_FIELDS);
        assert_eq!(changes[0].old_value, Value::Null);
    }
}
