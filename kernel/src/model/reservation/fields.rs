use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use shared::error::{AppError, AppResult};

/// 予約の業務フィールドのうち、レビュー担当者が編集できるもの
pub const EDITABLE_FIELDS: &[&str] = &[
    "eventTitle",
    "eventDescription",
    "startDateTime",
    "endDateTime",
    "attendeeCount",
    "requestedRooms",
    "setupTime",
    "teardownTime",
    "doorOpenTime",
    "doorCloseTime",
    "specialRequirements",
    "assignedTo",
    "categories",
    "isOffsite",
    "offsiteName",
    "offsiteAddress",
    "contact",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationFields {
    pub event_title: String,
    #[serde(default)]
    pub event_description: Option<String>,
    #[serde(with = "wall_clock")]
    pub start_date_time: NaiveDateTime,
    #[serde(with = "wall_clock")]
    pub end_date_time: NaiveDateTime,
    #[serde(default, deserialize_with = "number_or_numeric_string")]
    pub attendee_count: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub requested_rooms: Vec<String>,
    #[serde(default)]
    pub setup_time: Option<String>,
    #[serde(default)]
    pub teardown_time: Option<String>,
    #[serde(default)]
    pub door_open_time: Option<String>,
    #[serde(default)]
    pub door_close_time: Option<String>,
    #[serde(default)]
    pub special_requirements: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub categories: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_offsite: bool,
    #[serde(default)]
    pub offsite_name: Option<String>,
    #[serde(default)]
    pub offsite_address: Option<String>,
    #[serde(default)]
    pub contact: Option<ContactPerson>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPerson {
    pub name: String,
    pub email: String,
}

impl ReservationFields {
    pub fn validate(&self) -> AppResult<()> {
        if self.event_title.trim().is_empty() {
            return Err(AppError::UnprocessableEntity(
                "eventTitle must not be empty".into(),
            ));
        }
        if self.end_date_time <= self.start_date_time {
            return Err(AppError::UnprocessableEntity(
                "endDateTime must be after startDateTime".into(),
            ));
        }
        for (name, value) in [
            ("setupTime", &self.setup_time),
            ("teardownTime", &self.teardown_time),
            ("doorOpenTime", &self.door_open_time),
            ("doorCloseTime", &self.door_close_time),
        ] {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                if parse_time_of_day(v).is_none() {
                    return Err(AppError::UnprocessableEntity(format!(
                        "{name} must be formatted as HH:MM"
                    )));
                }
            }
        }
        Ok(())
    }

    /// 比較用の JSON ドキュメントに変換する
    pub fn to_document(&self) -> AppResult<Value> {
        serde_json::to_value(self).map_err(|e| AppError::ConversionEntityError(e.to_string()))
    }

    /// 部分更新を適用した新しいフィールド値を返す。
    /// `null` は値のクリアを意味し、送られていないキーは現状維持とする
    pub fn apply_changes(&self, changes: &Map<String, Value>) -> AppResult<Self> {
        if let Some(key) = changes
            .keys()
            .find(|k| !EDITABLE_FIELDS.contains(&k.as_str()))
        {
            return Err(AppError::UnprocessableEntity(format!(
                "field `{key}` cannot be edited"
            )));
        }

        let Value::Object(mut doc) = self.to_document()? else {
            return Err(AppError::ConversionEntityError(
                "reservation fields did not serialize to an object".into(),
            ));
        };
        doc.extend(changes.iter().map(|(k, v)| (k.clone(), v.clone())));

        let fields: Self = serde_json::from_value(Value::Object(doc))
            .map_err(|e| AppError::UnprocessableEntity(format!("invalid reservation fields: {e}")))?;
        fields.validate()?;
        Ok(fields)
    }
}

pub(crate) fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

/// 秒の有無を問わず、ローカル時刻として日時を読み取る
pub fn parse_wall_clock(value: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_local())
        })
}

mod wall_clock {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&value.format("%Y-%m-%dT%H:%M:%S"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_wall_clock(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid date-time `{raw}`")))
    }
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

// 人数は数値でも数値文字列でも受け付ける
fn number_or_numeric_string<'de, D>(d: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(d)? {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid attendee count `{n}`"))),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid attendee count `{s}`"))),
        other => Err(D::Error::custom(format!("invalid attendee count `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::reservation::fixtures::sample_fields as sample;
    use serde_json::json;

    #[test]
    fn accepts_minutes_only_and_numeric_strings() {
        let fields: ReservationFields = serde_json::from_value(json!({
            "eventTitle": "Choir practice",
            "startDateTime": "2026-02-18T10:00",
            "endDateTime": "2026-02-18T11:30:00",
            "attendeeCount": "25"
        }))
        .unwrap();
        assert_eq!(fields.attendee_count, Some(25));
        assert_eq!(
            fields.to_document().unwrap()["startDateTime"],
            json!("2026-02-18T10:00:00")
        );
        assert!(fields.requested_rooms.is_empty());
    }

    #[test]
    fn apply_changes_keeps_unsent_fields_and_clears_nulls() {
        let changes = json!({ "attendeeCount": 75, "categories": null, "setupTime": "09:30" });
        let updated = sample()
            .apply_changes(changes.as_object().unwrap())
            .unwrap();
        assert_eq!(updated.attendee_count, Some(75));
        assert!(updated.categories.is_empty());
        assert_eq!(updated.setup_time.as_deref(), Some("09:30"));
        assert_eq!(updated.requested_rooms, vec!["room-a".to_string()]);
        assert_eq!(updated.event_title, "Board meeting");
    }

    #[test]
    fn apply_changes_rejects_unknown_and_invalid_fields() {
        let unknown = json!({ "status": "approved" });
        assert!(matches!(
            sample().apply_changes(unknown.as_object().unwrap()),
            Err(AppError::UnprocessableEntity(_))
        ));

        let inverted = json!({ "endDateTime": "2026-02-18T09:00" });
        assert!(matches!(
            sample().apply_changes(inverted.as_object().unwrap()),
            Err(AppError::UnprocessableEntity(_))
        ));

        let bad_time = json!({ "doorOpenTime": "noon" });
        assert!(sample().apply_changes(bad_time.as_object().unwrap()).is_err());
    }
}
