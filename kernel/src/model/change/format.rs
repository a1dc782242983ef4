use super::{is_empty_value, FieldChange, FieldKind, NotifiableField};
use crate::model::reservation::fields::{parse_time_of_day, parse_wall_clock};
use serde_json::Value;
use std::collections::HashMap;

pub const NOT_SET: &str = "(not set)";

/// Renders raw field values for people to read.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValueFormatter<'a> {
    lookup: Option<&'a HashMap<String, String>>,
}

impl<'a> ValueFormatter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// リスト要素の ID を表示名に置き換えるための対応表を指定する
    pub fn with_lookup(lookup: &'a HashMap<String, String>) -> Self {
        Self {
            lookup: Some(lookup),
        }
    }

    /// 値の形から表示方法を決める
    pub fn format(&self, value: Option<&Value>) -> String {
        let Some(value) = value.filter(|v| !is_empty_value(v)) else {
            return NOT_SET.to_string();
        };
        match value {
            Value::Bool(b) => yes_no(*b),
            Value::Number(n) => n.to_string(),
            Value::String(s) => format_date_time(s)
                .or_else(|| format_time_of_day(s))
                .unwrap_or_else(|| s.clone()),
            Value::Array(items) => self.join(items),
            Value::Object(_) => value.to_string(),
            Value::Null => NOT_SET.to_string(),
        }
    }

    /// フィールドの種類が分かっている場合はそれに従って表示する
    pub fn format_field(&self, field: &NotifiableField, value: Option<&Value>) -> String {
        let Some(value) = value.filter(|v| !is_empty_value(v)) else {
            return NOT_SET.to_string();
        };
        match (field.kind, value) {
            (FieldKind::DateTime, Value::String(s)) => {
                format_date_time(s).unwrap_or_else(|| s.clone())
            }
            (FieldKind::TimeOfDay, Value::String(s)) => {
                format_time_of_day(s).unwrap_or_else(|| s.clone())
            }
            (FieldKind::Flag, Value::String(s)) => match s.as_str() {
                "true" => yes_no(true),
                "false" => yes_no(false),
                _ => s.clone(),
            },
            (FieldKind::Text, Value::String(s)) => s.clone(),
            (FieldKind::Object, Value::Object(o)) => contact_like(o).unwrap_or_else(|| value.to_string()),
            _ => self.format(Some(value)),
        }
    }

    /// 変更前後の値を整形する。許可リストにないフィールドは値の形で判断する
    pub fn format_change(&self, change: &FieldChange) -> (String, String) {
        let field = NotifiableField::find(&change.field);
        let render = |value: &Value| match field {
            Some(f) => self.format_field(f, Some(value)),
            None => self.format(Some(value)),
        };
        (render(&change.old_value), render(&change.new_value))
    }

    fn join(&self, items: &[Value]) -> String {
        items
            .iter()
            .map(|item| match item {
                Value::String(id) => self
                    .lookup
                    .and_then(|l| l.get(id))
                    .cloned()
                    .unwrap_or_else(|| id.clone()),
                other => self.format(Some(other)),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub fn format_change_value(value: Option<&Value>, lookup: Option<&HashMap<String, String>>) -> String {
    match lookup {
        Some(lookup) => ValueFormatter::with_lookup(lookup).format(value),
        None => ValueFormatter::new().format(value),
    }
}

/// 競合メッセージ用に変更内容を 1 行にまとめる
pub fn describe_changes(changes: &[FieldChange], formatter: &ValueFormatter<'_>) -> String {
    changes
        .iter()
        .map(|c| {
            let (old, new) = formatter.format_change(c);
            format!("{}: {} → {}", c.display_name, old, new)
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn yes_no(b: bool) -> String {
    let s = if b { "Yes" } else { "No" };
    s.to_string()
}

fn format_date_time(value: &str) -> Option<String> {
    // 日付だけの文字列は日時として扱わない
    if !value.contains('T') {
        return None;
    }
    parse_wall_clock(value).map(|dt| dt.format("%b %-d, %Y, %-I:%M %p").to_string())
}

fn format_time_of_day(value: &str) -> Option<String> {
    parse_time_of_day(value).map(|t| t.format("%-I:%M %p").to_string())
}

fn contact_like(o: &serde_json::Map<String, Value>) -> Option<String> {
    let name = o.get("name")?.as_str()?;
    match o.get("email").and_then(Value::as_str) {
        Some(email) if !email.is_empty() => Some(format!("{name} <{email}>")),
        _ => Some(name.to_string()),
    }
}
