use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Columns of `diary_entries`, in the order the backends write them.
pub const DIARY_COLUMNS: &[&str] = &[
    "id",
    "user_id",
    "date",
    "emotion",
    "event",
    "realization",
    "self_esteem_score",
    "worthlessness_score",
    "created_at",
    "counselor_memo",
    "is_visible_to_user",
    "counselor_name",
    "assigned_counselor",
    "urgency_level",
];

/// Emotion written when a record reaches the transform without one.
pub const UNKNOWN_EMOTION: &str = "不明";

/// The fixed emotion label set used by the journaling app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emotion {
    Fear,
    Sadness,
    Anger,
    Frustration,
    Worthlessness,
    Guilt,
    Loneliness,
    Shame,
    HappyJoy,
    Gratitude,
    Accomplishment,
    Happiness,
}

impl Emotion {
    pub const ALL: [Emotion; 12] = [
        Emotion::Fear,
        Emotion::Sadness,
        Emotion::Anger,
        Emotion::Frustration,
        Emotion::Worthlessness,
        Emotion::Guilt,
        Emotion::Loneliness,
        Emotion::Shame,
        Emotion::HappyJoy,
        Emotion::Gratitude,
        Emotion::Accomplishment,
        Emotion::Happiness,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Emotion::Fear => "恐怖",
            Emotion::Sadness => "悲しみ",
            Emotion::Anger => "怒り",
            Emotion::Frustration => "悔しい",
            Emotion::Worthlessness => "無価値感",
            Emotion::Guilt => "罪悪感",
            Emotion::Loneliness => "寂しさ",
            Emotion::Shame => "恥ずかしさ",
            Emotion::HappyJoy => "嬉しい",
            Emotion::Gratitude => "感謝",
            Emotion::Accomplishment => "達成感",
            Emotion::Happiness => "幸せ",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.label() == label)
    }

    /// Emotions whose entries carry self-esteem and worthlessness scores.
    pub fn is_scored(self) -> bool {
        matches!(
            self,
            Emotion::Worthlessness
                | Emotion::HappyJoy
                | Emotion::Gratitude
                | Emotion::Accomplishment
                | Emotion::Happiness
        )
    }
}

/// Counselor-assigned urgency tier. "Unset" is modelled as `None`, never as `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    High,
    Medium,
    Low,
}

impl UrgencyLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            UrgencyLevel::High => "high",
            UrgencyLevel::Medium => "medium",
            UrgencyLevel::Low => "low",
        }
    }

    /// Exact match only: `"High"` or `" low"` are not recognized tiers.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "high" => Some(UrgencyLevel::High),
            "medium" => Some(UrgencyLevel::Medium),
            "low" => Some(UrgencyLevel::Low),
            _ => None,
        }
    }
}

/// A score as found in local storage: the app has written both numbers and strings.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreValue {
    Number(f64),
    Text(String),
}

impl ScoreValue {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(ScoreValue::Number),
            Value::String(s) if !s.is_empty() => Some(ScoreValue::Text(s.clone())),
            _ => None,
        }
    }

    /// Integer value of the score. Strings follow leading-integer parsing
    /// (`"72.5pts"` → 72); `None` when nothing numeric can be read.
    pub fn as_integer(&self) -> Option<i32> {
        match self {
            ScoreValue::Number(n) if n.is_finite() => Some(n.trunc() as i32),
            ScoreValue::Number(_) => None,
            ScoreValue::Text(s) => parse_leading_int(s),
        }
    }
}

fn parse_leading_int(s: &str) -> Option<i32> {
    let s = s.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1i64, &s[1..]),
        Some(b'+') => (1i64, &s[1..]),
        _ => (1i64, s),
    };
    let end = digits
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude: i64 = digits[..end].parse().ok()?;
    i32::try_from(sign * magnitude).ok()
}

/// A diary record exactly as the app stores it locally.
///
/// Optional fields exist under both snake_case and camelCase names because
/// the app was migrated between two backend shapes. Every value is kept as
/// raw JSON so one odd field never rejects the whole record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDiaryEntry {
    pub id: Option<Value>,
    pub date: Option<Value>,
    pub emotion: Option<Value>,
    pub event: Option<Value>,
    pub realization: Option<Value>,
    pub self_esteem_score: Option<Value>,
    #[serde(rename = "selfEsteemScore")]
    pub self_esteem_score_camel: Option<Value>,
    pub worthlessness_score: Option<Value>,
    #[serde(rename = "worthlessnessScore")]
    pub worthlessness_score_camel: Option<Value>,
    pub assigned_counselor: Option<Value>,
    #[serde(rename = "assignedCounselor")]
    pub assigned_counselor_camel: Option<Value>,
    pub urgency_level: Option<Value>,
    #[serde(rename = "urgencyLevel")]
    pub urgency_level_camel: Option<Value>,
    pub is_visible_to_user: Option<Value>,
    #[serde(rename = "isVisibleToUser")]
    pub is_visible_to_user_camel: Option<Value>,
    pub counselor_name: Option<Value>,
    #[serde(rename = "counselorName")]
    pub counselor_name_camel: Option<Value>,
    pub counselor_memo: Option<Value>,
    #[serde(rename = "counselorMemo")]
    pub counselor_memo_camel: Option<Value>,
    pub created_at: Option<Value>,
    #[serde(rename = "createdAt")]
    pub created_at_camel: Option<Value>,
    #[serde(rename = "syncStatus")]
    pub sync_status: Option<Value>,
}

/// Canonical in-memory diary entry. Empty strings mean "absent".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiaryEntry {
    pub id: String,
    pub date: String,
    pub emotion: String,
    pub event: String,
    pub realization: String,
    pub self_esteem_score: Option<ScoreValue>,
    pub worthlessness_score: Option<ScoreValue>,
    pub assigned_counselor: Option<String>,
    pub urgency_level: Option<String>,
    pub is_visible_to_user: Option<bool>,
    pub counselor_name: Option<String>,
    pub counselor_memo: Option<String>,
    pub created_at: Option<String>,
    pub sync_status: Option<String>,
}

impl DiaryEntry {
    pub fn emotion_kind(&self) -> Option<Emotion> {
        Emotion::from_label(&self.emotion)
    }
}

fn text(value: &Option<Value>) -> Option<String> {
    match value.as_ref()? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn score(camel: &Option<Value>, snake: &Option<Value>) -> Option<ScoreValue> {
    camel
        .as_ref()
        .and_then(ScoreValue::from_json)
        .or_else(|| snake.as_ref().and_then(ScoreValue::from_json))
}

impl From<RawDiaryEntry> for DiaryEntry {
    fn from(raw: RawDiaryEntry) -> Self {
        DiaryEntry {
            id: text(&raw.id).unwrap_or_default(),
            date: text(&raw.date).unwrap_or_default(),
            emotion: text(&raw.emotion).unwrap_or_default(),
            event: text(&raw.event).unwrap_or_default(),
            realization: text(&raw.realization).unwrap_or_default(),
            self_esteem_score: score(&raw.self_esteem_score_camel, &raw.self_esteem_score),
            worthlessness_score: score(&raw.worthlessness_score_camel, &raw.worthlessness_score),
            assigned_counselor: text(&raw.assigned_counselor)
                .or_else(|| text(&raw.assigned_counselor_camel)),
            urgency_level: text(&raw.urgency_level).or_else(|| text(&raw.urgency_level_camel)),
            is_visible_to_user: raw
                .is_visible_to_user
                .as_ref()
                .or(raw.is_visible_to_user_camel.as_ref())
                .map(truthy),
            counselor_name: text(&raw.counselor_name).or_else(|| text(&raw.counselor_name_camel)),
            counselor_memo: text(&raw.counselor_memo).or_else(|| text(&raw.counselor_memo_camel)),
            created_at: text(&raw.created_at).or_else(|| text(&raw.created_at_camel)),
            sync_status: text(&raw.sync_status),
        }
    }
}

/// One row of `diary_entries` as written by the sync agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDiaryRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: String,
    pub emotion: String,
    pub event: String,
    pub realization: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_esteem_score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worthlessness_score: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub counselor_memo: String,
    pub is_visible_to_user: bool,
    pub counselor_name: String,
    pub assigned_counselor: String,
    pub urgency_level: String,
}

/// A row of `counselor_diary_view`: the entry plus its author's username.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReviewEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub line_username: Option<String>,
    pub date: String,
    pub emotion: String,
    pub event: String,
    pub realization: String,
    pub self_esteem_score: Option<i32>,
    pub worthlessness_score: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub counselor_memo: Option<String>,
    pub is_visible_to_user: Option<bool>,
    pub counselor_name: Option<String>,
    pub assigned_counselor: Option<String>,
    pub urgency_level: Option<String>,
}

/// Per-day entry count for the counselor calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DateCount {
    pub date: String,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> DiaryEntry {
        serde_json::from_value::<RawDiaryEntry>(value)
            .expect("raw entry")
            .into()
    }

    #[test]
    fn test_camel_case_scores_take_precedence() {
        let entry = parse(json!({
            "id": "a",
            "selfEsteemScore": 70,
            "self_esteem_score": 10,
            "worthlessness_score": "30"
        }));
        assert_eq!(entry.self_esteem_score, Some(ScoreValue::Number(70.0)));
        assert_eq!(
            entry.worthlessness_score,
            Some(ScoreValue::Text("30".to_string()))
        );
    }

    #[test]
    fn test_empty_camel_score_falls_back_to_snake() {
        let entry = parse(json!({ "selfEsteemScore": "", "self_esteem_score": 40 }));
        assert_eq!(entry.self_esteem_score, Some(ScoreValue::Number(40.0)));
    }

    #[test]
    fn test_snake_case_counselor_fields_take_precedence() {
        let entry = parse(json!({
            "counselor_name": "Sato",
            "counselorName": "Suzuki",
            "counselorMemo": "memo",
            "urgencyLevel": "high",
            "isVisibleToUser": 1
        }));
        assert_eq!(entry.counselor_name.as_deref(), Some("Sato"));
        assert_eq!(entry.counselor_memo.as_deref(), Some("memo"));
        assert_eq!(entry.urgency_level.as_deref(), Some("high"));
        assert_eq!(entry.is_visible_to_user, Some(true));
    }

    #[test]
    fn test_odd_field_types_do_not_reject_record() {
        let entry = parse(json!({
            "id": 42,
            "date": "2024-05-01",
            "emotion": "幸せ",
            "event": ["not", "text"],
            "selfEsteemScore": true
        }));
        assert_eq!(entry.id, "42");
        assert_eq!(entry.event, "");
        assert_eq!(entry.self_esteem_score, None);
    }

    #[test]
    fn test_leading_int_parsing() {
        assert_eq!(parse_leading_int("72.5pts"), Some(72));
        assert_eq!(parse_leading_int("  -3"), Some(-3));
        assert_eq!(parse_leading_int("abc"), None);
        assert_eq!(parse_leading_int(""), None);
        assert_eq!(ScoreValue::Number(64.9).as_integer(), Some(64));
    }

    #[test]
    fn test_scored_emotions() {
        let scored: Vec<_> = Emotion::ALL.into_iter().filter(|e| e.is_scored()).collect();
        assert_eq!(scored.len(), 5);
        assert!(Emotion::from_label("幸せ").is_some_and(Emotion::is_scored));
        assert!(!Emotion::from_label("怒り").is_some_and(Emotion::is_scored));
        assert_eq!(Emotion::from_label("unknown"), None);
    }

    #[test]
    fn test_urgency_parse_is_exact() {
        assert_eq!(UrgencyLevel::parse("medium"), Some(UrgencyLevel::Medium));
        assert_eq!(UrgencyLevel::parse("High"), None);
        assert_eq!(UrgencyLevel::parse(""), None);
    }

    #[test]
    fn test_unscored_row_omits_score_fields() {
        let row = RemoteDiaryRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            date: "2024-05-01".to_string(),
            emotion: "怒り".to_string(),
            event: String::new(),
            realization: String::new(),
            self_esteem_score: None,
            worthlessness_score: None,
            created_at: Utc::now(),
            counselor_memo: String::new(),
            is_visible_to_user: false,
            counselor_name: String::new(),
            assigned_counselor: String::new(),
            urgency_level: String::new(),
        };
        let value = serde_json::to_value(&row).expect("serialize");
        assert!(value.get("self_esteem_score").is_none());
        assert!(value.get("worthlessness_score").is_none());
    }
}
