use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid link pattern")
});

const WORK_KEYWORDS: &[&str] = &["deep work", "focus", "code", "write", "develop", "build"];
const MEETING_KEYWORDS: &[&str] = &[
    "call",
    "meeting",
    "sync",
    "chat",
    "standup",
    "1:1",
    "interview",
];
const HEALTH_KEYWORDS: &[&str] = &[
    "gym", "exercise", "workout", "run", "yoga", "walk", "health", "meditat",
];
const PERSONAL_KEYWORDS: &[&str] = &[
    "lunch",
    "dinner",
    "breakfast",
    "break",
    "personal",
    "family",
    "friend",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Work,
    Meeting,
    Health,
    Personal,
    #[default]
    Default,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Meeting => "meeting",
            Self::Health => "health",
            Self::Personal => "personal",
            Self::Default => "default",
        }
    }
}

/// First keyword group that appears in the lower-cased title wins.
pub fn categorize_task(title: &str) -> Category {
    let lower = title.to_lowercase();
    let groups = [
        (Category::Work, WORK_KEYWORDS),
        (Category::Meeting, MEETING_KEYWORDS),
        (Category::Health, HEALTH_KEYWORDS),
        (Category::Personal, PERSONAL_KEYWORDS),
    ];
    groups
        .into_iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| lower.contains(keyword)))
        .map(|(category, _)| category)
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Highlight {
    Hex(String),
    Named(String),
}

impl Highlight {
    pub fn from_color(color: &str) -> Option<Self> {
        let color = color.trim();
        if color.is_empty() {
            return None;
        }
        if color.starts_with('#') {
            Some(Self::Hex(color.to_string()))
        } else {
            Some(Self::Named(color.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Hex(value) | Self::Named(value) => value,
        }
    }

    /// `rgba(r, g, b, alpha)` for `#rrggbb` colors.
    pub fn to_rgba(&self, alpha: f32) -> Option<String> {
        let Self::Hex(value) = self else {
            return None;
        };
        let hex = value.strip_prefix('#')?;
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
        let (r, g, b) = (channel(0..2)?, channel(2..4)?, channel(4..6)?);
        Some(format!("rgba({r}, {g}, {b}, {alpha})"))
    }

    /// Style class for named highlights such as `gradient-purple`.
    pub fn css_class(&self) -> Option<String> {
        let Self::Named(value) = self else {
            return None;
        };
        let token: String = value
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '-' {
                    ch.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        Some(format!("highlight-{token}"))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TitleSegment {
    Text { text: String },
    Link { text: String, url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledBlock {
    pub id: Option<String>,
    pub start: f64,
    pub end: f64,
    pub title: String,
    pub category: Category,
    pub highlight: Option<Highlight>,
    pub is_task: bool,
    pub checked: bool,
    pub original_markdown: String,
}

impl ScheduledBlock {
    pub fn new(start: f64, end: f64, title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: None,
            start,
            end,
            category: categorize_task(&title),
            title,
            highlight: None,
            is_task: false,
            checked: false,
            original_markdown: String::new(),
        }
    }

    pub fn is_current(&self, now: f64) -> bool {
        now >= self.start && now < self.end
    }

    pub fn title_segments(&self) -> Vec<TitleSegment> {
        split_links(&self.title)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnscheduledItem {
    pub id: Option<String>,
    pub text: String,
    pub checked: bool,
    pub original_markdown: String,
}

impl UnscheduledItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            checked: false,
            original_markdown: String::new(),
        }
    }
}

/// Result of parsing one schedule payload.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct ParsedSchedule {
    pub scheduled: Vec<ScheduledBlock>,
    pub unscheduled_items: Vec<UnscheduledItem>,
}

impl ParsedSchedule {
    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty() && self.unscheduled_items.is_empty()
    }
}

/// Client-side handle of an entry in the schedule state. Stable for the
/// lifetime of the loaded day, unlike list positions or remote ids.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct EntryKey(pub u64);

impl std::fmt::Display for EntryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Tracked<T> {
    pub key: EntryKey,
    #[serde(flatten)]
    pub item: T,
}

pub fn split_links(text: &str) -> Vec<TitleSegment> {
    let mut segments = Vec::new();
    let mut cursor = 0;
    for captures in LINK_PATTERN.captures_iter(text) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        if whole.start() > cursor {
            segments.push(TitleSegment::Text {
                text: text[cursor..whole.start()].to_string(),
            });
        }
        segments.push(TitleSegment::Link {
            text: captures[1].to_string(),
            url: captures[2].to_string(),
        });
        cursor = whole.end();
    }
    if cursor < text.len() {
        segments.push(TitleSegment::Text {
            text: text[cursor..].to_string(),
        });
    }
    segments
}

pub fn validate_range(start: f64, end: f64) -> Result<(), String> {
    if !start.is_finite() || !end.is_finite() {
        return Err("block times must be finite".to_string());
    }
    if start < 0.0 || end > 24.0 {
        return Err("block times must stay within the day".to_string());
    }
    if end <= start {
        return Err("block.end must be after block.start".to_string());
    }
    Ok(())
}
