use crate::domain::models::{
    categorize_task, Highlight, ParsedSchedule, ScheduledBlock, UnscheduledItem,
};
use crate::domain::time::{parse_time, UnmarkedHourPolicy};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

const TIME_RANGE: &str = concat!(
    r"`?([0-9]{1,2})(?::([0-9]{2}))?\s*(am|pm)?\s*",
    r"(?:[-–—]+|to|->|→)\s*",
    r"([0-9]{1,2})(?::([0-9]{2}))?\s*(am|pm)?`?",
    r"\s*(?:[-–—:]|\s)\s*(.+)",
);

static TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("(?i)^{TIME_RANGE}$")).expect("valid time range pattern")
});
static TASK_WITH_TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^-?\s*\[([ x]?)\]\s*{TIME_RANGE}$"))
        .expect("valid task time range pattern")
});
static TODO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^-?\s*\[([ x]?)\]\s*(.+)$").expect("valid todo pattern")
});
static CHECKBOX_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^-?\s*\[[ x]?\]\s*").expect("valid checkbox prefix pattern")
});
static CHECKED_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^-?\s*\[x\]").expect("valid checked prefix pattern"));
static HIGHLIGHT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^<highlight\s+color=["']([^"']+)["']>(.+)</highlight>$"#)
        .expect("valid highlight pattern")
});
static XML_PAGE_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<pageTitle>([^<]+)</pageTitle>").expect("valid pageTitle pattern")
});
static XML_CONTENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<content>([^<]+)</content>").expect("valid content pattern"));

#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    Json(Value),
    Text(String),
}

impl RawPayload {
    pub fn from_body(body: String) -> Self {
        match serde_json::from_str(&body) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(body),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserOptions {
    pub unmarked_hours: UnmarkedHourPolicy,
}

#[derive(Debug)]
enum PayloadShape<'a> {
    XmlText(&'a str),
    Array(&'a [Value]),
    Page(&'a Value),
    Blocks(&'a Value),
    SingleNode(&'a Value),
    Empty,
}

impl<'a> PayloadShape<'a> {
    fn decode(raw: &'a RawPayload) -> Self {
        let value = match raw {
            RawPayload::Text(text) => return Self::XmlText(text),
            RawPayload::Json(value) => value,
        };
        match value {
            Value::String(text) => Self::XmlText(text),
            Value::Array(items) => Self::Array(items),
            Value::Object(map) => {
                if let Some(page) = map.get("page").filter(|page| is_truthy(page)) {
                    Self::Page(page)
                } else if let Some(blocks) = map.get("blocks").filter(|blocks| is_truthy(blocks)) {
                    Self::Blocks(blocks)
                } else {
                    Self::SingleNode(value)
                }
            }
            _ => Self::Empty,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ContentItem {
    Text(String),
    Node(BlockNode),
}

#[derive(Debug, Clone, PartialEq)]
enum NodeContent {
    Text(String),
    Items(Vec<ContentItem>),
}

/// Fields are visited in this order, which mirrors how the notes API spreads
/// text across a node: `markdown`, `content`, `text`, `page_title`, then the
/// nested `blocks`, `subblocks`, `children` and `page`.
#[derive(Debug, Clone, Default, PartialEq)]
struct BlockNode {
    id: Option<String>,
    markdown: Option<String>,
    list_style: Option<String>,
    task_state: Option<String>,
    color: Option<String>,
    content: Option<NodeContent>,
    text: Option<String>,
    page_title: Option<String>,
    blocks: Vec<BlockNode>,
    subblocks: Vec<BlockNode>,
    children: Vec<BlockNode>,
    page: Option<Box<BlockNode>>,
}

impl BlockNode {
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(Self {
            id: object.get("id").and_then(id_string),
            markdown: non_empty_str(object.get("markdown")),
            list_style: non_empty_str(object.get("listStyle")),
            task_state: object
                .get("taskInfo")
                .and_then(|info| non_empty_str(info.get("state"))),
            color: resolve_color(object),
            content: object.get("content").and_then(node_content),
            text: non_empty_str(object.get("text")),
            page_title: non_empty_str(object.get("pageTitle")),
            blocks: nodes_of(object.get("blocks")),
            subblocks: nodes_of(object.get("subblocks")),
            children: nodes_of(object.get("children")),
            page: object
                .get("page")
                .and_then(Self::from_value)
                .map(Box::new),
        })
    }

    fn is_todo_list(&self) -> bool {
        matches!(self.list_style.as_deref(), Some("todo" | "checkbox"))
    }

    fn nested(&self) -> impl Iterator<Item = &BlockNode> {
        self.blocks
            .iter()
            .chain(&self.subblocks)
            .chain(&self.children)
            .chain(self.page.as_deref())
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned)
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) if is_truthy(value) => Some(number.to_string()),
        _ => None,
    }
}

fn nodes_of(value: Option<&Value>) -> Vec<BlockNode> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(BlockNode::from_value).collect())
        .unwrap_or_default()
}

fn node_content(value: &Value) -> Option<NodeContent> {
    match value {
        Value::String(text) if !text.is_empty() => Some(NodeContent::Text(text.clone())),
        Value::Array(items) => Some(NodeContent::Items(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(text) => Some(ContentItem::Text(text.clone())),
                    Value::Object(_) => BlockNode::from_value(item).map(ContentItem::Node),
                    _ => None,
                })
                .collect(),
        )),
        _ => None,
    }
}

/// `color` → `highlight` → `highlightColor` (object form reads `.color`
/// then `.name`) → `style.color` → `style.highlight`.
fn resolve_color(object: &Map<String, Value>) -> Option<String> {
    let declared = ["color", "highlight", "highlightColor"]
        .into_iter()
        .filter_map(|key| object.get(key))
        .find(|value| is_truthy(value));

    let color = match declared {
        Some(Value::Object(inner)) => {
            non_empty_str(inner.get("color")).or_else(|| non_empty_str(inner.get("name")))
        }
        Some(value) => non_empty_str(Some(value)),
        None => None,
    };
    if color.is_some() {
        return color;
    }

    let style = object.get("style").and_then(Value::as_object)?;
    non_empty_str(style.get("color")).or_else(|| non_empty_str(style.get("highlight")))
}

struct ParsedRange {
    start: f64,
    end: f64,
    title: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleParser {
    options: ParserOptions,
}

impl ScheduleParser {
    pub fn new(options: ParserOptions) -> Self {
        Self { options }
    }

    pub fn parse(&self, raw: &RawPayload) -> ParsedSchedule {
        let mut out = ParsedSchedule::default();
        match PayloadShape::decode(raw) {
            PayloadShape::XmlText(text) => {
                for fragment in extract_xml_text(text) {
                    self.process_text(&mut out, &fragment, None, None, None);
                }
            }
            PayloadShape::Array(items) => {
                for node in items.iter().filter_map(BlockNode::from_value) {
                    self.process_node(&mut out, &node);
                }
            }
            PayloadShape::Page(page) | PayloadShape::SingleNode(page) => {
                if let Some(node) = BlockNode::from_value(page) {
                    self.process_node(&mut out, &node);
                }
            }
            PayloadShape::Blocks(blocks) => {
                for node in nodes_of(Some(blocks)) {
                    self.process_node(&mut out, &node);
                }
            }
            PayloadShape::Empty => {}
        }

        out.scheduled
            .sort_by(|left, right| left.start.total_cmp(&right.start));
        tracing::debug!(
            scheduled = out.scheduled.len(),
            unscheduled = out.unscheduled_items.len(),
            "parsed schedule payload"
        );
        out
    }

    fn process_node(&self, out: &mut ParsedSchedule, node: &BlockNode) {
        let id = node.id.as_deref();
        let color = node.color.as_deref();
        let filed_as_todo = node
            .markdown
            .as_deref()
            .is_some_and(|markdown| node.is_todo_list() && self.file_todo(out, node, markdown));

        // A todo node still has its nested blocks walked below.
        if !filed_as_todo {
            if let Some(markdown) = node.markdown.as_deref() {
                self.process_text(out, markdown, color, id, Some(markdown));
            }
            match &node.content {
                Some(NodeContent::Text(text)) => {
                    self.process_text(out, text, color, id, Some(text));
                }
                Some(NodeContent::Items(items)) => {
                    for item in items {
                        match item {
                            ContentItem::Text(text) => {
                                self.process_text(out, text, color, id, Some(text));
                            }
                            ContentItem::Node(child) => self.process_node(out, child),
                        }
                    }
                }
                None => {}
            }
            if let Some(text) = node.text.as_deref() {
                self.process_text(out, text, None, id, Some(text));
            }
            if let Some(title) = node.page_title.as_deref() {
                self.process_text(out, title, None, id, Some(title));
            }
        }

        for child in node.nested() {
            self.process_node(out, child);
        }
    }

    /// Files a `listStyle: todo` node as an unscheduled item unless its text
    /// carries a time range.
    fn file_todo(&self, out: &mut ParsedSchedule, node: &BlockNode, markdown: &str) -> bool {
        let text = CHECKBOX_PREFIX.replace(markdown, "");
        let text = text.trim();
        if text.is_empty() || TIME_PATTERN.is_match(text) {
            return false;
        }
        let checked =
            node.task_state.as_deref() == Some("done") || CHECKED_PREFIX.is_match(markdown);
        out.unscheduled_items.push(UnscheduledItem {
            id: node.id.clone(),
            text: text.to_string(),
            checked,
            original_markdown: markdown.to_string(),
        });
        true
    }

    fn process_text(
        &self,
        out: &mut ParsedSchedule,
        text: &str,
        color: Option<&str>,
        id: Option<&str>,
        original_markdown: Option<&str>,
    ) {
        let mut trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }

        let mut color = color;
        if let Some(captures) = HIGHLIGHT_PATTERN.captures(trimmed) {
            if let (Some(value), Some(inner)) = (captures.get(1), captures.get(2)) {
                color = Some(value.as_str());
                trimmed = inner.as_str().trim();
            }
        }
        let original_markdown = original_markdown.unwrap_or(trimmed).to_string();

        if let Some(captures) = TASK_WITH_TIME_PATTERN.captures(trimmed) {
            let checked = captures
                .get(1)
                .is_some_and(|marker| marker.as_str().eq_ignore_ascii_case("x"));
            if let Some(range) = self.resolve_range(&captures, 2) {
                out.scheduled.push(ScheduledBlock {
                    id: id.map(ToOwned::to_owned),
                    start: range.start,
                    end: range.end,
                    category: categorize_task(&range.title),
                    title: range.title,
                    highlight: color.and_then(Highlight::from_color),
                    is_task: true,
                    checked,
                    original_markdown,
                });
                return;
            }
        }

        if let Some(captures) = TIME_PATTERN.captures(trimmed) {
            if let Some(range) = self.resolve_range(&captures, 1) {
                out.scheduled.push(ScheduledBlock {
                    id: id.map(ToOwned::to_owned),
                    start: range.start,
                    end: range.end,
                    category: categorize_task(&range.title),
                    title: range.title,
                    highlight: color.and_then(Highlight::from_color),
                    is_task: false,
                    checked: false,
                    original_markdown,
                });
                return;
            }
        }

        if let Some(captures) = TODO_PATTERN.captures(trimmed) {
            let checked = captures
                .get(1)
                .is_some_and(|marker| marker.as_str().eq_ignore_ascii_case("x"));
            let text = captures.get(2).map_or("", |m| m.as_str()).trim();
            out.unscheduled_items.push(UnscheduledItem {
                id: id.map(ToOwned::to_owned),
                text: text.to_string(),
                checked,
                original_markdown,
            });
            return;
        }

        tracing::trace!(fragment = trimmed, "dropped unrecognized fragment");
    }

    /// Reads the seven time-range groups starting at `first`. A start without
    /// a period inherits the end's (`10-11 AM` is 10 AM to 11 AM).
    fn resolve_range(&self, captures: &regex::Captures<'_>, first: usize) -> Option<ParsedRange> {
        let group = |offset: usize| {
            captures
                .get(first + offset)
                .map(|m| m.as_str())
                .filter(|value| !value.is_empty())
        };
        let end_period = group(5);
        let start_period = group(2).or(end_period);
        let policy = self.options.unmarked_hours;

        let start = parse_time(group(0)?, group(1), start_period, policy)?;
        let end = parse_time(group(3)?, group(4), end_period, policy)?;
        let title = group(6)?.trim();
        if title.is_empty() {
            return None;
        }
        Some(ParsedRange {
            start,
            end,
            title: title.to_string(),
        })
    }
}

/// `<pageTitle>` runs first, then `<content>` runs, each in document order.
fn extract_xml_text(text: &str) -> Vec<String> {
    XML_PAGE_TITLE
        .captures_iter(text)
        .chain(XML_CONTENT.captures_iter(text))
        .filter_map(|captures| captures.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

pub fn parse_blocks(raw: &RawPayload) -> ParsedSchedule {
    ScheduleParser::default().parse(raw)
}

pub fn matches_time_range(text: &str) -> bool {
    TIME_PATTERN.is_match(text.trim())
}
