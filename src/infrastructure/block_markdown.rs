use crate::domain::time::format_time_range;

fn checkbox(checked: bool) -> &'static str {
    if checked { "- [x]" } else { "- [ ]" }
}

/// `` `9:00 AM - 10:00 AM` - Title ``
pub fn scheduled_block(start: f64, end: f64, title: &str) -> String {
    format!("`{}` - {}", format_time_range(start, end), title.trim())
}

/// `` - [x] `9:00 AM - 10:00 AM` Title ``
pub fn scheduled_task(start: f64, end: f64, title: &str, checked: bool) -> String {
    format!(
        "{} `{}` {}",
        checkbox(checked),
        format_time_range(start, end),
        title.trim()
    )
}

/// `- [ ] Text`
pub fn unscheduled_item(text: &str, checked: bool) -> String {
    format!("{} {}", checkbox(checked), text.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::schedule_parser::{parse_blocks, RawPayload};
    use serde_json::json;

    fn reparse(markdown: &str) -> crate::domain::models::ParsedSchedule {
        parse_blocks(&RawPayload::Json(json!({ "id": "x", "markdown": markdown })))
    }

    #[test]
    fn scheduled_block_uses_backticked_range() {
        assert_eq!(
            scheduled_block(9.0, 10.5, "Standup"),
            "`9:00 AM - 10:30 AM` - Standup"
        );
    }

    #[test]
    fn scheduled_task_keeps_checkbox() {
        assert_eq!(
            scheduled_task(13.0, 14.0, "Review", true),
            "- [x] `1:00 PM - 2:00 PM` Review"
        );
        assert_eq!(
            scheduled_task(0.0, 0.25, "Night owl", false),
            "- [ ] `12:00 AM - 12:15 AM` Night owl"
        );
    }

    #[test]
    fn unscheduled_item_trims_text() {
        assert_eq!(unscheduled_item("  Buy milk ", false), "- [ ] Buy milk");
        assert_eq!(unscheduled_item("Buy milk", true), "- [x] Buy milk");
    }

    #[test]
    fn encoded_shapes_parse_back_to_the_same_entry() {
        let parsed = reparse(&scheduled_block(14.25, 15.0, "Deep work"));
        let block = &parsed.scheduled[0];
        assert_eq!((block.start, block.end), (14.25, 15.0));
        assert_eq!(block.title, "Deep work");
        assert!(!block.is_task);

        let parsed = reparse(&scheduled_task(8.0, 9.0, "Gym", true));
        let block = &parsed.scheduled[0];
        assert!(block.is_task && block.checked);
        assert_eq!(block.title, "Gym");

        let parsed = reparse(&unscheduled_item("Call mom", true));
        assert!(parsed.scheduled.is_empty());
        assert!(parsed.unscheduled_items[0].checked);
        assert_eq!(parsed.unscheduled_items[0].text, "Call mom");
    }
}
