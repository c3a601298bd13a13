//! Helpers for building and formatting chat messages.

use chrono::{DateTime, TimeZone, Utc};
use itertools::Itertools;
use uuid::Uuid;

use crate::model::{ChatMessage, LearningReport, MessageKind, Sender, MAX_MESSAGE_CHARS};

const WELCOME_TEXT: &str = "Welcome to AI Code Helper! I'm your programming assistant specialized in helping with learning, career guidance, and interview preparation. How can I help you today?";

/// Build a message stamped with the current time and a fresh id.
pub fn create_message(sender: Sender, content: &str, kind: MessageKind) -> ChatMessage {
    ChatMessage {
        id: generate_message_id(),
        sender,
        content: content.to_string(),
        timestamp: Utc::now(),
        kind: Some(kind),
    }
}

/// `msg_<unix millis>_<9 random chars>`
pub fn generate_message_id() -> String {
    let entropy = Uuid::new_v4().simple().to_string();
    format!("msg_{}_{}", Utc::now().timestamp_millis(), &entropy[..9])
}

/// The system greeting shown at the top of a new session.
pub fn welcome_message() -> ChatMessage {
    create_message(Sender::System, WELCOME_TEXT, MessageKind::Chat)
}

/// 12-hour clock time, e.g. `3:07 PM`.
pub fn format_timestamp<Tz: TimeZone>(timestamp: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    timestamp.format("%-I:%M %p").to_string()
}

pub fn sender_label(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "[USER] You",
        Sender::Ai => "[AI] Assistant",
        Sender::System => "[SYSTEM] Info",
    }
}

/// Cut `text` to `max_chars` characters, marking the cut with `...`.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}...", head)
}

/// Trim and collapse runs of whitespace into single spaces.
pub fn sanitize_input(input: &str) -> String {
    input.split_whitespace().join(" ")
}

pub fn is_valid_message(message: &str) -> bool {
    let len = message.trim().chars().count();
    len > 0 && len <= MAX_MESSAGE_CHARS
}

/// Render a report as a numbered list under a heading.
pub fn format_learning_report(report: &LearningReport) -> String {
    let items = report
        .recommendations
        .iter()
        .enumerate()
        .map(|(i, rec)| format!("{}. {}", i + 1, rec))
        .join("\n");
    format!("Learning Report for: {}\n\n{}", report.student_name, items)
}

/// Describe how long ago `date` was, relative to `now`.
///
/// Same day shows the time, then "Yesterday", "N days ago" within a week,
/// and a short month/day after that.
pub fn format_relative_date(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    match (now - date).num_days() {
        d if d <= 0 => format_timestamp(&date),
        1 => "Yesterday".to_string(),
        d if d < 7 => format!("{} days ago", d),
        _ => date.format("%b %-d").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_message_id_shape() {
        let id = generate_message_id();
        let parts: Vec<_> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "msg");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert_ne!(id, generate_message_id());
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 50), "short");
        assert_eq!(truncate_text("abcdef", 3), "abc...");
        assert_eq!(truncate_text("ééééé", 2), "éé...");
    }

    #[test]
    fn test_sanitize_and_validate() {
        assert_eq!(sanitize_input("  fix \n my\t code  "), "fix my code");
        assert!(is_valid_message(" ok "));
        assert!(!is_valid_message("   "));
        assert!(!is_valid_message(&"a".repeat(MAX_MESSAGE_CHARS + 1)));
    }

    #[test]
    fn test_format_learning_report() {
        let report = LearningReport {
            student_name: "Student".to_string(),
            recommendations: vec!["Learn Rust".to_string(), "Ship it".to_string()],
        };
        assert_eq!(
            format_learning_report(&report),
            "Learning Report for: Student\n\n1. Learn Rust\n2. Ship it"
        );
    }

    #[test]
    fn test_format_timestamp() {
        let t = Utc.with_ymd_and_hms(2024, 3, 9, 15, 7, 0).unwrap();
        assert_eq!(format_timestamp(&t), "3:07 PM");
        let t = Utc.with_ymd_and_hms(2024, 3, 9, 0, 30, 0).unwrap();
        assert_eq!(format_timestamp(&t), "12:30 AM");
    }

    #[test]
    fn test_format_relative_date() {
        let now = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        assert_eq!(format_relative_date(now - Duration::hours(2), now), "10:00 AM");
        assert_eq!(format_relative_date(now - Duration::days(1), now), "Yesterday");
        assert_eq!(format_relative_date(now - Duration::days(4), now), "4 days ago");
        assert_eq!(format_relative_date(now - Duration::days(19), now), "Mar 1");
    }

    #[test]
    fn test_sender_labels() {
        assert_eq!(sender_label(Sender::Ai), "[AI] Assistant");
        assert_eq!(welcome_message().sender, Sender::System);
    }
}
