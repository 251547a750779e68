pub const TRANSCRIBE: &str = "/transcribe";

pub const USAGE_REPLY: &str = "Usage: /transcribe <YouTube URL>";
pub const HELP_REPLY: &str = "Send /transcribe <YouTube URL> to start a transcription.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Transcribe { url: String },
    /// `/transcribe` without an argument.
    TranscribeUsage,
    Unknown,
}

impl Command {
    /// Anything starting with `/transcribe` is the command; the first
    /// whitespace-separated remainder is the URL.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if !text.starts_with(TRANSCRIBE) {
            return Command::Unknown;
        }

        match text.split_once(char::is_whitespace) {
            Some((_, rest)) if !rest.trim().is_empty() => Command::Transcribe {
                url: rest.trim().to_string(),
            },
            _ => Command::TranscribeUsage,
        }
    }
}

pub fn started_reply(order_id: &str) -> String {
    format!("✅ Transcription started! Order ID: {order_id}\nI'll notify you when it's ready.")
}

pub fn create_failed_reply(detail: &str) -> String {
    format!("❌ Failed to create transcription: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_transcribe_with_url() {
        assert_eq!(
            Command::parse("  /transcribe   https://youtu.be/abc  "),
            Command::Transcribe {
                url: "https://youtu.be/abc".to_string()
            }
        );
    }

    #[test]
    fn remainder_is_kept_whole() {
        assert_eq!(
            Command::parse("/transcribe https://youtu.be/abc extra"),
            Command::Transcribe {
                url: "https://youtu.be/abc extra".to_string()
            }
        );
    }

    #[test]
    fn bare_command_needs_usage() {
        assert_eq!(Command::parse("/transcribe"), Command::TranscribeUsage);
        assert_eq!(Command::parse("/transcribe   "), Command::TranscribeUsage);
    }

    #[test]
    fn other_text_is_unknown() {
        assert_eq!(Command::parse("hello"), Command::Unknown);
        assert_eq!(Command::parse(""), Command::Unknown);
        assert_eq!(Command::parse("/start"), Command::Unknown);
    }

    #[test]
    fn replies_match_bot_wording() {
        assert_eq!(
            started_reply("ord-9"),
            "✅ Transcription started! Order ID: ord-9\nI'll notify you when it's ready."
        );
        assert_eq!(
            create_failed_reply("quota exceeded"),
            "❌ Failed to create transcription: quota exceeded"
        );
    }
}
