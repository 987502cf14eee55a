use chrono::{DateTime, FixedOffset, Utc};
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

const BEIJING_OFFSET_SECONDS: i32 = 8 * 3600;
const DOWNLOAD_PREFIX: &str = "immersive-china";

fn beijing_offset() -> FixedOffset {
    FixedOffset::east_opt(BEIJING_OFFSET_SECONDS)
        .expect("UTC+8 offset should be available for Beijing time")
}

fn now_in_beijing() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&beijing_offset())
}

fn format_beijing(now: &DateTime<FixedOffset>, pattern: &str) -> String {
    now.format(pattern).to_string()
}

/// `immersive-china-<unix millis>.png`, unique enough for repeated saves.
pub fn download_file_name(at: DateTime<Utc>) -> String {
    format!("{DOWNLOAD_PREFIX}-{}.png", at.timestamp_millis())
}

/// Log timestamps in Beijing time regardless of the host timezone.
pub struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = now_in_beijing();
        write!(w, "{}", format_beijing(&now, "%Y-%m-%d %H:%M:%S%:z"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn download_name_uses_unix_millis() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(download_file_name(at), "immersive-china-1700000000123.png");
    }

    #[test]
    fn beijing_format_carries_offset() {
        let at = Utc
            .with_ymd_and_hms(2024, 1, 1, 16, 30, 0)
            .unwrap()
            .with_timezone(&beijing_offset());
        assert_eq!(
            format_beijing(&at, "%Y-%m-%d %H:%M:%S%:z"),
            "2024-01-02 00:30:00+08:00"
        );
    }
}
