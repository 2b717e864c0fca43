use chrono::Utc;

/// Returns a string representing the elapsed time since `start_time`
/// like "1m15s" or "1.50s". Used for session-end summaries.
pub fn format_elapsed(start_time: chrono::DateTime<Utc>) -> String {
    let millis = Utc::now()
        .signed_duration_since(start_time)
        .num_milliseconds();
    format_elapsed_millis(millis)
}

pub fn format_duration(duration: std::time::Duration) -> String {
    format_elapsed_millis(duration.as_millis() as i64)
}

fn format_elapsed_millis(millis: i64) -> String {
    if millis < 1000 {
        format!("{millis}ms")
    } else if millis < 60_000 {
        format!("{:.2}s", millis as f64 / 1000.0)
    } else {
        let minutes = millis / 60_000;
        let seconds = (millis % 60_000) / 1000;
        format!("{minutes}m{seconds:02}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn subsecond_durations_render_in_millis() {
        assert_eq!(format_elapsed_millis(250), "250ms");
        assert_eq!(format_elapsed_millis(0), "0ms");
    }

    #[test]
    fn second_durations_render_with_two_decimals() {
        assert_eq!(format_elapsed_millis(1_500), "1.50s");
        assert_eq!(format_elapsed_millis(59_999), "60.00s");
    }

    #[test]
    fn minute_durations_render_with_padded_seconds() {
        assert_eq!(format_elapsed_millis(60_000), "1m00s");
        assert_eq!(format_elapsed_millis(75_000), "1m15s");
        assert_eq!(format_elapsed_millis(3_599_000), "59m59s");
    }
}
