//! Time formatting helpers

use std::time::Duration;

/// Format an elapsed duration as `MM:SS.cc` (minutes, seconds, centiseconds).
///
/// Minutes are not wrapped at the hour, so long runs read e.g. `75:02.50`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    format!(
        "{:02}:{:02}.{:02}",
        total_secs / 60,
        total_secs % 60,
        elapsed.subsec_millis() / 10
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Duration::ZERO, "00:00.00")]
    #[case(Duration::from_millis(1_234), "00:01.23")]
    #[case(Duration::from_millis(61_009), "01:01.00")]
    #[case(Duration::from_secs(4_502) + Duration::from_millis(500), "75:02.50")]
    fn test_format_elapsed(#[case] elapsed: Duration, #[case] expected: &str) {
        assert_eq!(format_elapsed(elapsed), expected);
    }
}
