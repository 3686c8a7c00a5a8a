use std::time::Duration;

/// `TOTAL TIME ELAPSED: 1.23s`
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("TOTAL TIME ELAPSED: {:.2}s", elapsed.as_secs_f64())
}
