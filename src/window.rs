use chrono::{Days, NaiveDate};

/// Suffix appended to every date header cell, e.g. `2024-01-03 (Qty)`.
pub const QTY_SUFFIX: &str = " (Qty)";

/// Date columns of a `window_size`-day window anchored on `today`,
/// newest first: `[today, today-1, ..., today-(window_size-1)]`.
pub fn plan(window_size: usize, today: NaiveDate) -> Vec<NaiveDate> {
    (0..window_size as u64)
        .map_while(|offset| today.checked_sub_days(Days::new(offset)))
        .collect()
}

pub fn header_label(date: NaiveDate) -> String {
    format!("{}{QTY_SUFFIX}", date.format("%Y-%m-%d"))
}
