//! Formatting helpers for console display.
//!
//! Small utilities every consuming application (status panels, CLI tools)
//! needs when rendering cached settings and reception statistics.

/// Format a frequency in megahertz as a display string.
///
/// # Example
///
/// ```
/// use loralink_core::format_frequency_mhz;
///
/// assert_eq!(format_frequency_mhz(915.0), "915.000 MHz");
/// assert_eq!(format_frequency_mhz(868.125), "868.125 MHz");
/// ```
pub fn format_frequency_mhz(mhz: f32) -> String {
    format!("{mhz:.3} MHz")
}

/// Format a sync word as a hex literal, the way node firmware documents it.
///
/// # Example
///
/// ```
/// use loralink_core::format_sync_word;
///
/// assert_eq!(format_sync_word(0x34), "0x34");
/// assert_eq!(format_sync_word(0x1424), "0x1424");
/// ```
pub fn format_sync_word(sync_word: u32) -> String {
    format!("{sync_word:#x}")
}

/// Format a reception success rate as a percentage string.
///
/// The rate is derived from the two counters at call time; it is never
/// stored, so it cannot drift from them. Zero receptions renders as
/// `"0.00%"`.
///
/// # Example
///
/// ```
/// use loralink_core::format_success_rate;
///
/// assert_eq!(format_success_rate(2, 3), "66.67%");
/// assert_eq!(format_success_rate(0, 0), "0.00%");
/// ```
pub fn format_success_rate(received_ok: u64, received_total: u64) -> String {
    let rate = if received_total > 0 {
        received_ok as f64 / received_total as f64 * 100.0
    } else {
        0.0
    };
    format!("{rate:.2}%")
}
