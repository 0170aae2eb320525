//! Firmware version comparison.

use core::cmp::Ordering;

/// Numeric value of one dot-separated component. Leading digits count;
/// anything after them (e.g. `"3-rc1"`) and non-numeric components read as 0.
fn component(part: &str) -> u64 {
    part.trim()
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u64, |acc, d| acc.saturating_mul(10).saturating_add(u64::from(d - b'0')))
}

/// Three-way comparison of dot-separated numeric versions.
///
/// Components compare numerically (`1.10 > 1.2`) and the shorter version is
/// padded with zeros (`1.0 == 1.0.0`). `Ordering::Less` means `advertised`
/// is newer than `current`.
pub fn compare_versions(current: &str, advertised: &str) -> Ordering {
    let mut a = current.split('.');
    let mut b = advertised.split('.');
    loop {
        match (a.next(), b.next()) {
            (None, None) => return Ordering::Equal,
            (x, y) => {
                let ord = component(x.unwrap_or("0")).cmp(&component(y.unwrap_or("0")));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// True if `advertised` is strictly newer than `current`.
pub fn is_newer(current: &str, advertised: &str) -> bool {
    compare_versions(current, advertised) == Ordering::Less
}
