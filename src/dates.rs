//! Date extraction from report file names.
//!
//! Report files carry their trade date in the name (`oil_xls_YYYYMMDD…`);
//! file content never supplies it.

use chrono::NaiveDate;

/// Parse the first run of 8 ASCII digits in `name` as a `YYYYMMDD` date.
///
/// Returns `None` when no 8-digit run exists or the digits are not a valid
/// calendar date. Callers must treat `None` as "ordering unknown", never as
/// infinitely old or new.
pub fn date_in_name(name: &str) -> Option<NaiveDate> {
    let bytes = name.as_bytes();
    let mut run = 0usize;
    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            run += 1;
            if run == 8 {
                let digits = &name[i + 1 - 8..=i];
                return NaiveDate::parse_from_str(digits, "%Y%m%d").ok();
            }
        } else {
            run = 0;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_date_from_report_name() {
        assert_eq!(
            date_in_name("oil_xls_20230101.xls"),
            NaiveDate::from_ymd_opt(2023, 1, 1)
        );
    }

    #[test]
    fn takes_first_eight_digits_of_longer_runs() {
        // Real report names append a time component: oil_xls_20230101162000.xls
        assert_eq!(
            date_in_name("oil_xls_20230101162000.xls"),
            NaiveDate::from_ymd_opt(2023, 1, 1)
        );
    }

    #[test]
    fn no_digits_means_absent() {
        assert_eq!(date_in_name("no_date_here.xls"), None);
        assert_eq!(date_in_name(""), None);
    }

    #[test]
    fn invalid_calendar_date_means_absent() {
        assert_eq!(date_in_name("oil_xls_20231301.xls"), None);
        assert_eq!(date_in_name("oil_xls_20230230.xls"), None);
    }

    #[test]
    fn short_digit_runs_do_not_match() {
        assert_eq!(date_in_name("oil_xls_2023.xls"), None);
    }
}
