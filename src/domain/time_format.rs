// ==========================================
// 相机陷阱标注系统 - 时间格式
// ==========================================
// 电子表格日期时间: yyyy-MM-ddTHH:mm:ss.fffZ（UTC,毫秒精度）
// UTC 偏移: 十进制小时,分钟非零时保留两位小数（"5.50" = +5:30）
// ==========================================

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// 日期时间文本固定长度
const DATE_TIME_LENGTH: usize = 24;
/// UTC 偏移下限（小时）
pub const MIN_UTC_OFFSET_HOURS: f64 = -12.0;
/// UTC 偏移上限（小时）
pub const MAX_UTC_OFFSET_HOURS: f64 = 14.0;
/// UTC 偏移粒度（分钟）
pub const UTC_OFFSET_GRANULARITY_MINUTES: i32 = 15;

/// 格式化为电子表格日期时间
pub fn format_spreadsheet_date_time(date_time: &DateTime<Utc>) -> String {
    date_time.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// 解析电子表格日期时间
///
/// 严格匹配 yyyy-MM-ddTHH:mm:ss.fffZ;月份、日期（含闰年）和时分秒均做范围校验
pub fn parse_spreadsheet_date_time(text: &str) -> Option<DateTime<Utc>> {
    let bytes = text.as_bytes();
    if bytes.len() != DATE_TIME_LENGTH {
        return None;
    }
    if bytes[4] != b'-'
        || bytes[7] != b'-'
        || bytes[10] != b'T'
        || bytes[13] != b':'
        || bytes[16] != b':'
        || bytes[19] != b'.'
        || bytes[23] != b'Z'
    {
        return None;
    }

    let year = parse_digits(&bytes[0..4])?;
    let month = parse_digits(&bytes[5..7])?;
    let day = parse_digits(&bytes[8..10])?;
    let hour = parse_digits(&bytes[11..13])?;
    let minute = parse_digits(&bytes[14..16])?;
    let second = parse_digits(&bytes[17..19])?;
    let millisecond = parse_digits(&bytes[20..23])?;

    let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;
    let time = NaiveTime::from_hms_milli_opt(hour, minute, second, millisecond)?;
    Some(NaiveDateTime::new(date, time).and_utc())
}

fn parse_digits(bytes: &[u8]) -> Option<u32> {
    let mut value = 0u32;
    for byte in bytes {
        if !byte.is_ascii_digit() {
            return None;
        }
        value = value * 10 + u32::from(byte - b'0');
    }
    Some(value)
}

/// 格式化 UTC 偏移（小时）
///
/// 整小时不带小数（"-7"）;否则分钟折算为两位百分数（"5.50"、"-3.75"）
pub fn format_utc_offset_hours(hours: f64) -> String {
    let total_minutes = (hours * 60.0).round() as i64;
    let sign = if total_minutes < 0 { "-" } else { "" };
    let absolute = total_minutes.abs();
    let whole_hours = absolute / 60;
    let minutes = absolute % 60;
    if minutes == 0 {
        format!("{}{}", sign, whole_hours)
    } else {
        format!("{}{}.{:02}", sign, whole_hours, minutes * 100 / 60)
    }
}

/// 解析 UTC 偏移（小时）
///
/// 接受可选负号、整数部分与可选小数部分;
/// 结果必须落在 [-12, 14] 内且为 15 分钟的整数倍
pub fn parse_utc_offset_hours(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (unsigned, ""),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) || fraction.len() > 6 {
        return None;
    }

    let whole_hours: i64 = whole.parse().ok()?;
    let fraction_minutes = if fraction.is_empty() {
        0
    } else {
        let numerator: i64 = fraction.parse().ok()?;
        let denominator = 10i64.pow(fraction.len() as u32);
        // 四舍五入到最近的分钟: "5.50" -> 30, "3.33" -> 20
        (numerator * 60 * 2 + denominator) / (denominator * 2)
    };

    let mut total_minutes = whole_hours.checked_mul(60)?.checked_add(fraction_minutes)?;
    if negative {
        total_minutes = -total_minutes;
    }
    if total_minutes % i64::from(UTC_OFFSET_GRANULARITY_MINUTES) != 0 {
        return None;
    }

    let hours = total_minutes as f64 / 60.0;
    if !(MIN_UTC_OFFSET_HOURS..=MAX_UTC_OFFSET_HOURS).contains(&hours) {
        return None;
    }
    Some(hours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_date_time_format() {
        let date_time = Utc.with_ymd_and_hms(2016, 2, 29, 14, 5, 9).unwrap()
            + chrono::Duration::milliseconds(7);
        assert_eq!(format_spreadsheet_date_time(&date_time), "2016-02-29T14:05:09.007Z");
        assert_eq!(parse_spreadsheet_date_time("2016-02-29T14:05:09.007Z"), Some(date_time));
    }

    #[test]
    fn test_date_time_rejects_invalid_calendar_values() {
        assert!(parse_spreadsheet_date_time("2015-02-29T00:00:00.000Z").is_none());
        assert!(parse_spreadsheet_date_time("2016-13-01T00:00:00.000Z").is_none());
        assert!(parse_spreadsheet_date_time("2016-04-31T00:00:00.000Z").is_none());
        assert!(parse_spreadsheet_date_time("2016-04-30T25:00:00.000Z").is_none());
        assert!(parse_spreadsheet_date_time("2016-04-30 12:00:00.000Z").is_none());
        assert!(parse_spreadsheet_date_time("2016-04-30T12:00:00Z").is_none());
        assert!(parse_spreadsheet_date_time("").is_none());
    }

    #[test]
    fn test_utc_offset_format() {
        assert_eq!(format_utc_offset_hours(-7.0), "-7");
        assert_eq!(format_utc_offset_hours(5.5), "5.50");
        assert_eq!(format_utc_offset_hours(12.75), "12.75");
        assert_eq!(format_utc_offset_hours(-3.25), "-3.25");
        assert_eq!(format_utc_offset_hours(-0.5), "-0.50");
        assert_eq!(format_utc_offset_hours(0.0), "0");
    }

    #[test]
    fn test_utc_offset_parse() {
        assert_eq!(parse_utc_offset_hours("-7"), Some(-7.0));
        assert_eq!(parse_utc_offset_hours("5.50"), Some(5.5));
        assert_eq!(parse_utc_offset_hours("5.5"), Some(5.5));
        assert_eq!(parse_utc_offset_hours("12.75"), Some(12.75));
        assert_eq!(parse_utc_offset_hours("14"), Some(14.0));
        assert_eq!(parse_utc_offset_hours("-12"), Some(-12.0));
    }

    #[test]
    fn test_utc_offset_rejects_out_of_range_and_granularity() {
        assert!(parse_utc_offset_hours("15").is_none());
        assert!(parse_utc_offset_hours("-12.25").is_none());
        assert!(parse_utc_offset_hours("5.10").is_none());
        assert!(parse_utc_offset_hours("abc").is_none());
        assert!(parse_utc_offset_hours("").is_none());
        assert!(parse_utc_offset_hours("-").is_none());
    }
}
