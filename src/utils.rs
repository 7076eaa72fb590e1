use crate::error::{Error, Result};

/// 解析EDF时间字符串为100纳秒单位
pub fn parse_edf_time(s: &str) -> Result<i64> {
    let s = s.trim();

    if s.is_empty() {
        return Err(Error::InvalidFormat("Empty time string".to_string()));
    }

    // 处理符号
    let (negative, s) = if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    };

    let invalid = |what: &str| Error::InvalidFormat(format!("Invalid {} in time '{}'", what, s));

    let (integer_part, decimal_part) = match s.find('.') {
        Some(dot_pos) => (&s[..dot_pos], &s[dot_pos + 1..]),
        None => (s, ""),
    };

    if integer_part.is_empty() && decimal_part.is_empty() {
        return Err(invalid("value"));
    }
    if !integer_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("integer part"));
    }
    if !decimal_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("decimal part"));
    }

    let mut value = 0i64;
    if !integer_part.is_empty() {
        value = integer_part
            .parse::<i64>()
            .ok()
            .and_then(|v| v.checked_mul(crate::EDFLIB_TIME_DIMENSION))
            .ok_or_else(|| invalid("integer part"))?;
    }

    // 小数部分最多7位精度，全部为ASCII数字，可按字节截断
    if !decimal_part.is_empty() {
        let decimal_str = &decimal_part[..decimal_part.len().min(7)];
        let decimal_value = decimal_str
            .parse::<i64>()
            .map_err(|_| invalid("decimal part"))?;

        let scale = 10i64.pow(7 - decimal_str.len() as u32);
        value = value
            .checked_add(decimal_value * scale)
            .ok_or_else(|| invalid("value"))?;
    }

    if negative {
        value = -value;
    }

    Ok(value)
}

/// 将100纳秒单位的时间格式化为TAL中使用的秒字符串（去掉多余的零）
pub fn format_edf_time(value: i64) -> String {
    let dimension = crate::EDFLIB_TIME_DIMENSION;
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.abs();
    let whole = abs / dimension;
    let frac = abs % dimension;
    if frac == 0 {
        format!("{}{}", sign, whole)
    } else {
        let frac_str = format!("{:07}", frac);
        format!("{}{}.{}", sign, whole, frac_str.trim_end_matches('0'))
    }
}

/// 把头部中的ASCII字段转换为去掉空格填充的字符串
pub fn ascii_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

/// 非本地化的整数解析（避免受系统locale影响）
pub fn atoi_nonlocalized(s: &str) -> i32 {
    let s = s.trim();
    if s.is_empty() {
        return 0;
    }

    s.parse().unwrap_or(0)
}

/// 非本地化的浮点数解析
pub fn atof_nonlocalized(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }

    s.parse().unwrap_or(0.0)
}

/// 写入定长ASCII字段，超长截断，不足补空格
pub fn pad_field(value: &str, width: usize) -> Vec<u8> {
    let mut field = vec![b' '; width];
    let bytes: Vec<u8> = value
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c as u8 } else { b'_' })
        .collect();
    let len = bytes.len().min(width);
    field[..len].copy_from_slice(&bytes[..len]);
    field
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_edf_time() {
        assert_eq!(parse_edf_time("1").unwrap(), 10_000_000);
        assert_eq!(parse_edf_time("1.5").unwrap(), 15_000_000);
        assert_eq!(parse_edf_time("-2.5").unwrap(), -25_000_000);
        assert_eq!(parse_edf_time("+0.0000001").unwrap(), 1);
        assert_eq!(parse_edf_time("+30").unwrap(), 300_000_000);
        assert!(parse_edf_time("abc").is_err());
        assert!(parse_edf_time("").is_err());
        assert!(parse_edf_time(".").is_err());
        assert!(parse_edf_time("1.2e3").is_err());
    }

    #[test]
    fn test_parse_edf_time_rejects_bad_bytes_and_huge_values() {
        // 小数部分第7个字节落在多字节字符中间
        assert!(parse_edf_time("+1.123456é").is_err());
        assert!(parse_edf_time("+1000000000000").is_err());
        assert!(parse_edf_time(&i64::MAX.to_string()).is_err());
        assert_eq!(parse_edf_time("1.123456789").unwrap(), 11_234_567);
    }

    #[test]
    fn test_format_edf_time() {
        assert_eq!(format_edf_time(0), "0");
        assert_eq!(format_edf_time(300_000_000), "30");
        assert_eq!(format_edf_time(15_000_000), "1.5");
        assert_eq!(format_edf_time(1), "0.0000001");
        assert_eq!(parse_edf_time(&format_edf_time(123_456_789)).unwrap(), 123_456_789);
    }

    #[test]
    fn test_pad_field() {
        assert_eq!(pad_field("3000", 8), b"3000    ".to_vec());
        assert_eq!(pad_field("EEG Fpz-Cz-very-long", 8), b"EEG Fpz-".to_vec());
    }
}
