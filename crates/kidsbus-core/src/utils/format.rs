/// Extract just the digits of a phone number
pub fn phone_digits(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Format a phone number for display
/// Local mobile numbers (05XXXXXXXX) become 05X XXX XXXX
pub fn format_phone(phone: &str) -> String {
    let digits = phone_digits(phone);

    match digits.len() {
        10 if digits.starts_with('0') => format!(
            "{} {} {}",
            &digits[0..3],
            &digits[3..6],
            &digits[6..10]
        ),
        12 if digits.starts_with("966") => format!(
            "+966 {} {} {}",
            &digits[3..5],
            &digits[5..8],
            &digits[8..12]
        ),
        _ => phone.to_string(), // Return original if can't format
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}
