// EAN/UPC style check digits (weights 3,1,3,1,... counted from the right)

/// Check digit for `digits` (the code without its last character).
///
/// Returns None when any character is not an ASCII digit.
pub fn check_digit(digits: &str) -> Option<u32> {
    let mut sum = 0;

    for (position, c) in digits.chars().rev().enumerate() {
        let digit = c.to_digit(10)?;
        let weight = if position % 2 == 0 { 3 } else { 1 };
        sum += weight * digit;
    }

    Some((10 - sum % 10) % 10)
}

pub fn is_valid(barcode: &str) -> bool {
    let mut chars = barcode.chars();
    let last = match chars.next_back().and_then(|c| c.to_digit(10)) {
        Some(d) => d,
        None => return false,
    };

    check_digit(chars.as_str()) == Some(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ean13() {
        assert!(is_valid("4006381333931"));
        assert!(is_valid("5901234123457"));
    }

    #[test]
    fn test_flipped_check_digit_fails() {
        assert!(!is_valid("4006381333932"));
        assert!(!is_valid("5901234123450"));
    }

    #[test]
    fn test_ean8_and_upc() {
        assert!(is_valid("96385074"));
        assert!(is_valid("036000291452"));
    }

    #[test]
    fn test_non_digits_and_empty() {
        assert!(!is_valid(""));
        assert!(!is_valid("40063813339X"));
        assert!(!is_valid("4006381A33931"));
        assert_eq!(check_digit("12a"), None);
    }

    #[test]
    fn test_weight_next_to_check_digit_is_three() {
        // 3*7 = 21 → 10 - 1 = 9
        assert_eq!(check_digit("7"), Some(9));
        // 1*1 + 3*2 = 7 → 3
        assert_eq!(check_digit("12"), Some(3));
        assert_eq!(check_digit(""), Some(0));
    }
}
