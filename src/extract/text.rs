use regex::Regex;
use std::sync::LazyLock;

use crate::models::PriceValue;

/// Thousands separators seen in the source markup besides the plain period.
const THIN_SPACES: [char; 3] = ['\u{00A0}', '\u{202F}', '\u{2009}'];

static RE_MULTI_WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());

/// Currency-shaped number: 1-3 leading digits, optional period/NBSP-separated
/// thousands groups, optional two-digit comma decimals. Deliberately does not
/// match bare 4+ digit runs, which are usually object numbers.
pub static RE_EUR_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,3}(?:[.\u{00A0}\u{202F}\u{2009}]\d{3})*(?:,\d{2})?\b").unwrap()
});

/// Same shape with an optional trailing currency marker.
pub static RE_EUR_ANY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,3}(?:[.\u{00A0}\u{202F}\u{2009}]\d{3})*(?:,\d{2})?\b\s*(?:€|EUR\b)?")
        .unwrap()
});

/// Same shape with a required currency marker, for scanning noisy context
/// where bare numbers are usually not prices.
pub static RE_EUR_CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,3}(?:[.\u{00A0}\u{202F}\u{2009}]\d{3})*(?:,\d{2})?\b\s*(?:€|EUR\b)")
        .unwrap()
});

/// `<price keyword> : <number> €?` in flattened page text.
pub static RE_PRICE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(kaufpreis|preis|kaltmiete|warmmiete|nettokaltmiete|miete)\s*:?\s*([0-9.\u{00A0}\u{202F}\u{2009},]+)\s*€?",
    )
    .unwrap()
});

/// Collapse runs of two or more whitespace characters into a single space and
/// trim the ends. Total over any input.
pub fn normalize_ws(s: &str) -> String {
    RE_MULTI_WS.replace_all(s.trim(), " ").to_string()
}

/// Normalize a locale-formatted number string to parseable form.
///
/// Rules: strip NBSP-family separators; comma and period together mean
/// period-thousands and comma-decimal; comma alone is the decimal separator;
/// periods alone are thousands separators only when the trailing group has 3
/// or 6 digits (so a genuine decimal like `123.45` survives).
pub fn normalize_number_string(s: &str) -> String {
    let mut s = s.trim().to_string();
    for ch in THIN_SPACES {
        s = s.replace(ch, "");
    }
    if s.contains(',') && s.contains('.') {
        s = s.replace('.', "").replace(',', ".");
    } else if s.contains(',') {
        s = s.replace(',', ".");
    } else if s.contains('.') {
        let last = s.rsplit('.').next().unwrap_or("");
        if !last.is_empty()
            && last.chars().all(|c| c.is_ascii_digit())
            && (last.len() == 3 || last.len() == 6)
        {
            s = s.replace('.', "");
        }
    }
    s
}

/// Format an amount as the display string used in records: period thousands
/// separators, no decimal places, trailing euro sign.
pub fn format_price_display(amount: f64) -> String {
    let rounded = amount.round() as i64;
    let digits = rounded.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    if rounded < 0 {
        grouped.insert(0, '-');
    }
    format!("{} €", grouped)
}

/// Find the first currency-shaped number in `raw` and normalize it into a
/// `PriceValue`. Returns `None` when nothing currency-shaped is present.
pub fn clean_price(raw: &str) -> Option<PriceValue> {
    let m = RE_EUR_NUMBER.find(raw)?;
    let amount: f64 = normalize_number_string(m.as_str()).parse().ok()?;
    Some(PriceValue {
        display: format_price_display(amount),
        amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_ws_collapses_runs() {
        assert_eq!(normalize_ws("  a   b\t\tc  "), "a b c");
        assert_eq!(normalize_ws("a\u{00A0}\u{00A0}b"), "a b");
        assert_eq!(normalize_ws(""), "");
    }

    #[test]
    fn test_number_normalization_equivalence() {
        // All supported separator styles yield the same numeric value.
        for input in ["479.000,00", "479.000", "479000,00"] {
            let normalized = normalize_number_string(input);
            assert_eq!(normalized.parse::<f64>().unwrap(), 479_000.0, "input {input}");
        }
    }

    #[test]
    fn test_number_normalization_thin_spaces() {
        assert_eq!(
            normalize_number_string("1\u{202F}234\u{00A0}567,89"),
            "1234567.89"
        );
    }

    #[test]
    fn test_period_only_decimal_survives() {
        // Trailing group of 2 digits is a decimal, not a thousands group.
        assert_eq!(normalize_number_string("123.45"), "123.45");
        // Trailing group of 3 digits is a thousands group.
        assert_eq!(normalize_number_string("1.234.567"), "1234567");
    }

    #[test]
    fn test_clean_price_display() {
        let price = clean_price("479.000,00 €").unwrap();
        assert_eq!(price.amount, 479_000.0);
        assert_eq!(price.display, "479.000 €");

        let price = clean_price("Kaufpreis: 1.250.000 €").unwrap();
        assert_eq!(price.amount, 1_250_000.0);
        assert_eq!(price.display, "1.250.000 €");
    }

    #[test]
    fn test_clean_price_not_found_is_none() {
        assert!(clean_price("keine Preisangabe").is_none());
        assert!(clean_price("").is_none());
    }

    #[test]
    fn test_format_price_display_grouping() {
        assert_eq!(format_price_display(950.0), "950 €");
        assert_eq!(format_price_display(12_500.0), "12.500 €");
        assert_eq!(format_price_display(479_000.4), "479.000 €");
    }

    #[test]
    fn test_price_line_regex() {
        let caps = RE_PRICE_LINE.captures("Kaltmiete: 1.250 €").unwrap();
        assert_eq!(&caps[1].to_lowercase(), "kaltmiete");
        assert_eq!(caps[2].trim(), "1.250");
    }
}
