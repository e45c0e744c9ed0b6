//! Display helpers for money and percentages.

/// Format an amount with thousands separators, two decimals and the
/// currency code: `-1,234.50 GBP`.
pub fn format_money(amount: f64, currency: &str) -> String {
    if !amount.is_finite() {
        return format!("— {}", currency.to_uppercase());
    }
    let rounded = (amount * 100.0).round() / 100.0;
    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{sign}{} {}", group_thousands(rounded.abs()), currency.to_uppercase())
}

/// Format a percentage with an explicit sign: `+1.23%`, `-0.50%`, `0.00%`.
pub fn format_percent(pct: f64) -> String {
    if !pct.is_finite() {
        return "—".to_string();
    }
    let rounded = (pct * 100.0).round() / 100.0;
    if rounded > 0.0 {
        format!("+{rounded:.2}%")
    } else if rounded < 0.0 {
        format!("{rounded:.2}%")
    } else {
        "0.00%".to_string()
    }
}

fn group_thousands(value: f64) -> String {
    let fixed = format!("{value:.2}");
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((&fixed, "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{grouped}.{frac_part}")
}
