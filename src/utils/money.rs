use rust_decimal::Decimal;
use std::str::FromStr;

/// Numeric value of a free-text pay rate: the first run of digits and commas,
/// commas removed. `"NPR 1,500/hour"` gives 1500.
pub fn parse_pay_rate(pay_rate: &str) -> Option<Decimal> {
    let start = pay_rate.find(|c: char| c.is_ascii_digit())?;
    let run: String = pay_rate[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(|c| *c != ',')
        .collect();
    Decimal::from_str(&run).ok()
}

/// Decimal places the money columns store.
pub const AMOUNT_SCALE: u32 = 2;

/// True when `amount` is storable without rounding: `12.50` and `12.500` are,
/// `0.004` is not.
pub fn is_whole_paisa(amount: Decimal) -> bool {
    amount.normalize().scale() <= AMOUNT_SCALE
}

/// Parses a typed amount. Blank, malformed and non-finite input yields `None`.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed).ok()
}

fn group_indian(whole: &str) -> String {
    if whole.len() <= 3 {
        return whole.to_string();
    }
    let (head, tail) = whole.split_at(whole.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut rest = head;
    while rest.len() > 2 {
        let (left, right) = rest.split_at(rest.len() - 2);
        groups.push(right);
        rest = left;
    }
    if !rest.is_empty() {
        groups.push(rest);
    }
    groups.reverse();
    format!("{},{}", groups.join(","), tail)
}

fn grouped(text: &str) -> String {
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    match digits.split_once('.') {
        Some((whole, frac)) => format!("{}{}.{}", sign, group_indian(whole), frac),
        None => format!("{}{}", sign, group_indian(digits)),
    }
}

/// `रु 1,23,456.00`, using Indian digit grouping.
pub fn format_npr(amount: Decimal) -> String {
    format!("रु {}", grouped(&format!("{:.2}", amount.round_dp(2))))
}

/// Indian-grouped amount without forced decimals: `1500` gives `1,500`.
pub fn format_amount(amount: Decimal) -> String {
    grouped(&amount.round_dp(2).normalize().to_string())
}
