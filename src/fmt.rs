use rust_decimal::{Decimal, RoundingStrategy};

/// Format an amount with Swiss thousands separators: -1'234.56
pub fn money(val: Decimal) -> String {
    let negative = val.is_sign_negative() && !val.is_zero();
    let abs = val
        .abs()
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let cents = format!("{:.2}", abs);
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let mut grouped = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push('\'');
        }
        grouped.push(c);
    }
    let grouped: String = grouped.chars().rev().collect();

    if negative {
        format!("-{grouped}.{dec_part}")
    } else {
        format!("{grouped}.{dec_part}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_money_formatting() {
        assert_eq!(money(dec("1234.56")), "1'234.56");
        assert_eq!(money(dec("-500")), "-500.00");
        assert_eq!(money(dec("0")), "0.00");
        assert_eq!(money(dec("1000000.99")), "1'000'000.99");
        assert_eq!(money(dec("42.1")), "42.10");
        assert_eq!(money(dec("0.005")), "0.01");
    }
}
