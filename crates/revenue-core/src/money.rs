//! 金额换算
//!
//! 数据源返回的金额只在客户端边界换算一次成最小货币单位，之后全程使用整数。
//! 小数字符串和 JSON 数字都通过 `Decimal` 做精确运算，四舍五入（远离零）只发生一次。

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{CoreError, Result};

/// 币种的小数位数
pub fn currency_exponent(currency: &str) -> u32 {
    match currency.to_ascii_uppercase().as_str() {
        "JPY" | "KRW" | "XOF" | "XAF" | "VND" | "CLP" | "ISK" | "UGX" | "RWF" => 0,
        "BHD" | "KWD" | "OMR" | "JOD" | "TND" | "LYD" | "IQD" => 3,
        _ => 2,
    }
}

/// 主单位金额 -> 最小单位
pub fn to_minor_units(amount: Decimal, currency: &str) -> Result<i64> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(CoreError::InvalidAmount(format!("金额为负: {}", amount)));
    }

    let scale = Decimal::from(10_i64.pow(currency_exponent(currency)));
    amount
        .checked_mul(scale)
        .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|v| v.to_i64())
        .ok_or_else(|| CoreError::InvalidAmount(format!("金额溢出: {}", amount)))
}

/// 解析小数字符串（如 Shopify 的 `"12.34"`）
pub fn parse_major_units(raw: &str, currency: &str) -> Result<i64> {
    let trimmed = raw.trim();
    let amount = parse_decimal(trimmed)
        .ok_or_else(|| CoreError::InvalidAmount(format!("无法解析金额: {:?}", raw)))?;
    to_minor_units(amount, currency)
}

/// 解析 JSON 数字或数字字符串形式的主单位金额
pub fn json_major_units(value: &serde_json::Value, currency: &str) -> Result<i64> {
    match value {
        serde_json::Value::Number(n) => parse_major_units(&n.to_string(), currency),
        serde_json::Value::String(s) => parse_major_units(s, currency),
        serde_json::Value::Null => Ok(0),
        other => Err(CoreError::InvalidAmount(format!("金额类型错误: {}", other))),
    }
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    if raw.contains(['e', 'E']) {
        Decimal::from_scientific(raw).ok()
    } else {
        Decimal::from_str(raw).ok()
    }
}

/// 格式化为展示金额，如 `₦5,000.00`
pub fn format_amount(minor_units: i64, currency: &str) -> String {
    let exponent = currency_exponent(currency);
    let major = Decimal::new(minor_units, exponent);
    let text = major.abs().to_string();

    let (integer, fraction) = match text.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (text, None),
    };

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, ch) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if minor_units < 0 { "-" } else { "" };
    let number = match fraction {
        Some(f) => format!("{}.{}", grouped, f),
        None => grouped,
    };

    match currency_symbol(currency) {
        Some(symbol) => format!("{}{}{}", sign, symbol, number),
        None => format!("{}{} {}", sign, currency.to_ascii_uppercase(), number),
    }
}

fn currency_symbol(currency: &str) -> Option<&'static str> {
    match currency.to_ascii_uppercase().as_str() {
        "NGN" => Some("₦"),
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "JPY" => Some("¥"),
        "GHS" => Some("₵"),
        "KES" => Some("KSh"),
        "ZAR" => Some("R"),
        _ => None,
    }
}
