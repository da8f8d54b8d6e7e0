//! Presentation helpers for dashboard figures. Everything here is pure.

use serde::{Deserialize, Serialize};

use crate::models::{TrendDirection, TrendIndicator};

/// Percent change inside this band (either way) reads as stable.
pub const TREND_DEAD_BAND: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Green,
    Yellow,
    Orange,
    Red,
}

/// Progress of `current` towards `target` as a 0-100 score.
pub fn health_score(current: f64, target: f64, lower_is_better: bool) -> u8 {
    if target <= 0.0 || !current.is_finite() {
        return 0;
    }
    let score = (current / target * 100.0).clamp(0.0, 100.0);
    let score = if lower_is_better { 100.0 - score } else { score };
    score.round() as u8
}

pub fn status_color(score: u8) -> StatusColor {
    match score {
        80.. => StatusColor::Green,
        60..=79 => StatusColor::Yellow,
        40..=59 => StatusColor::Orange,
        _ => StatusColor::Red,
    }
}

pub fn trend_indicator(current: f64, previous: Option<f64>) -> TrendIndicator {
    let previous = match previous {
        Some(value) if value != 0.0 => value,
        _ => {
            return TrendIndicator {
                direction: TrendDirection::Stable,
                percent_change: 0.0,
            }
        }
    };

    let change = (current - previous) / previous.abs() * 100.0;
    let percent_change = (change * 10.0).round() / 10.0;
    let direction = if percent_change > TREND_DEAD_BAND {
        TrendDirection::Up
    } else if percent_change < -TREND_DEAD_BAND {
        TrendDirection::Down
    } else {
        TrendDirection::Stable
    };

    TrendIndicator {
        direction,
        percent_change,
    }
}

/// Rounds before picking the suffix, so 999.6 reads `1.0K`, never `1000`.
pub fn abbreviate_number(value: f64) -> String {
    if value.round().abs() < 1_000.0 {
        return format!("{}", value.round() as i64);
    }
    let thousands = (value / 100.0).round() / 10.0;
    if thousands.abs() < 1_000.0 {
        format!("{thousands:.1}K")
    } else {
        format!("{:.1}M", (value / 100_000.0).round() / 10.0)
    }
}

/// US-dollar amount rounded to whole dollars with thousands separators.
pub fn format_currency(amount: f64) -> String {
    let rounded = amount.round() as i64;
    let digits = rounded.unsigned_abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if rounded < 0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}
