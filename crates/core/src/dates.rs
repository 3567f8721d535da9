use chrono::{Datelike, Days, NaiveDate};

/// Deterministic conversion of relative date phrases ("tomorrow", "next
/// weekend", "next week", "next month" with early/mid/late qualifiers) into a
/// concrete date. Case-insensitive substring match, first hit wins.
///
/// "next weekend" must be checked ahead of "next week": the former contains
/// the latter.
pub fn parse_relative_phrase(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lower = text.to_lowercase();

    if lower.contains("tomorrow") {
        return today.checked_add_days(Days::new(1));
    }

    if lower.contains("next weekend") {
        let weekday = today.weekday().num_days_from_monday();
        let days_until_saturday = (5 + 7 - weekday) % 7;
        return today.checked_add_days(Days::new(u64::from(days_until_saturday)));
    }

    if lower.contains("next week") {
        return today.checked_add_days(Days::new(7));
    }

    if lower.contains("next month") {
        let base = first_of_next_month(today)?;
        return if lower.contains("early") || lower.contains("beginning") {
            Some(base)
        } else if lower.contains("mid") {
            base.checked_add_days(Days::new(14))
        } else if lower.contains("late") || lower.contains("end") {
            base.with_day(28)
        } else {
            Some(base)
        };
    }

    None
}

fn first_of_next_month(today: NaiveDate) -> Option<NaiveDate> {
    if today.month() == 12 {
        NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(today.year(), today.month() + 1, 1)
    }
}

/// Re-applies the relative-phrase conversion to a model-proposed start date
/// so natural-language values are pinned deterministically rather than
/// trusted verbatim. Anything else passes through trimmed.
pub fn normalize_start_date(value: &str, today: NaiveDate) -> String {
    match parse_relative_phrase(value, today) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => value.trim().to_string(),
    }
}

/// Best-effort cleanup of a trip-duration value: strip "day"/"days", unify
/// range separators, fold a numeric range to its floor midpoint, canonicalize
/// a bare integer. Unparseable input stays as the cleaned string.
pub fn normalize_num_days(value: &str) -> String {
    let cleaned = value
        .to_lowercase()
        .replace("days", "")
        .replace("day", "")
        .replace("to", "-")
        .replace('\u{2013}', "-")
        .replace('\u{2014}', "-");
    let cleaned = cleaned.trim();

    if cleaned.contains('-') {
        let bounds: Vec<i64> = cleaned
            .split('-')
            .filter_map(|part| {
                let part = part.trim();
                if !part.is_empty() && part.chars().all(|ch| ch.is_ascii_digit()) {
                    part.parse::<i64>().ok()
                } else {
                    None
                }
            })
            .collect();
        if let [low, high] = bounds[..] {
            return ((low + high) / 2).to_string();
        }
    } else if let Ok(days) = cleaned.parse::<i64>() {
        return days.to_string();
    }

    cleaned.to_string()
}

/// Endpoint-side coercion: first integer found in the string, else 5.
pub fn coerce_num_days(raw: &str) -> u32 {
    let mut digits = String::new();
    for ch in raw.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
        } else if !digits.is_empty() {
            break;
        }
    }
    digits.parse().unwrap_or(5)
}

const DATE_FORMATS: [&str; 8] = [
    "%d %B %Y", "%d %b %Y", "%B %d %Y", "%b %d %Y", "%d/%m/%Y", "%m/%d/%Y", "%d-%m-%Y", "%m-%d-%Y",
];

/// Endpoint-side coercion of an assorted-format start date. ISO is accepted
/// as-is; otherwise the format list is tried in order; a bare integer N means
/// "N days from now plus a 5-day buffer"; everything else falls back to five
/// days from today.
pub fn coerce_start_date(raw: &str, today: NaiveDate) -> NaiveDate {
    let trimmed = raw.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date;
    }

    if !trimmed.is_empty() && trimmed.chars().all(|ch| ch.is_ascii_digit()) {
        if let Ok(days_from_now) = trimmed.parse::<u64>() {
            if let Some(date) = today.checked_add_days(Days::new(days_from_now + 5)) {
                return date;
            }
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date;
        }
    }

    today
        .checked_add_days(Days::new(5))
        .unwrap_or(today)
}

/// "01 Jun 2025" style used in prompts and the itinerary date range.
pub fn format_human(date: NaiveDate) -> String {
    date.format("%d %b %Y").to_string()
}
