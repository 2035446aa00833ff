//! Client-side input validation.
//!
//! Validators return `Err(message)` with a user-facing message. Collect them
//! into a single `VALIDATION_ERROR` with `ValidationErrorBuilder` from the
//! `error` module; nothing here touches the network.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Loose e-mail shape: something@something.tld, no whitespace
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();

    /// 24-hour clock time (e.g., 08:30, 17:00)
    static ref TIME_REGEX: Regex = Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").unwrap();

    /// Record id usable as a single URL path segment
    static ref ID_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 6;

/// Validate that a text field is present and not blank
pub fn validate_required(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("必須項目です".to_string());
    }
    Ok(())
}

/// Validate an e-mail address
pub fn validate_email(email: &str) -> Result<(), String> {
    if !EMAIL_REGEX.is_match(email) {
        return Err("有効なメールアドレスを入力してください".to_string());
    }
    Ok(())
}

/// Validate a password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!("パスワードは{}文字以上で入力してください", MIN_PASSWORD_LEN));
    }
    Ok(())
}

/// Validate that a period does not end before it starts
pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), String> {
    if end < start {
        return Err("終了日は開始日以降の日付を指定してください".to_string());
    }
    Ok(())
}

/// Validate a clock time in HH:MM format
pub fn validate_time(time: &str) -> Result<(), String> {
    if !TIME_REGEX.is_match(time) {
        return Err("時刻はHH:MM形式で入力してください".to_string());
    }
    Ok(())
}

/// Validate a record id before it is placed in a URL path
pub fn validate_id(id: &str) -> Result<(), String> {
    if !ID_REGEX.is_match(id) {
        return Err("IDには英数字・ハイフン・アンダースコアのみ使用できます".to_string());
    }
    Ok(())
}

/// Validate a monetary amount (yen, no negatives)
pub fn validate_amount(amount: i64) -> Result<(), String> {
    if amount < 0 {
        return Err("金額は0以上で入力してください".to_string());
    }
    Ok(())
}

/// Validate a day / hour count (non-negative, finite)
pub fn validate_quantity(value: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 {
        return Err("0以上の数値を入力してください".to_string());
    }
    Ok(())
}
