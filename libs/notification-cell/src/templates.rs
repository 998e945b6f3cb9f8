// libs/notification-cell/src/templates.rs
//! Message bodies for payment confirmations and consultation reminders.
//!
//! Freetown keeps GMT all year, so appointment times are rendered in UTC and
//! labelled GMT.

use chrono::{DateTime, Utc};

use crate::models::EmailMessage;

pub fn format_leone(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if amount < 0 {
        format!("Le -{}", grouped)
    } else {
        format!("Le {}", grouped)
    }
}

pub fn format_local_time(at: DateTime<Utc>) -> String {
    at.format("%a %d %b %Y at %H:%M GMT").to_string()
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn greeting(name: Option<&str>) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("Hello {}", name),
        None => "Hello".to_string(),
    }
}

pub fn payment_confirmed_sms(amount_leone: i64, consultation_type: &str, scheduled_at: Option<DateTime<Utc>>) -> String {
    let when = scheduled_at
        .map(|at| format!(" scheduled for {}", format_local_time(at)))
        .unwrap_or_default();
    format!(
        "Payment of {} received for your {} consultation{}. Thank you.",
        format_leone(amount_leone),
        consultation_type,
        when
    )
}

pub fn payment_confirmed_email(
    name: Option<&str>,
    amount_leone: i64,
    consultation_type: &str,
    scheduled_at: Option<DateTime<Utc>>,
) -> EmailMessage {
    let when = match scheduled_at {
        Some(at) => format!("<p>Your appointment is on <strong>{}</strong>.</p>", format_local_time(at)),
        None => "<p>We will let you know once your appointment time is set.</p>".to_string(),
    };

    EmailMessage {
        subject: "Payment confirmed".to_string(),
        html: format!(
            "<p>{},</p><p>We received your payment of <strong>{}</strong> for a {} consultation.</p>{}",
            escape_html(&greeting(name)),
            format_leone(amount_leone),
            escape_html(consultation_type),
            when
        ),
    }
}

pub fn patient_reminder_sms(consultation_type: &str, at: DateTime<Utc>) -> String {
    format!(
        "Reminder: your {} consultation starts {}. Please be ready a few minutes early.",
        consultation_type,
        format_local_time(at)
    )
}

pub fn provider_reminder_sms(patient_name: Option<&str>, consultation_type: &str, at: DateTime<Utc>) -> String {
    let with = patient_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|n| format!(" with {}", n))
        .unwrap_or_default();
    format!(
        "Reminder: {} consultation{} starts {}.",
        consultation_type,
        with,
        format_local_time(at)
    )
}

pub fn reminder_email(name: Option<&str>, consultation_type: &str, at: DateTime<Utc>) -> EmailMessage {
    EmailMessage {
        subject: format!("Upcoming {} consultation", consultation_type),
        html: format!(
            "<p>{},</p><p>This is a reminder that a {} consultation starts <strong>{}</strong>.</p>",
            escape_html(&greeting(name)),
            escape_html(consultation_type),
            format_local_time(at)
        ),
    }
}
