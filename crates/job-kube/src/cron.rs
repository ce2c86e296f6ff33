//! Validated five-field cron schedules.

use job_types::JobError;
use serde::{Deserialize, Serialize};
use std::fmt;

struct Field {
    name: &'static str,
    min: u32,
    max: u32,
    aliases: &'static [&'static str],
    alias_base: u32,
    /// Accepts `?` as "no specific value".
    any: bool,
}

const MONTHS: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAYS: &[&str] = &["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

const FIELDS: [Field; 5] = [
    Field { name: "minute", min: 0, max: 59, aliases: &[], alias_base: 0, any: false },
    Field { name: "hour", min: 0, max: 23, aliases: &[], alias_base: 0, any: false },
    Field { name: "day of month", min: 1, max: 31, aliases: &[], alias_base: 0, any: true },
    Field { name: "month", min: 1, max: 12, aliases: MONTHS, alias_base: 1, any: false },
    Field { name: "day of week", min: 0, max: 7, aliases: WEEKDAYS, alias_base: 0, any: true },
];

const MACROS: &[&str] = &[
    "@yearly", "@annually", "@monthly", "@weekly", "@daily", "@midnight", "@hourly",
];

impl Field {
    fn value(&self, raw: &str) -> Result<u32, String> {
        let lower = raw.to_ascii_lowercase();
        if let Some(pos) = self.aliases.iter().position(|a| *a == lower) {
            return Ok(pos as u32 + self.alias_base);
        }
        let v: u32 = raw
            .parse()
            .map_err(|_| format!("invalid {} value {:?}", self.name, raw))?;
        if v < self.min || v > self.max {
            return Err(format!(
                "{} value {} out of range {}-{}",
                self.name, v, self.min, self.max
            ));
        }
        Ok(v)
    }

    fn check_item(&self, item: &str) -> Result<(), String> {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (item, None),
        };
        if let Some(step) = step {
            let step: u32 = step
                .parse()
                .map_err(|_| format!("invalid {} step {:?}", self.name, step))?;
            if step == 0 || step > self.max {
                return Err(format!("{} step {} out of range 1-{}", self.name, step, self.max));
            }
        }
        if range == "*" {
            return Ok(());
        }
        match range.split_once('-') {
            Some((lo, hi)) => {
                let lo = self.value(lo)?;
                let hi = self.value(hi)?;
                if lo > hi {
                    return Err(format!("{} range {}-{} is reversed", self.name, lo, hi));
                }
                Ok(())
            }
            None => self.value(range).map(|_| ()),
        }
    }

    fn check(&self, field: &str) -> Result<(), String> {
        if field == "?" {
            return if self.any {
                Ok(())
            } else {
                Err(format!("'?' is not allowed in the {} field", self.name))
            };
        }
        field.split(',').try_for_each(|item| {
            if item.is_empty() {
                Err(format!("empty item in {} field", self.name))
            } else {
                self.check_item(item)
            }
        })
    }
}

fn validate(expr: &str) -> Result<(), String> {
    let trimmed = expr.trim();
    if trimmed.starts_with('@') {
        return if MACROS.contains(&trimmed.to_ascii_lowercase().as_str()) {
            Ok(())
        } else {
            Err(format!("unknown macro {:?}", trimmed))
        };
    }
    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.len() != FIELDS.len() {
        return Err(format!("expected 5 fields, found {}", parts.len()));
    }
    FIELDS
        .iter()
        .zip(parts)
        .try_for_each(|(field, part)| field.check(part))
}

/// A cron expression that has passed validation. Only obtainable through [`CronSchedule::parse`]
/// or one of the builders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CronSchedule(String);

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, JobError> {
        validate(expr).map_err(|reason| {
            JobError::invalid_argument(format!("invalid cron expression: {}", reason))
                .with_detail("schedule", expr)
        })?;
        Ok(Self(expr.trim().to_string()))
    }

    /// At `hour:minute` on `day` of every month.
    pub fn monthly(day: u32, hour: u32, minute: u32) -> Result<Self, JobError> {
        Self::parse(&format!("{} {} {} * *", minute, hour, day))
    }

    /// At `hour:minute` on `weekday` (0 = Sunday).
    pub fn weekly(weekday: u32, hour: u32, minute: u32) -> Result<Self, JobError> {
        Self::parse(&format!("{} {} * * {}", minute, hour, weekday))
    }

    pub fn daily(hour: u32, minute: u32) -> Result<Self, JobError> {
        Self::parse(&format!("{} {} * * *", minute, hour))
    }

    pub fn hourly(minute: u32) -> Result<Self, JobError> {
        Self::parse(&format!("{} * * * *", minute))
    }

    pub fn every_n_minutes(minutes: u32) -> Result<Self, JobError> {
        Self::parse(&format!("*/{} * * * *", minutes))
    }

    pub fn every_n_hours(hours: u32) -> Result<Self, JobError> {
        Self::parse(&format!("0 */{} * * *", hours))
    }

    pub fn every_n_days(days: u32) -> Result<Self, JobError> {
        Self::parse(&format!("0 0 */{} * *", days))
    }

    pub fn every_n_months(months: u32) -> Result<Self, JobError> {
        Self::parse(&format!("0 0 1 */{} *", months))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CronSchedule {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        CronSchedule::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use job_types::ErrorKind;

    #[test]
    fn builders_produce_expected_expressions() {
        assert_eq!(CronSchedule::monthly(15, 3, 30).unwrap().as_str(), "30 3 15 * *");
        assert_eq!(CronSchedule::weekly(1, 9, 0).unwrap().as_str(), "0 9 * * 1");
        assert_eq!(CronSchedule::daily(23, 59).unwrap().as_str(), "59 23 * * *");
        assert_eq!(CronSchedule::hourly(5).unwrap().as_str(), "5 * * * *");
        assert_eq!(CronSchedule::every_n_minutes(15).unwrap().as_str(), "*/15 * * * *");
        assert_eq!(CronSchedule::every_n_hours(6).unwrap().as_str(), "0 */6 * * *");
        assert_eq!(CronSchedule::every_n_days(2).unwrap().as_str(), "0 0 */2 * *");
        assert_eq!(CronSchedule::every_n_months(3).unwrap().as_str(), "0 0 1 */3 *");
    }

    #[test]
    fn every_valid_calendar_input_is_accepted() {
        for day in 1..=31 {
            for hour in 0..=23 {
                for minute in [0, 17, 59] {
                    assert!(CronSchedule::monthly(day, hour, minute).is_ok());
                    assert!(CronSchedule::daily(hour, minute).is_ok());
                }
            }
        }
        for weekday in 0..=7 {
            assert!(CronSchedule::weekly(weekday, 12, 0).is_ok());
        }
        for minute in 0..=59 {
            assert!(CronSchedule::hourly(minute).is_ok());
        }
        for n in 1..=12 {
            assert!(CronSchedule::every_n_months(n).is_ok());
            assert!(CronSchedule::every_n_minutes(n).is_ok());
        }
    }

    #[test]
    fn out_of_range_inputs_name_the_expression() {
        let cases = [
            (CronSchedule::monthly(32, 0, 0), "0 0 32 * *"),
            (CronSchedule::monthly(0, 0, 0), "0 0 0 * *"),
            (CronSchedule::weekly(8, 0, 0), "0 0 * * 8"),
            (CronSchedule::daily(24, 0), "0 24 * * *"),
            (CronSchedule::hourly(60), "60 * * * *"),
            (CronSchedule::every_n_minutes(0), "*/0 * * * *"),
            (CronSchedule::every_n_hours(0), "0 */0 * * *"),
            (CronSchedule::every_n_months(13), "0 0 1 */13 *"),
        ];
        for (result, expr) in cases {
            let err = result.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
            assert_eq!(err.detail("schedule"), Some(expr));
        }
    }

    #[test]
    fn parse_accepts_standard_syntax() {
        for expr in [
            "*/5 * * * *",
            "0 9-17 * * mon-fri",
            "0,15,30,45 * * jan,jul *",
            "5 4 * * SUN",
            "0 0 1-15/2 * *",
            "@daily",
            "0 0 ? * MON",
            "30 6 15 * ?",
        ] {
            assert!(CronSchedule::parse(expr).is_ok(), "{}", expr);
        }
    }

    #[test]
    fn parse_rejects_malformed_expressions() {
        for expr in [
            "", "* * * *", "* * * * * *", "a * * * *", "5-1 * * * *", "1,,2 * * * *", "@often",
            "? * * * *", "0 ? * * *", "0 0 1 ? *", "0 0 ?,1 * *",
        ] {
            assert!(CronSchedule::parse(expr).is_err(), "{:?}", expr);
        }
    }

    #[test]
    fn deserialize_validates() {
        let ok: CronSchedule = deserialize_str("0 * * * *").unwrap();
        assert_eq!(ok.as_str(), "0 * * * *");
        assert!(deserialize_str("61 * * * *").is_err());
    }

    fn deserialize_str(s: &str) -> Result<CronSchedule, serde::de::value::Error> {
        use serde::de::IntoDeserializer;
        let inner = s.trim_matches('"').to_string();
        CronSchedule::deserialize(inner.into_deserializer())
    }
}
