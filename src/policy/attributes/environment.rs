//! Clock and deployment attributes. Computed fresh for every request.

use super::{AttributeBags, AttributeProvider};
use crate::domain::{AttributeMap, AttributeSource, EvaluationRequest};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use tracing::Span;

#[derive(Debug, Clone, Default)]
pub struct EnvironmentConfig {
    pub name: String,
    /// IANA timezone name, e.g. `Europe/Berlin`. Empty means UTC.
    pub timezone: String,
    pub location: Option<String>,
    /// Static attributes added to every request.
    pub attributes: AttributeMap,
}

pub struct EnvironmentProvider {
    name: String,
    timezone: Tz,
    location: Option<String>,
    attributes: AttributeMap,
}

impl EnvironmentProvider {
    pub fn new(config: EnvironmentConfig, span: &Span) -> Self {
        let timezone = if config.timezone.is_empty() {
            Tz::UTC
        } else {
            config.timezone.parse::<Tz>().unwrap_or_else(|_| {
                tracing::warn!(
                    parent: span,
                    timezone = %config.timezone,
                    "Unknown timezone, falling back to UTC"
                );
                Tz::UTC
            })
        };

        Self {
            name: config.name,
            timezone,
            location: config.location,
            attributes: config.attributes,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Environment attributes as observed at `now`.
    pub fn attributes_at(&self, now: DateTime<Utc>) -> AttributeMap {
        let local = now.with_timezone(&self.timezone);
        let weekday = local.weekday();
        let hour = local.hour();
        let is_weekend = matches!(weekday, Weekday::Sat | Weekday::Sun);

        let mut attrs = AttributeMap::new();
        attrs.insert("time".into(), local.format("%H:%M").to_string().into());
        attrs.insert("date".into(), local.format("%Y-%m-%d").to_string().into());
        attrs.insert("datetime".into(), local.to_rfc3339().into());
        attrs.insert("hour".into(), hour.into());
        attrs.insert("minute".into(), local.minute().into());
        attrs.insert("day_of_week".into(), weekday.num_days_from_sunday().into());
        attrs.insert("day_of_month".into(), local.day().into());
        attrs.insert("month".into(), local.month().into());
        attrs.insert("year".into(), local.year().into());
        attrs.insert("is_weekend".into(), is_weekend.into());
        attrs.insert(
            "is_business_hours".into(),
            (!is_weekend && (9..17).contains(&hour)).into(),
        );
        attrs.insert("timezone".into(), self.timezone.name().into());
        if let Some(location) = &self.location {
            attrs.insert("location".into(), location.as_str().into());
        }

        attrs.extend(self.attributes.clone());
        attrs
    }
}

#[async_trait]
impl AttributeProvider for EnvironmentProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_attributes(&self, _request: &EvaluationRequest) -> Result<AttributeBags> {
        let mut bags = AttributeBags::new();
        bags.insert(AttributeSource::Environment, self.attributes_at(Utc::now()));
        Ok(bags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AttributeValue;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn provider(timezone: &str) -> EnvironmentProvider {
        EnvironmentProvider::new(
            EnvironmentConfig {
                name: "environment".into(),
                timezone: timezone.into(),
                location: Some("eu-west-1".into()),
                attributes: AttributeMap::from([("deployment".to_string(), "prod".into())]),
            },
            &Span::none(),
        )
    }

    #[test]
    fn test_weekday_business_hours() {
        // Wednesday 2024-05-15 10:30 UTC
        let now = Utc.with_ymd_and_hms(2024, 5, 15, 10, 30, 0).unwrap();
        let attrs = provider("UTC").attributes_at(now);

        assert_eq!(attrs["time"], AttributeValue::from("10:30"));
        assert_eq!(attrs["date"], AttributeValue::from("2024-05-15"));
        assert_eq!(attrs["hour"], AttributeValue::Int(10));
        assert_eq!(attrs["minute"], AttributeValue::Int(30));
        assert_eq!(attrs["day_of_week"], AttributeValue::Int(3));
        assert_eq!(attrs["day_of_month"], AttributeValue::Int(15));
        assert_eq!(attrs["month"], AttributeValue::Int(5));
        assert_eq!(attrs["year"], AttributeValue::Int(2024));
        assert_eq!(attrs["is_weekend"], AttributeValue::Bool(false));
        assert_eq!(attrs["is_business_hours"], AttributeValue::Bool(true));
        assert_eq!(attrs["location"], AttributeValue::from("eu-west-1"));
        assert_eq!(attrs["deployment"], AttributeValue::from("prod"));
    }

    #[test]
    fn test_weekend_and_after_hours() {
        // Sunday 2024-05-19 18:00 UTC
        let now = Utc.with_ymd_and_hms(2024, 5, 19, 18, 0, 0).unwrap();
        let attrs = provider("UTC").attributes_at(now);
        assert_eq!(attrs["day_of_week"], AttributeValue::Int(0));
        assert_eq!(attrs["is_weekend"], AttributeValue::Bool(true));
        assert_eq!(attrs["is_business_hours"], AttributeValue::Bool(false));
    }

    #[test]
    fn test_timezone_shifts_local_clock() {
        // 2024-01-10 23:30 UTC is 08:30 next day in Tokyo.
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 23, 30, 0).unwrap();
        let attrs = provider("Asia/Tokyo").attributes_at(now);
        assert_eq!(attrs["time"], AttributeValue::from("08:30"));
        assert_eq!(attrs["date"], AttributeValue::from("2024-01-11"));
        assert_eq!(attrs["timezone"], AttributeValue::from("Asia/Tokyo"));
        assert_eq!(attrs["is_business_hours"], AttributeValue::Bool(false));
    }

    #[test]
    fn test_unknown_timezone_falls_back_to_utc() {
        assert_eq!(provider("Mars/Olympus").timezone(), Tz::UTC);
        assert_eq!(provider("").timezone(), Tz::UTC);
    }

    #[tokio::test]
    async fn test_provides_environment_bag_only() {
        let bags = provider("UTC")
            .get_attributes(&EvaluationRequest::default())
            .await
            .unwrap();
        assert_eq!(bags.len(), 1);
        assert!(bags[&AttributeSource::Environment].contains_key("time"));
    }
}
