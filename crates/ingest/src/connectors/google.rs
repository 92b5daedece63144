//! Authorized Google-calendar connector
//!
//! Sources use the opaque `google://{calendarId}` URL and require a
//! connected user. Token acquisition and the calendar API call arrive
//! through the injected [`AuthorizedCalendar`] interface; authentication
//! itself lives outside the ingestion core.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use teammeet_core::models::EventStatus;
use teammeet_core::types::UserId;
use teammeet_core::vendor::VENDOR_GOOGLE;
use teammeet_core::{IngestError, IngestResult, NormalizedEvent, SyncWindow};

use super::{
    cap_preview, reconcile_into_outcome, Connector, ConnectorContext, Detection, Preview,
    PreviewArgs, SyncArgs, SyncOutcome, UrlProbe,
};

const GOOGLE_SCHEME: &str = "google://";
/// Previews have no caller-supplied window; sample the next few months
const PREVIEW_WINDOW_DAYS: i64 = 120;

/// One expanded event instance from the calendar API
#[derive(Debug, Clone)]
pub struct CalendarInstance {
    /// Stable per-instance key; becomes the event's `external_uid`
    pub instance_key: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub status: Option<EventStatus>,
    pub raw: serde_json::Value,
}

/// Injected access to a connected user's calendar
#[async_trait]
pub trait AuthorizedCalendar: Send + Sync {
    /// Access token for the connected user
    async fn access_token(&self, user_id: UserId) -> IngestResult<String>;

    /// Expanded instances for a calendar within the window
    async fn instances(
        &self,
        access_token: &str,
        calendar_id: &str,
        window: &SyncWindow,
    ) -> IngestResult<Vec<CalendarInstance>>;
}

/// Placeholder wired when the platform has not injected a real client;
/// every call fails with a clear message
pub struct UnconfiguredCalendar;

#[async_trait]
impl AuthorizedCalendar for UnconfiguredCalendar {
    async fn access_token(&self, _user_id: UserId) -> IngestResult<String> {
        Err(IngestError::FetchFailed(
            "google calendar access is not configured".to_string(),
        ))
    }

    async fn instances(
        &self,
        _access_token: &str,
        _calendar_id: &str,
        _window: &SyncWindow,
    ) -> IngestResult<Vec<CalendarInstance>> {
        Err(IngestError::FetchFailed(
            "google calendar access is not configured".to_string(),
        ))
    }
}

pub struct GoogleConnector {
    calendar: Arc<dyn AuthorizedCalendar>,
}

impl GoogleConnector {
    pub fn new(calendar: Arc<dyn AuthorizedCalendar>) -> Self {
        Self { calendar }
    }

    fn calendar_id(url: &str) -> IngestResult<&str> {
        url.strip_prefix(GOOGLE_SCHEME)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| IngestError::InvalidUrl(format!("{url}: expected google://{{calendarId}}")))
    }

    async fn load_events(
        &self,
        url: &str,
        user_id: Option<UserId>,
        window: &SyncWindow,
    ) -> IngestResult<Vec<NormalizedEvent>> {
        let calendar_id = Self::calendar_id(url)?;
        let user_id = user_id.ok_or_else(|| {
            IngestError::FetchFailed(
                "authorized calendar source has no connected user".to_string(),
            )
        })?;

        let token = self.calendar.access_token(user_id).await?;
        let instances = self.calendar.instances(&token, calendar_id, window).await?;

        Ok(instances
            .into_iter()
            .map(|instance| NormalizedEvent {
                external_uid: instance.instance_key,
                title: instance.title,
                start_at: instance.start_at,
                end_at: instance.end_at,
                location: instance.location,
                status: instance.status,
                raw: Some(instance.raw),
            })
            .collect())
    }
}

#[async_trait]
impl Connector for GoogleConnector {
    fn vendor(&self) -> &'static str {
        VENDOR_GOOGLE
    }

    fn can_handle(&self, probe: &UrlProbe<'_>) -> Detection {
        if probe.url.starts_with(GOOGLE_SCHEME) {
            Detection::at(1.0, "google_scheme")
        } else {
            Detection::none()
        }
    }

    async fn preview(
        &self,
        _ctx: &ConnectorContext<'_>,
        args: &PreviewArgs<'_>,
    ) -> IngestResult<Preview> {
        let window = SyncWindow::around(args.now, 0, PREVIEW_WINDOW_DAYS);
        let events = self.load_events(args.url, args.user_id, &window).await?;

        Ok(Preview {
            vendor: VENDOR_GOOGLE.to_string(),
            title: None,
            events: cap_preview(events),
            inferred_meta: None,
        })
    }

    async fn sync(
        &self,
        ctx: &ConnectorContext<'_>,
        args: &SyncArgs<'_>,
    ) -> IngestResult<SyncOutcome> {
        let events = self
            .load_events(args.url, args.user_id, &args.window)
            .await?;
        reconcile_into_outcome(ctx, args, VENDOR_GOOGLE, events).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCalendar {
        instances: Vec<CalendarInstance>,
    }

    #[async_trait]
    impl AuthorizedCalendar for FakeCalendar {
        async fn access_token(&self, _user_id: UserId) -> IngestResult<String> {
            Ok("test-token".to_string())
        }

        async fn instances(
            &self,
            access_token: &str,
            calendar_id: &str,
            _window: &SyncWindow,
        ) -> IngestResult<Vec<CalendarInstance>> {
            assert_eq!(access_token, "test-token");
            assert_eq!(calendar_id, "team-cal@group.calendar.google.com");
            Ok(self.instances.clone())
        }
    }

    fn instance(key: &str) -> CalendarInstance {
        CalendarInstance {
            instance_key: key.to_string(),
            title: "Practice".to_string(),
            start_at: "2025-02-10T17:00:00Z".parse().unwrap(),
            end_at: Some("2025-02-10T18:30:00Z".parse().unwrap()),
            location: Some("Gym".to_string()),
            status: None,
            raw: serde_json::json!({"id": key}),
        }
    }

    #[test]
    fn test_scheme_detection() {
        let connector = GoogleConnector::new(Arc::new(UnconfiguredCalendar));
        let detection = connector.can_handle(&UrlProbe::url_only("google://abc"));
        assert!((detection.confidence - 1.0).abs() < f64::EPSILON);
        assert!(!connector
            .can_handle(&UrlProbe::url_only("https://calendar.google.com/abc"))
            .ok());
    }

    #[tokio::test]
    async fn test_instance_key_becomes_external_uid() {
        let connector = GoogleConnector::new(Arc::new(FakeCalendar {
            instances: vec![instance("evt-1_20250210")],
        }));
        let window = SyncWindow::around("2025-02-01T00:00:00Z".parse().unwrap(), 0, 60);
        let events = connector
            .load_events(
                "google://team-cal@group.calendar.google.com",
                Some(UserId::new()),
                &window,
            )
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].external_uid, "evt-1_20250210");
        assert_eq!(events[0].title, "Practice");
    }

    #[tokio::test]
    async fn test_missing_connected_user_is_a_hard_error() {
        let connector = GoogleConnector::new(Arc::new(FakeCalendar { instances: vec![] }));
        let window = SyncWindow::around("2025-02-01T00:00:00Z".parse().unwrap(), 0, 60);
        let err = connector
            .load_events("google://cal", None, &window)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "fetch_failed");
        assert!(err.to_string().contains("connected user"));
    }

    #[tokio::test]
    async fn test_bad_scheme_rejected() {
        let connector = GoogleConnector::new(Arc::new(UnconfiguredCalendar));
        let window = SyncWindow::around("2025-02-01T00:00:00Z".parse().unwrap(), 0, 60);
        let err = connector
            .load_events("https://cal.example", Some(UserId::new()), &window)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_url");
    }
}
