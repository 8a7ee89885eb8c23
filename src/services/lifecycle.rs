//! Channel lifecycle timing
//!
//! Decides when event channels are created and deleted. Create thresholds
//! offset from midnight of the event day in the user timezone; delete
//! thresholds offset from end-of-day of the event END date (start + sport
//! duration), which is what keeps midnight-crossing games alive until the
//! right day. Being past the delete threshold blocks creation, so a late
//! match can never create-then-immediately-delete.

use crate::matching::outcome::ExcludedReason;
use crate::models::settings::{CreateTiming, DeleteTiming, DurationSettings};
use crate::models::Event;
use crate::utils::tz::{local_end_of_day, local_midnight};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::debug;

/// A create/delete decision with its governing threshold.
#[derive(Debug, Clone)]
pub struct LifecycleDecision {
    pub should_act: bool,
    pub reason: String,
    pub threshold: Option<DateTime<Utc>>,
}

impl LifecycleDecision {
    fn act(reason: impl Into<String>, threshold: Option<DateTime<Utc>>) -> Self {
        Self {
            should_act: true,
            reason: reason.into(),
            threshold,
        }
    }

    fn skip(reason: impl Into<String>, threshold: Option<DateTime<Utc>>) -> Self {
        Self {
            should_act: false,
            reason: reason.into(),
            threshold,
        }
    }
}

pub struct LifecycleManager {
    create_timing: CreateTiming,
    delete_timing: DeleteTiming,
    durations: DurationSettings,
    include_final_events: bool,
    user_tz: Tz,
}

impl LifecycleManager {
    pub fn new(
        create_timing: CreateTiming,
        delete_timing: DeleteTiming,
        durations: DurationSettings,
        include_final_events: bool,
        user_tz: Tz,
    ) -> Self {
        Self {
            create_timing,
            delete_timing,
            durations,
            include_final_events,
            user_tz,
        }
    }

    pub fn should_create_channel(&self, event: &Event, stream_exists: bool) -> LifecycleDecision {
        self.should_create_channel_at(event, stream_exists, Utc::now())
    }

    pub fn should_delete_channel(&self, event: &Event, stream_exists: bool) -> LifecycleDecision {
        self.should_delete_channel_at(event, stream_exists, Utc::now())
    }

    pub fn should_create_channel_at(
        &self,
        event: &Event,
        stream_exists: bool,
        now: DateTime<Utc>,
    ) -> LifecycleDecision {
        if self.create_timing == CreateTiming::StreamAvailable {
            return if stream_exists {
                LifecycleDecision::act("Stream available", None)
            } else {
                LifecycleDecision::skip("Waiting for stream", None)
            };
        }

        let create_threshold = self.create_threshold(event);

        // Past the delete threshold means the lifecycle window is over:
        // creating now would be an immediate create-then-delete
        if let Some(delete_threshold) = self.delete_threshold(event) {
            if now >= delete_threshold {
                debug!(
                    "Skip create for event {}: past delete threshold {}",
                    event.id, delete_threshold
                );
                return LifecycleDecision::skip(
                    format!("Past delete threshold ({delete_threshold})"),
                    Some(delete_threshold),
                );
            }
        }

        if now >= create_threshold {
            LifecycleDecision::act(
                format!("Create threshold reached ({create_threshold})"),
                Some(create_threshold),
            )
        } else {
            LifecycleDecision::skip(
                format!("Before create threshold ({create_threshold})"),
                Some(create_threshold),
            )
        }
    }

    pub fn should_delete_channel_at(
        &self,
        event: &Event,
        stream_exists: bool,
        now: DateTime<Utc>,
    ) -> LifecycleDecision {
        if self.delete_timing == DeleteTiming::StreamRemoved {
            return if stream_exists {
                LifecycleDecision::skip("Stream still exists", None)
            } else {
                LifecycleDecision::act("Stream removed", None)
            };
        }

        let Some(delete_threshold) = self.delete_threshold(event) else {
            return LifecycleDecision::skip("Could not calculate delete time", None);
        };

        if now >= delete_threshold {
            LifecycleDecision::act(
                format!("Delete threshold reached ({delete_threshold})"),
                Some(delete_threshold),
            )
        } else {
            LifecycleDecision::skip(
                format!("Before delete threshold ({delete_threshold})"),
                Some(delete_threshold),
            )
        }
    }

    /// When this event's channel should be deleted; used for
    /// scheduled_delete_at stamping.
    pub fn calculate_delete_time(&self, event: &Event) -> Option<DateTime<Utc>> {
        self.delete_threshold(event)
    }

    /// Estimated event end, by sport duration.
    pub fn event_end_time(&self, event: &Event) -> DateTime<Utc> {
        let duration_hours = self.durations.for_sport(&event.sport);
        event.start_time + Duration::seconds((duration_hours * 3600.0) as i64)
    }

    /// Categorize a freshly matched event against the lifecycle window.
    /// Returns None when the event is eligible for channel creation.
    ///
    /// Rules, in order: past the delete threshold is EVENT_PAST; before the
    /// create threshold is BEFORE_WINDOW; final events inside the window are
    /// EVENT_FINAL unless include_final_events. A time-based fallback treats
    /// an event as final once now > end + 2h, whatever the provider status
    /// says, to recover from stale status feeds.
    pub fn categorize_event(&self, event: &Event, now: DateTime<Utc>) -> Option<ExcludedReason> {
        let delete_threshold = self.delete_threshold(event);
        let create_threshold = (self.create_timing != CreateTiming::StreamAvailable)
            .then(|| self.create_threshold(event));

        if let Some(delete_threshold) = delete_threshold {
            if now >= delete_threshold {
                debug!("Event {} past lifecycle window", event.id);
                return Some(ExcludedReason::EventPast);
            }
        }

        if let Some(create_threshold) = create_threshold {
            if now < create_threshold {
                debug!("Event {} before lifecycle window", event.id);
                return Some(ExcludedReason::BeforeWindow);
            }
        }

        let mut final_event = event.is_final();
        if !final_event && now > self.event_end_time(event) + Duration::hours(2) {
            debug!("Event {} marked final by time fallback", event.id);
            final_event = true;
        }

        if final_event && !self.include_final_events {
            return Some(ExcludedReason::EventFinal);
        }

        None
    }

    fn create_threshold(&self, event: &Event) -> DateTime<Utc> {
        let event_day = event.start_time.with_timezone(&self.user_tz).date_naive();
        let day_start = local_midnight(event_day, self.user_tz);

        let offset_days = match self.create_timing {
            CreateTiming::StreamAvailable | CreateTiming::SameDay => 0,
            CreateTiming::DayBefore => 1,
            CreateTiming::TwoDaysBefore => 2,
            CreateTiming::ThreeDaysBefore => 3,
            CreateTiming::OneWeekBefore => 7,
        };

        (day_start - Duration::days(offset_days)).with_timezone(&Utc)
    }

    fn delete_threshold(&self, event: &Event) -> Option<DateTime<Utc>> {
        let event_end = self.event_end_time(event).with_timezone(&self.user_tz);
        let end_day = event_end.date_naive();
        let day_end = local_end_of_day(end_day, self.user_tz);

        let threshold = match self.delete_timing {
            DeleteTiming::StreamRemoved => return None,
            DeleteTiming::SixHoursAfter => {
                return Some((event_end + Duration::hours(6)).with_timezone(&Utc))
            }
            DeleteTiming::SameDay => day_end,
            DeleteTiming::DayAfter => day_end + Duration::days(1),
            DeleteTiming::TwoDaysAfter => day_end + Duration::days(2),
            DeleteTiming::ThreeDaysAfter => day_end + Duration::days(3),
            DeleteTiming::OneWeekAfter => day_end + Duration::days(7),
        };

        Some(threshold.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventStatus;
    use chrono::TimeZone;

    fn manager(create: CreateTiming, delete: DeleteTiming, include_final: bool) -> LifecycleManager {
        LifecycleManager::new(
            create,
            delete,
            DurationSettings::default(),
            include_final,
            chrono_tz::America::New_York,
        )
    }

    fn event_at(start: DateTime<Utc>, sport: &str, status: &str) -> Event {
        Event {
            id: "401".to_string(),
            provider: "espn".to_string(),
            name: "Test Event".to_string(),
            start_time: start,
            home_team: None,
            away_team: None,
            status: EventStatus {
                state: status.to_string(),
                detail: String::new(),
            },
            sport: sport.to_string(),
            league: "nfl".to_string(),
            home_score: None,
            away_score: None,
            venue: None,
            broadcasts: vec![],
            season: None,
            segment_times: Default::default(),
            main_card_start: None,
        }
    }

    #[test]
    fn test_delete_threshold_gte_create_threshold() {
        let timings = [
            (CreateTiming::SameDay, DeleteTiming::SameDay),
            (CreateTiming::DayBefore, DeleteTiming::DayAfter),
            (CreateTiming::OneWeekBefore, DeleteTiming::SixHoursAfter),
            (CreateTiming::TwoDaysBefore, DeleteTiming::OneWeekAfter),
        ];
        let start = Utc.with_ymd_and_hms(2025, 1, 11, 1, 0, 0).unwrap();
        let event = event_at(start, "football", "scheduled");

        for (create, delete) in timings {
            let m = manager(create, delete, false);
            let create_threshold = m.create_threshold(&event);
            let delete_threshold = m.delete_threshold(&event).unwrap();
            assert!(
                delete_threshold >= create_threshold,
                "{create:?}/{delete:?}: delete {delete_threshold} < create {create_threshold}"
            );
        }
    }

    #[test]
    fn test_past_event_blocks_create_and_allows_delete() {
        // Event 2025-01-10 20:00 ET, 3.5h football; delete=day_after means
        // end-of-day Jan 11 ET. At Jan 12 00:00 ET the window is over.
        let m = manager(CreateTiming::SameDay, DeleteTiming::DayAfter, false);
        let start = Utc.with_ymd_and_hms(2025, 1, 11, 1, 0, 0).unwrap(); // 20:00 ET Jan 10
        let event = event_at(start, "football", "scheduled");
        let now = chrono_tz::America::New_York
            .with_ymd_and_hms(2025, 1, 12, 0, 0, 0)
            .unwrap()
            .with_timezone(&Utc);

        assert!(m.should_delete_channel_at(&event, true, now).should_act);
        assert!(!m.should_create_channel_at(&event, true, now).should_act);
        assert_eq!(m.categorize_event(&event, now), Some(ExcludedReason::EventPast));
    }

    #[test]
    fn test_midnight_crossing_uses_end_date() {
        // Event starts 23:00 ET and runs 3.5h, ending Jan 11. With
        // delete=same_day the threshold is end-of-day Jan 11, not Jan 10.
        let m = manager(CreateTiming::SameDay, DeleteTiming::SameDay, false);
        let start = Utc.with_ymd_and_hms(2025, 1, 11, 4, 0, 0).unwrap(); // 23:00 ET Jan 10
        let event = event_at(start, "football", "scheduled");

        let threshold = m.delete_threshold(&event).unwrap();
        let local = threshold.with_timezone(&chrono_tz::America::New_York);
        assert_eq!(local.date_naive(), chrono::NaiveDate::from_ymd_opt(2025, 1, 11).unwrap());
    }

    #[test]
    fn test_stream_available_and_stream_removed() {
        let m = manager(CreateTiming::StreamAvailable, DeleteTiming::StreamRemoved, false);
        let event = event_at(Utc::now(), "hockey", "scheduled");

        assert!(m.should_create_channel(&event, true).should_act);
        assert!(!m.should_create_channel(&event, false).should_act);
        assert!(m.should_delete_channel(&event, false).should_act);
        assert!(!m.should_delete_channel(&event, true).should_act);
    }

    #[test]
    fn test_final_event_honors_include_flag() {
        let start = Utc::now() - Duration::hours(1);
        let event = event_at(start, "hockey", "final");
        let now = Utc::now();

        let strict = manager(CreateTiming::SameDay, DeleteTiming::DayAfter, false);
        assert_eq!(strict.categorize_event(&event, now), Some(ExcludedReason::EventFinal));

        let lenient = manager(CreateTiming::SameDay, DeleteTiming::DayAfter, true);
        assert_eq!(lenient.categorize_event(&event, now), None);
    }

    #[test]
    fn test_time_fallback_marks_stale_events_final() {
        // Provider still says "live" but the event ended >2h ago
        let start = Utc::now() - Duration::hours(8);
        let event = event_at(start, "hockey", "live");
        let m = manager(CreateTiming::ThreeDaysBefore, DeleteTiming::OneWeekAfter, false);

        assert_eq!(
            m.categorize_event(&event, Utc::now()),
            Some(ExcludedReason::EventFinal)
        );
    }

    #[test]
    fn test_before_window() {
        let start = Utc::now() + Duration::days(5);
        let event = event_at(start, "hockey", "scheduled");
        let m = manager(CreateTiming::SameDay, DeleteTiming::DayAfter, false);

        assert_eq!(
            m.categorize_event(&event, Utc::now()),
            Some(ExcludedReason::BeforeWindow)
        );
    }

    #[test]
    fn test_six_hours_after() {
        let m = manager(CreateTiming::SameDay, DeleteTiming::SixHoursAfter, false);
        let start = Utc.with_ymd_and_hms(2025, 1, 10, 20, 0, 0).unwrap();
        let event = event_at(start, "hockey", "scheduled"); // 3h hockey

        let threshold = m.delete_threshold(&event).unwrap();
        assert_eq!(threshold, start + Duration::hours(9));
    }
}
