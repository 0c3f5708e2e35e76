//! In-memory event store with RSVP tracking and capacity enforcement.

use crate::models::*;
use chrono::Utc;
use dashmap::DashMap;
use greekdash_core::{GreekDashError, GreekDashResult};
use tracing::info;
use uuid::Uuid;

/// Thread-safe store for events and their RSVPs.
pub struct EventStore {
    events: DashMap<Uuid, Event>,
    rsvps: DashMap<Uuid, EventRsvp>,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            events: DashMap::new(),
            rsvps: DashMap::new(),
        }
    }

    // ─── Events ────────────────────────────────────────────────────────────

    pub fn create_event(
        &self,
        chapter_id: Uuid,
        req: CreateEventRequest,
        created_by: Uuid,
    ) -> GreekDashResult<Event> {
        if req.title.trim().is_empty() {
            return Err(GreekDashError::Validation("event title must not be empty".into()));
        }
        if req.ends_at <= req.starts_at {
            return Err(GreekDashError::Validation("event must end after it starts".into()));
        }

        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            chapter_id,
            title: req.title.trim().to_string(),
            description: req.description,
            location: req.location,
            starts_at: req.starts_at,
            ends_at: req.ends_at,
            capacity: req.capacity,
            status: EventStatus::Scheduled,
            created_by,
            created_at: now,
            updated_at: now,
        };
        info!(event_id = %event.id, chapter_id = %chapter_id, "Event created");
        self.events.insert(event.id, event.clone());
        Ok(event)
    }

    pub fn update_event(&self, id: Uuid, req: UpdateEventRequest) -> GreekDashResult<Event> {
        let mut entry = self
            .events
            .get_mut(&id)
            .ok_or_else(|| GreekDashError::NotFound(format!("event: {id}")))?;
        let e = entry.value_mut();
        if let Some(title) = req.title {
            e.title = title;
        }
        if let Some(description) = req.description {
            e.description = description;
        }
        if let Some(location) = req.location {
            e.location = location;
        }
        if let Some(starts_at) = req.starts_at {
            e.starts_at = starts_at;
        }
        if let Some(ends_at) = req.ends_at {
            e.ends_at = ends_at;
        }
        if let Some(capacity) = req.capacity {
            e.capacity = capacity;
        }
        if e.ends_at <= e.starts_at {
            return Err(GreekDashError::Validation("event must end after it starts".into()));
        }
        e.updated_at = Utc::now();
        Ok(e.clone())
    }

    pub fn cancel_event(&self, id: Uuid) -> Option<Event> {
        self.events.get_mut(&id).map(|mut entry| {
            entry.status = EventStatus::Cancelled;
            entry.updated_at = Utc::now();
            info!(event_id = %id, "Event cancelled");
            entry.clone()
        })
    }

    /// Delete an event along with its RSVPs.
    pub fn delete_event(&self, id: Uuid) -> bool {
        let removed = self.events.remove(&id).is_some();
        if removed {
            let rsvp_ids: Vec<Uuid> = self
                .rsvps
                .iter()
                .filter(|r| r.value().event_id == id)
                .map(|r| *r.key())
                .collect();
            for rid in rsvp_ids {
                self.rsvps.remove(&rid);
            }
            info!(event_id = %id, "Event deleted");
        }
        removed
    }

    pub fn get_event(&self, id: Uuid) -> Option<Event> {
        self.events.get(&id).map(|e| e.value().clone())
    }

    /// Events for a chapter, soonest first.
    pub fn list_for_chapter(&self, chapter_id: Uuid) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .events
            .iter()
            .filter(|e| e.value().chapter_id == chapter_id)
            .map(|e| e.value().clone())
            .collect();
        events.sort_by(|a, b| a.starts_at.cmp(&b.starts_at));
        events
    }

    // ─── RSVPs ─────────────────────────────────────────────────────────────

    /// Create or update a member's RSVP. A `Going` RSVP is rejected once a
    /// capped event is full (changing an existing `Going` never counts
    /// against itself).
    pub fn rsvp(&self, event_id: Uuid, user_id: Uuid, status: RsvpStatus) -> GreekDashResult<EventRsvp> {
        let event = self
            .get_event(event_id)
            .ok_or_else(|| GreekDashError::NotFound(format!("event: {event_id}")))?;
        if event.status == EventStatus::Cancelled {
            return Err(GreekDashError::Validation("event has been cancelled".into()));
        }

        let existing = self.find_rsvp(event_id, user_id);

        if status == RsvpStatus::Going {
            if let Some(capacity) = event.capacity {
                let going_others = self
                    .rsvps
                    .iter()
                    .filter(|r| {
                        let rsvp = r.value();
                        rsvp.event_id == event_id
                            && rsvp.status == RsvpStatus::Going
                            && rsvp.user_id != user_id
                    })
                    .count() as u32;
                if going_others >= capacity {
                    return Err(GreekDashError::Conflict("event is at capacity".into()));
                }
            }
        }

        let now = Utc::now();
        if let Some(prev) = existing {
            if let Some(mut entry) = self.rsvps.get_mut(&prev.id) {
                entry.status = status;
                entry.updated_at = now;
                return Ok(entry.clone());
            }
        }
        let rsvp = EventRsvp {
            id: Uuid::new_v4(),
            event_id,
            user_id,
            status,
            created_at: now,
            updated_at: now,
        };
        self.rsvps.insert(rsvp.id, rsvp.clone());
        Ok(rsvp)
    }

    pub fn find_rsvp(&self, event_id: Uuid, user_id: Uuid) -> Option<EventRsvp> {
        self.rsvps
            .iter()
            .find(|r| r.value().event_id == event_id && r.value().user_id == user_id)
            .map(|r| r.value().clone())
    }

    pub fn list_rsvps(&self, event_id: Uuid) -> Vec<EventRsvp> {
        self.rsvps
            .iter()
            .filter(|r| r.value().event_id == event_id)
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn rsvp_summary(&self, event_id: Uuid) -> RsvpSummary {
        let mut summary = RsvpSummary::default();
        for rsvp in self.rsvps.iter() {
            if rsvp.value().event_id != event_id {
                continue;
            }
            match rsvp.value().status {
                RsvpStatus::Going => summary.going += 1,
                RsvpStatus::Maybe => summary.maybe += 1,
                RsvpStatus::NotGoing => summary.not_going += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_request(capacity: Option<u32>) -> CreateEventRequest {
        CreateEventRequest {
            title: "Chapter Meeting".into(),
            description: "Weekly chapter meeting".into(),
            location: "Chapter house".into(),
            starts_at: Utc::now() + Duration::days(7),
            ends_at: Utc::now() + Duration::days(7) + Duration::hours(2),
            capacity,
        }
    }

    #[test]
    fn test_create_and_list_sorted() {
        let store = EventStore::new();
        let chapter = Uuid::new_v4();
        let creator = Uuid::new_v4();

        let mut later = sample_request(None);
        later.title = "Formal".into();
        later.starts_at = Utc::now() + Duration::days(30);
        later.ends_at = later.starts_at + Duration::hours(4);

        store.create_event(chapter, later, creator).unwrap();
        store.create_event(chapter, sample_request(None), creator).unwrap();
        // Event in another chapter must not appear.
        store.create_event(Uuid::new_v4(), sample_request(None), creator).unwrap();

        let events = store.list_for_chapter(chapter);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].title, "Chapter Meeting");
        assert_eq!(events[1].title, "Formal");
    }

    #[test]
    fn test_invalid_times_rejected() {
        let store = EventStore::new();
        let mut req = sample_request(None);
        req.ends_at = req.starts_at - Duration::hours(1);
        assert!(store.create_event(Uuid::new_v4(), req, Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_rsvp_upsert() {
        let store = EventStore::new();
        let event = store
            .create_event(Uuid::new_v4(), sample_request(None), Uuid::new_v4())
            .unwrap();
        let user = Uuid::new_v4();

        let first = store.rsvp(event.id, user, RsvpStatus::Maybe).unwrap();
        let second = store.rsvp(event.id, user, RsvpStatus::Going).unwrap();

        // Same row, updated in place.
        assert_eq!(first.id, second.id);
        assert_eq!(second.status, RsvpStatus::Going);
        assert_eq!(store.list_rsvps(event.id).len(), 1);

        let summary = store.rsvp_summary(event.id);
        assert_eq!(summary.going, 1);
        assert_eq!(summary.maybe, 0);
    }

    #[test]
    fn test_capacity_enforcement() {
        let store = EventStore::new();
        let event = store
            .create_event(Uuid::new_v4(), sample_request(Some(2)), Uuid::new_v4())
            .unwrap();

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        store.rsvp(event.id, a, RsvpStatus::Going).unwrap();
        store.rsvp(event.id, b, RsvpStatus::Going).unwrap();

        // Full: third Going is rejected, but Maybe is fine.
        assert!(matches!(
            store.rsvp(event.id, c, RsvpStatus::Going).unwrap_err(),
            GreekDashError::Conflict(_)
        ));
        assert!(store.rsvp(event.id, c, RsvpStatus::Maybe).is_ok());

        // An existing Going member can re-submit without tripping the cap.
        assert!(store.rsvp(event.id, a, RsvpStatus::Going).is_ok());

        // Someone dropping out frees a spot.
        store.rsvp(event.id, b, RsvpStatus::NotGoing).unwrap();
        assert!(store.rsvp(event.id, c, RsvpStatus::Going).is_ok());
    }

    #[test]
    fn test_cancelled_event_rejects_rsvps() {
        let store = EventStore::new();
        let event = store
            .create_event(Uuid::new_v4(), sample_request(None), Uuid::new_v4())
            .unwrap();
        store.cancel_event(event.id).unwrap();

        let err = store.rsvp(event.id, Uuid::new_v4(), RsvpStatus::Going).unwrap_err();
        assert!(matches!(err, GreekDashError::Validation(_)));
    }

    #[test]
    fn test_delete_removes_rsvps() {
        let store = EventStore::new();
        let event = store
            .create_event(Uuid::new_v4(), sample_request(None), Uuid::new_v4())
            .unwrap();
        store.rsvp(event.id, Uuid::new_v4(), RsvpStatus::Going).unwrap();

        assert!(store.delete_event(event.id));
        assert!(store.list_rsvps(event.id).is_empty());
        assert!(!store.delete_event(event.id));
    }
}
