// SPDX-License-Identifier: MIT

//! Tour model: the catalog entry visitors browse and book.

use serde::{Deserialize, Serialize};

/// Tour difficulty levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

/// A GeoJSON-style point on a tour itinerary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TourLocation {
    /// [longitude, latitude]
    pub coordinates: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Itinerary day this stop belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
}

/// Per-start-date capacity counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookedSlot {
    /// Start date (RFC 3339)
    pub start_date: String,
    /// Confirmed participants for this date
    #[serde(default)]
    pub participants: u32,
    #[serde(default)]
    pub sold_out: bool,
}

/// Tour document stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tour {
    /// Document ID (random hex)
    pub id: String,
    pub name: String,
    pub slug: String,
    /// Length in days
    pub duration: u32,
    pub max_group_size: u32,
    pub difficulty: Difficulty,
    #[serde(default = "default_rating")]
    pub ratings_average: f64,
    #[serde(default)]
    pub ratings_quantity: u32,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_discount: Option<f64>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub image_cover: String,
    #[serde(default)]
    pub images: Vec<String>,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    /// Scheduled start dates (RFC 3339)
    #[serde(default)]
    pub start_dates: Vec<String>,
    /// Hidden from public listings
    #[serde(default)]
    pub secret_tour: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_location: Option<TourLocation>,
    #[serde(default)]
    pub locations: Vec<TourLocation>,
    /// Guide user IDs
    #[serde(default)]
    pub guides: Vec<String>,
    /// Capacity counters, one per start date
    #[serde(default)]
    pub booked_slots: Vec<BookedSlot>,
}

fn default_rating() -> f64 {
    4.5
}

impl Tour {
    /// Find the slot index whose start date falls on the same calendar day.
    pub fn slot_index_for_date(&self, date: &str) -> Option<usize> {
        let wanted = calendar_day(date)?;
        self.booked_slots
            .iter()
            .position(|slot| calendar_day(&slot.start_date) == Some(wanted))
    }

    /// Whether the slot at `index` can take one more participant.
    pub fn slot_has_capacity(&self, index: usize) -> bool {
        self.booked_slots
            .get(index)
            .map(|slot| !slot.sold_out && slot.participants < self.max_group_size)
            .unwrap_or(false)
    }

    /// Record one more participant on the slot, marking it sold out when full.
    pub fn book_slot(&mut self, index: usize) {
        let max = self.max_group_size;
        if let Some(slot) = self.booked_slots.get_mut(index) {
            slot.participants += 1;
            if slot.participants >= max {
                slot.sold_out = true;
            }
        }
    }

    /// Release one participant from the slot (booking deleted or moved).
    pub fn release_slot(&mut self, index: usize) {
        if let Some(slot) = self.booked_slots.get_mut(index) {
            slot.participants = slot.participants.saturating_sub(1);
            slot.sold_out = false;
        }
    }

    /// Replace the schedule, carrying counters over for dates that survive.
    pub fn set_start_dates(&mut self, dates: Vec<String>) {
        let old = std::mem::take(&mut self.booked_slots);
        self.booked_slots = dates
            .iter()
            .map(|date| {
                let day = calendar_day(date);
                old.iter()
                    .find(|slot| day.is_some() && calendar_day(&slot.start_date) == day)
                    .map(|slot| BookedSlot {
                        start_date: date.clone(),
                        participants: slot.participants,
                        sold_out: slot.sold_out,
                    })
                    .unwrap_or(BookedSlot {
                        start_date: date.clone(),
                        participants: 0,
                        sold_out: false,
                    })
            })
            .collect();
        self.start_dates = dates;
    }

    /// Apply a freshly computed review aggregate, rounding to one decimal.
    pub fn set_ratings(&mut self, quantity: u32, average: f64) {
        self.ratings_quantity = quantity;
        self.ratings_average = if quantity == 0 {
            default_rating()
        } else {
            (average * 10.0).round() / 10.0
        };
    }
}

/// Derive a URL-safe slug from a tour name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn calendar_day(raw: &str) -> Option<chrono::NaiveDate> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tour_with_slots() -> Tour {
        Tour {
            id: "t1".into(),
            name: "The Forest Hiker".into(),
            slug: "the-forest-hiker".into(),
            duration: 5,
            max_group_size: 2,
            difficulty: Difficulty::Easy,
            ratings_average: 4.5,
            ratings_quantity: 0,
            price: 497.0,
            price_discount: None,
            summary: "Breathtaking hike through the Canadian Banff".into(),
            description: None,
            image_cover: "tour-1-cover.jpg".into(),
            images: vec![],
            created_at: "2026-01-01T00:00:00Z".into(),
            start_dates: vec!["2026-04-25T09:00:00Z".into()],
            secret_tour: false,
            start_location: None,
            locations: vec![],
            guides: vec![],
            booked_slots: vec![BookedSlot {
                start_date: "2026-04-25T09:00:00Z".into(),
                participants: 0,
                sold_out: false,
            }],
        }
    }

    #[test]
    fn slugify_normalizes_names() {
        assert_eq!(slugify("The Forest Hiker"), "the-forest-hiker");
        assert_eq!(slugify("  Sea   Explorer! "), "sea-explorer");
        assert_eq!(slugify("Åland & Back"), "land-back");
    }

    #[test]
    fn slot_lookup_matches_on_calendar_day() {
        let tour = tour_with_slots();
        assert_eq!(tour.slot_index_for_date("2026-04-25T17:30:00Z"), Some(0));
        assert_eq!(tour.slot_index_for_date("2026-04-25"), Some(0));
        assert_eq!(tour.slot_index_for_date("2026-04-26T09:00:00Z"), None);
        assert_eq!(tour.slot_index_for_date("not-a-date"), None);
    }

    #[test]
    fn booking_a_full_slot_marks_it_sold_out() {
        let mut tour = tour_with_slots();
        assert!(tour.slot_has_capacity(0));
        tour.book_slot(0);
        assert!(tour.slot_has_capacity(0));
        tour.book_slot(0);
        assert!(!tour.slot_has_capacity(0));
        assert!(tour.booked_slots[0].sold_out);
        assert_eq!(tour.booked_slots[0].participants, 2);
    }

    #[test]
    fn releasing_a_slot_clears_sold_out() {
        let mut tour = tour_with_slots();
        tour.book_slot(0);
        tour.book_slot(0);
        assert!(tour.booked_slots[0].sold_out);

        tour.release_slot(0);
        assert!(!tour.booked_slots[0].sold_out);
        assert_eq!(tour.booked_slots[0].participants, 1);

        tour.release_slot(0);
        tour.release_slot(0);
        assert_eq!(tour.booked_slots[0].participants, 0);
    }

    #[test]
    fn schedule_update_keeps_counters_for_surviving_dates() {
        let mut tour = tour_with_slots();
        tour.book_slot(0);

        tour.set_start_dates(vec![
            "2026-04-25T10:00:00Z".into(),
            "2026-06-01T09:00:00Z".into(),
        ]);

        assert_eq!(tour.booked_slots.len(), 2);
        assert_eq!(tour.booked_slots[0].participants, 1);
        assert_eq!(tour.booked_slots[1].participants, 0);
        assert_eq!(tour.start_dates.len(), 2);
    }

    #[test]
    fn ratings_round_to_one_decimal_and_reset_when_empty() {
        let mut tour = tour_with_slots();
        tour.set_ratings(3, 4.666_666);
        assert_eq!(tour.ratings_quantity, 3);
        assert_eq!(tour.ratings_average, 4.7);

        tour.set_ratings(0, 0.0);
        assert_eq!(tour.ratings_average, 4.5);
    }
}
