//! Helpers for deriving edge weights from raw road metadata.
//!
//! Road data carries free-form tags for ferry durations (`"1:30"`) and
//! speed limits (`"30 mph"`); these helpers turn them into the integer
//! quantities the extraction stage feeds into
//! [`RoadEdge::weight`](crate::RoadEdge::weight). They are tolerant of the
//! tag soup found in the wild: anything unparseable is `None`, never a
//! guess.

/// Whether `value` looks like a duration tag: one to three colon-separated
/// groups of one or two digits (`"7"`, `"01:30"`, `"1:05:30"`).
pub fn duration_is_valid(value: &str) -> bool {
    let parts: Vec<&str> = value.split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return false;
    }
    parts
        .iter()
        .all(|part| (1..=2).contains(&part.len()) && part.bytes().all(|b| b.is_ascii_digit()))
}

/// Parse a duration tag into deciseconds.
///
/// A single group is minutes, two groups are hours and minutes, three
/// groups are hours, minutes, and seconds.
pub fn parse_duration(value: &str) -> Option<u32> {
    if !duration_is_valid(value) {
        return None;
    }

    let mut groups = value.split(':').map(|part| part.parse::<u32>().ok());
    let first = groups.next().flatten()?;
    let second = groups.next();
    let third = groups.next();

    let (hours, minutes, seconds) = match (second, third) {
        (None, _) => (0, first, 0),
        (Some(minutes), None) => (first, minutes?, 0),
        (Some(minutes), Some(seconds)) => (first, minutes?, seconds?),
    };

    Some(10 * (3600 * hours + 60 * minutes + seconds))
}

/// Parse a speed-limit tag into km/h.
///
/// Takes the leading integer; an `mph` (or `mp/h`) suffix converts through
/// the 1609 m statute mile, truncating like the rest of the fixed-point
/// pipeline.
pub fn parse_maxspeed(value: &str) -> Option<u32> {
    let normalized = value.to_ascii_lowercase();
    let trimmed = normalized.trim_start();

    let digits: &str = {
        let end = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        &trimmed[..end]
    };
    let speed: u32 = digits.parse().ok()?;

    if normalized.contains("mph") || normalized.contains("mp/h") {
        Some(speed * 1609 / 1000)
    } else {
        Some(speed)
    }
}
