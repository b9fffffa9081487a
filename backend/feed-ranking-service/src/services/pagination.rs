//! Cursor and offset pagination.
//!
//! Cursor pages are contiguous recency slices of the candidate stream: the
//! cursor marks the oldest item already served, each page takes the next
//! `page_size` items older than it, and ranking only reorders items inside
//! the page. That keeps pages disjoint and their union complete for a
//! static corpus while still serving every page in rank order.

use crate::models::FeedCandidate;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use std::cmp::Ordering;
use thiserror::Error;
use uuid::Uuid;

const SEPARATOR: char = '|';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("cursor is empty")]
    Empty,

    #[error("cursor is not valid base64 or UTF-8")]
    Encoding,

    #[error("cursor timestamp is not RFC 3339: {0}")]
    Timestamp(String),

    #[error("cursor post id is not a UUID: {0}")]
    PostId(String),
}

/// Boundary of the last page served: its oldest item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    /// Absent for bare timestamp cursors
    pub post_id: Option<Uuid>,
}

impl Cursor {
    pub fn new(created_at: DateTime<Utc>, post_id: Uuid) -> Self {
        Self {
            created_at,
            post_id: Some(post_id),
        }
    }

    pub fn from_candidate(candidate: &FeedCandidate) -> Self {
        Self::new(candidate.created_at, candidate.post_id())
    }

    pub fn encode(&self) -> String {
        let timestamp = self.created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true);
        let raw = match self.post_id {
            Some(id) => format!("{}{}{}", timestamp, SEPARATOR, id),
            None => timestamp,
        };
        general_purpose::URL_SAFE_NO_PAD.encode(raw)
    }

    /// Accepts encoded cursors and bare RFC 3339 timestamps
    pub fn decode(raw: &str) -> Result<Self, CursorError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CursorError::Empty);
        }

        if let Ok(created_at) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Self {
                created_at: created_at.with_timezone(&Utc),
                post_id: None,
            });
        }

        let bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(raw)
            .or_else(|_| general_purpose::STANDARD.decode(raw))
            .map_err(|_| CursorError::Encoding)?;
        let text = String::from_utf8(bytes).map_err(|_| CursorError::Encoding)?;

        let (timestamp, post_id) = match text.split_once(SEPARATOR) {
            Some((ts, id)) => (ts, Some(id)),
            None => (text.as_str(), None),
        };

        let created_at = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|_| CursorError::Timestamp(timestamp.to_string()))?
            .with_timezone(&Utc);
        let post_id = post_id
            .map(|id| Uuid::parse_str(id).map_err(|_| CursorError::PostId(id.to_string())))
            .transpose()?;

        Ok(Self {
            created_at,
            post_id,
        })
    }

    /// True when the item comes strictly after this boundary in
    /// (created_at desc, post id desc) order
    pub fn admits(&self, created_at: DateTime<Utc>, post_id: Uuid) -> bool {
        match created_at.cmp(&self.created_at) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => self.post_id.map(|boundary| post_id < boundary).unwrap_or(false),
        }
    }
}

/// Newest `page_size` candidates past the cursor, newest first
#[derive(Debug)]
pub struct RecencySlice {
    pub items: Vec<FeedCandidate>,
    /// More candidates exist beyond this slice
    pub has_more: bool,
    pub next_cursor: Option<Cursor>,
}

pub fn recency_slice(
    mut candidates: Vec<FeedCandidate>,
    cursor: Option<&Cursor>,
    page_size: usize,
) -> RecencySlice {
    if let Some(cursor) = cursor {
        candidates.retain(|c| cursor.admits(c.created_at, c.post_id()));
    }
    candidates.sort_by(|a, b| a.recency_cmp(b));
    candidates.truncate(page_size + 1);

    let has_more = candidates.len() > page_size;
    candidates.truncate(page_size);

    let next_cursor = if has_more {
        candidates.last().map(Cursor::from_candidate)
    } else {
        None
    };

    RecencySlice {
        items: candidates,
        has_more,
        next_cursor,
    }
}

/// 1-based page into an already ordered list. Pages below 1 clamp to 1.
pub fn offset_page<T>(items: Vec<T>, page: u32, page_size: usize) -> (Vec<T>, bool) {
    let page = page.max(1) as usize;
    let start = (page - 1).saturating_mul(page_size);
    if start >= items.len() {
        return (Vec::new(), false);
    }
    let has_next = items.len() > start + page_size;
    let slice = items.into_iter().skip(start).take(page_size).collect();
    (slice, has_next)
}

/// Storage offset for a 1-based page
pub fn page_offset(page: u32, page_size: usize) -> usize {
    (page.max(1) as usize - 1).saturating_mul(page_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeedMode, InteractionKind, Post};
    use chrono::Duration;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn candidate(created_at: DateTime<Utc>, id: Uuid, score: f64) -> FeedCandidate {
        FeedCandidate {
            post: Arc::new(Post::new(id, Uuid::new_v4(), "log", created_at)),
            created_at,
            distance_km: None,
            distance_is_regional: false,
            score,
            jitter: 0.0,
            mode: FeedMode::Network,
            is_secondary_network: false,
            interaction: InteractionKind::None,
            reason: String::new(),
        }
    }

    #[test]
    fn test_cursor_encode_decode() {
        let cursor = Cursor::new(Utc::now(), Uuid::new_v4());
        let decoded = Cursor::decode(&cursor.encode()).unwrap();
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn test_bare_timestamp_cursor() {
        let cursor = Cursor::decode("2024-05-01T10:00:00Z").unwrap();
        assert!(cursor.post_id.is_none());
        assert_eq!(cursor.created_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_invalid_cursors() {
        assert_eq!(Cursor::decode("   "), Err(CursorError::Empty));
        assert_eq!(Cursor::decode("%%%"), Err(CursorError::Encoding));
        let not_a_time = general_purpose::URL_SAFE_NO_PAD.encode("yesterday");
        assert!(matches!(
            Cursor::decode(&not_a_time),
            Err(CursorError::Timestamp(_))
        ));
        let bad_id = general_purpose::URL_SAFE_NO_PAD.encode("2024-05-01T10:00:00Z|nope");
        assert!(matches!(Cursor::decode(&bad_id), Err(CursorError::PostId(_))));
    }

    #[test]
    fn test_admits_breaks_timestamp_ties_by_id() {
        let t = Utc::now();
        let boundary = Cursor::new(t, Uuid::from_u128(5));
        assert!(boundary.admits(t, Uuid::from_u128(4)));
        assert!(!boundary.admits(t, Uuid::from_u128(5)));
        assert!(!boundary.admits(t, Uuid::from_u128(6)));
        assert!(boundary.admits(t - Duration::seconds(1), Uuid::from_u128(9)));
        assert!(!boundary.admits(t + Duration::seconds(1), Uuid::from_u128(1)));
    }

    #[test]
    fn test_slices_cover_corpus_without_overlap() {
        let now = Utc::now();
        // Shared timestamps make the id tiebreak matter
        let corpus: Vec<FeedCandidate> = (0..23)
            .map(|i| candidate(now - Duration::minutes(i / 3), Uuid::new_v4(), (i % 5) as f64))
            .collect();
        let all_ids: HashSet<Uuid> = corpus.iter().map(|c| c.post_id()).collect();

        let mut seen = HashSet::new();
        let mut cursor: Option<Cursor> = None;
        let mut pages = 0;
        loop {
            let slice = recency_slice(corpus.clone(), cursor.as_ref(), 5);
            for item in &slice.items {
                assert!(seen.insert(item.post_id()), "item served twice");
            }
            pages += 1;
            if !slice.has_more {
                break;
            }
            let next = slice.next_cursor.unwrap();
            if let Some(previous) = cursor {
                assert!(next.created_at <= previous.created_at);
            }
            cursor = Some(next);
        }

        assert_eq!(seen, all_ids);
        assert_eq!(pages, 5);
    }

    #[test]
    fn test_offset_page() {
        let items: Vec<u32> = (1..=10).collect();
        assert_eq!(offset_page(items.clone(), 1, 4), (vec![1, 2, 3, 4], true));
        assert_eq!(offset_page(items.clone(), 3, 4), (vec![9, 10], false));
        assert_eq!(offset_page(items.clone(), 0, 4), (vec![1, 2, 3, 4], true));
        assert_eq!(offset_page(items, 9, 4), (Vec::new(), false));
        assert_eq!(page_offset(3, 7), 14);
    }
}
