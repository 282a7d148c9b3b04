//! Post-level rules shared by the services and the command-line driver.

use std::cmp::Ordering;

use super::entities::Post;
use super::error::DomainError;

pub const CAPTION_MAX_CHARS: usize = 2200;
pub const LOCATION_MAX_CHARS: usize = 1000;

/// Split a comma-separated tag string.
///
/// All whitespace is removed before splitting and empty entries are dropped,
/// so `"nature, travel"` becomes `["nature", "travel"]`.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    compact
        .split(',')
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn validate_caption(caption: &str) -> Result<(), DomainError> {
    if caption.chars().count() > CAPTION_MAX_CHARS {
        return Err(DomainError::too_long("caption", CAPTION_MAX_CHARS));
    }
    Ok(())
}

pub fn validate_location(location: &str) -> Result<(), DomainError> {
    if location.chars().count() > LOCATION_MAX_CHARS {
        return Err(DomainError::too_long("location", LOCATION_MAX_CHARS));
    }
    Ok(())
}

pub fn has_liked(likes: &[String], user_id: &str) -> bool {
    likes.iter().any(|id| id == user_id)
}

/// Like list after `user_id` toggles their like.
pub fn toggle_like(likes: &[String], user_id: &str) -> Vec<String> {
    if has_liked(likes, user_id) {
        likes.iter().filter(|id| *id != user_id).cloned().collect()
    } else {
        let mut next = likes.to_vec();
        next.push(user_id.to_string());
        next
    }
}

/// Newest first; equal timestamps fall back to descending id.
pub fn newest_first(a: &Post, b: &Post) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}
