use thiserror::Error;

/// Input rejected before any remote call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("`{field}` is required")]
    Missing { field: &'static str },
    #[error("`{field}` must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("a user cannot follow themselves")]
    SelfFollow,
    #[error("page must be at least 1 and page size must be positive (got page {page}, size {page_size})")]
    InvalidPage { page: u32, page_size: u32 },
}

impl DomainError {
    pub fn missing(field: &'static str) -> Self {
        Self::Missing { field }
    }

    pub fn too_long(field: &'static str, max: usize) -> Self {
        Self::TooLong { field, max }
    }
}

/// Reject empty or whitespace-only identifiers.
pub fn require_id<'a>(field: &'static str, value: &'a str) -> Result<&'a str, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::missing(field));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_id_rejects_blank_values() {
        assert_eq!(require_id("post_id", ""), Err(DomainError::missing("post_id")));
        assert_eq!(require_id("post_id", "   "), Err(DomainError::missing("post_id")));
        assert_eq!(require_id("post_id", " p1 "), Ok("p1"));
    }

    #[test]
    fn messages_name_the_field() {
        let err = DomainError::too_long("caption", 2200);
        assert_eq!(err.to_string(), "`caption` must be at most 2200 characters");
    }
}
