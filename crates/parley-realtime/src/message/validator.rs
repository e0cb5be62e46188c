//! Inbound validation rules.

use parley_core::error::AppError;
use parley_core::types::MessageId;

use super::types::{InboundFrame, MessageDraft};

/// Maximum message IDs accepted in one delivery or read confirmation.
pub const MAX_BATCH_IDS: usize = 500;

/// Validates the raw frame before parsing.
pub fn validate_frame(raw: &str, max_bytes: usize) -> Result<(), AppError> {
    if raw.len() > max_bytes {
        return Err(AppError::validation(format!(
            "Event exceeds maximum size of {max_bytes} bytes"
        )));
    }

    if raw.trim().is_empty() {
        return Err(AppError::validation("Empty event"));
    }

    Ok(())
}

/// Parses a raw frame into a typed inbound event.
pub fn parse_frame(raw: &str) -> Result<InboundFrame, AppError> {
    serde_json::from_str(raw).map_err(|e| {
        tracing::debug!(error = %e, "Rejected malformed inbound frame");
        AppError::validation("Malformed or unsupported event")
    })
}

/// Validates text content: non-blank and at most `max_chars` characters.
pub fn validate_text(content: Option<&str>, max_chars: usize) -> Result<&str, AppError> {
    let content = content.unwrap_or_default();
    if content.trim().is_empty() {
        return Err(AppError::validation("Message content cannot be empty"));
    }
    if content.chars().count() > max_chars {
        return Err(AppError::validation(format!(
            "Message content exceeds {max_chars} characters"
        )));
    }
    Ok(content)
}

/// Validates that a draft is well-formed for its message type.
pub fn validate_draft(draft: &MessageDraft, max_chars: usize) -> Result<(), AppError> {
    if !draft.message_type.is_media() {
        validate_text(draft.content.as_deref(), max_chars)?;
        if draft.file.is_some() {
            return Err(AppError::validation(
                "Text messages cannot carry a file reference",
            ));
        }
        return Ok(());
    }

    match &draft.file {
        Some(file) if !file.url.trim().is_empty() => {}
        _ => {
            return Err(AppError::validation(format!(
                "A file reference is required for {} messages",
                draft.message_type
            )));
        }
    }

    if let Some(caption) = &draft.content {
        if caption.chars().count() > max_chars {
            return Err(AppError::validation(format!(
                "Caption exceeds {max_chars} characters"
            )));
        }
    }

    Ok(())
}

/// Validates a batch of message IDs in a delivery or read confirmation.
pub fn validate_message_ids(ids: &[MessageId]) -> Result<(), AppError> {
    if ids.is_empty() {
        return Err(AppError::validation("No message IDs given"));
    }
    if ids.len() > MAX_BATCH_IDS {
        return Err(AppError::validation(format!(
            "At most {MAX_BATCH_IDS} message IDs per request"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::ErrorKind;
    use parley_core::types::GroupId;
    use parley_entity::{FileRef, MessageType};

    fn draft(message_type: MessageType, content: Option<&str>) -> MessageDraft {
        MessageDraft {
            group_id: GroupId::new(),
            message_type,
            content: content.map(str::to_string),
            file: None,
            reply_to_id: None,
            temp_id: None,
        }
    }

    #[test]
    fn test_text_limits() {
        assert!(validate_draft(&draft(MessageType::Text, Some("hi")), 4000).is_ok());
        assert!(validate_draft(&draft(MessageType::Text, None), 4000).is_err());
        assert!(validate_draft(&draft(MessageType::Text, Some("   \n")), 4000).is_err());

        let exact = "a".repeat(4000);
        assert!(validate_draft(&draft(MessageType::Text, Some(&exact)), 4000).is_ok());
        let over = "a".repeat(4001);
        let err = validate_draft(&draft(MessageType::Text, Some(&over)), 4000).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_text_limit_counts_characters_not_bytes() {
        let wide = "é".repeat(4000);
        assert!(wide.len() > 4000);
        assert!(validate_text(Some(&wide), 4000).is_ok());
    }

    #[test]
    fn test_media_requires_file() {
        assert!(validate_draft(&draft(MessageType::Image, None), 4000).is_err());

        let mut with_file = draft(MessageType::Image, Some("caption"));
        with_file.file = Some(FileRef {
            url: "https://cdn.example.com/a.png".to_string(),
            name: None,
            size: None,
            mime_type: Some("image/png".to_string()),
        });
        assert!(validate_draft(&with_file, 4000).is_ok());
    }

    #[test]
    fn test_frame_size() {
        assert!(validate_frame("{}", 16).is_ok());
        assert!(validate_frame(&"x".repeat(17), 16).is_err());
        assert!(validate_frame("  ", 16).is_err());
    }

    #[test]
    fn test_message_id_batch() {
        assert!(validate_message_ids(&[]).is_err());
        assert!(validate_message_ids(&[MessageId::new()]).is_ok());
    }
}
