//! Attachment encoding shared by every vendor adapter.
//!
//! [`encode`] reads an attachment once and produces a vendor-neutral
//! [`EncodedAttachment`]; each adapter maps that onto its own content-block
//! vocabulary. Kinds a vendor cannot accept become a delimited placeholder
//! string instead of an error.

use crate::llm::traits::{Vendor, VendorCapabilities};
use crate::types::{Attachment, AttachmentKind};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

/// MIME type of PDF documents
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// An attachment ready to be placed in a vendor request
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedAttachment {
    /// Delimited text block
    Text(String),
    /// Base64 image with its sniffed media type
    Image {
        media_type: &'static str,
        data: String,
    },
    /// Base64 PDF document
    Document { name: String, data: String },
    /// Stand-in text for an attachment the vendor cannot take
    Placeholder(String),
}

impl EncodedAttachment {
    /// Text carried by text-like variants
    pub fn as_text(&self) -> Option<&str> {
        match self {
            EncodedAttachment::Text(text) | EncodedAttachment::Placeholder(text) => Some(text),
            _ => None,
        }
    }

    /// Data URL for image and document payloads
    pub fn data_url(&self) -> Option<String> {
        match self {
            EncodedAttachment::Image { media_type, data } => {
                Some(format!("data:{};base64,{}", media_type, data))
            }
            EncodedAttachment::Document { data, .. } => {
                Some(format!("data:{};base64,{}", PDF_MEDIA_TYPE, data))
            }
            _ => None,
        }
    }
}

/// Sniff an image MIME type from its leading bytes
pub fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Placeholder for an attachment that cannot be sent as-is
pub fn placeholder(attachment: &Attachment, reason: &str) -> EncodedAttachment {
    EncodedAttachment::Placeholder(format!(
        "[Attachment \"{}\" omitted: {}]",
        attachment.name, reason
    ))
}

fn text_block(attachment: &Attachment, body: &str) -> EncodedAttachment {
    EncodedAttachment::Text(format!(
        "<attachment name=\"{}\" kind=\"{}\">\n{}\n</attachment>",
        attachment.name, attachment.kind, body
    ))
}

/// Encode one attachment for a vendor with the given capabilities.
///
/// Never fails: unsupported kinds, unreadable files, and unrecognized image
/// bytes all degrade to a placeholder.
pub async fn encode(
    attachment: &Attachment,
    vendor: Vendor,
    capabilities: &VendorCapabilities,
) -> EncodedAttachment {
    let supported = match attachment.kind {
        AttachmentKind::Text | AttachmentKind::Webpage => true,
        AttachmentKind::Image => capabilities.images,
        AttachmentKind::Pdf => capabilities.pdfs,
    };
    if !supported {
        tracing::debug!(
            "📎 {} attachment '{}' unsupported by {}, using placeholder",
            attachment.kind,
            attachment.name,
            vendor
        );
        return placeholder(
            attachment,
            &format!("this attachment type is unsupported by {}", vendor),
        );
    }

    let bytes = match tokio::fs::read(&attachment.locator).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(
                "📎 Failed to read attachment '{}' at {}: {}",
                attachment.name,
                attachment.locator.display(),
                e
            );
            return placeholder(attachment, "the file could not be read");
        }
    };

    match attachment.kind {
        AttachmentKind::Text | AttachmentKind::Webpage => {
            text_block(attachment, &String::from_utf8_lossy(&bytes))
        }
        AttachmentKind::Image => match sniff_image_type(&bytes) {
            Some(media_type) => EncodedAttachment::Image {
                media_type,
                data: STANDARD.encode(&bytes),
            },
            None => {
                tracing::warn!(
                    "📎 Attachment '{}' is not a recognized image format",
                    attachment.name
                );
                placeholder(attachment, "unrecognized image format")
            }
        },
        AttachmentKind::Pdf => EncodedAttachment::Document {
            name: attachment.name.clone(),
            data: STANDARD.encode(&bytes),
        },
    }
}

/// Annotation marking the cache boundary
pub fn cache_control() -> Value {
    json!({"type": "ephemeral"})
}

/// Place the cache boundary on the most recent attachment-bearing message.
///
/// Every existing `cache_control` annotation in `messages` is stripped
/// first, so exactly one content block carries it afterwards: the last block
/// of the last message listed in `attachment_bearing`.
pub fn apply_cache_boundary(messages: &mut [Value], attachment_bearing: &[usize]) {
    for message in messages.iter_mut() {
        if let Some(blocks) = message.get_mut("content").and_then(Value::as_array_mut) {
            for block in blocks {
                if let Some(block) = block.as_object_mut() {
                    block.remove("cache_control");
                }
            }
        }
    }

    let Some(&target) = attachment_bearing.iter().max() else {
        return;
    };
    let last_block = messages
        .get_mut(target)
        .and_then(|m| m.get_mut("content"))
        .and_then(Value::as_array_mut)
        .and_then(|blocks| blocks.last_mut())
        .and_then(Value::as_object_mut);
    if let Some(block) = last_block {
        block.insert("cache_control".to_string(), cache_control());
    }
}
