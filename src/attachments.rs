// attachments.rs - Prompt Attachment Processing
// Turns files attached to /generate into prompt text or base64 images.
//
// Key Features:
// - Classifies attachments as text, PDF or image by content type (file name as fallback)
// - Truncates long text and PDF content with a visible notice
// - Extracts PDF text with pdf-extract
// - Encodes images as base64 for the Ollama `images` field
//
// Used by: commands/generate.rs

use base64::{engine::general_purpose, Engine as _};
use serenity::model::channel::Attachment;

use crate::config::MAX_ATTACHMENT_TEXT;
use crate::error::{BotError, BotResult};
use crate::service::ServiceClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Text,
    Pdf,
    Image,
    Unsupported,
}

/// Content type as reported by Discord, guessed from the file name when missing
pub fn content_type_of(attachment: &Attachment) -> String {
    attachment.content_type.clone().unwrap_or_else(|| {
        mime_guess::from_path(&attachment.filename)
            .first_or_octet_stream()
            .to_string()
    })
}

pub fn classify(content_type: &str) -> AttachmentKind {
    let parsed: mime::Mime = match content_type.parse() {
        Ok(parsed) => parsed,
        Err(_) => return AttachmentKind::Unsupported,
    };
    let subtype = parsed.subtype().as_str();
    let suffix = parsed.suffix().map(|s| s.as_str()).unwrap_or("");

    if parsed.type_() == mime::IMAGE {
        AttachmentKind::Image
    } else if subtype == "pdf" {
        AttachmentKind::Pdf
    } else if parsed.type_() == mime::TEXT
        || [subtype, suffix]
            .iter()
            .any(|part| part.contains("json") || part.contains("xml") || part.contains("sh") || part.contains("php"))
    {
        AttachmentKind::Text
    } else {
        AttachmentKind::Unsupported
    }
}

/// Cut text to the attachment limit, appending a notice when something was dropped
pub fn truncate_content(content: &str, notice: &str) -> String {
    match content.char_indices().nth(MAX_ATTACHMENT_TEXT) {
        Some((idx, _)) => {
            log::warn!(
                "[ATTACH] Attachment content truncated from {} characters",
                content.chars().count()
            );
            format!("{}\n\n[{}]", &content[..idx], notice)
        }
        None => content.to_string(),
    }
}

/// Text, PDF and image content gathered from a command's attachments
#[derive(Debug, Default)]
pub struct PromptAttachments {
    pub texts: Vec<String>,
    pub pdfs: Vec<String>,
    pub images: Vec<String>,
}

impl PromptAttachments {
    /// Prompt suffix with every text and PDF section, in attachment order
    pub fn prompt_suffix(&self) -> String {
        self.texts.iter().chain(self.pdfs.iter()).map(String::as_str).collect()
    }
}

/// Download and convert the attachments. Unsupported types are skipped.
/// The error names which kind of attachment failed.
pub async fn collect(service: &ServiceClient, attachments: &[&Attachment]) -> Result<PromptAttachments, (AttachmentKind, BotError)> {
    let mut collected = PromptAttachments::default();

    for attachment in attachments {
        let kind = classify(&content_type_of(attachment));
        match kind {
            AttachmentKind::Text => {
                let content = download_text(service, attachment).await.map_err(|e| (kind, e))?;
                let content = truncate_content(&content, "File truncated due to size");
                collected
                    .texts
                    .push(format!("\n\n📄 Text File - {}:\n{}", attachment.filename, content));
            }
            AttachmentKind::Pdf => {
                let bytes = download(service, attachment).await.map_err(|e| (kind, e))?;
                let text = extract_pdf_text(&bytes).map_err(|e| (kind, e))?;
                let text = truncate_content(&text, "PDF content truncated due to size");
                collected
                    .pdfs
                    .push(format!("\n\n📑 PDF Document - {}:\n{}", attachment.filename, text));
                log::info!("[ATTACH] Successfully extracted text from PDF {}", attachment.filename);
            }
            AttachmentKind::Image => {
                let bytes = download(service, attachment).await.map_err(|e| (kind, e))?;
                collected.images.push(general_purpose::STANDARD.encode(&bytes));
            }
            AttachmentKind::Unsupported => {
                log::warn!(
                    "[ATTACH] Skipping attachment {} with unsupported type {:?}",
                    attachment.filename,
                    attachment.content_type
                );
            }
        }
    }

    Ok(collected)
}

async fn download(service: &ServiceClient, attachment: &Attachment) -> BotResult<Vec<u8>> {
    service.download(&attachment.url).await.map_err(|e| BotError::Attachment {
        name: attachment.filename.clone(),
        reason: e.to_string(),
    })
}

async fn download_text(service: &ServiceClient, attachment: &Attachment) -> BotResult<String> {
    let bytes = download(service, attachment).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn extract_pdf_text(bytes: &[u8]) -> BotResult<String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| BotError::Pdf(e.to_string()))
}

impl AttachmentKind {
    /// Plural label used in user-facing failure messages
    pub fn label(self) -> &'static str {
        match self {
            AttachmentKind::Text => "text attachments",
            AttachmentKind::Pdf => "PDF attachments",
            AttachmentKind::Image => "image attachments",
            AttachmentKind::Unsupported => "attachments",
        }
    }
}
