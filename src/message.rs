//! Outbound message assembly
//!
//! Builds the full email for a report send request: subject, plain-text
//! body, and the PDF attachment. Construction is pure; rendering to MIME is
//! the only fallible step and does no I/O.

use mail_builder::MessageBuilder;
use serde::Deserialize;

use crate::error::{MailerError, Result};

/// Attachments are always declared as PDF; the content is never sniffed.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Descriptive metadata accompanying a report. Unknown keys in the request
/// body are ignored; recognized values contribute to the subject and body
/// only when non-empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportMetadata {
    pub case_ref: Option<String>,
    pub generated_by: Option<String>,
    pub badge_id: Option<String>,
    pub report_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content: Vec<u8>,
}

/// A fully assembled email, built fresh per request.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub from_addr: String,
    pub to_addr: String,
    pub subject: String,
    pub body_text: String,
    pub attachment: Attachment,
}

impl OutboundMessage {
    pub fn build(
        from_addr: &str,
        to_addr: &str,
        filename: &str,
        content: Vec<u8>,
        metadata: Option<&ReportMetadata>,
    ) -> Self {
        Self {
            from_addr: from_addr.to_string(),
            to_addr: to_addr.to_string(),
            subject: subject_line(metadata),
            body_text: body_text(metadata),
            attachment: Attachment {
                filename: filename.to_string(),
                content,
            },
        }
    }

    /// Renders the message to raw MIME bytes ready for SMTP submission.
    pub fn to_mime(&self) -> Result<Vec<u8>> {
        MessageBuilder::new()
            .from(self.from_addr.as_str())
            .to(self.to_addr.as_str())
            .subject(self.subject.as_str())
            .text_body(self.body_text.as_str())
            .attachment(
                PDF_MEDIA_TYPE,
                self.attachment.filename.as_str(),
                &self.attachment.content[..],
            )
            .write_to_vec()
            .map_err(|e| MailerError::Message(e.to_string()))
    }
}

fn subject_line(metadata: Option<&ReportMetadata>) -> String {
    match metadata.and_then(|meta| non_empty(&meta.case_ref)) {
        Some(case_ref) => format!("ForensicLens Report - Case {case_ref}"),
        None => "ForensicLens Report".to_string(),
    }
}

fn body_text(metadata: Option<&ReportMetadata>) -> String {
    let mut lines = vec![
        "ForensicLens 3D - Forensic Analysis Report".to_string(),
        String::new(),
    ];

    if let Some(meta) = metadata {
        if let Some(value) = non_empty(&meta.generated_by) {
            lines.push(format!("Generated by: {value}"));
        }
        if let Some(value) = non_empty(&meta.badge_id) {
            lines.push(format!("Badge ID: {value}"));
        }
        if let Some(value) = non_empty(&meta.report_date) {
            lines.push(format!("Report Date: {value}"));
        }
        if let Some(value) = non_empty(&meta.case_ref) {
            lines.push(format!("Case Reference: {value}"));
        }
    }

    lines.extend([
        String::new(),
        "This email contains the official ForensicLens analysis report as a PDF attachment."
            .to_string(),
        String::new(),
        "CONFIDENTIAL - DO NOT DISTRIBUTE".to_string(),
        String::new(),
        "---".to_string(),
        "ForensicLens 3D System".to_string(),
    ]);

    lines.join("\n")
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    fn build(metadata: Option<&ReportMetadata>) -> OutboundMessage {
        OutboundMessage::build(
            "no-reply@forensiclens.com",
            "detective@example.com",
            "report.pdf",
            b"%PDF-1.4 test".to_vec(),
            metadata,
        )
    }

    #[test]
    fn test_subject_without_case_ref() {
        assert_eq!(build(None).subject, "ForensicLens Report");

        let meta = ReportMetadata {
            case_ref: Some(String::new()),
            ..ReportMetadata::default()
        };
        assert_eq!(build(Some(&meta)).subject, "ForensicLens Report");
    }

    #[test]
    fn test_subject_with_case_ref() {
        let meta = ReportMetadata {
            case_ref: Some("CASE-42".to_string()),
            ..ReportMetadata::default()
        };
        assert_eq!(build(Some(&meta)).subject, "ForensicLens Report - Case CASE-42");
    }

    #[test]
    fn test_body_without_metadata_keeps_header_and_footer() {
        let body = build(None).body_text;
        assert!(body.starts_with("ForensicLens 3D - Forensic Analysis Report\n"));
        assert!(body.contains("CONFIDENTIAL - DO NOT DISTRIBUTE"));
        assert!(body.ends_with("---\nForensicLens 3D System"));
        assert!(!body.contains("Generated by:"));
        assert!(!body.contains("Case Reference:"));
    }

    #[test]
    fn test_body_metadata_lines_in_fixed_order() {
        let meta = ReportMetadata {
            case_ref: Some("CASE-42".to_string()),
            badge_id: Some("B7".to_string()),
            ..ReportMetadata::default()
        };
        let body = build(Some(&meta)).body_text;

        let badge = body.find("Badge ID: B7").expect("badge line missing");
        let case_ref = body.find("Case Reference: CASE-42").expect("case line missing");
        assert!(badge < case_ref);
        assert!(!body.contains("Generated by:"));
        assert!(!body.contains("Report Date:"));
    }

    #[test]
    fn test_full_metadata_order() {
        let meta = ReportMetadata {
            case_ref: Some("CASE-1".to_string()),
            generated_by: Some("Det. Row".to_string()),
            badge_id: Some("B1".to_string()),
            report_date: Some("2024-06-01".to_string()),
        };
        let body = build(Some(&meta)).body_text;
        let positions = [
            body.find("Generated by: Det. Row").unwrap(),
            body.find("Badge ID: B1").unwrap(),
            body.find("Report Date: 2024-06-01").unwrap(),
            body.find("Case Reference: CASE-1").unwrap(),
        ];
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_mime_contains_attachment_and_round_trips() {
        let message = build(None);
        let mime = message.to_mime().unwrap();
        let text = String::from_utf8_lossy(&mime);

        assert!(text.contains("Subject: ForensicLens Report"));
        assert!(text.contains("application/pdf"));
        assert!(text.contains("report.pdf"));

        // Attachment content is short enough to land on a single base64 line.
        let encoded = BASE64.encode(b"%PDF-1.4 test");
        assert!(text.contains(&encoded));
        assert_eq!(BASE64.decode(&encoded).unwrap(), b"%PDF-1.4 test");
    }
}
