use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub email: String,
    pub name: Option<String>,
}

impl Address {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    pub fn with_name(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: Some(name.into()),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.email.trim())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Priority {
    High,
    Normal,
    Low,
    #[default]
    Unspecified,
}

pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Box<dyn Read + Send>,
}

impl Attachment {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Read + Send + 'static,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data: Box::new(data),
        }
    }

    pub fn from_bytes(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(filename, content_type, Cursor::new(bytes.into()))
    }

    pub fn from_path(path: &Path) -> AppResult<Self> {
        let filename = path
            .file_name()
            .map(|value| value.to_string_lossy().to_string())
            .ok_or_else(|| {
                AppError::InvalidInput(format!("invalid attachment path: {}", path.display()))
            })?;
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let file = File::open(path)?;

        Ok(Self::new(filename, content_type, file))
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
    pub is_html: bool,
    pub from: Address,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub attachments: Vec<Attachment>,
    pub priority: Priority,
}

impl EmailMessage {
    pub fn new(from: Address) -> Self {
        Self {
            subject: String::new(),
            body: String::new(),
            is_html: false,
            from,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            attachments: Vec::new(),
            priority: Priority::Unspecified,
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.is_html = false;
        self
    }

    pub fn html_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self.is_html = true;
        self
    }

    pub fn to(mut self, address: Address) -> Self {
        self.to.push(address);
        self
    }

    pub fn cc(mut self, address: Address) -> Self {
        self.cc.push(address);
        self
    }

    pub fn bcc(mut self, address: Address) -> Self {
        self.bcc.push(address);
        self
    }

    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}
