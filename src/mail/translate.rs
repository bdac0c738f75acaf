use std::io::Read;

use crate::api::models::{
    BodyType, EmailAddress, FileAttachment, Importance, ItemBody, Recipient, WireMessage,
};
use crate::error::{AppError, AppResult};

use super::message::{Address, Attachment, EmailMessage, Priority};

pub fn translate(email: EmailMessage) -> AppResult<WireMessage> {
    let EmailMessage {
        subject,
        body,
        is_html,
        from,
        to,
        cc,
        bcc,
        attachments,
        priority,
    } = email;

    if from.email.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "sender address is required".to_string(),
        ));
    }

    Ok(WireMessage {
        subject,
        body: ItemBody {
            content_type: if is_html {
                BodyType::Html
            } else {
                BodyType::Text
            },
            content: body,
        },
        from: recipient(&from),
        to_recipients: recipients(&to),
        cc_recipients: recipients(&cc),
        bcc_recipients: recipients(&bcc),
        attachments: file_attachments(attachments)?,
        importance: importance(priority),
    })
}

pub fn importance(priority: Priority) -> Importance {
    match priority {
        Priority::High => Importance::High,
        Priority::Low => Importance::Low,
        Priority::Normal | Priority::Unspecified => Importance::Normal,
    }
}

fn recipient(address: &Address) -> Recipient {
    Recipient {
        email_address: EmailAddress {
            address: address.to_string(),
            name: address.name.clone(),
        },
    }
}

fn recipients(addresses: &[Address]) -> Option<Vec<Recipient>> {
    if addresses.is_empty() {
        return None;
    }

    Some(addresses.iter().map(recipient).collect())
}

fn file_attachments(attachments: Vec<Attachment>) -> AppResult<Option<Vec<FileAttachment>>> {
    if attachments.is_empty() {
        return Ok(None);
    }

    let mut out = Vec::with_capacity(attachments.len());
    for attachment in attachments {
        let Attachment {
            filename,
            content_type,
            mut data,
        } = attachment;

        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes).map_err(|err| {
            AppError::InvalidInput(format!("failed to read attachment `{filename}`: {err}"))
        })?;

        out.push(FileAttachment::new(filename, content_type, bytes));
    }

    Ok(Some(out))
}
