use futures::stream::TryStreamExt;
use mongodb::bson::{doc, DateTime as BsonDateTime};
use mongodb::options::ReturnDocument;

use crate::database::MongoDB;
use crate::models::{Contact, ContactResponse, CreateContactRequest};
use crate::utils::{normalize_email, parse_object_id, require_text, AppError, AppResult};

const MAX_MESSAGE_LEN: usize = 5000;

pub(crate) fn build_contact(request: &CreateContactRequest) -> AppResult<Contact> {
    let message = require_text(&request.message, "Message")?;
    if message.chars().count() > MAX_MESSAGE_LEN {
        return Err(AppError::BadRequest(format!(
            "Message must be at most {} characters",
            MAX_MESSAGE_LEN
        )));
    }

    Ok(Contact {
        id: None,
        name: require_text(&request.name, "Name")?,
        email: normalize_email(&request.email)?,
        phone: request.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()).map(str::to_string),
        subject: request.subject.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
        message,
        resolved: false,
        created_at: Some(BsonDateTime::now()),
    })
}

pub async fn submit(db: &MongoDB, request: &CreateContactRequest) -> AppResult<ContactResponse> {
    let mut contact = build_contact(request)?;
    let result = db.contacts().insert_one(&contact).await?;
    contact.id = result.inserted_id.as_object_id();

    log::info!("📨 Contact message received from {}", contact.email);
    Ok(ContactResponse::from(contact))
}

pub async fn list(db: &MongoDB) -> AppResult<Vec<ContactResponse>> {
    let contacts: Vec<Contact> = db
        .contacts()
        .find(doc! {})
        .sort(doc! { "resolved": 1, "created_at": -1 })
        .await?
        .try_collect()
        .await?;

    Ok(contacts.into_iter().map(ContactResponse::from).collect())
}

pub async fn resolve(db: &MongoDB, id: &str) -> AppResult<ContactResponse> {
    let contact_id = parse_object_id(id, "contact")?;
    let updated = db
        .contacts()
        .find_one_and_update(doc! { "_id": contact_id }, doc! { "$set": { "resolved": true } })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Contact"))?;

    Ok(ContactResponse::from(updated))
}

pub async fn delete(db: &MongoDB, id: &str) -> AppResult<()> {
    let contact_id = parse_object_id(id, "contact")?;
    let result = db.contacts().delete_one(doc! { "_id": contact_id }).await?;
    if result.deleted_count == 0 {
        return Err(AppError::not_found("Contact"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(message: &str) -> CreateContactRequest {
        CreateContactRequest {
            name: "Riya".into(),
            email: " RIYA@example.com ".into(),
            phone: Some("".into()),
            subject: Some(" Batch timings ".into()),
            message: message.into(),
        }
    }

    #[test]
    fn contact_is_normalised() {
        let contact = build_contact(&request("When does the next batch start?")).unwrap();
        assert_eq!(contact.email, "riya@example.com");
        assert_eq!(contact.phone, None);
        assert_eq!(contact.subject.as_deref(), Some("Batch timings"));
        assert!(!contact.resolved);
    }

    #[test]
    fn blank_message_is_rejected() {
        assert!(matches!(build_contact(&request("   ")), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn oversized_message_is_rejected() {
        let long = "x".repeat(MAX_MESSAGE_LEN + 1);
        assert!(build_contact(&request(&long)).is_err());
    }
}
