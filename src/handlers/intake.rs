//! Intake endpoints: project briefs, quote requests, contact enquiries.

use axum::{
    extract::{Multipart, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServiceError;
use crate::notifications::{dispatch, templates};
use crate::services::briefs::{IntakeField, IntakeFile};
use crate::AppState;

struct IntakeForm {
    fields: Vec<IntakeField>,
    files: Vec<IntakeFile>,
    /// Fields pulled out of the fold by name, e.g. `orderId`.
    reserved: std::collections::HashMap<String, String>,
}

/// Splits a multipart submission into text answers, file uploads, and
/// the reserved control fields named by the caller.
async fn read_intake_form(
    mut multipart: Multipart,
    reserved_names: &[&str],
) -> Result<IntakeForm, ServiceError> {
    let mut form = IntakeForm {
        fields: Vec::new(),
        files: Vec::new(),
        reserved: std::collections::HashMap::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::BadRequest(format!("invalid multipart payload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name.is_empty() {
            continue;
        }

        if let Some(filename) = field.file_name().map(str::to_string) {
            let data = field
                .bytes()
                .await
                .map_err(|e| ServiceError::BadRequest(format!("failed to read upload: {e}")))?;
            if !data.is_empty() {
                form.files.push(IntakeFile {
                    field_key: name,
                    filename,
                    data,
                });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ServiceError::BadRequest(format!("failed to read field: {e}")))?;
        if reserved_names.contains(&name.as_str()) {
            form.reserved.insert(name, value);
        } else if !value.trim().is_empty() {
            form.fields.push(IntakeField { label: name, value });
        }
    }

    Ok(form)
}

#[utoipa::path(
    post,
    path = "/api/v1/briefs",
    summary = "Submit a project brief",
    description = "Multipart form: an orderId field, free text answers, and optional file uploads",
    responses(
        (status = 200, description = "Brief attached to the order"),
        (status = 400, description = "Invalid submission", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    tag = "Intake"
)]
pub async fn submit_brief(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, ServiceError> {
    let form = read_intake_form(multipart, &["orderId"]).await?;
    let order_id = form
        .reserved
        .get("orderId")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ServiceError::BadRequest("missing orderId".to_string()))?;

    state
        .briefs()
        .submit(order_id, &form.fields, &form.files)
        .await?;

    Ok(Json(json!({ "success": true })))
}

#[utoipa::path(
    post,
    path = "/api/v1/quotes",
    summary = "Request a quote",
    description = "Multipart form: name and email fields plus free text answers describing the project",
    responses(
        (status = 200, description = "Quote recorded"),
        (status = 400, description = "Invalid submission", body = crate::errors::ErrorResponse)
    ),
    tag = "Intake"
)]
pub async fn submit_quote(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, ServiceError> {
    let form = read_intake_form(multipart, &["name", "email"]).await?;
    let name = form
        .reserved
        .get("name")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServiceError::BadRequest("missing name".to_string()))?;
    let email = form
        .reserved
        .get("email")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServiceError::BadRequest("missing email".to_string()))?;

    let description = crate::services::briefs::fold_brief(&form.fields);
    let quote_id = state.quotes().submit(name, email, &description).await?;

    Ok(Json(json!({ "success": true, "quoteId": quote_id })))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ContactRequest {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ContactResponse {
    pub success: bool,
}

#[utoipa::path(
    post,
    path = "/api/v1/contact",
    summary = "Send a contact enquiry",
    request_body = ContactRequest,
    responses(
        (status = 200, description = "Enquiry forwarded", body = ContactResponse),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse)
    ),
    tag = "Intake"
)]
pub async fn contact(
    State(state): State<AppState>,
    Json(payload): Json<ContactRequest>,
) -> Result<Json<ContactResponse>, ServiceError> {
    payload.validate()?;

    let message = templates::owner_notification(
        &state.config.notify_email,
        "New Contact Enquiry",
        &payload.name,
        &payload.email,
        &payload.message,
    );
    dispatch(state.mailer.as_ref(), message).await;

    Ok(Json(ContactResponse { success: true }))
}
