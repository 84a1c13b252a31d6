//! # Save Endpoint
//!
//! `POST /save` - persists a transcript+summary pair the client already
//! holds. The body is parsed manually from raw bytes so that an absent or
//! malformed body maps to `InputMissing` rather than a framework-shaped
//! error, matching the reference contract.
//!
//! ## Response:
//! ```json
//! { "message": "File saved successfully at <path>" }
//! ```

use crate::error::AppError;
use crate::state::AppState;
use crate::storage::SaveRequest;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Handle one save request.
pub async fn save_result(
    app_state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    if body.is_empty() {
        return Err(AppError::InputMissing("No data provided".to_string()));
    }

    let request: SaveRequest = serde_json::from_slice(&body)?;
    let artifact = app_state.persister.save(&request)?;

    Ok(HttpResponse::Ok().json(json!({
        "message": format!("File saved successfully at {}", artifact.path.display()),
    })))
}
