//! Prediction endpoint

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use tracing::{debug, error};

use tomato_leaf::inference::PredictionResult;

use crate::error::ApiError;
use crate::state::SharedState;

/// Name of the form field carrying the image
pub const FILE_FIELD: &str = "file";

/// Bytes of the first `file` field, if any
async fn read_file_field(multipart: &mut Multipart) -> Result<Option<Vec<u8>>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Multipart(e.status(), e.body_text()))?
    {
        if field.name() == Some(FILE_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::Multipart(e.status(), e.body_text()))?;
            return Ok(Some(bytes.to_vec()));
        }
    }
    Ok(None)
}

/// POST /predict - Classify an uploaded leaf image
///
/// The model check comes first, so a server without a model answers 500
/// even for requests with no file.
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    if !state.model_loaded() {
        return Err(ApiError::ModelNotLoaded);
    }

    // A body that is not multipart carries no file
    let mut multipart = multipart.map_err(|_| ApiError::NoFile)?;
    let bytes = read_file_field(&mut multipart)
        .await?
        .ok_or(ApiError::NoFile)?;
    debug!("Received upload of {} bytes", bytes.len());

    let worker_state = state.clone();
    let result = tokio::task::spawn_blocking(move || match &worker_state.predictor {
        Some(predictor) => predictor
            .predict_bytes(&bytes)
            .map_err(|e| ApiError::Prediction(e.to_string())),
        None => Err(ApiError::ModelNotLoaded),
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    match result {
        Ok(prediction) => Ok(Json(prediction)),
        Err(e) => {
            error!("Prediction failed: {}", e.message());
            Err(e)
        }
    }
}
