//! Legacy endpoints — all answer `410 Gone` with a directive pointing at
//! the HTTP-only replacements.

use axum::http::StatusCode;
use axum::routing::any;
use axum::{Json, Router};

use super::error::ErrorResponse;
use super::AppState;

async fn gone(message: &'static str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::GONE,
        Json(ErrorResponse { error: message.to_string() }),
    )
}

macro_rules! gone_handler {
    ($name:ident, $message:expr) => {
        async fn $name() -> (StatusCode, Json<ErrorResponse>) {
            gone($message).await
        }
    };
}

gone_handler!(
    input_channels_gone,
    "Legacy endpoint removed. Use /api/setup/fields and /eos/set/*."
);
gone_handler!(
    mappings_gone,
    "Mapping API removed in HTTP-only mode. Use /api/setup/fields and /eos/set/*."
);
gone_handler!(
    automap_gone,
    "Automap removed in HTTP-only mode. Use fixed /eos/set/* field paths."
);
gone_handler!(
    live_values_gone,
    "Live values API replaced. Use /api/setup/fields for unified live signal state."
);
gone_handler!(
    discovery_gone,
    "Discovery removed in HTTP-only mode. Use /api/setup/fields."
);
gone_handler!(
    parameter_bindings_gone,
    "Dynamic parameter bindings removed. Use /eos/set/param/* directly."
);
gone_handler!(
    checklist_gone,
    "Checklist endpoint replaced by /api/setup/readiness."
);

pub fn legacy_router() -> Router<AppState> {
    Router::new()
        .route("/api/input-channels", any(input_channels_gone))
        .route("/api/input-channels/:channel_id", any(input_channels_gone))
        .route("/api/mappings", any(mappings_gone))
        .route("/api/mappings/:mapping_id", any(mappings_gone))
        .route("/api/mappings/automap", any(automap_gone))
        .route("/api/live-values", any(live_values_gone))
        .route("/api/discovered-inputs", any(discovery_gone))
        .route("/api/discovered-topics", any(discovery_gone))
        .route("/api/parameter-bindings", any(parameter_bindings_gone))
        .route("/api/parameter-bindings/:binding_id", any(parameter_bindings_gone))
        .route("/api/parameter-bindings/events", any(parameter_bindings_gone))
        .route("/api/setup/checklist", any(checklist_gone))
}
