use super::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct ModelCard {
    id: &'static str,
    object: &'static str,
    owned_by: &'static str,
}

#[derive(Serialize)]
pub struct ModelList {
    object: &'static str,
    data: Vec<ModelCard>,
}

/// `GET /v1/models` — the adapter registry, OpenAI-shaped.
pub async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    let data = state
        .orchestrator
        .models()
        .into_iter()
        .map(|id| ModelCard { id, object: "model", owned_by: "aichat-proxy" })
        .collect();
    Json(ModelList { object: "list", data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_card_serializes_openai_shape() {
        let card = ModelCard { id: "doubao", object: "model", owned_by: "aichat-proxy" };
        let json = serde_json::to_string(&card).unwrap();
        assert!(json.contains(r#""id":"doubao""#));
        assert!(json.contains(r#""object":"model""#));
    }
}
