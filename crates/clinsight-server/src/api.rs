//! REST API for the prediction service
//!
//! Endpoints for single and batch predictions, model inventory and the
//! health/readiness probes. Every error reaching a client carries the
//! uniform `{"error": {...}}` envelope with a sanitized message; full
//! failure detail only ever goes to the logs.

use crate::context::AppContext;
use chrono::{DateTime, Utc};
use clinsight_runtime::dispatch::{self, NO_SHOW_MODEL, RISK_MODEL};
use clinsight_runtime::{DispatchError, FeatureRecord, FeatureValue};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Instant;
use tracing::{error, warn};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

// =============================================================================
// Request/Response types
// =============================================================================

/// Features describing an appointment and its patient context. Fields are
/// optional; anything the caller omits is simply absent from the model input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppointmentFeatures {
    pub patient_age: Option<i64>,
    pub previous_no_shows: Option<i64>,
    pub appointment_lead_time: Option<i64>,
    pub day_of_week: Option<String>,
    pub is_weekend: Option<bool>,
    pub referral_source: Option<String>,
    /// Additional model-specific features, passed through opaquely.
    pub extra: Option<FeatureRecord>,
}

impl Default for AppointmentFeatures {
    fn default() -> Self {
        Self {
            patient_age: None,
            previous_no_shows: Some(0),
            appointment_lead_time: None,
            day_of_week: None,
            is_weekend: None,
            referral_source: None,
            extra: None,
        }
    }
}

impl AppointmentFeatures {
    fn into_record(self) -> FeatureRecord {
        let mut record = FeatureRecord::new();
        if let Some(v) = self.patient_age {
            record.insert("patient_age".to_string(), FeatureValue::Int(v));
        }
        if let Some(v) = self.previous_no_shows {
            record.insert("previous_no_shows".to_string(), FeatureValue::Int(v));
        }
        if let Some(v) = self.appointment_lead_time {
            record.insert("appointment_lead_time".to_string(), FeatureValue::Int(v));
        }
        if let Some(v) = self.day_of_week {
            record.insert("day_of_week".to_string(), FeatureValue::Str(v));
        }
        if let Some(v) = self.is_weekend {
            record.insert("is_weekend".to_string(), FeatureValue::Bool(v));
        }
        if let Some(v) = self.referral_source {
            record.insert("referral_source".to_string(), FeatureValue::Str(v));
        }
        if let Some(extra) = self.extra {
            // Kept as one nested value, not flattened; models ignore it
            // unless they understand structured features.
            let value = serde_json::to_value(&extra).unwrap_or(serde_json::Value::Null);
            record.insert("extra".to_string(), FeatureValue::Json(value));
        }
        record
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoShowPredictionRequest {
    #[serde(default)]
    pub appointment_id: Option<i64>,
    pub patient_id: i64,
    pub appointment_data: AppointmentFeatures,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScoreRequest {
    pub patient_id: i64,
    pub patient_data: FeatureRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPredictRequest {
    pub model_name: String,
    pub data: Vec<FeatureRecord>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: u16,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    timestamp: DateTime<Utc>,
}

// =============================================================================
// API Routes
// =============================================================================

/// Build the complete API route tree
pub fn routes(
    ctx: AppContext,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let api = warp::path("api").and(warp::path("v1"));

    let no_show = api
        .and(warp::path("predict"))
        .and(warp::path("no-show"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context(ctx.clone()))
        .and_then(handle_no_show);

    let risk_score = api
        .and(warp::path("predict"))
        .and(warp::path("risk-score"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context(ctx.clone()))
        .and_then(handle_risk_score);

    let batch = api
        .and(warp::path("predict"))
        .and(warp::path("batch"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context(ctx.clone()))
        .and_then(handle_batch);

    let model_info = api
        .and(warp::path("models"))
        .and(warp::path::param::<String>())
        .and(warp::path("info"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(handle_model_info);

    let models = api
        .and(warp::path("models"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(handle_models);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(handle_health);

    let ready = warp::path("ready")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(handle_ready);

    let metrics = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(handle_metrics);

    let root = warp::path::end()
        .and(warp::get())
        .and_then(handle_root);

    // CORS configuration for browser-based clients
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allow_headers(vec!["content-type"]);

    no_show
        .or(risk_score)
        .or(batch)
        .or(model_info)
        .or(models)
        .or(health)
        .or(ready)
        .or(metrics)
        .or(root)
        .recover(handle_rejection)
        .with(cors)
}

// =============================================================================
// Filters
// =============================================================================

fn with_context(
    ctx: AppContext,
) -> impl Filter<Extract = (AppContext,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

// =============================================================================
// Handlers
// =============================================================================

async fn handle_no_show(
    body: NoShowPredictionRequest,
    ctx: AppContext,
) -> Result<warp::reply::Response, Infallible> {
    const PATH: &str = "/api/v1/predict/no-show";
    let started = Instant::now();

    let registry = match &ctx.registry {
        Some(r) => r.clone(),
        None => {
            ctx.metrics
                .record_prediction(NO_SHOW_MODEL, "unavailable", started.elapsed().as_secs_f64());
            return Ok(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Model manager not available",
                Some(PATH),
            ));
        }
    };

    let request = dispatch::NoShowRequest {
        patient_id: body.patient_id,
        appointment_id: body.appointment_id,
        features: body.appointment_data.into_record(),
    };

    match dispatch::predict_no_show(&registry, &ctx.thresholds, &request).await {
        Ok(prediction) => {
            ctx.metrics
                .record_prediction(NO_SHOW_MODEL, "success", started.elapsed().as_secs_f64());
            publish_prediction(
                &ctx,
                NO_SHOW_MODEL.to_string(),
                serde_json::json!({
                    "model": NO_SHOW_MODEL,
                    "patient_id": request.patient_id,
                    "appointment_id": request.appointment_id,
                    "prediction": prediction.prediction,
                    "probability": prediction.probability,
                    "risk_level": prediction.risk_level,
                    "timestamp": Utc::now(),
                }),
            );
            Ok(warp::reply::with_status(warp::reply::json(&prediction), StatusCode::OK)
                .into_response())
        }
        Err(e) => {
            let (status, outcome) = dispatch_outcome(&e);
            ctx.metrics
                .record_prediction(NO_SHOW_MODEL, outcome, started.elapsed().as_secs_f64());
            Ok(error_response(status, &e.to_string(), Some(PATH)))
        }
    }
}

async fn handle_risk_score(
    body: RiskScoreRequest,
    ctx: AppContext,
) -> Result<warp::reply::Response, Infallible> {
    const PATH: &str = "/api/v1/predict/risk-score";
    let started = Instant::now();

    let registry = match &ctx.registry {
        Some(r) => r.clone(),
        None => {
            ctx.metrics
                .record_prediction(RISK_MODEL, "unavailable", started.elapsed().as_secs_f64());
            return Ok(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Model manager not available",
                Some(PATH),
            ));
        }
    };

    let request = dispatch::RiskScoreRequest {
        patient_id: body.patient_id,
        patient_data: body.patient_data,
    };

    match dispatch::risk_score(&registry, &request).await {
        Ok(score) => {
            ctx.metrics
                .record_prediction(RISK_MODEL, "success", started.elapsed().as_secs_f64());
            publish_prediction(
                &ctx,
                RISK_MODEL.to_string(),
                serde_json::json!({
                    "model": RISK_MODEL,
                    "patient_id": request.patient_id,
                    "risk_score": score.risk_score,
                    "risk_level": score.risk_level,
                    "timestamp": Utc::now(),
                }),
            );
            Ok(warp::reply::with_status(warp::reply::json(&score), StatusCode::OK).into_response())
        }
        Err(e) => {
            let (status, outcome) = dispatch_outcome(&e);
            ctx.metrics
                .record_prediction(RISK_MODEL, outcome, started.elapsed().as_secs_f64());
            Ok(error_response(status, &e.to_string(), Some(PATH)))
        }
    }
}

async fn handle_batch(
    body: BatchPredictRequest,
    ctx: AppContext,
) -> Result<warp::reply::Response, Infallible> {
    const PATH: &str = "/api/v1/predict/batch";
    let started = Instant::now();
    let model_name = body.model_name.clone();

    let registry = match &ctx.registry {
        Some(r) => r.clone(),
        None => {
            ctx.metrics
                .record_prediction(&model_name, "unavailable", started.elapsed().as_secs_f64());
            return Ok(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Model manager not available",
                Some(PATH),
            ));
        }
    };

    let request = dispatch::BatchRequest {
        model_name: body.model_name,
        data: body.data,
    };

    match dispatch::predict_batch(&registry, &request).await {
        Ok(output) => {
            ctx.metrics
                .record_prediction(&model_name, "success", started.elapsed().as_secs_f64());
            publish_prediction(
                &ctx,
                model_name.clone(),
                serde_json::json!({
                    "model": model_name,
                    "records": output.predictions.len(),
                    "timestamp": Utc::now(),
                }),
            );
            Ok(warp::reply::with_status(warp::reply::json(&output), StatusCode::OK).into_response())
        }
        Err(e) => {
            let (status, outcome) = dispatch_outcome(&e);
            ctx.metrics
                .record_prediction(&model_name, outcome, started.elapsed().as_secs_f64());
            Ok(error_response(status, &e.to_string(), Some(PATH)))
        }
    }
}

async fn handle_models(ctx: AppContext) -> Result<warp::reply::Response, Infallible> {
    match &ctx.registry {
        None => Ok(warp::reply::json(&serde_json::json!({
            "models": [],
            "metadata": {},
        }))
        .into_response()),
        Some(registry) => {
            let mut models = registry.loaded_models().await;
            models.sort();
            let metadata = registry.metadata().await;
            Ok(warp::reply::json(&serde_json::json!({
                "models": models,
                "metadata": metadata,
            }))
            .into_response())
        }
    }
}

async fn handle_model_info(
    model_name: String,
    ctx: AppContext,
) -> Result<warp::reply::Response, Infallible> {
    let path = format!("/api/v1/models/{model_name}/info");
    match &ctx.registry {
        None => Ok(error_response(
            StatusCode::NOT_FOUND,
            "Model manager not available",
            Some(&path),
        )),
        Some(registry) => {
            let metadata = registry.model_metadata(&model_name).await;
            Ok(warp::reply::json(&serde_json::json!({
                "model": model_name,
                "metadata": metadata,
            }))
            .into_response())
        }
    }
}

/// Liveness probe. Redis reachability is the gating condition; model and
/// Kafka state are reported but never fail the probe.
async fn handle_health(ctx: AppContext) -> Result<warp::reply::Response, Infallible> {
    let redis_ok = match &ctx.redis {
        Some(redis) => redis.ping().await.is_ok(),
        None => false,
    };
    if !redis_ok {
        error!("health check failed: redis unreachable");
        return Ok(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Service unhealthy",
            Some("/health"),
        ));
    }

    let (models_ok, models_loaded) = match &ctx.registry {
        Some(registry) => (registry.health_check().await, {
            let mut loaded = registry.loaded_models().await;
            loaded.sort();
            loaded
        }),
        None => (false, Vec::new()),
    };
    let kafka_ok = ctx.kafka.as_ref().map(|k| k.is_connected()).unwrap_or(false);

    Ok(warp::reply::json(&serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "services": {
            "redis": "healthy",
            "models": if models_ok { "healthy" } else { "unhealthy" },
            "kafka": if kafka_ok { "healthy" } else { "unhealthy" },
        },
        "models_loaded": models_loaded,
    }))
    .into_response())
}

/// Readiness probe. Redis is required; models and Kafka are optional and
/// only logged when missing.
async fn handle_ready(ctx: AppContext) -> Result<warp::reply::Response, Infallible> {
    if ctx.redis.is_none() {
        error!("readiness check failed: redis client not initialized");
        return Ok(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Service not ready",
            Some("/ready"),
        ));
    }
    if ctx.kafka.is_none() {
        warn!("kafka publisher not initialized, continuing (optional)");
    }
    Ok(warp::reply::json(&serde_json::json!({ "status": "ready" })).into_response())
}

async fn handle_metrics(ctx: AppContext) -> Result<warp::reply::Response, Infallible> {
    Ok(warp::reply::with_header(
        ctx.metrics.gather(),
        "content-type",
        "text/plain; version=0.0.4",
    )
    .into_response())
}

async fn handle_root() -> Result<warp::reply::Response, Infallible> {
    Ok(warp::reply::json(&serde_json::json!({
        "service": "Clinsight AI Service",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "healthy",
        "features": [
            "Patient Risk Scoring",
            "No-Show Prediction",
            "Batch Prediction",
        ],
    }))
    .into_response())
}

// =============================================================================
// Helpers
// =============================================================================

fn error_response(status: StatusCode, message: &str, path: Option<&str>) -> warp::reply::Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: status.as_u16(),
            message: message.to_string(),
            path: path.map(str::to_string),
            timestamp: Utc::now(),
        },
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

fn dispatch_outcome(err: &DispatchError) -> (StatusCode, &'static str) {
    match err {
        DispatchError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        DispatchError::InvalidInput => (StatusCode::BAD_REQUEST, "invalid_input"),
        DispatchError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "error"),
    }
}

/// Fire-and-forget publish of a successful prediction. A failed or missing
/// publisher never affects the response.
fn publish_prediction(ctx: &AppContext, key: String, payload: serde_json::Value) {
    if let Some(sink) = ctx.kafka.clone() {
        tokio::spawn(async move {
            if let Err(e) = sink.publish(&key, &payload).await {
                warn!(model = %key, error = %e, "failed to publish prediction event");
            }
        });
    }
}

/// Map rejections onto the uniform error envelope.
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Invalid request body: {e}"),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        error!(?err, "unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };
    Ok(error_response(status, &message, None))
}
