use anyhow::Result;
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use tracing::error;

use crate::helpers::body::Json;
use crate::helpers::{self, Unavailable};
use crate::predictor::{PredictionResult, Predictor};
use crate::Settings;

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(try_from = "RawInput")]
pub struct Input {
    pub text: String,
}

#[derive(serde::Deserialize)]
struct RawInput {
    text: String,
}

impl TryFrom<RawInput> for Input {
    type Error = String;

    fn try_from(raw: RawInput) -> std::result::Result<Self, Self::Error> {
        if raw.text.trim().is_empty() {
            return Err("field `text` must not be empty".to_string());
        }
        Ok(Self { text: raw.text })
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Health {
    pub ready: bool,
    pub threshold: f64,
    pub error: Option<String>,
}

pub fn handle(
    req: Request<Json<Input>>,
    predictor: &Predictor,
) -> Result<Response<Json<PredictionResult>>> {
    let Json(Input { ref text }) = req.body();
    let result = predictor.predict(text)?;

    Response::builder()
        .status(200)
        .body(Json(result))
        .map_err(Into::into)
}

/// JSON error body for failures raised outside [`Service::route`], such as
/// an oversized request rejected by the transport.
pub fn error_response(
    status: StatusCode,
    kind: &str,
    err: &dyn std::fmt::Display,
) -> Response<Bytes> {
    helpers::json_error_response(status, kind, err)
}

/// Routes requests to a predictor loaded once at startup. A failed load is
/// kept and reported on every request instead of aborting the process.
#[derive(Debug)]
pub struct Service {
    predictor: std::result::Result<Predictor, Unavailable>,
    threshold: f64,
}

impl Service {
    pub fn new(predictor: Predictor) -> Self {
        let threshold = predictor.threshold();
        Self {
            predictor: Ok(predictor),
            threshold,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let predictor = Predictor::new(settings.spam_threshold, &settings.artifact_paths())
            .map_err(|err| {
                error!(kind = err.kind(), "predictor unavailable: {err}");
                Unavailable {
                    kind: err.kind(),
                    message: err.to_string(),
                }
            });
        Self {
            predictor,
            threshold: settings.spam_threshold,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.predictor.is_ok()
    }

    pub fn health(&self) -> Health {
        Health {
            ready: self.is_ready(),
            threshold: self.threshold,
            error: self.predictor.as_ref().err().map(|err| err.message.clone()),
        }
    }

    pub fn route(&self, req: Request<Bytes>) -> Response<Bytes> {
        match (req.method(), req.uri().path()) {
            (&Method::POST, "/predict") => helpers::run(req, |req| match &self.predictor {
                Ok(predictor) => handle(req, predictor),
                Err(err) => Err(err.clone().into()),
            }),
            (&Method::GET, "/health") => helpers::run(req, |_: Request<()>| {
                Response::builder()
                    .status(200)
                    .body(Json(self.health()))
                    .map_err(Into::into)
            }),
            (method, path) => error_response(
                StatusCode::NOT_FOUND,
                "not_found",
                &format!("no route for {method} {path}"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::tests::constant_predictor;
    use pretty_assertions::assert_eq;

    fn request(method: &str, uri: &str, body: &'static str) -> Request<Bytes> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap()
    }

    fn json(res: &Response<Bytes>) -> serde_json::Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    fn unavailable_service() -> Service {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            models_dir: dir.path().join("missing"),
            ..Settings::default()
        };
        Service::from_settings(&settings)
    }

    #[test]
    fn test_handle_function() {
        let predictor = constant_predictor(0.85, 0.7);
        let req = Request::builder()
            .method("POST")
            .uri("/predict")
            .body(Json(Input {
                text: "Claim your free prize now".to_string(),
            }))
            .unwrap();

        let res = handle(req, &predictor).unwrap();
        assert_eq!(res.status(), 200);

        let Json(output) = res.body();
        assert!(output.is_spam);
        assert!((output.spam_probability - 0.85).abs() < 1e-9);
        assert_eq!(output.threshold, 0.7);
    }

    #[test]
    fn test_predict_route() {
        let service = Service::new(constant_predictor(0.6999, 0.7));
        let res = service.route(request("POST", "/predict", r#"{"text":"see you monday"}"#));

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = json(&res);
        assert_eq!(body["is_spam"], false);
        assert_eq!(body["threshold"], 0.7);
    }

    #[test]
    fn test_bad_requests() {
        let service = Service::new(constant_predictor(0.5, 0.7));
        for body in [r#"{}"#, r#"{"text":42}"#, r#"{"text":"   "}"#, "not json"] {
            let res = service.route(request("POST", "/predict", body));
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "body: {body}");
            assert_eq!(json(&res)["error"]["kind"], "bad_request");
        }
    }

    #[test]
    fn test_unavailable_predictor() {
        let service = unavailable_service();
        assert!(!service.is_ready());

        let res = service.route(request("POST", "/predict", r#"{"text":"hello"}"#));
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json(&res);
        assert_eq!(body["error"]["kind"], "artifact_missing");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("vectorizer.bin"));
    }

    #[test]
    fn test_health() {
        let service = Service::new(constant_predictor(0.5, 0.8));
        let res = service.route(request("GET", "/health", ""));
        assert_eq!(res.status(), StatusCode::OK);
        let health: Health = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(
            health,
            Health {
                ready: true,
                threshold: 0.8,
                error: None,
            }
        );

        let health = unavailable_service().health();
        assert!(!health.ready);
        assert_eq!(health.threshold, 0.7);
        assert!(health.error.is_some());
    }

    #[test]
    fn test_unknown_route() {
        let service = Service::new(constant_predictor(0.5, 0.7));
        for (method, uri) in [("GET", "/predict"), ("POST", "/score"), ("GET", "/")] {
            let res = service.route(request(method, uri, ""));
            assert_eq!(res.status(), StatusCode::NOT_FOUND);
            assert_eq!(json(&res)["error"]["kind"], "not_found");
        }
    }

    #[test]
    fn test_transport_errors_share_the_json_shape() {
        let res = error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            &"length limit exceeded",
        );
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            res.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(
            json(&res),
            serde_json::json!({
                "error": {"kind": "payload_too_large", "message": "length limit exceeded"}
            })
        );
    }
}
