use anyhow::Result;
use bytes::Bytes;
use http::{Request, Response, StatusCode};
use tracing::{error, warn};

use body::{FromBody, IntoBody, Json};

pub mod body;

/// Error carried by a request handler when the pipeline is unusable, e.g.
/// the predictor failed to load at startup.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct Unavailable {
    pub kind: &'static str,
    pub message: String,
}

// Request handling helpers

/// Decode the body, call `handler` and encode its response. Body decoding
/// failures answer 400, handler failures 500.
pub fn run<I, O, F>(req: Request<Bytes>, handler: F) -> Response<Bytes>
where
    F: FnOnce(Request<I>) -> Result<Response<O>>,
    I: FromBody,
    O: IntoBody,
{
    let (parts, body) = req.into_parts();
    let body = match I::from_data(body) {
        Ok(body) => body,
        Err(err) => {
            warn!("Errored during body parsing: {err}");
            return json_error_response(StatusCode::BAD_REQUEST, "bad_request", &err);
        }
    };
    let req = Request::from_parts(parts, body);

    let res = match handler(req) {
        Ok(res) => res,
        Err(err) => {
            error!("Errored during request handling: {err}");
            return json_error_response(StatusCode::INTERNAL_SERVER_ERROR, error_kind(&err), &err);
        }
    };

    let (mut parts, data) = res.into_parts();
    data.extend_response_parts(&mut parts);
    match data.into_body() {
        Ok(body) => Response::from_parts(parts, body),
        Err(err) => json_error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", &err),
    }
}

fn error_kind(err: &anyhow::Error) -> &'static str {
    if let Some(err) = err.downcast_ref::<crate::Error>() {
        err.kind()
    } else if let Some(err) = err.downcast_ref::<Unavailable>() {
        err.kind
    } else {
        "internal"
    }
}

#[derive(serde::Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(serde::Serialize)]
struct ErrorDetail<'a> {
    kind: &'a str,
    message: String,
}

/// `{"error": {"kind": .., "message": ..}}`; no backtraces cross this boundary.
pub fn json_error_response(
    status_code: StatusCode,
    kind: &str,
    err: &dyn std::fmt::Display,
) -> Response<Bytes> {
    let body = Json(ErrorBody {
        error: ErrorDetail {
            kind,
            message: err.to_string(),
        },
    });

    let (mut parts, ()) = Response::new(()).into_parts();
    parts.status = status_code;
    body.extend_response_parts(&mut parts);
    Response::from_parts(parts, body.into_body().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(body: &'static str) -> Request<Bytes> {
        Request::new(Bytes::from_static(body.as_bytes()))
    }

    fn error_body(res: &Response<Bytes>) -> serde_json::Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    #[test]
    fn test_run_success() {
        let res = run(request(r#"{"n":2}"#), |req: Request<Json<serde_json::Value>>| {
            let Json(value) = req.into_body();
            Ok(Response::new(Json(value["n"].as_i64().unwrap_or(0) * 2)))
        });
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(&res.body()[..], b"4");
    }

    #[test]
    fn test_run_bad_body() {
        let res = run(request("{"), |_: Request<Json<serde_json::Value>>| {
            Ok(Response::new(Json(())))
        });
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_body(&res)["error"]["kind"], "bad_request");
    }

    #[test]
    fn test_run_handler_error_kind() {
        let res = run(request(""), |_: Request<()>| -> Result<Response<Json<()>>> {
            Err(crate::Error::NotFitted.into())
        });
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = error_body(&res);
        assert_eq!(body["error"]["kind"], "not_fitted");
        assert_eq!(body["error"]["message"], "Feature extractor is not fitted");

        let res = run(request(""), |_: Request<()>| -> Result<Response<Json<()>>> {
            anyhow::bail!("boom")
        });
        assert_eq!(error_body(&res)["error"]["kind"], "internal");
    }
}
