use anyhow::{bail, Result};
use bytes::{BufMut, Bytes, BytesMut};
use http::header::{HeaderValue, CONTENT_TYPE};

const APPLICATION_JSON: &str = "application/json";

pub trait FromBody: Sized {
    fn from_data(data: Bytes) -> Result<Self>;
}

pub trait IntoBody: Sized {
    fn into_body(self) -> Result<Bytes>;

    #[allow(unused_variables)]
    fn extend_response_parts(&self, parts: &mut http::response::Parts) {}
}

/// Handlers that ignore the request body.
impl FromBody for () {
    fn from_data(_: Bytes) -> Result<Self> {
        Ok(())
    }
}

/// JSON request or response payload.
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

impl<T: serde::de::DeserializeOwned> FromBody for Json<T> {
    fn from_data(bytes: Bytes) -> Result<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            bail!("request body is empty, expected a JSON object");
        }
        let data = serde_json::from_slice(&bytes)?;
        Ok(Self(data))
    }
}

impl<T: serde::Serialize> IntoBody for Json<T> {
    fn into_body(self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(96).writer();
        serde_json::to_writer(&mut buf, &self.0)?;
        Ok(buf.into_inner().freeze())
    }

    fn extend_response_parts(&self, parts: &mut http::response::Parts) {
        parts
            .headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(APPLICATION_JSON));
    }
}
