//! HTTP transport used by the analysis backends
//!
//! Backends talk to the network only through [`Transport`], which keeps the
//! request/response shaping in each client testable without a server.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single HTTP exchange
#[derive(Error, Debug)]
pub enum TransportError {
    /// Server answered with a non-success status
    #[error("Server returned {0}: {1}")]
    Status(u16, String),

    /// Connection, DNS, TLS or timeout failure
    #[error("Request failed: {0}")]
    Network(String),

    /// Body was not the JSON we expected
    #[error("Failed to parse response: {0}")]
    Decode(String),
}

/// Blocking HTTP operations needed by the backends
pub trait Transport: Send + Sync {
    /// POST a JSON body and decode a JSON response
    fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, TransportError>;

    /// POST an `application/x-www-form-urlencoded` body and decode a JSON response
    fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Value, TransportError>;

    /// GET a URL, succeeding on any 2xx status
    fn get(&self, url: &str, timeout: Duration) -> Result<(), TransportError>;
}

/// Production transport backed by ureq
#[derive(Debug, Default, Clone, Copy)]
pub struct UreqTransport;

impl UreqTransport {
    pub fn new() -> Self {
        Self
    }
}

fn map_error(e: ureq::Error) -> TransportError {
    match e {
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            TransportError::Status(code, body)
        }
        ureq::Error::Transport(t) => TransportError::Network(t.to_string()),
    }
}

fn decode(response: ureq::Response) -> Result<Value, TransportError> {
    response
        .into_json::<Value>()
        .map_err(|e| TransportError::Decode(e.to_string()))
}

impl Transport for UreqTransport {
    fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let mut request = ureq::post(url).timeout(timeout);
        for (name, value) in headers {
            request = request.set(name, value);
        }

        let response = request.send_json(body).map_err(map_error)?;
        decode(response)
    }

    fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let response = ureq::post(url)
            .timeout(timeout)
            .send_form(form)
            .map_err(map_error)?;
        decode(response)
    }

    fn get(&self, url: &str, timeout: Duration) -> Result<(), TransportError> {
        ureq::get(url).timeout(timeout).call().map_err(map_error)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted transport for backend tests

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// One recorded request
    #[derive(Debug, Clone)]
    pub struct Call {
        pub method: &'static str,
        pub url: String,
        pub headers: Vec<(String, String)>,
        pub body: Option<Value>,
        pub form: Vec<(String, String)>,
        pub timeout: Duration,
        /// Output of the snapshot hook at the moment the call was made
        pub snapshot: Option<String>,
    }

    /// Replays queued responses in order and records every call
    #[derive(Default)]
    pub struct MockTransport {
        responses: Mutex<VecDeque<Result<Value, TransportError>>>,
        calls: Mutex<Vec<Call>>,
        snapshot: Option<Box<dyn Fn() -> String + Send + Sync>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Record the output of `hook` with every call
        pub fn with_snapshot(mut self, hook: impl Fn() -> String + Send + Sync + 'static) -> Self {
            self.snapshot = Some(Box::new(hook));
            self
        }

        pub fn push(&self, response: Result<Value, TransportError>) {
            self.responses.lock().unwrap().push_back(response);
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(
            &self,
            method: &'static str,
            url: &str,
            headers: &[(&str, &str)],
            body: Option<&Value>,
            form: &[(&str, &str)],
            timeout: Duration,
        ) -> Result<Value, TransportError> {
            fn owned(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            }
            self.calls.lock().unwrap().push(Call {
                method,
                url: url.to_string(),
                headers: owned(headers),
                body: body.cloned(),
                form: owned(form),
                timeout,
                snapshot: self.snapshot.as_ref().map(|hook| hook()),
            });
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Network("no scripted response".into())))
        }
    }

    impl Transport for MockTransport {
        fn post_json(
            &self,
            url: &str,
            headers: &[(&str, &str)],
            body: &Value,
            timeout: Duration,
        ) -> Result<Value, TransportError> {
            self.record("POST", url, headers, Some(body), &[], timeout)
        }

        fn post_form(
            &self,
            url: &str,
            form: &[(&str, &str)],
            timeout: Duration,
        ) -> Result<Value, TransportError> {
            self.record("POST", url, &[], None, form, timeout)
        }

        fn get(&self, url: &str, timeout: Duration) -> Result<(), TransportError> {
            self.record("GET", url, &[], None, &[], timeout).map(|_| ())
        }
    }
}
