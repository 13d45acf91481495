use crate::{context::Clock, Error};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::{rc::Rc, time::Duration};
use tracing::warn;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Path relative to the API base URL, including any query string
    pub path: String,
    /// JSON body
    pub body: Option<String>,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Request {
        Request {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Option<String>) -> Request {
        Request {
            method: Method::Post,
            path: path.into(),
            body,
        }
    }

    pub fn delete(path: impl Into<String>) -> Request {
        Request {
            method: Method::Delete,
            path: path.into(),
            body: None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport to the remote API.
///
/// Implementations attach the session credentials (browser-managed
/// cookies) to every request. Only a request that never produced a
/// response is an error; every HTTP status comes back as a [`Response`].
#[async_trait(?Send)]
pub trait Gateway {
    async fn send(&self, request: Request) -> Result<Response, Error>;
}

/// Bounded retry for GET requests. Only transient failures are retried and
/// the wait grows linearly with the attempt number.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> RetryPolicy {
        RetryPolicy {
            attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    pub fn bounded(attempts: u32, backoff: Duration) -> RetryPolicy {
        RetryPolicy {
            attempts: attempts.max(1),
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::none()
    }
}

pub struct FetchClient {
    gateway: Rc<dyn Gateway>,
    clock: Rc<dyn Clock>,
    retry: RetryPolicy,
}

impl FetchClient {
    pub fn new(gateway: Rc<dyn Gateway>, clock: Rc<dyn Clock>, retry: RetryPolicy) -> FetchClient {
        FetchClient {
            gateway,
            clock,
            retry,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let mut attempt = 1;
        loop {
            match self.send(Request::get(path)).await {
                Err(e) if attempt < self.retry.attempts && e.is_transient() => {
                    warn!(path, attempt, error = %e, "GET failed, retrying");
                    self.clock.sleep(self.retry.backoff * attempt).await;
                    attempt += 1;
                }
                result => return parse(&result?),
            }
        }
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_string(body)?;
        parse(&self.send(Request::post(path, Some(body))).await?)
    }

    /// POST without a body.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        parse(&self.send(Request::post(path, None)).await?)
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        parse(&self.send(Request::delete(path)).await?)
    }

    /// Asks the server to drop the session cookie. Never retried.
    pub async fn logout<T: DeserializeOwned>(&self) -> Result<T, Error> {
        parse(&self.send(Request::get("/logout")).await?)
    }

    /// The status is checked before the body is looked at, so a failed
    /// request always surfaces as `RequestFailed` rather than a parse error.
    async fn send(&self, request: Request) -> Result<Response, Error> {
        let method = request.method;
        let path = request.path.clone();
        let response = self.gateway.send(request).await?;
        if !response.is_success() {
            warn!(
                method = method.as_str(),
                path = %path,
                status = response.status,
                "request failed"
            );
            return Err(Error::RequestFailed {
                status: response.status,
                body: response.body,
            });
        }
        Ok(response)
    }
}

fn parse<T: DeserializeOwned>(response: &Response) -> Result<T, Error> {
    Ok(serde_json::from_str(&response.body)?)
}
