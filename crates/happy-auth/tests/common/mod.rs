//! Scripted relay for driving the auth flows without a network.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use happy_auth::{AuthError, HttpClient, HttpRequest, HttpResponse, Method};
use serde_json::Value;

type Handler = Box<dyn FnMut(&HttpRequest) -> HttpResponse + Send>;

pub struct MockRelay {
    handler: Mutex<Handler>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockRelay {
    pub fn new(handler: impl FnMut(&HttpRequest) -> HttpResponse + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Mutex::new(Box::new(handler)),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn posts_to(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == Method::Post && r.path == path)
            .count()
    }
}

#[async_trait]
impl HttpClient for MockRelay {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AuthError> {
        self.requests.lock().unwrap().push(request.clone());
        let response = (self.handler.lock().unwrap())(&request);
        Ok(response)
    }
}

pub fn json(status: u16, value: Value) -> HttpResponse {
    HttpResponse {
        status,
        body: serde_json::to_vec(&value).unwrap(),
    }
}

pub fn body(request: &HttpRequest) -> Value {
    serde_json::from_slice(request.body.as_deref().unwrap()).unwrap()
}

pub fn body_field(request: &HttpRequest, field: &str) -> String {
    body(request)[field].as_str().unwrap().to_string()
}
