use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ContentStubConfig {
    pub toc_body: String,
    /// Number of initial TOC requests answered with 503.
    pub toc_failures: usize,
    pub page_status: u16,
}

impl ContentStubConfig {
    pub fn with_toc(toc_body: impl Into<String>) -> Self {
        Self {
            toc_body: toc_body.into(),
            toc_failures: 0,
            page_status: 200,
        }
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
    pub authorization: Option<String>,
}

pub struct ContentStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ContentStub {
    pub fn spawn(config: ContentStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start content stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/api");

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let toc_failures = AtomicUsize::new(config.toc_failures);

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let path = request.url().to_string();
                let method = request.method().to_string();
                let authorization = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Authorization"))
                    .map(|h| h.value.as_str().to_owned());
                recorded.lock().expect("requests lock").push(RecordedRequest {
                    method: method.clone(),
                    path: path.clone(),
                    body: body.clone(),
                    authorization,
                });

                let (status, response_body) = if method == "GET"
                    && path.starts_with("/api/books/")
                    && path.ends_with("/generate-pages")
                {
                    let remaining = toc_failures.load(Ordering::SeqCst);
                    if remaining > 0 {
                        toc_failures.store(remaining - 1, Ordering::SeqCst);
                        (503, "temporarily unavailable".to_owned())
                    } else {
                        (200, config.toc_body.clone())
                    }
                } else if method == "POST" && path.starts_with("/api/books/") && path.ends_with("/page")
                {
                    if config.page_status != 200 {
                        (config.page_status, "page unavailable".to_owned())
                    } else {
                        match page_response(&body) {
                            Some(text) => (200, text),
                            None => (400, "missing params.page".to_owned()),
                        }
                    }
                } else {
                    (404, "not found".to_owned())
                };

                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                let response = tiny_http::Response::from_string(response_body)
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.requests().iter().filter(|r| r.method == method).count()
    }
}

impl Drop for ContentStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn page_response(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let page = parsed.pointer("/params/page")?.as_u64()?;
    let doc = serde_json::json!({
        "time": 1700000000000_i64,
        "version": "2.28.0",
        "blocks": [
            { "id": "h1", "type": "header", "data": { "text": format!("Heading {page}"), "level": 2 } },
            { "type": "paragraph", "data": { "text": format!("page {page}") } }
        ]
    });
    Some(doc.to_string())
}
