use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

/// Canned reply for one request.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub location: Option<String>,
    pub content_type: &'static str,
}

#[allow(dead_code)]
impl Reply {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            location: None,
            content_type: "text/plain",
        }
    }

    pub fn json(body: String) -> Self {
        Self {
            status: 200,
            body,
            location: None,
            content_type: "application/json",
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            location: Some(location.to_owned()),
            ..Self::status(302)
        }
    }
}

/// One request the stub saw.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: String,
    pub url: String,
    pub body: String,
}

type Router = dyn Fn(&tiny_http::Method, &str, &str) -> Reply + Send + Sync;

/// Local HTTP server answering from a routing closure.
pub struct HttpStub {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Seen>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

#[allow(dead_code)]
impl HttpStub {
    pub fn spawn(
        router: impl Fn(&tiny_http::Method, &str, &str) -> Reply + Send + Sync + 'static,
    ) -> Self {
        let router: Arc<Router> = Arc::new(router);
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start stub server");
        let base_url = format!("http://{}", server.server_addr());
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread_hits = Arc::clone(&hits);
        let thread_seen = Arc::clone(&seen);
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
                thread_hits.fetch_add(1, Ordering::SeqCst);

                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let method = request.method().clone();
                let url = request.url().to_owned();
                thread_seen.lock().expect("seen lock").push(Seen {
                    method: method.to_string(),
                    url: url.clone(),
                    body: body.clone(),
                });

                let reply = router(&method, &url, &body);
                let mut response =
                    tiny_http::Response::from_string(reply.body).with_status_code(reply.status);
                let header = tiny_http::Header::from_bytes(
                    &b"Content-Type"[..],
                    reply.content_type.as_bytes(),
                )
                .expect("build content-type header");
                response = response.with_header(header);
                if let Some(location) = reply.location {
                    let header =
                        tiny_http::Header::from_bytes(&b"Location"[..], location.as_bytes())
                            .expect("build location header");
                    response = response.with_header(header);
                }
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            hits,
            seen,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().expect("seen lock").clone()
    }
}

impl Drop for HttpStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Responses API body wrapping `text` as a single message.
#[allow(dead_code)]
pub fn responses_body(text: &str) -> String {
    serde_json::json!({
        "id": "resp_stub",
        "object": "response",
        "output": [
            {
                "type": "message",
                "role": "assistant",
                "content": [ { "type": "output_text", "text": text } ]
            }
        ]
    })
    .to_string()
}
