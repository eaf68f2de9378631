use std::fmt::{self, Debug};
use std::pin::Pin;
use std::sync::Arc;

use docscout_core::tool::{Tool, ToolResult};
use reqwest::{Client, header};
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

const TAVILY_BASE_URL: &str = "https://api.tavily.com";

type BoxedSearchFuture =
    Pin<Box<dyn Future<Output = Result<Value, SearchError>> + Send>>;

/// Errors of a search backend.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The request could not be sent or the response could not be read.
    #[error("search request failed: {0}")]
    Transport(String),
    /// The server answered with a non-success status.
    #[error("search API returned {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The response body.
        body: String,
    },
    /// The response is not the expected JSON.
    #[error("invalid search response: {0}")]
    Decode(String),
}

/// A web search service.
pub trait SearchBackend: Send + Sync + 'static {
    /// Searches the web, returning a JSON object with a `results` array.
    ///
    /// The returned future must be fully independent of `self`.
    fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> impl Future<Output = Result<Value, SearchError>> + Send + 'static;
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
}

/// The Tavily search API.
#[derive(Clone)]
pub struct TavilySearch {
    client: Client,
    api_key: Arc<str>,
    base_url: String,
}

impl TavilySearch {
    /// Creates a backend with the given API key.
    #[inline]
    pub fn new<S: AsRef<str>>(api_key: S) -> Self {
        Self {
            client: Client::new(),
            api_key: Arc::from(api_key.as_ref()),
            base_url: TAVILY_BASE_URL.to_owned(),
        }
    }

    /// Sets a custom base URL.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        let base_url: String = base_url.into();
        self.base_url = base_url.trim_end_matches('/').to_owned();
        self
    }

    /// Uses a preconfigured HTTP client.
    #[inline]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

impl Debug for TavilySearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TavilySearch")
            .field("api_key", &"<deducted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl SearchBackend for TavilySearch {
    fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> impl Future<Output = Result<Value, SearchError>> + Send + 'static {
        let req_fut = self
            .client
            .post(format!("{}/search", self.base_url))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&TavilyRequest { query, max_results })
            .send();

        async move {
            let resp = req_fut
                .await
                .map_err(|err| SearchError::Transport(err.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(SearchError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            let text = resp
                .text()
                .await
                .map_err(|err| SearchError::Transport(err.to_string()))?;
            serde_json::from_str(&text)
                .map_err(|err| SearchError::Decode(err.to_string()))
        }
    }
}

#[derive(Deserialize, JsonSchema)]
pub struct SearchParameters {
    #[schemars(description = "The search query.")]
    query: String,
}

/// A tool for general web search.
pub struct SearchTool<B> {
    backend: B,
    max_results: usize,
    parameter_schema: Value,
}

impl<B: SearchBackend> SearchTool<B> {
    /// Creates a search tool returning at most `max_results` results.
    #[inline]
    pub fn new(backend: B, max_results: usize) -> Self {
        SearchTool {
            backend,
            max_results,
            parameter_schema: schema_for!(SearchParameters).to_value(),
        }
    }
}

impl<B: SearchBackend> Tool for SearchTool<B> {
    type Input = SearchParameters;

    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        r#"
Searches the web for general results.
Useful for current events or knowledge the workspace does not cover."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: SearchParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        // The future type still names the borrow of `input.query`.
        let search_fut: BoxedSearchFuture =
            Box::pin(self.backend.search(&input.query, self.max_results));
        let max_results = self.max_results;
        async move {
            match search_fut.await {
                Ok(mut result) => {
                    if let Some(results) = result
                        .get_mut("results")
                        .and_then(Value::as_array_mut)
                    {
                        results.truncate(max_results);
                    }
                    Ok(result)
                }
                Err(err) => {
                    warn!("search failed: {err}");
                    Ok(json!({
                        "error": err.to_string(),
                        "query": input.query,
                        "results": [],
                    }))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::ready;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    struct FakeSearch(Result<Value, ()>);

    impl SearchBackend for FakeSearch {
        fn search(
            &self,
            query: &str,
            _max_results: usize,
        ) -> impl Future<Output = Result<Value, SearchError>> + Send + 'static
        {
            let result = match &self.0 {
                Ok(value) => {
                    let mut value = value.clone();
                    value["query"] = json!(query);
                    Ok(value)
                }
                Err(()) => Err(SearchError::Status {
                    status: 401,
                    body: "unauthorized".to_owned(),
                }),
            };
            ready(result)
        }
    }

    fn search_input(query: &str) -> SearchParameters {
        SearchParameters {
            query: query.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_results_are_bounded() {
        let results: Vec<_> = (0..5)
            .map(|idx| json!({ "title": format!("result {idx}") }))
            .collect();
        let tool = SearchTool::new(FakeSearch(Ok(json!({ "results": results }))), 3);

        let result = tool.execute(search_input("rust")).await.unwrap();
        assert_eq!(result["query"], "rust");
        assert_eq!(result["results"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_backend_error_payload() {
        let tool = SearchTool::new(FakeSearch(Err(())), 10);

        let result = tool.execute(search_input("rust")).await.unwrap();
        assert_eq!(
            result["error"],
            "search API returned 401: unauthorized"
        );
        assert_eq!(result["query"], "rust");
        assert_eq!(result["results"], json!([]));
    }

    #[tokio::test]
    async fn test_execute_outlives_tool() {
        let tool = SearchTool::new(FakeSearch(Err(())), 10);
        let fut = tool.execute(search_input("detached"));
        drop(tool);

        let result = tokio::spawn(fut).await.unwrap().unwrap();
        assert_eq!(result["query"], "detached");
    }

    #[tokio::test]
    async fn test_tavily_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0; 1024];
            // The body is the last part of the request, read until it is
            // complete.
            while !String::from_utf8_lossy(&request).contains("\"max_results\":2}") {
                let n = socket.read(&mut buf).await.unwrap();
                assert_ne!(n, 0, "connection closed early");
                request.extend_from_slice(&buf[..n]);
            }
            let body = r#"{"query":"rust","results":[{"title":"Rust","url":"https://www.rust-lang.org"}]}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8(request).unwrap()
        });

        let client = Client::builder().no_proxy().build().unwrap();
        let backend = TavilySearch::new("tvly-secret")
            .with_base_url(format!("http://{addr}/"))
            .with_client(client);
        let result = backend.search("rust", 2).await.unwrap();
        assert_eq!(result["results"][0]["title"], "Rust");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /search HTTP/1.1"));
        assert!(
            request
                .to_ascii_lowercase()
                .contains("authorization: bearer tvly-secret")
        );
        assert!(request.contains(r#"{"query":"rust","max_results":2}"#));
    }
}
