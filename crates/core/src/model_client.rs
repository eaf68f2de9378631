use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use docscout_model::{
    AssistantMessage, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent, ToolCallRequest,
};
use tracing::Instrument;

type DeltaFn = Arc<dyn Fn(String) + Send + Sync + 'static>;
type SendRequestResult =
    Result<ModelClientResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(ModelRequest, DeltaFn) -> BoxedSendRequestFuture + Send + Sync
>;

/// Controls how transient provider errors are retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Upper bound of the delay between two attempts.
    pub max_interval: Duration,
    /// Gives up once this much time has passed since the first attempt.
    pub max_elapsed_time: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const NEVER: Self = Self {
        max_attempts: 1,
        initial_interval: Duration::ZERO,
        max_interval: Duration::ZERO,
        max_elapsed_time: Duration::ZERO,
    };
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(8),
            max_elapsed_time: Duration::from_secs(60),
        }
    }
}

/// A wrapper around a model provider that maintains an execution
/// environment for the provider and provides a type-erased interface
/// for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
    retry_policy: RetryPolicy,
}

impl ModelClient {
    /// Wraps a provider with the default retry policy.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req, on_delta| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err, on_delta).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self {
            handler_fn,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy.
    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Sends a request and returns the response.
    ///
    /// Transient errors are retried according to the retry policy, the
    /// last error is returned once the policy gives up.
    ///
    /// Text deltas of every attempt are forwarded to `on_delta` as they
    /// arrive. When an attempt fails after streaming some text, the retry
    /// streams its text from the start again, while the returned
    /// transcript only holds the successful attempt.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    pub async fn send_request(
        &self,
        req: ModelRequest,
        on_delta: impl Fn(String) + Send + Sync + 'static,
    ) -> Result<ModelClientResponse, Box<dyn ModelProviderError>> {
        let on_delta: DeltaFn = Arc::new(on_delta);
        let policy = self.retry_policy;
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(policy.initial_interval)
            .with_max_interval(policy.max_interval)
            .with_max_elapsed_time(Some(policy.max_elapsed_time))
            .build();

        let mut attempts = 0;
        backoff::future::retry(backoff, || {
            attempts += 1;
            let is_last_attempt = attempts >= policy.max_attempts;
            let fut = (self.handler_fn)(req.clone(), Arc::clone(&on_delta));
            async move {
                fut.await.map_err(|err| {
                    if err.kind().is_transient() && !is_last_attempt {
                        warn!("transient model error, retrying: {err}");
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        })
        .await
    }
}

/// A completely received response from the model client.
#[derive(Clone, Debug)]
pub struct ModelClientResponse {
    /// The text content of the response.
    pub transcript: String,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCallRequest>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
}

impl ModelClientResponse {
    /// Converts the response into an assistant message for the history.
    #[inline]
    pub fn into_message(self) -> AssistantMessage {
        AssistantMessage {
            content: self.transcript,
            tool_calls: self.tool_calls,
        }
    }
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    on_delta: DeltaFn,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };

    let mut transcript = String::new();
    let mut tool_calls = Vec::new();
    let mut finish_reason = None;

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Box::new(err));
            }
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(msg) => {
                transcript.push_str(&msg);
                on_delta(msg);
            }
            ModelResponseEvent::ToolCall(req) => {
                tool_calls.push(req);
            }
            ModelResponseEvent::Completed(reason) => {
                finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request");

    Ok(ModelClientResponse {
        transcript,
        tool_calls,
        finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::future::ready;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::task::{Context, Poll};

    use docscout_model::{ErrorKind, ModelMessage};
    use docscout_test_model::{
        PresetEvent, PresetResponse, TestModelProvider,
    };

    use super::*;

    fn user_request() -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let model_provider = TestModelProvider::default();
        for _ in 0..3 {
            model_provider.add_response(PresetResponse::with_events([
                PresetEvent::MessageDelta("How ".to_owned()),
                PresetEvent::MessageDelta("are ".to_owned()),
                PresetEvent::MessageDelta("you?".to_owned()),
            ]));
        }

        let model_client = ModelClient::new(model_provider);

        for _ in 0..3 {
            let on_delta_called = Arc::new(AtomicBool::new(false));
            let resp = model_client
                .send_request(user_request(), {
                    let on_delta_called = Arc::clone(&on_delta_called);
                    move |_| {
                        on_delta_called.store(true, Ordering::Relaxed);
                    }
                })
                .await
                .unwrap();
            assert_eq!(resp.transcript, "How are you?");
            assert_eq!(resp.finish_reason, Some(ModelFinishReason::Stop));
            assert!(resp.tool_calls.is_empty());
            assert!(on_delta_called.load(Ordering::Relaxed));
        }
    }

    #[tokio::test]
    async fn test_error_handling() {
        let model_provider = TestModelProvider::default();
        let model_client = ModelClient::new(model_provider.clone());
        let err = model_client
            .send_request(user_request(), |_| {})
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Other);
        // Non-transient errors are not retried.
        assert_eq!(model_provider.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_transient_errors() {
        let model_provider = TestModelProvider::default();
        model_provider.add_response(PresetResponse::text("ok").with_failures(2));
        let model_client = ModelClient::new(model_provider.clone());

        let resp = model_client
            .send_request(user_request(), |_| {})
            .await
            .unwrap();
        assert_eq!(resp.transcript, "ok");
        assert_eq!(model_provider.requests().len(), 3);
    }

    #[derive(Debug)]
    struct StreamDropped;

    impl std::fmt::Display for StreamDropped {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "stream dropped")
        }
    }

    impl std::error::Error for StreamDropped {}

    impl ModelProviderError for StreamDropped {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Transport
        }
    }

    type ScriptedEvent = Result<ModelResponseEvent, StreamDropped>;

    struct ScriptedResponse(VecDeque<ScriptedEvent>);

    impl ModelResponse for ScriptedResponse {
        type Error = StreamDropped;

        fn poll_next_event(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
            Poll::Ready(self.get_mut().0.pop_front().transpose())
        }
    }

    /// Drops the first stream after one delta.
    #[derive(Default)]
    struct DroppingProvider(AtomicUsize);

    impl ModelProvider for DroppingProvider {
        type Error = StreamDropped;
        type Response = ScriptedResponse;

        fn send_request(
            &self,
            _req: &ModelRequest,
        ) -> impl Future<Output = Result<Self::Response, Self::Error>>
        + Send
        + 'static {
            let attempt = self.0.fetch_add(1, Ordering::Relaxed);
            let mut events: VecDeque<ScriptedEvent> =
                VecDeque::from([Ok(ModelResponseEvent::MessageDelta(
                    "Hel".to_owned(),
                ))]);
            if attempt == 0 {
                events.push_back(Err(StreamDropped));
            } else {
                events.push_back(Ok(ModelResponseEvent::MessageDelta(
                    "lo".to_owned(),
                )));
                events.push_back(Ok(ModelResponseEvent::Completed(
                    ModelFinishReason::Stop,
                )));
            }
            ready(Ok(ScriptedResponse(events)))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_partial_stream() {
        let model_client = ModelClient::new(DroppingProvider::default());
        let deltas = Arc::new(Mutex::new(vec![]));

        let resp = model_client
            .send_request(user_request(), {
                let deltas = Arc::clone(&deltas);
                move |delta| deltas.lock().unwrap().push(delta)
            })
            .await
            .unwrap();
        assert_eq!(resp.transcript, "Hello");
        // The failed attempt has already been streamed.
        assert_eq!(*deltas.lock().unwrap(), ["Hel", "Hel", "lo"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up() {
        let model_provider = TestModelProvider::default();
        model_provider.add_response(PresetResponse::text("ok").with_failures(0));
        let model_client = ModelClient::new(model_provider.clone())
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                ..Default::default()
            });

        let err = model_client
            .send_request(user_request(), |_| {})
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert_eq!(model_provider.requests().len(), 3);
    }
}
