use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use docscout_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};
use pin_project_lite::pin_project;
use serde_json::Value;

use crate::Error;
use crate::io::Sse;
use crate::proto::{ChatCompletionChunk, ToolCall};

struct PartialState {
    sse: Sse,
    tool_calls: Vec<ToolCall>,
    // This field records the index of the tool calls that are generated but not
    // yet sent to the model user. A tool call is only complete once the next
    // one starts or the stream finishes, so the front entry is held back until
    // then.
    pending_tool_call_idx: VecDeque<usize>,
    // This field will be cleared after the response returns the complete event.
    pending_finish_reason: Option<ModelFinishReason>,
    finished: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    /// A streaming chat completion.
    pub struct OpenAIResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub(crate) fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            tool_calls: Default::default(),
            pending_tool_call_idx: Default::default(),
            pending_finish_reason: Default::default(),
            finished: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            // The stream has been exhausted, actually this should be an error.
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<ModelResponseEvent>, PartialState), Error> {
    let mut message_delta = None;

    while !partial_state.finished && message_delta.is_none() {
        // A tool call can be emitted as soon as a later one shows up.
        if partial_state.pending_tool_call_idx.len() > 1 {
            break;
        }

        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                partial_state.finished = true;
                break;
            }
            Err(err) => {
                return Err(Error::new(
                    format!("failed to read the stream: {err:?}"),
                    ErrorKind::Transport,
                ));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            partial_state.finished = true;
            break;
        }

        let mut chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;

        // Chunks without choices carry usage or filter results only.
        let Some(choice) = chunk.choices.pop() else {
            continue;
        };

        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                message_delta = Some(content);
            }
        }
        if let Some(tool_calls) = choice.delta.tool_calls {
            for tool_call in tool_calls {
                merge_tool_call(&mut partial_state, tool_call);
            }
        }
        if let Some(finish_reason) = choice.finish_reason {
            partial_state.pending_finish_reason =
                Some(if finish_reason == "tool_calls" {
                    ModelFinishReason::ToolCalls
                } else {
                    ModelFinishReason::Stop
                });
        }
    }

    // The order of events are important. Always emit message delta first, then
    // emit pending tool calls, and finally emit pending finish reason if any.

    if let Some(message_delta) = message_delta {
        return Ok((
            Some(ModelResponseEvent::MessageDelta(message_delta)),
            partial_state,
        ));
    }

    let can_emit_tool_call = partial_state.finished
        || partial_state.pending_tool_call_idx.len() > 1;
    if can_emit_tool_call {
        if let Some(idx) = partial_state.pending_tool_call_idx.pop_front() {
            let req = make_tool_call_request(&partial_state.tool_calls[idx]);
            return Ok((Some(ModelResponseEvent::ToolCall(req)), partial_state));
        }
    }

    if let Some(finish_reason) = partial_state.pending_finish_reason.take() {
        return Ok((
            Some(ModelResponseEvent::Completed(finish_reason)),
            partial_state,
        ));
    }

    Ok((None, partial_state))
}

fn merge_tool_call(partial_state: &mut PartialState, tool_call: ToolCall) {
    let Some(partial_tool_call) = partial_state
        .tool_calls
        .iter_mut()
        .find(|t| t.index == tool_call.index)
    else {
        partial_state
            .pending_tool_call_idx
            .push_back(partial_state.tool_calls.len());
        partial_state.tool_calls.push(tool_call);
        return;
    };

    // Patch the partial tool call.
    if let Some(id) = tool_call.id {
        partial_tool_call.id.get_or_insert_default().push_str(&id);
    }
    if let Some(ty) = tool_call.r#type {
        partial_tool_call.r#type.get_or_insert_default().push_str(&ty);
    }
    if let Some(function) = tool_call.function {
        match partial_tool_call.function {
            Some(ref mut partial_func) => {
                if let Some(name) = function.name {
                    partial_func.name.get_or_insert_default().push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    partial_func
                        .arguments
                        .get_or_insert_default()
                        .push_str(&arguments);
                }
            }
            None => partial_tool_call.function = Some(function),
        }
    }
}

fn make_tool_call_request(tool_call: &ToolCall) -> ToolCallRequest {
    let id = tool_call.id.clone().unwrap_or_default();
    let name = tool_call
        .function
        .as_ref()
        .and_then(|f| f.name.clone())
        .unwrap_or_default();
    let raw_arguments = tool_call
        .function
        .as_ref()
        .and_then(|f| f.arguments.as_deref())
        .unwrap_or_default();
    // Arguments that are not valid JSON are passed through as a string, the
    // tool then reports them as invalid input.
    let arguments = if raw_arguments.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str::<Value>(raw_arguments)
            .unwrap_or_else(|_| Value::String(raw_arguments.to_owned()))
    };
    ToolCallRequest {
        id,
        name,
        arguments,
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::io::Chunks;

    async fn collect_events(chunks: Vec<Bytes>) -> Vec<ModelResponseEvent> {
        let sse = Sse::new(Chunks::from_vec_deque(chunks.into()));
        let mut resp = pin!(OpenAIResponse::from_sse(sse));
        let mut events = vec![];
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await.unwrap()
        {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_tool_call_events() {
        let events = collect_events(vec![Bytes::from_static(include_bytes!(
            "../fixtures/test_response.txt"
        ))])
        .await;

        assert_eq!(
            events,
            [
                ModelResponseEvent::MessageDelta("Let me look ".to_owned()),
                ModelResponseEvent::MessageDelta("around.".to_owned()),
                ModelResponseEvent::ToolCall(ToolCallRequest {
                    id: "call_a1".to_owned(),
                    name: "find_directory".to_owned(),
                    arguments: json!({ "keyword": "exam" }),
                }),
                ModelResponseEvent::ToolCall(ToolCallRequest {
                    id: "call_b2".to_owned(),
                    name: "list_directory_files".to_owned(),
                    arguments: json!({ "path": "." }),
                }),
                ModelResponseEvent::Completed(ModelFinishReason::ToolCalls),
            ]
        );
    }

    #[tokio::test]
    async fn test_text_events_in_small_chunks() {
        let body = concat!(
            "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"},\"finish_reason\":null}]}\n\n",
            "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"Hello\"},\"finish_reason\":null}]}\n\n",
            "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: {\"id\":\"c1\",\"choices\":[],\"usage\":{\"total_tokens\":3}}\n\n",
            "data: [DONE]\n\n",
        );
        let chunks = body
            .as_bytes()
            .chunks(7)
            .map(Bytes::copy_from_slice)
            .collect();

        let events = collect_events(chunks).await;
        assert_eq!(
            events,
            [
                ModelResponseEvent::MessageDelta("Hello".to_owned()),
                ModelResponseEvent::Completed(ModelFinishReason::Stop),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_chunk() {
        let events = Bytes::from_static(b"data: {\"oops\": true}\n\n");
        let sse = Sse::new(Chunks::from_vec_deque(vec![events].into()));
        let mut resp = pin!(OpenAIResponse::from_sse(sse));
        let err = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Other);

        // The response stays exhausted after an error.
        let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert!(matches!(event, Ok(None)));
    }
}
