use std::collections::HashMap;
use std::future::ready;
use std::pin::Pin;

use docscout_model::{ModelTool, ToolCallRequest};

use crate::tool::{Error, ToolObject, ToolResult};

/// An executor that handles tool call requests from the model.
///
/// Tools are looked up by name. Requests for unknown tools still yield a
/// future, which resolves to a `NotFound` error, so every request gets
/// exactly one result.
pub struct Executor {
    tools: HashMap<String, Box<dyn ToolObject>>,
}

impl Executor {
    pub fn with_tools(tools: Vec<Box<dyn ToolObject>>) -> Self {
        let mut tool_map = HashMap::with_capacity(tools.len());
        for tool in tools {
            let name = tool.name();
            if tool_map.contains_key(name) {
                warn!("tool `{name}` registered twice, keeping the last one");
            }
            tool_map.insert(name.to_owned(), tool);
        }
        let tools = tool_map;
        Self { tools }
    }

    /// Returns the definitions of all tools, sorted by name.
    pub fn definitions(&self) -> Vec<ModelTool> {
        let mut definitions: Vec<_> =
            self.tools.values().map(|tool| tool.definition()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Creates a future for every request and hands it to `spawner`, in
    /// request order.
    pub fn handle_requests<S>(&self, requests: Vec<ToolCallRequest>, spawner: S)
    where
        S: FnMut(
            String,
            String,
            Pin<Box<dyn Future<Output = ToolResult> + Send>>,
        ),
    {
        let mut spawner = spawner;

        let span = debug_span!("tool executor");
        let _enter = span.enter();
        for req in requests {
            let ToolCallRequest {
                id,
                name,
                arguments,
            } = req;
            let fut: Pin<Box<dyn Future<Output = ToolResult> + Send>> =
                match self.tools.get(&name) {
                    Some(tool) => {
                        trace!("spawning a tool ({id}) with args: {arguments:?}");
                        tool.execute(arguments)
                    }
                    None => {
                        warn!("tool not found: {name}");
                        let err = Error::not_found()
                            .with_reason(format!("Tool `{name}` not found"));
                        Box::pin(ready(ToolResult::Err(err)))
                    }
                };
            spawner(id, name, fut);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::{Value, json};

    use super::*;
    use crate::tool::{AnyTool, ErrorKind, Tool};

    #[derive(Deserialize)]
    struct EchoInput {
        text: String,
    }

    struct EchoTool(Value);

    impl Tool for EchoTool {
        type Input = EchoInput;

        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes the text"
        }

        fn parameter_schema(&self) -> &Value {
            &self.0
        }

        fn execute(
            &self,
            input: Self::Input,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            ready(Ok(json!({ "text": input.text })))
        }
    }

    fn executor() -> Executor {
        let schema = json!({ "type": "object" });
        Executor::with_tools(vec![Box::new(AnyTool(EchoTool(schema)))])
    }

    fn request(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_owned(),
            name: name.to_owned(),
            arguments,
        }
    }

    #[test]
    fn test_definitions() {
        let definitions = executor().definitions();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].name, "echo");
        assert_eq!(definitions[0].parameters, json!({ "type": "object" }));
    }

    #[tokio::test]
    async fn test_handle_requests() {
        let executor = executor();
        let requests = vec![
            request("call_1", "echo", json!({ "text": "hi" })),
            request("call_2", "delete_file", json!({})),
            request("call_3", "echo", json!({ "txt": "typo" })),
        ];

        let mut spawned = vec![];
        executor.handle_requests(requests, |id, name, fut| {
            spawned.push((id, name, fut));
        });

        let ids: Vec<_> = spawned.iter().map(|(id, ..)| id.as_str()).collect();
        assert_eq!(ids, ["call_1", "call_2", "call_3"]);

        let mut results = vec![];
        for (_, _, fut) in spawned {
            results.push(fut.await);
        }
        assert_eq!(results[0], Ok(json!({ "text": "hi" })));
        assert_eq!(results[1].as_ref().unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            results[2].as_ref().unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }
}
