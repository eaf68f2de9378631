//! Tool call supports.

mod error;
mod executor;

use std::pin::Pin;

use docscout_model::ModelTool;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::Instrument;

pub use error::{Error, ErrorKind};
pub(crate) use executor::Executor;

/// The result of a tool call.
///
/// A successful result is the JSON payload sent back to the model. Tools
/// that report recoverable failures (like a missing file) should return
/// an `Ok` payload carrying an `error` field, `Err` is meant for failures
/// of the call itself.
pub type ToolResult = Result<Value, Error>;

/// Renders a tool result into the content of a tool message.
///
/// Errors become `{"error": "<reason>"}` objects so the model always sees
/// a JSON object.
pub fn render_result(result: &ToolResult) -> String {
    match result {
        Ok(value) => value.to_string(),
        Err(err) => json!({ "error": err.reason() }).to_string(),
    }
}

/// A tool that can be called by the model.
///
/// Implementations of this trait should be stateless, and may not maintain any
/// internal state.
///
/// The tool can be context-aware, meaning it can access additional information
/// about the current execution context, such as the workspace root. To do
/// this, make the context an immutable state of the tool, which can be set
/// during initialization, and copy it when executing.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}

pub(crate) trait ToolObject: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn definition(&self) -> ModelTool;

    fn execute(
        &self,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>>;
}

pub(crate) struct AnyTool<T: Tool>(pub T);

impl<T: Tool> ToolObject for AnyTool<T> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    fn definition(&self) -> ModelTool {
        ModelTool {
            name: self.0.name().to_owned(),
            description: self.0.description().to_owned(),
            parameters: self.0.parameter_schema().clone(),
        }
    }

    fn execute(
        &self,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = ToolResult> + Send>> {
        let input: T::Input = match serde_json::from_value(arguments) {
            Ok(input) => input,
            Err(err) => {
                let reason = format!("{err}");
                return Box::pin(std::future::ready(ToolResult::Err(
                    Error::invalid_input().with_reason(reason),
                )));
            }
        };
        let span = debug_span!("tool execute", name = self.0.name());
        Box::pin(self.0.execute(input).instrument(span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_result() {
        let ok: ToolResult = Ok(json!({ "count": 1 }));
        assert_eq!(render_result(&ok), r#"{"count":1}"#);

        let err: ToolResult =
            Err(Error::execution_error().with_reason("disk on fire"));
        assert_eq!(render_result(&err), r#"{"error":"disk on fire"}"#);

        let err: ToolResult = Err(Error::not_found());
        assert_eq!(render_result(&err), r#"{"error":"Tool not found"}"#);
    }
}
