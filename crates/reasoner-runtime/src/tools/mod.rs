//! Capability tools
//!
//! Reference implementations of the three capabilities the engine ships
//! with. Registration order is the order the framing text lists them.

pub mod python;
pub mod web_lookup;
pub mod wolfram;

use std::sync::Arc;
use std::time::Duration;

use reasoner_core::{provider::CompletionProvider, tool::ToolRegistry};

pub use python::PythonTool;
pub use web_lookup::{DEFAULT_WEB_LOOKUP_MODEL, WebLookupTool};
pub use wolfram::WolframTool;

/// Web lookup, Python and Wolfram Alpha, in that order
pub fn standard_tools(
    provider: Arc<dyn CompletionProvider>,
    web_lookup_model: impl Into<String>,
    http_timeout: Duration,
) -> anyhow::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(WebLookupTool::new(provider, web_lookup_model));
    registry.register(PythonTool::new());
    registry.register(WolframTool::new(http_timeout)?);
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reasoner_core::testing::ScriptedProvider;
    use reasoner_core::tool::Credentials;

    #[test]
    fn test_standard_tools_gating() {
        let registry = standard_tools(
            Arc::new(ScriptedProvider::default()),
            DEFAULT_WEB_LOOKUP_MODEL,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(registry.names(), vec!["find_datapoint_on_web", "python", "wolfram"]);

        let base = registry.available_for(&Credentials::new("sk"));
        assert_eq!(base.names(), vec!["find_datapoint_on_web", "python"]);
    }
}
