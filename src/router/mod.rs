// Inbound topic classification

mod mapping;

pub use mapping::ToolMapping;

use crate::event::EventKind;
use tracing::{debug, warn};

/// Segment naming the aggregate summary topic
pub const OVERALL: &str = "overall";

/// What an inbound topic refers to
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// `<ns>/<tool>/<kind>`, with the tool key case-folded
    Tool { entity: String, kind: EventKind },
    /// `<ns>/overall`
    Overall,
    /// Tool id missing from the legacy mapping
    Unmapped(String),
    /// Anything else on the bus
    Unrecognized,
}

/// Classifies backend topics.
///
/// Namespaces may span several levels (`nemo/tools`). When a legacy
/// mapping is loaded and non-empty, the tool segment is treated as a
/// backend id and translated to a name.
#[derive(Debug, Clone)]
pub struct TopicRouter {
    namespace: String,
    mapping: Option<ToolMapping>,
}

impl TopicRouter {
    pub fn new(namespace: &str, mapping: Option<ToolMapping>) -> Self {
        Self {
            namespace: namespace.trim_matches('/').to_string(),
            mapping: mapping.filter(|m| !m.is_empty()),
        }
    }

    /// Subscription filter covering everything the router understands
    pub fn subscription(&self) -> String {
        format!("{}/#", self.namespace)
    }

    pub fn classify(&self, topic: &str) -> Route {
        let rest = match topic
            .strip_prefix(self.namespace.as_str())
            .and_then(|r| r.strip_prefix('/'))
        {
            Some(rest) => rest,
            None => {
                debug!(topic = %topic, "Topic outside namespace, ignoring");
                return Route::Unrecognized;
            }
        };

        let segments: Vec<&str> = rest.split('/').collect();
        match segments.as_slice() {
            [segment] if segment.eq_ignore_ascii_case(OVERALL) => Route::Overall,
            [tool, kind] if !tool.is_empty() && !kind.is_empty() => {
                let kind = EventKind::from_segment(kind);
                match self.resolve(tool) {
                    Some(entity) => Route::Tool { entity, kind },
                    None => {
                        warn!(topic = %topic, tool = %tool, "Tool not in mapping, dropping");
                        Route::Unmapped(tool.to_string())
                    }
                }
            }
            _ => {
                debug!(topic = %topic, "Unrecognized topic shape, ignoring");
                Route::Unrecognized
            }
        }
    }

    fn resolve(&self, tool: &str) -> Option<String> {
        match &self.mapping {
            Some(mapping) => mapping.name_for(tool).map(str::to_lowercase),
            None => Some(tool.to_lowercase()),
        }
    }
}
