use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::live::derived_view::Searchable;

/// A container status row as listed by the orchestration endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    #[serde(alias = "Id")]
    pub id: String,
    #[serde(default, alias = "Name")]
    pub name: String,
    #[serde(default, alias = "Image")]
    pub image: String,
    /// Machine state: `running`, `exited`, `restarting`, ...
    #[serde(default, alias = "State")]
    pub state: String,
    /// Human status line, e.g. `Up 3 hours`.
    #[serde(default, alias = "Status")]
    pub status: String,
}

impl Container {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }

    /// Name without the leading slash Docker puts in front of it.
    pub fn display_name(&self) -> &str {
        self.name.trim_start_matches('/')
    }
}

impl Searchable for Container {
    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![
            Cow::Borrowed(self.display_name()),
            Cow::Borrowed(&self.image),
            Cow::Borrowed(&self.state),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_docker_style_fields() {
        let container: Container = serde_json::from_value(json!({
            "Id": "4f1c2d",
            "Name": "/headscale",
            "Image": "headscale/headscale:0.23",
            "State": "running",
            "Status": "Up 2 hours"
        }))
        .unwrap();
        assert_eq!(container.id, "4f1c2d");
        assert_eq!(container.display_name(), "headscale");
        assert!(container.is_running());
    }

    #[test]
    fn test_deserialize_with_missing_optional_fields() {
        let container: Container =
            serde_json::from_value(json!({ "id": "abc", "state": "exited" })).unwrap();
        assert_eq!(container.name, "");
        assert!(!container.is_running());
    }
}
