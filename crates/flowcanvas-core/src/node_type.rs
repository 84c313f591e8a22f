use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Closed set of node types a marketing flow can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Start,
    #[serde(alias = "audience-split")]
    CrowdSplit,
    EventSplit,
    AbTest,
    AiCall,
    Sms,
    ManualCall,
    Wait,
    Benefit,
    End,
}

/// Error type for enum conversion failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnumConversionError {
    #[error("Invalid node type: {0}")]
    InvalidNodeType(String),
    #[error("Invalid layout direction: {0} (expected TB or LR)")]
    InvalidDirection(String),
}

impl NodeType {
    pub const ALL: [NodeType; 10] = [
        NodeType::Start,
        NodeType::CrowdSplit,
        NodeType::EventSplit,
        NodeType::AbTest,
        NodeType::AiCall,
        NodeType::Sms,
        NodeType::ManualCall,
        NodeType::Wait,
        NodeType::Benefit,
        NodeType::End,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Start => "start",
            NodeType::CrowdSplit => "crowd-split",
            NodeType::EventSplit => "event-split",
            NodeType::AbTest => "ab-test",
            NodeType::AiCall => "ai-call",
            NodeType::Sms => "sms",
            NodeType::ManualCall => "manual-call",
            NodeType::Wait => "wait",
            NodeType::Benefit => "benefit",
            NodeType::End => "end",
        }
    }

    /// Splitting nodes expose one output port per branch.
    pub fn is_branching(&self) -> bool {
        matches!(
            self,
            NodeType::CrowdSplit | NodeType::EventSplit | NodeType::AbTest
        )
    }

    pub fn has_input(&self) -> bool {
        !matches!(self, NodeType::Start)
    }

    pub fn has_output(&self) -> bool {
        !matches!(self, NodeType::End)
    }

    /// Content rows rendered under the header when the host does not say.
    pub fn default_content_lines(&self) -> usize {
        match self {
            NodeType::Start => 2,
            NodeType::CrowdSplit | NodeType::EventSplit | NodeType::AbTest => 2,
            NodeType::AiCall
            | NodeType::Sms
            | NodeType::ManualCall
            | NodeType::Wait
            | NodeType::Benefit => 1,
            NodeType::End => 0,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = EnumConversionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "audience-split" => Ok(NodeType::CrowdSplit),
            other => NodeType::ALL
                .into_iter()
                .find(|kind| kind.as_str() == other)
                .ok_or_else(|| EnumConversionError::InvalidNodeType(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_audience_alias() {
        assert_eq!(
            "audience-split".parse::<NodeType>().unwrap(),
            NodeType::CrowdSplit
        );
        assert_eq!("crowd-split".parse::<NodeType>().unwrap(), NodeType::CrowdSplit);
        assert_eq!(
            "rocket".parse::<NodeType>(),
            Err(EnumConversionError::InvalidNodeType("rocket".to_string()))
        );
    }

    #[test]
    fn test_serde_uses_kebab_case_tags() {
        let parsed: NodeType = serde_json::from_str("\"audience-split\"").unwrap();
        assert_eq!(parsed, NodeType::CrowdSplit);
        assert_eq!(
            serde_json::to_string(&NodeType::ManualCall).unwrap(),
            "\"manual-call\""
        );
        for kind in NodeType::ALL {
            assert_eq!(kind.as_str().parse::<NodeType>().unwrap(), kind);
        }
    }

    #[test]
    fn test_port_capabilities() {
        assert!(!NodeType::Start.has_input());
        assert!(NodeType::Start.has_output());
        assert!(NodeType::End.has_input());
        assert!(!NodeType::End.has_output());
        assert!(NodeType::AbTest.is_branching());
        assert!(!NodeType::Wait.is_branching());
    }
}
