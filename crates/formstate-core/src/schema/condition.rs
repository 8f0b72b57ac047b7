//! Condition trees as declared in the schema.
//!
//! A condition tree is immutable schema data; only its evaluation result is
//! runtime state (see `crate::condition`).

use serde::Deserialize;

use crate::path::RelativePath;

/// What an `Equals` node compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualsKind {
    Choice,
    User,
    Bool,
    Object,
}

/// Expected value of an `Equals` node.
///
/// `Id(None)` means "nothing selected".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    Text(String),
    Id(Option<i64>),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawCondition")]
pub enum ConditionNode {
    Literal(bool),
    Not(Box<ConditionNode>),
    All(Vec<ConditionNode>),
    Any(Vec<ConditionNode>),
    Equals {
        kind: EqualsKind,
        path: RelativePath,
        expected: Expected,
    },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawCondition {
    ChoiceEquals {
        property_name: RelativePath,
        choice: String,
    },
    UserEquals {
        property_name: RelativePath,
        #[serde(default)]
        user_id: Option<i64>,
    },
    BoolEquals {
        property_name: RelativePath,
        value: bool,
    },
    ObjectEquals {
        property_name: RelativePath,
        #[serde(default)]
        object_id: Option<i64>,
    },
    Any {
        conditions: Vec<ConditionNode>,
    },
    All {
        conditions: Vec<ConditionNode>,
    },
    Not {
        condition: Box<ConditionNode>,
    },
    Literal {
        value: bool,
    },
}

impl From<RawCondition> for ConditionNode {
    fn from(raw: RawCondition) -> Self {
        match raw {
            RawCondition::ChoiceEquals {
                property_name,
                choice,
            } => ConditionNode::Equals {
                kind: EqualsKind::Choice,
                path: property_name,
                expected: Expected::Text(choice),
            },
            RawCondition::UserEquals {
                property_name,
                user_id,
            } => ConditionNode::Equals {
                kind: EqualsKind::User,
                path: property_name,
                expected: Expected::Id(user_id),
            },
            RawCondition::BoolEquals {
                property_name,
                value,
            } => ConditionNode::Equals {
                kind: EqualsKind::Bool,
                path: property_name,
                expected: Expected::Bool(value),
            },
            RawCondition::ObjectEquals {
                property_name,
                object_id,
            } => ConditionNode::Equals {
                kind: EqualsKind::Object,
                path: property_name,
                expected: Expected::Id(object_id),
            },
            RawCondition::Any { conditions } => ConditionNode::Any(conditions),
            RawCondition::All { conditions } => ConditionNode::All(conditions),
            RawCondition::Not { condition } => ConditionNode::Not(condition),
            RawCondition::Literal { value } => ConditionNode::Literal(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn nested_tree_deserializes() {
        let node: ConditionNode = serde_json::from_str(
            r#"{"type":"any","conditions":[
                {"type":"choice_equals","property_name":"kind","choice":"liquid"},
                {"type":"not","condition":{"type":"bool_equals","property_name":"dry","value":true}}
            ]}"#,
        )
        .unwrap();

        let ConditionNode::Any(children) = node else {
            panic!("expected any");
        };
        assert_matches!(&children[0], ConditionNode::Equals { kind: EqualsKind::Choice, path, .. } if path.to_string() == "kind");
        assert_matches!(&children[1], ConditionNode::Not(inner) if matches!(**inner, ConditionNode::Equals { kind: EqualsKind::Bool, .. }));
    }

    #[test]
    fn missing_user_id_means_nobody() {
        let node: ConditionNode =
            serde_json::from_str(r#"{"type":"user_equals","property_name":"owner"}"#).unwrap();
        assert_matches!(
            node,
            ConditionNode::Equals {
                kind: EqualsKind::User,
                expected: Expected::Id(None),
                ..
            }
        );
    }

    #[test]
    fn unknown_type_rejected() {
        let r = serde_json::from_str::<ConditionNode>(r#"{"type":"text_contains","property_name":"a"}"#);
        assert!(r.is_err());
    }
}
