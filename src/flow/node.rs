use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use super::FlowError;

/// Every node type the flow editor can place.
pub const TYPE_NAMES: [&str; 10] = [
    "trigger",
    "send_message",
    "ask_question",
    "button_choice",
    "condition",
    "api_action",
    "show_items",
    "handoff",
    "delay",
    "end",
];

/// A node's behaviour together with its configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum NodeKind {
    Trigger(TriggerConfig),
    SendMessage(SendMessageConfig),
    AskQuestion(AskQuestionConfig),
    ButtonChoice(ButtonChoiceConfig),
    Condition(ConditionConfig),
    ApiAction(ApiActionConfig),
    ShowItems(ShowItemsConfig),
    Handoff(HandoffConfig),
    Delay(DelayConfig),
    End(EndConfig),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendMessageConfig {
    /// May contain `{{variable}}` placeholders.
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validation {
    #[default]
    Text,
    Phone,
    Email,
    Number,
    Date,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AskQuestionConfig {
    pub question: String,
    pub variable_name: String,
    pub validation: Validation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Button {
    pub label: String,
    #[serde(deserialize_with = "scalar_string")]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonChoiceConfig {
    pub question: String,
    pub variable_name: String,
    pub buttons: Vec<Button>,
}

impl Default for ButtonChoiceConfig {
    fn default() -> Self {
        Self {
            question: String::new(),
            variable_name: "choice".into(),
            buttons: vec![
                Button {
                    label: "Сонголт 1".into(),
                    value: "option_1".into(),
                },
                Button {
                    label: "Сонголт 2".into(),
                    value: "option_2".into(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[default]
    Equals,
    Contains,
    GreaterThan,
    LessThan,
    Exists,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Condition {
    pub variable: String,
    pub operator: Operator,
    /// Compared as text; the editor may store numbers here.
    #[serde(deserialize_with = "scalar_string")]
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionConfig {
    pub conditions: Vec<Condition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_target: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiActionType {
    CreateOrder,
    CreateAppointment,
    SearchProducts,
    SearchServices,
    #[default]
    Webhook,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiActionConfig {
    pub action: ApiActionType,
    pub action_config: Value,
}

impl Default for ApiActionConfig {
    fn default() -> Self {
        Self {
            action: ApiActionType::default(),
            action_config: json!({}),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    #[default]
    Products,
    Services,
    Variable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayFormat {
    #[default]
    List,
    Carousel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowItemsConfig {
    pub source: ItemSource,
    pub display_format: DisplayFormat,
    pub max_items: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_filter: Option<String>,
    /// Variable that receives the item the customer picks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_variable: Option<String>,
    /// Variable holding the items when `source` is `variable`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_variable: Option<String>,
}

impl Default for ShowItemsConfig {
    fn default() -> Self {
        Self {
            source: ItemSource::default(),
            display_format: DisplayFormat::default(),
            max_items: 8,
            category_filter: None,
            selection_variable: None,
            source_variable: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffConfig {
    pub message: String,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            message: "Таныг оператортой холбож байна...".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    pub seconds: u32,
    pub show_typing: bool,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            seconds: 2,
            show_typing: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndConfig {
    /// Closing message; empty means none.
    pub message: String,
}

impl NodeKind {
    /// The default node for a type name, or `None` for names the editor
    /// doesn't know.
    pub fn default_for(type_name: &str) -> Option<NodeKind> {
        let kind = match type_name {
            "trigger" => NodeKind::Trigger(TriggerConfig::default()),
            "send_message" => NodeKind::SendMessage(SendMessageConfig::default()),
            "ask_question" => NodeKind::AskQuestion(AskQuestionConfig::default()),
            "button_choice" => NodeKind::ButtonChoice(ButtonChoiceConfig::default()),
            "condition" => NodeKind::Condition(ConditionConfig::default()),
            "api_action" => NodeKind::ApiAction(ApiActionConfig::default()),
            "show_items" => NodeKind::ShowItems(ShowItemsConfig::default()),
            "handoff" => NodeKind::Handoff(HandoffConfig::default()),
            "delay" => NodeKind::Delay(DelayConfig::default()),
            "end" => NodeKind::End(EndConfig::default()),
            _ => return None,
        };
        Some(kind)
    }

    /// Build a node from its editor type name and a (possibly partial)
    /// config object. Missing fields take their defaults.
    pub fn from_parts(type_name: &str, config: Value) -> Result<NodeKind, FlowError> {
        if !TYPE_NAMES.contains(&type_name) {
            return Err(FlowError::UnknownNodeType(type_name.to_string()));
        }
        let config = match config {
            Value::Null => json!({}),
            Value::Object(map) => Value::Object(map),
            other => {
                return Err(FlowError::InvalidGraph(format!(
                    "{type_name} config must be an object, got {other}"
                )));
            }
        };
        Ok(serde_json::from_value(
            json!({ "type": type_name, "config": config }),
        )?)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Trigger(_) => "trigger",
            NodeKind::SendMessage(_) => "send_message",
            NodeKind::AskQuestion(_) => "ask_question",
            NodeKind::ButtonChoice(_) => "button_choice",
            NodeKind::Condition(_) => "condition",
            NodeKind::ApiAction(_) => "api_action",
            NodeKind::ShowItems(_) => "show_items",
            NodeKind::Handoff(_) => "handoff",
            NodeKind::Delay(_) => "delay",
            NodeKind::End(_) => "end",
        }
    }

    /// Handoff and end nodes finish the conversation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeKind::Handoff(_) | NodeKind::End(_))
    }

    /// The config alone, as the editor stores it.
    pub fn config_value(&self) -> Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("config").map(Value::take))
            .unwrap_or_else(|| json!({}))
    }
}

/// Default configuration for a node type name. Unknown names get an empty
/// object so that newer editors can add node types.
pub fn default_config(type_name: &str) -> Value {
    NodeKind::default_for(type_name)
        .map(|kind| kind.config_value())
        .unwrap_or_else(|| json!({}))
}

fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}
