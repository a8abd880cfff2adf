use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::MAX_FLOW_STEPS;

use super::graph::{Edge, FlowGraph};
use super::node::*;
use super::FlowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Running,
    AwaitingInput,
    Completed,
    Cancelled,
}

/// Something the channel should do on the conversation's behalf.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    SendMessage {
        text: String,
    },
    AskQuestion {
        text: String,
    },
    PresentButtons {
        text: String,
        buttons: Vec<Button>,
    },
    Delay {
        seconds: u32,
        show_typing: bool,
    },
    CallApi {
        action: ApiActionType,
        config: Value,
        variables: HashMap<String, String>,
    },
    ShowItems {
        source: ItemSource,
        display_format: DisplayFormat,
        max_items: u32,
        category_filter: Option<String>,
        selection_variable: Option<String>,
        source_variable: Option<String>,
    },
    Handoff {
        message: String,
    },
}

/// One customer's walk through a flow.
///
/// Advances synchronously until it has to wait for the customer (a question
/// or a button choice) or reaches a terminal node. Conversations share
/// nothing but the immutable graph.
#[derive(Debug)]
pub struct Conversation {
    id: Ulid,
    graph: Arc<FlowGraph>,
    current_node: Option<String>,
    variables: HashMap<String, String>,
    visited_count: usize,
    status: ConversationStatus,
}

impl Conversation {
    /// Validate the graph, step past the trigger and run to the first
    /// suspension point.
    pub fn start(graph: Arc<FlowGraph>) -> Result<(Conversation, Vec<Action>), FlowError> {
        graph.validate()?;
        let first = graph
            .trigger()
            .and_then(|t| graph.next_edge(&t.id))
            .map(|e| e.target.clone())
            .ok_or_else(|| FlowError::InvalidGraph("trigger has no successor".into()))?;

        let mut conversation = Conversation {
            id: Ulid::new(),
            graph,
            current_node: None,
            variables: HashMap::new(),
            visited_count: 0,
            status: ConversationStatus::Running,
        };
        info!("conversation {} started", conversation.id);
        let actions = conversation.advance(first)?;
        Ok((conversation, actions))
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn status(&self) -> ConversationStatus {
        self.status
    }

    pub fn current_node(&self) -> Option<&str> {
        self.current_node.as_deref()
    }

    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }

    pub fn visited_count(&self) -> usize {
        self.visited_count
    }

    /// Feed the customer's reply to the node the conversation is waiting on.
    ///
    /// An answer that fails validation (or names no button) yields the
    /// prompt again and leaves the conversation where it was.
    pub fn provide_input(&mut self, text: &str) -> Result<Vec<Action>, FlowError> {
        match self.status {
            ConversationStatus::AwaitingInput => {}
            ConversationStatus::Cancelled => return Err(FlowError::Cancelled),
            _ => return Err(FlowError::NoPendingInput),
        }
        let graph = Arc::clone(&self.graph);
        let node_id = self.current_node.clone().ok_or(FlowError::NoPendingInput)?;
        let node = graph
            .node(&node_id)
            .ok_or_else(|| FlowError::UnknownNode(node_id.clone()))?;

        match &node.kind {
            NodeKind::AskQuestion(config) => {
                let answer = text.trim();
                if !is_valid_answer(config.validation, answer) {
                    debug!("conversation {}: rejected answer at {node_id}", self.id);
                    let prompt = config.error_message.as_deref().unwrap_or(&config.question);
                    return Ok(vec![Action::AskQuestion {
                        text: interpolate(prompt, &self.variables),
                    }]);
                }
                if !config.variable_name.is_empty() {
                    self.variables
                        .insert(config.variable_name.clone(), answer.to_string());
                }
                self.follow(graph.next_edge(&node_id))
            }
            NodeKind::ButtonChoice(config) => {
                let Some(index) = pick_button(&config.buttons, text) else {
                    return Ok(vec![Action::PresentButtons {
                        text: interpolate(&config.question, &self.variables),
                        buttons: config.buttons.clone(),
                    }]);
                };
                if !config.variable_name.is_empty() {
                    self.variables.insert(
                        config.variable_name.clone(),
                        config.buttons[index].value.clone(),
                    );
                }
                self.follow(graph.edge_from(&node_id, &format!("button_{index}")))
            }
            _ => Err(FlowError::NoPendingInput),
        }
    }

    /// Abort the conversation. Later inputs fail with `FlowError::Cancelled`.
    pub fn cancel(&mut self) {
        if self.status != ConversationStatus::Completed {
            info!("conversation {} cancelled", self.id);
            self.status = ConversationStatus::Cancelled;
        }
    }

    fn follow(&mut self, edge: Option<&Edge>) -> Result<Vec<Action>, FlowError> {
        match edge {
            Some(edge) => self.advance(edge.target.clone()),
            None => {
                self.complete();
                Ok(Vec::new())
            }
        }
    }

    /// Run from `node_id`. Any error leaves the conversation cancelled.
    fn advance(&mut self, node_id: String) -> Result<Vec<Action>, FlowError> {
        self.status = ConversationStatus::Running;
        let result = self.run(node_id);
        if let Err(e) = &result {
            warn!("conversation {} aborted: {e}", self.id);
            self.status = ConversationStatus::Cancelled;
        }
        result
    }

    fn run(&mut self, node_id: String) -> Result<Vec<Action>, FlowError> {
        let graph = Arc::clone(&self.graph);
        let mut actions = Vec::new();
        let mut next = Some(node_id);
        let mut steps = 0;

        while let Some(id) = next.take() {
            steps += 1;
            if steps > MAX_FLOW_STEPS {
                return Err(FlowError::StepLimit(MAX_FLOW_STEPS));
            }
            let node = graph
                .node(&id)
                .ok_or_else(|| FlowError::UnknownNode(id.clone()))?;
            self.visited_count += 1;
            self.current_node = Some(id.clone());

            let exit = || graph.next_edge(&id).map(|e| e.target.clone());
            match &node.kind {
                NodeKind::Trigger(_) => next = exit(),
                NodeKind::SendMessage(config) => {
                    actions.push(Action::SendMessage {
                        text: interpolate(&config.message, &self.variables),
                    });
                    next = exit();
                }
                NodeKind::Delay(config) => {
                    actions.push(Action::Delay {
                        seconds: config.seconds,
                        show_typing: config.show_typing,
                    });
                    next = exit();
                }
                NodeKind::ApiAction(config) => {
                    actions.push(Action::CallApi {
                        action: config.action,
                        config: config.action_config.clone(),
                        variables: self.variables.clone(),
                    });
                    next = exit();
                }
                NodeKind::ShowItems(config) => {
                    actions.push(Action::ShowItems {
                        source: config.source,
                        display_format: config.display_format,
                        max_items: config.max_items,
                        category_filter: config.category_filter.clone(),
                        selection_variable: config.selection_variable.clone(),
                        source_variable: config.source_variable.clone(),
                    });
                    next = exit();
                }
                NodeKind::Condition(config) => {
                    next = self.branch(&graph, &id, config);
                }
                NodeKind::AskQuestion(config) => {
                    actions.push(Action::AskQuestion {
                        text: interpolate(&config.question, &self.variables),
                    });
                    self.status = ConversationStatus::AwaitingInput;
                    return Ok(actions);
                }
                NodeKind::ButtonChoice(config) => {
                    actions.push(Action::PresentButtons {
                        text: interpolate(&config.question, &self.variables),
                        buttons: config.buttons.clone(),
                    });
                    self.status = ConversationStatus::AwaitingInput;
                    return Ok(actions);
                }
                NodeKind::Handoff(config) => {
                    actions.push(Action::Handoff {
                        message: interpolate(&config.message, &self.variables),
                    });
                    self.complete();
                    return Ok(actions);
                }
                NodeKind::End(config) => {
                    if !config.message.trim().is_empty() {
                        actions.push(Action::SendMessage {
                            text: interpolate(&config.message, &self.variables),
                        });
                    }
                    self.complete();
                    return Ok(actions);
                }
            }
        }

        // dead end
        self.complete();
        Ok(actions)
    }

    /// First matching condition wins; otherwise the default branch.
    fn branch(&self, graph: &FlowGraph, node_id: &str, config: &ConditionConfig) -> Option<String> {
        for (index, condition) in config.conditions.iter().enumerate() {
            if evaluate(condition, &self.variables) {
                return graph
                    .edge_from(node_id, &format!("condition_{index}"))
                    .map(|e| e.target.clone())
                    .or_else(|| condition.target.clone());
            }
        }
        graph
            .edge_from(node_id, "default")
            .map(|e| e.target.clone())
            .or_else(|| config.default_target.clone())
    }

    fn complete(&mut self) {
        debug!(
            "conversation {} completed after {} nodes",
            self.id, self.visited_count
        );
        self.status = ConversationStatus::Completed;
    }
}

/// Absent variables fail every operator, `exists` included.
pub fn evaluate(condition: &Condition, variables: &HashMap<String, String>) -> bool {
    let Some(actual) = variables.get(&condition.variable) else {
        return false;
    };
    let expected = condition.value.trim();
    match condition.operator {
        Operator::Exists => true,
        Operator::Equals => actual.trim().to_lowercase() == expected.to_lowercase(),
        Operator::Contains => actual.to_lowercase().contains(&expected.to_lowercase()),
        Operator::GreaterThan => numbers(actual, expected).is_some_and(|(a, b)| a > b),
        Operator::LessThan => numbers(actual, expected).is_some_and(|(a, b)| a < b),
    }
}

fn numbers(a: &str, b: &str) -> Option<(f64, f64)> {
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

pub fn is_valid_answer(validation: Validation, answer: &str) -> bool {
    let answer = answer.trim();
    if answer.is_empty() {
        return false;
    }
    match validation {
        Validation::Text => true,
        Validation::Number => answer.parse::<f64>().is_ok_and(f64::is_finite),
        Validation::Phone => is_phone(answer),
        Validation::Email => is_email(answer),
        Validation::Date => ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"]
            .iter()
            .any(|format| NaiveDate::parse_from_str(answer, format).is_ok()),
    }
}

fn is_phone(s: &str) -> bool {
    let body = s.strip_prefix('+').unwrap_or(s);
    if !body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')'))
    {
        return false;
    }
    let digits = body.chars().filter(char::is_ascii_digit).count();
    (8..=15).contains(&digits)
}

fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !s.chars().any(char::is_whitespace)
        && domain.contains('.')
        && domain.split('.').all(|part| !part.is_empty())
}

/// Button picked by value or label (case-insensitive). A bare number that
/// matches neither falls back to the 0-based index.
fn pick_button(buttons: &[Button], input: &str) -> Option<usize> {
    let input = input.trim();
    let lowered = input.to_lowercase();
    buttons
        .iter()
        .position(|b| b.value.to_lowercase() == lowered || b.label.to_lowercase() == lowered)
        .or_else(|| input.parse::<usize>().ok().filter(|&index| index < buttons.len()))
}

/// Replace `{{name}}` placeholders with captured variables. Unknown names
/// become empty.
pub fn interpolate(template: &str, variables: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = rest[open + 2..open + 2 + close].trim();
        if let Some(value) = variables.get(name) {
            out.push_str(value);
        }
        rest = &rest[open + 2 + close + 2..];
    }
    out.push_str(rest);
    out
}
