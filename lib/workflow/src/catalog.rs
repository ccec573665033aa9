//! Port and schema catalog.
//!
//! Maps a node's `(category, label, parameters)` to its canonical input
//! ports, output ports and default configuration. Dispatch goes through one
//! ordered table, [`MATCHERS`]: the first row whose category matches and
//! whose keyword occurs (case-insensitively) in the label wins, and each
//! category falls back to a generic template when nothing matches.
//!
//! Every function here is total and pure. Deriving twice from the same
//! inputs yields the same ports in the same order, which matters because
//! derivation runs both when a node is created and when it is compiled.

use crate::node::{NodeCategory, Parameters};
use crate::port::{Port, PortType, is_blank};
use chainflow_core::WorkflowId;
use serde_json::{Value as JsonValue, json};

/// Placeholder used as the message target of communication nodes until the
/// user picks one.
pub const DEFAULT_MESSAGE_TARGET: &str = "@me";

/// A specialized node template selected by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeTemplate {
    ScheduleTrigger,
    PriceTrigger,
    WalletEventTrigger,
    WebhookTrigger,
    ManualTrigger,
    BalanceCheck,
    Threshold,
    Condition,
    Format,
    Math,
    Filter,
    Transform,
    TokenSwap,
    PriceFeed,
    LoanHealth,
    Transfer,
    GenericProtocol,
    MemoryStore,
    MemoryRetrieve,
    MemoryClear,
    Telegram,
    Discord,
    Email,
    Notification,
    /// Nodes of an unknown category: no ports, no config.
    Opaque,
}

/// One row of the dispatch table.
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    pub category: NodeCategory,
    /// Lowercase substrings searched for in the label.
    pub keywords: &'static [&'static str],
    pub template: NodeTemplate,
}

const fn row(
    category: NodeCategory,
    keywords: &'static [&'static str],
    template: NodeTemplate,
) -> Matcher {
    Matcher {
        category,
        keywords,
        template,
    }
}

/// The label dispatch table. Order matters: first match wins.
pub const MATCHERS: &[Matcher] = &[
    row(
        NodeCategory::Trigger,
        &["schedule", "cron", "timer", "interval"],
        NodeTemplate::ScheduleTrigger,
    ),
    row(
        NodeCategory::Trigger,
        &["price alert", "price threshold", "price trigger"],
        NodeTemplate::PriceTrigger,
    ),
    row(
        NodeCategory::Trigger,
        &["wallet", "account", "transaction"],
        NodeTemplate::WalletEventTrigger,
    ),
    row(NodeCategory::Trigger, &["webhook"], NodeTemplate::WebhookTrigger),
    row(NodeCategory::Condition, &["balance"], NodeTemplate::BalanceCheck),
    row(
        NodeCategory::Condition,
        &["threshold", "compare", "greater", "less"],
        NodeTemplate::Threshold,
    ),
    row(NodeCategory::Transform, &["format", "template"], NodeTemplate::Format),
    row(NodeCategory::Transform, &["math", "calculate"], NodeTemplate::Math),
    row(NodeCategory::Transform, &["filter"], NodeTemplate::Filter),
    row(NodeCategory::Protocol, &["jupiter", "swap"], NodeTemplate::TokenSwap),
    row(NodeCategory::Protocol, &["pyth", "price feed"], NodeTemplate::PriceFeed),
    row(
        NodeCategory::Protocol,
        &["kamino", "solend", "loan health"],
        NodeTemplate::LoanHealth,
    ),
    row(NodeCategory::Protocol, &["transfer"], NodeTemplate::Transfer),
    row(
        NodeCategory::Memory,
        &["clear", "delete", "forget"],
        NodeTemplate::MemoryClear,
    ),
    row(
        NodeCategory::Memory,
        &["retrieve", "load", "read", "recall"],
        NodeTemplate::MemoryRetrieve,
    ),
    row(
        NodeCategory::Memory,
        &["store", "save", "write", "remember"],
        NodeTemplate::MemoryStore,
    ),
    row(NodeCategory::Communication, &["telegram"], NodeTemplate::Telegram),
    row(NodeCategory::Communication, &["discord"], NodeTemplate::Discord),
    row(NodeCategory::Communication, &["email", "mail"], NodeTemplate::Email),
];

impl NodeTemplate {
    /// Selects the template for a node.
    ///
    /// Memory nodes honor an explicit `operation` parameter before looking
    /// at the label.
    #[must_use]
    pub fn resolve(category: NodeCategory, label: &str, parameters: &Parameters) -> Self {
        if category == NodeCategory::Memory
            && let Some(template) = memory_operation(parameters)
        {
            return template;
        }

        let label = label.to_lowercase();
        MATCHERS
            .iter()
            .filter(|m| m.category == category)
            .find(|m| m.keywords.iter().any(|k| label.contains(k)))
            .map_or_else(|| Self::fallback(category), |m| m.template)
    }

    /// The generic template of a category.
    #[must_use]
    pub const fn fallback(category: NodeCategory) -> Self {
        match category {
            NodeCategory::Trigger => Self::ManualTrigger,
            NodeCategory::Condition => Self::Condition,
            NodeCategory::Transform => Self::Transform,
            NodeCategory::Protocol => Self::GenericProtocol,
            NodeCategory::Memory => Self::MemoryStore,
            NodeCategory::Communication => Self::Notification,
            NodeCategory::Unknown => Self::Opaque,
        }
    }

    /// Input ports of this template.
    #[must_use]
    pub fn inputs(&self, parameters: &Parameters) -> Vec<Port> {
        use PortType::{Any, Array, Number, Object, String};

        match self {
            Self::ScheduleTrigger => vec![
                Port::required("cronExpression", "Cron Expression", String)
                    .with_description("Five-field cron schedule, e.g. */5 * * * *"),
            ],
            Self::PriceTrigger => vec![
                Port::required("symbol", "Symbol", String),
                Port::required("threshold", "Price Threshold", Number),
                Port::optional("direction", "Direction", String)
                    .with_default(json!("above"))
                    .with_description("Fire when the price moves above or below the threshold"),
            ],
            Self::WalletEventTrigger => {
                vec![Port::required("walletAddress", "Wallet Address", String)]
            }
            Self::WebhookTrigger | Self::ManualTrigger => Vec::new(),
            Self::BalanceCheck => vec![
                Port::required("walletAddress", "Wallet Address", String),
                Port::optional("token", "Token", String).with_default(json!("SOL")),
                Port::required("minBalance", "Minimum Balance", Number),
            ],
            Self::Threshold => vec![
                Port::required("value", "Value", Number),
                Port::required("threshold", "Threshold", Number),
                Port::optional("operator", "Operator", String).with_default(json!(">")),
            ],
            Self::Condition => vec![
                Port::required("input", "Input", Any),
                Port::required("expression", "Expression", String),
            ],
            Self::Format => vec![
                Port::required("data", "Data", Object),
                Port::required("template", "Template", String),
            ],
            Self::Math => vec![
                Port::required("a", "A", Number),
                Port::required("b", "B", Number),
                Port::optional("operation", "Operation", String).with_default(json!("add")),
            ],
            Self::Filter => vec![
                Port::required("items", "Items", Array),
                Port::required("predicate", "Predicate", String),
            ],
            Self::Transform => vec![
                Port::required("input", "Input", Any),
                Port::optional("expression", "Expression", String),
            ],
            Self::TokenSwap => vec![
                Port::required("inputMint", "Input Token", String)
                    .with_description("Mint address of the token to sell"),
                Port::required("outputMint", "Output Token", String)
                    .with_description("Mint address of the token to buy"),
                Port::required("amount", "Amount", Number),
                Port::optional("slippageBps", "Slippage (bps)", Number).with_default(json!(50)),
            ],
            Self::PriceFeed => vec![
                Port::required("symbol", "Symbol", String)
                    .with_description("Price feed symbol, e.g. SOL/USD"),
            ],
            Self::LoanHealth => vec![Port::required("walletAddress", "Wallet Address", String)],
            Self::Transfer => vec![
                Port::required("recipient", "Recipient", String),
                Port::required("amount", "Amount", Number),
                Port::optional("token", "Token", String).with_default(json!("SOL")),
            ],
            Self::GenericProtocol => vec![
                Port::required("walletAddress", "Wallet Address", String),
                Port::required("action", "Action", String),
                Port::optional("amount", "Amount", Number),
                Port::optional("token", "Token", String).with_default(json!("SOL")),
                Port::optional("slippage", "Slippage (%)", Number).with_default(json!(0.5)),
            ],
            Self::MemoryStore => {
                let value = if value_from_connection(parameters) {
                    Port::optional("value", "Value", Any)
                } else {
                    Port::required("value", "Value", Any)
                };
                vec![value.with_description("Value to store in workflow memory")]
            }
            Self::MemoryRetrieve | Self::MemoryClear => Vec::new(),
            Self::Telegram => vec![
                Port::required("message", "Message", String),
                Port::optional("chatId", "Chat ID", String),
            ],
            Self::Discord => vec![
                Port::required("message", "Message", String),
                Port::optional("webhookUrl", "Webhook URL", String),
            ],
            Self::Email => vec![
                Port::optional("subject", "Subject", String),
                Port::required("message", "Message", String),
                Port::optional("to", "To", String),
            ],
            Self::Notification => vec![
                Port::required("message", "Message", String),
                Port::optional("target", "Target", String),
            ],
            Self::Opaque => Vec::new(),
        }
    }

    /// Output ports of this template.
    #[must_use]
    pub fn outputs(&self) -> Vec<Port> {
        use PortType::{Any, Array, Boolean, Number, Object, String};

        let out = |id: &str, name: &str, ty: PortType| Port::optional(id, name, ty);
        match self {
            Self::ScheduleTrigger => vec![out("timestamp", "Timestamp", Number)],
            Self::PriceTrigger => vec![
                out("price", "Price", Number),
                out("triggered", "Triggered", Boolean),
            ],
            Self::WalletEventTrigger => vec![
                out("signature", "Signature", String),
                out("event", "Event", Object),
            ],
            Self::WebhookTrigger => vec![out("payload", "Payload", Object)],
            Self::ManualTrigger => vec![
                out("timestamp", "Timestamp", Number),
                out("payload", "Payload", Object),
            ],
            Self::BalanceCheck => vec![
                out("result", "Result", Boolean),
                out("balance", "Balance", Number),
            ],
            Self::Threshold => vec![
                out("result", "Result", Boolean),
                out("value", "Value", Number),
            ],
            Self::Condition => vec![out("true", "True", Any), out("false", "False", Any)],
            Self::Format => vec![out("text", "Text", String)],
            Self::Math => vec![out("result", "Result", Number)],
            Self::Filter => vec![out("items", "Items", Array)],
            Self::Transform => vec![out("output", "Output", Any)],
            Self::TokenSwap => vec![
                out("signature", "Signature", String),
                out("inAmount", "Amount In", Number),
                out("outAmount", "Amount Out", Number),
            ],
            Self::PriceFeed => vec![
                out("price", "Price", Number),
                out("confidence", "Confidence", Number),
                out("publishTime", "Publish Time", Number),
            ],
            Self::LoanHealth => vec![
                out("healthFactor", "Health Factor", Number),
                out("positions", "Positions", Array),
                out("atRisk", "At Risk", Boolean),
            ],
            Self::Transfer => vec![out("signature", "Signature", String)],
            Self::GenericProtocol => vec![out("result", "Result", Object)],
            // Memory outputs do not depend on the operation, so they can be
            // derived from category and label alone.
            Self::MemoryStore | Self::MemoryRetrieve | Self::MemoryClear => vec![
                out("value", "Value", Any),
                out("success", "Success", Boolean),
            ],
            Self::Telegram => vec![
                out("delivered", "Delivered", Boolean),
                out("messageId", "Message ID", String),
            ],
            Self::Discord | Self::Email | Self::Notification => {
                vec![out("delivered", "Delivered", Boolean)]
            }
            Self::Opaque => Vec::new(),
        }
    }

    /// Default configuration of this template.
    ///
    /// Always contains the defaults declared on the template's input ports.
    #[must_use]
    pub fn default_config(
        &self,
        label: &str,
        parameters: &Parameters,
        workflow_id: &WorkflowId,
    ) -> Parameters {
        let mut config = Parameters::new();
        for port in self.inputs(parameters) {
            if let Some(default) = port.default {
                config.insert(port.id, default);
            }
        }

        let mut set = |key: &str, value: JsonValue| {
            config.insert(key.to_string(), value);
        };

        match self {
            Self::ScheduleTrigger => set("triggerType", json!("schedule")),
            Self::PriceTrigger => set("triggerType", json!("price")),
            Self::WalletEventTrigger => set("triggerType", json!("wallet")),
            Self::WebhookTrigger => set("triggerType", json!("webhook")),
            Self::ManualTrigger => set("triggerType", json!("manual")),
            Self::TokenSwap
            | Self::PriceFeed
            | Self::LoanHealth
            | Self::Transfer
            | Self::GenericProtocol => {
                if let Some((protocol, method, cost)) = self.protocol_call(label) {
                    set("protocol", json!(protocol));
                    set("method", json!(method));
                    set("cost", json!(cost));
                }
            }
            Self::MemoryStore | Self::MemoryRetrieve | Self::MemoryClear => {
                set("key", json!(workflow_id.as_str()));
                if let Some(operation) = self.memory_operation_name() {
                    set("operation", json!(operation));
                }
                if *self == Self::MemoryStore {
                    set("valueSource", json!("manual"));
                }
            }
            Self::Telegram | Self::Discord | Self::Email | Self::Notification => {
                if let Some((channel, target_key)) = self.message_channel() {
                    set("channel", json!(channel));
                    let target_set = parameters.get(target_key).is_some_and(|v| !is_blank(v));
                    if !target_set {
                        set(target_key, json!(DEFAULT_MESSAGE_TARGET));
                    }
                }
            }
            Self::BalanceCheck
            | Self::Threshold
            | Self::Condition
            | Self::Format
            | Self::Math
            | Self::Filter
            | Self::Transform
            | Self::Opaque => {}
        }

        config
    }

    /// `(protocol, method, cost)` for protocol templates.
    fn protocol_call(&self, label: &str) -> Option<(&'static str, &'static str, u32)> {
        match self {
            Self::TokenSwap => Some(("jupiter", "swap", 3)),
            Self::PriceFeed => Some(("pyth", "getPrice", 1)),
            Self::LoanHealth => {
                let protocol = if label.to_lowercase().contains("solend") {
                    "solend"
                } else {
                    "kamino"
                };
                Some((protocol, "getLoanHealth", 2))
            }
            Self::Transfer => Some(("system", "transfer", 2)),
            Self::GenericProtocol => Some(("generic", "execute", 1)),
            _ => None,
        }
    }

    fn memory_operation_name(&self) -> Option<&'static str> {
        match self {
            Self::MemoryStore => Some("store"),
            Self::MemoryRetrieve => Some("retrieve"),
            Self::MemoryClear => Some("clear"),
            _ => None,
        }
    }

    /// `(channel, target parameter key)` for communication templates.
    fn message_channel(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Telegram => Some(("telegram", "chatId")),
            Self::Discord => Some(("discord", "webhookUrl")),
            Self::Email => Some(("email", "to")),
            Self::Notification => Some(("notification", "target")),
            _ => None,
        }
    }
}

fn memory_operation(parameters: &Parameters) -> Option<NodeTemplate> {
    let operation = parameters.get("operation")?.as_str()?;
    match operation.trim().to_lowercase().as_str() {
        "store" => Some(NodeTemplate::MemoryStore),
        "retrieve" => Some(NodeTemplate::MemoryRetrieve),
        "clear" => Some(NodeTemplate::MemoryClear),
        _ => None,
    }
}

/// True when a memory store node takes its value from an upstream connection
/// rather than from a manually entered parameter.
fn value_from_connection(parameters: &Parameters) -> bool {
    parameters
        .get("valueSource")
        .and_then(JsonValue::as_str)
        .is_some_and(|source| !source.trim().eq_ignore_ascii_case("manual"))
}

/// Derives the input ports of a node.
#[must_use]
pub fn derive_inputs(category: NodeCategory, label: &str, parameters: &Parameters) -> Vec<Port> {
    NodeTemplate::resolve(category, label, parameters).inputs(parameters)
}

/// Derives the output ports of a node.
#[must_use]
pub fn derive_outputs(category: NodeCategory, label: &str) -> Vec<Port> {
    NodeTemplate::resolve(category, label, &Parameters::new()).outputs()
}

/// Derives the default configuration of a node owned by `workflow_id`.
#[must_use]
pub fn derive_default_config(
    category: NodeCategory,
    label: &str,
    parameters: &Parameters,
    workflow_id: &WorkflowId,
) -> Parameters {
    NodeTemplate::resolve(category, label, parameters).default_config(
        label,
        parameters,
        workflow_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_CATEGORIES: [NodeCategory; 7] = [
        NodeCategory::Trigger,
        NodeCategory::Condition,
        NodeCategory::Transform,
        NodeCategory::Protocol,
        NodeCategory::Memory,
        NodeCategory::Communication,
        NodeCategory::Unknown,
    ];

    fn params(value: JsonValue) -> Parameters {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("params must be an object"),
        }
    }

    fn ids(ports: &[Port]) -> Vec<&str> {
        ports.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn jupiter_swap_inputs() {
        let inputs = derive_inputs(NodeCategory::Protocol, "Jupiter Swap", &Parameters::new());
        assert_eq!(ids(&inputs), ["inputMint", "outputMint", "amount", "slippageBps"]);
        let required: Vec<bool> = inputs.iter().map(|p| p.required).collect();
        assert_eq!(required, [true, true, true, false]);
        assert_eq!(inputs[3].default, Some(json!(50)));
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let inputs = derive_inputs(NodeCategory::Protocol, "SWAP sol for usdc", &Parameters::new());
        assert_eq!(inputs[0].id, "inputMint");
    }

    #[test]
    fn price_feed_and_loan_health_templates() {
        let pyth = derive_inputs(NodeCategory::Protocol, "Pyth SOL", &Parameters::new());
        assert_eq!(ids(&pyth), ["symbol"]);
        let feed = derive_inputs(NodeCategory::Protocol, "Price Feed", &Parameters::new());
        assert_eq!(ids(&feed), ["symbol"]);

        for label in ["Kamino Vault", "Solend position", "Loan Health Monitor"] {
            let inputs = derive_inputs(NodeCategory::Protocol, label, &Parameters::new());
            assert_eq!(ids(&inputs), ["walletAddress"], "label {label}");
        }
    }

    #[test]
    fn unmatched_protocol_label_uses_generic_template() {
        let inputs = derive_inputs(NodeCategory::Protocol, "Something new", &Parameters::new());
        assert_eq!(
            ids(&inputs),
            ["walletAddress", "action", "amount", "token", "slippage"]
        );
    }

    #[test]
    fn first_match_wins() {
        // Contains both "clear" and "store"; the clear row comes first.
        let template = NodeTemplate::resolve(
            NodeCategory::Memory,
            "Clear stored value",
            &Parameters::new(),
        );
        assert_eq!(template, NodeTemplate::MemoryClear);
    }

    #[test]
    fn keywords_only_match_within_their_category() {
        let template =
            NodeTemplate::resolve(NodeCategory::Transform, "Swap fields", &Parameters::new());
        assert_eq!(template, NodeTemplate::Transform);
    }

    #[test]
    fn derivation_is_idempotent_for_every_category() {
        let labels = [
            "",
            "Jupiter Swap",
            "Pyth price feed",
            "cron job",
            "Telegram alert",
            "math",
            "recall memory",
            "¯\\_(ツ)_/¯",
        ];
        for category in ALL_CATEGORIES {
            for label in labels {
                let first = derive_inputs(category, label, &Parameters::new());
                let second = derive_inputs(category, label, &Parameters::new());
                assert_eq!(first, second, "{category} / {label}");
                assert_eq!(derive_outputs(category, label), derive_outputs(category, label));
            }
        }
    }

    #[test]
    fn memory_store_manual_value_is_required() {
        let p = params(json!({"operation": "store", "valueSource": "manual"}));
        let inputs = derive_inputs(NodeCategory::Memory, "Memory", &p);
        assert_eq!(ids(&inputs), ["value"]);
        assert!(inputs[0].required);
    }

    #[test]
    fn memory_store_from_connection_is_optional() {
        let p = params(json!({"operation": "store", "valueSource": "previous"}));
        let inputs = derive_inputs(NodeCategory::Memory, "Memory", &p);
        assert!(!inputs[0].required);
    }

    #[test]
    fn memory_operation_parameter_beats_label() {
        let p = params(json!({"operation": "retrieve"}));
        let inputs = derive_inputs(NodeCategory::Memory, "Store things", &p);
        assert!(inputs.is_empty());
    }

    #[test]
    fn memory_config_is_scoped_to_workflow() {
        let wf = WorkflowId::from("wf_42");
        let p = params(json!({"operation": "store", "valueSource": "manual"}));
        let config = derive_default_config(NodeCategory::Memory, "Memory", &p, &wf);
        assert_eq!(config["key"], json!("wf_42"));
        assert_eq!(config["operation"], json!("store"));
    }

    #[test]
    fn protocol_config_carries_protocol_method_and_cost() {
        let wf = WorkflowId::from("wf_1");
        let swap =
            derive_default_config(NodeCategory::Protocol, "Jupiter Swap", &Parameters::new(), &wf);
        assert_eq!(swap["protocol"], json!("jupiter"));
        assert_eq!(swap["method"], json!("swap"));
        assert_eq!(swap["cost"], json!(3));
        assert_eq!(swap["slippageBps"], json!(50));

        let solend =
            derive_default_config(NodeCategory::Protocol, "Solend health", &Parameters::new(), &wf);
        assert_eq!(solend["protocol"], json!("solend"));
        assert_eq!(solend["method"], json!("getLoanHealth"));

        let generic =
            derive_default_config(NodeCategory::Protocol, "Mystery", &Parameters::new(), &wf);
        assert_eq!(generic["protocol"], json!("generic"));
        assert_eq!(generic["cost"], json!(1));
    }

    #[test]
    fn communication_gets_target_placeholder_only_when_unset() {
        let wf = WorkflowId::from("wf_1");
        let config =
            derive_default_config(NodeCategory::Communication, "Telegram", &Parameters::new(), &wf);
        assert_eq!(config["channel"], json!("telegram"));
        assert_eq!(config["chatId"], json!(DEFAULT_MESSAGE_TARGET));

        let p = params(json!({"chatId": "12345"}));
        let config = derive_default_config(NodeCategory::Communication, "Telegram", &p, &wf);
        assert!(!config.contains_key("chatId"));

        let blank = params(json!({"target": "  "}));
        let config = derive_default_config(NodeCategory::Communication, "Notify", &blank, &wf);
        assert_eq!(config["target"], json!(DEFAULT_MESSAGE_TARGET));
    }

    #[test]
    fn unknown_category_is_empty() {
        let wf = WorkflowId::from("wf_1");
        assert!(derive_inputs(NodeCategory::Unknown, "anything", &Parameters::new()).is_empty());
        assert!(derive_outputs(NodeCategory::Unknown, "anything").is_empty());
        assert!(
            derive_default_config(NodeCategory::Unknown, "anything", &Parameters::new(), &wf)
                .is_empty()
        );
    }

    #[test]
    fn port_ids_are_unique_within_each_template() {
        use std::collections::HashSet;

        for category in ALL_CATEGORIES {
            for m in MATCHERS.iter().filter(|m| m.category == category) {
                let inputs = m.template.inputs(&Parameters::new());
                let unique: HashSet<_> = inputs.iter().map(|p| &p.id).collect();
                assert_eq!(unique.len(), inputs.len(), "{:?}", m.template);
                let outputs = m.template.outputs();
                let unique: HashSet<_> = outputs.iter().map(|p| &p.id).collect();
                assert_eq!(unique.len(), outputs.len(), "{:?}", m.template);
            }
        }
    }
}
