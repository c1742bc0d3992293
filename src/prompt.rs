//! Prompt assembly.
//!
//! A [`Prompt`] is two parts: a **system** part (persona, output contract,
//! format instructions) and a **user** part (retrieved context, chat history,
//! the current configuration, and the question). Backends that support chat
//! roles send them as separate messages; [`Prompt::render`] gives the
//! single-string form.
//!
//! The format instructions come from [`OutputSchema`], which is also what the
//! validator enforces, so the contract the model is shown and the contract
//! its output is checked against cannot drift apart.

use serde_json::Value;

use crate::models::Chunk;

/// Field catalogue of a subnet configuration, shown to the model when
/// `[prompt].include_config_fields` is enabled.
pub const CONFIG_FIELD_HINTS: &str = r#"{
  "subnetId": "string",
  "vmId": "string",
  "evmChainId": "number",
  "gasLimit": "number",
  "targetBlockRate": "number",
  "tokenAllocations": [{ "address": "string", "amount": "string" }],
  "feeConfig": {
    "minBaseFee": "string",
    "baseFeeChangeDenominator": "number",
    "minBlockGasCost": "string",
    "maxBlockGasCost": "string",
    "blockGasCostStep": "string",
    "targetGas": "string"
  },
  "contractDeployerAllowListConfig": {
    "enabled": "boolean",
    "admins": ["string"],
    "members": ["string"],
    "enabledAddresses": ["string"]
  },
  "contractNativeMinterConfig": {
    "enabled": "boolean",
    "admins": ["string"],
    "members": ["string"],
    "enabledAddresses": ["string"]
  },
  "txAllowListConfig": {
    "enabled": "boolean",
    "admins": ["string"],
    "members": ["string"],
    "enabledAddresses": ["string"]
  },
  "feeManagerEnabled": "boolean",
  "feeManagerAdmins": ["string"],
  "rewardManagerEnabled": "boolean",
  "rewardManagerAdmins": ["string"]
}"#;

/// JSON type a schema field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Object,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Object => "object",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaField {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
}

/// The two-field output contract: `reply` (string) and `update` (object).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSchema {
    fields: [SchemaField; 2],
}

impl Default for OutputSchema {
    fn default() -> Self {
        Self {
            fields: [
                SchemaField {
                    name: "reply",
                    kind: FieldKind::String,
                    description: "Conversational answer to the question.",
                },
                SchemaField {
                    name: "update",
                    kind: FieldKind::Object,
                    description: "JSON merge-patch for the config ({} if no change is needed).",
                },
            ],
        }
    }
}

impl OutputSchema {
    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    /// Instruction block telling the model to emit exactly one JSON object.
    pub fn format_instructions(&self) -> String {
        let mut sketch = String::from("{\n");
        for (i, field) in self.fields.iter().enumerate() {
            let sep = if i + 1 < self.fields.len() { "," } else { "" };
            sketch.push_str(&format!(
                "\t\"{}\": {}  // {}{}\n",
                field.name,
                field.kind.as_str(),
                field.description,
                sep
            ));
        }
        sketch.push('}');

        let names: Vec<String> = self.fields.iter().map(|f| format!("\"{}\"", f.name)).collect();

        format!(
            "OUTPUT FORMAT:\n\
             Respond with a single JSON object and nothing else. The object must have \
             exactly these keys: {}.\n\
             Use this shape, in a markdown code block:\n\n\
             ```json\n{}\n```",
            names.join(" and "),
            sketch
        )
    }
}

/// A fully assembled model input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Single-string form for completion-style backends.
    pub fn render(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}

/// Combines retrieved context, conversation state, and the output contract.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    persona: String,
    schema: OutputSchema,
    include_field_hints: bool,
}

impl PromptAssembler {
    pub fn new(persona: impl Into<String>, include_field_hints: bool) -> Self {
        Self {
            persona: persona.into(),
            schema: OutputSchema::default(),
            include_field_hints,
        }
    }

    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    /// Pure function of its inputs. Context chunks appear in the given order.
    pub fn assemble(
        &self,
        context: &[Chunk],
        chat_history: &str,
        current_config: &Value,
        question: &str,
    ) -> Prompt {
        let mut system = self.persona.trim_end().to_string();
        system.push_str(
            "\n\nYour output is a JSON object with two keys: 'reply' (a human-friendly answer) \
             and 'update' (a JSON merge-patch for the config; an empty object if no change \
             is needed).\n\n",
        );
        if self.include_field_hints {
            system.push_str("Allowed config fields and types:\n");
            system.push_str(CONFIG_FIELD_HINTS);
            system.push_str("\n\n");
        }
        system.push_str(&self.schema.format_instructions());

        let context_text = context
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        // serde_json::Value always serializes; the fallback keeps this infallible.
        let config_text = serde_json::to_string_pretty(current_config)
            .unwrap_or_else(|_| current_config.to_string());

        let user = format!(
            "Context from docs:\n{}\n\n\
             Previous chat history:\n{}\n\n\
             Current user config JSON:\n{}\n\n\
             Current question:\n{}",
            context_text, chat_history, config_text, question
        );

        Prompt { system, user }
    }
}
