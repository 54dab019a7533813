//! Typed views of each step's output.
//!
//! Generation produces raw JSON; validators inspect that JSON directly. Once validated, the
//! output is stored as a [`StepPayload`] so later prompts can read prior results through named
//! fields. Records are lenient: absent fields default, unknown fields are kept in `extra`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::types::PipelineStep;

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionSummary {
    pub overview: Value,
    pub registers: Value,
    pub functionality: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupts: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<Value>,
    pub key_features: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterruptLine {
    pub name: String,
    pub number: Option<i64>,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeripheralMetadata {
    pub peripheral_name: String,
    /// Hex string or integer, as generated.
    pub base_address: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub interrupts: Vec<InterruptLine>,
    pub clock_domains: Vec<String>,
    pub interfaces: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dma_channels: Option<u64>,
    pub features: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BitField {
    pub name: String,
    pub start_bit: Option<i64>,
    pub end_bit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterEntry {
    pub name: String,
    pub address: Value,
    pub size: Option<u32>,
    pub access: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_value: Option<Value>,
    pub description: String,
    pub bit_fields: Vec<BitField>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterMap {
    pub registers: Vec<RegisterEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RegisterMap {
    pub fn names(&self) -> Vec<&str> {
        self.registers.iter().map(|r| r.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassStructure {
    pub class_name: String,
    pub base_class: String,
    pub interfaces: Vec<String>,
    pub namespaces: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterGroup {
    pub name: String,
    pub registers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterDefinition {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchitecturePlan {
    pub class_structure: ClassStructure,
    pub interfaces: Vec<String>,
    pub dependencies: Vec<String>,
    pub design_patterns: Vec<String>,
    pub register_groups: Vec<RegisterGroup>,
    pub register_definitions: Vec<RegisterDefinition>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TodoItem {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub task: String,
    pub category: String,
    #[serde(deserialize_with = "string_or_number")]
    pub priority: String,
    pub description: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TodoItem {
    pub fn is_high_priority(&self) -> bool {
        self.priority.eq_ignore_ascii_case("HIGH")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TodoList {
    pub todos: Vec<TodoItem>,
    pub implementation_order: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratedCode {
    pub code: String,
    pub sections: BTreeMap<String, String>,
    pub peripheral_name: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", content = "data", rename_all = "snake_case")]
pub enum StepPayload {
    SectionSummary(SectionSummary),
    DataExtraction(PeripheralMetadata),
    RegisterMapping(RegisterMap),
    ArchitecturePlanning(ArchitecturePlan),
    TodoGeneration(TodoList),
    CodeGeneration(GeneratedCode),
    /// Output that could not be read as the step's record.
    Raw(Value),
}

/// Key an output must carry before it is read as the step's typed record.
fn anchor_key(step: PipelineStep) -> &'static str {
    match step {
        PipelineStep::SectionSummary => "overview",
        PipelineStep::DataExtraction => "peripheral_name",
        PipelineStep::RegisterMapping => "registers",
        PipelineStep::ArchitecturePlanning => "class_structure",
        PipelineStep::TodoGeneration => "todos",
        PipelineStep::CodeGeneration => "code",
    }
}

fn typed<T: DeserializeOwned>(value: &Value) -> Option<T> {
    serde_json::from_value(value.clone()).ok()
}

impl StepPayload {
    pub fn from_output(step: PipelineStep, value: Value) -> Self {
        if value.get(anchor_key(step)).is_none() {
            return StepPayload::Raw(value);
        }
        let payload = match step {
            PipelineStep::SectionSummary => typed(&value).map(StepPayload::SectionSummary),
            PipelineStep::DataExtraction => typed(&value).map(StepPayload::DataExtraction),
            PipelineStep::RegisterMapping => typed(&value).map(StepPayload::RegisterMapping),
            PipelineStep::ArchitecturePlanning => {
                typed(&value).map(StepPayload::ArchitecturePlanning)
            }
            PipelineStep::TodoGeneration => typed(&value).map(StepPayload::TodoGeneration),
            PipelineStep::CodeGeneration => typed(&value).map(StepPayload::CodeGeneration),
        };
        payload.unwrap_or(StepPayload::Raw(value))
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, StepPayload::Raw(_))
    }

    pub fn to_value(&self) -> Value {
        let value = match self {
            StepPayload::SectionSummary(r) => serde_json::to_value(r),
            StepPayload::DataExtraction(r) => serde_json::to_value(r),
            StepPayload::RegisterMapping(r) => serde_json::to_value(r),
            StepPayload::ArchitecturePlanning(r) => serde_json::to_value(r),
            StepPayload::TodoGeneration(r) => serde_json::to_value(r),
            StepPayload::CodeGeneration(r) => serde_json::to_value(r),
            StepPayload::Raw(v) => return v.clone(),
        };
        value.unwrap_or(Value::Null)
    }

    fn view<T: DeserializeOwned + Default>(&self) -> T {
        typed(&self.to_value()).unwrap_or_default()
    }

    pub fn summary(&self) -> SectionSummary {
        match self {
            StepPayload::SectionSummary(r) => r.clone(),
            other => other.view(),
        }
    }

    pub fn metadata(&self) -> PeripheralMetadata {
        match self {
            StepPayload::DataExtraction(r) => r.clone(),
            other => other.view(),
        }
    }

    pub fn register_map(&self) -> RegisterMap {
        match self {
            StepPayload::RegisterMapping(r) => r.clone(),
            other => other.view(),
        }
    }

    pub fn architecture(&self) -> ArchitecturePlan {
        match self {
            StepPayload::ArchitecturePlanning(r) => r.clone(),
            other => other.view(),
        }
    }

    pub fn todo_list(&self) -> TodoList {
        match self {
            StepPayload::TodoGeneration(r) => r.clone(),
            other => other.view(),
        }
    }

    pub fn code(&self) -> Option<&GeneratedCode> {
        match self {
            StepPayload::CodeGeneration(r) => Some(r),
            _ => None,
        }
    }
}
