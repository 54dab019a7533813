//! Response schemas passed to the provider as generation constraints.

use serde_json::{Value, json};

use super::types::PipelineStep;

/// JSON schema the step's response should follow, if the step has one. Todo and code
/// generation are unconstrained.
pub fn response_schema(step: PipelineStep) -> Option<Value> {
    match step {
        PipelineStep::SectionSummary => Some(section_summary()),
        PipelineStep::DataExtraction => Some(data_extraction()),
        PipelineStep::RegisterMapping => Some(register_mapping()),
        PipelineStep::ArchitecturePlanning => Some(architecture()),
        PipelineStep::TodoGeneration | PipelineStep::CodeGeneration => None,
    }
}

fn string_list() -> Value {
    json!({"type": "array", "items": {"type": "string"}})
}

fn section_summary() -> Value {
    json!({
        "type": "object",
        "properties": {
            "overview": {"type": "string"},
            "registers": {"type": "string"},
            "functionality": {"type": "string"},
            "interrupts": {"type": "string"},
            "timing": {"type": "string"},
            "key_features": string_list()
        },
        "required": ["overview", "registers", "functionality"]
    })
}

fn data_extraction() -> Value {
    json!({
        "type": "object",
        "properties": {
            "peripheral_name": {"type": "string"},
            "base_address": {"type": "string"},
            "size": {"type": "integer"},
            "interrupts": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "number": {"type": "integer"},
                        "description": {"type": "string"}
                    },
                    "required": ["name", "number"]
                }
            },
            "clock_domains": string_list(),
            "interfaces": string_list(),
            "dma_channels": {"type": "integer"},
            "features": string_list()
        },
        "required": ["peripheral_name", "base_address"]
    })
}

fn register_mapping() -> Value {
    let bit_field = json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "start_bit": {"type": "integer"},
            "end_bit": {"type": "integer"},
            "access": {"type": "string"},
            "description": {"type": "string"},
            "values": {"type": "object"}
        },
        "required": ["name", "start_bit", "end_bit"]
    });
    json!({
        "type": "object",
        "properties": {
            "registers": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "address": {"type": "string"},
                        "size": {"type": "integer"},
                        "access": {"type": "string"},
                        "reset_value": {"type": "string"},
                        "description": {"type": "string"},
                        "bit_fields": {"type": "array", "items": bit_field}
                    },
                    "required": ["name", "address", "size", "access"]
                }
            }
        },
        "required": ["registers"]
    })
}

fn architecture() -> Value {
    json!({
        "type": "object",
        "properties": {
            "class_structure": {
                "type": "object",
                "properties": {
                    "class_name": {"type": "string"},
                    "base_class": {"type": "string"},
                    "interfaces": string_list(),
                    "namespaces": string_list()
                },
                "required": ["class_name", "base_class"]
            },
            "interfaces": string_list(),
            "dependencies": string_list(),
            "design_patterns": string_list(),
            "register_groups": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "registers": string_list()
                    }
                }
            },
            "register_definitions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {"name": {"type": "string"}},
                    "required": ["name"]
                }
            }
        },
        "required": ["class_structure", "interfaces", "dependencies"]
    })
}
