use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use super::issue::{ValidationIssue, ValidationResult};
use crate::pipeline::PipelineStep;

static CAPITALISED_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-zA-Z]+\b").expect("static regex"));

/// Consistency checks across the cached outputs of several steps.
///
/// Every check is skipped when one of the outputs it compares is absent or empty.
pub fn check_all(outputs: &BTreeMap<PipelineStep, Value>, result: &mut ValidationResult) {
    register_consistency(outputs, result);
    register_implementation(outputs, result);
    todo_coverage(outputs, result);
    high_priority_coverage(outputs, result);
    peripheral_naming(outputs, result);
}

fn present(outputs: &BTreeMap<PipelineStep, Value>, step: PipelineStep) -> Option<&Value> {
    outputs.get(&step).filter(|value| match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        _ => true,
    })
}

fn list<'a>(data: &'a Value, key: &str) -> &'a [Value] {
    data.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn str_field<'a>(data: &'a Value, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn names(items: &[Value]) -> BTreeSet<&str> {
    items
        .iter()
        .filter_map(|item| item.get("name").and_then(Value::as_str))
        .collect()
}

fn joined(names: Vec<&&str>) -> String {
    names.into_iter().copied().collect::<Vec<_>>().join(", ")
}

fn register_consistency(outputs: &BTreeMap<PipelineStep, Value>, result: &mut ValidationResult) {
    let (Some(registers), Some(arch)) = (
        present(outputs, PipelineStep::RegisterMapping),
        present(outputs, PipelineStep::ArchitecturePlanning),
    ) else {
        return;
    };

    let mapped = names(list(registers, "registers"));
    let referenced = names(list(arch, "register_definitions"));

    let missing: Vec<_> = mapped.difference(&referenced).collect();
    if !missing.is_empty() {
        result.add_issue(
            ValidationIssue::error(format!(
                "Registers not referenced in architecture: {}",
                joined(missing)
            ))
            .at("architecture.register_definitions")
            .suggest("Update architecture to include all registers from the register map"),
        );
    }

    let extra: Vec<_> = referenced.difference(&mapped).collect();
    if !extra.is_empty() {
        result.add_issue(
            ValidationIssue::warning(format!(
                "Architecture references undefined registers: {}",
                joined(extra)
            ))
            .at("architecture.register_definitions")
            .suggest("Remove these registers or add them to the register map"),
        );
    }
}

fn register_implementation(outputs: &BTreeMap<PipelineStep, Value>, result: &mut ValidationResult) {
    let (Some(registers), Some(code)) = (
        present(outputs, PipelineStep::RegisterMapping),
        present(outputs, PipelineStep::CodeGeneration),
    ) else {
        return;
    };
    let code = str_field(code, "code");

    for register in list(registers, "registers") {
        let name = str_field(register, "name");
        let marker = format!(r#"DefineRegister.*"{}""#, regex::escape(name));
        let implemented = Regex::new(&marker)
            .map(|re| re.is_match(code))
            .unwrap_or(false);
        if !implemented {
            result.add_issue(
                ValidationIssue::error(format!(
                    "Register '{name}' not implemented in generated code"
                ))
                .at("code_generation.code")
                .suggest(format!("Add DefineRegister for '{name}' in the implementation")),
            );
        }
    }
}

fn todo_coverage(outputs: &BTreeMap<PipelineStep, Value>, result: &mut ValidationResult) {
    let (Some(registers), Some(todos)) = (
        present(outputs, PipelineStep::RegisterMapping),
        present(outputs, PipelineStep::TodoGeneration),
    ) else {
        return;
    };
    let registers = list(registers, "registers");
    let todos = list(todos, "todos");
    let in_category =
        |category: &str| todos.iter().filter(|t| str_field(t, "category") == category).count();

    let register_tasks = in_category("registers");
    if register_tasks < registers.len() {
        result.add_issue(
            ValidationIssue::warning(format!(
                "Todo list has {register_tasks} register tasks but {} registers defined",
                registers.len()
            ))
            .at("todo_list.todos")
            .suggest("Ensure each register has a corresponding implementation task"),
        );
    }

    if in_category("initialization") == 0 {
        result.add_issue(
            ValidationIssue::error("No initialization tasks in todo list")
                .at("todo_list.todos")
                .suggest("Add initialization tasks for peripheral setup"),
        );
    }
}

fn high_priority_coverage(outputs: &BTreeMap<PipelineStep, Value>, result: &mut ValidationResult) {
    let (Some(todos), Some(code)) = (
        present(outputs, PipelineStep::TodoGeneration),
        present(outputs, PipelineStep::CodeGeneration),
    ) else {
        return;
    };
    let code = str_field(code, "code");

    for todo in list(todos, "todos") {
        if str_field(todo, "priority") != "HIGH" {
            continue;
        }
        let task = str_field(todo, "task");
        let keywords: Vec<&str> = CAPITALISED_WORD
            .find_iter(task)
            .map(|m| m.as_str())
            .collect();
        let missing = keywords.iter().filter(|kw| !code.contains(**kw)).count();
        if missing * 2 > keywords.len() {
            result.add_issue(
                ValidationIssue::warning(format!(
                    "High priority task may not be implemented: {task}"
                ))
                .suggest("Verify implementation of all high priority tasks"),
            );
        }
    }
}

fn peripheral_naming(outputs: &BTreeMap<PipelineStep, Value>, result: &mut ValidationResult) {
    let Some(extraction) = present(outputs, PipelineStep::DataExtraction) else {
        return;
    };
    let peripheral = str_field(extraction, "peripheral_name");
    if peripheral.is_empty() {
        return;
    }

    if let Some(arch) = present(outputs, PipelineStep::ArchitecturePlanning) {
        let class_name = arch
            .get("class_structure")
            .map(|cs| str_field(cs, "class_name"))
            .unwrap_or_default();
        if !class_name.is_empty() && !class_name.contains(peripheral) {
            result.add_issue(
                ValidationIssue::warning(format!(
                    "Architecture class '{class_name}' doesn't match peripheral name '{peripheral}'"
                ))
                .at("architecture.class_structure.class_name")
                .suggest("Use consistent naming across all steps"),
            );
        }
    }

    if let Some(code) = present(outputs, PipelineStep::CodeGeneration) {
        let code = str_field(code, "code");
        let plain = format!("class {peripheral}");
        let suffixed = format!("class {peripheral}Peripheral");
        if !code.contains(&plain) && !code.contains(&suffixed) {
            result.add_issue(
                ValidationIssue::warning(format!(
                    "Generated code doesn't use peripheral name '{peripheral}'"
                ))
                .at("code_generation.code")
                .suggest("Ensure generated class matches peripheral name"),
            );
        }
    }
}
