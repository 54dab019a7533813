//! Validators for the section-summary, data-extraction, architecture, todo and code steps.
//! The register-mapping validator lives in `registers`.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;

use super::issue::{ValidationIssue, ValidationResult};
use super::registers::parse_int_literal;

/// Step-specific checks run after schema validation. Implementations append issues to
/// `result` and never fail.
pub trait StepValidator: Send + Sync {
    fn validate_custom(&self, data: &Value, result: &mut ValidationResult);
}

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex")
}

static PERIPHERAL_NAME: LazyLock<Regex> = LazyLock::new(|| regex(r"^[A-Za-z][A-Za-z0-9_]*$"));
static PASCAL_CASE: LazyLock<Regex> = LazyLock::new(|| regex(r"^[A-Z][a-zA-Z0-9]*$"));
static NAMESPACE_DECL: LazyLock<Regex> = LazyLock::new(|| regex(r"namespace\s+\w+"));
static PUBLIC_CLASS: LazyLock<Regex> = LazyLock::new(|| regex(r"public\s+class\s+\w+"));
static USING_STMT: LazyLock<Regex> = LazyLock::new(|| regex(r"using\s+"));
static MACHINE_CTOR: LazyLock<Regex> =
    LazyLock::new(|| regex(r"public\s+\w+\s*\([^)]*Machine\s+machine"));
static RENODE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            regex(r"IDoubleWordPeripheral|IWordPeripheral|IBytePeripheral"),
            "Missing peripheral interface implementation",
        ),
        (regex(r"RegistersCollection"), "Missing RegistersCollection"),
        (regex(r"DefineRegister"), "Missing register definitions"),
        (regex(r"\.Define\w*Register"), "Missing register definition methods"),
    ]
});

const SUMMARY_SECTIONS: [&str; 3] = ["overview", "registers", "functionality"];
const ARCHITECTURE_COMPONENTS: [&str; 3] = ["class_structure", "interfaces", "dependencies"];
const TODO_FIELDS: [&str; 3] = ["task", "category", "priority"];
const TODO_PRIORITIES: [&str; 3] = ["HIGH", "MEDIUM", "LOW"];
const ESSENTIAL_CATEGORIES: [&str; 3] = ["registers", "initialization", "interfaces"];
const MAX_LINE_LENGTH: usize = 120;

#[derive(Debug, Default)]
pub struct SectionSummaryValidator;

impl StepValidator for SectionSummaryValidator {
    fn validate_custom(&self, data: &Value, result: &mut ValidationResult) {
        let Some(obj) = data.as_object() else {
            result.add_issue(ValidationIssue::error("Section summary must be an object"));
            return;
        };

        for section in SUMMARY_SECTIONS {
            if !obj.contains_key(section) {
                result.add_issue(
                    ValidationIssue::error(format!("Missing required section: {section}"))
                        .field(section)
                        .suggest(format!("Add a '{section}' section to the summary")),
                );
            }
        }

        for (name, content) in obj {
            let thin = match content {
                Value::Null => true,
                Value::Bool(b) => !b,
                Value::String(s) => s.trim().chars().count() < 10,
                Value::Array(items) => items.is_empty(),
                Value::Object(map) => map.is_empty(),
                Value::Number(n) => n.as_f64() == Some(0.0),
            };
            if thin {
                result.add_issue(
                    ValidationIssue::warning(format!("Section '{name}' has insufficient content"))
                        .at(name)
                        .suggest("Provide more detailed information in this section"),
                );
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct DataExtractionValidator;

impl StepValidator for DataExtractionValidator {
    fn validate_custom(&self, data: &Value, result: &mut ValidationResult) {
        let Some(obj) = data.as_object() else {
            result.add_issue(ValidationIssue::error(
                "Peripheral metadata must be an object",
            ));
            return;
        };

        match obj.get("peripheral_name") {
            None => result.add_issue(
                ValidationIssue::error("Missing peripheral name")
                    .field("peripheral_name")
                    .suggest("Add 'peripheral_name' field"),
            ),
            Some(name) => {
                let valid = name.as_str().is_some_and(|n| PERIPHERAL_NAME.is_match(n));
                if !valid {
                    result.add_issue(
                        ValidationIssue::error(format!(
                            "Invalid peripheral name: {}",
                            name.as_str().map(str::to_string).unwrap_or(name.to_string())
                        ))
                        .field("peripheral_name")
                        .suggest("Use valid identifier format (letters, numbers, underscore)"),
                    );
                }
            }
        }

        if let Some(base) = obj.get("base_address") {
            match parse_int_literal(base) {
                Some(addr) if addr % 4 != 0 => result.add_issue(
                    ValidationIssue::warning(format!(
                        "Base address 0x{addr:X} is not 4-byte aligned"
                    ))
                    .field("base_address")
                    .suggest("Align base address to 4-byte boundary"),
                ),
                Some(_) => {}
                None => result.add_issue(
                    ValidationIssue::error(format!("Invalid base address format: {base}"))
                        .field("base_address"),
                ),
            }
        }

        if let Some(interrupts) = obj.get("interrupts").and_then(Value::as_array) {
            for (idx, interrupt) in interrupts.iter().enumerate() {
                let location = format!("interrupts[{idx}]");
                match interrupt.as_object() {
                    None => result.add_issue(
                        ValidationIssue::error(format!("Interrupt {idx} must be an object"))
                            .at(location),
                    ),
                    Some(irq) if !(irq.contains_key("name") && irq.contains_key("number")) => {
                        result.add_issue(
                            ValidationIssue::error(format!(
                                "Interrupt {idx} missing required fields"
                            ))
                            .at(location)
                            .suggest("Add 'name' and 'number' fields"),
                        )
                    }
                    Some(_) => {}
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ArchitectureValidator;

impl StepValidator for ArchitectureValidator {
    fn validate_custom(&self, data: &Value, result: &mut ValidationResult) {
        let Some(obj) = data.as_object() else {
            result.add_issue(ValidationIssue::error(
                "Architecture plan must be an object",
            ));
            return;
        };

        for component in ARCHITECTURE_COMPONENTS {
            if !obj.contains_key(component) {
                result.add_issue(
                    ValidationIssue::error(format!(
                        "Missing architectural component: {component}"
                    ))
                    .field(component)
                    .suggest(format!("Add '{component}' to the architecture plan")),
                );
            }
        }

        if let Some(class_info) = obj.get("class_structure") {
            match class_info.get("class_name") {
                None => result.add_issue(
                    ValidationIssue::error("Missing class name in architecture")
                        .at("class_structure"),
                ),
                Some(name) => {
                    if !name.as_str().is_some_and(|n| PASCAL_CASE.is_match(n)) {
                        result.add_issue(
                            ValidationIssue::warning(
                                "Class name doesn't follow PascalCase convention",
                            )
                            .at("class_structure.class_name")
                            .suggest("Use PascalCase for class names"),
                        );
                    }
                }
            }
        }

        if let Some(interfaces) = obj.get("interfaces").and_then(Value::as_array) {
            for (idx, interface) in interfaces.iter().enumerate() {
                let name = interface.as_str().unwrap_or_default();
                if !name.starts_with('I') {
                    result.add_issue(
                        ValidationIssue::warning(format!(
                            "Interface '{name}' doesn't follow naming convention"
                        ))
                        .at(format!("interfaces[{idx}]"))
                        .suggest("Interface names should start with 'I'"),
                    );
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct TodoListValidator;

impl StepValidator for TodoListValidator {
    fn validate_custom(&self, data: &Value, result: &mut ValidationResult) {
        let Some(todos) = data.as_object().and_then(|obj| obj.get("todos")) else {
            result.add_issue(ValidationIssue::error(
                "Todo list must contain 'todos' field",
            ));
            return;
        };
        let Some(todos) = todos.as_array() else {
            result.add_issue(ValidationIssue::error("Todos must be a list"));
            return;
        };
        if todos.is_empty() {
            result.add_issue(
                ValidationIssue::warning("Todo list is empty").suggest("Add implementation tasks"),
            );
            return;
        }

        let mut categories: HashMap<String, usize> = HashMap::new();

        for (idx, todo) in todos.iter().enumerate() {
            let location = format!("todos[{idx}]");
            let Some(item) = todo.as_object() else {
                result.add_issue(
                    ValidationIssue::error(format!("Todo item {idx} must be an object"))
                        .at(location),
                );
                continue;
            };

            for field in TODO_FIELDS {
                if !item.contains_key(field) {
                    result.add_issue(
                        ValidationIssue::error(format!("Todo item missing required field: {field}"))
                            .at(&location)
                            .field(field),
                    );
                }
            }

            if let Some(priority) = item.get("priority") {
                let known = priority
                    .as_str()
                    .is_some_and(|p| TODO_PRIORITIES.contains(&p));
                if !known {
                    result.add_issue(
                        ValidationIssue::warning(format!("Invalid priority: {priority}"))
                            .at(&location)
                            .field("priority")
                            .suggest("Use HIGH, MEDIUM, or LOW"),
                    );
                }
            }

            if let Some(category) = item.get("category").and_then(Value::as_str) {
                *categories.entry(category.to_string()).or_default() += 1;
            }
        }

        for category in ESSENTIAL_CATEGORIES {
            if !categories.contains_key(category) {
                result.add_issue(
                    ValidationIssue::warning(format!(
                        "No todos for essential category: {category}"
                    ))
                    .suggest(format!("Add tasks for {category} implementation")),
                );
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct CodeGenerationValidator;

impl CodeGenerationValidator {
    /// Syntax, Renode-pattern and quality checks over a code string.
    pub fn check_code(&self, code: &str, result: &mut ValidationResult) {
        check_syntax(code, result);
        check_renode_patterns(code, result);
        check_quality(code, result);
    }
}

impl StepValidator for CodeGenerationValidator {
    fn validate_custom(&self, data: &Value, result: &mut ValidationResult) {
        let Some(code) = data.as_object().and_then(|obj| obj.get("code")) else {
            result.add_issue(ValidationIssue::error(
                "Code generation output must contain 'code' field",
            ));
            return;
        };
        let Some(code) = code.as_str() else {
            result.add_issue(ValidationIssue::error("Generated code must be a string"));
            return;
        };
        self.check_code(code, result);
    }
}

fn check_syntax(code: &str, result: &mut ValidationResult) {
    let open = code.matches('{').count();
    let close = code.matches('}').count();
    if open != close {
        result.add_issue(
            ValidationIssue::error(format!("Unbalanced braces: {open} open, {close} close"))
                .suggest("Check for missing opening or closing braces"),
        );
    }

    if !NAMESPACE_DECL.is_match(code) {
        result.add_issue(
            ValidationIssue::error("Missing namespace declaration")
                .suggest("Add namespace declaration at the beginning"),
        );
    }

    if !PUBLIC_CLASS.is_match(code) {
        result.add_issue(
            ValidationIssue::error("Missing public class definition")
                .suggest("Add public class for the peripheral"),
        );
    }

    if !USING_STMT.is_match(code) {
        result.add_issue(
            ValidationIssue::warning("No using statements found")
                .suggest("Add necessary using statements"),
        );
    }
}

fn check_renode_patterns(code: &str, result: &mut ValidationResult) {
    for (pattern, message) in RENODE_PATTERNS.iter() {
        if !pattern.is_match(code) {
            result.add_issue(
                ValidationIssue::error(*message).suggest("Implement required Renode patterns"),
            );
        }
    }

    if !MACHINE_CTOR.is_match(code) {
        result.add_issue(
            ValidationIssue::error("Constructor missing Machine parameter")
                .suggest("Add Machine parameter to constructor"),
        );
    }
}

fn check_quality(code: &str, result: &mut ValidationResult) {
    let todo_lines = code.lines().filter(|line| line.contains("TODO")).count();
    if todo_lines > 0 {
        result.add_issue(
            ValidationIssue::warning(format!("Found {todo_lines} TODO comments"))
                .suggest("Complete TODO items before finalizing"),
        );
    }

    if !code.contains("///") {
        result.add_issue(
            ValidationIssue::info("No XML documentation comments found")
                .suggest("Add XML documentation for public members"),
        );
    }

    let long_lines = code
        .lines()
        .filter(|line| line.chars().count() > MAX_LINE_LENGTH)
        .count();
    if long_lines > 0 {
        result.add_issue(
            ValidationIssue::info(format!(
                "Found {long_lines} lines exceeding {MAX_LINE_LENGTH} characters"
            ))
            .suggest("Consider breaking long lines for readability"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::issue::Severity;
    use serde_json::json;

    fn run(validator: &dyn StepValidator, data: Value) -> ValidationResult {
        let mut result = ValidationResult::new();
        validator.validate_custom(&data, &mut result);
        result
    }

    #[test]
    fn non_object_outputs_name_the_json_type() {
        let summary = run(&SectionSummaryValidator, json!(42));
        assert_eq!(summary.issues()[0].message, "Section summary must be an object");
        let todos = run(&TodoListValidator, json!({"todos": [7]}));
        assert!(
            todos
                .issues()
                .iter()
                .any(|i| i.message == "Todo item 0 must be an object")
        );
        assert!(
            summary
                .issues()
                .iter()
                .chain(todos.issues())
                .all(|i| !i.message.contains("dictionary"))
        );
    }

    const GOOD_CODE: &str = r#"using Antmicro.Renode.Core;

namespace Antmicro.Renode.Peripherals.Timers
{
    /// <summary>Timer.</summary>
    public class Timer32 : IDoubleWordPeripheral
    {
        public Timer32(Machine machine)
        {
            RegistersCollection = new DoubleWordRegisterCollection(this);
            Registers.Control.DefineRegister(RegistersCollection, "CTRL");
        }
    }
}
"#;

    #[test]
    fn summary_requires_core_sections() {
        let result = run(
            &SectionSummaryValidator,
            json!({"overview": "A UART peripheral with FIFOs.", "timing": ""}),
        );
        assert_eq!(result.error_count(), 2);
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn summary_short_section_warns() {
        let result = run(
            &SectionSummaryValidator,
            json!({
                "overview": "short",
                "registers": "Eight registers starting at base.",
                "functionality": "Full duplex serial communication."
            }),
        );
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn extraction_checks_name_address_and_interrupts() {
        let result = run(
            &DataExtractionValidator,
            json!({
                "peripheral_name": "9bad",
                "base_address": "0x40000002",
                "interrupts": [{"name": "IRQ"}, 5, {"name": "TX", "number": 3}]
            }),
        );
        assert_eq!(result.error_count(), 3);
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn extraction_rejects_unparseable_base_address() {
        let result = run(
            &DataExtractionValidator,
            json!({"peripheral_name": "Timer32", "base_address": "somewhere"}),
        );
        assert_eq!(result.error_count(), 1);
    }

    #[test]
    fn architecture_checks_structure() {
        let result = run(
            &ArchitectureValidator,
            json!({
                "class_structure": {"class_name": "timer_peripheral"},
                "interfaces": ["IKnownSize", "Timer"]
            }),
        );
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.warning_count(), 2);
    }

    #[test]
    fn todo_list_checks_fields_priorities_and_categories() {
        let result = run(
            &TodoListValidator,
            json!({
                "todos": [
                    {"task": "Define CTRL", "category": "registers", "priority": "HIGH"},
                    {"task": "Reset logic", "category": "initialization", "priority": 1},
                    {"category": "interfaces", "priority": "LOW"}
                ]
            }),
        );
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn empty_todo_list_warns_only() {
        let result = run(&TodoListValidator, json!({"todos": []}));
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn well_formed_code_passes() {
        let result = run(&CodeGenerationValidator, json!({"code": GOOD_CODE}));
        assert!(result.is_valid(), "{:?}", result.issues());
        assert_eq!(result.score(), 100.0);
    }

    #[test]
    fn bare_code_collects_errors() {
        let result = run(&CodeGenerationValidator, json!({"code": "class X {"}));
        assert!(!result.is_valid());
        // braces, namespace, public class, 4 renode patterns, constructor
        assert_eq!(result.error_count(), 8);
        assert!(
            result
                .issues()
                .iter()
                .any(|i| i.severity == Severity::Info)
        );
    }

    #[test]
    fn code_must_be_string() {
        assert!(!run(&CodeGenerationValidator, json!({"code": 3})).is_valid());
        assert!(!run(&CodeGenerationValidator, json!({"source": ""})).is_valid());
    }
}
