//! Prompt builders for each generation step, plus assembly of generated code sections.

use serde::Serialize;
use serde_json::Value;

use super::payload::{
    ArchitecturePlan, PeripheralMetadata, RegisterMap, SectionSummary, TodoItem,
};

const REGISTER_EXAMPLE_LIMIT: usize = 5;

/// Cut `text` to at most `max_chars` characters.
pub fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() { "Unknown" } else { value }
}

fn address_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "0x0".to_string(),
        other => other.to_string(),
    }
}

pub fn section_summary(documentation: &str, limit: usize) -> String {
    format!(
        r#"You are an expert at analyzing technical documentation for hardware peripherals.
Your task is to create a structured summary of the peripheral documentation.

DOCUMENTATION:
{doc}

Analyze this documentation and provide a JSON summary with the following structure:
{{
    "overview": "High-level description of the peripheral and its purpose",
    "registers": "Summary of register organization and key registers",
    "functionality": "Core functionality and operating modes",
    "interrupts": "Interrupt sources and handling (if applicable)",
    "timing": "Timing requirements and constraints",
    "key_features": ["List", "of", "key", "features"]
}}

Focus on information that is essential for implementing a Renode model.
Be thorough but concise. Ensure all JSON is properly formatted.

EXAMPLE OUTPUT:
{{
    "overview": "The UART peripheral provides asynchronous serial communication with configurable baud rate, data bits, parity, and stop bits.",
    "registers": "The peripheral has 8 registers. Key registers include Control (CTRL), Status (STAT) and Data (DATA).",
    "functionality": "Supports full-duplex communication, hardware flow control and DMA transfers.",
    "interrupts": "Generates interrupts for TX empty, RX full and error conditions",
    "timing": "Baud rate generator supports rates from 110 to 921600 bps",
    "key_features": ["Full duplex operation", "Hardware flow control", "DMA support", "FIFO buffers"]
}}"#,
        doc = truncate(documentation, limit)
    )
}

pub fn data_extraction(documentation: &str, summary: &SectionSummary, limit: usize) -> String {
    format!(
        r#"Based on the peripheral documentation and summary, extract detailed metadata.

SUMMARY:
{summary}

DOCUMENTATION EXCERPT:
{doc}

Extract the following peripheral metadata in JSON format:
{{
    "peripheral_name": "PeripheralName",
    "base_address": "0x40000000",
    "size": 4096,
    "interrupts": [
        {{"name": "UART_IRQ", "number": 37, "description": "UART interrupt"}}
    ],
    "clock_domains": ["PCLK", "UART_CLK"],
    "interfaces": ["UART", "DMA"],
    "dma_channels": 2,
    "features": ["Feature1", "Feature2"]
}}

Be precise with addresses and interrupt numbers. If information is not available, use
reasonable defaults or omit the field.

EXAMPLE for a Timer peripheral:
{{
    "peripheral_name": "Timer32",
    "base_address": "0x40001000",
    "size": 256,
    "interrupts": [{{"name": "TIMER_IRQ", "number": 15, "description": "Timer overflow interrupt"}}],
    "clock_domains": ["PCLK"],
    "interfaces": ["APB"],
    "dma_channels": 0,
    "features": ["32-bit counter", "Prescaler", "Compare match", "PWM generation"]
}}"#,
        summary = pretty(summary),
        doc = truncate(documentation, limit)
    )
}

/// Pass 0 extracts from scratch, pass 1 refines `previous`, later passes verify.
pub fn register_mapping(
    documentation: &str,
    metadata: &PeripheralMetadata,
    pass: u32,
    previous: Option<&Value>,
    limit: usize,
) -> String {
    let mut prompt = format!(
        r#"You are an expert at extracting register definitions from hardware documentation.
This is a CRITICAL step that requires extreme accuracy.

PERIPHERAL: {name}
BASE ADDRESS: {base}

DOCUMENTATION:
{doc}

"#,
        name = or_unknown(&metadata.peripheral_name),
        base = address_text(&metadata.base_address),
        doc = truncate(documentation, limit)
    );

    match (pass, previous) {
        (0, _) => prompt.push_str(
            r#"Extract ALL registers with complete details. For each register provide:
- name: Exact register name from documentation
- address: Offset from base address (hex format like "0x00")
- size: Register size in bits (8, 16, or 32)
- access: Access type (RO, WO, RW, W1C, W1S, RC)
- reset_value: Reset value in hex
- description: Register purpose
- bit_fields: Array of ALL bit fields with name, start_bit (0-based), end_bit (inclusive),
  access, description and values (object mapping values to meanings, if applicable)

CRITICAL RULES:
1. Include EVERY register mentioned in the documentation
2. Bit positions must be exact and not overlap
3. All addresses must be unique
4. Access permissions must match documentation exactly

EXAMPLE OUTPUT:"#,
        ),
        (1, Some(previous)) => {
            prompt.push_str("PREVIOUS ATTEMPT:\n");
            prompt.push_str(&pretty(previous));
            prompt.push_str(
                r#"

REFINE the register definitions by:
1. Double-checking all bit field positions
2. Ensuring no registers are missing
3. Verifying all addresses are correct
4. Adding any missing reset values
5. Correcting any access permission errors

Focus on accuracy over completeness. Fix any errors from the previous attempt."#,
            );
        }
        _ => prompt.push_str(
            r#"This is the FINAL verification pass.
Ensure ABSOLUTE accuracy for:
1. Every bit field start/end position
2. Register addresses (no conflicts)
3. Access permissions
4. Reset values

If you are unsure about any detail, say so in the description."#,
        ),
    }

    prompt.push_str(
        r#"

{
    "registers": [
        {
            "name": "CTRL",
            "address": "0x00",
            "size": 32,
            "access": "RW",
            "reset_value": "0x00000000",
            "description": "Control Register",
            "bit_fields": [
                {"name": "ENABLE", "start_bit": 0, "end_bit": 0, "access": "RW",
                 "description": "Enable peripheral", "values": {"0": "Disabled", "1": "Enabled"}},
                {"name": "MODE", "start_bit": 1, "end_bit": 2, "access": "RW",
                 "description": "Operating mode"}
            ]
        }
    ]
}"#,
    );
    prompt
}

pub fn architecture(metadata: &PeripheralMetadata, registers: &RegisterMap) -> String {
    format!(
        r#"Design the C# class architecture for a Renode peripheral model.

PERIPHERAL INFO:
{metadata}

REGISTER COUNT: {count}
REGISTERS: {names}
INTERFACES: {interfaces}

Design a clean architecture following Renode patterns:

{{
    "class_structure": {{
        "class_name": "PeripheralNamePeripheral",
        "base_class": "IDoubleWordPeripheral",
        "interfaces": ["IKnownSize"],
        "namespaces": ["Antmicro.Renode.Peripherals.SpecificType"]
    }},
    "interfaces": ["IDoubleWordPeripheral", "IKnownSize"],
    "dependencies": ["Antmicro.Renode.Core", "Antmicro.Renode.Peripherals.Bus"],
    "design_patterns": ["RegistersCollection", "FieldDefinition"],
    "register_groups": [{{"name": "ControlRegisters", "registers": ["CTRL", "STATUS"]}}],
    "register_definitions": [{{"name": "CTRL"}}, {{"name": "STATUS"}}]
}}

Follow these Renode conventions:
1. Use the peripheral interface matching the register width
2. Include IKnownSize for memory-mapped peripherals
3. Group related registers logically
4. List every register above in register_definitions
5. Use Renode's RegistersCollection pattern and plan for reset handling"#,
        metadata = pretty(metadata),
        count = registers.registers.len(),
        names = registers.names().join(", "),
        interfaces = metadata.interfaces.join(", "),
    )
}

pub fn todo_generation(
    summary: &SectionSummary,
    metadata: &PeripheralMetadata,
    architecture: &ArchitecturePlan,
    registers: &RegisterMap,
) -> String {
    format!(
        r#"Create the implementation todo list for the Renode model of {name}.

SUMMARY:
{summary}

ARCHITECTURE: {class_name}
REGISTERS ({count}): {names}

Produce granular, actionable tasks:
1. One "registers" task per register
2. "initialization" tasks for constructor and reset handling
3. "interfaces" tasks for every implemented interface
4. "implementation" tasks for functional behavior

Return JSON with:
{{
    "todos": [
        {{
            "id": "task_0001",
            "task": "Specific actionable task",
            "description": "Detailed description with Renode context",
            "category": "implementation",
            "priority": "HIGH"
        }}
    ],
    "implementation_order": ["task_0001", "task_0002"]
}}

priority is one of HIGH, MEDIUM, LOW. Each task should be completable in 1-4 hours."#,
        name = or_unknown(&metadata.peripheral_name),
        summary = pretty(summary),
        class_name = or_unknown(&architecture.class_structure.class_name),
        count = registers.registers.len(),
        names = registers.names().join(", "),
    )
}

pub fn code_header(metadata: &PeripheralMetadata, architecture: &ArchitecturePlan) -> String {
    let namespaces = &architecture.class_structure.namespaces;
    let namespace = if namespaces.is_empty() {
        "Antmicro.Renode.Peripherals".to_string()
    } else {
        namespaces.join(".")
    };
    format!(
        r#"Generate the C# file header and using statements for a Renode peripheral.

PERIPHERAL: {name}
NAMESPACE: {namespace}
INTERFACES: {interfaces}

Generate:
1. File header comment with description
2. Copyright notice (Antmicro standard)
3. All required using statements
4. Namespace declaration, ending with its opening brace

Output only C# code."#,
        name = or_unknown(&metadata.peripheral_name),
        interfaces = architecture.interfaces.join(", "),
    )
}

pub fn class_definition(metadata: &PeripheralMetadata, architecture: &ArchitecturePlan) -> String {
    let class = &architecture.class_structure;
    let class_name = if class.class_name.is_empty() {
        "UnknownPeripheral"
    } else {
        &class.class_name
    };
    let base_class = if class.base_class.is_empty() {
        "IDoubleWordPeripheral"
    } else {
        &class.base_class
    };
    format!(
        r#"Generate the C# class definition and constructor for the Renode peripheral.

CLASS NAME: {class_name}
BASE CLASS: {base_class}
INTERFACES: {interfaces}
PERIPHERAL TYPE: {name}

Generate:
1. Class declaration with proper inheritance
2. Private fields for the registers collection and state
3. Constructor taking a Machine parameter
4. IKnownSize implementation if needed
5. Reset handler

Use RegistersCollection for register management. Output only C# code."#,
        interfaces = architecture.interfaces.join(", "),
        name = or_unknown(&metadata.peripheral_name),
    )
}

pub fn register_definitions(registers: &RegisterMap) -> String {
    let examples: Vec<_> = registers
        .registers
        .iter()
        .take(REGISTER_EXAMPLE_LIMIT)
        .collect();
    format!(
        r#"Generate Renode RegistersCollection definitions for all peripheral registers.

REGISTERS TO IMPLEMENT ({count} total): {names}
FIRST DEFINITIONS:
{examples}

For each register, call DefineRegister with the register name and define its fields:
- WithFlag for single bits
- WithValueField for multi-bit fields
- WithReservedBits for unused bits
- FieldMode.Read/Write/WriteOneToClear as appropriate
- Reset values from the definitions

Generate definitions for ALL registers. Output only C# code."#,
        count = registers.registers.len(),
        names = registers.names().join(", "),
        examples = pretty(&examples),
    )
}

pub fn method_implementation(todo: &TodoItem, registers: &RegisterMap) -> String {
    format!(
        r#"Implement the following method for the Renode peripheral:

TASK: {task}
DESCRIPTION: {description}
CATEGORY: {category}

AVAILABLE REGISTERS: {count}

Generate a complete C# method implementation that follows Renode coding patterns,
includes error handling and logging via this.Log, and handles edge cases.
Output only C# code."#,
        task = or_unknown(&todo.task),
        description = todo.description,
        category = todo.category,
        count = registers.registers.len(),
    )
}

/// Join generated sections into one file: header, namespace brace, class, registers, methods,
/// then whatever closing braces the sections left open.
pub fn assemble_code(sections: &[(String, String)]) -> String {
    let mut code = String::new();
    for (name, content) in sections {
        match name.as_str() {
            "header" => {
                code.push_str(content);
                code.push('\n');
            }
            "class_definition" => {
                if !code.trim_end().ends_with('{') {
                    code.push_str("{\n");
                }
                code.push('\n');
                code.push_str(content);
            }
            "registers" => {
                code.push_str("\n\n    // Register Definitions\n");
                code.push_str(content);
            }
            _ => {
                code.push_str("\n\n");
                code.push_str(content);
            }
        }
    }
    let open = code.matches('{').count();
    let close = code.matches('}').count();
    for depth in (0..open.saturating_sub(close)).rev() {
        code.push('\n');
        code.push_str(&"    ".repeat(depth));
        code.push('}');
    }
    code
}
